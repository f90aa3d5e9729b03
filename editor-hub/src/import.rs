//! Seeding the document store from local files.

use anyhow::{bail, Context, Result};
use editor_hub_core::{
    descriptor::mime_for_extension,
    document::{file_extension, Blob},
    store::{MemoryDocumentStore, NewDocument},
};
use std::path::{Path, PathBuf};
use tracing::info;

/// One file becomes the primary content; several become the attachment list.
pub async fn import_files(
    store: &MemoryDocumentStore,
    files: &[PathBuf],
    title: Option<String>,
    versionable: bool,
) -> Result<String> {
    if files.is_empty() {
        bail!("nothing to import");
    }
    let mut blobs = Vec::with_capacity(files.len());
    for path in files {
        blobs.push(read_blob(path)?);
    }
    let title = title.unwrap_or_else(|| {
        files[0]
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string())
    });

    let new = if blobs.len() == 1 {
        NewDocument {
            title,
            content: blobs.pop(),
            attachments: Vec::new(),
            versionable,
        }
    } else {
        NewDocument {
            title,
            content: None,
            attachments: blobs,
            versionable,
        }
    };
    let id = store.create(new).await?;
    info!(doc = %id, files = files.len(), "imported document");
    Ok(id)
}

fn read_blob(path: &Path) -> Result<Blob> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))?;
    let mime = mime_for_extension(&file_extension(&filename));
    Ok(Blob::new(filename, mime, data))
}
