//! Callback lifecycle scenarios: locking, saving, stale and duplicate delivery.

use async_trait::async_trait;
use bytes::Bytes;
use editor_hub_core::{
    callback::{CallbackEnvelope, CallbackOutcome, CallbackProcessor},
    document::{Blob, Version},
    fetch::ContentFetcher,
    key::make_key,
    store::{DocumentStore, MemoryDocumentStore, NewDocument},
    Error, Result,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SAVED_URL: &str = "http://docs.example/cache/saved.docx";

struct MapFetcher {
    files: HashMap<String, Bytes>,
    calls: AtomicUsize,
}

impl MapFetcher {
    fn new(files: &[(&str, &[u8])]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(url, data)| (url.to_string(), Bytes::copy_from_slice(data)))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Fetch(format!("{url} returned 404 Not Found")))
    }
}

struct Fixture {
    store: Arc<MemoryDocumentStore>,
    fetcher: Arc<MapFetcher>,
    processor: CallbackProcessor,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryDocumentStore::new());
    let fetcher = Arc::new(MapFetcher::new(&[(SAVED_URL, b"edited bytes")]));
    let processor = CallbackProcessor::new(store.clone(), fetcher.clone());
    Fixture {
        store,
        fetcher,
        processor,
    }
}

async fn single(store: &MemoryDocumentStore) -> String {
    store
        .create(NewDocument {
            title: "Minutes".into(),
            content: Some(
                Blob::new("minutes.docx", "application/msword", b"original".to_vec())
                    .with_encoding("utf-8"),
            ),
            attachments: Vec::new(),
            versionable: true,
        })
        .await
        .unwrap()
}

async fn multi(store: &MemoryDocumentStore) -> String {
    store
        .create(NewDocument {
            title: "Bundle".into(),
            content: None,
            attachments: vec![
                Blob::new("zero.docx", "application/msword", b"0".to_vec()),
                Blob::new("one.xlsx", "application/vnd.ms-excel", b"1".to_vec()),
                Blob::new("two.docx", "application/msword", b"2".to_vec()),
            ],
            versionable: false,
        })
        .await
        .unwrap()
}

fn envelope(value: serde_json::Value) -> CallbackEnvelope {
    CallbackEnvelope::from_payload(value).unwrap()
}

#[tokio::test]
async fn status_zero_unlocks_and_is_idempotent() {
    let f = fixture();
    let id = single(&f.store).await;
    f.store.lock_if_unlocked(&id, "alice").await.unwrap();

    let outcome = f
        .processor
        .process(&id, envelope(json!({"status": 0, "key": "k.none"})))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Unlocked { was_locked: true });
    assert!(!f.store.get(&id).await.unwrap().lock.is_locked());

    let before = f.store.get(&id).await.unwrap();
    let outcome = f
        .processor
        .process(&id, envelope(json!({"status": 0, "key": "k.none"})))
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Unlocked { was_locked: false });
    assert_eq!(f.store.get(&id).await.unwrap(), before);
}

#[tokio::test]
async fn status_one_locks_once_for_co_editors() {
    let f = fixture();
    let id = single(&f.store).await;

    let first = f
        .processor
        .process(&id, envelope(json!({"status": 1, "key": "k.none", "users": ["alice"]})))
        .await
        .unwrap();
    assert_eq!(first, CallbackOutcome::Locked);

    let second = f
        .processor
        .process(&id, envelope(json!({"status": 1, "key": "k.none", "users": ["bob"]})))
        .await
        .unwrap();
    assert_eq!(second, CallbackOutcome::AlreadyLocked);

    let doc = f.store.get(&id).await.unwrap();
    assert!(matches!(doc.lock, editor_hub_core::document::LockState::Locked { ref owner, .. } if owner == "alice"));
}

#[tokio::test]
async fn statuses_three_and_four_only_unlock() {
    let f = fixture();
    let id = single(&f.store).await;
    for status in [3, 4] {
        f.store.lock_if_unlocked(&id, "alice").await.unwrap();
        let before = f.store.get(&id).await.unwrap();
        let outcome = f
            .processor
            .process(
                &id,
                envelope(json!({"status": status, "key": make_key(&before, None), "url": SAVED_URL})),
            )
            .await
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::Unlocked { was_locked: true });
        let after = f.store.get(&id).await.unwrap();
        assert_eq!(after.content, before.content);
        assert_eq!(after.change_token, before.change_token);
    }
    assert_eq!(f.fetcher.calls(), 0);
}

#[tokio::test]
async fn status_two_replaces_primary_content() {
    let f = fixture();
    let id = single(&f.store).await;
    f.store.lock_if_unlocked(&id, "alice").await.unwrap();
    let before = f.store.get(&id).await.unwrap();

    let outcome = f
        .processor
        .process(
            &id,
            envelope(json!({"status": 2, "key": make_key(&before, None), "url": SAVED_URL})),
        )
        .await
        .unwrap();

    let after = f.store.get(&id).await.unwrap();
    assert!(!after.lock.is_locked());
    assert_ne!(after.change_token, before.change_token);
    assert_eq!(after.versioning, Some(Version { major: 0, minor: 2 }));
    assert_eq!(
        outcome,
        CallbackOutcome::Saved {
            change_token: after.change_token.clone(),
            version: after.versioning,
        }
    );
    let blob = after.content.unwrap();
    assert_eq!(blob.data().as_ref(), b"edited bytes");
    assert_eq!(blob.filename(), "minutes.docx");
    assert_eq!(blob.mime_type(), "application/msword");
    assert_eq!(blob.encoding(), Some("utf-8"));
}

#[tokio::test]
async fn status_two_replaces_attachment_by_digest() {
    let f = fixture();
    let id = multi(&f.store).await;
    let before = f.store.get(&id).await.unwrap();
    let digest = before.attachments[2].digest().to_string();

    let outcome = f
        .processor
        .process(
            &id,
            envelope(json!({"status": 2, "key": make_key(&before, Some(2)), "url": SAVED_URL}))
                .with_url_selector(Some(digest), None),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, CallbackOutcome::Saved { version: None, .. }));

    let after = f.store.get(&id).await.unwrap();
    assert_ne!(after.change_token, before.change_token);
    assert_eq!(after.attachments[2].filename(), "two.docx");
    assert_eq!(after.attachments[2].data().as_ref(), b"edited bytes");
    assert_eq!(after.attachments[0], before.attachments[0]);
    assert_eq!(after.attachments[1], before.attachments[1]);
}

#[tokio::test]
async fn index_only_callback_replaces_that_position() {
    let f = fixture();
    let id = multi(&f.store).await;
    f.store.lock_if_unlocked(&id, "alice").await.unwrap();
    let before = f.store.get(&id).await.unwrap();

    let outcome = f
        .processor
        .process(
            &id,
            envelope(json!({"status": 2, "key": make_key(&before, Some(1)), "url": SAVED_URL}))
                .with_url_selector(None, Some(1)),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, CallbackOutcome::Saved { .. }));

    let after = f.store.get(&id).await.unwrap();
    assert!(!after.lock.is_locked());
    assert_eq!(after.attachments[1].filename(), "one.xlsx");
    assert_eq!(after.attachments[1].data().as_ref(), b"edited bytes");
    assert_eq!(after.attachments[0], before.attachments[0]);
    assert_eq!(after.attachments[2], before.attachments[2]);
}

#[tokio::test]
async fn index_past_the_end_is_skipped() {
    let f = fixture();
    let id = multi(&f.store).await;
    f.store.lock_if_unlocked(&id, "alice").await.unwrap();
    let before = f.store.get(&id).await.unwrap();

    let outcome = f
        .processor
        .process(
            &id,
            envelope(json!({"status": 2, "key": make_key(&before, Some(3)), "url": SAVED_URL}))
                .with_url_selector(None, Some(3)),
        )
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Skipped);
    assert_eq!(f.fetcher.calls(), 0);

    let after = f.store.get(&id).await.unwrap();
    assert!(!after.lock.is_locked());
    assert_eq!(after.attachments, before.attachments);
    assert_eq!(after.change_token, before.change_token);
}

#[tokio::test]
async fn unmatched_digest_is_a_silent_no_op() {
    let f = fixture();
    let id = multi(&f.store).await;
    let before = f.store.get(&id).await.unwrap();

    let outcome = f
        .processor
        .process(
            &id,
            envelope(json!({
                "status": 2,
                "key": make_key(&before, Some(0)),
                "url": SAVED_URL,
                "digest": "0123456789abcdef"
            })),
        )
        .await
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::Skipped);
    assert_eq!(f.store.get(&id).await.unwrap(), before);
    assert_eq!(f.fetcher.calls(), 0);
}

#[tokio::test]
async fn duplicate_delivery_does_not_reapply() {
    let f = fixture();
    let id = multi(&f.store).await;
    let before = f.store.get(&id).await.unwrap();
    let digest = before.attachments[1].digest().to_string();
    let callback = envelope(json!({
        "status": 2,
        "key": make_key(&before, Some(1)),
        "url": SAVED_URL,
        "digest": digest
    }));

    let first = f.processor.process(&id, callback.clone()).await.unwrap();
    assert!(matches!(first, CallbackOutcome::Saved { .. }));
    let saved = f.store.get(&id).await.unwrap();

    let second = f.processor.process(&id, callback).await.unwrap();
    assert_eq!(second, CallbackOutcome::Skipped);
    assert_eq!(f.store.get(&id).await.unwrap(), saved);
}

#[tokio::test]
async fn out_of_band_change_is_rejected_after_unlocking() {
    let f = fixture();
    let id = single(&f.store).await;
    let minted = f.store.get(&id).await.unwrap();
    let key = make_key(&minted, None);

    // someone else saves between session start and the callback
    let other = minted.content.as_ref().unwrap().with_data(b"concurrent".to_vec());
    f.store
        .save(
            &id,
            editor_hub_core::store::ContentUpdate::Primary(other),
            Default::default(),
        )
        .await
        .unwrap();
    f.store.lock_if_unlocked(&id, "alice").await.unwrap();

    let err = f
        .processor
        .process(&id, envelope(json!({"status": 2, "key": key, "url": SAVED_URL})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict));

    let after = f.store.get(&id).await.unwrap();
    assert!(!after.lock.is_locked());
    assert_eq!(after.content.unwrap().data().as_ref(), b"concurrent");
}

#[tokio::test]
async fn fetch_failure_surfaces_after_unlock() {
    let f = fixture();
    let id = single(&f.store).await;
    f.store.lock_if_unlocked(&id, "alice").await.unwrap();
    let before = f.store.get(&id).await.unwrap();

    let err = f
        .processor
        .process(
            &id,
            envelope(json!({"status": 2, "key": make_key(&before, None), "url": "http://docs.example/gone"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Fetch(_)));
    assert!(!err.is_auth());
    let after = f.store.get(&id).await.unwrap();
    assert!(!after.lock.is_locked());
    assert_eq!(after.change_token, before.change_token);
}

#[tokio::test]
async fn status_two_without_url_fails() {
    let f = fixture();
    let id = single(&f.store).await;
    let doc = f.store.get(&id).await.unwrap();
    let err = f
        .processor
        .process(&id, envelope(json!({"status": 2, "key": make_key(&doc, None)})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingUrl));
}

#[tokio::test]
async fn unknown_status_is_rejected_without_touching_the_store() {
    let f = fixture();
    let id = single(&f.store).await;
    f.store.lock_if_unlocked(&id, "alice").await.unwrap();
    let before = f.store.get(&id).await.unwrap();

    let err = f
        .processor
        .process(&id, envelope(json!({"status": 99, "key": "k.none"})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownStatus(99)));
    assert_eq!(f.store.get(&id).await.unwrap(), before);
}

#[tokio::test]
async fn unknown_document_fails() {
    let f = fixture();
    let err = f
        .processor
        .process("missing", envelope(json!({"status": 4, "key": "k.none"})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DocumentNotFound(id) if id == "missing"));
}
