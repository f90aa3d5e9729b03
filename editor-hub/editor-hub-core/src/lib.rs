//! Protocol core for brokering documents between a content repository and an
//! external document-editing service: session descriptors on the way out,
//! authenticated lifecycle callbacks on the way back.

pub mod auth;
pub mod callback;
pub mod descriptor;
pub mod document;
pub mod error;
pub mod fetch;
pub mod key;
pub mod resolver;
pub mod store;
pub mod token;

pub use error::{Error, Result};
pub use reqwest::Url;
