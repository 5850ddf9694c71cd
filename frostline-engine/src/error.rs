//! Crate-wide error type.
//!
//! Components that talk to the outside world (store, webhook, bus) return
//! [`Error`]; tasks and binaries wrap it in `anyhow` at their outer edges.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Table-store request failed (connection, non-2xx, bad body).
    #[error("store request failed: {0}")]
    Store(String),

    /// Webhook dispatch failed (connection or non-2xx).
    #[error("webhook dispatch failed: {0}")]
    Webhook(String),

    /// Inbound payload could not be decoded.
    #[error("malformed payload: {0}")]
    Payload(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
