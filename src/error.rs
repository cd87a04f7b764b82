//! Failure taxonomy for the digest pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a run.
///
/// Every variant propagates unmodified to the top level; the only failure
/// handled locally is a strict-mode completion missing its output section,
/// which is retried and surfaces here as [`Error::Extraction`] once the
/// attempt budget is spent.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed configuration, including the signing secret.
    #[error("configuration: {0}")]
    Config(String),
    /// Relay endpoint unreachable or the WebSocket handshake failed.
    #[error("relay connection ({url}): {reason}")]
    Connection { url: String, reason: String },
    /// The completion API call itself failed.
    #[error("completion request: {0}")]
    Inference(String),
    /// Strict mode never produced a delimited output section.
    #[error("no delimited output after {attempts} completion attempts")]
    Extraction { attempts: u32 },
    /// The write relay rejected the event or dropped the session first.
    #[error("publish rejected: {0}")]
    Publish(String),
    /// Canonical serialization or signing failed.
    #[error("event signing: {0}")]
    Signing(String),
}
