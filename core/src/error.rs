//! Error types for the CIMI client.
//!
//! # Design
//! Every fallible operation returns `CimiError`. Typed operations check the
//! status class before decoding, so a server rejection surfaces as `NotFound`
//! or `Status` rather than as a confusing decode failure. The raw
//! `CimiClient::dispatch` never inspects the status; callers decide.

use thiserror::Error;

/// Errors returned by `CimiClient` and its collaborators.
#[derive(Debug, Error)]
pub enum CimiError {
    /// The request never produced a response: connection refused, timeout,
    /// TLS failure, or the body could not be read.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server returned 404 for a typed operation.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded into the requested type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A base or resource URL could not be parsed or resolved.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Credentials cannot be turned into an `Authorization` header.
    #[error("invalid credentials: {0}")]
    Authentication(String),

    /// Client configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CimiError {
    /// The HTTP status carried by this error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            CimiError::NotFound => Some(404),
            CimiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
