//! Server error types.

use vless_core::io::ReadError;
use vless_proto::ParseError;

use crate::outbound::DialError;

/// Server error type.
///
/// Everything here is a setup failure: once the relay is underway, errors
/// are logged against their direction and never surface as a response.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("proto: {0:?}")]
    Proto(ParseError),
    #[error("header read: {0}")]
    Read(#[from] ReadError),
    #[error("dial: {0}")]
    Dial(#[from] DialError),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}
