//! Error types for the kbus-proto crate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame body: {0}")]
    Json(#[from] serde_json::Error),
}
