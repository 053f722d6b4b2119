/*!
 * Error types for the kbus binary
 */

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KbusError>;

#[derive(Error, Debug)]
pub enum KbusError {
    /// Configuration file could not be read
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for this schema
    #[error("failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration value out of range
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid --data argument: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Server(#[from] kbus_server::ServerError),

    #[error(transparent)]
    Connect(#[from] kbus_connect::ConnectError),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
