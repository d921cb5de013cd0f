//! WireGuard key material and configuration records.

mod conf;
mod keys;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use conf::{load_config, save_config, InterfaceConfig, PeerConfig};
pub use keys::{KeyPair, PrivateKey, PublicKey, KEY_SIZE};

/// Result type for WireGuard key and config operations.
pub type WgResult<T> = Result<T, WgError>;

/// Errors from key handling and config parsing.
#[derive(Debug, Error)]
pub enum WgError {
    /// Key material was not exactly 32 bytes.
    #[error("invalid key length: {0} bytes, expected {KEY_SIZE}")]
    InvalidKeyLength(usize),

    /// Key text was not valid base64.
    #[error("invalid base64 key: {0}")]
    InvalidBase64(String),

    /// A config line could not be parsed.
    #[error("config line {line}: {message}")]
    Parse { line: usize, message: String },

    /// I/O failure on a config file.
    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
