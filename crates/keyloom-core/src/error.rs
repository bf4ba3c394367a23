//! Error types for Keyloom core primitives.

use thiserror::Error;

/// Errors from pure key and phrase operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("wrong passphrase")]
    WrongPassphrase,

    #[error("unknown word in phrase: {0:?}")]
    UnknownWord(String),

    #[error("phrase has {got} words, expected {expected}")]
    BadWordCount { expected: usize, got: usize },

    #[error("invalid device name: {0}")]
    InvalidDeviceName(String),

    #[error("sealing error: {0}")]
    SealError(String),

    #[error("unseal failed (wrong key or corrupt box)")]
    UnsealError,

    #[error("malformed {what}: {msg}")]
    Malformed { what: &'static str, msg: String },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
