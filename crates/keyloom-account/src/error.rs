//! Error types for account state.

use thiserror::Error;

use crate::account::SecretKeyKind;

/// Errors from account state operations.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("not logged in")]
    NotLoggedIn,

    #[error("login session expired")]
    LoginSessionExpired,

    #[error("no cached secret key of kind {0:?}")]
    NoCachedKey(SecretKeyKind),

    #[error("key kind {0:?} cannot be cached here")]
    InvalidKeyClass(SecretKeyKind),

    #[error("no local key security context")]
    NoLks,

    #[error("key {0} not found in keyring")]
    KeyNotFound(String),

    #[error("keyring belongs to a different user")]
    WrongUser,

    #[error("keyring i/o: {0}")]
    KeyringIo(#[from] std::io::Error),

    #[error("keyring encoding: {0}")]
    KeyringEncode(String),

    #[error(transparent)]
    Core(#[from] keyloom_core::CoreError),
}

/// Result type for account operations.
pub type Result<T> = std::result::Result<T, AccountError>;
