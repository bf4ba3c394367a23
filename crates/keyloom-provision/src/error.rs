//! Error types for device provisioning.

use thiserror::Error;

use keyloom_account::AccountError;
use keyloom_core::{CoreError, PgpFingerprint, Uid};

/// Errors from a provisioning attempt.
///
/// `NoSyncedPgpKey` is a routing signal, not a terminal failure: the
/// engine catches exactly that variant to fall back from the synced-key
/// path to the external-keyring path. Every other variant is terminal
/// for the attempt.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no provisioning method available; account recovery is required")]
    ProvisionUnavailable,

    #[error("no local gpg key matches this identity ({} expected)", fingerprints.len())]
    NoMatchingGpgKeys {
        fingerprints: Vec<PgpFingerprint>,
        has_active_device: bool,
    },

    #[error("no synced pgp key on the server")]
    NoSyncedPgpKey,

    #[error("wrong passphrase")]
    Passphrase,

    #[error("retries exhausted: {last}")]
    RetryExhausted { last: Box<ProvisionError> },

    #[error("device already provisioned")]
    DeviceAlreadyProvisioned,

    #[error("key belongs to a different identity (expected {expected:?})")]
    IdentityMismatch {
        phrase_owner: Option<Uid>,
        expected: Uid,
    },

    #[error("identity already has an eldest key")]
    EldestKeyExists,

    #[error("gpg import failed and sign fallback was declined: {import_error}")]
    GpgImportRefused { import_error: String },

    #[error("secret prompt skipped: user canceled one recently")]
    SecretPromptSkipped,

    #[error("canceled")]
    Canceled,

    #[error("transport: {0}")]
    Transport(String),

    #[error("lookup: {0}")]
    Lookup(String),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ProvisionError {
    /// Wrap the last error of an exhausted retry loop.
    pub fn retry_exhausted(last: Option<ProvisionError>) -> Self {
        Self::RetryExhausted {
            last: Box::new(last.unwrap_or(Self::Canceled)),
        }
    }
}

/// Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;
