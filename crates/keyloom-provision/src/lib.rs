//! # Keyloom Provision
//!
//! The device-provisioning engine: routing across the five mutually
//! exclusive provisioning paths (peer-device exchange, paper key,
//! synced PGP key, external keyring, eldest bootstrap), retry loops,
//! and the failure rollback contract.
//!
//! All I/O goes through collaborator traits in [`traits`] and
//! [`channel`], so the engine runs identically against production
//! wiring and test doubles.

pub mod channel;
pub mod eldest;
pub mod engine;
pub mod error;
pub mod gpg;
pub mod identity;
pub mod paper;
pub mod peer;
pub mod pgp;
pub mod signer;
pub mod traits;

pub use channel::{
    ExchangeSecret, PendingDevice, ProvisioneePayload, SecureChannel, EXCHANGE_SECRET_LEN,
};
pub use engine::{
    EngineDeps, ProvisionEngine, ProvisionOutcome, ProvisionRequest, DEVICE_NAME_RETRIES,
    PAPER_KEY_RETRIES,
};
pub use error::ProvisionError;
pub use identity::{GpgKeyInfo, GpgMethod, Identity, KeyFamily, PgpKeyRef};
pub use signer::{DeviceSigner, GpgOracleSigner, KeypairSigner};
pub use traits::{
    DeviceKeyArgs, DeviceKeyGenerator, GpgClient, IdentityLookup, LoginOutcome, LoginService,
    PromptSink,
};
