//! # Keyloom
//!
//! Device provisioning for an existing identity: a new device proves
//! itself through one of five mutually exclusive paths (peer-device
//! exchange, paper key, synced PGP key, external keyring, eldest
//! bootstrap) and ends with registered device keys plus a guaranteed
//! paper backup key.
//!
//! [`Provisioner`] is the single entry point; everything with I/O
//! behind it is a trait in [`keyloom_provision`], so hosts wire in
//! their own transports and UI.

pub mod provisioner;

pub use provisioner::Provisioner;

pub use keyloom_account::{
    Account, AccountError, Clock, ManualClock, SecretKey, SecretKeyKind, SecretKeyring, Session,
    SystemClock, PAPER_KEY_MEMORY_TIMEOUT, SECRET_PROMPT_CANCEL_DURATION,
};
pub use keyloom_core::{
    ClientKind, Device, DeviceClass, DeviceId, DeviceKeys, DeviceType, Kid, PaperKey, PaperPhrase,
    Uid, Username,
};
pub use keyloom_provision::{
    DeviceSigner, EngineDeps, ExchangeSecret, GpgClient, GpgKeyInfo, GpgMethod, Identity,
    IdentityLookup, KeyFamily, LoginService, PromptSink, ProvisionEngine, ProvisionError,
    ProvisionOutcome, SecureChannel,
};
