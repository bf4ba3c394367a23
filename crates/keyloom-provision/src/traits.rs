//! Collaborator seams the engine calls through.
//!
//! Everything with I/O behind it is a trait: directory lookups, login,
//! key registration, the external keyring tool, and user interaction.
//! Production wiring and test doubles are interchangeable here.

use async_trait::async_trait;
use tokio::sync::watch;

use keyloom_core::{
    Device, DeviceId, DeviceKeys, DeviceType, Ed25519Signature, Kid, LockedPgpKey, PaperKey,
    PaperPhrase, PgpFingerprint, Uid, Username,
};

use crate::channel::ExchangeSecret;
use crate::error::Result;
use crate::identity::{GpgKeyInfo, GpgMethod, Identity};
use crate::signer::DeviceSigner;

/// Directory lookups against the identity service.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Resolve a username to its identity and active key family.
    async fn resolve(&self, username: &Username) -> Result<Identity>;

    /// Which identity owns a key, if any. Used to verify paper keys.
    async fn owner_of_kid(&self, kid: &Kid) -> Result<Option<Uid>>;
}

/// A successful server login, before any device session exists.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub uid: Uid,
    /// Login salt, kept so the passphrase stream can be re-stretched.
    pub salt: Vec<u8>,
}

/// Session establishment against the server.
#[async_trait]
pub trait LoginService: Send + Sync {
    /// Passphrase login. Wrong passphrase is
    /// [`ProvisionError::Passphrase`](crate::ProvisionError::Passphrase).
    async fn login_with_passphrase(
        &self,
        username: &Username,
        passphrase: &str,
    ) -> Result<LoginOutcome>;

    /// Key-backed login, proving possession of an existing family key.
    async fn login_with_key(
        &self,
        username: &Username,
        signer: &dyn DeviceSigner,
    ) -> Result<LoginOutcome>;

    /// Fetch the passphrase-locked PGP key synced to the server, if
    /// the user ever synced one.
    async fn fetch_synced_pgp_key(&self, uid: Uid) -> Result<Option<LockedPgpKey>>;
}

/// Everything the key generator needs to mint and register one device.
pub struct DeviceKeyArgs<'a> {
    pub uid: Uid,
    pub device_id: DeviceId,
    pub device_name: &'a str,
    pub device_type: DeviceType,
    /// Existing key that signs the new device in; `None` only for the
    /// eldest bootstrap.
    pub signer: Option<&'a dyn DeviceSigner>,
    pub is_eldest: bool,
}

/// Mints device keys and registers them in the identity's family.
#[async_trait]
pub trait DeviceKeyGenerator: Send + Sync {
    /// Generate signing + encryption keys for a new device and push the
    /// registration. A duplicate device name is
    /// [`ProvisionError::DeviceAlreadyProvisioned`](crate::ProvisionError::DeviceAlreadyProvisioned).
    async fn generate(&self, args: DeviceKeyArgs<'_>) -> Result<DeviceKeys>;

    /// Register a derived paper key as a paper device in the family.
    async fn register_paper_device(
        &self,
        uid: Uid,
        device_name: &str,
        paper: &PaperKey,
        signer: &dyn DeviceSigner,
    ) -> Result<DeviceId>;
}

/// The external keyring (GPG) tool.
#[async_trait]
pub trait GpgClient: Send + Sync {
    /// List private keys available in the external keyring.
    async fn index_private_keys(&self) -> Result<Vec<GpgKeyInfo>>;

    /// Extract a private key into local custody, decrypted.
    async fn import_key(&self, fingerprint: &PgpFingerprint) -> Result<keyloom_core::UnlockedPgpKey>;

    /// Sign with a key without ever exporting it.
    async fn sign(&self, fingerprint: &PgpFingerprint, message: &[u8]) -> Result<Ed25519Signature>;
}

/// User interaction during provisioning.
///
/// Prompt methods return [`ProvisionError::Canceled`](crate::ProvisionError::Canceled)
/// when the user backs out.
#[async_trait]
pub trait PromptSink: Send + Sync {
    /// Offer existing devices to provision from; `None` means the user
    /// declined them all.
    async fn choose_device(&self, devices: &[Device]) -> Result<Option<DeviceId>>;

    /// Ask for a name for the device being created. `attempt` starts at
    /// 1 and increments on invalid or duplicate names.
    async fn prompt_new_device_name(&self, attempt: u32) -> Result<String>;

    /// Ask for a paper key phrase. `attempt` starts at 1.
    async fn prompt_paper_phrase(&self, attempt: u32) -> Result<String>;

    /// Ask for the account passphrase.
    async fn prompt_passphrase(&self, username: &Username) -> Result<String>;

    /// Show our exchange secret and simultaneously accept one typed
    /// back from the peer's screen. Returns `Ok(None)` if the user
    /// dismissed the display without typing (the peer is transcribing
    /// instead). Must return promptly once `cancel` flips true.
    async fn display_and_prompt_secret(
        &self,
        ours: &ExchangeSecret,
        cancel: watch::Receiver<bool>,
    ) -> Result<Option<ExchangeSecret>>;

    /// Choose between importing the selected GPG key and using the
    /// external tool as a signing oracle.
    async fn choose_gpg_method(&self, keys: &[GpgKeyInfo]) -> Result<GpgMethod>;

    /// Pick one of several matching GPG keys.
    async fn select_gpg_key(&self, keys: &[GpgKeyInfo]) -> Result<PgpFingerprint>;

    /// Import failed; offer the one-way switch to the sign-only method.
    async fn confirm_gpg_sign_fallback(&self, import_error: &str) -> Result<bool>;

    /// Show the user a freshly generated paper phrase to write down.
    async fn show_paper_phrase(&self, phrase: &PaperPhrase) -> Result<()>;

    /// Final success report.
    async fn provisionee_success(&self, username: &Username, device_name: &str) -> Result<()>;
}
