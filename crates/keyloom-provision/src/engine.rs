//! The provisioning orchestrator.
//!
//! One attempt selects and runs exactly one provisioning path, then
//! guarantees the identity holds a paper key before reporting success.
//! Routing is deterministic: existing devices win over PGP keys, PGP
//! keys over bootstrap, and the only in-flight fallback is synced-PGP
//! to external-keyring on the precise no-synced-key signal.
//!
//! Rollback contract: once any state-mutating step has run, every
//! subsequent error wipes the in-memory account state (logout) before
//! propagating, so a half-provisioned device never looks logged in.

use std::sync::Arc;

use keyloom_account::{Account, LoginSession, SecretKey, SecretKeyKind, Session};
use keyloom_core::{
    check_device_name, sort_for_choice, ClientKind, DeviceClass, DeviceId, DeviceKeys, DeviceType,
    PaperKey, PaperPhrase, SigningKeypair,
};

use crate::channel::SecureChannel;
use crate::error::{ProvisionError, Result};
use crate::identity::Identity;
use crate::signer::{DeviceSigner, KeypairSigner};
use crate::traits::{
    DeviceKeyArgs, DeviceKeyGenerator, GpgClient, IdentityLookup, LoginService, PromptSink,
};

/// Bound on paper-phrase retry prompts.
pub const PAPER_KEY_RETRIES: u32 = 10;

/// Bound on device-name retry prompts.
pub const DEVICE_NAME_RETRIES: u32 = 10;

/// Collaborators the engine calls through.
pub struct EngineDeps {
    pub lookup: Arc<dyn IdentityLookup>,
    pub login: Arc<dyn LoginService>,
    pub keygen: Arc<dyn DeviceKeyGenerator>,
    pub channel: Arc<dyn SecureChannel>,
    pub gpg: Arc<dyn GpgClient>,
    pub prompts: Arc<dyn PromptSink>,
}

/// Immutable input for one provisioning attempt.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub device_class: DeviceClass,
    pub client_kind: ClientKind,
    pub identity: Identity,
}

/// What a successful attempt reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub username: keyloom_core::Username,
    pub device_name: String,
}

/// The provisioning engine. Stateless between attempts; all per-attempt
/// state lives in an internal [`Attempt`].
pub struct ProvisionEngine {
    deps: EngineDeps,
}

impl ProvisionEngine {
    pub fn new(deps: EngineDeps) -> Self {
        Self { deps }
    }

    /// Run one provisioning attempt against an account.
    ///
    /// The account must not already hold a device session. Callers
    /// serialize attempts; the engine assumes it is the only writer.
    pub async fn run(
        &self,
        account: &mut Account,
        request: &ProvisionRequest,
    ) -> Result<ProvisionOutcome> {
        if account.logged_in() {
            return Err(ProvisionError::DeviceAlreadyProvisioned);
        }
        account.ensure_username(&request.identity.username);

        let mut attempt = Attempt {
            deps: &self.deps,
            account,
            request,
            cleanup_required: false,
            device_name: None,
            new_signing: None,
        };
        match attempt.execute().await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if attempt.cleanup_required {
                    tracing::warn!(error = %err, "provisioning failed after state mutation, rolling back");
                    attempt.account.logout();
                } else {
                    tracing::debug!(error = %err, "provisioning failed before any state mutation");
                }
                Err(err)
            }
        }
    }
}

/// State for one attempt. Resolver methods for the five paths are
/// implemented on this type in their own modules.
pub(crate) struct Attempt<'a> {
    pub(crate) deps: &'a EngineDeps,
    pub(crate) account: &'a mut Account,
    pub(crate) request: &'a ProvisionRequest,
    /// True once a state-mutating step has run; errors after this point
    /// trigger logout.
    pub(crate) cleanup_required: bool,
    pub(crate) device_name: Option<String>,
    pub(crate) new_signing: Option<SigningKeypair>,
}

impl Attempt<'_> {
    async fn execute(&mut self) -> Result<ProvisionOutcome> {
        let family = &self.request.identity.key_family;
        let has_device = family.has_active_device();
        let has_pgp = family.has_pgp();
        tracing::debug!(
            has_device,
            has_pgp,
            class = %self.request.device_class,
            "routing provisioning attempt"
        );

        if has_device {
            let mut devices = family.devices.clone();
            sort_for_choice(&mut devices);
            match self.deps.prompts.choose_device(&devices).await? {
                Some(id) => {
                    let chosen = devices
                        .iter()
                        .find(|d| d.id == id)
                        .ok_or_else(|| {
                            ProvisionError::InvalidArgument(
                                "chosen device is not in the presented list".into(),
                            )
                        })?
                        .clone();
                    tracing::debug!(device = %chosen.id, kind = %chosen.device_type, "device chosen");
                    match chosen.device_type {
                        DeviceType::Paper => self.provision_with_paper().await?,
                        DeviceType::Desktop | DeviceType::Mobile => {
                            self.provision_with_peer(&chosen).await?
                        }
                    }
                }
                None if has_pgp => {
                    tracing::debug!("no device chosen, trying pgp paths");
                    self.pgp_route().await?;
                }
                None => return Err(ProvisionError::ProvisionUnavailable),
            }
        } else if has_pgp {
            self.pgp_route().await?;
        } else {
            self.provision_eldest().await?;
        }

        self.ensure_paper_key().await?;

        let username = self.request.identity.username.clone();
        let device_name = self.device_name.clone().ok_or_else(|| {
            ProvisionError::InvalidArgument("provisioning path finished without a device".into())
        })?;
        self.deps
            .prompts
            .provisionee_success(&username, &device_name)
            .await?;
        Ok(ProvisionOutcome {
            username,
            device_name,
        })
    }

    /// Synced-PGP first; external keyring only on the exact
    /// no-synced-key signal. Any other synced-path error is fatal.
    async fn pgp_route(&mut self) -> Result<()> {
        match self.provision_with_synced_pgp().await {
            Err(ProvisionError::NoSyncedPgpKey) => {
                tracing::debug!("no synced pgp key, falling back to external keyring");
                self.provision_with_gpg().await
            }
            other => other,
        }
    }

    /// Prompt for the account passphrase, honoring the cancel cooldown.
    pub(crate) async fn obtain_passphrase(&mut self) -> Result<String> {
        if self.account.skip_secret_prompt() {
            return Err(ProvisionError::SecretPromptSkipped);
        }
        match self
            .deps
            .prompts
            .prompt_passphrase(&self.request.identity.username)
            .await
        {
            Ok(passphrase) => Ok(passphrase),
            Err(ProvisionError::Canceled) => {
                self.account.record_secret_prompt_canceled();
                Err(ProvisionError::Canceled)
            }
            Err(e) => Err(e),
        }
    }

    /// Passphrase login for paths that need an authenticated session:
    /// establishes the login session and the passphrase stream cache.
    pub(crate) async fn passphrase_login(&mut self) -> Result<String> {
        let username = self.request.identity.username.clone();
        let passphrase = self.obtain_passphrase().await?;
        let outcome = self
            .deps
            .login
            .login_with_passphrase(&username, &passphrase)
            .await?;
        if outcome.uid != self.request.identity.uid {
            return Err(ProvisionError::IdentityMismatch {
                phrase_owner: Some(outcome.uid),
                expected: self.request.identity.uid,
            });
        }

        self.cleanup_required = true;
        let clock = Arc::clone(self.account.clock());
        self.account.set_login_session(LoginSession::new(
            username,
            outcome.uid,
            outcome.salt,
            clock.as_ref(),
        ));
        self.account.create_stream_cache(&passphrase)?;
        Ok(passphrase)
    }

    /// Bounded prompt loop for the new device's display name. Invalid
    /// and duplicate names re-prompt; exhaustion preserves the last
    /// underlying error.
    pub(crate) async fn pick_device_name(&mut self) -> Result<String> {
        let existing = self.request.identity.key_family.device_names_lower();
        let mut last = None;
        for attempt in 1..=DEVICE_NAME_RETRIES {
            let name = self.deps.prompts.prompt_new_device_name(attempt).await?;
            if let Err(e) = check_device_name(&name) {
                tracing::warn!(attempt, error = %e, "rejected device name");
                last = Some(e.into());
                continue;
            }
            if existing.contains(&name.to_lowercase()) {
                tracing::warn!(attempt, name, "device name already taken");
                last = Some(ProvisionError::DeviceAlreadyProvisioned);
                continue;
            }
            return Ok(name);
        }
        Err(ProvisionError::retry_exhausted(last))
    }

    /// Name, mint, register, and adopt a new device keypair. The signer
    /// is `None` only for the eldest bootstrap.
    pub(crate) async fn mint_device_keys(
        &mut self,
        signer: Option<&dyn DeviceSigner>,
        is_eldest: bool,
    ) -> Result<DeviceKeys> {
        let name = self.pick_device_name().await?;
        let device_id = DeviceId::generate();
        // registration mutates the family server-side
        self.cleanup_required = true;
        let keys = self
            .deps
            .keygen
            .generate(DeviceKeyArgs {
                uid: self.request.identity.uid,
                device_id,
                device_name: &name,
                device_type: self.request.device_class.device_type(),
                signer,
                is_eldest,
            })
            .await?;
        self.adopt_device_keys(&keys, device_id, name)?;
        Ok(keys)
    }

    /// Cache the new device keys, seal them into the keyring, and mark
    /// the session provisioned. Requires an LKS context.
    pub(crate) fn adopt_device_keys(
        &mut self,
        keys: &DeviceKeys,
        device_id: DeviceId,
        name: String,
    ) -> Result<()> {
        let uid = self.request.identity.uid;
        self.account
            .cache_secret_key(SecretKeyKind::DeviceSigning, SecretKey::Signing(keys.signing.clone()))?;
        self.account.cache_secret_key(
            SecretKeyKind::DeviceEncryption,
            SecretKey::Encryption(keys.encryption.clone()),
        )?;

        let lks = self.account.lks()?.clone();
        self.account.keyring_mut(uid).insert_device_keys(&lks, keys)?;

        self.account.set_session(Session {
            username: self.request.identity.username.clone(),
            uid,
            device_id,
        });
        self.new_signing = Some(keys.signing.clone());
        self.device_name = Some(name);
        tracing::debug!(device = %device_id, "device provisioned");
        Ok(())
    }

    /// Post-condition of every successful path: the identity holds at
    /// least one paper key, signed by the new device signing key.
    async fn ensure_paper_key(&mut self) -> Result<()> {
        if self.request.identity.key_family.has_paper_device() {
            return Ok(());
        }
        let signing = self.new_signing.clone().ok_or_else(|| {
            ProvisionError::InvalidArgument("no device signing key established".into())
        })?;

        tracing::debug!("identity has no paper key, generating one");
        let phrase = PaperPhrase::generate();
        let paper = PaperKey::derive(&phrase);
        let signer = KeypairSigner::new(signing);
        self.deps
            .keygen
            .register_paper_device(
                self.request.identity.uid,
                &phrase.device_name(),
                &paper,
                &signer,
            )
            .await?;
        self.deps.prompts.show_paper_phrase(&phrase).await?;
        self.account.set_unlocked_paper_key(paper);
        Ok(())
    }
}
