//! The single-owner provisioning handle.
//!
//! Session state must never be mutated by two flows at once, so the
//! account lives behind one async mutex held for the whole attempt.
//! There are no ambient globals; everything reaches the engine through
//! this handle.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use keyloom_account::{Account, SystemClock};
use keyloom_core::{ClientKind, DeviceClass, Username};
use keyloom_provision::{
    EngineDeps, IdentityLookup, ProvisionEngine, ProvisionError, ProvisionOutcome,
    ProvisionRequest,
};

/// Serialized entry point for device provisioning.
pub struct Provisioner {
    account: Mutex<Account>,
    engine: ProvisionEngine,
    lookup: Arc<dyn IdentityLookup>,
}

impl Provisioner {
    /// Wire up a provisioner with a fresh account on the system clock.
    pub fn new(deps: EngineDeps) -> Self {
        Self::with_account(deps, Account::new(Arc::new(SystemClock)))
    }

    /// Wire up a provisioner around an existing account (tests inject
    /// one driven by a manual clock).
    pub fn with_account(deps: EngineDeps, account: Account) -> Self {
        let lookup = Arc::clone(&deps.lookup);
        Self {
            account: Mutex::new(account),
            engine: ProvisionEngine::new(deps),
            lookup,
        }
    }

    /// Provision this device for `username`.
    ///
    /// `device_class` must be `"desktop"` or `"mobile"`; anything else
    /// is `InvalidArgument` before any state is touched. The account is
    /// locked for the whole attempt, serializing concurrent callers.
    pub async fn provision(
        &self,
        device_class: &str,
        client_kind: ClientKind,
        username: &str,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let class = DeviceClass::parse(device_class).ok_or_else(|| {
            ProvisionError::InvalidArgument(format!(
                "device class must be desktop or mobile, got {device_class:?}"
            ))
        })?;
        let username = Username::new(username);
        if username.is_empty() {
            return Err(ProvisionError::InvalidArgument("empty username".into()));
        }

        let mut account = self.account.lock().await;
        if account.logged_in() {
            return Err(ProvisionError::DeviceAlreadyProvisioned);
        }

        let identity = self.lookup.resolve(&username).await?;
        tracing::debug!(user = %identity.username, class = %class, "starting provisioning");
        let request = ProvisionRequest {
            device_class: class,
            client_kind,
            identity,
        };
        self.engine.run(&mut account, &request).await
    }

    /// Wipe all in-memory session state.
    pub async fn logout(&self) {
        self.account.lock().await.logout();
    }

    /// Direct access to the account, for inspection and tests.
    pub async fn account(&self) -> MutexGuard<'_, Account> {
        self.account.lock().await
    }
}
