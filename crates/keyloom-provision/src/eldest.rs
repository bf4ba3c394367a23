//! Eldest-device bootstrap.
//!
//! A brand-new identity has no keys at all; the first device's keys
//! become its founding keys and need no external signer. Reaching this
//! path with an eldest key already present is an invariant violation,
//! not a user-facing retry case.

use crate::engine::Attempt;
use crate::error::{ProvisionError, Result};

impl Attempt<'_> {
    pub(crate) async fn provision_eldest(&mut self) -> Result<()> {
        if self.request.identity.eldest_kid.is_some() {
            return Err(ProvisionError::EldestKeyExists);
        }
        tracing::debug!(uid = %self.request.identity.uid, "bootstrapping brand-new identity");

        // the passphrase login gives us the stream for LKS derivation
        self.passphrase_login().await?;
        self.mint_device_keys(None, true).await?;
        Ok(())
    }
}
