//! Synced-PGP-key path.
//!
//! The synced private key lives server-side and can only be fetched
//! after a passphrase login. Absence of a synced key is the one error
//! the engine converts into a fallback route; a failed unlock is a
//! plain passphrase error and terminal.

use crate::engine::Attempt;
use crate::error::{ProvisionError, Result};

impl Attempt<'_> {
    pub(crate) async fn provision_with_synced_pgp(&mut self) -> Result<()> {
        let passphrase = self.passphrase_login().await?;
        let uid = self.request.identity.uid;

        let locked = self
            .deps
            .login
            .fetch_synced_pgp_key(uid)
            .await?
            .ok_or(ProvisionError::NoSyncedPgpKey)?;
        tracing::debug!(fingerprint = %locked.fingerprint(), "unlocking synced pgp key");

        let unlocked = locked
            .unlock(&passphrase)
            .map_err(|_| ProvisionError::Passphrase)?;

        self.mint_device_keys(Some(&unlocked), false).await?;
        Ok(())
    }
}
