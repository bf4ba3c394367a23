//! External-keyring (GPG) path.
//!
//! Reached only as the fallback from the synced-key path, so a login
//! session and passphrase stream already exist. The local keyring must
//! hold a private key the identity recognizes; the user then either
//! imports it into local custody or leaves it in place and uses the
//! tool as a signing oracle. An import failure offers a one-way switch
//! to the sign method; declining fails the attempt.

use std::sync::Arc;

use keyloom_core::PgpFingerprint;

use crate::engine::Attempt;
use crate::error::{ProvisionError, Result};
use crate::identity::{GpgKeyInfo, GpgMethod};
use crate::signer::{DeviceSigner, GpgOracleSigner};

impl Attempt<'_> {
    pub(crate) async fn provision_with_gpg(&mut self) -> Result<()> {
        let family = &self.request.identity.key_family;

        let local = self.deps.gpg.index_private_keys().await?;
        let wanted = family.pgp_fingerprints();
        let matching: Vec<GpgKeyInfo> = local
            .into_iter()
            .filter(|k| wanted.contains(&k.fingerprint))
            .collect();
        if matching.is_empty() {
            return Err(ProvisionError::NoMatchingGpgKeys {
                fingerprints: wanted,
                has_active_device: family.has_active_device(),
            });
        }

        let fingerprint = if matching.len() == 1 {
            matching[0].fingerprint
        } else {
            self.deps.prompts.select_gpg_key(&matching).await?
        };
        let method = self.deps.prompts.choose_gpg_method(&matching).await?;
        tracing::debug!(%fingerprint, ?method, "external keyring key selected");

        let signer: Box<dyn DeviceSigner> = match method {
            GpgMethod::Import => match self.deps.gpg.import_key(&fingerprint).await {
                Ok(unlocked) => {
                    // persist the imported key so later signs skip the tool
                    let lks = self.account.lks()?.clone();
                    self.account
                        .keyring_mut(self.request.identity.uid)
                        .insert_pgp_key(&lks, &unlocked)?;
                    Box::new(unlocked)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "gpg import failed, offering sign fallback");
                    let import_error = err.to_string();
                    if !self
                        .deps
                        .prompts
                        .confirm_gpg_sign_fallback(&import_error)
                        .await?
                    {
                        return Err(ProvisionError::GpgImportRefused { import_error });
                    }
                    self.oracle_signer(&fingerprint)?
                }
            },
            GpgMethod::Sign => self.oracle_signer(&fingerprint)?,
        };

        self.mint_device_keys(Some(signer.as_ref()), false).await?;
        Ok(())
    }

    fn oracle_signer(&self, fingerprint: &PgpFingerprint) -> Result<Box<dyn DeviceSigner>> {
        let kid = self
            .request
            .identity
            .key_family
            .kid_for_fingerprint(fingerprint)
            .ok_or_else(|| {
                ProvisionError::Lookup(format!("no kid registered for fingerprint {fingerprint}"))
            })?;
        Ok(Box::new(GpgOracleSigner::new(
            Arc::clone(&self.deps.gpg),
            *fingerprint,
            kid,
        )))
    }
}
