//! Paper-key provisioning path.
//!
//! The user types a paper phrase; the derived signing key's KID is
//! resolved through the directory and must belong to the target
//! identity. A syntactically valid phrase owned by someone else never
//! provisions a device. Bad phrases and mismatches re-prompt, bounded
//! at [`PAPER_KEY_RETRIES`] attempts, preserving the last error.

use keyloom_core::{Lks, PaperKey, PaperPhrase};

use crate::engine::{Attempt, PAPER_KEY_RETRIES};
use crate::error::{ProvisionError, Result};
use crate::signer::KeypairSigner;

impl Attempt<'_> {
    pub(crate) async fn provision_with_paper(&mut self) -> Result<()> {
        let paper = self.prompt_matching_paper_key().await?;
        self.finish_with_paper(paper).await
    }

    async fn prompt_matching_paper_key(&mut self) -> Result<PaperKey> {
        let expected = self.request.identity.uid;
        let mut last = None;
        for attempt in 1..=PAPER_KEY_RETRIES {
            let raw = self.deps.prompts.prompt_paper_phrase(attempt).await?;
            let phrase = match PaperPhrase::new(&raw) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "unusable paper phrase");
                    last = Some(e.into());
                    continue;
                }
            };
            let paper = PaperKey::derive(&phrase);
            match self.deps.lookup.owner_of_kid(&paper.signing.kid()).await {
                Ok(Some(uid)) if uid == expected => return Ok(paper),
                Ok(owner) => {
                    tracing::warn!(attempt, ?owner, "paper key does not belong to this identity");
                    last = Some(ProvisionError::IdentityMismatch {
                        phrase_owner: owner,
                        expected,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "paper key owner lookup failed");
                    last = Some(e);
                }
            }
        }
        Err(ProvisionError::retry_exhausted(last))
    }

    async fn finish_with_paper(&mut self, paper: PaperKey) -> Result<()> {
        let identity = &self.request.identity;

        let signer = KeypairSigner::new(paper.signing.clone());
        let outcome = self
            .deps
            .login
            .login_with_key(&identity.username, &signer)
            .await?;

        self.cleanup_required = true;
        let clock = std::sync::Arc::clone(self.account.clock());
        self.account.set_login_session(keyloom_account::LoginSession::new(
            identity.username.clone(),
            outcome.uid,
            outcome.salt,
            clock.as_ref(),
        ));

        // no passphrase stream on this path: LKS comes from the paper
        // encryption key
        self.account
            .set_lks(Lks::from_encryption_key(&paper.encryption, identity.uid));
        self.account.set_unlocked_paper_key(paper.clone());

        self.mint_device_keys(Some(&signer), false).await?;
        Ok(())
    }
}
