//! In-memory login state for one user.
//!
//! `Account` is the single place secret material lives between
//! operations: the stretched passphrase, the LKS context derived from
//! it, unlocked device keys, and (briefly) a paper key. It is not
//! thread-safe on its own; callers serialize access.
//!
//! Coupling invariant: the LKS context is derived from the passphrase
//! stream, so the stream cache and the LKS context are cleared
//! together, never separately.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use keyloom_core::{
    EncryptionKeypair, Lks, PaperKey, PassphraseStream, SigningKeypair, Uid, Username,
};

use crate::clock::Clock;
use crate::error::{AccountError, Result};
use crate::keyring::SecretKeyring;
use crate::session::{LoginSession, Session};
use crate::timed::TimedSecret;

/// How long an unused paper key stays cached in memory.
pub const PAPER_KEY_MEMORY_TIMEOUT: Duration = Duration::from_secs(3600);

/// How long a canceled secret prompt suppresses re-prompting.
pub const SECRET_PROMPT_CANCEL_DURATION: Duration = Duration::from_secs(300);

/// Which cached secret key is being addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKeyKind {
    DeviceSigning,
    DeviceEncryption,
    PaperSigning,
    PaperEncryption,
}

impl SecretKeyKind {
    fn is_device(&self) -> bool {
        matches!(self, Self::DeviceSigning | Self::DeviceEncryption)
    }
}

/// A cached secret key of either flavor.
#[derive(Debug, Clone)]
pub enum SecretKey {
    Signing(SigningKeypair),
    Encryption(EncryptionKeypair),
}

/// All in-memory state for the logged-in (or logging-in) user.
pub struct Account {
    clock: Arc<dyn Clock>,
    login_session: Option<LoginSession>,
    session: Option<Session>,
    stream_cache: Option<PassphraseStream>,
    lks: Option<Lks>,
    device_signing: Option<SigningKeypair>,
    device_encryption: Option<EncryptionKeypair>,
    paper_sig: Option<TimedSecret<SigningKeypair>>,
    paper_enc: Option<TimedSecret<EncryptionKeypair>>,
    secret_prompt_canceled_at: Option<SystemTime>,
    keyring: Option<SecretKeyring>,
}

impl Account {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            login_session: None,
            session: None,
            stream_cache: None,
            lks: None,
            device_signing: None,
            device_encryption: None,
            paper_sig: None,
            paper_enc: None,
            secret_prompt_canceled_at: None,
            keyring: None,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ---- sessions ----

    /// Record a fresh server login session.
    pub fn set_login_session(&mut self, session: LoginSession) {
        self.login_session = Some(session);
    }

    /// The current login session, if it exists and has not timed out.
    pub fn login_session(&self) -> Result<&LoginSession> {
        let session = self.login_session.as_ref().ok_or(AccountError::NotLoggedIn)?;
        if session.expired(self.clock.as_ref()) {
            return Err(AccountError::LoginSessionExpired);
        }
        Ok(session)
    }

    /// Mark this device as provisioned and logged in.
    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// True if a device session is established.
    pub fn logged_in(&self) -> bool {
        self.session.is_some()
    }

    /// The uid of whoever is logged in or logging in.
    pub fn uid(&self) -> Option<Uid> {
        self.session
            .as_ref()
            .map(|s| s.uid)
            .or_else(|| self.login_session.as_ref().map(|s| s.uid()))
    }

    pub fn username(&self) -> Option<&Username> {
        self.session
            .as_ref()
            .map(|s| &s.username)
            .or_else(|| self.login_session.as_ref().map(|s| s.username()))
    }

    /// Make sure in-memory state belongs to `username`.
    ///
    /// Switching users wipes everything first; same user is a no-op.
    /// Returns true if a switch (and logout) happened.
    pub fn ensure_username(&mut self, username: &Username) -> bool {
        match self.username() {
            Some(current) if current == username => false,
            Some(current) => {
                tracing::info!(from = %current, to = %username, "user switch, clearing state");
                self.logout();
                true
            }
            None => false,
        }
    }

    // ---- passphrase stream & LKS ----

    /// Stretch a passphrase against the login session's salt and cache
    /// the stream, deriving the LKS context alongside it.
    pub fn create_stream_cache(&mut self, passphrase: &str) -> Result<()> {
        let session = self.login_session()?;
        let uid = session.uid();
        let stream = PassphraseStream::stretch(passphrase, session.salt());
        self.lks = Some(Lks::from_stream(&stream, uid));
        self.stream_cache = Some(stream);
        Ok(())
    }

    /// Cache a stream obtained from elsewhere (a provisioning peer
    /// hands one over), deriving the LKS context from it.
    pub fn adopt_stream_cache(&mut self, stream: PassphraseStream, uid: Uid) {
        self.lks = Some(Lks::from_stream(&stream, uid));
        self.stream_cache = Some(stream);
    }

    pub fn passphrase_stream(&self) -> Option<&PassphraseStream> {
        self.stream_cache.as_ref()
    }

    /// Drop the cached stream and, with it, the derived LKS context.
    pub fn clear_stream_cache(&mut self) {
        self.stream_cache = None;
        self.lks = None;
    }

    /// Install an LKS context not derived from a passphrase stream
    /// (the paper-key provisioning path).
    pub fn set_lks(&mut self, lks: Lks) {
        self.lks = Some(lks);
    }

    pub fn lks(&self) -> Result<&Lks> {
        self.lks.as_ref().ok_or(AccountError::NoLks)
    }

    // ---- cached device keys ----

    /// Cache an unlocked device key.
    ///
    /// Paper keys have their own timed cache and are rejected here.
    pub fn cache_secret_key(&mut self, kind: SecretKeyKind, key: SecretKey) -> Result<()> {
        if !kind.is_device() {
            return Err(AccountError::InvalidKeyClass(kind));
        }
        match (kind, key) {
            (SecretKeyKind::DeviceSigning, SecretKey::Signing(k)) => {
                self.device_signing = Some(k);
                Ok(())
            }
            (SecretKeyKind::DeviceEncryption, SecretKey::Encryption(k)) => {
                self.device_encryption = Some(k);
                Ok(())
            }
            (kind, _) => Err(AccountError::InvalidKeyClass(kind)),
        }
    }

    /// Fetch a cached device key.
    pub fn cached_secret_key(&self, kind: SecretKeyKind) -> Result<SecretKey> {
        match kind {
            SecretKeyKind::DeviceSigning => self
                .device_signing
                .clone()
                .map(SecretKey::Signing)
                .ok_or(AccountError::NoCachedKey(kind)),
            SecretKeyKind::DeviceEncryption => self
                .device_encryption
                .clone()
                .map(SecretKey::Encryption)
                .ok_or(AccountError::NoCachedKey(kind)),
            _ => Err(AccountError::InvalidKeyClass(kind)),
        }
    }

    // ---- paper key ----

    /// Cache the two halves of an unlocked paper key, each behind its
    /// own idle timeout.
    pub fn set_unlocked_paper_key(&mut self, key: PaperKey) {
        self.paper_sig = Some(TimedSecret::new(key.signing, self.clock.as_ref()));
        self.paper_enc = Some(TimedSecret::new(key.encryption, self.clock.as_ref()));
    }

    /// The cached paper signing key, if still live. Access refreshes
    /// this slot's idle timer only; an expired key is evicted on the
    /// way.
    pub fn unlocked_paper_sig_key(&mut self) -> Option<SigningKeypair> {
        Self::clean_slot(&mut self.paper_sig, self.clock.as_ref());
        let clock = Arc::clone(&self.clock);
        self.paper_sig
            .as_mut()
            .map(|t| t.get(clock.as_ref()).clone())
    }

    /// The cached paper encryption key, if still live. Same timing
    /// rules as the signing slot, tracked independently.
    pub fn unlocked_paper_enc_key(&mut self) -> Option<EncryptionKeypair> {
        Self::clean_slot(&mut self.paper_enc, self.clock.as_ref());
        let clock = Arc::clone(&self.clock);
        self.paper_enc
            .as_mut()
            .map(|t| t.get(clock.as_ref()).clone())
    }

    fn clean_slot<K>(slot: &mut Option<TimedSecret<K>>, clock: &dyn Clock) {
        let expired = slot
            .as_ref()
            .is_some_and(|t| t.expired(clock, PAPER_KEY_MEMORY_TIMEOUT));
        if expired {
            tracing::debug!("paper key slot idle timeout, evicting");
            *slot = None;
        }
    }

    /// Evict any cached secrets past their deadlines. Safe to call at
    /// any time; normal accessors also expire lazily.
    pub fn sweep_expired(&mut self) {
        Self::clean_slot(&mut self.paper_sig, self.clock.as_ref());
        Self::clean_slot(&mut self.paper_enc, self.clock.as_ref());
        if self
            .login_session
            .as_ref()
            .is_some_and(|s| s.expired(self.clock.as_ref()))
        {
            self.login_session = None;
        }
        if !self.skip_secret_prompt() {
            self.secret_prompt_canceled_at = None;
        }
    }

    // ---- secret prompt cooldown ----

    /// Record that the user canceled a secret prompt; callers should
    /// not re-prompt for [`SECRET_PROMPT_CANCEL_DURATION`].
    pub fn record_secret_prompt_canceled(&mut self) {
        self.secret_prompt_canceled_at = Some(self.clock.now());
    }

    /// True while the cancel cooldown is in effect.
    pub fn skip_secret_prompt(&self) -> bool {
        self.secret_prompt_canceled_at.is_some_and(|at| {
            self.clock
                .now()
                .duration_since(at)
                .map(|elapsed| elapsed < SECRET_PROMPT_CANCEL_DURATION)
                .unwrap_or(true)
        })
    }

    // ---- keyring ----

    /// Attach the local keyring for a user. Replaces any keyring for a
    /// different user.
    pub fn init_keyring(&mut self, keyring: SecretKeyring) {
        self.keyring = Some(keyring);
    }

    /// The local keyring, creating an empty one for `uid` on first use.
    pub fn keyring_mut(&mut self, uid: Uid) -> &mut SecretKeyring {
        if self.keyring.as_ref().is_some_and(|k| k.uid() != uid) {
            self.keyring = None;
        }
        self.keyring.get_or_insert_with(|| SecretKeyring::new(uid))
    }

    pub fn keyring(&self) -> Option<&SecretKeyring> {
        self.keyring.as_ref()
    }

    // ---- teardown ----

    /// Wipe all in-memory secret state, including the keyring handle.
    /// The sealed entries are useless without the LKS context anyway.
    pub fn logout(&mut self) {
        tracing::info!("clearing account state");
        self.login_session = None;
        self.session = None;
        self.clear_stream_cache();
        self.device_signing = None;
        self.device_encryption = None;
        self.paper_sig = None;
        self.paper_enc = None;
        self.secret_prompt_canceled_at = None;
        self.keyring = None;
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("logged_in", &self.logged_in())
            .field("username", &self.username())
            .field("has_stream", &self.stream_cache.is_some())
            .field("has_lks", &self.lks.is_some())
            .field(
                "has_paper_key",
                &(self.paper_sig.is_some() || self.paper_enc.is_some()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use keyloom_core::{DeviceId, PaperPhrase};

    fn manual_account() -> (Account, ManualClock) {
        let clock = ManualClock::new();
        let account = Account::new(Arc::new(clock.clone()));
        (account, clock)
    }

    fn login(account: &mut Account, clock: &ManualClock, name: &str) {
        account.set_login_session(LoginSession::new(
            Username::new(name),
            Uid::from_bytes([9; 16]),
            b"salt".to_vec(),
            clock,
        ));
    }

    #[test]
    fn test_stream_cache_and_lks_cleared_together() {
        let (mut account, clock) = manual_account();
        login(&mut account, &clock, "alice");
        account.create_stream_cache("hunter2").unwrap();
        assert!(account.passphrase_stream().is_some());
        assert!(account.lks().is_ok());

        account.clear_stream_cache();
        assert!(account.passphrase_stream().is_none());
        assert!(matches!(account.lks(), Err(AccountError::NoLks)));
    }

    #[test]
    fn test_paper_key_kinds_rejected() {
        let (mut account, _clock) = manual_account();
        let err = account
            .cache_secret_key(
                SecretKeyKind::PaperSigning,
                SecretKey::Signing(SigningKeypair::generate()),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            AccountError::InvalidKeyClass(SecretKeyKind::PaperSigning)
        ));
    }

    #[test]
    fn test_kind_and_variant_must_agree() {
        let (mut account, _clock) = manual_account();
        let err = account
            .cache_secret_key(
                SecretKeyKind::DeviceSigning,
                SecretKey::Encryption(EncryptionKeypair::generate()),
            )
            .unwrap_err();
        assert!(matches!(err, AccountError::InvalidKeyClass(_)));
    }

    #[test]
    fn test_paper_key_expires_when_idle() {
        let (mut account, clock) = manual_account();
        account.set_unlocked_paper_key(PaperKey::derive(&PaperPhrase::generate()));

        clock.advance(Duration::from_secs(3000));
        assert!(account.unlocked_paper_sig_key().is_some());

        // access above refreshed the timer
        clock.advance(Duration::from_secs(3000));
        assert!(account.unlocked_paper_sig_key().is_some());

        clock.advance(PAPER_KEY_MEMORY_TIMEOUT + Duration::from_secs(1));
        assert!(account.unlocked_paper_sig_key().is_none());
    }

    #[test]
    fn test_paper_slots_time_out_independently() {
        let (mut account, clock) = manual_account();
        account.set_unlocked_paper_key(PaperKey::derive(&PaperPhrase::generate()));

        // keep the signing half warm, never touch the encryption half
        clock.advance(Duration::from_secs(3000));
        assert!(account.unlocked_paper_sig_key().is_some());
        clock.advance(Duration::from_secs(3000));

        assert!(account.unlocked_paper_sig_key().is_some());
        assert!(account.unlocked_paper_enc_key().is_none());
    }

    #[test]
    fn test_secret_prompt_cooldown() {
        let (mut account, clock) = manual_account();
        assert!(!account.skip_secret_prompt());

        account.record_secret_prompt_canceled();
        assert!(account.skip_secret_prompt());

        clock.advance(Duration::from_secs(299));
        assert!(account.skip_secret_prompt());
        clock.advance(Duration::from_secs(1));
        assert!(!account.skip_secret_prompt());
    }

    #[test]
    fn test_login_session_timeout_surfaces() {
        let (mut account, clock) = manual_account();
        login(&mut account, &clock, "alice");
        assert!(account.login_session().is_ok());

        clock.advance(Duration::from_secs(3600));
        assert!(matches!(
            account.login_session(),
            Err(AccountError::LoginSessionExpired)
        ));
    }

    #[test]
    fn test_logout_clears_everything() {
        let (mut account, clock) = manual_account();
        login(&mut account, &clock, "alice");
        account.create_stream_cache("hunter2").unwrap();
        account.set_unlocked_paper_key(PaperKey::derive(&PaperPhrase::generate()));
        account
            .cache_secret_key(
                SecretKeyKind::DeviceSigning,
                SecretKey::Signing(SigningKeypair::generate()),
            )
            .unwrap();
        account.record_secret_prompt_canceled();
        let uid = Uid::from_bytes([9; 16]);
        account.keyring_mut(uid);

        account.logout();

        assert!(!account.logged_in());
        assert!(account.passphrase_stream().is_none());
        assert!(account.lks().is_err());
        assert!(account.unlocked_paper_sig_key().is_none());
        assert!(account.unlocked_paper_enc_key().is_none());
        assert!(account
            .cached_secret_key(SecretKeyKind::DeviceSigning)
            .is_err());
        assert!(!account.skip_secret_prompt());
        assert!(account.keyring().is_none());
    }

    #[test]
    fn test_ensure_username_switch_wipes_state() {
        let (mut account, clock) = manual_account();
        login(&mut account, &clock, "alice");
        account.create_stream_cache("hunter2").unwrap();

        assert!(!account.ensure_username(&Username::new("alice")));
        assert!(account.passphrase_stream().is_some());

        assert!(account.ensure_username(&Username::new("bob")));
        assert!(account.passphrase_stream().is_none());
        assert!(account.username().is_none());
    }

    #[test]
    fn test_session_answers_uid() {
        let (mut account, _clock) = manual_account();
        let uid = Uid::from_bytes([7; 16]);
        account.set_session(Session {
            username: Username::new("alice"),
            uid,
            device_id: DeviceId::generate(),
        });
        assert!(account.logged_in());
        assert_eq!(account.uid(), Some(uid));
    }
}
