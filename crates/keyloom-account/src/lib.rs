//! # Keyloom Account
//!
//! In-memory login state: sessions, the passphrase stream cache, the
//! LKS context, cached device keys, and the timed paper-key cache.
//!
//! The [`Account`] owns all transient secret material for one user.
//! [`Account::logout`] is the single teardown primitive; anything that
//! needs to roll back partial login state calls it.
//!
//! Time-dependent behavior (paper-key idle expiry, prompt-cancel
//! cooldown, login-session timeout) runs against a [`Clock`] so tests
//! can drive it deterministically.

pub mod account;
pub mod clock;
pub mod error;
pub mod keyring;
pub mod session;
pub mod timed;

pub use account::{
    Account, SecretKey, SecretKeyKind, PAPER_KEY_MEMORY_TIMEOUT, SECRET_PROMPT_CANCEL_DURATION,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AccountError;
pub use keyring::{EntryKind, SecretKeyring};
pub use session::{LoginSession, Session, LOGIN_SESSION_TIMEOUT};
pub use timed::TimedSecret;
