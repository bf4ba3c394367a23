//! Login and device sessions.

use std::time::{Duration, SystemTime};

use keyloom_core::{DeviceId, Uid, Username};

use crate::clock::Clock;

/// How long a pre-provisioning login session stays usable.
pub const LOGIN_SESSION_TIMEOUT: Duration = Duration::from_secs(3600);

/// A short-lived server login session, established by passphrase or
/// key-backed login before the device itself is provisioned.
///
/// Carries the login salt so the passphrase stream can be re-stretched
/// without another round trip.
#[derive(Debug, Clone)]
pub struct LoginSession {
    username: Username,
    uid: Uid,
    salt: Vec<u8>,
    created: SystemTime,
}

impl LoginSession {
    pub fn new(username: Username, uid: Uid, salt: Vec<u8>, clock: &dyn Clock) -> Self {
        Self {
            username,
            uid,
            salt,
            created: clock.now(),
        }
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// True once the session has outlived [`LOGIN_SESSION_TIMEOUT`].
    pub fn expired(&self, clock: &dyn Clock) -> bool {
        match clock.now().duration_since(self.created) {
            Ok(age) => age >= LOGIN_SESSION_TIMEOUT,
            Err(_) => false,
        }
    }
}

/// An established device session: this account is provisioned and
/// logged in as a specific device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: Username,
    pub uid: Uid,
    pub device_id: DeviceId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_login_session_expiry() {
        let clock = ManualClock::new();
        let session = LoginSession::new(
            Username::new("alice"),
            Uid::from_bytes([1; 16]),
            b"salt".to_vec(),
            &clock,
        );
        assert!(!session.expired(&clock));
        clock.advance(Duration::from_secs(3599));
        assert!(!session.expired(&clock));
        clock.advance(Duration::from_secs(1));
        assert!(session.expired(&clock));
    }
}
