//! In-memory identity directory.
//!
//! One mock that stands in for three server-side collaborators:
//! identity resolution, login, and device-key registration. Devices
//! registered through provisioning are visible to later lookups, so
//! round-trip scenarios (provision, log out, re-provision) work.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use keyloom_core::{
    Device, DeviceId, DeviceKeys, DeviceType, Kid, LockedPgpKey, PaperKey, SigningPublicKey, Uid,
    Username,
};
use keyloom_provision::{
    DeviceKeyArgs, DeviceKeyGenerator, DeviceSigner, Identity, IdentityLookup, KeyFamily,
    LoginOutcome, LoginService, PgpKeyRef, ProvisionError,
};

type Result<T> = std::result::Result<T, ProvisionError>;

struct UserRecord {
    uid: Uid,
    username: Username,
    passphrase: String,
    salt: Vec<u8>,
    eldest_kid: Option<Kid>,
    devices: Vec<Device>,
    pgp_keys: Vec<PgpKeyRef>,
    synced_pgp: Option<LockedPgpKey>,
}

struct KidOwner {
    uid: Uid,
    public: SigningPublicKey,
}

#[derive(Default)]
struct State {
    users: HashMap<String, UserRecord>,
    kids: HashMap<Kid, KidOwner>,
}

/// Mock directory + login service + key generator.
#[derive(Default)]
pub struct MockDirectory {
    state: Mutex<State>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with no keys at all.
    pub fn add_user(&self, username: &str, passphrase: &str) -> Uid {
        let username = Username::new(username);
        let uid = Uid::from_bytes(rand::random());
        let mut state = self.state.lock().expect("directory lock");
        state.users.insert(
            username.as_str().to_string(),
            UserRecord {
                uid,
                username,
                passphrase: passphrase.to_string(),
                salt: rand::random::<[u8; 16]>().to_vec(),
                eldest_kid: None,
                devices: Vec::new(),
                pgp_keys: Vec::new(),
                synced_pgp: None,
            },
        );
        uid
    }

    /// The login salt for a user, for building exchange payloads.
    pub fn salt_of(&self, username: &Username) -> Option<Vec<u8>> {
        let state = self.state.lock().expect("directory lock");
        state.users.get(username.as_str()).map(|u| u.salt.clone())
    }

    pub fn uid_of(&self, username: &Username) -> Option<Uid> {
        let state = self.state.lock().expect("directory lock");
        state.users.get(username.as_str()).map(|u| u.uid)
    }

    /// Attach an active PGP key to the user's family, optionally with a
    /// server-synced private half.
    pub fn attach_pgp(
        &self,
        username: &Username,
        key: PgpKeyRef,
        public: SigningPublicKey,
        synced: Option<LockedPgpKey>,
    ) {
        let mut state = self.state.lock().expect("directory lock");
        let user = state
            .users
            .get_mut(username.as_str())
            .expect("unknown user");
        if user.eldest_kid.is_none() {
            user.eldest_kid = Some(key.kid);
        }
        let uid = user.uid;
        user.pgp_keys.push(key);
        if synced.is_some() {
            user.synced_pgp = synced;
        }
        state.kids.insert(key.kid, KidOwner { uid, public });
    }

    /// Register an existing device with its keys (fixture setup for a
    /// user who already has hardware).
    pub fn attach_device(
        &self,
        username: &Username,
        name: &str,
        device_type: DeviceType,
        keys: &DeviceKeys,
    ) -> DeviceId {
        let mut state = self.state.lock().expect("directory lock");
        let user = state
            .users
            .get_mut(username.as_str())
            .expect("unknown user");
        let uid = user.uid;
        let device_id = DeviceId::generate();
        user.devices.push(Device {
            id: device_id,
            name: name.to_string(),
            device_type,
        });
        if user.eldest_kid.is_none() {
            user.eldest_kid = Some(keys.signing.kid());
        }
        Self::index_keys(&mut state, uid, keys);
        device_id
    }

    /// Register a paper key as a paper device (fixture setup).
    pub fn attach_paper(&self, username: &Username, name: &str, paper: &PaperKey) -> DeviceId {
        let mut state = self.state.lock().expect("directory lock");
        let user = state
            .users
            .get_mut(username.as_str())
            .expect("unknown user");
        let uid = user.uid;
        let device_id = DeviceId::generate();
        user.devices.push(Device {
            id: device_id,
            name: name.to_string(),
            device_type: DeviceType::Paper,
        });
        state.kids.insert(
            paper.signing.kid(),
            KidOwner {
                uid,
                public: paper.signing.public_key(),
            },
        );
        device_id
    }

    /// Register a fully formed device record, as the peer side of an
    /// exchange does.
    pub fn register_provisioned_device(
        &self,
        uid: Uid,
        device_id: DeviceId,
        name: &str,
        device_type: DeviceType,
        keys: &DeviceKeys,
    ) -> Result<()> {
        let mut state = self.state.lock().expect("directory lock");
        let user = state
            .users
            .values_mut()
            .find(|u| u.uid == uid)
            .ok_or_else(|| ProvisionError::Lookup("unknown uid".into()))?;
        if Self::name_taken(user, name) {
            return Err(ProvisionError::DeviceAlreadyProvisioned);
        }
        user.devices.push(Device {
            id: device_id,
            name: name.to_string(),
            device_type,
        });
        Self::index_keys(&mut state, uid, keys);
        Ok(())
    }

    fn name_taken(user: &UserRecord, name: &str) -> bool {
        user.devices
            .iter()
            .any(|d| d.name.eq_ignore_ascii_case(name))
    }

    fn index_keys(state: &mut State, uid: Uid, keys: &DeviceKeys) {
        state.kids.insert(
            keys.signing.kid(),
            KidOwner {
                uid,
                public: keys.signing.public_key(),
            },
        );
    }

    /// Index a non-device key (e.g. a PGP key) for owner lookups and
    /// challenge verification.
    pub fn index_signing_kid(&self, uid: Uid, kid: Kid, public: SigningPublicKey) {
        let mut state = self.state.lock().expect("directory lock");
        state.kids.insert(kid, KidOwner { uid, public });
    }

    async fn verify_signer(&self, signer: &dyn DeviceSigner) -> Result<Uid> {
        let challenge: [u8; 32] = rand::random();
        let signature = signer.sign(&challenge).await?;
        let state = self.state.lock().expect("directory lock");
        let owner = state
            .kids
            .get(&signer.kid())
            .ok_or_else(|| ProvisionError::Lookup("signer kid unknown to directory".into()))?;
        owner
            .public
            .verify(&challenge, &signature)
            .map_err(|_| ProvisionError::Lookup("challenge signature invalid".into()))?;
        Ok(owner.uid)
    }
}

#[async_trait]
impl IdentityLookup for MockDirectory {
    async fn resolve(&self, username: &Username) -> Result<Identity> {
        let state = self.state.lock().expect("directory lock");
        let user = state
            .users
            .get(username.as_str())
            .ok_or_else(|| ProvisionError::Lookup(format!("no such user: {username}")))?;
        Ok(Identity {
            uid: user.uid,
            username: user.username.clone(),
            eldest_kid: user.eldest_kid,
            key_family: KeyFamily {
                devices: user.devices.clone(),
                pgp_keys: user.pgp_keys.clone(),
            },
        })
    }

    async fn owner_of_kid(&self, kid: &Kid) -> Result<Option<Uid>> {
        let state = self.state.lock().expect("directory lock");
        Ok(state.kids.get(kid).map(|o| o.uid))
    }
}

#[async_trait]
impl LoginService for MockDirectory {
    async fn login_with_passphrase(
        &self,
        username: &Username,
        passphrase: &str,
    ) -> Result<LoginOutcome> {
        let state = self.state.lock().expect("directory lock");
        let user = state
            .users
            .get(username.as_str())
            .ok_or_else(|| ProvisionError::Lookup(format!("no such user: {username}")))?;
        if user.passphrase != passphrase {
            return Err(ProvisionError::Passphrase);
        }
        Ok(LoginOutcome {
            uid: user.uid,
            salt: user.salt.clone(),
        })
    }

    async fn login_with_key(
        &self,
        username: &Username,
        signer: &dyn DeviceSigner,
    ) -> Result<LoginOutcome> {
        let uid = self.verify_signer(signer).await?;
        let state = self.state.lock().expect("directory lock");
        let user = state
            .users
            .get(username.as_str())
            .ok_or_else(|| ProvisionError::Lookup(format!("no such user: {username}")))?;
        if user.uid != uid {
            return Err(ProvisionError::IdentityMismatch {
                phrase_owner: Some(uid),
                expected: user.uid,
            });
        }
        Ok(LoginOutcome {
            uid,
            salt: user.salt.clone(),
        })
    }

    async fn fetch_synced_pgp_key(&self, uid: Uid) -> Result<Option<LockedPgpKey>> {
        let state = self.state.lock().expect("directory lock");
        let user = state
            .users
            .values()
            .find(|u| u.uid == uid)
            .ok_or_else(|| ProvisionError::Lookup("unknown uid".into()))?;
        Ok(user.synced_pgp.clone())
    }
}

#[async_trait]
impl DeviceKeyGenerator for MockDirectory {
    async fn generate(&self, args: DeviceKeyArgs<'_>) -> Result<DeviceKeys> {
        if args.is_eldest {
            let state = self.state.lock().expect("directory lock");
            let user = state
                .users
                .values()
                .find(|u| u.uid == args.uid)
                .ok_or_else(|| ProvisionError::Lookup("unknown uid".into()))?;
            if user.eldest_kid.is_some() {
                return Err(ProvisionError::EldestKeyExists);
            }
        } else {
            let signer = args
                .signer
                .ok_or_else(|| ProvisionError::InvalidArgument("non-eldest needs a signer".into()))?;
            let owner = self.verify_signer(signer).await?;
            if owner != args.uid {
                return Err(ProvisionError::IdentityMismatch {
                    phrase_owner: Some(owner),
                    expected: args.uid,
                });
            }
        }

        let keys = DeviceKeys::generate();
        {
            let mut state = self.state.lock().expect("directory lock");
            let user = state
                .users
                .values_mut()
                .find(|u| u.uid == args.uid)
                .ok_or_else(|| ProvisionError::Lookup("unknown uid".into()))?;
            if Self::name_taken(user, args.device_name) {
                return Err(ProvisionError::DeviceAlreadyProvisioned);
            }
            user.devices.push(Device {
                id: args.device_id,
                name: args.device_name.to_string(),
                device_type: args.device_type,
            });
            if args.is_eldest {
                user.eldest_kid = Some(keys.signing.kid());
            }
            Self::index_keys(&mut state, args.uid, &keys);
        }
        tracing::debug!(name = args.device_name, "mock directory registered device");
        Ok(keys)
    }

    async fn register_paper_device(
        &self,
        uid: Uid,
        device_name: &str,
        paper: &PaperKey,
        signer: &dyn DeviceSigner,
    ) -> Result<DeviceId> {
        let owner = self.verify_signer(signer).await?;
        if owner != uid {
            return Err(ProvisionError::IdentityMismatch {
                phrase_owner: Some(owner),
                expected: uid,
            });
        }
        let mut state = self.state.lock().expect("directory lock");
        let user = state
            .users
            .values_mut()
            .find(|u| u.uid == uid)
            .ok_or_else(|| ProvisionError::Lookup("unknown uid".into()))?;
        if Self::name_taken(user, device_name) {
            return Err(ProvisionError::DeviceAlreadyProvisioned);
        }
        let device_id = DeviceId::generate();
        user.devices.push(Device {
            id: device_id,
            name: device_name.to_string(),
            device_type: DeviceType::Paper,
        });
        state.kids.insert(
            paper.signing.kid(),
            KidOwner {
                uid,
                public: paper.signing.public_key(),
            },
        );
        Ok(device_id)
    }
}
