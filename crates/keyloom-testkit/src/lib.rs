//! # Keyloom Testkit
//!
//! Test doubles for every collaborator seam the provisioning engine
//! uses, plus bundled fixtures. The mock directory keeps registered
//! devices visible across attempts, so multi-step scenarios (provision,
//! log out, re-provision from the new paper key) run end to end with no
//! network and no terminal.

pub mod directory;
pub mod fixtures;
pub mod gpg;
pub mod prompts;

pub use directory::MockDirectory;
pub use fixtures::{dead_channel, peer_channel, pgp_material, PgpMaterial, TestWorld};
pub use gpg::MockGpg;
pub use prompts::{ScriptedPrompts, SecretScript};
