//! Queue-driven prompt sink.
//!
//! Each prompt kind pops from its own script queue; an empty queue
//! behaves as a user cancel. Success reports and displayed paper
//! phrases are recorded for assertions.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::watch;

use keyloom_core::{Device, DeviceId, PaperPhrase, PgpFingerprint, Username};
use keyloom_provision::{
    ExchangeSecret, GpgKeyInfo, GpgMethod, PromptSink, ProvisionError,
};

type Result<T> = std::result::Result<T, ProvisionError>;

/// Scripted behavior for the exchange-secret display.
pub enum SecretScript {
    /// The user types the peer's secret.
    Type(ExchangeSecret),
    /// The user dismisses the display; the peer transcribes ours.
    Dismiss,
    /// The user cancels the whole exchange.
    Cancel,
}

#[derive(Default)]
struct Scripts {
    device_choices: VecDeque<Option<DeviceId>>,
    device_names: VecDeque<String>,
    paper_phrases: VecDeque<String>,
    passphrases: VecDeque<Option<String>>,
    secrets: VecDeque<SecretScript>,
    gpg_methods: VecDeque<GpgMethod>,
    gpg_selections: VecDeque<PgpFingerprint>,
    sign_fallbacks: VecDeque<bool>,
}

#[derive(Default)]
struct Recorded {
    successes: Vec<(Username, String)>,
    shown_phrases: Vec<String>,
    devices_offered: Vec<Vec<String>>,
}

/// A [`PromptSink`] driven entirely by pre-loaded answers.
#[derive(Default)]
pub struct ScriptedPrompts {
    scripts: Mutex<Scripts>,
    recorded: Mutex<Recorded>,
}

impl ScriptedPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_device_choice(&self, choice: Option<DeviceId>) -> &Self {
        self.scripts
            .lock()
            .expect("prompt lock")
            .device_choices
            .push_back(choice);
        self
    }

    pub fn script_device_name(&self, name: &str) -> &Self {
        self.scripts
            .lock()
            .expect("prompt lock")
            .device_names
            .push_back(name.to_string());
        self
    }

    pub fn script_paper_phrase(&self, phrase: &str) -> &Self {
        self.scripts
            .lock()
            .expect("prompt lock")
            .paper_phrases
            .push_back(phrase.to_string());
        self
    }

    pub fn script_passphrase(&self, passphrase: &str) -> &Self {
        self.scripts
            .lock()
            .expect("prompt lock")
            .passphrases
            .push_back(Some(passphrase.to_string()));
        self
    }

    /// The next passphrase prompt is canceled by the user.
    pub fn script_passphrase_cancel(&self) -> &Self {
        self.scripts
            .lock()
            .expect("prompt lock")
            .passphrases
            .push_back(None);
        self
    }

    pub fn script_secret(&self, behavior: SecretScript) -> &Self {
        self.scripts
            .lock()
            .expect("prompt lock")
            .secrets
            .push_back(behavior);
        self
    }

    pub fn script_gpg_method(&self, method: GpgMethod) -> &Self {
        self.scripts
            .lock()
            .expect("prompt lock")
            .gpg_methods
            .push_back(method);
        self
    }

    pub fn script_gpg_selection(&self, fingerprint: PgpFingerprint) -> &Self {
        self.scripts
            .lock()
            .expect("prompt lock")
            .gpg_selections
            .push_back(fingerprint);
        self
    }

    pub fn script_sign_fallback(&self, accept: bool) -> &Self {
        self.scripts
            .lock()
            .expect("prompt lock")
            .sign_fallbacks
            .push_back(accept);
        self
    }

    /// `(username, device_name)` pairs reported as successes.
    pub fn successes(&self) -> Vec<(Username, String)> {
        self.recorded.lock().expect("prompt lock").successes.clone()
    }

    /// Paper phrases displayed to the user, oldest first.
    pub fn shown_phrases(&self) -> Vec<String> {
        self.recorded
            .lock()
            .expect("prompt lock")
            .shown_phrases
            .clone()
    }

    /// Device-name lists offered by `choose_device`, per call.
    pub fn devices_offered(&self) -> Vec<Vec<String>> {
        self.recorded
            .lock()
            .expect("prompt lock")
            .devices_offered
            .clone()
    }

    fn pop<T>(&self, pick: impl FnOnce(&mut Scripts) -> Option<T>) -> Result<T> {
        pick(&mut self.scripts.lock().expect("prompt lock")).ok_or(ProvisionError::Canceled)
    }
}

#[async_trait]
impl PromptSink for ScriptedPrompts {
    async fn choose_device(&self, devices: &[Device]) -> Result<Option<DeviceId>> {
        self.recorded
            .lock()
            .expect("prompt lock")
            .devices_offered
            .push(devices.iter().map(|d| d.name.clone()).collect());
        self.pop(|s| s.device_choices.pop_front())
    }

    async fn prompt_new_device_name(&self, _attempt: u32) -> Result<String> {
        self.pop(|s| s.device_names.pop_front())
    }

    async fn prompt_paper_phrase(&self, _attempt: u32) -> Result<String> {
        self.pop(|s| s.paper_phrases.pop_front())
    }

    async fn prompt_passphrase(&self, _username: &Username) -> Result<String> {
        self.pop(|s| s.passphrases.pop_front())?
            .ok_or(ProvisionError::Canceled)
    }

    async fn display_and_prompt_secret(
        &self,
        _ours: &ExchangeSecret,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Option<ExchangeSecret>> {
        let script = self
            .scripts
            .lock()
            .expect("prompt lock")
            .secrets
            .pop_front();
        match script {
            Some(SecretScript::Type(secret)) => Ok(Some(secret)),
            Some(SecretScript::Dismiss) => Ok(None),
            Some(SecretScript::Cancel) => Err(ProvisionError::Canceled),
            // display stays open until the engine tears it down
            None => {
                let _ = cancel.wait_for(|c| *c).await;
                Ok(None)
            }
        }
    }

    async fn choose_gpg_method(&self, _keys: &[GpgKeyInfo]) -> Result<GpgMethod> {
        self.pop(|s| s.gpg_methods.pop_front())
    }

    async fn select_gpg_key(&self, _keys: &[GpgKeyInfo]) -> Result<PgpFingerprint> {
        self.pop(|s| s.gpg_selections.pop_front())
    }

    async fn confirm_gpg_sign_fallback(&self, _import_error: &str) -> Result<bool> {
        self.pop(|s| s.sign_fallbacks.pop_front())
    }

    async fn show_paper_phrase(&self, phrase: &PaperPhrase) -> Result<()> {
        self.recorded
            .lock()
            .expect("prompt lock")
            .shown_phrases
            .push(phrase.as_str().to_string());
        Ok(())
    }

    async fn provisionee_success(&self, username: &Username, device_name: &str) -> Result<()> {
        self.recorded
            .lock()
            .expect("prompt lock")
            .successes
            .push((username.clone(), device_name.to_string()));
        Ok(())
    }
}
