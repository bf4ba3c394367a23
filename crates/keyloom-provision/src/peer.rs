//! Peer-device exchange path.
//!
//! A fresh exchange secret and device id are generated locally, then
//! two activities run concurrently: the provisionee protocol over the
//! secure channel, and the UI that displays our secret while accepting
//! one typed back from the peer. Either side can finish the exchange;
//! the engine joins both before proceeding. Cancellation propagates in
//! both directions, so neither future is ever orphaned.

use tokio::sync::{mpsc, watch};

use keyloom_core::Device;

use crate::channel::{ExchangeSecret, PendingDevice};
use crate::engine::Attempt;
use crate::error::{ProvisionError, Result};

impl Attempt<'_> {
    pub(crate) async fn provision_with_peer(&mut self, chosen: &Device) -> Result<()> {
        let name = self.pick_device_name().await?;
        let secret = ExchangeSecret::generate();
        let device_id = keyloom_core::DeviceId::generate();
        let pending = PendingDevice {
            device_id,
            device_name: name.clone(),
            device_type: self.request.device_class.device_type(),
            peer_device_id: chosen.id,
        };

        let (secret_tx, secret_rx) = mpsc::channel(1);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // the peer registers our keys during the exchange
        self.cleanup_required = true;

        let channel = std::sync::Arc::clone(&self.deps.channel);
        let our_secret = secret.clone();
        let provisionee_cancel = cancel_rx.clone();
        let mut provisionee = tokio::spawn(async move {
            channel
                .provisionee(pending, our_secret, secret_rx, provisionee_cancel)
                .await
        });

        let prompts = std::sync::Arc::clone(&self.deps.prompts);
        let mut ui = tokio::spawn(async move {
            prompts.display_and_prompt_secret(&secret, cancel_rx).await
        });

        let mut ui_open = true;
        let payload = loop {
            tokio::select! {
                ui_res = &mut ui, if ui_open => {
                    ui_open = false;
                    match flatten(ui_res) {
                        // user transcribed the peer's secret
                        Ok(Some(typed)) => {
                            let _ = secret_tx.send(typed).await;
                        }
                        // display dismissed: the peer is transcribing ours
                        Ok(None) => {}
                        Err(err) => {
                            tracing::warn!(error = %err, "secret display canceled, stopping exchange");
                            let _ = cancel_tx.send(true);
                            let joined = flatten_payload(provisionee.await);
                            return Err(match joined {
                                Err(e) => e,
                                Ok(_) => err,
                            });
                        }
                    }
                }
                prov_res = &mut provisionee => {
                    let payload = flatten_payload(prov_res);
                    // exchange settled; release the UI if still showing
                    let _ = cancel_tx.send(true);
                    if ui_open {
                        let _ = ui.await;
                    }
                    break payload?;
                }
            }
        };

        if payload.uid != self.request.identity.uid {
            return Err(ProvisionError::IdentityMismatch {
                phrase_owner: Some(payload.uid),
                expected: self.request.identity.uid,
            });
        }

        self.account.adopt_stream_cache(payload.stream, payload.uid);
        self.adopt_device_keys(&payload.keys, device_id, name)?;
        Ok(())
    }
}

fn flatten(
    joined: std::result::Result<Result<Option<ExchangeSecret>>, tokio::task::JoinError>,
) -> Result<Option<ExchangeSecret>> {
    joined.map_err(|e| ProvisionError::Transport(e.to_string()))?
}

fn flatten_payload(
    joined: std::result::Result<Result<crate::channel::ProvisioneePayload>, tokio::task::JoinError>,
) -> Result<crate::channel::ProvisioneePayload> {
    joined.map_err(|e| ProvisionError::Transport(e.to_string()))?
}
