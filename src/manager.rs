//! Hosted event dispatcher.
//!
//! Feeds radio events and trigger activations into one [`Gateway`] at a
//! time. When the core suspends, the retained region is stored, the radio
//! goes quiet and the manager waits for whichever wake source fires first,
//! then boots a fresh core with that cause.

use anyhow::bail;
use btleplug::platform::Adapter;
use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::sync::mpsc;

use crate::gateway::{Gateway, GatewaySettings};
use crate::hal::{CommandRadio, LogIndicator, SleepLatch};
use crate::messages::{Activation, RadioCommand, WakeCause};
use crate::retained::{FileRetainedStore, RetainedState, RetainedStore};
use crate::scanner::Scanner;

pub struct Manager {
    adapter: Adapter,
    settings: GatewaySettings,
    store: FileRetainedStore,
}

/// Reads activations (`short`, `medium`, `long`) from stdin, one per line.
async fn read_activations(tx: mpsc::UnboundedSender<Activation>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match line.parse::<Activation>() {
                Ok(activation) => {
                    if tx.send(activation).is_err() {
                        break;
                    }
                }
                Err(err) => warn!("Ignoring trigger input: {err}"),
            },
            Ok(None) => {
                debug!("Trigger input closed");
                break;
            }
            Err(err) => {
                error!("Error reading trigger input: {err:?}");
                break;
            }
        }
    }
}

impl Manager {
    pub fn new(adapter: Adapter, settings: GatewaySettings, store: FileRetainedStore) -> Self {
        Manager {
            adapter,
            settings,
            store,
        }
    }

    fn load_retained(&self) -> RetainedState {
        match self.store.load() {
            Ok(Some(retained)) => retained,
            Ok(None) => {
                info!("Nothing retained at {}, cold boot", self.store.path().display());
                RetainedState::default()
            }
            Err(err) => {
                warn!("Discarding retained region: {err}");
                RetainedState::default()
            }
        }
    }

    pub async fn run_loop(mut self, first_wake: WakeCause) -> anyhow::Result<()> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (trigger_tx, mut trigger_rx) = mpsc::unbounded_channel();

        let scanner = Scanner::new(self.adapter.clone(), command_rx, event_tx);
        let radio_handle = tokio::spawn(async move {
            if let Err(err) = scanner.run().await {
                error!("Error handling BTLE events: {err:?}");
            }
            debug!("Done handling BTLE events");
        });
        tokio::spawn(read_activations(trigger_tx));

        let mut retained = self.load_retained();
        let mut cause = first_wake;
        let mut pending: Option<Activation> = None;
        let mut triggers_open = true;

        loop {
            // the dispatcher is halted while asleep, anything queued is stale
            while let Ok(event) = event_rx.try_recv() {
                debug!("Dropping {event:?} received while asleep");
            }

            let mut gateway = Gateway::boot(
                retained,
                &self.settings,
                CommandRadio::new(command_tx.clone()),
                LogIndicator,
                SleepLatch::default(),
            )?;
            gateway.wake(cause);
            if let Some(activation) = pending.take() {
                gateway.handle_activation(activation);
            }

            while !gateway.is_suspended() {
                tokio::select! {
                    event = event_rx.recv() => match event {
                        Some(event) => {
                            let disposition = gateway.handle_radio_event(event);
                            debug!("{disposition:?} ({} mode)", gateway.mode());
                        }
                        None => bail!("radio task stopped"),
                    },
                    activation = trigger_rx.recv(), if triggers_open => match activation {
                        Some(activation) => gateway.handle_activation(activation),
                        None => triggers_open = false,
                    },
                }
            }

            let wake_timer = gateway.power().wake_timer();
            if command_tx.send(RadioCommand::CancelDiscovery).is_err() {
                bail!("radio task stopped");
            }
            retained = gateway.shutdown();
            if let Err(err) = self.store.store(&retained) {
                error!("Error storing retained region: {err}");
            }

            let timer = tokio::time::sleep(wake_timer.unwrap_or_default());
            tokio::pin!(timer);
            let next = loop {
                tokio::select! {
                    _ = &mut timer, if wake_timer.is_some() => break Some(WakeCause::Timer),
                    activation = trigger_rx.recv(), if triggers_open => match activation {
                        Some(activation) => {
                            pending = Some(activation);
                            break Some(WakeCause::Trigger);
                        }
                        None => triggers_open = false,
                    },
                    else => break None,
                }
            };
            match next {
                Some(next) => cause = next,
                None => {
                    info!("No wake source left, shutting down");
                    break;
                }
            }
        }

        drop(command_tx);
        if let Err(err) = radio_handle.await {
            error!("Radio task panicked: {err:?}");
        }
        Ok(())
    }
}
