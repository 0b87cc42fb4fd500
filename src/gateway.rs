//! The gateway core: owns all state for one awake phase and routes wake
//! causes, trigger activations and radio events to the mode controller and
//! the discovery processor.

use std::time::Duration;

use log::{debug, info, warn};

use crate::classifier::ReadingCache;
use crate::hal::{Indicator, Power, Radio};
use crate::messages::{Activation, BlinkRate, RadioEvent, WakeCause};
use crate::mode::{DeviceMode, ModeController};
use crate::processor::{DiscoveryProcessor, Disposition};
use crate::retained::RetainedState;
use crate::whitelist::{PeerAddress, Whitelist, WhitelistError};

pub const DEFAULT_RSSI_THRESHOLD: i16 = -50;
pub const DEFAULT_WAKE_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_DATA_WINDOW: Duration = Duration::from_secs(1);
pub const DEFAULT_REGISTRATION_BLINK: BlinkRate = BlinkRate::symmetric(100);
pub const DEFAULT_DELETION_BLINK: BlinkRate = BlinkRate::symmetric(700);

#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    /// Weakest signal accepted for registration and deletion, in dBm.
    pub rssi_threshold: i16,
    pub wake_interval: Duration,
    pub data_window: Duration,
    pub registration_blink: BlinkRate,
    pub deletion_blink: BlinkRate,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            rssi_threshold: DEFAULT_RSSI_THRESHOLD,
            wake_interval: DEFAULT_WAKE_INTERVAL,
            data_window: DEFAULT_DATA_WINDOW,
            registration_blink: DEFAULT_REGISTRATION_BLINK,
            deletion_blink: DEFAULT_DELETION_BLINK,
        }
    }
}

/// Everything the core mutates. `retained` outlives deep sleep, the other
/// fields start from their defaults on every wake.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub retained: RetainedState,
    pub mode: DeviceMode,
    /// A timer-driven collection window is open.
    pub collecting: bool,
    /// Address bound during registration whose connection is still pending.
    pub pending_bind: Option<PeerAddress>,
    pub suspended: bool,
}

pub struct Gateway<R, I, P> {
    ctx: Context,
    processor: DiscoveryProcessor,
    modes: ModeController,
    radio: R,
    indicator: I,
    power: P,
}

impl<R: Radio, I: Indicator, P: Power> Gateway<R, I, P> {
    /// Brings the core up from the retained region.
    pub fn boot(
        retained: RetainedState,
        settings: &GatewaySettings,
        radio: R,
        indicator: I,
        power: P,
    ) -> Result<Self, WhitelistError> {
        let mut ctx = Context {
            retained,
            ..Context::default()
        };
        ctx.retained.whitelist.initialize()?;
        debug!("Whitelist: {}", ctx.retained.whitelist);

        Ok(Gateway {
            ctx,
            processor: DiscoveryProcessor::new(
                settings.rssi_threshold,
                settings.registration_blink,
                settings.deletion_blink,
            ),
            modes: ModeController::new(settings.wake_interval, settings.data_window),
            radio,
            indicator,
            power,
        })
    }

    pub fn wake(&mut self, cause: WakeCause) {
        info!("Waking up from {cause}");
        match cause {
            WakeCause::Trigger => self.force_interrupt(),
            WakeCause::Timer => self.modes.start_collection(
                &mut self.ctx,
                &mut self.radio,
                &mut self.indicator,
                &mut self.power,
            ),
            WakeCause::Other => {
                // unexpected, go straight back to sleep without touching anything
                info!("Go to sleep");
                self.ctx.suspended = true;
                self.power.suspend();
            }
        }
    }

    pub fn handle_activation(&mut self, activation: Activation) {
        if self.ctx.suspended {
            warn!("Activation {activation:?} while suspended, ignoring");
            return;
        }
        self.force_interrupt();

        let Self {
            ctx,
            modes,
            radio,
            indicator,
            power,
            ..
        } = self;
        match activation {
            Activation::Short => modes.acknowledge(ctx, power),
            Activation::Medium => modes.toggle_registration(ctx, radio, indicator, power),
            Activation::Long => modes.toggle_deletion(ctx, radio, indicator, power),
        }
    }

    pub fn handle_radio_event(&mut self, event: RadioEvent) -> Disposition {
        if self.ctx.suspended {
            debug!("Dropping {event:?} received while suspended");
            return Disposition::Ignored;
        }

        let Self {
            ctx,
            processor,
            modes,
            radio,
            indicator,
            power,
        } = self;
        let disposition = match event {
            RadioEvent::Discovered(peer) => processor.on_discovered(ctx, radio, &peer),
            RadioEvent::ConnectionEstablished(peer) => {
                processor.on_connection_established(ctx, radio, indicator, peer)
            }
            RadioEvent::ConnectionFailed(peer) => processor.on_connection_failed(ctx, peer),
            RadioEvent::Disconnected { peer, reason } => processor.on_disconnected(peer, &reason),
            RadioEvent::DiscoveryComplete => processor.on_discovery_complete(ctx),
        };

        if let Disposition::Classified(severity) = disposition {
            modes.finish_collection(ctx, indicator, power, severity);
        }
        disposition
    }

    /// Abandons a timer-driven collection so the user gets control at once.
    fn force_interrupt(&mut self) {
        if self.ctx.collecting {
            info!("Interrupting data collection");
            self.radio.cancel_discovery();
            self.indicator.solid_off();
            self.ctx.collecting = false;
        }
    }

    pub fn mode(&self) -> DeviceMode {
        self.ctx.mode
    }

    pub fn is_collecting(&self) -> bool {
        self.ctx.collecting
    }

    pub fn is_suspended(&self) -> bool {
        self.ctx.suspended
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.ctx.retained.whitelist
    }

    pub fn reading(&self) -> &ReadingCache {
        &self.ctx.retained.reading
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    /// Hands back what has to be kept in the retained region; the rest of
    /// the awake state is dropped.
    pub fn shutdown(self) -> RetainedState {
        let mut retained = self.ctx.retained;
        if let Err(err) = retained.whitelist.teardown() {
            warn!("Whitelist teardown failed: {err}");
        }
        retained
    }
}
