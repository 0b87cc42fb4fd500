//! Seams to the hardware the gateway core drives.
//!
//! The core only ever talks to the radio, the status indicator and the power
//! controller through these traits, one call at a time from the dispatcher.

use std::time::Duration;

use log::{error, info};
use tokio::sync::mpsc;

use crate::messages::{BlinkRate, DiscoveryParams, RadioCommand};
use crate::whitelist::PeerAddress;

pub trait Radio {
    fn start_discovery(&mut self, params: DiscoveryParams);
    fn cancel_discovery(&mut self);
    fn set_address_filter(&mut self, addresses: &[PeerAddress]);
    fn connect(&mut self, peer: PeerAddress);
    fn terminate(&mut self, peer: PeerAddress);
}

pub trait Indicator {
    fn solid_on(&mut self);
    fn solid_off(&mut self);
    fn blink(&mut self, rate: BlinkRate);
}

pub trait Power {
    fn arm_wake_timer(&mut self, after: Duration);
    fn disarm_wake_timer(&mut self);
    /// Requests deep sleep. Nothing else is dispatched until the next wake.
    fn suspend(&mut self);
}

/// Forwards radio requests to the task that owns the Bluetooth adapter.
#[derive(Debug, Clone)]
pub struct CommandRadio {
    tx: mpsc::UnboundedSender<RadioCommand>,
}

impl CommandRadio {
    pub fn new(tx: mpsc::UnboundedSender<RadioCommand>) -> Self {
        CommandRadio { tx }
    }

    fn send(&self, command: RadioCommand) {
        if let Err(err) = self.tx.send(command) {
            error!("Radio task is gone, dropping {:?}", err.0);
        }
    }
}

impl Radio for CommandRadio {
    fn start_discovery(&mut self, params: DiscoveryParams) {
        self.send(RadioCommand::StartDiscovery(params));
    }

    fn cancel_discovery(&mut self) {
        self.send(RadioCommand::CancelDiscovery);
    }

    fn set_address_filter(&mut self, addresses: &[PeerAddress]) {
        self.send(RadioCommand::SetAddressFilter(addresses.to_vec()));
    }

    fn connect(&mut self, peer: PeerAddress) {
        self.send(RadioCommand::Connect(peer));
    }

    fn terminate(&mut self, peer: PeerAddress) {
        self.send(RadioCommand::Terminate(peer));
    }
}

/// Status indicator for hosts without an LED: reports state changes in the log.
#[derive(Debug, Default)]
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn solid_on(&mut self) {
        info!("Indicator on");
    }

    fn solid_off(&mut self) {
        info!("Indicator off");
    }

    fn blink(&mut self, rate: BlinkRate) {
        info!("Indicator blinking {}ms on / {}ms off", rate.on_ms, rate.off_ms);
    }
}

/// Records what the core asked of the power controller during one awake
/// phase; the dispatcher acts on it once the core suspends.
#[derive(Debug, Default)]
pub struct SleepLatch {
    wake_timer: Option<Duration>,
    suspended: bool,
}

impl SleepLatch {
    pub fn wake_timer(&self) -> Option<Duration> {
        self.wake_timer
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}

impl Power for SleepLatch {
    fn arm_wake_timer(&mut self, after: Duration) {
        self.wake_timer = Some(after);
    }

    fn disarm_wake_timer(&mut self) {
        self.wake_timer = None;
    }

    fn suspend(&mut self) {
        self.suspended = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_radio_forwards_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut radio = CommandRadio::new(tx);
        let peer = PeerAddress::public([1, 2, 3, 4, 5, 6]);

        radio.cancel_discovery();
        radio.connect(peer);
        radio.set_address_filter(&[peer]);

        assert_eq!(rx.try_recv(), Ok(RadioCommand::CancelDiscovery));
        assert_eq!(rx.try_recv(), Ok(RadioCommand::Connect(peer)));
        assert_eq!(rx.try_recv(), Ok(RadioCommand::SetAddressFilter(vec![peer])));
    }

    #[test]
    fn test_command_radio_survives_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut radio = CommandRadio::new(tx);
        radio.cancel_discovery();
    }

    #[test]
    fn test_sleep_latch() {
        let mut latch = SleepLatch::default();
        latch.arm_wake_timer(Duration::from_secs(5));
        latch.disarm_wake_timer();
        assert_eq!(latch.wake_timer(), None);
        latch.arm_wake_timer(Duration::from_secs(5));
        latch.suspend();
        assert_eq!(latch.wake_timer(), Some(Duration::from_secs(5)));
        assert!(latch.is_suspended());
    }
}
