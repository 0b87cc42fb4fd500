//! Recording fakes for the hardware seams.

use std::time::Duration;

use crate::hal::{Indicator, Power, Radio};
use crate::messages::{BlinkRate, DiscoveryParams, RadioCommand};
use crate::whitelist::PeerAddress;

#[derive(Debug, Default)]
pub struct RecordingRadio {
    pub commands: Vec<RadioCommand>,
}

impl RecordingRadio {
    pub fn take(&mut self) -> Vec<RadioCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl Radio for RecordingRadio {
    fn start_discovery(&mut self, params: DiscoveryParams) {
        self.commands.push(RadioCommand::StartDiscovery(params));
    }

    fn cancel_discovery(&mut self) {
        self.commands.push(RadioCommand::CancelDiscovery);
    }

    fn set_address_filter(&mut self, addresses: &[PeerAddress]) {
        self.commands.push(RadioCommand::SetAddressFilter(addresses.to_vec()));
    }

    fn connect(&mut self, peer: PeerAddress) {
        self.commands.push(RadioCommand::Connect(peer));
    }

    fn terminate(&mut self, peer: PeerAddress) {
        self.commands.push(RadioCommand::Terminate(peer));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Light {
    On,
    Off,
    Blink(BlinkRate),
}

#[derive(Debug, Default)]
pub struct RecordingIndicator {
    pub states: Vec<Light>,
}

impl RecordingIndicator {
    pub fn last(&self) -> Option<Light> {
        self.states.last().copied()
    }
}

impl Indicator for RecordingIndicator {
    fn solid_on(&mut self) {
        self.states.push(Light::On);
    }

    fn solid_off(&mut self) {
        self.states.push(Light::Off);
    }

    fn blink(&mut self, rate: BlinkRate) {
        self.states.push(Light::Blink(rate));
    }
}

#[derive(Debug, Default)]
pub struct RecordingPower {
    pub wake_timer: Option<Duration>,
    pub suspends: usize,
}

impl Power for RecordingPower {
    fn arm_wake_timer(&mut self, after: Duration) {
        self.wake_timer = Some(after);
    }

    fn disarm_wake_timer(&mut self) {
        self.wake_timer = None;
    }

    fn suspend(&mut self) {
        self.suspends += 1;
    }
}
