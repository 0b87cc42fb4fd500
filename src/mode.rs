//! Device mode state machine.
//!
//! The gateway is normally in [`DeviceMode::Unspecified`], waking on a timer
//! to collect readings from bound sensors. A medium activation toggles
//! registration, a long one toggles deletion; leaving either puts the
//! gateway back to sleep.

use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};

use crate::classifier::Severity;
use crate::gateway::Context;
use crate::hal::{Indicator, Power, Radio};
use crate::messages::{DiscoveryParams, ScanDuration};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceMode {
    #[default]
    Unspecified,
    Registration,
    Deletion,
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::Unspecified => write!(f, "unspecified"),
            DeviceMode::Registration => write!(f, "registration"),
            DeviceMode::Deletion => write!(f, "deletion"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModeController {
    wake_interval: Duration,
    data_window: Duration,
}

impl ModeController {
    pub fn new(wake_interval: Duration, data_window: Duration) -> Self {
        ModeController {
            wake_interval,
            data_window,
        }
    }

    pub fn toggle_registration(
        &self,
        ctx: &mut Context,
        radio: &mut impl Radio,
        indicator: &mut impl Indicator,
        power: &mut impl Power,
    ) {
        match ctx.mode {
            DeviceMode::Unspecified => {
                ctx.mode = DeviceMode::Registration;
                indicator.solid_on();
                info!("Entering registration mode, scanning for sensors");
                radio.start_discovery(DiscoveryParams::unfiltered_indefinite());
            }
            DeviceMode::Registration => {
                info!("Leaving registration mode");
                self.leave_mode(ctx, indicator, power);
            }
            DeviceMode::Deletion => debug!("Ignoring registration toggle while in deletion mode"),
        }
    }

    pub fn toggle_deletion(
        &self,
        ctx: &mut Context,
        radio: &mut impl Radio,
        indicator: &mut impl Indicator,
        power: &mut impl Power,
    ) {
        match ctx.mode {
            DeviceMode::Unspecified => {
                // only bound sensors can be deleted
                let addresses = match ctx.retained.whitelist.export_addresses() {
                    Ok(addresses) => addresses,
                    Err(err) => {
                        info!("Not entering deletion mode: {err}");
                        return;
                    }
                };
                ctx.mode = DeviceMode::Deletion;
                indicator.solid_on();
                info!("Entering deletion mode, scanning for {} bound sensor(s)", addresses.len());
                radio.set_address_filter(&addresses);
                radio.start_discovery(DiscoveryParams::whitelisted(ScanDuration::Indefinite));
            }
            DeviceMode::Deletion => {
                info!("Leaving deletion mode");
                self.leave_mode(ctx, indicator, power);
            }
            DeviceMode::Registration => debug!("Ignoring deletion toggle while in registration mode"),
        }
    }

    /// Opens the short whitelist-filtered window used on every timer wake.
    pub fn start_collection(
        &self,
        ctx: &mut Context,
        radio: &mut impl Radio,
        indicator: &mut impl Indicator,
        power: &mut impl Power,
    ) {
        indicator.solid_on();
        match ctx.retained.whitelist.export_addresses() {
            Ok(addresses) => {
                info!("Scanning {} bound sensor(s) for data", addresses.len());
                radio.set_address_filter(&addresses);
                radio.start_discovery(DiscoveryParams::whitelisted(ScanDuration::Bounded(
                    self.data_window,
                )));
                ctx.collecting = true;
            }
            Err(err) => {
                warn!("Nothing to collect: {err}");
                indicator.solid_off();
                self.sleep(ctx, power);
            }
        }
    }

    /// Reports the classification of a finished collection window and sleeps.
    pub fn finish_collection(
        &self,
        ctx: &mut Context,
        indicator: &mut impl Indicator,
        power: &mut impl Power,
        severity: Severity,
    ) {
        ctx.collecting = false;
        match severity {
            Severity::Undefined => {
                warn!("State is {severity}. The code is: {}", severity.code());
                warn!("No new data was recorded");
            }
            _ => info!("State is {severity}. The code is: {}", severity.code()),
        }
        indicator.solid_off();
        self.sleep(ctx, power);
    }

    /// Short activations do nothing beyond letting an idle gateway sleep again.
    pub fn acknowledge(&self, ctx: &mut Context, power: &mut impl Power) {
        if ctx.mode == DeviceMode::Unspecified && !ctx.collecting {
            self.sleep(ctx, power);
        } else {
            debug!("Short activation ignored in {} mode", ctx.mode);
        }
    }

    fn leave_mode(&self, ctx: &mut Context, indicator: &mut impl Indicator, power: &mut impl Power) {
        indicator.solid_off();
        ctx.mode = DeviceMode::Unspecified;
        self.sleep(ctx, power);
    }

    /// Arms the periodic wake only when there is something to collect.
    pub fn sleep(&self, ctx: &mut Context, power: &mut impl Power) {
        if ctx.retained.whitelist.is_empty() {
            power.disarm_wake_timer();
            info!("No sensors bound, sleeping until triggered");
        } else {
            power.arm_wake_timer(self.wake_interval);
            info!("Sleeping for {:?}", self.wake_interval);
        }
        ctx.suspended = true;
        power.suspend();
    }
}
