use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::whitelist::{PeerAddress, ServiceClass};

/// One advertisement seen while discovering.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscoveredPeer {
    pub address: PeerAddress,
    pub services: Vec<ServiceClass>,
    /// Raw manufacturer data, header first.
    pub manufacturer_data: Vec<u8>,
    pub rssi: i16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterPolicy {
    None,
    /// Only report peers in the address filter list.
    Whitelist,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanDuration {
    Bounded(Duration),
    Indefinite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscoveryParams {
    pub filter: FilterPolicy,
    pub duration: ScanDuration,
    pub passive: bool,
}

impl DiscoveryParams {
    pub fn unfiltered_indefinite() -> Self {
        Self {
            filter: FilterPolicy::None,
            duration: ScanDuration::Indefinite,
            passive: true,
        }
    }

    pub fn whitelisted(duration: ScanDuration) -> Self {
        Self {
            filter: FilterPolicy::Whitelist,
            duration,
            passive: true,
        }
    }
}

/// Events delivered by the radio stack, in the order they were generated.
#[derive(Clone, Debug, PartialEq)]
pub enum RadioEvent {
    Discovered(DiscoveredPeer),
    ConnectionEstablished(PeerAddress),
    ConnectionFailed(PeerAddress),
    Disconnected { peer: PeerAddress, reason: String },
    DiscoveryComplete,
}

/// Requests made of the radio stack.
#[derive(Clone, Debug, PartialEq)]
pub enum RadioCommand {
    StartDiscovery(DiscoveryParams),
    CancelDiscovery,
    SetAddressFilter(Vec<PeerAddress>),
    Connect(PeerAddress),
    Terminate(PeerAddress),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeCause {
    Trigger,
    Timer,
    Other,
}

impl fmt::Display for WakeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeCause::Trigger => write!(f, "external trigger"),
            WakeCause::Timer => write!(f, "timer"),
            WakeCause::Other => write!(f, "other cause"),
        }
    }
}

/// External trigger activations, by how long the button was held.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Short,
    Medium,
    Long,
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s" | "short" => Ok(Activation::Short),
            "m" | "medium" => Ok(Activation::Medium),
            "l" | "long" => Ok(Activation::Long),
            other => Err(format!("unknown activation '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlinkRate {
    pub on_ms: u64,
    pub off_ms: u64,
}

impl BlinkRate {
    pub const fn symmetric(period_ms: u64) -> Self {
        Self {
            on_ms: period_ms,
            off_ms: period_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_activation() {
        assert_eq!("short".parse::<Activation>(), Ok(Activation::Short));
        assert_eq!(" M\n".parse::<Activation>(), Ok(Activation::Medium));
        assert_eq!("long".parse::<Activation>(), Ok(Activation::Long));
        assert!("double".parse::<Activation>().is_err());
    }
}
