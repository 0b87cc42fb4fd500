//! Interprets radio events for the current device mode.
//!
//! Registration binds the peer's address before the connection is confirmed
//! and rolls it back if the connection fails. Deletion works the other way
//! round: nothing is removed until the connection is confirmed, so a failed
//! deletion leaves the binding alone.

use log::{debug, info, warn};

use crate::classifier::Severity;
use crate::gateway::Context;
use crate::hal::{Indicator, Radio};
use crate::messages::{BlinkRate, DiscoveredPeer};
use crate::mode::DeviceMode;
use crate::protocol::{self, Header, ProtocolError};
use crate::whitelist::PeerAddress;

/// What the processor did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Ignored,
    Dropped(ProtocolError),
    Connecting(PeerAddress),
    ReadingStored(f32),
    Registered(PeerAddress),
    Deleted(PeerAddress),
    DeletionFailed(PeerAddress),
    RolledBack(PeerAddress),
    Classified(Severity),
}

#[derive(Debug, Clone)]
pub struct DiscoveryProcessor {
    rssi_threshold: i16,
    registration_blink: BlinkRate,
    deletion_blink: BlinkRate,
}

impl DiscoveryProcessor {
    pub fn new(rssi_threshold: i16, registration_blink: BlinkRate, deletion_blink: BlinkRate) -> Self {
        DiscoveryProcessor {
            rssi_threshold,
            registration_blink,
            deletion_blink,
        }
    }

    pub fn on_discovered(
        &self,
        ctx: &mut Context,
        radio: &mut impl Radio,
        peer: &DiscoveredPeer,
    ) -> Disposition {
        debug!(
            "Discovered {} (RSSI {}, {} byte(s) of manufacturer data)",
            peer.address,
            peer.rssi,
            peer.manufacturer_data.len()
        );
        match ctx.mode {
            DeviceMode::Registration => self.connect_if_interesting(ctx, radio, peer),
            DeviceMode::Deletion => self.connect_if_reachable(ctx, radio, peer),
            DeviceMode::Unspecified => store_reading(ctx, peer),
        }
    }

    fn in_range(&self, peer: &DiscoveredPeer) -> bool {
        if peer.rssi < self.rssi_threshold {
            debug!(
                "{} too far away (RSSI {} < {})",
                peer.address, peer.rssi, self.rssi_threshold
            );
            return false;
        }
        true
    }

    fn connect_if_interesting(
        &self,
        ctx: &mut Context,
        radio: &mut impl Radio,
        peer: &DiscoveredPeer,
    ) -> Disposition {
        if !self.in_range(peer) {
            return Disposition::Ignored;
        }

        let whitelist = &mut ctx.retained.whitelist;
        let Some(class) = peer
            .services
            .iter()
            .copied()
            .find(|class| whitelist.is_recognized_and_unbound(class))
        else {
            return Disposition::Ignored;
        };
        if whitelist.contains_address(&peer.address) {
            debug!("{} is already registered", peer.address);
            return Disposition::Ignored;
        }

        let header = match protocol::decode(&peer.manufacturer_data) {
            Ok(frame) => frame.header,
            Err(err) => {
                warn!("Error opening packet from {}: {err}", peer.address);
                return Disposition::Dropped(err);
            }
        };
        if header != Header::Registration {
            debug!("{} advertises {header}, not asking for registration", peer.address);
            return Disposition::Ignored;
        }

        // bound before the link is confirmed, undone on connection failure
        if let Err(err) = whitelist.add(class, peer.address) {
            warn!("Cannot register {}: {err}", peer.address);
            return Disposition::Ignored;
        }
        ctx.pending_bind = Some(peer.address);
        info!("Device {} is interesting ({class}), connecting", peer.address);
        radio.cancel_discovery();
        radio.connect(peer.address);
        Disposition::Connecting(peer.address)
    }

    fn connect_if_reachable(
        &self,
        ctx: &mut Context,
        radio: &mut impl Radio,
        peer: &DiscoveredPeer,
    ) -> Disposition {
        if !self.in_range(peer) || !ctx.retained.whitelist.contains_address(&peer.address) {
            return Disposition::Ignored;
        }

        match protocol::decode(&peer.manufacturer_data) {
            Ok(frame) if frame.header == Header::Deletion => {
                info!("{} asks for deletion, connecting", peer.address);
                radio.cancel_discovery();
                radio.connect(peer.address);
                Disposition::Connecting(peer.address)
            }
            Ok(frame) => {
                debug!("{} advertises {}, not asking for deletion", peer.address, frame.header);
                Disposition::Ignored
            }
            Err(err) => {
                warn!("Error opening packet from {}: {err}", peer.address);
                Disposition::Dropped(err)
            }
        }
    }

    pub fn on_connection_established(
        &self,
        ctx: &mut Context,
        radio: &mut impl Radio,
        indicator: &mut impl Indicator,
        peer: PeerAddress,
    ) -> Disposition {
        info!("Connection established with {peer}");
        if ctx.pending_bind == Some(peer) {
            ctx.pending_bind = None;
        }
        let whitelist = &mut ctx.retained.whitelist;
        let disposition = match ctx.mode {
            DeviceMode::Registration => {
                indicator.blink(self.registration_blink);
                info!("Registration is completed");
                Disposition::Registered(peer)
            }
            DeviceMode::Deletion if whitelist.contains_address(&peer) => {
                match whitelist.remove_by_address(&peer) {
                    Ok(()) => {
                        indicator.blink(self.deletion_blink);
                        info!("Deletion is completed");
                        Disposition::Deleted(peer)
                    }
                    Err(err) => {
                        warn!("Deletion failed: {err}");
                        Disposition::DeletionFailed(peer)
                    }
                }
            }
            DeviceMode::Deletion => {
                warn!("Deletion failed: {peer} is not registered");
                Disposition::DeletionFailed(peer)
            }
            DeviceMode::Unspecified => Disposition::Ignored,
        };

        // the link only confirms intent on both sides
        radio.terminate(peer);
        info!("Whitelist: {}", ctx.retained.whitelist);
        disposition
    }

    /// Undoes a speculative bind of `peer`, whatever the mode. Bindings that
    /// were already confirmed are never touched.
    pub fn on_connection_failed(&self, ctx: &mut Context, peer: PeerAddress) -> Disposition {
        warn!("Connection with {peer} was not established");
        if ctx.pending_bind != Some(peer) {
            debug!("Nothing to roll back for {peer}");
            return Disposition::Ignored;
        }
        ctx.pending_bind = None;

        let whitelist = &mut ctx.retained.whitelist;
        let disposition = match whitelist.remove_by_address(&peer) {
            Ok(()) => Disposition::RolledBack(peer),
            Err(err) => {
                warn!("Rollback of {peer} failed: {err}");
                Disposition::Ignored
            }
        };
        info!("Whitelist: {whitelist}");
        disposition
    }

    pub fn on_disconnected(&self, peer: PeerAddress, reason: &str) -> Disposition {
        info!("Disconnected from {peer}, reason: {reason}");
        Disposition::Ignored
    }

    pub fn on_discovery_complete(&self, ctx: &Context) -> Disposition {
        if ctx.mode != DeviceMode::Unspecified {
            debug!("Discovery completed in {} mode", ctx.mode);
            return Disposition::Ignored;
        }
        info!("Scanning is complete, starting analysis");
        Disposition::Classified(ctx.retained.reading.classify())
    }
}

fn store_reading(ctx: &mut Context, peer: &DiscoveredPeer) -> Disposition {
    let reading = protocol::decode(&peer.manufacturer_data).and_then(|frame| {
        if frame.header == Header::Data {
            frame.reading().map(Some)
        } else {
            Ok(None)
        }
    });

    match reading {
        Ok(Some(temperature)) => {
            info!("Temperature from {}: {temperature:.2}", peer.address);
            ctx.retained.reading.store(temperature);
            Disposition::ReadingStored(temperature)
        }
        Ok(None) => {
            warn!("{} sent no data frame", peer.address);
            Disposition::Ignored
        }
        Err(err) => {
            warn!("Error opening packet from {}: {err}", peer.address);
            Disposition::Dropped(err)
        }
    }
}
