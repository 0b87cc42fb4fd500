//! Radio stack on top of a btleplug adapter.
//!
//! Executes [`RadioCommand`]s from the gateway core and reports what the
//! adapter sees as [`RadioEvent`]s. BlueZ has no controller-side accept list
//! we can program, so whitelist filtering happens here in software.
//!
//! Frames are only taken from manufacturer-data advertisements as they are
//! received. The peripheral properties cache the last payload BlueZ saw,
//! which may be a frame from an earlier session.

use std::collections::{HashMap, HashSet};

use btleplug::api::bleuuid::uuid_from_u16;
use btleplug::api::{AddressType, BDAddr, Central as _, CentralEvent, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use futures::StreamExt as _;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use crate::messages::{DiscoveredPeer, FilterPolicy, RadioCommand, RadioEvent, ScanDuration};
use crate::whitelist::{PeerAddress, ServiceClass};

pub struct Scanner {
    adapter: Adapter,
    commands: mpsc::UnboundedReceiver<RadioCommand>,
    events: mpsc::UnboundedSender<RadioEvent>,
    filter: FilterPolicy,
    address_filter: HashSet<PeerAddress>,
    scanning: bool,
    window_end: Option<Instant>,
}

impl Scanner {
    pub fn new(
        adapter: Adapter,
        commands: mpsc::UnboundedReceiver<RadioCommand>,
        events: mpsc::UnboundedSender<RadioEvent>,
    ) -> Self {
        Scanner {
            adapter,
            commands,
            events,
            filter: FilterPolicy::None,
            address_filter: HashSet::new(),
            scanning: false,
            window_end: None,
        }
    }

    /// Runs until the command channel closes.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut central_events = self.adapter.events().await?;

        loop {
            let window_end = self.window_end;
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Err(err) = self.execute(command).await {
                            error!("Radio command failed: {err:?}");
                        }
                    }
                    None => {
                        debug!("Command channel closed");
                        break;
                    }
                },
                event = central_events.next() => match event {
                    Some(event) => {
                        if let Err(err) = self.on_central_event(event).await {
                            warn!("Error handling adapter event: {err:?}");
                        }
                    }
                    None => {
                        info!("No more adapter events");
                        break;
                    }
                },
                _ = sleep_until(window_end.unwrap_or_else(Instant::now)), if window_end.is_some() => {
                    self.finish_window().await;
                }
            }
        }

        self.stop_scan().await;
        Ok(())
    }

    async fn execute(&mut self, command: RadioCommand) -> anyhow::Result<()> {
        debug!("Radio command: {command:?}");
        match command {
            RadioCommand::StartDiscovery(params) => {
                self.filter = params.filter;
                self.adapter.start_scan(ScanFilter::default()).await?;
                self.scanning = true;
                self.window_end = match params.duration {
                    ScanDuration::Bounded(window) => Some(Instant::now() + window),
                    ScanDuration::Indefinite => None,
                };
            }
            RadioCommand::CancelDiscovery => self.stop_scan().await,
            RadioCommand::SetAddressFilter(addresses) => {
                self.address_filter = addresses.into_iter().collect();
            }
            RadioCommand::Connect(peer) => self.connect(peer).await?,
            RadioCommand::Terminate(peer) => {
                if let Some(peripheral) = self.find_peripheral(&peer).await? {
                    tokio::spawn(async move {
                        if let Err(err) = peripheral.disconnect().await {
                            warn!("Error disconnecting {peer}: {err:?}");
                        }
                    });
                }
            }
        }
        Ok(())
    }

    async fn on_central_event(&mut self, event: CentralEvent) -> anyhow::Result<()> {
        match event {
            CentralEvent::ManufacturerDataAdvertisement {
                id,
                manufacturer_data,
            } => {
                self.report_advertisement(&id, &manufacturer_data).await?;
            }
            CentralEvent::DeviceDiscovered(id) => debug!("Peripheral {id:?} appeared"),
            CentralEvent::DeviceDisconnected(id) => {
                let peripheral = self.adapter.peripheral(&id).await?;
                let peer = peer_address(&peripheral).await?;
                self.emit(RadioEvent::Disconnected {
                    peer,
                    reason: "link closed".to_string(),
                });
            }
            _ => {}
        }
        Ok(())
    }

    async fn report_advertisement(
        &self,
        id: &PeripheralId,
        manufacturer_data: &HashMap<u16, Vec<u8>>,
    ) -> anyhow::Result<()> {
        if !self.scanning {
            return Ok(());
        }
        let peripheral = self.adapter.peripheral(id).await?;
        let Some(properties) = peripheral.properties().await? else {
            return Ok(());
        };

        let address = to_peer_address(properties.address, properties.address_type);
        if self.filter == FilterPolicy::Whitelist && !self.address_filter.contains(&address) {
            return Ok(());
        }

        let services: Vec<ServiceClass> = properties
            .services
            .iter()
            .filter_map(|uuid| {
                let short = (uuid.as_u128() >> 96) as u16;
                (uuid_from_u16(short) == *uuid).then_some(ServiceClass(short))
            })
            .collect();
        let rssi = properties.rssi.unwrap_or(i16::MIN);

        for peer in advertised_peers(address, &services, rssi, manufacturer_data) {
            self.emit(RadioEvent::Discovered(peer));
        }
        Ok(())
    }

    async fn connect(&self, peer: PeerAddress) -> anyhow::Result<()> {
        let Some(peripheral) = self.find_peripheral(&peer).await? else {
            warn!("{peer} is no longer known to the adapter");
            self.emit(RadioEvent::ConnectionFailed(peer));
            return Ok(());
        };

        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match peripheral.connect().await {
                Ok(()) => RadioEvent::ConnectionEstablished(peer),
                Err(err) => {
                    warn!("Error connecting to {peer}: {err:?}");
                    RadioEvent::ConnectionFailed(peer)
                }
            };
            if events.send(event).is_err() {
                debug!("Dispatcher gone, dropping connection outcome for {peer}");
            }
        });
        Ok(())
    }

    async fn find_peripheral(&self, peer: &PeerAddress) -> anyhow::Result<Option<Peripheral>> {
        let wanted = BDAddr::from(peer.mac.bytes());
        Ok(self
            .adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|peripheral| peripheral.address() == wanted))
    }

    async fn finish_window(&mut self) {
        debug!("Discovery window elapsed");
        self.stop_scan().await;
        self.emit(RadioEvent::DiscoveryComplete);
    }

    async fn stop_scan(&mut self) {
        self.window_end = None;
        if !self.scanning {
            return;
        }
        self.scanning = false;
        if let Err(err) = self.adapter.stop_scan().await {
            warn!("Error stopping scan: {err:?}");
        }
    }

    fn emit(&self, event: RadioEvent) {
        if self.events.send(event).is_err() {
            debug!("Dispatcher gone, dropping radio event");
        }
    }
}

async fn peer_address(peripheral: &Peripheral) -> anyhow::Result<PeerAddress> {
    let address_type = peripheral
        .properties()
        .await?
        .and_then(|properties| properties.address_type);
    Ok(to_peer_address(peripheral.address(), address_type))
}

/// One report per manufacturer record. btleplug strips the company
/// identifier, which is where sensors put the frame header, so it goes back
/// in front of the payload.
fn advertised_peers(
    address: PeerAddress,
    services: &[ServiceClass],
    rssi: i16,
    manufacturer_data: &HashMap<u16, Vec<u8>>,
) -> Vec<DiscoveredPeer> {
    manufacturer_data
        .iter()
        .map(|(company, data)| {
            let mut frame = company.to_le_bytes().to_vec();
            frame.extend_from_slice(data);
            DiscoveredPeer {
                address,
                services: services.to_vec(),
                manufacturer_data: frame,
                rssi,
            }
        })
        .collect()
}

fn to_peer_address(address: BDAddr, address_type: Option<AddressType>) -> PeerAddress {
    let bytes = address.into_inner();
    match address_type {
        Some(AddressType::Random) => PeerAddress::random(bytes),
        _ => PeerAddress::public(bytes),
    }
}
