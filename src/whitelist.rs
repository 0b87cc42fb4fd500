//! Registry of bound sensor peers.
//!
//! The whitelist holds exactly one slot per recognised service class. A slot
//! is either empty or bound to a single peer address; the slots themselves
//! are fixed at compile time and never grow. Entries survive deep sleep in the
//! retained region while `len` and the initialised flag are recomputed on
//! every boot.

use std::fmt;

use log::debug;
use mac_address::MacAddress;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

/// Number of whitelist slots.
pub const CAPACITY: usize = 3;

/// Service classes with a slot, in slot order.
pub const RECOGNIZED_CLASSES: [ServiceClass; CAPACITY] = [
    ServiceClass::HEALTH_THERMOMETER,
    ServiceClass::PULSE_OXIMETER,
    ServiceClass::PHYSICAL_ACTIVITY_MONITOR,
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WhitelistError {
    #[error("whitelist is already initialised")]
    AlreadyInitialized,

    #[error("whitelist is not initialised")]
    NotInitialized,

    #[error("no free slot for service class {0}")]
    Capacity(ServiceClass),

    #[error("peer {0} is already bound to another slot")]
    AddressInUse(PeerAddress),

    #[error("no bound entry matches {0}")]
    NotFound(String),

    #[error("whitelist is empty")]
    Empty,

    #[error("whitelist slots do not match the recognised service classes")]
    TemplateMismatch,

    #[error("peer {0} is bound to more than one slot")]
    DuplicateAddress(PeerAddress),
}

/// 16-bit Bluetooth SIG service class identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceClass(pub u16);

impl ServiceClass {
    pub const HEALTH_THERMOMETER: ServiceClass = ServiceClass(0x1809);
    pub const PULSE_OXIMETER: ServiceClass = ServiceClass(0x1822);
    pub const PHYSICAL_ACTIVITY_MONITOR: ServiceClass = ServiceClass(0x183E);
}

impl fmt::Display for ServiceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    Public,
    Random,
}

/// A peer's link-layer address. Two addresses are equal only when both the
/// kind and all six bytes match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub kind: AddressKind,
    pub mac: MacAddress,
}

impl PeerAddress {
    pub fn new(kind: AddressKind, bytes: [u8; 6]) -> Self {
        Self {
            kind,
            mac: MacAddress::new(bytes),
        }
    }

    pub fn public(bytes: [u8; 6]) -> Self {
        Self::new(AddressKind::Public, bytes)
    }

    pub fn random(bytes: [u8; 6]) -> Self {
        Self::new(AddressKind::Random, bytes)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AddressKind::Public => write!(f, "{}", self.mac),
            AddressKind::Random => write!(f, "{} (random)", self.mac),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub class: ServiceClass,
    pub peer: Option<PeerAddress>,
}

impl WhitelistEntry {
    pub const fn vacant(class: ServiceClass) -> Self {
        Self { class, peer: None }
    }

    pub fn is_occupied(&self) -> bool {
        self.peer.is_some()
    }

    fn is_bound_to(&self, address: &PeerAddress) -> bool {
        self.peer.as_ref() == Some(address)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Whitelist {
    entries: [WhitelistEntry; CAPACITY],
    #[serde(skip)]
    initialized: bool,
    #[serde(skip)]
    len: usize,
}

impl Default for Whitelist {
    fn default() -> Self {
        Self {
            entries: RECOGNIZED_CLASSES.map(WhitelistEntry::vacant),
            initialized: false,
            len: 0,
        }
    }
}

impl Whitelist {
    /// Counts the bound entries (there may be some left over from before a
    /// deep sleep) and marks the store ready.
    pub fn initialize(&mut self) -> Result<(), WhitelistError> {
        if self.initialized {
            return Err(WhitelistError::AlreadyInitialized);
        }
        self.validate()?;
        self.len = self.occupied().count();
        self.initialized = true;
        self.check_invariants();
        Ok(())
    }

    /// Resets the volatile bookkeeping; the entries are left untouched.
    pub fn teardown(&mut self) -> Result<(), WhitelistError> {
        if !self.initialized {
            return Err(WhitelistError::NotInitialized);
        }
        self.len = 0;
        self.initialized = false;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn entries(&self) -> &[WhitelistEntry] {
        &self.entries
    }

    /// Binds `address` to the free slot of `class`.
    pub fn add(&mut self, class: ServiceClass, address: PeerAddress) -> Result<(), WhitelistError> {
        self.ensure_initialized()?;
        if self.len == CAPACITY {
            return Err(WhitelistError::Capacity(class));
        }
        if self.contains_address(&address) {
            return Err(WhitelistError::AddressInUse(address));
        }

        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.class == class && !entry.is_occupied())
            .ok_or(WhitelistError::Capacity(class))?;
        entry.peer = Some(address);
        self.len += 1;
        debug!("Bound {address} to slot {class}");
        self.check_invariants();
        Ok(())
    }

    pub fn remove_by_address(&mut self, address: &PeerAddress) -> Result<(), WhitelistError> {
        self.ensure_initialized()?;
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.is_bound_to(address))
            .ok_or_else(|| WhitelistError::NotFound(address.to_string()))?;
        entry.peer = None;
        self.len -= 1;
        debug!("Released slot {} from {address}", entry.class);
        self.check_invariants();
        Ok(())
    }

    pub fn remove_by_service_class(&mut self, class: &ServiceClass) -> Result<(), WhitelistError> {
        self.ensure_initialized()?;
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.class == *class && entry.is_occupied())
            .ok_or_else(|| WhitelistError::NotFound(class.to_string()))?;
        entry.peer = None;
        self.len -= 1;
        debug!("Released slot {class}");
        self.check_invariants();
        Ok(())
    }

    /// True when `class` has a slot and nothing is bound to it yet.
    pub fn is_recognized_and_unbound(&self, class: &ServiceClass) -> bool {
        self.initialized
            && self
                .entries
                .iter()
                .any(|entry| entry.class == *class && !entry.is_occupied())
    }

    pub fn contains_address(&self, address: &PeerAddress) -> bool {
        self.initialized && self.entries.iter().any(|entry| entry.is_bound_to(address))
    }

    /// Bound addresses, for radio-level address filtering.
    pub fn export_addresses(&self) -> Result<Vec<PeerAddress>, WhitelistError> {
        self.ensure_initialized()?;
        if self.is_empty() {
            return Err(WhitelistError::Empty);
        }
        Ok(self.occupied().filter_map(|entry| entry.peer).collect())
    }

    /// Checks that the slots still match the compile-time template.
    pub fn matches_template(&self) -> bool {
        self.entries
            .iter()
            .map(|entry| entry.class)
            .eq(RECOGNIZED_CLASSES.iter().copied())
    }

    /// Checks a set of entries restored from outside (the retained region)
    /// before anything is allowed to act on them.
    pub fn validate(&self) -> Result<(), WhitelistError> {
        if !self.matches_template() {
            return Err(WhitelistError::TemplateMismatch);
        }
        let mut seen: Vec<PeerAddress> = Vec::with_capacity(CAPACITY);
        for peer in self.occupied().filter_map(|entry| entry.peer) {
            if seen.contains(&peer) {
                return Err(WhitelistError::DuplicateAddress(peer));
            }
            seen.push(peer);
        }
        Ok(())
    }

    fn occupied(&self) -> impl Iterator<Item = &WhitelistEntry> {
        self.entries.iter().filter(|entry| entry.is_occupied())
    }

    fn ensure_initialized(&self) -> Result<(), WhitelistError> {
        if self.initialized {
            Ok(())
        } else {
            Err(WhitelistError::NotInitialized)
        }
    }

    fn check_invariants(&self) {
        debug_assert_eq!(self.len, self.occupied().count());
        debug_assert!(self.len <= CAPACITY);
        debug_assert!(self.matches_template());
        debug_assert!(self.occupied().enumerate().all(|(i, a)| {
            self.occupied()
                .skip(i + 1)
                .all(|b| a.peer != b.peer)
        }));
    }
}

impl fmt::Display for Whitelist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "len = {}", self.len)?;
        for entry in &self.entries {
            match &entry.peer {
                Some(peer) => write!(f, ", {} = {}", entry.class, peer)?,
                None => write!(f, ", {} = -", entry.class)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENSOR_A: [u8; 6] = [0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01];
    const SENSOR_B: [u8; 6] = [0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x02];

    fn initialized() -> Whitelist {
        let mut whitelist = Whitelist::default();
        whitelist.initialize().unwrap();
        whitelist
    }

    #[test]
    fn test_default_is_seeded_template() {
        let whitelist = Whitelist::default();
        assert!(whitelist.matches_template());
        assert!(whitelist.entries().iter().all(|entry| !entry.is_occupied()));
        assert_eq!(whitelist.len(), 0);
    }

    #[test]
    fn test_initialize_guards() {
        let mut whitelist = Whitelist::default();
        let address = PeerAddress::public(SENSOR_A);
        assert_eq!(
            whitelist.add(ServiceClass::HEALTH_THERMOMETER, address),
            Err(WhitelistError::NotInitialized)
        );
        assert_eq!(whitelist.teardown(), Err(WhitelistError::NotInitialized));
        assert!(!whitelist.is_recognized_and_unbound(&ServiceClass::HEALTH_THERMOMETER));

        whitelist.initialize().unwrap();
        assert_eq!(whitelist.initialize(), Err(WhitelistError::AlreadyInitialized));
    }

    #[test]
    fn test_initialize_counts_retained_entries() {
        let mut whitelist = initialized();
        whitelist
            .add(ServiceClass::PULSE_OXIMETER, PeerAddress::public(SENSOR_A))
            .unwrap();
        whitelist.teardown().unwrap();
        assert_eq!(whitelist.len(), 0);
        assert!(whitelist.entries()[1].is_occupied());

        whitelist.initialize().unwrap();
        assert_eq!(whitelist.len(), 1);
        assert!(whitelist.contains_address(&PeerAddress::public(SENSOR_A)));
    }

    #[test]
    fn test_validate_restored_entries() {
        let a = PeerAddress::public(SENSOR_A);
        let mut whitelist = Whitelist::default();
        whitelist.entries[0].peer = Some(a);
        whitelist.entries[2].peer = Some(PeerAddress::public(SENSOR_B));
        assert_eq!(whitelist.validate(), Ok(()));

        whitelist.entries[1].peer = Some(a);
        assert_eq!(whitelist.validate(), Err(WhitelistError::DuplicateAddress(a)));
        assert_eq!(whitelist.initialize(), Err(WhitelistError::DuplicateAddress(a)));
        assert!(!whitelist.is_initialized());

        let mut foreign = Whitelist::default();
        foreign.entries[2].class = ServiceClass(0x180D);
        assert_eq!(foreign.validate(), Err(WhitelistError::TemplateMismatch));
    }

    #[test]
    fn test_add_one_peer_per_class() {
        let mut whitelist = initialized();
        let class = ServiceClass::HEALTH_THERMOMETER;
        assert!(whitelist.is_recognized_and_unbound(&class));

        whitelist.add(class, PeerAddress::public(SENSOR_A)).unwrap();
        assert!(!whitelist.is_recognized_and_unbound(&class));
        assert_eq!(
            whitelist.add(class, PeerAddress::public(SENSOR_B)),
            Err(WhitelistError::Capacity(class))
        );
        assert_eq!(whitelist.len(), 1);
    }

    #[test]
    fn test_add_unknown_class() {
        let mut whitelist = initialized();
        let heart_rate = ServiceClass(0x180D);
        assert!(!whitelist.is_recognized_and_unbound(&heart_rate));
        assert_eq!(
            whitelist.add(heart_rate, PeerAddress::public(SENSOR_A)),
            Err(WhitelistError::Capacity(heart_rate))
        );
    }

    #[test]
    fn test_add_rejects_duplicate_address() {
        let mut whitelist = initialized();
        let address = PeerAddress::public(SENSOR_A);
        whitelist.add(ServiceClass::HEALTH_THERMOMETER, address).unwrap();
        assert_eq!(
            whitelist.add(ServiceClass::PULSE_OXIMETER, address),
            Err(WhitelistError::AddressInUse(address))
        );
    }

    #[test]
    fn test_address_equality_includes_kind() {
        let mut whitelist = initialized();
        whitelist
            .add(ServiceClass::HEALTH_THERMOMETER, PeerAddress::public(SENSOR_A))
            .unwrap();
        assert!(!whitelist.contains_address(&PeerAddress::random(SENSOR_A)));
        assert!(!whitelist.contains_address(&PeerAddress::public(SENSOR_B)));
        assert!(matches!(
            whitelist.remove_by_address(&PeerAddress::random(SENSOR_A)),
            Err(WhitelistError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_by_address_and_class() {
        let mut whitelist = initialized();
        let a = PeerAddress::public(SENSOR_A);
        let b = PeerAddress::random(SENSOR_B);
        whitelist.add(ServiceClass::HEALTH_THERMOMETER, a).unwrap();
        whitelist.add(ServiceClass::PHYSICAL_ACTIVITY_MONITOR, b).unwrap();
        assert_eq!(whitelist.len(), 2);

        whitelist.remove_by_address(&a).unwrap();
        assert!(!whitelist.contains_address(&a));
        assert!(whitelist.is_recognized_and_unbound(&ServiceClass::HEALTH_THERMOMETER));

        whitelist
            .remove_by_service_class(&ServiceClass::PHYSICAL_ACTIVITY_MONITOR)
            .unwrap();
        assert!(whitelist.is_empty());
        assert!(matches!(
            whitelist.remove_by_service_class(&ServiceClass::PHYSICAL_ACTIVITY_MONITOR),
            Err(WhitelistError::NotFound(_))
        ));
    }

    #[test]
    fn test_len_tracks_occupied_entries() {
        let mut whitelist = initialized();
        let peers: Vec<PeerAddress> = (1..=4)
            .map(|n| PeerAddress::public([0xAA, 0, 0, 0, 0, n]))
            .collect();
        let ops: [(usize, Option<ServiceClass>); 9] = [
            (0, Some(ServiceClass::HEALTH_THERMOMETER)),
            (1, Some(ServiceClass::PULSE_OXIMETER)),
            (2, Some(ServiceClass::PULSE_OXIMETER)),
            (2, Some(ServiceClass::PHYSICAL_ACTIVITY_MONITOR)),
            (3, Some(ServiceClass::HEALTH_THERMOMETER)),
            (1, None),
            (1, None),
            (3, Some(ServiceClass::PULSE_OXIMETER)),
            (0, None),
        ];

        for (peer, class) in ops {
            let _ = match class {
                Some(class) => whitelist.add(class, peers[peer]),
                None => whitelist.remove_by_address(&peers[peer]),
            };
            let occupied = whitelist.entries().iter().filter(|e| e.is_occupied()).count();
            assert_eq!(whitelist.len(), occupied);
            assert!(whitelist.len() <= CAPACITY);
        }
        assert_eq!(whitelist.len(), 2);
    }

    #[test]
    fn test_export_addresses() {
        let mut whitelist = initialized();
        assert_eq!(whitelist.export_addresses(), Err(WhitelistError::Empty));

        let a = PeerAddress::public(SENSOR_A);
        let b = PeerAddress::public(SENSOR_B);
        whitelist.add(ServiceClass::PHYSICAL_ACTIVITY_MONITOR, b).unwrap();
        whitelist.add(ServiceClass::HEALTH_THERMOMETER, a).unwrap();
        assert_eq!(whitelist.export_addresses(), Ok(vec![a, b]));
    }

    #[test]
    fn test_serde_skips_volatile_fields() {
        let mut whitelist = initialized();
        whitelist
            .add(ServiceClass::HEALTH_THERMOMETER, PeerAddress::public(SENSOR_A))
            .unwrap();

        let json = serde_json::to_string(&whitelist).unwrap();
        assert!(!json.contains("initialized"));
        let restored: Whitelist = serde_json::from_str(&json).unwrap();
        assert!(!restored.is_initialized());
        assert_eq!(restored.len(), 0);
        assert_eq!(restored.entries(), whitelist.entries());
    }
}
