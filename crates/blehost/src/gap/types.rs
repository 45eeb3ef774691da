//! Types shared by the GAP manager, the Security Manager and the PAL traits.

use crate::error::{BleError, BleResult};
use crate::gap::constants::*;
use bitflags::bitflags;
use std::fmt;

/// Connection handle assigned by the controller.
pub type ConnectionHandle = u16;

/// Index of an advertising set, `0..MAX_ADVERTISING_SETS`.
pub type AdvertisingHandle = u8;

/// Handle of an established periodic advertising sync.
pub type PeriodicSyncHandle = u16;

/// Role of the local device in a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Role {
    Central,
    Peripheral,
}

/// Address type of a peer, including resolved identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressType {
    Public,
    Random,
    PublicIdentity,
    RandomIdentity,
}

impl AddressType {
    /// True when the address is (or resolves to) a public device address.
    pub fn is_public(&self) -> bool {
        matches!(self, AddressType::Public | AddressType::PublicIdentity)
    }
}

impl From<u8> for AddressType {
    fn from(value: u8) -> Self {
        match value {
            PUBLIC_DEVICE_ADDRESS => AddressType::Public,
            RANDOM_DEVICE_ADDRESS => AddressType::Random,
            PUBLIC_IDENTITY_ADDRESS => AddressType::PublicIdentity,
            RANDOM_IDENTITY_ADDRESS => AddressType::RandomIdentity,
            _ => AddressType::Public,
        }
    }
}

impl From<AddressType> for u8 {
    fn from(value: AddressType) -> Self {
        match value {
            AddressType::Public => PUBLIC_DEVICE_ADDRESS,
            AddressType::Random => RANDOM_DEVICE_ADDRESS,
            AddressType::PublicIdentity => PUBLIC_IDENTITY_ADDRESS,
            AddressType::RandomIdentity => RANDOM_IDENTITY_ADDRESS,
        }
    }
}

/// Address type used when targeting a peer (whitelist, directed advertising,
/// connection requests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PeerAddressType {
    #[default]
    Public,
    Random,
}

impl From<AddressType> for PeerAddressType {
    fn from(value: AddressType) -> Self {
        if value.is_public() {
            PeerAddressType::Public
        } else {
            PeerAddressType::Random
        }
    }
}

/// Address type the controller uses for the local device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OwnAddressType {
    #[default]
    Public,
    Random,
    ResolvablePrivatePublicFallback,
    ResolvablePrivateRandomFallback,
}

impl OwnAddressType {
    pub fn to_u8(&self) -> u8 {
        match self {
            OwnAddressType::Public => OWN_ADDRESS_PUBLIC,
            OwnAddressType::Random => OWN_ADDRESS_RANDOM,
            OwnAddressType::ResolvablePrivatePublicFallback => OWN_ADDRESS_RPA_PUBLIC_FALLBACK,
            OwnAddressType::ResolvablePrivateRandomFallback => OWN_ADDRESS_RPA_RANDOM_FALLBACK,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            OWN_ADDRESS_PUBLIC => Some(OwnAddressType::Public),
            OWN_ADDRESS_RANDOM => Some(OwnAddressType::Random),
            OWN_ADDRESS_RPA_PUBLIC_FALLBACK => Some(OwnAddressType::ResolvablePrivatePublicFallback),
            OWN_ADDRESS_RPA_RANDOM_FALLBACK => Some(OwnAddressType::ResolvablePrivateRandomFallback),
            _ => None,
        }
    }
}

/// A 48-bit Bluetooth device address, stored least significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub const ZERO: BdAddr = BdAddr { bytes: [0; 6] };

    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() >= 6 {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&slice[0..6]);
            Some(Self { bytes })
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_zero(&self) -> bool {
        self.bytes == [0; 6]
    }

    /// Random static addresses carry `0b11` in the two most significant bits.
    pub fn is_static_random(&self) -> bool {
        self.bytes[5] >> 6 == 0b11
    }

    /// Resolvable private addresses carry `0b01` in the two most significant bits.
    pub fn is_resolvable_private(&self) -> bool {
        self.bytes[5] >> 6 == 0b01
    }

    /// Non resolvable private addresses carry `0b00` in the two most significant bits.
    pub fn is_non_resolvable_private(&self) -> bool {
        self.bytes[5] >> 6 == 0b00
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

/// Advertising PDU type of an advertising set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdvertisingType {
    #[default]
    ConnectableUndirected,
    ConnectableDirected,
    ScannableUndirected,
    NonConnectableUndirected,
    ConnectableDirectedLowDuty,
}

impl AdvertisingType {
    pub fn to_u8(&self) -> u8 {
        match self {
            AdvertisingType::ConnectableUndirected => 0,
            AdvertisingType::ConnectableDirected => 1,
            AdvertisingType::ScannableUndirected => 2,
            AdvertisingType::NonConnectableUndirected => 3,
            AdvertisingType::ConnectableDirectedLowDuty => 4,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AdvertisingType::ConnectableUndirected),
            1 => Some(AdvertisingType::ConnectableDirected),
            2 => Some(AdvertisingType::ScannableUndirected),
            3 => Some(AdvertisingType::NonConnectableUndirected),
            4 => Some(AdvertisingType::ConnectableDirectedLowDuty),
            _ => None,
        }
    }

    pub fn is_connectable(&self) -> bool {
        matches!(
            self,
            AdvertisingType::ConnectableUndirected
                | AdvertisingType::ConnectableDirected
                | AdvertisingType::ConnectableDirectedLowDuty
        )
    }
}

/// Whitelist use while advertising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdvertisingFilterPolicy {
    #[default]
    NoFilter,
    FilterScanRequests,
    FilterConnectionRequests,
    FilterAll,
}

/// Whitelist use while scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanningFilterPolicy {
    #[default]
    NoFilter,
    FilterAdvertising,
    NoFilterIncludeUnresolvableDirected,
    FilterAdvertisingIncludeUnresolvableDirected,
}

/// Whitelist use while initiating a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InitiatorFilterPolicy {
    #[default]
    NoFilter,
    UseWhitelist,
}

/// Duplicate filtering applied by the controller during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatesFilter {
    #[default]
    Disable,
    Enable,
    /// Reset the filter at the start of every scan period.
    PeriodicReset,
}

/// LE physical layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phy {
    #[default]
    Le1M,
    Le2M,
    LeCoded,
}

impl Phy {
    pub fn to_u8(&self) -> u8 {
        match self {
            Phy::Le1M => 1,
            Phy::Le2M => 2,
            Phy::LeCoded => 3,
        }
    }
}

bitflags! {
    /// Set of LE physical layers, as used by PHY preference commands.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PhySet: u8 {
        const LE_1M = 0x01;
        const LE_2M = 0x02;
        const LE_CODED = 0x04;
    }
}

impl From<Phy> for PhySet {
    fn from(phy: Phy) -> Self {
        match phy {
            Phy::Le1M => PhySet::LE_1M,
            Phy::Le2M => PhySet::LE_2M,
            Phy::LeCoded => PhySet::LE_CODED,
        }
    }
}

/// Coding preference when transmitting on the coded PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodedSymbolsPerBit {
    #[default]
    NoPreference,
    S2,
    S8,
}

/// Fragment position of a chunk of advertising data sent to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingDataOperation {
    IntermediateFragment,
    FirstFragment,
    LastFragment,
    CompleteFragment,
    UnchangedData,
}

/// Parameters of an advertising set.
///
/// Setters keep two constraints: non connectable advertising never uses an
/// interval below `0xA0`, and at least one primary channel stays enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdvertisingParameters {
    advertising_type: AdvertisingType,
    min_interval: u32,
    max_interval: u32,
    peer_address_type: PeerAddressType,
    peer_address: BdAddr,
    filter_policy: AdvertisingFilterPolicy,
    primary_phy: Phy,
    secondary_phy: Phy,
    tx_power: i8,
    max_skip: u8,
    channel37: bool,
    channel38: bool,
    channel39: bool,
    anonymous: bool,
    notify_on_scan_request: bool,
    legacy_pdu: bool,
    include_tx_power: bool,
    sid: u8,
}

impl Default for AdvertisingParameters {
    fn default() -> Self {
        Self::new(AdvertisingType::ConnectableUndirected)
    }
}

impl AdvertisingParameters {
    /// Parameters with the default intervals for the given advertising type.
    pub fn new(advertising_type: AdvertisingType) -> Self {
        let mut params = Self {
            advertising_type,
            min_interval: DEFAULT_ADVERTISING_INTERVAL_MIN,
            max_interval: DEFAULT_ADVERTISING_INTERVAL_MAX,
            peer_address_type: PeerAddressType::Public,
            peer_address: BdAddr::ZERO,
            filter_policy: AdvertisingFilterPolicy::NoFilter,
            primary_phy: Phy::Le1M,
            secondary_phy: Phy::Le1M,
            tx_power: ADVERTISING_TX_POWER_NO_PREFERENCE,
            max_skip: 0,
            channel37: true,
            channel38: true,
            channel39: true,
            anonymous: false,
            notify_on_scan_request: false,
            legacy_pdu: true,
            include_tx_power: false,
            sid: 0,
        };
        params.normalize_interval();
        params
    }

    fn normalize_interval(&mut self) {
        if self.advertising_type == AdvertisingType::NonConnectableUndirected {
            self.min_interval = self.min_interval.max(NON_CONNECTABLE_ADVERTISING_INTERVAL_MIN);
            self.max_interval = self.max_interval.max(NON_CONNECTABLE_ADVERTISING_INTERVAL_MIN);
        }
    }

    pub fn set_type(&mut self, advertising_type: AdvertisingType) -> &mut Self {
        self.advertising_type = advertising_type;
        self.normalize_interval();
        self
    }

    pub fn advertising_type(&self) -> AdvertisingType {
        self.advertising_type
    }

    /// Sets the primary advertising interval, in 0.625 ms units.
    pub fn set_primary_interval(&mut self, min: u32, max: u32) -> &mut Self {
        self.min_interval = min;
        self.max_interval = max;
        self.normalize_interval();
        self
    }

    pub fn min_primary_interval(&self) -> u32 {
        self.min_interval
    }

    pub fn max_primary_interval(&self) -> u32 {
        self.max_interval
    }

    /// Enables the primary advertising channels. Disabling all three
    /// re-enables all three.
    pub fn set_primary_channels(&mut self, channel37: bool, channel38: bool, channel39: bool) -> &mut Self {
        if !channel37 && !channel38 && !channel39 {
            self.channel37 = true;
            self.channel38 = true;
            self.channel39 = true;
        } else {
            self.channel37 = channel37;
            self.channel38 = channel38;
            self.channel39 = channel39;
        }
        self
    }

    /// Primary channel map as a bitfield: bit 0 channel 37, bit 1 channel 38,
    /// bit 2 channel 39.
    pub fn channel_map(&self) -> u8 {
        (self.channel37 as u8) | (self.channel38 as u8) << 1 | (self.channel39 as u8) << 2
    }

    pub fn set_peer(&mut self, address_type: PeerAddressType, address: BdAddr) -> &mut Self {
        self.peer_address_type = address_type;
        self.peer_address = address;
        self
    }

    pub fn peer_address_type(&self) -> PeerAddressType {
        self.peer_address_type
    }

    pub fn peer_address(&self) -> &BdAddr {
        &self.peer_address
    }

    pub fn set_filter(&mut self, policy: AdvertisingFilterPolicy) -> &mut Self {
        self.filter_policy = policy;
        self
    }

    pub fn filter_policy(&self) -> AdvertisingFilterPolicy {
        self.filter_policy
    }

    pub fn set_phy(&mut self, primary: Phy, secondary: Phy) -> &mut Self {
        self.primary_phy = primary;
        self.secondary_phy = secondary;
        self
    }

    pub fn primary_phy(&self) -> Phy {
        self.primary_phy
    }

    pub fn secondary_phy(&self) -> Phy {
        self.secondary_phy
    }

    pub fn set_tx_power(&mut self, tx_power: i8) -> &mut Self {
        self.tx_power = tx_power;
        self
    }

    pub fn tx_power(&self) -> i8 {
        self.tx_power
    }

    pub fn set_secondary_max_skip(&mut self, max_skip: u8) -> &mut Self {
        self.max_skip = max_skip;
        self
    }

    pub fn secondary_max_skip(&self) -> u8 {
        self.max_skip
    }

    pub fn set_scan_request_notification(&mut self, enable: bool) -> &mut Self {
        self.notify_on_scan_request = enable;
        self
    }

    pub fn scan_request_notification(&self) -> bool {
        self.notify_on_scan_request
    }

    pub fn set_use_legacy_pdu(&mut self, enable: bool) -> &mut Self {
        self.legacy_pdu = enable;
        self
    }

    pub fn use_legacy_pdu(&self) -> bool {
        self.legacy_pdu
    }

    pub fn set_anonymous_advertising(&mut self, enable: bool) -> &mut Self {
        self.anonymous = enable;
        self
    }

    pub fn anonymous_advertising(&self) -> bool {
        self.anonymous
    }

    pub fn include_tx_power_in_header(&mut self, enable: bool) -> &mut Self {
        self.include_tx_power = enable;
        self
    }

    pub fn tx_power_in_header(&self) -> bool {
        self.include_tx_power
    }

    pub fn set_sid(&mut self, sid: u8) -> &mut Self {
        self.sid = sid;
        self
    }

    pub fn sid(&self) -> u8 {
        self.sid
    }
}

/// Scan timing for one PHY, in 0.625 ms units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhyScanParameters {
    pub interval: u16,
    pub window: u16,
    pub active_scanning: bool,
}

impl Default for PhyScanParameters {
    fn default() -> Self {
        Self {
            interval: LE_SCAN_INTERVAL,
            window: LE_SCAN_WINDOW,
            active_scanning: false,
        }
    }
}

/// Parameters of a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanParameters {
    pub filter_policy: ScanningFilterPolicy,
    pub le_1m: Option<PhyScanParameters>,
    pub le_coded: Option<PhyScanParameters>,
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            filter_policy: ScanningFilterPolicy::NoFilter,
            le_1m: Some(PhyScanParameters::default()),
            le_coded: None,
        }
    }
}

impl ScanParameters {
    pub fn phys(&self) -> PhySet {
        let mut phys = PhySet::empty();
        if self.le_1m.is_some() {
            phys |= PhySet::LE_1M;
        }
        if self.le_coded.is_some() {
            phys |= PhySet::LE_CODED;
        }
        phys
    }
}

/// Connection request timing for one PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhyConnectionParameters {
    pub scan_interval: u16,
    pub scan_window: u16,
    pub min_connection_interval: u16,
    pub max_connection_interval: u16,
    pub slave_latency: u16,
    pub supervision_timeout: u16,
    pub min_event_length: u16,
    pub max_event_length: u16,
}

impl Default for PhyConnectionParameters {
    fn default() -> Self {
        Self {
            scan_interval: LE_SCAN_INTERVAL,
            scan_window: LE_SCAN_WINDOW,
            min_connection_interval: LE_CONN_INTERVAL_MIN,
            max_connection_interval: LE_CONN_INTERVAL_MAX,
            slave_latency: LE_CONN_LATENCY,
            supervision_timeout: LE_SUPERVISION_TIMEOUT,
            min_event_length: LE_MIN_CE_LENGTH,
            max_event_length: LE_MAX_CE_LENGTH,
        }
    }
}

/// Parameters of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionParameters {
    pub filter_policy: InitiatorFilterPolicy,
    pub le_1m: Option<PhyConnectionParameters>,
    pub le_2m: Option<PhyConnectionParameters>,
    pub le_coded: Option<PhyConnectionParameters>,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            filter_policy: InitiatorFilterPolicy::NoFilter,
            le_1m: Some(PhyConnectionParameters::default()),
            le_2m: None,
            le_coded: None,
        }
    }
}

impl ConnectionParameters {
    pub fn phys(&self) -> PhySet {
        let mut phys = PhySet::empty();
        if self.le_1m.is_some() {
            phys |= PhySet::LE_1M;
        }
        if self.le_2m.is_some() {
            phys |= PhySet::LE_2M;
        }
        if self.le_coded.is_some() {
            phys |= PhySet::LE_CODED;
        }
        phys
    }
}

/// Parameters of an update of an established connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionUpdate {
    pub min_connection_interval: u16,
    pub max_connection_interval: u16,
    pub slave_latency: u16,
    pub supervision_timeout: u16,
    pub min_event_length: u16,
    pub max_event_length: u16,
}

/// Reason given when terminating a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectionReason {
    AuthenticationFailure,
    RemoteUserTerminatedConnection,
    RemoteDevTerminationDueToLowResources,
    RemoteDevTerminationDueToPowerOff,
    LocalHostTerminatedConnection,
    UnsupportedRemoteFeature,
    PairingWithUnitKeyNotSupported,
    UnacceptableConnectionParameters,
    Other(u8),
}

impl DisconnectionReason {
    pub fn to_u8(&self) -> u8 {
        match self {
            DisconnectionReason::AuthenticationFailure => HCI_AUTHENTICATION_FAILURE,
            DisconnectionReason::RemoteUserTerminatedConnection => HCI_REMOTE_USER_TERMINATED,
            DisconnectionReason::RemoteDevTerminationDueToLowResources => HCI_REMOTE_DEV_LOW_RESOURCES,
            DisconnectionReason::RemoteDevTerminationDueToPowerOff => HCI_REMOTE_DEV_POWER_OFF,
            DisconnectionReason::LocalHostTerminatedConnection => HCI_LOCAL_HOST_TERMINATED,
            DisconnectionReason::UnsupportedRemoteFeature => HCI_UNSUPPORTED_REMOTE_FEATURE,
            DisconnectionReason::PairingWithUnitKeyNotSupported => HCI_PAIRING_WITH_UNIT_KEY_NOT_SUPPORTED,
            DisconnectionReason::UnacceptableConnectionParameters => HCI_UNACCEPTABLE_CONNECTION_PARAMETERS,
            DisconnectionReason::Other(code) => *code,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            HCI_AUTHENTICATION_FAILURE => DisconnectionReason::AuthenticationFailure,
            HCI_REMOTE_USER_TERMINATED => DisconnectionReason::RemoteUserTerminatedConnection,
            HCI_REMOTE_DEV_LOW_RESOURCES => DisconnectionReason::RemoteDevTerminationDueToLowResources,
            HCI_REMOTE_DEV_POWER_OFF => DisconnectionReason::RemoteDevTerminationDueToPowerOff,
            HCI_LOCAL_HOST_TERMINATED => DisconnectionReason::LocalHostTerminatedConnection,
            HCI_UNSUPPORTED_REMOTE_FEATURE => DisconnectionReason::UnsupportedRemoteFeature,
            HCI_PAIRING_WITH_UNIT_KEY_NOT_SUPPORTED => DisconnectionReason::PairingWithUnitKeyNotSupported,
            HCI_UNACCEPTABLE_CONNECTION_PARAMETERS => DisconnectionReason::UnacceptableConnectionParameters,
            other => DisconnectionReason::Other(other),
        }
    }
}

/// An address accepted by a whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WhitelistEntry {
    pub address_type: PeerAddressType,
    pub address: BdAddr,
}

/// Bounded, duplicate free list of peer addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Whitelist {
    entries: Vec<WhitelistEntry>,
    capacity: usize,
}

impl Whitelist {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds an address. Adding an address already present is a no-op.
    pub fn add(&mut self, address_type: PeerAddressType, address: BdAddr) -> BleResult<()> {
        let entry = WhitelistEntry { address_type, address };
        if self.entries.contains(&entry) {
            return Ok(());
        }
        if self.entries.len() >= self.capacity {
            return Err(BleError::invalid("whitelist is full"));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Removes an address, returning whether it was present.
    pub fn remove(&mut self, address_type: PeerAddressType, address: &BdAddr) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.address_type == address_type && e.address == *address));
        before != self.entries.len()
    }

    pub fn contains(&self, address_type: PeerAddressType, address: &BdAddr) -> bool {
        self.entries
            .iter()
            .any(|e| e.address_type == address_type && e.address == *address)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &WhitelistEntry> {
        self.entries.iter()
    }
}

/// Tunables of the GAP manager.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GapConfig {
    /// Period of the non resolvable private address rotation, in seconds.
    pub private_address_timeout: u64,
    /// Upper bound on advertising sets, further capped by the controller and
    /// by `MAX_ADVERTISING_SETS`.
    pub max_advertising_sets: usize,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            private_address_timeout: DEFAULT_PRIVATE_ADDRESS_TIMEOUT_S,
            max_advertising_sets: MAX_ADVERTISING_SETS,
        }
    }
}
