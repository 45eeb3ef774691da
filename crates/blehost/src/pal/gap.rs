//! GAP side of the platform abstraction layer

use crate::error::BleResult;
use crate::gap::{
    AddressType, AdvertisingDataOperation, AdvertisingFilterPolicy, AdvertisingHandle,
    AdvertisingParameters, AdvertisingReport, AdvertisingType, BdAddr, CodedSymbolsPerBit,
    ConnectionCompleteEvent, ConnectionHandle, ConnectionParameters, ConnectionUpdate,
    DisconnectionReason, DuplicatesFilter, OwnAddressType, PeerAddressType, PeriodicSyncHandle,
    Phy, PhySet, ScanParameters,
};

/// Optional controller features the GAP manager adapts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerFeature {
    LeEncryption,
    ConnectionParametersRequestProcedure,
    LlPrivacy,
    Le2mPhy,
    LeCodedPhy,
    LeExtendedAdvertising,
    LePeriodicAdvertising,
}

/// Advertising parameters in the shape of the legacy HCI command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyAdvertisingParameters {
    pub min_interval: u16,
    pub max_interval: u16,
    pub advertising_type: AdvertisingType,
    pub own_address_type: OwnAddressType,
    pub peer_address_type: PeerAddressType,
    pub peer_address: BdAddr,
    pub channel_map: u8,
    pub filter_policy: AdvertisingFilterPolicy,
}

/// One entry of an extended advertising enable command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingEnableSet {
    pub handle: AdvertisingHandle,
    /// In 10 ms units, 0 for no limit
    pub duration: u16,
    /// 0 for no limit
    pub max_events: u8,
}

/// Request to synchronise with a periodic advertiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicSyncRequest {
    pub use_periodic_advertiser_list: bool,
    pub sid: u8,
    pub peer_address_type: PeerAddressType,
    pub peer_address: BdAddr,
    pub max_packet_skip: u16,
    /// In 10 ms units
    pub sync_timeout: u16,
}

/// Events reported by the controller to the GAP manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PalGapEvent {
    ConnectionComplete(ConnectionCompleteEvent),
    DisconnectionComplete {
        status: u8,
        connection: ConnectionHandle,
        reason: DisconnectionReason,
    },
    AdvertisingReport(AdvertisingReport),
    ExtendedAdvertisingReport(AdvertisingReport),
    ScanTimeout,
    ScanRequestReceived {
        advertising_handle: AdvertisingHandle,
        scanner_address_type: AddressType,
        scanner_address: BdAddr,
    },
    AdvertisingSetTerminated {
        status: u8,
        advertising_handle: AdvertisingHandle,
        connection: Option<ConnectionHandle>,
        completed_events: u8,
    },
    PeriodicAdvertisingSyncEstablished {
        status: u8,
        sync_handle: PeriodicSyncHandle,
        sid: u8,
        advertiser_address_type: AddressType,
        advertiser_address: BdAddr,
        phy: Phy,
        interval: u16,
    },
    PeriodicAdvertisingReport {
        sync_handle: PeriodicSyncHandle,
        tx_power: i8,
        rssi: i8,
        data_complete: bool,
        data: Vec<u8>,
    },
    PeriodicAdvertisingSyncLoss {
        sync_handle: PeriodicSyncHandle,
    },
    ConnectionParameterRequest {
        connection: ConnectionHandle,
        min_interval: u16,
        max_interval: u16,
        latency: u16,
        supervision_timeout: u16,
    },
    ConnectionUpdate {
        status: u8,
        connection: ConnectionHandle,
        interval: u16,
        latency: u16,
        supervision_timeout: u16,
    },
    ReadPhy {
        status: u8,
        connection: ConnectionHandle,
        tx_phy: Phy,
        rx_phy: Phy,
    },
    PhyUpdateComplete {
        status: u8,
        connection: ConnectionHandle,
        tx_phy: Phy,
        rx_phy: Phy,
    },
    UnexpectedError {
        opcode: u16,
        status: u8,
    },
}

/// Controller commands used by the GAP manager.
pub trait PalGap {
    fn is_feature_supported(&self, feature: ControllerFeature) -> bool;

    fn get_device_address(&self) -> BdAddr;

    fn set_random_address(&mut self, address: &BdAddr) -> BleResult<()>;

    fn get_max_number_of_advertising_sets(&self) -> u8;

    fn get_maximum_advertising_data_length(&self) -> u16;

    fn read_white_list_capacity(&self) -> u8;

    // legacy advertising

    fn set_advertising_parameters(&mut self, params: &LegacyAdvertisingParameters) -> BleResult<()>;

    fn set_advertising_data(&mut self, data: &[u8]) -> BleResult<()>;

    fn set_scan_response_data(&mut self, data: &[u8]) -> BleResult<()>;

    fn advertising_enable(&mut self, enable: bool) -> BleResult<()>;

    // extended advertising

    fn set_extended_advertising_parameters(
        &mut self,
        handle: AdvertisingHandle,
        params: &AdvertisingParameters,
        own_address_type: OwnAddressType,
    ) -> BleResult<()>;

    fn set_advertising_set_random_address(&mut self, handle: AdvertisingHandle, address: &BdAddr) -> BleResult<()>;

    fn set_extended_advertising_data(
        &mut self,
        handle: AdvertisingHandle,
        operation: AdvertisingDataOperation,
        minimise_fragmentation: bool,
        data: &[u8],
    ) -> BleResult<()>;

    fn set_extended_scan_response_data(
        &mut self,
        handle: AdvertisingHandle,
        operation: AdvertisingDataOperation,
        minimise_fragmentation: bool,
        data: &[u8],
    ) -> BleResult<()>;

    fn extended_advertising_enable(&mut self, enable: bool, sets: &[AdvertisingEnableSet]) -> BleResult<()>;

    fn remove_advertising_set(&mut self, handle: AdvertisingHandle) -> BleResult<()>;

    // periodic advertising

    fn set_periodic_advertising_parameters(
        &mut self,
        handle: AdvertisingHandle,
        min_interval: u16,
        max_interval: u16,
        advertise_tx_power: bool,
    ) -> BleResult<()>;

    fn set_periodic_advertising_data(
        &mut self,
        handle: AdvertisingHandle,
        operation: AdvertisingDataOperation,
        data: &[u8],
    ) -> BleResult<()>;

    fn periodic_advertising_enable(&mut self, enable: bool, handle: AdvertisingHandle) -> BleResult<()>;

    // scanning

    fn set_scan_parameters(&mut self, own_address_type: OwnAddressType, params: &ScanParameters) -> BleResult<()>;

    /// `duration` (10 ms units) and `period` (1.28 s units) are only
    /// honoured by controllers with extended advertising.
    fn scan_enable(&mut self, enable: bool, filter: DuplicatesFilter, duration: u16, period: u16) -> BleResult<()>;

    // periodic sync

    fn periodic_advertising_create_sync(&mut self, request: &PeriodicSyncRequest) -> BleResult<()>;

    fn cancel_periodic_advertising_create_sync(&mut self) -> BleResult<()>;

    fn periodic_advertising_terminate_sync(&mut self, sync_handle: PeriodicSyncHandle) -> BleResult<()>;

    fn add_device_to_periodic_advertiser_list(
        &mut self,
        address_type: PeerAddressType,
        address: &BdAddr,
        sid: u8,
    ) -> BleResult<()>;

    fn remove_device_from_periodic_advertiser_list(
        &mut self,
        address_type: PeerAddressType,
        address: &BdAddr,
        sid: u8,
    ) -> BleResult<()>;

    fn clear_periodic_advertiser_list(&mut self) -> BleResult<()>;

    fn read_periodic_advertiser_list_size(&self) -> u8;

    // connections

    fn create_connection(
        &mut self,
        own_address_type: OwnAddressType,
        peer_address_type: PeerAddressType,
        peer_address: &BdAddr,
        params: &ConnectionParameters,
    ) -> BleResult<()>;

    fn cancel_connection_creation(&mut self) -> BleResult<()>;

    fn disconnect(&mut self, connection: ConnectionHandle, reason: DisconnectionReason) -> BleResult<()>;

    fn connection_parameters_update(&mut self, connection: ConnectionHandle, update: &ConnectionUpdate) -> BleResult<()>;

    fn accept_connection_parameter_request(
        &mut self,
        connection: ConnectionHandle,
        update: &ConnectionUpdate,
    ) -> BleResult<()>;

    fn reject_connection_parameter_request(
        &mut self,
        connection: ConnectionHandle,
        reason: DisconnectionReason,
    ) -> BleResult<()>;

    fn read_phy(&mut self, connection: ConnectionHandle) -> BleResult<()>;

    fn set_preferred_phys(&mut self, tx_phys: PhySet, rx_phys: PhySet) -> BleResult<()>;

    fn set_phy(
        &mut self,
        connection: ConnectionHandle,
        tx_phys: PhySet,
        rx_phys: PhySet,
        coded_symbols: CodedSymbolsPerBit,
    ) -> BleResult<()>;

    // whitelist and privacy

    fn clear_whitelist(&mut self) -> BleResult<()>;

    fn add_device_to_whitelist(&mut self, address_type: PeerAddressType, address: &BdAddr) -> BleResult<()>;

    fn remove_device_from_whitelist(&mut self, address_type: PeerAddressType, address: &BdAddr) -> BleResult<()>;

    fn set_address_resolution(&mut self, enable: bool) -> BleResult<()>;
}
