//! Notifications delivered to the application by the GAP manager.

use super::scan::AdvertisingReport;
use super::types::{
    AddressType, AdvertisingHandle, BdAddr, ConnectionHandle, DisconnectionReason, PeriodicSyncHandle, Phy,
    Role,
};

/// Content of a connection complete notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionCompleteEvent {
    /// HCI status, 0 on success
    pub status: u8,
    pub connection: ConnectionHandle,
    pub role: Role,
    pub peer_address_type: AddressType,
    pub peer_address: BdAddr,
    pub local_resolvable_private_address: BdAddr,
    pub peer_resolvable_private_address: BdAddr,
    pub connection_interval: u16,
    pub connection_latency: u16,
    pub supervision_timeout: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GapEvent {
    AdvertisingReport(AdvertisingReport),
    ScanTimeout,
    /// An advertising set stopped on its own: timeout, event limit or connection
    AdvertisingEnd {
        advertising_handle: AdvertisingHandle,
        connection: Option<ConnectionHandle>,
        completed_events: u8,
        connected: bool,
    },
    ScanRequestReceived {
        advertising_handle: AdvertisingHandle,
        peer_address_type: AddressType,
        peer_address: BdAddr,
    },
    ConnectionComplete(ConnectionCompleteEvent),
    DisconnectionComplete {
        connection: ConnectionHandle,
        reason: DisconnectionReason,
    },
    /// The peer asks for new connection parameters; answer with
    /// `accept_connection_parameters_update` or `reject_connection_parameters_update`.
    UpdateConnectionParametersRequest {
        connection: ConnectionHandle,
        min_interval: u16,
        max_interval: u16,
        latency: u16,
        supervision_timeout: u16,
    },
    ConnectionParametersUpdateComplete {
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
    PeriodicAdvertisingSyncEstablished {
        status: u8,
        sync_handle: PeriodicSyncHandle,
        sid: u8,
        peer_address_type: AddressType,
        peer_address: BdAddr,
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
    /// The controller reported a failure nobody was waiting for
    UnexpectedError {
        opcode: u16,
        status: u8,
    },
}
