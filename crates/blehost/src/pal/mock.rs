//! Recording controllers for unit tests

use super::*;
use crate::error::{BleError, BleResult};
use crate::gap::*;
use crate::smp::*;
use std::collections::HashMap;

/// Mock GAP controller recording every command it receives.
pub(crate) struct MockPalGap {
    pub extended: bool,
    pub periodic: bool,
    pub privacy: bool,
    pub max_sets: u8,
    pub max_data_length: u16,
    pub whitelist_capacity: u8,
    pub device_address: BdAddr,
    /// Next command with this name fails
    pub fail_on: Option<&'static str>,

    pub calls: Vec<&'static str>,
    pub data_fragments: Vec<(AdvertisingHandle, AdvertisingDataOperation, usize)>,
    pub legacy_parameters: Option<LegacyAdvertisingParameters>,
    pub own_address_types: Vec<OwnAddressType>,
    pub random_address: Option<BdAddr>,
    pub set_random_addresses: HashMap<AdvertisingHandle, BdAddr>,
    pub enabled_sets: Vec<(bool, AdvertisingEnableSet)>,
    pub scan_enable: Vec<(bool, DuplicatesFilter, u16, u16)>,
    pub whitelist: Vec<(PeerAddressType, BdAddr)>,
    pub address_resolution: Option<bool>,
    pub disconnections: Vec<(ConnectionHandle, DisconnectionReason)>,
    pub sync_requests: Vec<PeriodicSyncRequest>,
}

impl MockPalGap {
    pub fn extended() -> Self {
        Self {
            extended: true,
            periodic: true,
            privacy: true,
            max_sets: 4,
            max_data_length: 1650,
            whitelist_capacity: 4,
            device_address: BdAddr::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
            fail_on: None,
            calls: Vec::new(),
            data_fragments: Vec::new(),
            legacy_parameters: None,
            own_address_types: Vec::new(),
            random_address: None,
            set_random_addresses: HashMap::new(),
            enabled_sets: Vec::new(),
            scan_enable: Vec::new(),
            whitelist: Vec::new(),
            address_resolution: None,
            disconnections: Vec::new(),
            sync_requests: Vec::new(),
        }
    }

    pub fn legacy() -> Self {
        Self {
            extended: false,
            periodic: false,
            max_sets: 1,
            max_data_length: 31,
            ..Self::extended()
        }
    }

    fn record(&mut self, call: &'static str) -> BleResult<()> {
        self.calls.push(call);
        if self.fail_on == Some(call) {
            self.fail_on = None;
            return Err(BleError::Pal(format!("{} failed", call)));
        }
        Ok(())
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }
}

impl PalGap for MockPalGap {
    fn is_feature_supported(&self, feature: ControllerFeature) -> bool {
        match feature {
            ControllerFeature::LeExtendedAdvertising | ControllerFeature::Le2mPhy | ControllerFeature::LeCodedPhy => {
                self.extended
            }
            ControllerFeature::LePeriodicAdvertising => self.periodic,
            ControllerFeature::LlPrivacy => self.privacy,
            ControllerFeature::LeEncryption | ControllerFeature::ConnectionParametersRequestProcedure => true,
        }
    }

    fn get_device_address(&self) -> BdAddr {
        self.device_address
    }

    fn set_random_address(&mut self, address: &BdAddr) -> BleResult<()> {
        self.record("set_random_address")?;
        self.random_address = Some(*address);
        Ok(())
    }

    fn get_max_number_of_advertising_sets(&self) -> u8 {
        self.max_sets
    }

    fn get_maximum_advertising_data_length(&self) -> u16 {
        self.max_data_length
    }

    fn read_white_list_capacity(&self) -> u8 {
        self.whitelist_capacity
    }

    fn set_advertising_parameters(&mut self, params: &LegacyAdvertisingParameters) -> BleResult<()> {
        self.record("set_advertising_parameters")?;
        self.own_address_types.push(params.own_address_type);
        self.legacy_parameters = Some(*params);
        Ok(())
    }

    fn set_advertising_data(&mut self, data: &[u8]) -> BleResult<()> {
        self.record("set_advertising_data")?;
        self.data_fragments
            .push((LEGACY_ADVERTISING_HANDLE, AdvertisingDataOperation::CompleteFragment, data.len()));
        Ok(())
    }

    fn set_scan_response_data(&mut self, _data: &[u8]) -> BleResult<()> {
        self.record("set_scan_response_data")
    }

    fn advertising_enable(&mut self, enable: bool) -> BleResult<()> {
        self.record(if enable { "advertising_enable" } else { "advertising_disable" })
    }

    fn set_extended_advertising_parameters(
        &mut self,
        _handle: AdvertisingHandle,
        _params: &AdvertisingParameters,
        own_address_type: OwnAddressType,
    ) -> BleResult<()> {
        self.record("set_extended_advertising_parameters")?;
        self.own_address_types.push(own_address_type);
        Ok(())
    }

    fn set_advertising_set_random_address(&mut self, handle: AdvertisingHandle, address: &BdAddr) -> BleResult<()> {
        self.record("set_advertising_set_random_address")?;
        self.set_random_addresses.insert(handle, *address);
        Ok(())
    }

    fn set_extended_advertising_data(
        &mut self,
        handle: AdvertisingHandle,
        operation: AdvertisingDataOperation,
        _minimise_fragmentation: bool,
        data: &[u8],
    ) -> BleResult<()> {
        self.record("set_extended_advertising_data")?;
        self.data_fragments.push((handle, operation, data.len()));
        Ok(())
    }

    fn set_extended_scan_response_data(
        &mut self,
        _handle: AdvertisingHandle,
        _operation: AdvertisingDataOperation,
        _minimise_fragmentation: bool,
        _data: &[u8],
    ) -> BleResult<()> {
        self.record("set_extended_scan_response_data")
    }

    fn extended_advertising_enable(&mut self, enable: bool, sets: &[AdvertisingEnableSet]) -> BleResult<()> {
        self.record(if enable {
            "extended_advertising_enable"
        } else {
            "extended_advertising_disable"
        })?;
        self.enabled_sets.extend(sets.iter().map(|set| (enable, *set)));
        Ok(())
    }

    fn remove_advertising_set(&mut self, _handle: AdvertisingHandle) -> BleResult<()> {
        self.record("remove_advertising_set")
    }

    fn set_periodic_advertising_parameters(
        &mut self,
        _handle: AdvertisingHandle,
        _min_interval: u16,
        _max_interval: u16,
        _advertise_tx_power: bool,
    ) -> BleResult<()> {
        self.record("set_periodic_advertising_parameters")
    }

    fn set_periodic_advertising_data(
        &mut self,
        handle: AdvertisingHandle,
        operation: AdvertisingDataOperation,
        data: &[u8],
    ) -> BleResult<()> {
        self.record("set_periodic_advertising_data")?;
        self.data_fragments.push((handle, operation, data.len()));
        Ok(())
    }

    fn periodic_advertising_enable(&mut self, enable: bool, _handle: AdvertisingHandle) -> BleResult<()> {
        self.record(if enable {
            "periodic_advertising_enable"
        } else {
            "periodic_advertising_disable"
        })
    }

    fn set_scan_parameters(&mut self, own_address_type: OwnAddressType, _params: &ScanParameters) -> BleResult<()> {
        self.record("set_scan_parameters")?;
        self.own_address_types.push(own_address_type);
        Ok(())
    }

    fn scan_enable(&mut self, enable: bool, filter: DuplicatesFilter, duration: u16, period: u16) -> BleResult<()> {
        self.record("scan_enable")?;
        self.scan_enable.push((enable, filter, duration, period));
        Ok(())
    }

    fn periodic_advertising_create_sync(&mut self, request: &PeriodicSyncRequest) -> BleResult<()> {
        self.record("periodic_advertising_create_sync")?;
        self.sync_requests.push(*request);
        Ok(())
    }

    fn cancel_periodic_advertising_create_sync(&mut self) -> BleResult<()> {
        self.record("cancel_periodic_advertising_create_sync")
    }

    fn periodic_advertising_terminate_sync(&mut self, _sync_handle: PeriodicSyncHandle) -> BleResult<()> {
        self.record("periodic_advertising_terminate_sync")
    }

    fn add_device_to_periodic_advertiser_list(
        &mut self,
        _address_type: PeerAddressType,
        _address: &BdAddr,
        _sid: u8,
    ) -> BleResult<()> {
        self.record("add_device_to_periodic_advertiser_list")
    }

    fn remove_device_from_periodic_advertiser_list(
        &mut self,
        _address_type: PeerAddressType,
        _address: &BdAddr,
        _sid: u8,
    ) -> BleResult<()> {
        self.record("remove_device_from_periodic_advertiser_list")
    }

    fn clear_periodic_advertiser_list(&mut self) -> BleResult<()> {
        self.record("clear_periodic_advertiser_list")
    }

    fn read_periodic_advertiser_list_size(&self) -> u8 {
        8
    }

    fn create_connection(
        &mut self,
        own_address_type: OwnAddressType,
        _peer_address_type: PeerAddressType,
        _peer_address: &BdAddr,
        _params: &ConnectionParameters,
    ) -> BleResult<()> {
        self.record("create_connection")?;
        self.own_address_types.push(own_address_type);
        Ok(())
    }

    fn cancel_connection_creation(&mut self) -> BleResult<()> {
        self.record("cancel_connection_creation")
    }

    fn disconnect(&mut self, connection: ConnectionHandle, reason: DisconnectionReason) -> BleResult<()> {
        self.record("disconnect")?;
        self.disconnections.push((connection, reason));
        Ok(())
    }

    fn connection_parameters_update(&mut self, _connection: ConnectionHandle, _update: &ConnectionUpdate) -> BleResult<()> {
        self.record("connection_parameters_update")
    }

    fn accept_connection_parameter_request(
        &mut self,
        _connection: ConnectionHandle,
        _update: &ConnectionUpdate,
    ) -> BleResult<()> {
        self.record("accept_connection_parameter_request")
    }

    fn reject_connection_parameter_request(
        &mut self,
        _connection: ConnectionHandle,
        _reason: DisconnectionReason,
    ) -> BleResult<()> {
        self.record("reject_connection_parameter_request")
    }

    fn read_phy(&mut self, _connection: ConnectionHandle) -> BleResult<()> {
        self.record("read_phy")
    }

    fn set_preferred_phys(&mut self, _tx_phys: PhySet, _rx_phys: PhySet) -> BleResult<()> {
        self.record("set_preferred_phys")
    }

    fn set_phy(
        &mut self,
        _connection: ConnectionHandle,
        _tx_phys: PhySet,
        _rx_phys: PhySet,
        _coded_symbols: CodedSymbolsPerBit,
    ) -> BleResult<()> {
        self.record("set_phy")
    }

    fn clear_whitelist(&mut self) -> BleResult<()> {
        self.record("clear_whitelist")?;
        self.whitelist.clear();
        Ok(())
    }

    fn add_device_to_whitelist(&mut self, address_type: PeerAddressType, address: &BdAddr) -> BleResult<()> {
        self.record("add_device_to_whitelist")?;
        self.whitelist.push((address_type, *address));
        Ok(())
    }

    fn remove_device_from_whitelist(&mut self, address_type: PeerAddressType, address: &BdAddr) -> BleResult<()> {
        self.record("remove_device_from_whitelist")?;
        self.whitelist.retain(|entry| *entry != (address_type, *address));
        Ok(())
    }

    fn set_address_resolution(&mut self, enable: bool) -> BleResult<()> {
        self.record("set_address_resolution")?;
        self.address_resolution = Some(enable);
        Ok(())
    }
}

/// Mock SMP layer recording every command it receives.
#[derive(Default)]
pub(crate) struct MockPalSecurity {
    pub secure_connections: bool,
    pub calls: Vec<&'static str>,
    pub pairing_requests: Vec<(ConnectionHandle, AuthenticationMask)>,
    pub pairing_responses: Vec<(ConnectionHandle, AuthenticationMask)>,
    pub cancelled: Vec<(ConnectionHandle, PairingFailure)>,
    pub slave_security_requests: Vec<(ConnectionHandle, AuthenticationMask)>,
    pub encryptions: Vec<(ConnectionHandle, Ltk, bool)>,
    pub disabled_encryptions: Vec<ConnectionHandle>,
    pub ltk_replies: Vec<(ConnectionHandle, Ltk, bool, bool)>,
    pub ltk_not_found: Vec<ConnectionHandle>,
    pub passkey_replies: Vec<(ConnectionHandle, u32)>,
    pub resolving_list: Vec<(bool, BdAddr, Irk)>,
    pub key_requirements: Option<(u8, u8)>,
    pub io_capability: Option<IoCapability>,
    pub authentication_timeouts: HashMap<ConnectionHandle, u16>,
}

impl MockPalSecurity {
    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }
}

impl PalSecurityManager for MockPalSecurity {
    fn initialize(&mut self) -> BleResult<()> {
        self.calls.push("initialize");
        Ok(())
    }

    fn get_secure_connections_support(&self) -> bool {
        self.secure_connections
    }

    fn set_io_capability(&mut self, io_capability: IoCapability) -> BleResult<()> {
        self.calls.push("set_io_capability");
        self.io_capability = Some(io_capability);
        Ok(())
    }

    fn set_display_passkey(&mut self, _passkey: u32) -> BleResult<()> {
        self.calls.push("set_display_passkey");
        Ok(())
    }

    fn set_authentication_timeout(&mut self, connection: ConnectionHandle, timeout: u16) -> BleResult<()> {
        self.calls.push("set_authentication_timeout");
        self.authentication_timeouts.insert(connection, timeout);
        Ok(())
    }

    fn get_authentication_timeout(&self, connection: ConnectionHandle) -> BleResult<u16> {
        Ok(self.authentication_timeouts.get(&connection).copied().unwrap_or(3000))
    }

    fn set_encryption_key_requirements(&mut self, min_size: u8, max_size: u8) -> BleResult<()> {
        self.calls.push("set_encryption_key_requirements");
        self.key_requirements = Some((min_size, max_size));
        Ok(())
    }

    fn set_private_address_timeout(&mut self, _timeout_in_seconds: u16) -> BleResult<()> {
        self.calls.push("set_private_address_timeout");
        Ok(())
    }

    fn send_pairing_request(
        &mut self,
        connection: ConnectionHandle,
        _oob_data_flag: bool,
        authentication: AuthenticationMask,
        _initiator_dist: KeyDistribution,
        _responder_dist: KeyDistribution,
    ) -> BleResult<()> {
        self.calls.push("send_pairing_request");
        self.pairing_requests.push((connection, authentication));
        Ok(())
    }

    fn send_pairing_response(
        &mut self,
        connection: ConnectionHandle,
        _oob_data_flag: bool,
        authentication: AuthenticationMask,
        _initiator_dist: KeyDistribution,
        _responder_dist: KeyDistribution,
    ) -> BleResult<()> {
        self.calls.push("send_pairing_response");
        self.pairing_responses.push((connection, authentication));
        Ok(())
    }

    fn cancel_pairing(&mut self, connection: ConnectionHandle, reason: PairingFailure) -> BleResult<()> {
        self.calls.push("cancel_pairing");
        self.cancelled.push((connection, reason));
        Ok(())
    }

    fn slave_security_request(&mut self, connection: ConnectionHandle, authentication: AuthenticationMask) -> BleResult<()> {
        self.calls.push("slave_security_request");
        self.slave_security_requests.push((connection, authentication));
        Ok(())
    }

    fn enable_encryption(
        &mut self,
        connection: ConnectionHandle,
        ltk: &Ltk,
        _rand: &Rand,
        _ediv: &Ediv,
        mitm: bool,
    ) -> BleResult<()> {
        self.calls.push("enable_encryption");
        self.encryptions.push((connection, *ltk, mitm));
        Ok(())
    }

    fn enable_encryption_sc(&mut self, connection: ConnectionHandle, ltk: &Ltk, mitm: bool) -> BleResult<()> {
        self.calls.push("enable_encryption_sc");
        self.encryptions.push((connection, *ltk, mitm));
        Ok(())
    }

    fn disable_encryption(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        self.calls.push("disable_encryption");
        self.disabled_encryptions.push(connection);
        Ok(())
    }

    fn set_ltk(
        &mut self,
        connection: ConnectionHandle,
        ltk: &Ltk,
        mitm: bool,
        secure_connections: bool,
    ) -> BleResult<()> {
        self.calls.push("set_ltk");
        self.ltk_replies.push((connection, *ltk, mitm, secure_connections));
        Ok(())
    }

    fn set_ltk_not_found(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        self.calls.push("set_ltk_not_found");
        self.ltk_not_found.push(connection);
        Ok(())
    }

    fn set_csrk(&mut self, _csrk: &Csrk) -> BleResult<()> {
        self.calls.push("set_csrk");
        Ok(())
    }

    fn passkey_request_reply(&mut self, connection: ConnectionHandle, passkey: u32) -> BleResult<()> {
        self.calls.push("passkey_request_reply");
        self.passkey_replies.push((connection, passkey));
        Ok(())
    }

    fn confirmation_entered(&mut self, _connection: ConnectionHandle, _confirmation: bool) -> BleResult<()> {
        self.calls.push("confirmation_entered");
        Ok(())
    }

    fn send_keypress_notification(&mut self, _connection: ConnectionHandle, _keypress: Keypress) -> BleResult<()> {
        self.calls.push("send_keypress_notification");
        Ok(())
    }

    fn legacy_pairing_oob_request_reply(&mut self, _connection: ConnectionHandle, _tk: &OobTk) -> BleResult<()> {
        self.calls.push("legacy_pairing_oob_request_reply");
        Ok(())
    }

    fn secure_connections_oob_request_reply(
        &mut self,
        _connection: ConnectionHandle,
        _peer_random: &OobRand,
        _peer_confirm: &OobConfirm,
    ) -> BleResult<()> {
        self.calls.push("secure_connections_oob_request_reply");
        Ok(())
    }

    fn clear_resolving_list(&mut self) -> BleResult<()> {
        self.calls.push("clear_resolving_list");
        self.resolving_list.clear();
        Ok(())
    }

    fn add_device_to_resolving_list(
        &mut self,
        identity_address_is_public: bool,
        identity_address: &BdAddr,
        irk: &Irk,
    ) -> BleResult<()> {
        self.calls.push("add_device_to_resolving_list");
        self.resolving_list.push((identity_address_is_public, *identity_address, *irk));
        Ok(())
    }
}
