//! Runs a connectable peripheral against a scripted controller: advertise,
//! accept a connection, pair and encrypt the link.
//!
//! Controller commands are printed instead of being sent to hardware.

use blehost::gap::*;
use blehost::pal::*;
use blehost::smp::*;
use blehost::{BleResult, MemorySecurityDb};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Legacy controller printing every command it receives.
struct ConsoleGap;

impl PalGap for ConsoleGap {
    fn is_feature_supported(&self, feature: ControllerFeature) -> bool {
        matches!(feature, ControllerFeature::LeEncryption | ControllerFeature::LlPrivacy)
    }

    fn get_device_address(&self) -> BdAddr {
        BdAddr::new([0x9A, 0x78, 0x56, 0x34, 0x12, 0x00])
    }

    fn set_random_address(&mut self, address: &BdAddr) -> BleResult<()> {
        println!("gap> set_random_address({})", address);
        Ok(())
    }

    fn get_max_number_of_advertising_sets(&self) -> u8 {
        1
    }

    fn get_maximum_advertising_data_length(&self) -> u16 {
        31
    }

    fn read_white_list_capacity(&self) -> u8 {
        8
    }

    fn set_advertising_parameters(&mut self, params: &LegacyAdvertisingParameters) -> BleResult<()> {
        println!("gap> set_advertising_parameters({:?})", params);
        Ok(())
    }

    fn set_advertising_data(&mut self, data: &[u8]) -> BleResult<()> {
        println!("gap> set_advertising_data({:02x?})", data);
        Ok(())
    }

    fn set_scan_response_data(&mut self, data: &[u8]) -> BleResult<()> {
        println!("gap> set_scan_response_data({:02x?})", data);
        Ok(())
    }

    fn advertising_enable(&mut self, enable: bool) -> BleResult<()> {
        println!("gap> advertising_enable({})", enable);
        Ok(())
    }

    fn set_extended_advertising_parameters(
        &mut self,
        handle: AdvertisingHandle,
        _params: &AdvertisingParameters,
        _own_address_type: OwnAddressType,
    ) -> BleResult<()> {
        println!("gap> set_extended_advertising_parameters({})", handle);
        Ok(())
    }

    fn set_advertising_set_random_address(&mut self, handle: AdvertisingHandle, address: &BdAddr) -> BleResult<()> {
        println!("gap> set_advertising_set_random_address({}, {})", handle, address);
        Ok(())
    }

    fn set_extended_advertising_data(
        &mut self,
        handle: AdvertisingHandle,
        operation: AdvertisingDataOperation,
        _minimise_fragmentation: bool,
        data: &[u8],
    ) -> BleResult<()> {
        println!("gap> set_extended_advertising_data({}, {:?}, {} bytes)", handle, operation, data.len());
        Ok(())
    }

    fn set_extended_scan_response_data(
        &mut self,
        handle: AdvertisingHandle,
        operation: AdvertisingDataOperation,
        _minimise_fragmentation: bool,
        data: &[u8],
    ) -> BleResult<()> {
        println!("gap> set_extended_scan_response_data({}, {:?}, {} bytes)", handle, operation, data.len());
        Ok(())
    }

    fn extended_advertising_enable(&mut self, enable: bool, sets: &[AdvertisingEnableSet]) -> BleResult<()> {
        println!("gap> extended_advertising_enable({}, {:?})", enable, sets);
        Ok(())
    }

    fn remove_advertising_set(&mut self, handle: AdvertisingHandle) -> BleResult<()> {
        println!("gap> remove_advertising_set({})", handle);
        Ok(())
    }

    fn set_periodic_advertising_parameters(
        &mut self,
        handle: AdvertisingHandle,
        min_interval: u16,
        max_interval: u16,
        _advertise_tx_power: bool,
    ) -> BleResult<()> {
        println!("gap> set_periodic_advertising_parameters({}, {}, {})", handle, min_interval, max_interval);
        Ok(())
    }

    fn set_periodic_advertising_data(
        &mut self,
        handle: AdvertisingHandle,
        operation: AdvertisingDataOperation,
        data: &[u8],
    ) -> BleResult<()> {
        println!("gap> set_periodic_advertising_data({}, {:?}, {} bytes)", handle, operation, data.len());
        Ok(())
    }

    fn periodic_advertising_enable(&mut self, enable: bool, handle: AdvertisingHandle) -> BleResult<()> {
        println!("gap> periodic_advertising_enable({}, {})", enable, handle);
        Ok(())
    }

    fn set_scan_parameters(&mut self, own_address_type: OwnAddressType, params: &ScanParameters) -> BleResult<()> {
        println!("gap> set_scan_parameters({:?}, {:?})", own_address_type, params);
        Ok(())
    }

    fn scan_enable(&mut self, enable: bool, filter: DuplicatesFilter, duration: u16, period: u16) -> BleResult<()> {
        println!("gap> scan_enable({}, {:?}, {}, {})", enable, filter, duration, period);
        Ok(())
    }

    fn periodic_advertising_create_sync(&mut self, request: &PeriodicSyncRequest) -> BleResult<()> {
        println!("gap> periodic_advertising_create_sync({:?})", request);
        Ok(())
    }

    fn cancel_periodic_advertising_create_sync(&mut self) -> BleResult<()> {
        println!("gap> cancel_periodic_advertising_create_sync()");
        Ok(())
    }

    fn periodic_advertising_terminate_sync(&mut self, sync_handle: PeriodicSyncHandle) -> BleResult<()> {
        println!("gap> periodic_advertising_terminate_sync({})", sync_handle);
        Ok(())
    }

    fn add_device_to_periodic_advertiser_list(
        &mut self,
        address_type: PeerAddressType,
        address: &BdAddr,
        sid: u8,
    ) -> BleResult<()> {
        println!("gap> add_device_to_periodic_advertiser_list({:?}, {}, {})", address_type, address, sid);
        Ok(())
    }

    fn remove_device_from_periodic_advertiser_list(
        &mut self,
        address_type: PeerAddressType,
        address: &BdAddr,
        sid: u8,
    ) -> BleResult<()> {
        println!("gap> remove_device_from_periodic_advertiser_list({:?}, {}, {})", address_type, address, sid);
        Ok(())
    }

    fn clear_periodic_advertiser_list(&mut self) -> BleResult<()> {
        println!("gap> clear_periodic_advertiser_list()");
        Ok(())
    }

    fn read_periodic_advertiser_list_size(&self) -> u8 {
        0
    }

    fn create_connection(
        &mut self,
        own_address_type: OwnAddressType,
        peer_address_type: PeerAddressType,
        peer_address: &BdAddr,
        _params: &ConnectionParameters,
    ) -> BleResult<()> {
        println!(
            "gap> create_connection({:?}, {:?}, {})",
            own_address_type, peer_address_type, peer_address
        );
        Ok(())
    }

    fn cancel_connection_creation(&mut self) -> BleResult<()> {
        println!("gap> cancel_connection_creation()");
        Ok(())
    }

    fn disconnect(&mut self, connection: ConnectionHandle, reason: DisconnectionReason) -> BleResult<()> {
        println!("gap> disconnect({:#06x}, {:?})", connection, reason);
        Ok(())
    }

    fn connection_parameters_update(&mut self, connection: ConnectionHandle, update: &ConnectionUpdate) -> BleResult<()> {
        println!("gap> connection_parameters_update({:#06x}, {:?})", connection, update);
        Ok(())
    }

    fn accept_connection_parameter_request(
        &mut self,
        connection: ConnectionHandle,
        update: &ConnectionUpdate,
    ) -> BleResult<()> {
        println!("gap> accept_connection_parameter_request({:#06x}, {:?})", connection, update);
        Ok(())
    }

    fn reject_connection_parameter_request(
        &mut self,
        connection: ConnectionHandle,
        reason: DisconnectionReason,
    ) -> BleResult<()> {
        println!("gap> reject_connection_parameter_request({:#06x}, {:?})", connection, reason);
        Ok(())
    }

    fn read_phy(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        println!("gap> read_phy({:#06x})", connection);
        Ok(())
    }

    fn set_preferred_phys(&mut self, tx_phys: PhySet, rx_phys: PhySet) -> BleResult<()> {
        println!("gap> set_preferred_phys({:?}, {:?})", tx_phys, rx_phys);
        Ok(())
    }

    fn set_phy(
        &mut self,
        connection: ConnectionHandle,
        tx_phys: PhySet,
        rx_phys: PhySet,
        coded_symbols: CodedSymbolsPerBit,
    ) -> BleResult<()> {
        println!("gap> set_phy({:#06x}, {:?}, {:?}, {:?})", connection, tx_phys, rx_phys, coded_symbols);
        Ok(())
    }

    fn clear_whitelist(&mut self) -> BleResult<()> {
        println!("gap> clear_whitelist()");
        Ok(())
    }

    fn add_device_to_whitelist(&mut self, address_type: PeerAddressType, address: &BdAddr) -> BleResult<()> {
        println!("gap> add_device_to_whitelist({:?}, {})", address_type, address);
        Ok(())
    }

    fn remove_device_from_whitelist(&mut self, address_type: PeerAddressType, address: &BdAddr) -> BleResult<()> {
        println!("gap> remove_device_from_whitelist({:?}, {})", address_type, address);
        Ok(())
    }

    fn set_address_resolution(&mut self, enable: bool) -> BleResult<()> {
        println!("gap> set_address_resolution({})", enable);
        Ok(())
    }
}

/// SMP layer printing every command it receives.
struct ConsoleSmp;

impl PalSecurityManager for ConsoleSmp {
    fn initialize(&mut self) -> BleResult<()> {
        println!("smp> initialize()");
        Ok(())
    }

    fn get_secure_connections_support(&self) -> bool {
        true
    }

    fn set_io_capability(&mut self, io_capability: IoCapability) -> BleResult<()> {
        println!("smp> set_io_capability({:?})", io_capability);
        Ok(())
    }

    fn set_display_passkey(&mut self, passkey: u32) -> BleResult<()> {
        println!("smp> set_display_passkey({})", passkey);
        Ok(())
    }

    fn set_authentication_timeout(&mut self, connection: ConnectionHandle, timeout: u16) -> BleResult<()> {
        println!("smp> set_authentication_timeout({:#06x}, {})", connection, timeout);
        Ok(())
    }

    fn get_authentication_timeout(&self, _connection: ConnectionHandle) -> BleResult<u16> {
        Ok(3000)
    }

    fn set_encryption_key_requirements(&mut self, min_size: u8, max_size: u8) -> BleResult<()> {
        println!("smp> set_encryption_key_requirements({}, {})", min_size, max_size);
        Ok(())
    }

    fn set_private_address_timeout(&mut self, timeout_in_seconds: u16) -> BleResult<()> {
        println!("smp> set_private_address_timeout({})", timeout_in_seconds);
        Ok(())
    }

    fn send_pairing_request(
        &mut self,
        connection: ConnectionHandle,
        oob_data_flag: bool,
        authentication: AuthenticationMask,
        initiator_dist: KeyDistribution,
        responder_dist: KeyDistribution,
    ) -> BleResult<()> {
        println!(
            "smp> send_pairing_request({:#06x}, {}, {:?}, {:?}, {:?})",
            connection, oob_data_flag, authentication, initiator_dist, responder_dist
        );
        Ok(())
    }

    fn send_pairing_response(
        &mut self,
        connection: ConnectionHandle,
        oob_data_flag: bool,
        authentication: AuthenticationMask,
        initiator_dist: KeyDistribution,
        responder_dist: KeyDistribution,
    ) -> BleResult<()> {
        println!(
            "smp> send_pairing_response({:#06x}, {}, {:?}, {:?}, {:?})",
            connection, oob_data_flag, authentication, initiator_dist, responder_dist
        );
        Ok(())
    }

    fn cancel_pairing(&mut self, connection: ConnectionHandle, reason: PairingFailure) -> BleResult<()> {
        println!("smp> cancel_pairing({:#06x}, {})", connection, reason);
        Ok(())
    }

    fn slave_security_request(&mut self, connection: ConnectionHandle, authentication: AuthenticationMask) -> BleResult<()> {
        println!("smp> slave_security_request({:#06x}, {:?})", connection, authentication);
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
        println!("smp> enable_encryption({:#06x}, {}, {})", connection, ltk, mitm);
        Ok(())
    }

    fn enable_encryption_sc(&mut self, connection: ConnectionHandle, ltk: &Ltk, mitm: bool) -> BleResult<()> {
        println!("smp> enable_encryption_sc({:#06x}, {}, {})", connection, ltk, mitm);
        Ok(())
    }

    fn disable_encryption(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        println!("smp> disable_encryption({:#06x})", connection);
        Ok(())
    }

    fn set_ltk(
        &mut self,
        connection: ConnectionHandle,
        ltk: &Ltk,
        mitm: bool,
        secure_connections: bool,
    ) -> BleResult<()> {
        println!("smp> set_ltk({:#06x}, {}, {}, {})", connection, ltk, mitm, secure_connections);
        Ok(())
    }

    fn set_ltk_not_found(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        println!("smp> set_ltk_not_found({:#06x})", connection);
        Ok(())
    }

    fn set_csrk(&mut self, csrk: &Csrk) -> BleResult<()> {
        println!("smp> set_csrk({})", csrk);
        Ok(())
    }

    fn passkey_request_reply(&mut self, connection: ConnectionHandle, passkey: u32) -> BleResult<()> {
        println!("smp> passkey_request_reply({:#06x}, {:06})", connection, passkey);
        Ok(())
    }

    fn confirmation_entered(&mut self, connection: ConnectionHandle, confirmation: bool) -> BleResult<()> {
        println!("smp> confirmation_entered({:#06x}, {})", connection, confirmation);
        Ok(())
    }

    fn send_keypress_notification(&mut self, connection: ConnectionHandle, keypress: Keypress) -> BleResult<()> {
        println!("smp> send_keypress_notification({:#06x}, {:?})", connection, keypress);
        Ok(())
    }

    fn legacy_pairing_oob_request_reply(&mut self, connection: ConnectionHandle, _tk: &OobTk) -> BleResult<()> {
        println!("smp> legacy_pairing_oob_request_reply({:#06x})", connection);
        Ok(())
    }

    fn secure_connections_oob_request_reply(
        &mut self,
        connection: ConnectionHandle,
        _peer_random: &OobRand,
        _peer_confirm: &OobConfirm,
    ) -> BleResult<()> {
        println!("smp> secure_connections_oob_request_reply({:#06x})", connection);
        Ok(())
    }

    fn clear_resolving_list(&mut self) -> BleResult<()> {
        println!("smp> clear_resolving_list()");
        Ok(())
    }

    fn add_device_to_resolving_list(
        &mut self,
        identity_address_is_public: bool,
        identity_address: &BdAddr,
        _irk: &Irk,
    ) -> BleResult<()> {
        println!(
            "smp> add_device_to_resolving_list({}, {})",
            identity_address_is_public, identity_address
        );
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut gap = GapManager::new(ConsoleGap, VirtualTimers::new(), GapConfig::default());
    gap.set_event_callback(|event| println!("gap event: {:?}", event));

    let security = Rc::new(RefCell::new(SecurityManager::new(ConsoleSmp, MemorySecurityDb::new())));
    {
        let mut sm = security.borrow_mut();
        sm.init(SecurityConfig::default())?;
        sm.set_event_callback(|event| println!("security event: {:?}", event));
    }
    gap.set_connection_event_monitor(Box::new(security.clone()));

    let mut payload = ad_structure(
        ADV_TYPE_FLAGS,
        &[ADV_FLAG_LE_GENERAL_DISCOVERABLE | ADV_FLAG_BR_EDR_NOT_SUPPORTED],
    );
    payload.extend(ad_structure(ADV_TYPE_COMPLETE_LOCAL_NAME, b"blehost"));

    let handle = gap.create_advertising_set(&AdvertisingParameters::default())?;
    gap.set_advertising_payload(handle, &payload, false)?;
    gap.start_advertising(handle, 1000, 0)?;
    println!("advertising on set {} for 10 s", handle);

    for id in gap.timers_mut().advance(Duration::from_secs(2)) {
        gap.on_timer(id);
    }

    let connection: ConnectionHandle = 0x0040;
    let central = BdAddr::new([0x01, 0x02, 0x03, 0x04, 0x05, 0xC0]);
    gap.on_pal_event(PalGapEvent::ConnectionComplete(ConnectionCompleteEvent {
        status: HCI_SUCCESS,
        connection,
        role: Role::Peripheral,
        peer_address_type: AddressType::Random,
        peer_address: central,
        local_resolvable_private_address: BdAddr::ZERO,
        peer_resolvable_private_address: BdAddr::ZERO,
        connection_interval: 24,
        connection_latency: 0,
        supervision_timeout: 200,
    }));

    security
        .borrow_mut()
        .set_link_security(connection, SecurityMode::EncryptionNoMitm)?;

    // The central answers with a pairing request and runs just works pairing
    let ltk = Ltk::new([0x3C; 16]);
    let mut sm = security.borrow_mut();
    sm.on_pal_event(PalSecurityEvent::PairingRequest {
        connection,
        use_oob: false,
        authentication: AuthenticationMask::BONDING | AuthenticationMask::SECURE_CONNECTIONS,
        initiator_dist: KeyDistribution::IDENTITY,
        responder_dist: KeyDistribution::ENCRYPTION | KeyDistribution::IDENTITY,
    });
    sm.on_pal_event(PalSecurityEvent::SecureConnectionsLtkGenerated { connection, ltk });
    sm.on_pal_event(PalSecurityEvent::LinkEncryptionResult {
        connection,
        result: LinkEncryption::Encrypted,
        encryption_key_size: 16,
    });
    sm.on_pal_event(PalSecurityEvent::PairingCompleted(connection));
    println!(
        "link encryption: {:?}, key size {}",
        sm.get_link_encryption(connection)?,
        sm.get_encryption_key_size(connection)?
    );
    drop(sm);

    gap.on_pal_event(PalGapEvent::DisconnectionComplete {
        status: HCI_SUCCESS,
        connection,
        reason: DisconnectionReason::RemoteUserTerminatedConnection,
    });

    Ok(())
}
