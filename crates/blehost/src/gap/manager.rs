//! GAP manager
//!
//! Drives advertising sets, scanning, periodic advertising sync, connection
//! establishment and address privacy on top of a [`PalGap`] controller.
//! Everything runs on the caller's event loop: controller events come in
//! through [`GapManager::on_pal_event`] and timer expiries through
//! [`GapManager::on_timer`].

use super::advertising::{AdvertisingApi, AdvertisingSets, AdvertisingState, PeriodicState};
use super::constants::*;
use super::events::{ConnectionCompleteEvent, GapEvent};
use super::privacy::{
    self, AddressUseType, CentralPrivacyConfiguration, CentralResolutionStrategy,
    PeripheralPrivacyConfiguration, PeripheralResolutionStrategy,
};
use super::scan::AdvertisingReport;
use super::timer::{TimerId, Timers};
use super::types::*;
use crate::error::{BleError, BleResult};
use crate::pal::{
    AdvertisingEnableSet, ConnectionEventMonitor, ControllerFeature, LegacyAdvertisingParameters,
    PalGap, PalGapEvent, PeriodicSyncRequest,
};
use std::time::Duration;

/// Type for GAP event callback
pub type GapEventCallback = Box<dyn FnMut(GapEvent)>;

fn unknown_set(handle: AdvertisingHandle) -> BleError {
    BleError::invalid(format!("unknown advertising set {}", handle))
}

fn advertising_use_type(params: &AdvertisingParameters) -> AddressUseType {
    if params.advertising_type().is_connectable() {
        AddressUseType::PeripheralConnectable
    } else {
        AddressUseType::PeripheralNonConnectable
    }
}

/// Splits advertising data into chunks fitting one HCI command.
pub(crate) fn fragment_advertising_data(payload: &[u8]) -> Vec<(AdvertisingDataOperation, &[u8])> {
    if payload.len() <= MAX_HCI_DATA_LENGTH {
        return vec![(AdvertisingDataOperation::CompleteFragment, payload)];
    }
    let count = payload.len().div_ceil(MAX_HCI_DATA_LENGTH);
    payload
        .chunks(MAX_HCI_DATA_LENGTH)
        .enumerate()
        .map(|(index, chunk)| {
            let operation = if index == 0 {
                AdvertisingDataOperation::FirstFragment
            } else if index + 1 == count {
                AdvertisingDataOperation::LastFragment
            } else {
                AdvertisingDataOperation::IntermediateFragment
            };
            (operation, chunk)
        })
        .collect()
}

/// Which payload of a set is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payload {
    Advertising,
    ScanResponse,
}

/// GAP manager
pub struct GapManager<P: PalGap, T: Timers> {
    pal: P,
    timers: T,
    config: GapConfig,

    event_callback: Option<GapEventCallback>,
    connection_monitor: Option<Box<dyn ConnectionEventMonitor>>,

    advertising_sets: AdvertisingSets,
    scan_parameters: ScanParameters,
    scanning: bool,

    /// Configured identity: public device address or static random address
    address_type: AddressType,
    address: BdAddr,
    privacy_enabled: bool,
    peripheral_privacy: PeripheralPrivacyConfiguration,
    central_privacy: CentralPrivacyConfiguration,
    random_address_rotating: bool,
    non_resolvable_address: Option<BdAddr>,
    pending_address_rotation: bool,

    whitelist: Whitelist,
}

impl<P: PalGap, T: Timers> GapManager<P, T> {
    /// Creates a GAP manager owning the controller interface and the timers.
    pub fn new(pal: P, timers: T, config: GapConfig) -> Self {
        let capacity = if pal.is_feature_supported(ControllerFeature::LeExtendedAdvertising) {
            (pal.get_max_number_of_advertising_sets() as usize).min(config.max_advertising_sets)
        } else {
            1
        };
        let address = pal.get_device_address();
        let whitelist = Whitelist::new(pal.read_white_list_capacity() as usize);
        log::debug!("GAP manager with {} advertising sets", capacity);

        Self {
            pal,
            timers,
            config,
            event_callback: None,
            connection_monitor: None,
            advertising_sets: AdvertisingSets::new(capacity),
            scan_parameters: ScanParameters::default(),
            scanning: false,
            address_type: AddressType::Public,
            address,
            privacy_enabled: false,
            peripheral_privacy: PeripheralPrivacyConfiguration::default(),
            central_privacy: CentralPrivacyConfiguration::default(),
            random_address_rotating: false,
            non_resolvable_address: None,
            pending_address_rotation: false,
            whitelist,
        }
    }

    pub fn pal(&self) -> &P {
        &self.pal
    }

    pub fn pal_mut(&mut self) -> &mut P {
        &mut self.pal
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }

    /// Set callback for GAP events
    pub fn set_event_callback<F>(&mut self, callback: F)
    where
        F: FnMut(GapEvent) + 'static,
    {
        self.event_callback = Some(Box::new(callback));
    }

    /// Registers the observer told about connections and disconnections,
    /// typically the Security Manager.
    pub fn set_connection_event_monitor(&mut self, monitor: Box<dyn ConnectionEventMonitor>) {
        self.connection_monitor = Some(monitor);
    }

    fn notify(&mut self, event: GapEvent) {
        if let Some(callback) = self.event_callback.as_mut() {
            callback(event);
        }
    }

    fn is_extended_advertising_available(&self) -> bool {
        self.pal.is_feature_supported(ControllerFeature::LeExtendedAdvertising)
    }

    fn is_periodic_advertising_available(&self) -> bool {
        self.pal.is_feature_supported(ControllerFeature::LePeriodicAdvertising)
    }

    fn own_address(&self, use_type: AddressUseType) -> OwnAddressType {
        privacy::own_address_type(
            self.privacy_enabled,
            self.address_type,
            &self.central_privacy,
            &self.peripheral_privacy,
            use_type,
        )
    }

    /// Address the controller uses as its random address.
    fn random_address(&self) -> BdAddr {
        self.non_resolvable_address.unwrap_or(self.address)
    }

    fn check_phys(&self, phys: PhySet) -> BleResult<()> {
        if phys.contains(PhySet::LE_2M) && !self.pal.is_feature_supported(ControllerFeature::Le2mPhy) {
            return Err(BleError::NotImplemented);
        }
        if phys.contains(PhySet::LE_CODED) && !self.pal.is_feature_supported(ControllerFeature::LeCodedPhy) {
            return Err(BleError::NotImplemented);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Advertising sets
    // ---------------------------------------------------------------------

    /// Number of advertising sets that can exist at once.
    pub fn max_advertising_set_number(&self) -> usize {
        self.advertising_sets.capacity()
    }

    /// Maximum payload of an advertising set.
    pub fn max_advertising_data_length(&self) -> usize {
        if self.is_extended_advertising_available() {
            self.pal.get_maximum_advertising_data_length() as usize
        } else {
            LEGACY_ADVERTISING_MAX_DATA_LENGTH
        }
    }

    /// Allocates an advertising set and applies its parameters.
    pub fn create_advertising_set(&mut self, params: &AdvertisingParameters) -> BleResult<AdvertisingHandle> {
        let handle = self
            .advertising_sets
            .allocate(params.clone())
            .ok_or_else(|| BleError::invalid("no free advertising set"))?;
        if let Err(err) = self.apply_advertising_parameters(handle, params) {
            self.advertising_sets.release(handle);
            return Err(err);
        }
        self.note_api(handle, AdvertisingApi::Extended);
        log::debug!("created advertising set {}", handle);
        Ok(handle)
    }

    /// Frees an advertising set. Active sets must be stopped first.
    pub fn destroy_advertising_set(&mut self, handle: AdvertisingHandle) -> BleResult<()> {
        let set = self.advertising_sets.get(handle).ok_or_else(|| unknown_set(handle))?;
        if set.is_active() || set.periodic == PeriodicState::Active {
            return Err(BleError::OperationNotPermitted);
        }
        if self.is_extended_advertising_available() {
            self.pal.remove_advertising_set(handle)?;
        }
        self.timers.cancel(TimerId::Advertising(handle));
        self.advertising_sets.release(handle);
        log::debug!("destroyed advertising set {}", handle);
        Ok(())
    }

    pub fn set_advertising_parameters(
        &mut self,
        handle: AdvertisingHandle,
        params: &AdvertisingParameters,
    ) -> BleResult<()> {
        if self.advertising_sets.get(handle).is_none() {
            return Err(unknown_set(handle));
        }
        self.note_api(handle, AdvertisingApi::Extended);
        self.apply_advertising_parameters(handle, params)?;
        if let Some(set) = self.advertising_sets.get_mut(handle) {
            set.parameters = params.clone();
        }
        Ok(())
    }

    fn apply_advertising_parameters(
        &mut self,
        handle: AdvertisingHandle,
        params: &AdvertisingParameters,
    ) -> BleResult<()> {
        let own_address_type = self.own_address(advertising_use_type(params));

        if self.is_extended_advertising_available() {
            self.check_phys(PhySet::from(params.primary_phy()) | PhySet::from(params.secondary_phy()))?;
            self.pal
                .set_extended_advertising_parameters(handle, params, own_address_type)?;
            if own_address_type == OwnAddressType::Random {
                let address = self.random_address();
                self.pal.set_advertising_set_random_address(handle, &address)?;
            }
            return Ok(());
        }

        if params.primary_phy() != Phy::Le1M || params.secondary_phy() != Phy::Le1M || !params.use_legacy_pdu() {
            return Err(BleError::NotImplemented);
        }
        let legacy = LegacyAdvertisingParameters {
            min_interval: params.min_primary_interval().min(u16::MAX as u32) as u16,
            max_interval: params.max_primary_interval().min(u16::MAX as u32) as u16,
            advertising_type: params.advertising_type(),
            own_address_type,
            peer_address_type: params.peer_address_type(),
            peer_address: *params.peer_address(),
            channel_map: params.channel_map(),
            filter_policy: params.filter_policy(),
        };
        self.pal.set_advertising_parameters(&legacy)
    }

    /// Sets the advertising payload of a set.
    pub fn set_advertising_payload(
        &mut self,
        handle: AdvertisingHandle,
        payload: &[u8],
        minimise_fragmentation: bool,
    ) -> BleResult<()> {
        if self.advertising_sets.get(handle).is_none() {
            return Err(unknown_set(handle));
        }
        self.note_api(handle, AdvertisingApi::Extended);
        self.write_payload(handle, payload, minimise_fragmentation, Payload::Advertising)
    }

    /// Sets the scan response of a set.
    pub fn set_advertising_scan_response(
        &mut self,
        handle: AdvertisingHandle,
        response: &[u8],
        minimise_fragmentation: bool,
    ) -> BleResult<()> {
        if self.advertising_sets.get(handle).is_none() {
            return Err(unknown_set(handle));
        }
        self.note_api(handle, AdvertisingApi::Extended);
        self.write_payload(handle, response, minimise_fragmentation, Payload::ScanResponse)
    }

    fn write_payload(
        &mut self,
        handle: AdvertisingHandle,
        payload: &[u8],
        minimise_fragmentation: bool,
        kind: Payload,
    ) -> BleResult<()> {
        let set = self.advertising_sets.get(handle).ok_or_else(|| unknown_set(handle))?;
        let legacy_pdu = set.parameters.use_legacy_pdu();

        if self.is_extended_advertising_available() {
            let max = if legacy_pdu {
                LEGACY_ADVERTISING_MAX_DATA_LENGTH
            } else {
                self.pal.get_maximum_advertising_data_length() as usize
            };
            if payload.len() > max {
                return Err(BleError::invalid(format!("payload of {} bytes exceeds {}", payload.len(), max)));
            }
            for (operation, fragment) in fragment_advertising_data(payload) {
                match kind {
                    Payload::Advertising => self.pal.set_extended_advertising_data(
                        handle,
                        operation,
                        minimise_fragmentation,
                        fragment,
                    )?,
                    Payload::ScanResponse => self.pal.set_extended_scan_response_data(
                        handle,
                        operation,
                        minimise_fragmentation,
                        fragment,
                    )?,
                }
            }
        } else {
            if payload.len() > LEGACY_ADVERTISING_MAX_DATA_LENGTH {
                return Err(BleError::invalid(format!(
                    "payload of {} bytes exceeds {}",
                    payload.len(),
                    LEGACY_ADVERTISING_MAX_DATA_LENGTH
                )));
            }
            match kind {
                Payload::Advertising => self.pal.set_advertising_data(payload)?,
                Payload::ScanResponse => self.pal.set_scan_response_data(payload)?,
            }
        }

        if let Some(set) = self.advertising_sets.get_mut(handle) {
            set.mark_configured();
        }
        Ok(())
    }

    /// Starts advertising a set.
    ///
    /// `max_duration` is in 10 ms units and `max_events` counts advertising
    /// events; 0 means no limit. Starting an active set is a no-op.
    pub fn start_advertising(
        &mut self,
        handle: AdvertisingHandle,
        max_duration: u16,
        max_events: u8,
    ) -> BleResult<()> {
        if self.advertising_sets.get(handle).is_none() {
            return Err(unknown_set(handle));
        }
        self.note_api(handle, AdvertisingApi::Extended);
        self.enable_set(handle, max_duration, max_events)
    }

    fn enable_set(&mut self, handle: AdvertisingHandle, max_duration: u16, max_events: u8) -> BleResult<()> {
        let set = self.advertising_sets.get(handle).ok_or_else(|| unknown_set(handle))?;
        if set.is_active() {
            return Ok(());
        }

        if self.is_extended_advertising_available() {
            self.pal.extended_advertising_enable(
                true,
                &[AdvertisingEnableSet {
                    handle,
                    duration: max_duration,
                    max_events,
                }],
            )?;
        } else {
            if max_events != 0 {
                return Err(BleError::NotImplemented);
            }
            self.apply_pending_address_rotation();
            self.pal.advertising_enable(true)?;
            if max_duration != 0 {
                self.timers.schedule(
                    TimerId::Advertising(handle),
                    Duration::from_millis(max_duration as u64 * ADVERTISING_DURATION_UNIT_MS),
                );
            }
        }

        if let Some(set) = self.advertising_sets.get_mut(handle) {
            set.state = AdvertisingState::Active;
        }
        log::debug!("advertising set {} started", handle);
        Ok(())
    }

    /// Stops advertising a set. Stopping an inactive set is a no-op.
    pub fn stop_advertising(&mut self, handle: AdvertisingHandle) -> BleResult<()> {
        if self.advertising_sets.get(handle).is_none() {
            return Err(unknown_set(handle));
        }
        self.note_api(handle, AdvertisingApi::Extended);
        self.disable_set(handle)
    }

    fn disable_set(&mut self, handle: AdvertisingHandle) -> BleResult<()> {
        let set = self.advertising_sets.get(handle).ok_or_else(|| unknown_set(handle))?;
        if !set.is_active() {
            return Ok(());
        }

        self.disable_in_controller(handle)?;
        self.timers.cancel(TimerId::Advertising(handle));
        if let Some(set) = self.advertising_sets.get_mut(handle) {
            set.state = AdvertisingState::Inactive;
        }
        log::debug!("advertising set {} stopped", handle);
        self.apply_pending_address_rotation();
        Ok(())
    }

    fn disable_in_controller(&mut self, handle: AdvertisingHandle) -> BleResult<()> {
        if self.is_extended_advertising_available() {
            self.pal.extended_advertising_enable(
                false,
                &[AdvertisingEnableSet {
                    handle,
                    duration: 0,
                    max_events: 0,
                }],
            )
        } else {
            self.pal.advertising_enable(false)
        }
    }

    /// False for unknown sets.
    pub fn is_advertising_active(&self, handle: AdvertisingHandle) -> bool {
        self.advertising_sets
            .get(handle)
            .is_some_and(|set| set.is_active())
    }

    /// State of a set, `None` when it does not exist.
    pub fn advertising_state(&self, handle: AdvertisingHandle) -> Option<AdvertisingState> {
        self.advertising_sets.get(handle).map(|set| set.state)
    }

    fn note_api(&mut self, handle: AdvertisingHandle, api: AdvertisingApi) {
        if let Some(set) = self.advertising_sets.get_mut(handle) {
            if set.note_api(api) {
                log::warn!(
                    "advertising set {} is driven through both the legacy and the extended API",
                    handle
                );
            }
        }
    }

    // ---------------------------------------------------------------------
    // Legacy advertising API
    // ---------------------------------------------------------------------

    fn legacy_advertising_set(&mut self) -> BleResult<AdvertisingHandle> {
        let handle = LEGACY_ADVERTISING_HANDLE;
        if self.advertising_sets.get(handle).is_none()
            && !self
                .advertising_sets
                .allocate_at(handle, AdvertisingParameters::default())
        {
            return Err(BleError::invalid("legacy advertising set unavailable"));
        }
        self.note_api(handle, AdvertisingApi::Legacy);
        Ok(handle)
    }

    /// Sets advertising and scan response payloads of the legacy set.
    pub fn set_legacy_advertising_data(&mut self, advertising: &[u8], scan_response: &[u8]) -> BleResult<()> {
        let handle = self.legacy_advertising_set()?;
        self.write_payload(handle, advertising, false, Payload::Advertising)?;
        self.write_payload(handle, scan_response, false, Payload::ScanResponse)
    }

    /// Applies parameters to the legacy set and starts it without limits.
    pub fn start_legacy_advertising(&mut self, params: &AdvertisingParameters) -> BleResult<()> {
        let handle = self.legacy_advertising_set()?;
        if self.is_advertising_active(handle) {
            return Err(BleError::OperationNotPermitted);
        }
        self.apply_advertising_parameters(handle, params)?;
        if let Some(set) = self.advertising_sets.get_mut(handle) {
            set.parameters = params.clone();
        }
        self.enable_set(handle, 0, 0)
    }

    pub fn stop_legacy_advertising(&mut self) -> BleResult<()> {
        if self.advertising_sets.get(LEGACY_ADVERTISING_HANDLE).is_none() {
            return Ok(());
        }
        self.note_api(LEGACY_ADVERTISING_HANDLE, AdvertisingApi::Legacy);
        self.disable_set(LEGACY_ADVERTISING_HANDLE)
    }

    // ---------------------------------------------------------------------
    // Periodic advertising
    // ---------------------------------------------------------------------

    fn periodic_set_check(&self, handle: AdvertisingHandle) -> BleResult<PeriodicState> {
        if !self.is_periodic_advertising_available() {
            return Err(BleError::NotImplemented);
        }
        self.advertising_sets
            .get(handle)
            .map(|set| set.periodic)
            .ok_or_else(|| unknown_set(handle))
    }

    /// Intervals are in 1.25 ms units.
    pub fn set_periodic_advertising_parameters(
        &mut self,
        handle: AdvertisingHandle,
        min_interval: u16,
        max_interval: u16,
        advertise_tx_power: bool,
    ) -> BleResult<()> {
        self.periodic_set_check(handle)?;
        if min_interval > max_interval {
            return Err(BleError::invalid("periodic interval min above max"));
        }
        self.pal
            .set_periodic_advertising_parameters(handle, min_interval, max_interval, advertise_tx_power)?;
        if let Some(set) = self.advertising_sets.get_mut(handle) {
            if set.periodic == PeriodicState::Disabled {
                set.periodic = PeriodicState::Configured;
            }
        }
        Ok(())
    }

    pub fn set_periodic_advertising_payload(&mut self, handle: AdvertisingHandle, payload: &[u8]) -> BleResult<()> {
        self.periodic_set_check(handle)?;
        let max = self.pal.get_maximum_advertising_data_length() as usize;
        if payload.len() > max {
            return Err(BleError::invalid(format!("payload of {} bytes exceeds {}", payload.len(), max)));
        }
        for (operation, fragment) in fragment_advertising_data(payload) {
            self.pal.set_periodic_advertising_data(handle, operation, fragment)?;
        }
        if let Some(set) = self.advertising_sets.get_mut(handle) {
            if set.periodic == PeriodicState::Disabled {
                set.periodic = PeriodicState::Configured;
            }
        }
        Ok(())
    }

    /// Starting an active periodic advertising is a no-op.
    pub fn start_periodic_advertising(&mut self, handle: AdvertisingHandle) -> BleResult<()> {
        if self.periodic_set_check(handle)? == PeriodicState::Active {
            return Ok(());
        }
        self.pal.periodic_advertising_enable(true, handle)?;
        if let Some(set) = self.advertising_sets.get_mut(handle) {
            set.periodic = PeriodicState::Active;
        }
        Ok(())
    }

    /// Stopping an inactive periodic advertising is a no-op.
    pub fn stop_periodic_advertising(&mut self, handle: AdvertisingHandle) -> BleResult<()> {
        if self.periodic_set_check(handle)? != PeriodicState::Active {
            return Ok(());
        }
        self.pal.periodic_advertising_enable(false, handle)?;
        if let Some(set) = self.advertising_sets.get_mut(handle) {
            set.periodic = PeriodicState::Configured;
        }
        Ok(())
    }

    pub fn is_periodic_advertising_active(&self, handle: AdvertisingHandle) -> bool {
        self.advertising_sets
            .get(handle)
            .is_some_and(|set| set.periodic == PeriodicState::Active)
    }

    // ---------------------------------------------------------------------
    // Scanning
    // ---------------------------------------------------------------------

    /// Stores the parameters used by the next scan session.
    pub fn set_scan_parameters(&mut self, params: ScanParameters) -> BleResult<()> {
        let phys = params.phys();
        if phys.is_empty() {
            return Err(BleError::invalid("no scanning PHY selected"));
        }
        if phys.contains(PhySet::LE_CODED) && !self.is_extended_advertising_available() {
            return Err(BleError::NotImplemented);
        }
        self.check_phys(phys)?;
        if self.scanning {
            return Err(BleError::OperationNotPermitted);
        }
        self.scan_parameters = params;
        Ok(())
    }

    pub fn scan_parameters(&self) -> &ScanParameters {
        &self.scan_parameters
    }

    /// Starts a scan session.
    ///
    /// `duration` is in 10 ms units and `period` in 1.28 s units, 0 meaning
    /// unlimited. A period requires extended advertising support.
    pub fn start_scan(&mut self, filter: DuplicatesFilter, duration: u16, period: u16) -> BleResult<()> {
        if self.scanning {
            return Err(BleError::OperationNotPermitted);
        }
        let extended = self.is_extended_advertising_available();
        if !extended && (period != 0 || filter == DuplicatesFilter::PeriodicReset) {
            return Err(BleError::NotImplemented);
        }

        self.apply_pending_address_rotation();
        let own_address_type = self.own_address(AddressUseType::CentralScan);
        self.pal.set_scan_parameters(own_address_type, &self.scan_parameters)?;

        if extended {
            self.pal.scan_enable(true, filter, duration, period)?;
        } else {
            self.pal.scan_enable(true, filter, 0, 0)?;
            if duration != 0 {
                self.timers.schedule(
                    TimerId::Scan,
                    Duration::from_millis(duration as u64 * SCAN_DURATION_UNIT_MS),
                );
            }
        }
        self.scanning = true;
        log::debug!("scan started");
        Ok(())
    }

    /// Stopping while idle is a no-op.
    pub fn stop_scan(&mut self) -> BleResult<()> {
        if !self.scanning {
            return Ok(());
        }
        self.pal.scan_enable(false, DuplicatesFilter::Disable, 0, 0)?;
        self.timers.cancel(TimerId::Scan);
        self.scanning = false;
        log::debug!("scan stopped");
        self.apply_pending_address_rotation();
        Ok(())
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    fn handle_scan_timeout(&mut self, stop_controller: bool) {
        if !self.scanning {
            log::debug!("scan timeout without scan session");
            return;
        }
        if stop_controller {
            if let Err(err) = self.pal.scan_enable(false, DuplicatesFilter::Disable, 0, 0) {
                log::error!("failed to stop timed out scan: {}", err);
            }
        }
        self.timers.cancel(TimerId::Scan);
        self.scanning = false;
        self.apply_pending_address_rotation();
        self.notify(GapEvent::ScanTimeout);
    }

    // ---------------------------------------------------------------------
    // Periodic advertising sync
    // ---------------------------------------------------------------------

    /// Synchronises with the periodic advertising of one advertiser.
    /// `sync_timeout` is in 10 ms units.
    pub fn create_sync(
        &mut self,
        peer_address_type: PeerAddressType,
        peer_address: &BdAddr,
        sid: u8,
        max_packet_skip: u16,
        sync_timeout: u16,
    ) -> BleResult<()> {
        if !self.is_periodic_advertising_available() {
            return Err(BleError::NotImplemented);
        }
        if sid > 0x0F {
            return Err(BleError::invalid("advertising SID above 0x0F"));
        }
        self.pal.periodic_advertising_create_sync(&PeriodicSyncRequest {
            use_periodic_advertiser_list: false,
            sid,
            peer_address_type,
            peer_address: *peer_address,
            max_packet_skip,
            sync_timeout,
        })
    }

    /// Synchronises with any advertiser of the periodic advertiser list.
    pub fn create_sync_from_list(&mut self, max_packet_skip: u16, sync_timeout: u16) -> BleResult<()> {
        if !self.is_periodic_advertising_available() {
            return Err(BleError::NotImplemented);
        }
        self.pal.periodic_advertising_create_sync(&PeriodicSyncRequest {
            use_periodic_advertiser_list: true,
            sid: 0,
            peer_address_type: PeerAddressType::Public,
            peer_address: BdAddr::ZERO,
            max_packet_skip,
            sync_timeout,
        })
    }

    pub fn cancel_create_sync(&mut self) -> BleResult<()> {
        if !self.is_periodic_advertising_available() {
            return Err(BleError::NotImplemented);
        }
        self.pal.cancel_periodic_advertising_create_sync()
    }

    pub fn terminate_sync(&mut self, sync_handle: PeriodicSyncHandle) -> BleResult<()> {
        if !self.is_periodic_advertising_available() {
            return Err(BleError::NotImplemented);
        }
        self.pal.periodic_advertising_terminate_sync(sync_handle)
    }

    pub fn add_device_to_periodic_advertiser_list(
        &mut self,
        peer_address_type: PeerAddressType,
        peer_address: &BdAddr,
        sid: u8,
    ) -> BleResult<()> {
        if !self.is_periodic_advertising_available() {
            return Err(BleError::NotImplemented);
        }
        if sid > 0x0F {
            return Err(BleError::invalid("advertising SID above 0x0F"));
        }
        self.pal
            .add_device_to_periodic_advertiser_list(peer_address_type, peer_address, sid)
    }

    pub fn remove_device_from_periodic_advertiser_list(
        &mut self,
        peer_address_type: PeerAddressType,
        peer_address: &BdAddr,
        sid: u8,
    ) -> BleResult<()> {
        if !self.is_periodic_advertising_available() {
            return Err(BleError::NotImplemented);
        }
        self.pal
            .remove_device_from_periodic_advertiser_list(peer_address_type, peer_address, sid)
    }

    pub fn clear_periodic_advertiser_list(&mut self) -> BleResult<()> {
        if !self.is_periodic_advertising_available() {
            return Err(BleError::NotImplemented);
        }
        self.pal.clear_periodic_advertiser_list()
    }

    /// 0 when periodic advertising is not supported.
    pub fn max_periodic_advertiser_list_size(&self) -> u8 {
        if self.is_periodic_advertising_available() {
            self.pal.read_periodic_advertiser_list_size()
        } else {
            0
        }
    }

    // ---------------------------------------------------------------------
    // Connections
    // ---------------------------------------------------------------------

    /// Initiates a connection. Completion is reported by a connection
    /// complete event.
    pub fn connect(
        &mut self,
        peer_address_type: PeerAddressType,
        peer_address: &BdAddr,
        params: &ConnectionParameters,
    ) -> BleResult<()> {
        let phys = params.phys();
        if phys.is_empty() {
            return Err(BleError::invalid("no initiating PHY selected"));
        }
        if phys != PhySet::LE_1M && !self.is_extended_advertising_available() {
            return Err(BleError::NotImplemented);
        }
        self.check_phys(phys)?;
        if params.filter_policy == InitiatorFilterPolicy::NoFilter && peer_address.is_zero() {
            return Err(BleError::invalid("no peer to connect to"));
        }

        let own_address_type = self.own_address(AddressUseType::CentralConnection);
        self.pal
            .create_connection(own_address_type, peer_address_type, peer_address, params)
    }

    pub fn cancel_connect(&mut self) -> BleResult<()> {
        self.pal.cancel_connection_creation()
    }

    pub fn disconnect(&mut self, connection: ConnectionHandle, reason: DisconnectionReason) -> BleResult<()> {
        self.pal.disconnect(connection, reason)
    }

    fn check_connection_update(update: &ConnectionUpdate) -> BleResult<()> {
        if update.min_connection_interval > update.max_connection_interval {
            return Err(BleError::invalid("connection interval min above max"));
        }
        if update.min_event_length > update.max_event_length {
            return Err(BleError::invalid("event length min above max"));
        }
        Ok(())
    }

    pub fn update_connection_parameters(
        &mut self,
        connection: ConnectionHandle,
        update: &ConnectionUpdate,
    ) -> BleResult<()> {
        Self::check_connection_update(update)?;
        self.pal.connection_parameters_update(connection, update)
    }

    /// Answers a peer's connection parameter request with the given parameters.
    pub fn accept_connection_parameters_update(
        &mut self,
        connection: ConnectionHandle,
        update: &ConnectionUpdate,
    ) -> BleResult<()> {
        Self::check_connection_update(update)?;
        self.pal.accept_connection_parameter_request(connection, update)
    }

    pub fn reject_connection_parameters_update(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        self.pal.reject_connection_parameter_request(
            connection,
            DisconnectionReason::UnacceptableConnectionParameters,
        )
    }

    /// Result is reported by a read PHY event.
    pub fn read_phy(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        self.pal.read_phy(connection)
    }

    pub fn set_preferred_phys(&mut self, tx_phys: PhySet, rx_phys: PhySet) -> BleResult<()> {
        self.check_phys(tx_phys | rx_phys)?;
        self.pal.set_preferred_phys(tx_phys, rx_phys)
    }

    pub fn set_phy(
        &mut self,
        connection: ConnectionHandle,
        tx_phys: PhySet,
        rx_phys: PhySet,
        coded_symbols: CodedSymbolsPerBit,
    ) -> BleResult<()> {
        self.check_phys(tx_phys | rx_phys)?;
        self.pal.set_phy(connection, tx_phys, rx_phys, coded_symbols)
    }

    // ---------------------------------------------------------------------
    // Addresses and privacy
    // ---------------------------------------------------------------------

    /// Selects the local identity. A public address cannot be changed, only
    /// selected; a random address must be static.
    pub fn set_address(&mut self, address_type: AddressType, address: &BdAddr) -> BleResult<()> {
        match address_type {
            AddressType::Public => {
                self.address_type = AddressType::Public;
                self.address = self.pal.get_device_address();
                Ok(())
            }
            AddressType::Random => {
                if !address.is_static_random() {
                    return Err(BleError::invalid("random identity must be a static address"));
                }
                self.pal.set_random_address(address)?;
                self.address_type = AddressType::Random;
                self.address = *address;
                Ok(())
            }
            AddressType::PublicIdentity | AddressType::RandomIdentity => {
                Err(BleError::invalid("identity address types cannot be selected"))
            }
        }
    }

    pub fn get_address(&self) -> (AddressType, BdAddr) {
        (self.address_type, self.address)
    }

    /// Current non resolvable private address while rotation runs.
    pub fn non_resolvable_address(&self) -> Option<BdAddr> {
        self.non_resolvable_address
    }

    pub fn enable_privacy(&mut self, enable: bool) -> BleResult<()> {
        if enable && !self.pal.is_feature_supported(ControllerFeature::LlPrivacy) {
            return Err(BleError::NotImplemented);
        }
        if enable == self.privacy_enabled {
            return Ok(());
        }
        self.privacy_enabled = enable;
        self.update_address_resolution_setting()?;
        self.update_address_rotation();
        log::debug!("privacy {}", if enable { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn is_privacy_enabled(&self) -> bool {
        self.privacy_enabled
    }

    pub fn set_peripheral_privacy_configuration(
        &mut self,
        configuration: PeripheralPrivacyConfiguration,
    ) -> BleResult<()> {
        self.peripheral_privacy = configuration;
        self.update_address_resolution_setting()?;
        self.update_address_rotation();
        Ok(())
    }

    pub fn peripheral_privacy_configuration(&self) -> PeripheralPrivacyConfiguration {
        self.peripheral_privacy
    }

    pub fn set_central_privacy_configuration(
        &mut self,
        configuration: CentralPrivacyConfiguration,
    ) -> BleResult<()> {
        self.central_privacy = configuration;
        self.update_address_resolution_setting()?;
        self.update_address_rotation();
        Ok(())
    }

    pub fn central_privacy_configuration(&self) -> CentralPrivacyConfiguration {
        self.central_privacy
    }

    fn update_address_resolution_setting(&mut self) -> BleResult<()> {
        let enable = self.privacy_enabled
            && !(self.peripheral_privacy.resolution_strategy == PeripheralResolutionStrategy::DoNotResolve
                && self.central_privacy.resolution_strategy == CentralResolutionStrategy::DoNotResolve);
        self.pal.set_address_resolution(enable)
    }

    fn update_address_rotation(&mut self) {
        let rotate = self.privacy_enabled
            && (self.central_privacy.use_non_resolvable_random_address
                || self.peripheral_privacy.use_non_resolvable_random_address);

        if rotate && !self.random_address_rotating {
            self.random_address_rotating = true;
            self.timers.schedule_periodic(
                TimerId::AddressRotation,
                Duration::from_secs(self.config.private_address_timeout),
            );
            self.rotate_random_address();
        } else if !rotate && self.random_address_rotating {
            self.random_address_rotating = false;
            self.pending_address_rotation = false;
            self.non_resolvable_address = None;
            self.timers.cancel(TimerId::AddressRotation);
            if self.address_type == AddressType::Random {
                let address = self.address;
                if let Err(err) = self.pal.set_random_address(&address) {
                    log::error!("failed to restore random static address: {}", err);
                }
            }
        }
    }

    /// Sessions relying on the controller random address block rotation.
    fn random_address_in_use(&self) -> bool {
        self.scanning || (!self.is_extended_advertising_available() && self.advertising_sets.any_active())
    }

    fn rotate_random_address(&mut self) {
        if !self.random_address_rotating {
            return;
        }
        if self.random_address_in_use() {
            log::debug!("address rotation deferred until advertising and scanning stop");
            self.pending_address_rotation = true;
            return;
        }
        self.pending_address_rotation = false;

        let address = privacy::generate_non_resolvable_address();
        if let Err(err) = self.pal.set_random_address(&address) {
            log::error!("failed to set non resolvable address: {}", err);
            return;
        }
        self.non_resolvable_address = Some(address);

        if self.is_extended_advertising_available() {
            let mut using_random = Vec::new();
            for (handle, set) in self.advertising_sets.iter_mut() {
                using_random.push((handle, advertising_use_type(&set.parameters)));
            }
            for (handle, use_type) in using_random {
                if self.own_address(use_type) != OwnAddressType::Random {
                    continue;
                }
                if let Err(err) = self.pal.set_advertising_set_random_address(handle, &address) {
                    log::error!("failed to update address of advertising set {}: {}", handle, err);
                }
            }
        }
        log::debug!("rotated non resolvable address to {}", address);
    }

    fn apply_pending_address_rotation(&mut self) {
        if self.pending_address_rotation && !self.random_address_in_use() {
            self.rotate_random_address();
        }
    }

    // ---------------------------------------------------------------------
    // Whitelist
    // ---------------------------------------------------------------------

    pub fn max_whitelist_size(&self) -> u8 {
        self.pal.read_white_list_capacity()
    }

    pub fn get_whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    /// Replaces the controller whitelist. Random addresses must be static.
    pub fn set_whitelist(&mut self, whitelist: &Whitelist) -> BleResult<()> {
        let capacity = self.pal.read_white_list_capacity() as usize;
        if whitelist.len() > capacity {
            return Err(BleError::invalid(format!(
                "whitelist of {} entries exceeds {}",
                whitelist.len(),
                capacity
            )));
        }
        if whitelist
            .iter()
            .any(|entry| entry.address_type == PeerAddressType::Random && !entry.address.is_static_random())
        {
            return Err(BleError::invalid("whitelisted random addresses must be static"));
        }

        self.pal.clear_whitelist()?;
        self.whitelist = Whitelist::new(capacity);
        for entry in whitelist.iter() {
            self.pal.add_device_to_whitelist(entry.address_type, &entry.address)?;
            self.whitelist.add(entry.address_type, entry.address)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Reset
    // ---------------------------------------------------------------------

    /// Stops every procedure, destroys every advertising set and disables
    /// privacy.
    pub fn reset(&mut self) -> BleResult<()> {
        let mut handles = Vec::new();
        for (handle, _) in self.advertising_sets.iter_mut() {
            handles.push(handle);
        }
        for handle in handles {
            if self.is_periodic_advertising_active(handle) {
                self.stop_periodic_advertising(handle)?;
            }
            self.disable_set(handle)?;
            self.destroy_advertising_set(handle)?;
        }
        self.stop_scan()?;
        self.enable_privacy(false)?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Event handling
    // ---------------------------------------------------------------------

    /// Delivers an expired timer.
    pub fn on_timer(&mut self, id: TimerId) {
        match id {
            TimerId::Advertising(handle) => self.on_advertising_timeout(handle),
            TimerId::Scan => self.handle_scan_timeout(true),
            TimerId::AddressRotation => self.rotate_random_address(),
        }
    }

    fn on_advertising_timeout(&mut self, handle: AdvertisingHandle) {
        if !self.is_advertising_active(handle) {
            log::debug!("stale advertising timeout for set {}", handle);
            return;
        }
        if let Err(err) = self.disable_in_controller(handle) {
            log::error!("failed to stop timed out advertising set {}: {}", handle, err);
        }
        if let Some(set) = self.advertising_sets.get_mut(handle) {
            set.state = AdvertisingState::Inactive;
        }
        self.apply_pending_address_rotation();
        self.notify(GapEvent::AdvertisingEnd {
            advertising_handle: handle,
            connection: None,
            completed_events: 0,
            connected: false,
        });
    }

    /// Delivers a controller event.
    pub fn on_pal_event(&mut self, event: PalGapEvent) {
        match event {
            PalGapEvent::ConnectionComplete(event) => self.on_connection_complete(event),
            PalGapEvent::DisconnectionComplete {
                status,
                connection,
                reason,
            } => {
                if status != HCI_SUCCESS {
                    log::warn!("disconnection of {:#06x} failed with status {:#04x}", connection, status);
                    return;
                }
                if let Some(monitor) = self.connection_monitor.as_mut() {
                    monitor.on_disconnected(connection, reason);
                }
                self.notify(GapEvent::DisconnectionComplete { connection, reason });
            }
            PalGapEvent::AdvertisingReport(report) | PalGapEvent::ExtendedAdvertisingReport(report) => {
                self.on_advertising_report(report)
            }
            PalGapEvent::ScanTimeout => self.handle_scan_timeout(false),
            PalGapEvent::ScanRequestReceived {
                advertising_handle,
                scanner_address_type,
                scanner_address,
            } => self.notify(GapEvent::ScanRequestReceived {
                advertising_handle,
                peer_address_type: scanner_address_type,
                peer_address: scanner_address,
            }),
            PalGapEvent::AdvertisingSetTerminated {
                status,
                advertising_handle,
                connection,
                completed_events,
            } => self.on_advertising_set_terminated(status, advertising_handle, connection, completed_events),
            PalGapEvent::PeriodicAdvertisingSyncEstablished {
                status,
                sync_handle,
                sid,
                advertiser_address_type,
                advertiser_address,
                phy,
                interval,
            } => self.notify(GapEvent::PeriodicAdvertisingSyncEstablished {
                status,
                sync_handle,
                sid,
                peer_address_type: advertiser_address_type,
                peer_address: advertiser_address,
                phy,
                interval,
            }),
            PalGapEvent::PeriodicAdvertisingReport {
                sync_handle,
                tx_power,
                rssi,
                data_complete,
                data,
            } => self.notify(GapEvent::PeriodicAdvertisingReport {
                sync_handle,
                tx_power,
                rssi,
                data_complete,
                data,
            }),
            PalGapEvent::PeriodicAdvertisingSyncLoss { sync_handle } => {
                self.notify(GapEvent::PeriodicAdvertisingSyncLoss { sync_handle })
            }
            PalGapEvent::ConnectionParameterRequest {
                connection,
                min_interval,
                max_interval,
                latency,
                supervision_timeout,
            } => self.notify(GapEvent::UpdateConnectionParametersRequest {
                connection,
                min_interval,
                max_interval,
                latency,
                supervision_timeout,
            }),
            PalGapEvent::ConnectionUpdate {
                status,
                connection,
                interval,
                latency,
                supervision_timeout,
            } => self.notify(GapEvent::ConnectionParametersUpdateComplete {
                status,
                connection,
                interval,
                latency,
                supervision_timeout,
            }),
            PalGapEvent::ReadPhy {
                status,
                connection,
                tx_phy,
                rx_phy,
            } => self.notify(GapEvent::ReadPhy {
                status,
                connection,
                tx_phy,
                rx_phy,
            }),
            PalGapEvent::PhyUpdateComplete {
                status,
                connection,
                tx_phy,
                rx_phy,
            } => self.notify(GapEvent::PhyUpdateComplete {
                status,
                connection,
                tx_phy,
                rx_phy,
            }),
            PalGapEvent::UnexpectedError { opcode, status } => {
                log::error!("unexpected controller error {:#04x} for opcode {:#06x}", status, opcode);
                self.notify(GapEvent::UnexpectedError { opcode, status });
            }
        }
    }

    fn on_connection_complete(&mut self, event: ConnectionCompleteEvent) {
        if event.status != HCI_SUCCESS {
            self.notify(GapEvent::ConnectionComplete(event));
            return;
        }

        // legacy advertising stops once a connection is established
        if event.role == Role::Peripheral
            && !self.is_extended_advertising_available()
            && self.is_advertising_active(LEGACY_ADVERTISING_HANDLE)
        {
            self.timers.cancel(TimerId::Advertising(LEGACY_ADVERTISING_HANDLE));
            if let Some(set) = self.advertising_sets.get_mut(LEGACY_ADVERTISING_HANDLE) {
                set.state = AdvertisingState::Inactive;
            }
            self.apply_pending_address_rotation();
            self.notify(GapEvent::AdvertisingEnd {
                advertising_handle: LEGACY_ADVERTISING_HANDLE,
                connection: Some(event.connection),
                completed_events: 0,
                connected: true,
            });
        }

        let unresolved_peer = event.peer_address_type == AddressType::Random
            && event.peer_address.is_resolvable_private();
        if self.privacy_enabled && event.role == Role::Peripheral && unresolved_peer {
            match self.peripheral_privacy.resolution_strategy {
                PeripheralResolutionStrategy::RejectNonResolvedAddress => {
                    log::debug!("rejecting unresolved peer {}", event.peer_address);
                    if let Err(err) = self
                        .pal
                        .disconnect(event.connection, DisconnectionReason::AuthenticationFailure)
                    {
                        log::error!("failed to reject unresolved peer: {}", err);
                    }
                    return;
                }
                PeripheralResolutionStrategy::PerformPairingProcedure
                | PeripheralResolutionStrategy::PerformAuthenticationProcedure => {
                    log::debug!("unresolved peer {} connected, security procedure expected", event.peer_address);
                }
                PeripheralResolutionStrategy::DoNotResolve => {}
            }
        }

        let use_type = match event.role {
            Role::Central => AddressUseType::CentralConnection,
            Role::Peripheral => AddressUseType::PeripheralConnectable,
        };
        let (local_address_type, local_address) = match self.own_address(use_type) {
            OwnAddressType::Public => (AddressType::Public, self.pal.get_device_address()),
            OwnAddressType::Random => (AddressType::Random, self.random_address()),
            OwnAddressType::ResolvablePrivatePublicFallback
            | OwnAddressType::ResolvablePrivateRandomFallback
                if !event.local_resolvable_private_address.is_zero() =>
            {
                (AddressType::Random, event.local_resolvable_private_address)
            }
            OwnAddressType::ResolvablePrivatePublicFallback => (AddressType::Public, self.pal.get_device_address()),
            OwnAddressType::ResolvablePrivateRandomFallback => (AddressType::Random, self.address),
        };

        if let Some(monitor) = self.connection_monitor.as_mut() {
            monitor.on_connected(
                event.connection,
                event.role,
                event.peer_address_type,
                &event.peer_address,
                local_address_type,
                &local_address,
            );
        }
        self.notify(GapEvent::ConnectionComplete(event));
    }

    fn on_advertising_report(&mut self, report: AdvertisingReport) {
        let unresolved = report.address_type == AddressType::Random && report.address.is_resolvable_private();
        if self.privacy_enabled
            && unresolved
            && self.central_privacy.resolution_strategy == CentralResolutionStrategy::ResolveAndFilter
        {
            log::trace!("dropping report from unresolved {}", report.address);
            return;
        }
        self.notify(GapEvent::AdvertisingReport(report));
    }

    fn on_advertising_set_terminated(
        &mut self,
        status: u8,
        handle: AdvertisingHandle,
        connection: Option<ConnectionHandle>,
        completed_events: u8,
    ) {
        match self.advertising_sets.get_mut(handle) {
            Some(set) if set.is_active() => set.state = AdvertisingState::Inactive,
            _ => {
                log::warn!("termination of inactive advertising set {} ignored", handle);
                return;
            }
        }
        self.timers.cancel(TimerId::Advertising(handle));
        let connected = status == HCI_SUCCESS && connection.is_some();
        self.notify(GapEvent::AdvertisingEnd {
            advertising_handle: handle,
            connection: if connected { connection } else { None },
            completed_events,
            connected,
        });
        self.apply_pending_address_rotation();
    }
}
