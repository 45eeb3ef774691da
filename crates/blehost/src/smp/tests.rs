//! Tests for the Security Manager

use super::*;
use crate::db::{
    DbReply, DistributedKeys, MemorySecurityDb, SecurityDb, SecurityEntry, SecurityEntryIdentity, SecurityEntryKeys,
};
use crate::error::{BleError, BleResult};
use crate::gap::{AddressType, BdAddr, ConnectionHandle, DisconnectionReason, PeerAddressType, Role, Whitelist};
use crate::pal::mock::MockPalSecurity;
use crate::pal::{ConnectionEventMonitor, PalSecurityEvent};
use std::cell::RefCell;
use std::rc::Rc;

const CONNECTION: ConnectionHandle = 0x0040;
const LOCAL: BdAddr = BdAddr { bytes: [0x01, 0x02, 0x03, 0x04, 0x05, 0x06] };
const PEER: BdAddr = BdAddr { bytes: [0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xC6] };

type Events = Rc<RefCell<Vec<SecurityEvent>>>;

fn pal() -> MockPalSecurity {
    MockPalSecurity {
        secure_connections: true,
        ..Default::default()
    }
}

fn manager_with<D: SecurityDb>(pal: MockPalSecurity, db: D) -> (SecurityManager<MockPalSecurity, D>, Events) {
    let mut sm = SecurityManager::new(pal, db);
    sm.init(SecurityConfig::default()).expect("init");
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    sm.set_event_callback(move |event| sink.borrow_mut().push(event));
    (sm, events)
}

fn manager() -> (SecurityManager<MockPalSecurity, MemorySecurityDb>, Events) {
    manager_with(pal(), MemorySecurityDb::new())
}

fn connect<D: SecurityDb>(sm: &mut SecurityManager<MockPalSecurity, D>, role: Role) {
    sm.on_connected(CONNECTION, role, AddressType::Public, &PEER, AddressType::Public, &LOCAL);
}

fn entry<D: SecurityDb>(sm: &mut SecurityManager<MockPalSecurity, D>) -> &mut SecurityEntry {
    sm.db_mut().get_entry_mut(CONNECTION).expect("entry")
}

fn ltk() -> Ltk {
    Ltk::new([0x5A; 16])
}

fn legacy_keys() -> SecurityEntryKeys {
    SecurityEntryKeys {
        ltk: ltk(),
        ediv: Ediv::new([0x12, 0x34]),
        rand: Rand::new([1, 2, 3, 4, 5, 6, 7, 8]),
    }
}

/// Database holding key lookups back until released.
struct DeferredDb {
    inner: MemorySecurityDb,
    parked: Vec<(DbReply<SecurityEntryKeys>, ConnectionHandle, Ediv, Rand)>,
}

impl DeferredDb {
    fn new() -> Self {
        Self {
            inner: MemorySecurityDb::new(),
            parked: Vec::new(),
        }
    }

    fn release(&mut self) {
        for (reply, connection, ediv, rand) in std::mem::take(&mut self.parked) {
            self.inner.get_entry_local_keys(reply, connection, &ediv, &rand);
        }
    }
}

impl SecurityDb for DeferredDb {
    fn get_entry(&self, connection: ConnectionHandle) -> Option<&SecurityEntry> {
        self.inner.get_entry(connection)
    }

    fn get_entry_mut(&mut self, connection: ConnectionHandle) -> Option<&mut SecurityEntry> {
        self.inner.get_entry_mut(connection)
    }

    fn get_entry_by_address(&mut self, address: &BdAddr) -> Option<&mut SecurityEntry> {
        self.inner.get_entry_by_address(address)
    }

    fn connect_entry(
        &mut self,
        connection: ConnectionHandle,
        peer_address_type: AddressType,
        peer_address: &BdAddr,
        local_address: &BdAddr,
    ) -> Option<&mut SecurityEntry> {
        self.inner
            .connect_entry(connection, peer_address_type, peer_address, local_address)
    }

    fn disconnect_entry(&mut self, connection: ConnectionHandle) {
        self.inner.disconnect_entry(connection)
    }

    fn remove_entry(&mut self, identity_address: &BdAddr) {
        self.inner.remove_entry(identity_address)
    }

    fn clear_entries(&mut self) {
        self.inner.clear_entries()
    }

    fn get_entry_local_keys(
        &mut self,
        reply: DbReply<SecurityEntryKeys>,
        connection: ConnectionHandle,
        ediv: &Ediv,
        rand: &Rand,
    ) {
        self.parked.push((reply, connection, *ediv, *rand));
    }

    fn get_entry_local_keys_sc(&mut self, reply: DbReply<SecurityEntryKeys>, connection: ConnectionHandle) {
        self.inner.get_entry_local_keys_sc(reply, connection)
    }

    fn get_entry_peer_keys(&mut self, reply: DbReply<SecurityEntryKeys>, connection: ConnectionHandle) {
        self.inner.get_entry_peer_keys(reply, connection)
    }

    fn get_entry_peer_csrk(&mut self, reply: DbReply<Csrk>, connection: ConnectionHandle) {
        self.inner.get_entry_peer_csrk(reply, connection)
    }

    fn get_identity_list(&mut self, reply: DbReply<Vec<SecurityEntryIdentity>>) {
        self.inner.get_identity_list(reply)
    }

    fn set_entry_local_ltk(&mut self, connection: ConnectionHandle, ltk: &Ltk) {
        self.inner.set_entry_local_ltk(connection, ltk)
    }

    fn set_entry_local_ediv_rand(&mut self, connection: ConnectionHandle, ediv: &Ediv, rand: &Rand) {
        self.inner.set_entry_local_ediv_rand(connection, ediv, rand)
    }

    fn set_entry_peer_ltk(&mut self, connection: ConnectionHandle, ltk: &Ltk) {
        self.inner.set_entry_peer_ltk(connection, ltk)
    }

    fn set_entry_peer_ediv_rand(&mut self, connection: ConnectionHandle, ediv: &Ediv, rand: &Rand) {
        self.inner.set_entry_peer_ediv_rand(connection, ediv, rand)
    }

    fn set_entry_peer_irk(&mut self, connection: ConnectionHandle, irk: &Irk) {
        self.inner.set_entry_peer_irk(connection, irk)
    }

    fn set_entry_peer_bdaddr(&mut self, connection: ConnectionHandle, address_is_public: bool, address: &BdAddr) {
        self.inner.set_entry_peer_bdaddr(connection, address_is_public, address)
    }

    fn set_entry_peer_csrk(&mut self, connection: ConnectionHandle, csrk: &Csrk) {
        self.inner.set_entry_peer_csrk(connection, csrk)
    }

    fn set_entry_peer(&mut self, connection: ConnectionHandle, keys: &DistributedKeys) {
        self.inner.set_entry_peer(connection, keys)
    }

    fn get_local_csrk(&self) -> Option<Csrk> {
        self.inner.get_local_csrk()
    }

    fn set_local_csrk(&mut self, csrk: &Csrk) {
        self.inner.set_local_csrk(csrk)
    }

    fn get_whitelist(&mut self, reply: DbReply<Whitelist>) {
        self.inner.get_whitelist(reply)
    }

    fn generate_whitelist_from_bond_table(&mut self, reply: DbReply<Whitelist>, capacity: usize) {
        self.inner.generate_whitelist_from_bond_table(reply, capacity)
    }

    fn set_whitelist(&mut self, whitelist: &Whitelist) {
        self.inner.set_whitelist(whitelist)
    }

    fn add_whitelist_entry(&mut self, address_type: PeerAddressType, address: &BdAddr) -> BleResult<()> {
        self.inner.add_whitelist_entry(address_type, address)
    }

    fn remove_whitelist_entry(&mut self, address_type: PeerAddressType, address: &BdAddr) {
        self.inner.remove_whitelist_entry(address_type, address)
    }

    fn clear_whitelist(&mut self) {
        self.inner.clear_whitelist()
    }

    fn restore(&mut self) -> BleResult<()> {
        self.inner.restore()
    }

    fn sync(&mut self) -> BleResult<()> {
        self.inner.sync()
    }

    fn set_restore(&mut self, reload: bool) {
        self.inner.set_restore(reload)
    }
}

#[test]
fn test_passkey_numeric_round_trip() {
    for value in 0..=PASSKEY_MAX {
        let passkey = Passkey::from_num(value).expect("in range");
        assert_eq!(passkey.to_num(), value);
    }
    assert_eq!(Passkey::from_num(42).map(|p| *p.as_ascii()), Some(*b"000042"));
    assert!(Passkey::from_num(PASSKEY_MAX + 1).is_none());
}

#[test]
fn test_pairing_failure_codes() {
    let failures = [
        (PairingFailure::PasskeyEntryFailed, 0x01),
        (PairingFailure::OobNotAvailable, 0x02),
        (PairingFailure::AuthenticationRequirements, 0x03),
        (PairingFailure::ConfirmValueFailed, 0x04),
        (PairingFailure::PairingNotSupported, 0x05),
        (PairingFailure::EncryptionKeySize, 0x06),
        (PairingFailure::CommandNotSupported, 0x07),
        (PairingFailure::UnspecifiedReason, 0x08),
        (PairingFailure::RepeatedAttempts, 0x09),
        (PairingFailure::InvalidParameters, 0x0A),
        (PairingFailure::DhKeyCheckFailed, 0x0B),
        (PairingFailure::NumericComparisonFailed, 0x0C),
        (PairingFailure::BrEdrPairingInProgress, 0x0D),
        (PairingFailure::CrossTransportKeyDerivationNotAllowed, 0x0E),
    ];
    for (failure, code) in failures {
        assert_eq!(failure.to_u8(), code);
        assert_eq!(PairingFailure::from_u8(code), Some(failure));
    }
    assert_eq!(PairingFailure::from_u8(0x00), None);
    assert_eq!(PairingFailure::from_u8(0x0F), None);
}

#[test]
fn test_init_configures_smp() {
    let (sm, _) = manager();
    let pal = sm.pal();
    assert_eq!(pal.count("initialize"), 1);
    assert_eq!(pal.io_capability, Some(IoCapability::NoInputNoOutput));
    assert_eq!(pal.key_requirements, Some((7, 16)));
    assert_eq!(pal.count("set_csrk"), 1);
    assert!(sm.db().get_local_csrk().is_some());
}

#[test]
fn test_local_signing_key_kept_across_init() {
    let (mut sm, _) = manager();
    let csrk = sm.db().get_local_csrk();
    sm.init(SecurityConfig::default()).unwrap();
    assert_eq!(sm.db().get_local_csrk(), csrk);
}

#[test]
fn test_invalid_key_sizes_rejected() {
    let mut sm = SecurityManager::new(pal(), MemorySecurityDb::new());
    let config = SecurityConfig {
        min_encryption_key_size: 6,
        ..SecurityConfig::default()
    };
    assert!(matches!(sm.init(config), Err(BleError::InvalidParameter(_))));

    let (mut sm, _) = manager();
    assert!(sm.set_encryption_key_requirements(16, 7).is_err());
    assert!(sm.set_encryption_key_requirements(7, 17).is_err());
    sm.set_encryption_key_requirements(10, 12).unwrap();
    assert_eq!(sm.pal().key_requirements, Some((10, 12)));
}

#[test]
fn test_reset_requires_init() {
    let mut sm = SecurityManager::new(pal(), MemorySecurityDb::new());
    assert_eq!(sm.reset(), Err(BleError::InvalidState));

    let (mut sm, _) = manager();
    assert_eq!(sm.reset(), Ok(()));
}

#[test]
fn test_authentication_timeout_units() {
    let (mut sm, _) = manager();
    assert!(sm.set_authentication_timeout(CONNECTION, 20_000).is_err());

    connect(&mut sm, Role::Central);
    assert_eq!(sm.get_authentication_timeout(CONNECTION), Ok(30_000));
    sm.set_authentication_timeout(CONNECTION, 20_005).unwrap();
    assert_eq!(sm.pal().authentication_timeouts.get(&CONNECTION), Some(&2000));
    assert_eq!(sm.get_authentication_timeout(CONNECTION), Ok(20_000));
}

#[test]
fn test_pairing_failure_resets_state() {
    let (mut sm, events) = manager();
    connect(&mut sm, Role::Central);

    sm.request_pairing(CONNECTION).unwrap();
    assert_eq!(sm.pairing_state(CONNECTION), Ok(PairingState::RequestSent));
    assert_eq!(sm.request_pairing(CONNECTION), Err(BleError::OperationNotPermitted));

    sm.on_pal_event(PalSecurityEvent::PairingError {
        connection: CONNECTION,
        reason: PairingFailure::ConfirmValueFailed,
    });

    assert_eq!(sm.pairing_state(CONNECTION), Ok(PairingState::Idle));
    assert_eq!(
        *events.borrow(),
        vec![SecurityEvent::PairingResult {
            connection: CONNECTION,
            status: SecurityCompletionStatus::Failure(PairingFailure::ConfirmValueFailed),
        }]
    );
}

#[test]
fn test_pairing_timeout_reported() {
    let (mut sm, events) = manager();
    connect(&mut sm, Role::Central);
    sm.request_pairing(CONNECTION).unwrap();
    sm.on_pal_event(PalSecurityEvent::PairingTimedOut(CONNECTION));
    assert_eq!(
        events.borrow().last(),
        Some(&SecurityEvent::PairingResult {
            connection: CONNECTION,
            status: SecurityCompletionStatus::Timeout,
        })
    );
}

#[test]
fn test_request_pairing_unknown_connection() {
    let (mut sm, _) = manager();
    assert!(matches!(sm.request_pairing(CONNECTION), Err(BleError::InvalidParameter(_))));
}

#[test]
fn test_request_authentication_already_authenticated() {
    let (mut sm, _) = manager();
    connect(&mut sm, Role::Central);
    let entry = entry(&mut sm);
    entry.ltk_mitm_protected = true;
    entry.authenticated = true;

    let calls = sm.pal().calls.len();
    assert_eq!(sm.request_authentication(CONNECTION), Ok(()));
    assert_eq!(sm.pal().calls.len(), calls);
}

#[test]
fn test_set_link_encryption_unknown_connection() {
    let (mut sm, _) = manager();
    assert!(matches!(
        sm.set_link_encryption(7, LinkEncryption::Encrypted),
        Err(BleError::InvalidParameter(_))
    ));
}

#[test]
fn test_satisfied_target_left_alone() {
    let (mut sm, events) = manager();
    connect(&mut sm, Role::Central);
    let entry = entry(&mut sm);
    entry.encrypted = true;
    entry.ltk_mitm_protected = true;
    let calls = sm.pal().calls.len();

    sm.set_link_encryption(CONNECTION, LinkEncryption::Encrypted).unwrap();

    assert_eq!(sm.pal().calls.len(), calls);
    assert_eq!(
        *events.borrow(),
        vec![SecurityEvent::LinkEncryptionResult {
            connection: CONNECTION,
            result: LinkEncryption::EncryptedWithMitm,
        }]
    );
}

#[test]
fn test_open_link_disables_encryption() {
    let (mut sm, events) = manager();
    connect(&mut sm, Role::Central);
    sm.on_pal_event(PalSecurityEvent::LinkEncryptionResult {
        connection: CONNECTION,
        result: LinkEncryption::Encrypted,
        encryption_key_size: 16,
    });
    events.borrow_mut().clear();

    sm.set_link_security(CONNECTION, SecurityMode::EncryptionOpenLink).unwrap();
    assert_eq!(sm.pal().disabled_encryptions, vec![CONNECTION]);
    assert!(events.borrow().is_empty());

    sm.on_pal_event(PalSecurityEvent::LinkEncryptionResult {
        connection: CONNECTION,
        result: LinkEncryption::NotEncrypted,
        encryption_key_size: 0,
    });
    assert_eq!(sm.get_link_encryption(CONNECTION), Ok(LinkEncryption::NotEncrypted));
    assert_eq!(sm.get_encryption_key_size(CONNECTION), Ok(0));

    // nothing left to turn off
    sm.set_link_security(CONNECTION, SecurityMode::EncryptionOpenLink).unwrap();
    assert_eq!(sm.pal().count("disable_encryption"), 1);
}

#[test]
fn test_key_size_reported_by_controller() {
    let (mut sm, _) = manager();
    connect(&mut sm, Role::Central);
    assert_eq!(sm.get_encryption_key_size(CONNECTION), Ok(0));

    sm.on_pal_event(PalSecurityEvent::LinkEncryptionResult {
        connection: CONNECTION,
        result: LinkEncryption::Encrypted,
        encryption_key_size: 7,
    });
    assert_eq!(sm.get_encryption_key_size(CONNECTION), Ok(7));

    sm.on_disconnected(CONNECTION, DisconnectionReason::RemoteUserTerminatedConnection);
    connect(&mut sm, Role::Central);
    assert_eq!(sm.get_encryption_key_size(CONNECTION), Ok(0));
}

#[test]
fn test_encryption_in_progress_refused() {
    let (mut sm, _) = manager();
    connect(&mut sm, Role::Central);
    entry(&mut sm).encryption_requested = true;

    assert_eq!(sm.get_link_encryption(CONNECTION), Ok(LinkEncryption::EncryptionInProgress));
    assert_eq!(
        sm.set_link_encryption(CONNECTION, LinkEncryption::Encrypted),
        Err(BleError::OperationNotPermitted)
    );
    assert_eq!(
        sm.set_link_security(CONNECTION, SecurityMode::EncryptionNoMitm),
        Err(BleError::OperationNotPermitted)
    );
}

#[test]
fn test_encryption_queued_behind_pairing() {
    let (mut sm, events) = manager();
    connect(&mut sm, Role::Central);

    sm.set_link_encryption(CONNECTION, LinkEncryption::Encrypted).unwrap();
    assert_eq!(sm.pal().pairing_requests.len(), 1);
    assert!(sm.pal().encryptions.is_empty());
    assert_eq!(sm.get_link_encryption(CONNECTION), Ok(LinkEncryption::EncryptionInProgress));

    sm.on_pal_event(PalSecurityEvent::PasskeyDisplay {
        connection: CONNECTION,
        passkey: 123_456,
    });
    sm.on_pal_event(PalSecurityEvent::KeysDistributed {
        connection: CONNECTION,
        keys: DistributedKeys {
            keys: legacy_keys(),
            identity: None,
            csrk: None,
        },
    });
    sm.on_pal_event(PalSecurityEvent::PairingCompleted(CONNECTION));

    assert_eq!(sm.pal().encryptions, vec![(CONNECTION, ltk(), true)]);
    assert_eq!(sm.pairing_state(CONNECTION), Ok(PairingState::Paired));

    sm.on_pal_event(PalSecurityEvent::LinkEncryptionResult {
        connection: CONNECTION,
        result: LinkEncryption::EncryptedWithMitm,
        encryption_key_size: 16,
    });
    assert_eq!(sm.get_link_encryption(CONNECTION), Ok(LinkEncryption::EncryptedWithMitm));

    let passkey = Passkey::from_num(123_456).unwrap();
    assert_eq!(
        *events.borrow(),
        vec![
            SecurityEvent::PasskeyDisplay {
                connection: CONNECTION,
                passkey,
            },
            SecurityEvent::PairingResult {
                connection: CONNECTION,
                status: SecurityCompletionStatus::Success,
            },
            SecurityEvent::SecurityContextStored(CONNECTION),
            SecurityEvent::LinkEncryptionResult {
                connection: CONNECTION,
                result: LinkEncryption::EncryptedWithMitm,
            },
        ]
    );
}

#[test]
fn test_mitm_committed_on_completion() {
    let (mut sm, _) = manager();
    connect(&mut sm, Role::Central);
    sm.request_pairing(CONNECTION).unwrap();

    sm.on_pal_event(PalSecurityEvent::KeysDistributedLtk {
        connection: CONNECTION,
        ltk: ltk(),
    });
    assert!(!entry(&mut sm).ltk_mitm_protected);

    sm.on_pal_event(PalSecurityEvent::ConfirmationRequest(CONNECTION));
    assert!(entry(&mut sm).mitm_performed);

    sm.on_pal_event(PalSecurityEvent::PairingCompleted(CONNECTION));
    let entry = entry(&mut sm);
    assert!(entry.ltk_mitm_protected);
    assert!(!entry.mitm_performed);
    assert_eq!(entry.encryption_key_size, 0);
}

#[test]
fn test_oob_mitm_only_when_protected() {
    let (mut sm, _) = manager();
    connect(&mut sm, Role::Central);

    sm.on_pal_event(PalSecurityEvent::LegacyPairingOobRequest(CONNECTION));
    assert!(!entry(&mut sm).mitm_performed);

    sm.set_oob_data_usage(CONNECTION, true, true).unwrap();
    sm.on_pal_event(PalSecurityEvent::SecureConnectionsOobRequest(CONNECTION));
    assert!(entry(&mut sm).mitm_performed);
}

#[test]
fn test_stored_key_reused_for_encryption() {
    let (mut sm, _) = manager();
    connect(&mut sm, Role::Central);
    let keys = legacy_keys();
    sm.db_mut().set_entry_peer_ltk(CONNECTION, &keys.ltk);
    sm.db_mut().set_entry_peer_ediv_rand(CONNECTION, &keys.ediv, &keys.rand);

    sm.set_link_security(CONNECTION, SecurityMode::EncryptionNoMitm).unwrap();

    assert!(sm.pal().pairing_requests.is_empty());
    assert_eq!(sm.pal().count("enable_encryption"), 1);
    assert_eq!(sm.pal().encryptions, vec![(CONNECTION, ltk(), false)]);
}

#[test]
fn test_encryption_failure_retries_pairing_once() {
    let (mut sm, events) = manager();
    connect(&mut sm, Role::Central);
    sm.db_mut().set_entry_peer_ltk(CONNECTION, &ltk());
    sm.set_link_encryption(CONNECTION, LinkEncryption::Encrypted).unwrap();

    sm.on_pal_event(PalSecurityEvent::LinkEncryptionResult {
        connection: CONNECTION,
        result: LinkEncryption::NotEncrypted,
        encryption_key_size: 0,
    });
    assert_eq!(sm.pal().pairing_requests.len(), 1);
    assert!(events.borrow().is_empty());

    sm.on_pal_event(PalSecurityEvent::PairingError {
        connection: CONNECTION,
        reason: PairingFailure::PairingNotSupported,
    });
    assert_eq!(sm.get_link_encryption(CONNECTION), Ok(LinkEncryption::NotEncrypted));
    assert_eq!(events.borrow().len(), 1);
}

#[test]
fn test_peripheral_asks_central_for_security() {
    let (mut sm, _) = manager();
    connect(&mut sm, Role::Peripheral);

    sm.set_link_encryption(CONNECTION, LinkEncryption::EncryptedWithMitm).unwrap();

    assert!(sm.pal().pairing_requests.is_empty());
    let (connection, authentication) = sm.pal().slave_security_requests[0];
    assert_eq!(connection, CONNECTION);
    assert!(authentication.contains(AuthenticationMask::MITM));
}

#[test]
fn test_slave_security_request_handling() {
    let (mut sm, _) = manager();
    connect(&mut sm, Role::Central);

    sm.on_pal_event(PalSecurityEvent::SlaveSecurityRequest {
        connection: CONNECTION,
        authentication: AuthenticationMask::BONDING,
    });
    assert_eq!(sm.pal().pairing_requests.len(), 1);

    sm.on_pal_event(PalSecurityEvent::PairingError {
        connection: CONNECTION,
        reason: PairingFailure::UnspecifiedReason,
    });
    sm.db_mut().set_entry_peer_ltk(CONNECTION, &ltk());
    sm.on_pal_event(PalSecurityEvent::SlaveSecurityRequest {
        connection: CONNECTION,
        authentication: AuthenticationMask::BONDING,
    });
    assert_eq!(sm.pal().pairing_requests.len(), 1);
    assert_eq!(sm.pal().count("enable_encryption"), 1);
}

#[test]
fn test_ltk_request_answered_from_local_keys() {
    let (mut sm, _) = manager();
    connect(&mut sm, Role::Peripheral);
    let keys = legacy_keys();
    sm.db_mut().set_entry_local_ltk(CONNECTION, &keys.ltk);
    sm.db_mut().set_entry_local_ediv_rand(CONNECTION, &keys.ediv, &keys.rand);

    sm.on_pal_event(PalSecurityEvent::LtkRequest {
        connection: CONNECTION,
        ediv: keys.ediv,
        rand: keys.rand,
    });
    assert_eq!(sm.pal().ltk_replies, vec![(CONNECTION, keys.ltk, false, false)]);

    sm.on_pal_event(PalSecurityEvent::LtkRequest {
        connection: CONNECTION,
        ediv: Ediv::new([0xFF, 0xFF]),
        rand: keys.rand,
    });
    assert_eq!(sm.pal().ltk_not_found, vec![CONNECTION]);

    sm.on_pal_event(PalSecurityEvent::SecureConnectionsLtkRequest(CONNECTION));
    assert_eq!(sm.pal().ltk_replies[1], (CONNECTION, keys.ltk, false, true));
}

#[test]
fn test_peripheral_bond_answers_ltk_after_reconnection() {
    let (mut sm, _) = manager();
    connect(&mut sm, Role::Peripheral);
    let keys = legacy_keys();
    sm.on_pal_event(PalSecurityEvent::KeysDistributedLocalLtk {
        connection: CONNECTION,
        ltk: keys.ltk,
    });
    sm.on_pal_event(PalSecurityEvent::KeysDistributedLocalEdivRand {
        connection: CONNECTION,
        ediv: keys.ediv,
        rand: keys.rand,
    });
    sm.on_pal_event(PalSecurityEvent::PairingCompleted(CONNECTION));

    sm.on_disconnected(CONNECTION, DisconnectionReason::RemoteUserTerminatedConnection);
    connect(&mut sm, Role::Peripheral);
    sm.on_pal_event(PalSecurityEvent::LtkRequest {
        connection: CONNECTION,
        ediv: keys.ediv,
        rand: keys.rand,
    });

    assert!(sm.pal().ltk_not_found.is_empty());
    assert_eq!(sm.pal().ltk_replies, vec![(CONNECTION, keys.ltk, false, false)]);
}

#[test]
fn test_ltk_request_while_lookup_pending() {
    let (mut sm, _) = manager_with(pal(), DeferredDb::new());
    connect(&mut sm, Role::Peripheral);
    let keys = legacy_keys();
    sm.db_mut().set_entry_local_ltk(CONNECTION, &keys.ltk);
    sm.db_mut().set_entry_local_ediv_rand(CONNECTION, &keys.ediv, &keys.rand);

    let request = PalSecurityEvent::LtkRequest {
        connection: CONNECTION,
        ediv: keys.ediv,
        rand: keys.rand,
    };
    sm.on_pal_event(request.clone());
    assert!(sm.has_pending_request(CONNECTION));
    assert!(sm.pal().ltk_replies.is_empty());

    sm.on_pal_event(request);
    assert_eq!(sm.pal().ltk_not_found, vec![CONNECTION]);

    sm.db_mut().release();
    sm.poll_db_replies();
    assert!(!sm.has_pending_request(CONNECTION));
    assert_eq!(sm.pal().ltk_replies, vec![(CONNECTION, keys.ltk, false, false)]);
}

#[test]
fn test_disconnection_drops_pending_lookup() {
    let (mut sm, _) = manager_with(pal(), DeferredDb::new());
    connect(&mut sm, Role::Peripheral);
    sm.on_pal_event(PalSecurityEvent::LtkRequest {
        connection: CONNECTION,
        ediv: Ediv::default(),
        rand: Rand::default(),
    });
    assert!(sm.has_pending_request(CONNECTION));

    sm.on_disconnected(CONNECTION, DisconnectionReason::RemoteUserTerminatedConnection);
    sm.db_mut().release();
    sm.poll_db_replies();

    assert!(!sm.has_pending_request(CONNECTION));
    assert!(sm.pal().ltk_replies.is_empty());
    assert!(sm.get_link_encryption(CONNECTION).is_err());
}

#[test]
fn test_signing_key_delivery() {
    let (mut sm, events) = manager();
    connect(&mut sm, Role::Central);
    let csrk = Csrk::new([0xC5; 16]);

    sm.on_pal_event(PalSecurityEvent::KeysDistributedCsrk {
        connection: CONNECTION,
        csrk,
    });
    sm.get_signing_key(CONNECTION, false).unwrap();

    let signing_key = SecurityEvent::SigningKey {
        connection: CONNECTION,
        csrk,
        authenticated: false,
    };
    assert_eq!(*events.borrow(), vec![signing_key.clone(), signing_key]);

    // an unauthenticated key does not satisfy an authenticated request
    sm.get_signing_key(CONNECTION, true).unwrap();
    assert_eq!(events.borrow().len(), 2);
    assert_eq!(sm.pal().pairing_requests.len(), 1);
    assert!(entry(&mut sm).signing_requested);
}

#[test]
fn test_legacy_pairing_refused_when_disallowed() {
    let (mut sm, _) = manager();
    sm.allow_legacy_pairing(false);
    connect(&mut sm, Role::Peripheral);

    let request = |authentication| PalSecurityEvent::PairingRequest {
        connection: CONNECTION,
        use_oob: false,
        authentication,
        initiator_dist: KeyDistribution::IDENTITY,
        responder_dist: KeyDistribution::ENCRYPTION | KeyDistribution::IDENTITY,
    };

    sm.on_pal_event(request(AuthenticationMask::BONDING));
    assert_eq!(
        sm.pal().cancelled,
        vec![(CONNECTION, PairingFailure::AuthenticationRequirements)]
    );
    assert!(sm.pal().pairing_responses.is_empty());

    sm.on_pal_event(request(AuthenticationMask::BONDING | AuthenticationMask::SECURE_CONNECTIONS));
    assert_eq!(sm.pal().pairing_responses.len(), 1);
    assert_eq!(sm.pairing_state(CONNECTION), Ok(PairingState::KeyExchangeInProgress));
}

#[test]
fn test_legacy_only_controller_cannot_pair_when_disallowed() {
    let (mut sm, _) = manager_with(MockPalSecurity::default(), MemorySecurityDb::new());
    sm.allow_legacy_pairing(false);
    connect(&mut sm, Role::Central);
    assert_eq!(sm.request_pairing(CONNECTION), Err(BleError::InvalidState));
}

#[test]
fn test_pairing_authorisation() {
    let (mut sm, events) = manager();
    sm.set_pairing_request_authorisation(true);
    connect(&mut sm, Role::Peripheral);

    sm.on_pal_event(PalSecurityEvent::PairingRequest {
        connection: CONNECTION,
        use_oob: false,
        authentication: AuthenticationMask::BONDING | AuthenticationMask::MITM,
        initiator_dist: KeyDistribution::IDENTITY,
        responder_dist: KeyDistribution::ENCRYPTION,
    });
    assert_eq!(*events.borrow(), vec![SecurityEvent::PairingRequest(CONNECTION)]);
    assert!(sm.pal().pairing_responses.is_empty());

    sm.accept_pairing_request(CONNECTION).unwrap();
    assert_eq!(sm.pal().pairing_responses.len(), 1);
}

#[test]
fn test_cancel_pairing_request() {
    let (mut sm, _) = manager();
    connect(&mut sm, Role::Central);
    sm.request_pairing(CONNECTION).unwrap();
    sm.cancel_pairing_request(CONNECTION).unwrap();
    assert_eq!(sm.pal().cancelled, vec![(CONNECTION, PairingFailure::UnspecifiedReason)]);
    assert_eq!(sm.pairing_state(CONNECTION), Ok(PairingState::Idle));
}

#[test]
fn test_passkey_forwarded() {
    let (mut sm, _) = manager();
    assert!(sm.passkey_entered(CONNECTION, Passkey::from_num(1).unwrap()).is_err());

    connect(&mut sm, Role::Central);
    sm.passkey_entered(CONNECTION, Passkey::from_num(654_321).unwrap()).unwrap();
    assert_eq!(sm.pal().passkey_replies, vec![(CONNECTION, 654_321)]);
}

#[test]
fn test_bonded_identities_loaded_on_init() {
    let identity = BdAddr::new([0x10, 0x20, 0x30, 0x40, 0x50, 0x60]);
    let irk = Irk::new([0x77; 16]);
    let mut db = MemorySecurityDb::new();
    db.connect_entry(CONNECTION, AddressType::Random, &PEER, &LOCAL);
    db.set_entry_peer_irk(CONNECTION, &irk);
    db.set_entry_peer_bdaddr(CONNECTION, true, &identity);

    let (sm, _) = manager_with(pal(), db);

    assert_eq!(sm.pal().resolving_list, vec![(true, identity, irk)]);
    let calls = &sm.pal().calls;
    let cleared = calls.iter().position(|c| *c == "clear_resolving_list");
    let added = calls.iter().position(|c| *c == "add_device_to_resolving_list");
    assert!(cleared < added);
}

#[test]
fn test_distributed_identity_resolved() {
    let (mut sm, _) = manager();
    connect(&mut sm, Role::Central);
    let identity = BdAddr::new([0x10, 0x20, 0x30, 0x40, 0x50, 0xD0]);
    let irk = Irk::new([0x31; 16]);

    sm.on_pal_event(PalSecurityEvent::KeysDistributedIrk {
        connection: CONNECTION,
        irk,
    });
    assert!(sm.pal().resolving_list.is_empty());

    sm.on_pal_event(PalSecurityEvent::KeysDistributedBdaddr {
        connection: CONNECTION,
        address_is_public: false,
        address: identity,
    });
    assert_eq!(sm.pal().resolving_list, vec![(false, identity, irk)]);
}

#[test]
fn test_whitelist_from_bond_table() {
    let (mut sm, events) = manager();
    connect(&mut sm, Role::Central);
    sm.db_mut().set_entry_peer_ltk(CONNECTION, &ltk());

    sm.generate_whitelist_from_bond_table(4).unwrap();

    let events = events.borrow();
    match events.as_slice() {
        [SecurityEvent::WhitelistFromBondTable(whitelist)] => assert_eq!(whitelist.len(), 1),
        other => panic!("unexpected events {:?}", other),
    }
}

#[test]
fn test_purge_bonds() {
    let (mut sm, _) = manager();
    connect(&mut sm, Role::Central);
    sm.db_mut().set_entry_peer_ltk(CONNECTION, &ltk());

    sm.purge_all_bonding_state().unwrap();

    assert!(!entry(&mut sm).ltk_stored);
    assert!(sm.db().get_local_csrk().is_none());
}
