//! Security Manager
//!
//! Drives pairing and link encryption per connection on top of a
//! [`PalSecurityManager`], and keeps keys in a [`SecurityDb`]. Key lookups
//! go through single-fire database replies; at most one lookup is
//! outstanding per connection.

use super::constants::*;
use super::keys::*;
use super::types::*;
use crate::db::{DbReceiver, DbReply, ReplyState, SecurityDb, SecurityEntry, SecurityEntryIdentity, SecurityEntryKeys};
use crate::error::{BleError, BleResult};
use crate::gap::{AddressType, BdAddr, ConnectionHandle, DisconnectionReason, Role, Whitelist};
use crate::pal::{ConnectionEventMonitor, PalSecurityEvent, PalSecurityManager};
use rand::RngCore;
use std::collections::HashMap;

/// Type for security event callback
pub type SecurityEventCallback = Box<dyn FnMut(SecurityEvent)>;

fn no_entry(connection: ConnectionHandle) -> BleError {
    BleError::invalid(format!("no security entry for connection {:#06x}", connection))
}

/// What a key lookup was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeysPurpose {
    EnableEncryption,
    LtkRequest,
    LtkRequestSc,
}

/// Outstanding database lookup of a connection.
enum PendingLookup {
    Keys {
        purpose: KeysPurpose,
        receiver: DbReceiver<SecurityEntryKeys>,
    },
    SigningKey(DbReceiver<Csrk>),
}

/// Identity of a peer as it gets distributed.
#[derive(Debug, Default)]
struct PartialIdentity {
    irk: Option<Irk>,
    address: Option<(bool, BdAddr)>,
}

/// Security Manager
pub struct SecurityManager<P: PalSecurityManager, D: SecurityDb> {
    pal: P,
    db: D,
    config: SecurityConfig,
    initialized: bool,
    keypress_notification: bool,
    default_authentication: AuthenticationMask,
    default_key_distribution: KeyDistribution,

    event_callback: Option<SecurityEventCallback>,

    pending: HashMap<ConnectionHandle, PendingLookup>,
    pending_whitelist: Option<DbReceiver<Whitelist>>,
    pending_identities: Option<DbReceiver<Vec<SecurityEntryIdentity>>>,
    requested_distribution: HashMap<ConnectionHandle, (KeyDistribution, KeyDistribution)>,
    identities: HashMap<ConnectionHandle, PartialIdentity>,
}

impl<P: PalSecurityManager, D: SecurityDb> SecurityManager<P, D> {
    /// Create a new Security Manager. Nothing reaches the controller before
    /// [`SecurityManager::init`].
    pub fn new(pal: P, db: D) -> Self {
        Self {
            pal,
            db,
            config: SecurityConfig::default(),
            initialized: false,
            keypress_notification: false,
            default_authentication: AuthenticationMask::empty(),
            default_key_distribution: KeyDistribution::ENCRYPTION | KeyDistribution::IDENTITY,
            event_callback: None,
            pending: HashMap::new(),
            pending_whitelist: None,
            pending_identities: None,
            requested_distribution: HashMap::new(),
            identities: HashMap::new(),
        }
    }

    pub fn pal(&self) -> &P {
        &self.pal
    }

    pub fn pal_mut(&mut self) -> &mut P {
        &mut self.pal
    }

    pub fn db(&self) -> &D {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut D {
        &mut self.db
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Set the event callback
    pub fn set_event_callback<F>(&mut self, callback: F)
    where
        F: FnMut(SecurityEvent) + 'static,
    {
        self.event_callback = Some(Box::new(callback));
    }

    fn notify(&mut self, event: SecurityEvent) {
        if let Some(callback) = self.event_callback.as_mut() {
            callback(event);
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Restores bonds, configures the SMP layer and loads bonded identities
    /// into the resolving list.
    pub fn init(&mut self, config: SecurityConfig) -> BleResult<()> {
        Self::check_key_sizes(config.min_encryption_key_size, config.max_encryption_key_size)?;

        self.db.restore()?;
        self.pal.initialize()?;
        self.pal.set_io_capability(config.io_capability)?;
        self.pal
            .set_display_passkey(config.passkey.map(|passkey| passkey.to_num()).unwrap_or(0))?;
        self.pal
            .set_encryption_key_requirements(config.min_encryption_key_size, config.max_encryption_key_size)?;

        if config.signing {
            let csrk = match self.db.get_local_csrk() {
                Some(csrk) => csrk,
                None => {
                    let mut bytes = [0u8; 16];
                    rand::thread_rng().fill_bytes(&mut bytes);
                    let csrk = Csrk::new(bytes);
                    self.db.set_local_csrk(&csrk);
                    csrk
                }
            };
            self.pal.set_csrk(&csrk)?;
        }

        self.config = config;
        self.update_defaults();
        self.initialized = true;
        self.refresh_resolving_list()?;
        log::debug!("security manager initialised");
        Ok(())
    }

    /// Writes bonds to storage and drops outstanding lookups.
    pub fn reset(&mut self) -> BleResult<()> {
        if !self.initialized {
            return Err(BleError::InvalidState);
        }
        self.db.sync()?;
        self.pending.clear();
        self.pending_whitelist = None;
        self.pending_identities = None;
        self.requested_distribution.clear();
        self.identities.clear();
        Ok(())
    }

    /// Selects whether the next `init` reloads stored bonds.
    pub fn preserve_bonding_state_on_reset(&mut self, enable: bool) {
        self.db.set_restore(enable);
    }

    /// Forgets every bond.
    pub fn purge_all_bonding_state(&mut self) -> BleResult<()> {
        self.db.clear_entries();
        self.pal.clear_resolving_list()
    }

    /// Builds a whitelist from the bond table, delivered as
    /// [`SecurityEvent::WhitelistFromBondTable`].
    pub fn generate_whitelist_from_bond_table(&mut self, capacity: usize) -> BleResult<()> {
        if self.pending_whitelist.is_some() {
            return Err(BleError::OperationNotPermitted);
        }
        let (reply, receiver) = DbReply::channel();
        self.db.generate_whitelist_from_bond_table(reply, capacity);
        self.pending_whitelist = Some(receiver);
        self.poll_db_replies();
        Ok(())
    }

    fn refresh_resolving_list(&mut self) -> BleResult<()> {
        self.pal.clear_resolving_list()?;
        let (reply, receiver) = DbReply::channel();
        self.db.get_identity_list(reply);
        self.pending_identities = Some(receiver);
        self.poll_db_replies();
        Ok(())
    }

    fn update_defaults(&mut self) {
        let mut authentication = AuthenticationMask::empty();
        authentication.set(AuthenticationMask::BONDING, self.config.bondable);
        authentication.set(AuthenticationMask::MITM, self.config.mitm);
        authentication.set(
            AuthenticationMask::SECURE_CONNECTIONS,
            self.config.secure_connections && self.pal.get_secure_connections_support(),
        );
        authentication.set(AuthenticationMask::KEYPRESS_NOTIFICATION, self.keypress_notification);
        self.default_authentication = authentication;

        let mut distribution = KeyDistribution::ENCRYPTION | KeyDistribution::IDENTITY;
        distribution.set(KeyDistribution::SIGNING, self.config.signing);
        self.default_key_distribution = distribution;
    }

    // ---------------------------------------------------------------------
    // Settings
    // ---------------------------------------------------------------------

    pub fn get_secure_connections_support(&self) -> bool {
        self.pal.get_secure_connections_support()
    }

    pub fn allow_legacy_pairing(&mut self, allow: bool) {
        self.config.legacy_pairing_allowed = allow;
    }

    pub fn set_pairing_request_authorisation(&mut self, required: bool) {
        self.config.pairing_authorisation = required;
    }

    pub fn set_io_capability(&mut self, io_capability: IoCapability) -> BleResult<()> {
        self.pal.set_io_capability(io_capability)?;
        self.config.io_capability = io_capability;
        Ok(())
    }

    /// Static passkey shown during pairing, `None` for a random one.
    pub fn set_display_passkey(&mut self, passkey: Option<Passkey>) -> BleResult<()> {
        self.pal
            .set_display_passkey(passkey.map(|passkey| passkey.to_num()).unwrap_or(0))?;
        self.config.passkey = passkey;
        Ok(())
    }

    pub fn set_keypress_notification(&mut self, enabled: bool) {
        self.keypress_notification = enabled;
        self.update_defaults();
    }

    fn check_key_sizes(min_size: u8, max_size: u8) -> BleResult<()> {
        if min_size < SMP_MIN_ENCRYPTION_KEY_SIZE || max_size > SMP_MAX_ENCRYPTION_KEY_SIZE || min_size > max_size {
            return Err(BleError::invalid(format!(
                "encryption key size range {}..={} outside {}..={}",
                min_size, max_size, SMP_MIN_ENCRYPTION_KEY_SIZE, SMP_MAX_ENCRYPTION_KEY_SIZE
            )));
        }
        Ok(())
    }

    pub fn set_encryption_key_requirements(&mut self, min_size: u8, max_size: u8) -> BleResult<()> {
        Self::check_key_sizes(min_size, max_size)?;
        self.pal.set_encryption_key_requirements(min_size, max_size)?;
        self.config.min_encryption_key_size = min_size;
        self.config.max_encryption_key_size = max_size;
        Ok(())
    }

    pub fn set_private_address_timeout(&mut self, timeout_in_seconds: u16) -> BleResult<()> {
        self.pal.set_private_address_timeout(timeout_in_seconds)
    }

    /// Timeout in milliseconds, rounded down to 10 ms.
    pub fn set_authentication_timeout(&mut self, connection: ConnectionHandle, timeout_ms: u32) -> BleResult<()> {
        self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        let units = (timeout_ms / AUTHENTICATION_TIMEOUT_UNIT_MS).min(u16::MAX as u32) as u16;
        self.pal.set_authentication_timeout(connection, units)
    }

    /// Timeout in milliseconds.
    pub fn get_authentication_timeout(&self, connection: ConnectionHandle) -> BleResult<u32> {
        self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        let units = self.pal.get_authentication_timeout(connection)?;
        Ok(units as u32 * AUTHENTICATION_TIMEOUT_UNIT_MS)
    }

    // ---------------------------------------------------------------------
    // Pairing
    // ---------------------------------------------------------------------

    fn initiator_distribution(&self, entry: &SecurityEntry) -> KeyDistribution {
        let mut distribution = KeyDistribution::IDENTITY;
        if self.config.signing || entry.signing_requested {
            distribution |= KeyDistribution::SIGNING;
        }
        distribution
    }

    fn responder_distribution(&self, entry: &SecurityEntry) -> KeyDistribution {
        let mut distribution = self.default_key_distribution;
        if entry.signing_requested {
            distribution |= KeyDistribution::SIGNING;
        }
        distribution
    }

    fn link_authentication(&self, entry: &SecurityEntry) -> AuthenticationMask {
        let mut authentication = self.default_authentication;
        if entry.mitm_requested {
            authentication |= AuthenticationMask::MITM;
        }
        authentication
    }

    /// Sends a pairing request as master.
    pub fn request_pairing(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        let entry = self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        if matches!(
            entry.pairing,
            PairingState::RequestSent | PairingState::RequestReceived | PairingState::KeyExchangeInProgress
        ) {
            return Err(BleError::OperationNotPermitted);
        }
        self.send_pairing_request(connection)
    }

    /// Pairs unless a pairing is already running on the connection.
    fn start_pairing(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        let entry = self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        match entry.pairing {
            PairingState::RequestSent | PairingState::RequestReceived | PairingState::KeyExchangeInProgress => Ok(()),
            PairingState::Idle | PairingState::Paired => self.send_pairing_request(connection),
        }
    }

    fn send_pairing_request(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        if !self.config.legacy_pairing_allowed
            && !self.default_authentication.contains(AuthenticationMask::SECURE_CONNECTIONS)
        {
            return Err(BleError::InvalidState);
        }
        let entry = self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        let authentication = self.link_authentication(entry);
        let initiator = self.initiator_distribution(entry);
        let responder = self.responder_distribution(entry);
        let oob = entry.oob_present;

        self.pal
            .send_pairing_request(connection, oob, authentication, initiator, responder)?;
        if let Some(entry) = self.db.get_entry_mut(connection) {
            entry.mitm_performed = false;
            entry.pairing = PairingState::RequestSent;
        }
        log::debug!("pairing requested on {:#06x}", connection);
        Ok(())
    }

    /// Answers the pairing request of a peer.
    pub fn accept_pairing_request(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        let entry = self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        let authentication = self.link_authentication(entry);
        let (mut initiator, mut responder) = self
            .requested_distribution
            .get(&connection)
            .copied()
            .unwrap_or((self.initiator_distribution(entry), self.responder_distribution(entry)));
        initiator &= self.initiator_distribution(entry);
        responder &= self.responder_distribution(entry);
        let oob = entry.oob_present;

        self.pal
            .send_pairing_response(connection, oob, authentication, initiator, responder)?;
        if let Some(entry) = self.db.get_entry_mut(connection) {
            entry.mitm_performed = false;
            entry.pairing = PairingState::KeyExchangeInProgress;
        }
        Ok(())
    }

    pub fn cancel_pairing_request(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        self.pal.cancel_pairing(connection, PairingFailure::UnspecifiedReason)?;
        if let Some(entry) = self.db.get_entry_mut(connection) {
            entry.pairing = PairingState::Idle;
        }
        self.requested_distribution.remove(&connection);
        Ok(())
    }

    pub fn pairing_state(&self, connection: ConnectionHandle) -> BleResult<PairingState> {
        self.db
            .get_entry(connection)
            .map(|entry| entry.pairing)
            .ok_or_else(|| no_entry(connection))
    }

    fn slave_security_request(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        let entry = self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        let mut authentication = self.default_authentication;
        authentication.set(AuthenticationMask::MITM, entry.mitm_requested);
        self.pal.slave_security_request(connection, authentication)
    }

    // ---------------------------------------------------------------------
    // Link security
    // ---------------------------------------------------------------------

    /// Dispatches a security mode to encryption or signing.
    pub fn set_link_security(&mut self, connection: ConnectionHandle, mode: SecurityMode) -> BleResult<()> {
        let entry = self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        if entry.encryption_requested {
            return Err(BleError::OperationNotPermitted);
        }
        match mode {
            SecurityMode::EncryptionOpenLink => self.set_link_encryption(connection, LinkEncryption::NotEncrypted),
            SecurityMode::EncryptionNoMitm => self.set_link_encryption(connection, LinkEncryption::Encrypted),
            SecurityMode::EncryptionWithMitm => {
                self.set_link_encryption(connection, LinkEncryption::EncryptedWithMitm)
            }
            SecurityMode::SignedNoMitm => self.get_signing_key(connection, false),
            SecurityMode::SignedWithMitm => self.get_signing_key(connection, true),
        }
    }

    pub fn get_link_encryption(&self, connection: ConnectionHandle) -> BleResult<LinkEncryption> {
        let entry = self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        Ok(Self::link_encryption_of(entry))
    }

    fn link_encryption_of(entry: &SecurityEntry) -> LinkEncryption {
        if entry.encrypted {
            if entry.authenticated || entry.ltk_mitm_protected || entry.mitm_performed {
                if entry.secure_connections_paired {
                    LinkEncryption::EncryptedWithScAndMitm
                } else {
                    LinkEncryption::EncryptedWithMitm
                }
            } else {
                LinkEncryption::Encrypted
            }
        } else if entry.encryption_requested {
            LinkEncryption::EncryptionInProgress
        } else {
            LinkEncryption::NotEncrypted
        }
    }

    /// Raises the encryption of a link, or turns it off for a `NotEncrypted`
    /// target. A link already meeting a higher target is left alone.
    pub fn set_link_encryption(&mut self, connection: ConnectionHandle, target: LinkEncryption) -> BleResult<()> {
        let entry = self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        let current = Self::link_encryption_of(entry);
        if current == LinkEncryption::EncryptionInProgress {
            return Err(BleError::OperationNotPermitted);
        }

        match target {
            LinkEncryption::EncryptionInProgress => {
                return Err(BleError::invalid("encryption in progress is not a target"))
            }
            LinkEncryption::NotEncrypted if entry.encrypted => {
                log::debug!("disabling encryption on {:#06x}", connection);
                return self.pal.disable_encryption(connection);
            }
            _ if current >= target => {}
            LinkEncryption::Encrypted => {
                self.mark_encryption_requested(connection);
                return self.enable_encryption(connection);
            }
            LinkEncryption::EncryptedWithMitm | LinkEncryption::EncryptedWithScAndMitm => {
                let reuse_key = entry.ltk_mitm_protected && !entry.encrypted;
                self.mark_encryption_requested(connection);
                return if reuse_key {
                    self.enable_encryption(connection)
                } else {
                    self.request_authentication(connection)
                };
            }
            LinkEncryption::NotEncrypted => {}
        }

        self.notify(SecurityEvent::LinkEncryptionResult {
            connection,
            result: current,
        });
        Ok(())
    }

    fn mark_encryption_requested(&mut self, connection: ConnectionHandle) {
        if let Some(entry) = self.db.get_entry_mut(connection) {
            entry.encryption_requested = true;
        }
    }

    fn enable_encryption(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        let entry = self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        if !entry.is_master {
            return self.slave_security_request(connection);
        }
        if !entry.ltk_stored {
            return self.start_pairing(connection);
        }
        if self.pending.contains_key(&connection) {
            return Err(BleError::OperationNotPermitted);
        }
        let (reply, receiver) = DbReply::channel();
        self.db.get_entry_peer_keys(reply, connection);
        self.track_keys(connection, KeysPurpose::EnableEncryption, receiver);
        Ok(())
    }

    /// Ensures the link uses a MITM protected key, pairing again when the
    /// stored key is not.
    pub fn request_authentication(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        let entry = self.db.get_entry_mut(connection).ok_or_else(|| no_entry(connection))?;
        if entry.ltk_mitm_protected {
            if entry.authenticated {
                return Ok(());
            }
            entry.encryption_requested = true;
            return self.enable_encryption(connection);
        }

        entry.mitm_requested = true;
        if entry.is_master {
            self.start_pairing(connection)
        } else {
            self.slave_security_request(connection)
        }
    }

    /// Key size negotiated on the link, 0 while it is not encrypted.
    pub fn get_encryption_key_size(&self, connection: ConnectionHandle) -> BleResult<u8> {
        self.db
            .get_entry(connection)
            .map(|entry| entry.encryption_key_size)
            .ok_or_else(|| no_entry(connection))
    }

    // ---------------------------------------------------------------------
    // Signing
    // ---------------------------------------------------------------------

    /// Delivers the peer's signing key as [`SecurityEvent::SigningKey`],
    /// pairing first when no suitable key is stored.
    pub fn get_signing_key(&mut self, connection: ConnectionHandle, authenticated: bool) -> BleResult<()> {
        let entry = self.db.get_entry_mut(connection).ok_or_else(|| no_entry(connection))?;
        if entry.csrk_stored && (entry.csrk_mitm_protected || !authenticated) {
            return self.lookup_signing_key(connection);
        }

        entry.signing_requested = true;
        let is_master = entry.is_master;
        if authenticated {
            self.request_authentication(connection)
        } else if is_master {
            self.start_pairing(connection)
        } else {
            self.slave_security_request(connection)
        }
    }

    pub fn enable_signing(&mut self, connection: ConnectionHandle, enabled: bool) -> BleResult<()> {
        let entry = self.db.get_entry_mut(connection).ok_or_else(|| no_entry(connection))?;
        let already = entry.signing_requested;
        entry.signing_requested = enabled;
        if !enabled || already {
            return Ok(());
        }
        if entry.csrk_stored {
            return self.lookup_signing_key(connection);
        }
        if entry.is_master {
            self.start_pairing(connection)
        } else {
            self.slave_security_request(connection)
        }
    }

    fn lookup_signing_key(&mut self, connection: ConnectionHandle) -> BleResult<()> {
        if self.pending.contains_key(&connection) {
            return Err(BleError::OperationNotPermitted);
        }
        let (reply, receiver) = DbReply::channel();
        self.db.get_entry_peer_csrk(reply, connection);
        self.pending.insert(connection, PendingLookup::SigningKey(receiver));
        self.poll_db_replies();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // MITM and OOB
    // ---------------------------------------------------------------------

    pub fn set_oob_data_usage(
        &mut self,
        connection: ConnectionHandle,
        use_oob: bool,
        oob_provides_mitm: bool,
    ) -> BleResult<()> {
        let entry = self.db.get_entry_mut(connection).ok_or_else(|| no_entry(connection))?;
        entry.attempt_oob = use_oob;
        entry.oob_mitm_protection = oob_provides_mitm;
        entry.oob_present = use_oob;
        Ok(())
    }

    pub fn confirmation_entered(&mut self, connection: ConnectionHandle, confirmation: bool) -> BleResult<()> {
        self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        self.pal.confirmation_entered(connection, confirmation)
    }

    pub fn passkey_entered(&mut self, connection: ConnectionHandle, passkey: Passkey) -> BleResult<()> {
        self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        self.pal.passkey_request_reply(connection, passkey.to_num())
    }

    pub fn send_keypress_notification(&mut self, connection: ConnectionHandle, keypress: Keypress) -> BleResult<()> {
        self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        self.pal.send_keypress_notification(connection, keypress)
    }

    pub fn legacy_pairing_oob_received(&mut self, connection: ConnectionHandle, tk: &OobTk) -> BleResult<()> {
        self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        self.pal.legacy_pairing_oob_request_reply(connection, tk)
    }

    pub fn oob_received(
        &mut self,
        connection: ConnectionHandle,
        random: &OobRand,
        confirm: &OobConfirm,
    ) -> BleResult<()> {
        self.db.get_entry(connection).ok_or_else(|| no_entry(connection))?;
        self.pal.secure_connections_oob_request_reply(connection, random, confirm)
    }

    // ---------------------------------------------------------------------
    // Database replies
    // ---------------------------------------------------------------------

    fn track_keys(&mut self, connection: ConnectionHandle, purpose: KeysPurpose, receiver: DbReceiver<SecurityEntryKeys>) {
        self.pending
            .insert(connection, PendingLookup::Keys { purpose, receiver });
        self.poll_db_replies();
    }

    /// Processes database replies that arrived since the last call.
    pub fn poll_db_replies(&mut self) {
        let connections: Vec<ConnectionHandle> = self.pending.keys().copied().collect();
        for connection in connections {
            let Some(lookup) = self.pending.remove(&connection) else {
                continue;
            };
            match lookup {
                PendingLookup::Keys { purpose, mut receiver } => match receiver.try_take() {
                    ReplyState::Pending => {
                        self.pending
                            .insert(connection, PendingLookup::Keys { purpose, receiver });
                    }
                    ReplyState::Ready(keys) => self.on_keys_retrieved(connection, purpose, keys),
                },
                PendingLookup::SigningKey(mut receiver) => match receiver.try_take() {
                    ReplyState::Pending => {
                        self.pending.insert(connection, PendingLookup::SigningKey(receiver));
                    }
                    ReplyState::Ready(csrk) => self.on_signing_key_retrieved(connection, csrk),
                },
            }
        }

        if let Some(mut receiver) = self.pending_whitelist.take() {
            match receiver.try_take() {
                ReplyState::Pending => self.pending_whitelist = Some(receiver),
                ReplyState::Ready(Some(whitelist)) => self.notify(SecurityEvent::WhitelistFromBondTable(whitelist)),
                ReplyState::Ready(None) => log::warn!("whitelist generation produced nothing"),
            }
        }

        if let Some(mut receiver) = self.pending_identities.take() {
            match receiver.try_take() {
                ReplyState::Pending => self.pending_identities = Some(receiver),
                ReplyState::Ready(identities) => {
                    for identity in identities.unwrap_or_default() {
                        if let Err(err) = self.pal.add_device_to_resolving_list(
                            identity.identity_address_is_public,
                            &identity.identity_address,
                            &identity.irk,
                        ) {
                            log::error!("failed to add {} to the resolving list: {}", identity.identity_address, err);
                        }
                    }
                }
            }
        }
    }

    /// Whether a database lookup is outstanding for the connection.
    pub fn has_pending_request(&self, connection: ConnectionHandle) -> bool {
        self.pending.contains_key(&connection)
    }

    fn on_keys_retrieved(&mut self, connection: ConnectionHandle, purpose: KeysPurpose, keys: Option<SecurityEntryKeys>) {
        let Some(entry) = self.db.get_entry(connection) else {
            return;
        };
        let mitm = entry.ltk_mitm_protected;
        let secure_connections = entry.secure_connections_paired;

        let result = match (purpose, keys) {
            (KeysPurpose::EnableEncryption, Some(keys)) => {
                if secure_connections {
                    self.pal.enable_encryption_sc(connection, &keys.ltk, mitm)
                } else {
                    self.pal
                        .enable_encryption(connection, &keys.ltk, &keys.rand, &keys.ediv, mitm)
                }
            }
            (KeysPurpose::EnableEncryption, None) => {
                log::debug!("no keys for {:#06x}, pairing instead", connection);
                self.start_pairing(connection)
            }
            (KeysPurpose::LtkRequest, Some(keys)) => self.pal.set_ltk(connection, &keys.ltk, mitm, false),
            (KeysPurpose::LtkRequestSc, Some(keys)) => self.pal.set_ltk(connection, &keys.ltk, mitm, true),
            (KeysPurpose::LtkRequest | KeysPurpose::LtkRequestSc, None) => self.pal.set_ltk_not_found(connection),
        };

        if let Err(err) = result {
            log::error!("key lookup follow-up failed on {:#06x}: {}", connection, err);
            if purpose == KeysPurpose::EnableEncryption {
                if let Some(entry) = self.db.get_entry_mut(connection) {
                    entry.encryption_requested = false;
                }
                self.notify(SecurityEvent::LinkEncryptionResult {
                    connection,
                    result: LinkEncryption::NotEncrypted,
                });
            }
        }
    }

    fn on_signing_key_retrieved(&mut self, connection: ConnectionHandle, csrk: Option<Csrk>) {
        let Some(entry) = self.db.get_entry_mut(connection) else {
            return;
        };
        match csrk {
            Some(csrk) => {
                entry.signing_requested = false;
                let authenticated = entry.csrk_mitm_protected;
                self.notify(SecurityEvent::SigningKey {
                    connection,
                    csrk,
                    authenticated,
                });
            }
            None => log::warn!("signing key of {:#06x} missing from the database", connection),
        }
    }

    // ---------------------------------------------------------------------
    // SMP events
    // ---------------------------------------------------------------------

    /// Delivers an event of the SMP layer.
    pub fn on_pal_event(&mut self, event: PalSecurityEvent) {
        match event {
            PalSecurityEvent::PairingRequest {
                connection,
                use_oob: _,
                authentication,
                initiator_dist,
                responder_dist,
            } => self.on_pairing_request(connection, authentication, initiator_dist, responder_dist),
            PalSecurityEvent::PairingError { connection, reason } => {
                self.on_pairing_failed(connection, SecurityCompletionStatus::Failure(reason))
            }
            PalSecurityEvent::PairingTimedOut(connection) => {
                self.on_pairing_failed(connection, SecurityCompletionStatus::Timeout)
            }
            PalSecurityEvent::PairingCompleted(connection) => self.on_pairing_completed(connection),
            PalSecurityEvent::LinkEncryptionResult {
                connection,
                result,
                encryption_key_size,
            } => self.on_link_encryption_result(connection, result, encryption_key_size),
            PalSecurityEvent::LinkEncryptionRequestTimedOut(connection) => {
                if let Some(entry) = self.db.get_entry_mut(connection) {
                    entry.encryption_requested = false;
                }
                self.notify(SecurityEvent::LinkEncryptionResult {
                    connection,
                    result: LinkEncryption::NotEncrypted,
                });
            }
            PalSecurityEvent::PasskeyDisplay { connection, passkey } => {
                self.set_mitm_performed(connection);
                match Passkey::from_num(passkey) {
                    Some(passkey) => self.notify(SecurityEvent::PasskeyDisplay { connection, passkey }),
                    None => log::error!("passkey {} out of range", passkey),
                }
            }
            PalSecurityEvent::PasskeyRequest(connection) => {
                self.set_mitm_performed(connection);
                self.notify(SecurityEvent::PasskeyRequest(connection));
            }
            PalSecurityEvent::ConfirmationRequest(connection) => {
                self.set_mitm_performed(connection);
                self.notify(SecurityEvent::ConfirmationRequest(connection));
            }
            PalSecurityEvent::KeypressNotification { connection, keypress } => {
                self.notify(SecurityEvent::KeypressNotification { connection, keypress })
            }
            PalSecurityEvent::LegacyPairingOobRequest(connection) => {
                self.set_mitm_performed_by_oob(connection);
                self.notify(SecurityEvent::LegacyPairingOobRequest(connection));
            }
            PalSecurityEvent::SecureConnectionsOobRequest(connection) => {
                self.set_mitm_performed_by_oob(connection);
                self.notify(SecurityEvent::OobRequest(connection));
            }
            PalSecurityEvent::LtkRequest { connection, ediv, rand } => {
                self.on_ltk_request(connection, KeysPurpose::LtkRequest, Some((ediv, rand)))
            }
            PalSecurityEvent::SecureConnectionsLtkRequest(connection) => {
                self.on_ltk_request(connection, KeysPurpose::LtkRequestSc, None)
            }
            PalSecurityEvent::SecureConnectionsLtkGenerated { connection, ltk } => {
                let Some(entry) = self.db.get_entry_mut(connection) else {
                    return;
                };
                entry.ltk_mitm_protected = entry.mitm_performed;
                entry.secure_connections_paired = true;
                self.db.set_entry_peer_ltk(connection, &ltk);
                self.db.set_entry_local_ltk(connection, &ltk);
            }
            PalSecurityEvent::KeysDistributed { connection, keys } => {
                let Some(entry) = self.db.get_entry_mut(connection) else {
                    return;
                };
                let mitm = entry.mitm_performed;
                entry.ltk_mitm_protected = mitm;
                if keys.csrk.is_some() {
                    entry.csrk_mitm_protected = mitm;
                    entry.signing_requested = false;
                }
                self.db.set_entry_peer(connection, &keys);
                if let Some(identity) = keys.identity {
                    self.add_to_resolving_list(&identity);
                }
                if let Some(csrk) = keys.csrk {
                    self.notify(SecurityEvent::SigningKey {
                        connection,
                        csrk,
                        authenticated: mitm,
                    });
                }
            }
            PalSecurityEvent::KeysDistributedLtk { connection, ltk } => {
                let Some(entry) = self.db.get_entry_mut(connection) else {
                    return;
                };
                entry.ltk_mitm_protected = entry.mitm_performed;
                self.db.set_entry_peer_ltk(connection, &ltk);
            }
            PalSecurityEvent::KeysDistributedEdivRand { connection, ediv, rand } => {
                self.db.set_entry_peer_ediv_rand(connection, &ediv, &rand)
            }
            PalSecurityEvent::KeysDistributedLocalLtk { connection, ltk } => {
                self.db.set_entry_local_ltk(connection, &ltk)
            }
            PalSecurityEvent::KeysDistributedLocalEdivRand { connection, ediv, rand } => {
                self.db.set_entry_local_ediv_rand(connection, &ediv, &rand)
            }
            PalSecurityEvent::KeysDistributedIrk { connection, irk } => {
                if self.db.get_entry(connection).is_none() {
                    return;
                }
                self.db.set_entry_peer_irk(connection, &irk);
                self.identities.entry(connection).or_default().irk = Some(irk);
                self.complete_identity(connection);
            }
            PalSecurityEvent::KeysDistributedBdaddr {
                connection,
                address_is_public,
                address,
            } => {
                if self.db.get_entry(connection).is_none() {
                    return;
                }
                self.db.set_entry_peer_bdaddr(connection, address_is_public, &address);
                self.identities.entry(connection).or_default().address = Some((address_is_public, address));
                self.complete_identity(connection);
            }
            PalSecurityEvent::KeysDistributedCsrk { connection, csrk } => {
                let Some(entry) = self.db.get_entry_mut(connection) else {
                    return;
                };
                let authenticated = entry.mitm_performed;
                entry.csrk_mitm_protected = authenticated;
                entry.signing_requested = false;
                self.db.set_entry_peer_csrk(connection, &csrk);
                self.notify(SecurityEvent::SigningKey {
                    connection,
                    csrk,
                    authenticated,
                });
            }
            PalSecurityEvent::ValidMicTimeout(connection) => self.notify(SecurityEvent::ValidMicTimeout(connection)),
            PalSecurityEvent::SlaveSecurityRequest {
                connection,
                authentication,
            } => self.on_slave_security_request(connection, authentication),
        }
    }

    fn set_mitm_performed(&mut self, connection: ConnectionHandle) {
        if let Some(entry) = self.db.get_entry_mut(connection) {
            entry.mitm_performed = true;
        }
    }

    fn set_mitm_performed_by_oob(&mut self, connection: ConnectionHandle) {
        if let Some(entry) = self.db.get_entry_mut(connection) {
            if entry.oob_mitm_protection {
                entry.mitm_performed = true;
            }
        }
    }

    fn add_to_resolving_list(&mut self, identity: &SecurityEntryIdentity) {
        if let Err(err) = self.pal.add_device_to_resolving_list(
            identity.identity_address_is_public,
            &identity.identity_address,
            &identity.irk,
        ) {
            log::error!("failed to add {} to the resolving list: {}", identity.identity_address, err);
        }
    }

    fn complete_identity(&mut self, connection: ConnectionHandle) {
        let Some(PartialIdentity {
            irk: Some(irk),
            address: Some((identity_address_is_public, identity_address)),
        }) = self.identities.get(&connection)
        else {
            return;
        };
        let identity = SecurityEntryIdentity {
            identity_address: *identity_address,
            identity_address_is_public: *identity_address_is_public,
            irk: *irk,
        };
        self.identities.remove(&connection);
        self.add_to_resolving_list(&identity);
    }

    fn on_pairing_request(
        &mut self,
        connection: ConnectionHandle,
        authentication: AuthenticationMask,
        initiator_dist: KeyDistribution,
        responder_dist: KeyDistribution,
    ) {
        let Some(entry) = self.db.get_entry_mut(connection) else {
            log::warn!("pairing request on unknown connection {:#06x}", connection);
            return;
        };

        if !self.config.legacy_pairing_allowed && !authentication.contains(AuthenticationMask::SECURE_CONNECTIONS) {
            log::debug!("refusing legacy pairing on {:#06x}", connection);
            if let Err(err) = self
                .pal
                .cancel_pairing(connection, PairingFailure::AuthenticationRequirements)
            {
                log::error!("failed to cancel pairing: {}", err);
            }
            return;
        }

        entry.pairing = PairingState::RequestReceived;
        entry.mitm_performed = false;
        self.requested_distribution
            .insert(connection, (initiator_dist, responder_dist));

        if self.config.pairing_authorisation {
            self.notify(SecurityEvent::PairingRequest(connection));
        } else if let Err(err) = self.accept_pairing_request(connection) {
            log::error!("failed to accept pairing on {:#06x}: {}", connection, err);
        }
    }

    fn on_pairing_failed(&mut self, connection: ConnectionHandle, status: SecurityCompletionStatus) {
        if let Some(entry) = self.db.get_entry_mut(connection) {
            entry.pairing = PairingState::Idle;
            entry.encryption_requested = false;
            entry.signing_requested = false;
            entry.mitm_requested = false;
            entry.mitm_performed = false;
        }
        self.requested_distribution.remove(&connection);
        self.identities.remove(&connection);
        log::debug!("pairing on {:#06x} failed: {:?}", connection, status);
        self.notify(SecurityEvent::PairingResult { connection, status });
    }

    fn on_pairing_completed(&mut self, connection: ConnectionHandle) {
        let Some(entry) = self.db.get_entry_mut(connection) else {
            return;
        };
        entry.pairing = PairingState::Paired;
        if entry.mitm_performed {
            entry.ltk_mitm_protected |= entry.ltk_stored;
            entry.csrk_mitm_protected |= entry.csrk_stored;
        }
        entry.mitm_performed = false;
        entry.mitm_requested = false;

        let bonded = entry.is_bonded();
        let encryption_queued = entry.encryption_requested && !entry.encrypted;
        let signing_queued = entry.signing_requested && entry.csrk_stored;

        self.requested_distribution.remove(&connection);
        self.identities.remove(&connection);
        self.notify(SecurityEvent::PairingResult {
            connection,
            status: SecurityCompletionStatus::Success,
        });

        if self.config.bondable && bonded {
            match self.db.sync() {
                Ok(()) => self.notify(SecurityEvent::SecurityContextStored(connection)),
                Err(err) => log::error!("failed to store keys of {:#06x}: {}", connection, err),
            }
        }
        if encryption_queued {
            if let Err(err) = self.enable_encryption(connection) {
                log::error!("queued encryption on {:#06x} failed: {}", connection, err);
            }
        }
        if signing_queued {
            if let Err(err) = self.lookup_signing_key(connection) {
                log::error!("queued signing key lookup on {:#06x} failed: {}", connection, err);
            }
        }
    }

    fn on_link_encryption_result(&mut self, connection: ConnectionHandle, result: LinkEncryption, key_size: u8) {
        let Some(entry) = self.db.get_entry_mut(connection) else {
            return;
        };
        match result {
            LinkEncryption::Encrypted | LinkEncryption::EncryptedWithMitm | LinkEncryption::EncryptedWithScAndMitm => {
                entry.encryption_requested = false;
                entry.encryption_failed = false;
                entry.encrypted = true;
                entry.encryption_key_size = key_size;
                if result != LinkEncryption::Encrypted {
                    entry.authenticated = true;
                }
            }
            LinkEncryption::NotEncrypted if entry.encryption_requested && !entry.encryption_failed => {
                // the peer may have lost its key, pair again before reporting
                entry.encryption_failed = true;
                let is_master = entry.is_master;
                let retry = if is_master {
                    self.start_pairing(connection)
                } else {
                    self.slave_security_request(connection)
                };
                match retry {
                    Ok(()) => return,
                    Err(err) => log::error!("pairing retry on {:#06x} failed: {}", connection, err),
                }
                if let Some(entry) = self.db.get_entry_mut(connection) {
                    entry.encryption_requested = false;
                    entry.encrypted = false;
                }
            }
            LinkEncryption::NotEncrypted => {
                entry.encryption_requested = false;
                entry.encrypted = false;
                entry.authenticated = false;
                entry.encryption_key_size = 0;
            }
            LinkEncryption::EncryptionInProgress => {}
        }
        self.notify(SecurityEvent::LinkEncryptionResult { connection, result });
    }

    fn on_ltk_request(&mut self, connection: ConnectionHandle, purpose: KeysPurpose, ediv_rand: Option<(Ediv, Rand)>) {
        let refuse = if self.db.get_entry(connection).is_none() {
            log::warn!("LTK request on unknown connection {:#06x}", connection);
            true
        } else if self.pending.contains_key(&connection) {
            log::warn!("LTK request on {:#06x} while a lookup is pending", connection);
            true
        } else {
            false
        };
        if refuse {
            if let Err(err) = self.pal.set_ltk_not_found(connection) {
                log::error!("failed to refuse LTK request: {}", err);
            }
            return;
        }

        let (reply, receiver) = DbReply::channel();
        match ediv_rand {
            Some((ediv, rand)) => self.db.get_entry_local_keys(reply, connection, &ediv, &rand),
            None => self.db.get_entry_local_keys_sc(reply, connection),
        }
        self.track_keys(connection, purpose, receiver);
    }

    fn on_slave_security_request(&mut self, connection: ConnectionHandle, authentication: AuthenticationMask) {
        let local_sc = self.default_authentication.contains(AuthenticationMask::SECURE_CONNECTIONS);
        let Some(entry) = self.db.get_entry_mut(connection) else {
            return;
        };

        let mut pairing_required = !entry.ltk_stored;
        if authentication.contains(AuthenticationMask::SECURE_CONNECTIONS) && !entry.secure_connections_paired && local_sc {
            pairing_required = true;
        }
        if authentication.contains(AuthenticationMask::MITM) && !entry.ltk_mitm_protected {
            pairing_required = true;
            entry.mitm_requested = true;
        }
        let encryption_requested = entry.encryption_requested;

        let result = if pairing_required {
            self.start_pairing(connection)
        } else if !encryption_requested {
            self.mark_encryption_requested(connection);
            self.enable_encryption(connection)
        } else {
            Ok(())
        };
        if let Err(err) = result {
            log::error!("failed to answer security request on {:#06x}: {}", connection, err);
        }
    }
}

impl<P: PalSecurityManager, D: SecurityDb> ConnectionEventMonitor for SecurityManager<P, D> {
    fn on_connected(
        &mut self,
        connection: ConnectionHandle,
        role: Role,
        peer_address_type: AddressType,
        peer_address: &BdAddr,
        local_address_type: AddressType,
        local_address: &BdAddr,
    ) {
        let Some(entry) = self
            .db
            .connect_entry(connection, peer_address_type, peer_address, local_address)
        else {
            log::error!("no security entry available for connection {:#06x}", connection);
            return;
        };
        entry.is_master = role == Role::Central;
        entry.local_address = *local_address;
        entry.local_address_is_public = local_address_type.is_public();
        log::debug!("security entry bound to connection {:#06x}", connection);
    }

    fn on_disconnected(&mut self, connection: ConnectionHandle, reason: DisconnectionReason) {
        if self.pending.remove(&connection).is_some() {
            log::debug!("dropping pending lookup of {:#06x}", connection);
        }
        self.requested_distribution.remove(&connection);
        self.identities.remove(&connection);
        self.db.disconnect_entry(connection);
        log::debug!("connection {:#06x} closed: {:?}", connection, reason);
    }
}
