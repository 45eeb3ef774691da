//! Security Manager side of the platform abstraction layer

use crate::db::DistributedKeys;
use crate::error::BleResult;
use crate::gap::{BdAddr, ConnectionHandle};
use crate::smp::{
    AuthenticationMask, Csrk, Ediv, IoCapability, Irk, KeyDistribution, Keypress,
    LinkEncryption, Ltk, OobConfirm, OobRand, OobTk, PairingFailure, Rand,
};

/// Events reported by the SMP layer to the Security Manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PalSecurityEvent {
    PairingRequest {
        connection: ConnectionHandle,
        use_oob: bool,
        authentication: AuthenticationMask,
        initiator_dist: KeyDistribution,
        responder_dist: KeyDistribution,
    },
    PairingError {
        connection: ConnectionHandle,
        reason: PairingFailure,
    },
    PairingTimedOut(ConnectionHandle),
    PairingCompleted(ConnectionHandle),
    LinkEncryptionResult {
        connection: ConnectionHandle,
        result: LinkEncryption,
        /// Negotiated key size in bytes, 0 when the link is not encrypted
        encryption_key_size: u8,
    },
    LinkEncryptionRequestTimedOut(ConnectionHandle),
    PasskeyDisplay {
        connection: ConnectionHandle,
        passkey: u32,
    },
    PasskeyRequest(ConnectionHandle),
    ConfirmationRequest(ConnectionHandle),
    KeypressNotification {
        connection: ConnectionHandle,
        keypress: Keypress,
    },
    LegacyPairingOobRequest(ConnectionHandle),
    SecureConnectionsOobRequest(ConnectionHandle),
    /// Peer asks for the LTK of a legacy pairing
    LtkRequest {
        connection: ConnectionHandle,
        ediv: Ediv,
        rand: Rand,
    },
    /// Peer asks for the LTK of a secure connections pairing
    SecureConnectionsLtkRequest(ConnectionHandle),
    SecureConnectionsLtkGenerated {
        connection: ConnectionHandle,
        ltk: Ltk,
    },
    KeysDistributed {
        connection: ConnectionHandle,
        keys: DistributedKeys,
    },
    KeysDistributedLtk {
        connection: ConnectionHandle,
        ltk: Ltk,
    },
    KeysDistributedEdivRand {
        connection: ConnectionHandle,
        ediv: Ediv,
        rand: Rand,
    },
    KeysDistributedLocalLtk {
        connection: ConnectionHandle,
        ltk: Ltk,
    },
    KeysDistributedLocalEdivRand {
        connection: ConnectionHandle,
        ediv: Ediv,
        rand: Rand,
    },
    KeysDistributedIrk {
        connection: ConnectionHandle,
        irk: Irk,
    },
    KeysDistributedBdaddr {
        connection: ConnectionHandle,
        address_is_public: bool,
        address: BdAddr,
    },
    KeysDistributedCsrk {
        connection: ConnectionHandle,
        csrk: Csrk,
    },
    ValidMicTimeout(ConnectionHandle),
    SlaveSecurityRequest {
        connection: ConnectionHandle,
        authentication: AuthenticationMask,
    },
}

/// SMP commands used by the Security Manager.
pub trait PalSecurityManager {
    fn initialize(&mut self) -> BleResult<()>;

    fn get_secure_connections_support(&self) -> bool;

    fn set_io_capability(&mut self, io_capability: IoCapability) -> BleResult<()>;

    /// A passkey of 0 lets the controller generate a random one.
    fn set_display_passkey(&mut self, passkey: u32) -> BleResult<()>;

    /// Timeout in 10 ms units.
    fn set_authentication_timeout(&mut self, connection: ConnectionHandle, timeout: u16) -> BleResult<()>;

    fn get_authentication_timeout(&self, connection: ConnectionHandle) -> BleResult<u16>;

    fn set_encryption_key_requirements(&mut self, min_size: u8, max_size: u8) -> BleResult<()>;

    fn set_private_address_timeout(&mut self, timeout_in_seconds: u16) -> BleResult<()>;

    fn send_pairing_request(
        &mut self,
        connection: ConnectionHandle,
        oob_data_flag: bool,
        authentication: AuthenticationMask,
        initiator_dist: KeyDistribution,
        responder_dist: KeyDistribution,
    ) -> BleResult<()>;

    fn send_pairing_response(
        &mut self,
        connection: ConnectionHandle,
        oob_data_flag: bool,
        authentication: AuthenticationMask,
        initiator_dist: KeyDistribution,
        responder_dist: KeyDistribution,
    ) -> BleResult<()>;

    fn cancel_pairing(&mut self, connection: ConnectionHandle, reason: PairingFailure) -> BleResult<()>;

    fn slave_security_request(&mut self, connection: ConnectionHandle, authentication: AuthenticationMask) -> BleResult<()>;

    /// Starts encryption with a key from a legacy pairing.
    fn enable_encryption(
        &mut self,
        connection: ConnectionHandle,
        ltk: &Ltk,
        rand: &Rand,
        ediv: &Ediv,
        mitm: bool,
    ) -> BleResult<()>;

    /// Starts encryption with a key from a secure connections pairing.
    fn enable_encryption_sc(&mut self, connection: ConnectionHandle, ltk: &Ltk, mitm: bool) -> BleResult<()>;

    fn disable_encryption(&mut self, connection: ConnectionHandle) -> BleResult<()>;

    fn set_ltk(
        &mut self,
        connection: ConnectionHandle,
        ltk: &Ltk,
        mitm: bool,
        secure_connections: bool,
    ) -> BleResult<()>;

    fn set_ltk_not_found(&mut self, connection: ConnectionHandle) -> BleResult<()>;

    fn set_csrk(&mut self, csrk: &Csrk) -> BleResult<()>;

    fn passkey_request_reply(&mut self, connection: ConnectionHandle, passkey: u32) -> BleResult<()>;

    fn confirmation_entered(&mut self, connection: ConnectionHandle, confirmation: bool) -> BleResult<()>;

    fn send_keypress_notification(&mut self, connection: ConnectionHandle, keypress: Keypress) -> BleResult<()>;

    fn legacy_pairing_oob_request_reply(&mut self, connection: ConnectionHandle, tk: &OobTk) -> BleResult<()>;

    fn secure_connections_oob_request_reply(
        &mut self,
        connection: ConnectionHandle,
        peer_random: &OobRand,
        peer_confirm: &OobConfirm,
    ) -> BleResult<()>;

    fn clear_resolving_list(&mut self) -> BleResult<()>;

    fn add_device_to_resolving_list(
        &mut self,
        identity_address_is_public: bool,
        identity_address: &BdAddr,
        irk: &Irk,
    ) -> BleResult<()>;
}
