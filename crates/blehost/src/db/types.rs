//! Records kept by the security database.

use crate::gap::{BdAddr, ConnectionHandle};
use crate::smp::{Csrk, Ediv, Irk, Ltk, PairingState, Rand};

/// Security state of one peer.
///
/// Bonding flags describe the keys held for the peer and survive
/// disconnection. Every other flag describes the current connection and is
/// cleared by [`SecurityEntry::reset`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SecurityEntry {
    pub handle: ConnectionHandle,
    pub peer_address: BdAddr,
    pub peer_address_is_public: bool,
    pub local_address: BdAddr,
    pub local_address_is_public: bool,
    pub encryption_key_size: u8,

    // bonding
    /// Peer LTK, the one used when this device starts encryption
    pub ltk_stored: bool,
    pub ltk_mitm_protected: bool,
    /// LTK this device distributed, answered when the peer starts encryption
    pub local_ltk_stored: bool,
    pub csrk_stored: bool,
    pub csrk_mitm_protected: bool,
    pub irk_stored: bool,
    pub secure_connections_paired: bool,

    // connection
    pub connected: bool,
    /// Encryption with an authenticated key was turned on during this connection
    pub authenticated: bool,
    pub is_master: bool,
    pub encryption_requested: bool,
    pub encryption_failed: bool,
    pub encrypted: bool,
    pub signing_requested: bool,
    pub mitm_requested: bool,
    /// MITM protection was achieved by the pairing in progress
    pub mitm_performed: bool,
    pub attempt_oob: bool,
    pub oob_mitm_protection: bool,
    pub oob_present: bool,
    pub pairing: PairingState,
}

impl SecurityEntry {
    /// Fresh entry for a newly connected peer.
    pub fn new(handle: ConnectionHandle, peer_address: BdAddr, peer_address_is_public: bool) -> Self {
        Self {
            handle,
            peer_address,
            peer_address_is_public,
            connected: true,
            ..Default::default()
        }
    }

    /// Clears the per-connection state, keeping keys information.
    pub fn reset(&mut self) {
        self.connected = false;
        self.authenticated = false;
        self.is_master = false;
        self.encryption_requested = false;
        self.encryption_failed = false;
        self.encrypted = false;
        self.signing_requested = false;
        self.mitm_requested = false;
        self.mitm_performed = false;
        self.attempt_oob = false;
        self.oob_mitm_protection = false;
        self.oob_present = false;
        self.encryption_key_size = 0;
        self.pairing = PairingState::Idle;
    }

    /// Keys worth keeping beyond the connection are present.
    pub fn is_bonded(&self) -> bool {
        self.ltk_stored || self.local_ltk_stored || self.csrk_stored || self.irk_stored
    }
}

/// Long term key with the EDIV and RAND identifying it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SecurityEntryKeys {
    pub ltk: Ltk,
    pub ediv: Ediv,
    pub rand: Rand,
}

/// Identity of a peer: its identity address and resolving key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SecurityEntryIdentity {
    pub identity_address: BdAddr,
    pub identity_address_is_public: bool,
    pub irk: Irk,
}

/// Everything a peer hands out during key distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributedKeys {
    pub keys: SecurityEntryKeys,
    pub identity: Option<SecurityEntryIdentity>,
    pub csrk: Option<Csrk>,
}

/// One slot of the bond table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BondRecord {
    pub entry: SecurityEntry,
    pub local_keys: Option<SecurityEntryKeys>,
    pub peer_keys: Option<SecurityEntryKeys>,
    pub identity: Option<SecurityEntryIdentity>,
    pub peer_csrk: Option<Csrk>,
}

impl BondRecord {
    pub(crate) fn connected(entry: SecurityEntry) -> Self {
        Self {
            entry,
            ..Default::default()
        }
    }

    /// Snapshot suitable for persistent storage.
    pub(crate) fn persisted(&self) -> Self {
        let mut record = self.clone();
        record.entry.reset();
        record.entry.handle = 0;
        record
    }
}

/// Persisted content of the database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BondTable {
    pub records: Vec<BondRecord>,
    pub local_csrk: Option<Csrk>,
}
