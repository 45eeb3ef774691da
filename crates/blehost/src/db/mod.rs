//! Security database
//!
//! Stores the security state of connected peers and the keys of bonded
//! peers. Lookups of key material answer through a [`DbReply`] so that a
//! database backed by slow storage can answer later; the in-memory
//! implementation answers before returning.

mod memory;
mod reply;
mod types;


pub use self::memory::{MemorySecurityDb, MAX_ENTRIES};
pub use self::reply::{DbReceiver, DbReply, ReplyState};
pub use self::types::*;

use crate::error::BleResult;
use crate::gap::{AddressType, BdAddr, ConnectionHandle, PeerAddressType, Whitelist};
use crate::smp::{Csrk, Ediv, Irk, Ltk, Rand};

/// Decides whether an address seen on air belongs to a known identity.
///
/// Resolving private addresses requires the AES based `ah` function, which
/// lives with the crypto toolbox outside this crate.
pub trait AddressResolver {
    fn resolves(&self, address: &BdAddr, identity: &SecurityEntryIdentity) -> bool;
}

/// Resolver matching an address against the identity address only.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityAddressMatch;

impl AddressResolver for IdentityAddressMatch {
    fn resolves(&self, address: &BdAddr, identity: &SecurityEntryIdentity) -> bool {
        identity.identity_address == *address
    }
}

/// Non volatile backing of a security database.
pub trait BondStorage {
    /// Reads the stored table, `None` when nothing was stored yet.
    fn load(&mut self) -> BleResult<Option<BondTable>>;

    fn store(&mut self, table: &BondTable) -> BleResult<()>;
}

/// Interface of a security database.
pub trait SecurityDb {
    /// Entry of a live connection.
    fn get_entry(&self, connection: ConnectionHandle) -> Option<&SecurityEntry>;

    fn get_entry_mut(&mut self, connection: ConnectionHandle) -> Option<&mut SecurityEntry>;

    /// Entry of a peer known by its address or by an identity resolving it.
    fn get_entry_by_address(&mut self, address: &BdAddr) -> Option<&mut SecurityEntry>;

    /// Binds a new connection to an entry.
    ///
    /// Returns the existing entry when the handle is already connected, the
    /// bond of the peer when one resolves its address, or a fresh entry.
    /// `None` when every slot belongs to a live connection.
    fn connect_entry(
        &mut self,
        connection: ConnectionHandle,
        peer_address_type: AddressType,
        peer_address: &BdAddr,
        local_address: &BdAddr,
    ) -> Option<&mut SecurityEntry>;

    /// Marks the entry disconnected. Bonded entries are kept.
    fn disconnect_entry(&mut self, connection: ConnectionHandle);

    /// Deletes the bond with the given identity address.
    fn remove_entry(&mut self, identity_address: &BdAddr);

    fn clear_entries(&mut self);

    /// Local LTK of a legacy pairing, answered only if EDIV and RAND match.
    fn get_entry_local_keys(
        &mut self,
        reply: DbReply<SecurityEntryKeys>,
        connection: ConnectionHandle,
        ediv: &Ediv,
        rand: &Rand,
    );

    /// Local LTK of a secure connections pairing.
    fn get_entry_local_keys_sc(&mut self, reply: DbReply<SecurityEntryKeys>, connection: ConnectionHandle);

    fn get_entry_peer_keys(&mut self, reply: DbReply<SecurityEntryKeys>, connection: ConnectionHandle);

    fn get_entry_peer_csrk(&mut self, reply: DbReply<Csrk>, connection: ConnectionHandle);

    /// Identities of every bonded peer which distributed an IRK.
    fn get_identity_list(&mut self, reply: DbReply<Vec<SecurityEntryIdentity>>);

    fn set_entry_local_ltk(&mut self, connection: ConnectionHandle, ltk: &Ltk);

    fn set_entry_local_ediv_rand(&mut self, connection: ConnectionHandle, ediv: &Ediv, rand: &Rand);

    fn set_entry_peer_ltk(&mut self, connection: ConnectionHandle, ltk: &Ltk);

    fn set_entry_peer_ediv_rand(&mut self, connection: ConnectionHandle, ediv: &Ediv, rand: &Rand);

    fn set_entry_peer_irk(&mut self, connection: ConnectionHandle, irk: &Irk);

    fn set_entry_peer_bdaddr(&mut self, connection: ConnectionHandle, address_is_public: bool, address: &BdAddr);

    fn set_entry_peer_csrk(&mut self, connection: ConnectionHandle, csrk: &Csrk);

    /// Records a complete key distribution at once.
    fn set_entry_peer(&mut self, connection: ConnectionHandle, keys: &DistributedKeys);

    fn get_local_csrk(&self) -> Option<Csrk>;

    fn set_local_csrk(&mut self, csrk: &Csrk);

    fn get_whitelist(&mut self, reply: DbReply<Whitelist>);

    /// Builds a whitelist of at most `capacity` bonded peers.
    fn generate_whitelist_from_bond_table(&mut self, reply: DbReply<Whitelist>, capacity: usize);

    fn set_whitelist(&mut self, whitelist: &Whitelist);

    fn add_whitelist_entry(&mut self, address_type: PeerAddressType, address: &BdAddr) -> BleResult<()>;

    fn remove_whitelist_entry(&mut self, address_type: PeerAddressType, address: &BdAddr);

    fn clear_whitelist(&mut self);

    /// Loads bonds from storage, or starts empty when restoring is disabled.
    fn restore(&mut self) -> BleResult<()>;

    /// Writes bonds to storage.
    fn sync(&mut self) -> BleResult<()>;

    /// Selects whether `restore` reloads stored bonds.
    fn set_restore(&mut self, reload: bool);
}
