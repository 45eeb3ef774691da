//! Security database held in memory, optionally mirrored to a [`BondStorage`].

use super::reply::DbReply;
use super::types::*;
use super::{AddressResolver, BondStorage, IdentityAddressMatch, SecurityDb};
use crate::error::BleResult;
use crate::gap::{AddressType, BdAddr, ConnectionHandle, PeerAddressType, Whitelist};
use crate::smp::{Csrk, Ediv, Irk, Ltk, Rand};

/// Number of peers the database tracks at once, connected or bonded.
pub const MAX_ENTRIES: usize = 5;

fn record_resolves(resolver: &dyn AddressResolver, record: &BondRecord, address: &BdAddr) -> bool {
    record.entry.peer_address == *address
        || record
            .identity
            .as_ref()
            .is_some_and(|identity| resolver.resolves(address, identity))
}

/// Fixed pool of [`MAX_ENTRIES`] bond records.
pub struct MemorySecurityDb {
    slots: Vec<Option<BondRecord>>,
    local_csrk: Option<Csrk>,
    whitelist: Whitelist,
    resolver: Box<dyn AddressResolver>,
    storage: Option<Box<dyn BondStorage>>,
    restore: bool,
}

impl Default for MemorySecurityDb {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySecurityDb {
    /// Database without persistent backing.
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_ENTRIES],
            local_csrk: None,
            whitelist: Whitelist::new(MAX_ENTRIES),
            resolver: Box::new(IdentityAddressMatch),
            storage: None,
            restore: true,
        }
    }

    /// Database mirrored to `storage` by `restore` and `sync`.
    pub fn with_storage(storage: Box<dyn BondStorage>) -> Self {
        Self {
            storage: Some(storage),
            ..Self::new()
        }
    }

    /// Replaces the hook used to match addresses against bonded identities.
    pub fn set_address_resolver(&mut self, resolver: Box<dyn AddressResolver>) {
        self.resolver = resolver;
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn connected_index(&self, connection: ConnectionHandle) -> Option<usize> {
        self.slots.iter().position(|slot| {
            matches!(slot, Some(record) if record.entry.connected && record.entry.handle == connection)
        })
    }

    fn record(&self, connection: ConnectionHandle) -> Option<&BondRecord> {
        self.connected_index(connection)
            .and_then(|index| self.slots[index].as_ref())
    }

    fn record_mut(&mut self, connection: ConnectionHandle) -> Option<&mut BondRecord> {
        let index = self.connected_index(connection)?;
        self.slots[index].as_mut()
    }

    /// Removes disconnected records other than `keep` holding the same identity.
    fn drop_stale_identities(&mut self, keep: usize, identity_address: &BdAddr) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let stale = index != keep
                && matches!(slot, Some(record) if !record.entry.connected
                    && record.identity.is_some_and(|id| id.identity_address == *identity_address));
            if stale {
                log::debug!("dropping stale bond of {}", identity_address);
                *slot = None;
            }
        }
    }

    fn set_identity_address(&mut self, connection: ConnectionHandle, address_is_public: bool, address: &BdAddr) {
        let Some(index) = self.connected_index(connection) else {
            return;
        };
        if let Some(record) = self.slots[index].as_mut() {
            let identity = record.identity.get_or_insert_with(Default::default);
            identity.identity_address = *address;
            identity.identity_address_is_public = address_is_public;
        }
        self.drop_stale_identities(index, address);
    }

    fn clear_bond(record: &mut BondRecord) {
        record.local_keys = None;
        record.peer_keys = None;
        record.identity = None;
        record.peer_csrk = None;
        record.entry.ltk_stored = false;
        record.entry.ltk_mitm_protected = false;
        record.entry.local_ltk_stored = false;
        record.entry.csrk_stored = false;
        record.entry.csrk_mitm_protected = false;
        record.entry.irk_stored = false;
        record.entry.secure_connections_paired = false;
    }
}

impl SecurityDb for MemorySecurityDb {
    fn get_entry(&self, connection: ConnectionHandle) -> Option<&SecurityEntry> {
        self.record(connection).map(|record| &record.entry)
    }

    fn get_entry_mut(&mut self, connection: ConnectionHandle) -> Option<&mut SecurityEntry> {
        self.record_mut(connection).map(|record| &mut record.entry)
    }

    fn get_entry_by_address(&mut self, address: &BdAddr) -> Option<&mut SecurityEntry> {
        let resolver = self.resolver.as_ref();
        self.slots
            .iter_mut()
            .flatten()
            .find(|record| record_resolves(resolver, record, address))
            .map(|record| &mut record.entry)
    }

    fn connect_entry(
        &mut self,
        connection: ConnectionHandle,
        peer_address_type: AddressType,
        peer_address: &BdAddr,
        local_address: &BdAddr,
    ) -> Option<&mut SecurityEntry> {
        if let Some(index) = self.connected_index(connection) {
            return self.slots[index].as_mut().map(|record| &mut record.entry);
        }

        let is_public = peer_address_type.is_public();
        let resolver = self.resolver.as_ref();
        let bonded = self.slots.iter().position(|slot| {
            matches!(slot, Some(record) if !record.entry.connected
                && record.entry.is_bonded()
                && record_resolves(resolver, record, peer_address))
        });

        if let Some(index) = bonded {
            let record = self.slots[index].as_mut()?;
            log::debug!("connection {:#06x} resumes bond of {}", connection, peer_address);
            record.entry.reset();
            record.entry.handle = connection;
            record.entry.connected = true;
            record.entry.peer_address = *peer_address;
            record.entry.peer_address_is_public = is_public;
            record.entry.local_address = *local_address;
            return Some(&mut record.entry);
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .or_else(|| {
                self.slots
                    .iter()
                    .position(|slot| matches!(slot, Some(record) if !record.entry.connected))
            });
        let Some(index) = index else {
            log::warn!("no security entry left for connection {:#06x}", connection);
            return None;
        };

        let mut entry = SecurityEntry::new(connection, *peer_address, is_public);
        entry.local_address = *local_address;
        self.slots[index] = Some(BondRecord::connected(entry));
        self.slots[index].as_mut().map(|record| &mut record.entry)
    }

    fn disconnect_entry(&mut self, connection: ConnectionHandle) {
        let Some(index) = self.connected_index(connection) else {
            return;
        };
        let slot = &mut self.slots[index];
        match slot {
            Some(record) if record.entry.is_bonded() => record.entry.reset(),
            _ => *slot = None,
        }
    }

    fn remove_entry(&mut self, identity_address: &BdAddr) {
        for slot in self.slots.iter_mut() {
            let Some(record) = slot else {
                continue;
            };
            let matches = match &record.identity {
                Some(identity) => identity.identity_address == *identity_address,
                None => record.entry.peer_address == *identity_address,
            };
            if !matches {
                continue;
            }
            if record.entry.connected {
                Self::clear_bond(record);
            } else {
                *slot = None;
            }
        }
    }

    fn clear_entries(&mut self) {
        for slot in self.slots.iter_mut() {
            match slot {
                Some(record) if record.entry.connected => Self::clear_bond(record),
                _ => *slot = None,
            }
        }
        self.local_csrk = None;
    }

    fn get_entry_local_keys(
        &mut self,
        reply: DbReply<SecurityEntryKeys>,
        connection: ConnectionHandle,
        ediv: &Ediv,
        rand: &Rand,
    ) {
        let keys = self
            .record(connection)
            .filter(|record| record.entry.local_ltk_stored)
            .and_then(|record| record.local_keys)
            .filter(|keys| keys.ediv == *ediv && keys.rand == *rand);
        reply.send(keys);
    }

    fn get_entry_local_keys_sc(&mut self, reply: DbReply<SecurityEntryKeys>, connection: ConnectionHandle) {
        let keys = self
            .record(connection)
            .filter(|record| record.entry.local_ltk_stored)
            .and_then(|record| record.local_keys);
        reply.send(keys);
    }

    fn get_entry_peer_keys(&mut self, reply: DbReply<SecurityEntryKeys>, connection: ConnectionHandle) {
        let keys = self
            .record(connection)
            .filter(|record| record.entry.ltk_stored)
            .and_then(|record| record.peer_keys);
        reply.send(keys);
    }

    fn get_entry_peer_csrk(&mut self, reply: DbReply<Csrk>, connection: ConnectionHandle) {
        let csrk = self
            .record(connection)
            .filter(|record| record.entry.csrk_stored)
            .and_then(|record| record.peer_csrk);
        reply.send(csrk);
    }

    fn get_identity_list(&mut self, reply: DbReply<Vec<SecurityEntryIdentity>>) {
        let identities = self
            .slots
            .iter()
            .flatten()
            .filter(|record| record.entry.irk_stored)
            .filter_map(|record| record.identity)
            .collect();
        reply.send(Some(identities));
    }

    fn set_entry_local_ltk(&mut self, connection: ConnectionHandle, ltk: &Ltk) {
        if let Some(record) = self.record_mut(connection) {
            record.local_keys.get_or_insert_with(Default::default).ltk = *ltk;
            record.entry.local_ltk_stored = true;
        }
    }

    fn set_entry_local_ediv_rand(&mut self, connection: ConnectionHandle, ediv: &Ediv, rand: &Rand) {
        if let Some(record) = self.record_mut(connection) {
            let keys = record.local_keys.get_or_insert_with(Default::default);
            keys.ediv = *ediv;
            keys.rand = *rand;
        }
    }

    fn set_entry_peer_ltk(&mut self, connection: ConnectionHandle, ltk: &Ltk) {
        if let Some(record) = self.record_mut(connection) {
            record.peer_keys.get_or_insert_with(Default::default).ltk = *ltk;
            record.entry.ltk_stored = true;
        }
    }

    fn set_entry_peer_ediv_rand(&mut self, connection: ConnectionHandle, ediv: &Ediv, rand: &Rand) {
        if let Some(record) = self.record_mut(connection) {
            let keys = record.peer_keys.get_or_insert_with(Default::default);
            keys.ediv = *ediv;
            keys.rand = *rand;
        }
    }

    fn set_entry_peer_irk(&mut self, connection: ConnectionHandle, irk: &Irk) {
        if let Some(record) = self.record_mut(connection) {
            record.identity.get_or_insert_with(Default::default).irk = *irk;
            record.entry.irk_stored = true;
        }
    }

    fn set_entry_peer_bdaddr(&mut self, connection: ConnectionHandle, address_is_public: bool, address: &BdAddr) {
        self.set_identity_address(connection, address_is_public, address);
    }

    fn set_entry_peer_csrk(&mut self, connection: ConnectionHandle, csrk: &Csrk) {
        if let Some(record) = self.record_mut(connection) {
            record.peer_csrk = Some(*csrk);
            record.entry.csrk_stored = true;
        }
    }

    fn set_entry_peer(&mut self, connection: ConnectionHandle, keys: &DistributedKeys) {
        let Some(record) = self.record_mut(connection) else {
            return;
        };
        record.peer_keys = Some(keys.keys);
        record.entry.ltk_stored = true;
        if let Some(csrk) = keys.csrk {
            record.peer_csrk = Some(csrk);
            record.entry.csrk_stored = true;
        }
        if let Some(identity) = keys.identity {
            record.identity.get_or_insert_with(Default::default).irk = identity.irk;
            record.entry.irk_stored = true;
            self.set_identity_address(
                connection,
                identity.identity_address_is_public,
                &identity.identity_address,
            );
        }
    }

    fn get_local_csrk(&self) -> Option<Csrk> {
        self.local_csrk
    }

    fn set_local_csrk(&mut self, csrk: &Csrk) {
        self.local_csrk = Some(*csrk);
    }

    fn get_whitelist(&mut self, reply: DbReply<Whitelist>) {
        reply.send(Some(self.whitelist.clone()));
    }

    fn generate_whitelist_from_bond_table(&mut self, reply: DbReply<Whitelist>, capacity: usize) {
        let mut whitelist = Whitelist::new(capacity);
        for record in self.slots.iter().flatten().filter(|record| record.entry.is_bonded()) {
            let (address_type, address) = match &record.identity {
                Some(identity) if !identity.identity_address.is_zero() => (
                    if identity.identity_address_is_public {
                        PeerAddressType::Public
                    } else {
                        PeerAddressType::Random
                    },
                    identity.identity_address,
                ),
                _ if record.entry.peer_address_is_public => {
                    (PeerAddressType::Public, record.entry.peer_address)
                }
                _ if record.entry.peer_address.is_static_random() => {
                    (PeerAddressType::Random, record.entry.peer_address)
                }
                // private address without identity cannot be filtered on
                _ => continue,
            };
            if whitelist.add(address_type, address).is_err() {
                break;
            }
        }
        reply.send(Some(whitelist));
    }

    fn set_whitelist(&mut self, whitelist: &Whitelist) {
        self.whitelist = whitelist.clone();
    }

    fn add_whitelist_entry(&mut self, address_type: PeerAddressType, address: &BdAddr) -> BleResult<()> {
        self.whitelist.add(address_type, *address)
    }

    fn remove_whitelist_entry(&mut self, address_type: PeerAddressType, address: &BdAddr) {
        self.whitelist.remove(address_type, address);
    }

    fn clear_whitelist(&mut self) {
        self.whitelist.clear();
    }

    fn restore(&mut self) -> BleResult<()> {
        if !self.restore {
            log::debug!("bond restore disabled, starting with an empty table");
            for slot in self.slots.iter_mut() {
                if !matches!(slot, Some(record) if record.entry.connected) {
                    *slot = None;
                }
            }
            self.local_csrk = None;
            return Ok(());
        }

        let Some(storage) = self.storage.as_mut() else {
            return Ok(());
        };
        let Some(table) = storage.load()? else {
            return Ok(());
        };

        let live: Vec<BdAddr> = self
            .slots
            .iter()
            .flatten()
            .filter(|record| record.entry.connected)
            .filter_map(|record| record.identity.map(|identity| identity.identity_address))
            .collect();
        let mut loaded = table.records.into_iter().filter(|record| {
            let duplicate = record
                .identity
                .is_some_and(|identity| live.contains(&identity.identity_address));
            if duplicate {
                log::debug!("stored bond of {} superseded by a live connection", record.entry.peer_address);
            }
            !duplicate
        });
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some(record) if record.entry.connected) {
                continue;
            }
            *slot = loaded.next().map(|mut record| {
                record.entry.reset();
                record
            });
        }
        let dropped = loaded.count();
        if dropped > 0 {
            log::warn!("{} stored bonds dropped, no free security entry", dropped);
        }
        self.local_csrk = table.local_csrk;
        log::debug!("restored {} bonds", self.len());
        Ok(())
    }

    fn sync(&mut self) -> BleResult<()> {
        let Some(storage) = self.storage.as_mut() else {
            return Ok(());
        };
        let table = BondTable {
            records: self
                .slots
                .iter()
                .flatten()
                .filter(|record| record.entry.is_bonded())
                .map(BondRecord::persisted)
                .collect(),
            local_csrk: self.local_csrk,
        };
        storage.store(&table)
    }

    fn set_restore(&mut self, reload: bool) {
        self.restore = reload;
    }
}
