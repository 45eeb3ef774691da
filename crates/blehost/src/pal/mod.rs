//! Platform abstraction layer
//!
//! Traits implemented by the controller side of the stack, and the events
//! it feeds back into the GAP manager and the Security Manager.

mod gap;
mod security;

#[cfg(test)]
pub(crate) mod mock;

pub use self::gap::*;
pub use self::security::*;

use crate::gap::{AddressType, BdAddr, ConnectionHandle, DisconnectionReason, Role};
use std::cell::RefCell;
use std::rc::Rc;

/// Observer of connection lifecycle, fed by the GAP manager.
pub trait ConnectionEventMonitor {
    fn on_connected(
        &mut self,
        connection: ConnectionHandle,
        role: Role,
        peer_address_type: AddressType,
        peer_address: &BdAddr,
        local_address_type: AddressType,
        local_address: &BdAddr,
    );

    fn on_disconnected(&mut self, connection: ConnectionHandle, reason: DisconnectionReason);
}

impl<T: ConnectionEventMonitor> ConnectionEventMonitor for Rc<RefCell<T>> {
    fn on_connected(
        &mut self,
        connection: ConnectionHandle,
        role: Role,
        peer_address_type: AddressType,
        peer_address: &BdAddr,
        local_address_type: AddressType,
        local_address: &BdAddr,
    ) {
        self.borrow_mut().on_connected(
            connection,
            role,
            peer_address_type,
            peer_address,
            local_address_type,
            local_address,
        );
    }

    fn on_disconnected(&mut self, connection: ConnectionHandle, reason: DisconnectionReason) {
        self.borrow_mut().on_disconnected(connection, reason);
    }
}
