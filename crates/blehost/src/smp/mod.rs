//! Security Manager
//!
//! This module implements the host side of LE security:
//! - Pairing and bonding with peers
//! - Raising the encryption of links, reusing stored keys when possible
//! - Delivering signing keys and out of band data
//!
//! Cryptography and the SMP wire protocol are handled below the
//! [`PalSecurityManager`](crate::pal::PalSecurityManager) boundary.

mod constants;
mod keys;
mod manager;
mod types;

#[cfg(test)]
mod tests;

pub use self::constants::*;
pub use self::keys::*;
pub use self::manager::{SecurityEventCallback, SecurityManager};
pub use self::types::*;
