//! blehost - the host side of Bluetooth Low Energy
//!
//! This library implements the Generic Access Profile manager, the Security
//! Manager and the security database of a BLE host stack. Controller access
//! goes through the platform abstraction layer in [`pal`], so the same state
//! machines drive a real controller or a test double.
//!
//! Everything is single threaded: managers take `&mut self` and report
//! asynchronous outcomes through event callbacks.

pub mod db;
pub mod error;
pub mod gap;
pub mod pal;
pub mod smp;

// Re-export common types for convenience
pub use db::{MemorySecurityDb, SecurityDb};
pub use error::{BleError, BleResult};
pub use gap::{AddressType, BdAddr, GapEvent, GapManager, VirtualTimers};
pub use pal::{ConnectionEventMonitor, PalGap, PalGapEvent, PalSecurityEvent, PalSecurityManager};
pub use smp::{SecurityConfig, SecurityEvent, SecurityManager};
