//! Generic Access Profile
//!
//! Advertising sets, scanning, periodic advertising sync, connection
//! establishment and address privacy.

pub mod advertising;
pub mod constants;
pub mod events;
pub mod manager;
pub mod privacy;
pub mod scan;
pub mod timer;
pub mod types;


pub use advertising::{AdvertisingState, PeriodicState};
pub use constants::*;
pub use events::*;
pub use manager::{GapEventCallback, GapManager};
pub use privacy::{
    AddressUseType, CentralPrivacyConfiguration, CentralResolutionStrategy, PeripheralPrivacyConfiguration,
    PeripheralResolutionStrategy,
};
pub use scan::{ad_structure, parse_advertising_data, AdvertisingReport};
pub use timer::{TimerId, Timers, VirtualTimers};
pub use types::*;
