//! Address privacy policy

use super::types::{AddressType, BdAddr, OwnAddressType};
use rand::RngCore;

/// What to do when a peer connects with an address the controller could not
/// resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PeripheralResolutionStrategy {
    /// Accept the connection as is
    DoNotResolve,
    /// Disconnect the peer
    RejectNonResolvedAddress,
    /// Accept and let the application pair with the peer
    #[default]
    PerformPairingProcedure,
    /// Accept and let the application authenticate the peer
    PerformAuthenticationProcedure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralPrivacyConfiguration {
    pub use_non_resolvable_random_address: bool,
    pub resolution_strategy: PeripheralResolutionStrategy,
}

/// Treatment of advertising reports from unresolved private addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CentralResolutionStrategy {
    /// Disable address resolution in the controller
    DoNotResolve,
    /// Resolve what can be resolved and forward everything
    #[default]
    ResolveAndForward,
    /// Drop reports from addresses that could not be resolved
    ResolveAndFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CentralPrivacyConfiguration {
    pub use_non_resolvable_random_address: bool,
    pub resolution_strategy: CentralResolutionStrategy,
}

/// Purpose of the local address in a controller command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressUseType {
    CentralScan,
    CentralConnection,
    PeripheralConnectable,
    PeripheralNonConnectable,
}

/// Picks the own address type for a command.
///
/// Without privacy the configured local address is used. With privacy a
/// resolvable private address is used, falling back on the configured
/// address, unless the configuration asks for non resolvable addresses on
/// non-connectable procedures.
pub fn own_address_type(
    privacy_enabled: bool,
    local_address_type: AddressType,
    central: &CentralPrivacyConfiguration,
    peripheral: &PeripheralPrivacyConfiguration,
    use_type: AddressUseType,
) -> OwnAddressType {
    let public = local_address_type.is_public();
    if !privacy_enabled {
        return if public {
            OwnAddressType::Public
        } else {
            OwnAddressType::Random
        };
    }

    let non_resolvable = match use_type {
        AddressUseType::CentralScan => central.use_non_resolvable_random_address,
        AddressUseType::PeripheralNonConnectable => peripheral.use_non_resolvable_random_address,
        AddressUseType::CentralConnection | AddressUseType::PeripheralConnectable => false,
    };
    if non_resolvable {
        OwnAddressType::Random
    } else if public {
        OwnAddressType::ResolvablePrivatePublicFallback
    } else {
        OwnAddressType::ResolvablePrivateRandomFallback
    }
}

/// Generates a non resolvable private address: two most significant bits
/// cleared, remaining bits neither all zeros nor all ones.
pub fn generate_non_resolvable_address() -> BdAddr {
    let mut rng = rand::thread_rng();
    loop {
        let mut bytes = [0u8; 6];
        rng.fill_bytes(&mut bytes);
        bytes[5] &= 0x3F;
        let all_zeros = bytes[..5].iter().all(|b| *b == 0x00) && bytes[5] == 0x00;
        let all_ones = bytes[..5].iter().all(|b| *b == 0xFF) && bytes[5] == 0x3F;
        if !all_zeros && !all_ones {
            return BdAddr::new(bytes);
        }
    }
}
