//! Arena of advertising sets
//!
//! Each slot is either free or holds an allocated set with its own state, so
//! a set can only be active while it exists.

use super::constants::MAX_ADVERTISING_SETS;
use super::types::{AdvertisingHandle, AdvertisingParameters};

/// Lifecycle of an allocated advertising set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingState {
    /// Parameters applied, no payload yet
    Created,
    /// Payload or scan response applied
    Configured,
    Active,
    /// Stopped after having been active
    Inactive,
}

/// Periodic advertising of a set, independent from its primary advertising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodicState {
    #[default]
    Disabled,
    Configured,
    Active,
}

/// API family used to drive a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AdvertisingApi {
    Legacy,
    Extended,
}

#[derive(Debug, Clone)]
pub(crate) struct AdvertisingSet {
    pub(crate) parameters: AdvertisingParameters,
    pub(crate) state: AdvertisingState,
    pub(crate) periodic: PeriodicState,
    api: Option<AdvertisingApi>,
    mixed_api_warned: bool,
}

impl AdvertisingSet {
    fn new(parameters: AdvertisingParameters) -> Self {
        Self {
            parameters,
            state: AdvertisingState::Created,
            periodic: PeriodicState::Disabled,
            api: None,
            mixed_api_warned: false,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state == AdvertisingState::Active
    }

    /// Payload applied: a created set becomes configured.
    pub(crate) fn mark_configured(&mut self) {
        if self.state == AdvertisingState::Created {
            self.state = AdvertisingState::Configured;
        }
    }

    /// Records the API family driving the set. Returns true the first time
    /// a second family shows up.
    pub(crate) fn note_api(&mut self, api: AdvertisingApi) -> bool {
        match self.api {
            None => {
                self.api = Some(api);
                false
            }
            Some(first) if first != api && !self.mixed_api_warned => {
                self.mixed_api_warned = true;
                true
            }
            Some(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
enum AdvertisingSlot {
    Free,
    Allocated(AdvertisingSet),
}

/// Fixed pool of `MAX_ADVERTISING_SETS` slots, of which the first
/// `capacity` can be allocated.
#[derive(Debug)]
pub(crate) struct AdvertisingSets {
    slots: [AdvertisingSlot; MAX_ADVERTISING_SETS],
    capacity: usize,
}

impl AdvertisingSets {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: std::array::from_fn(|_| AdvertisingSlot::Free),
            capacity: capacity.min(MAX_ADVERTISING_SETS),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Allocates the lowest free slot.
    pub(crate) fn allocate(&mut self, parameters: AdvertisingParameters) -> Option<AdvertisingHandle> {
        let index = self.slots[..self.capacity]
            .iter()
            .position(|slot| matches!(slot, AdvertisingSlot::Free))?;
        self.slots[index] = AdvertisingSlot::Allocated(AdvertisingSet::new(parameters));
        Some(index as AdvertisingHandle)
    }

    /// Allocates a specific slot, failing when it is taken or out of range.
    pub(crate) fn allocate_at(&mut self, handle: AdvertisingHandle, parameters: AdvertisingParameters) -> bool {
        match self.slots[..self.capacity].get_mut(handle as usize) {
            Some(slot @ AdvertisingSlot::Free) => {
                *slot = AdvertisingSlot::Allocated(AdvertisingSet::new(parameters));
                true
            }
            _ => false,
        }
    }

    pub(crate) fn release(&mut self, handle: AdvertisingHandle) {
        if let Some(slot) = self.slots.get_mut(handle as usize) {
            *slot = AdvertisingSlot::Free;
        }
    }

    pub(crate) fn get(&self, handle: AdvertisingHandle) -> Option<&AdvertisingSet> {
        match self.slots.get(handle as usize) {
            Some(AdvertisingSlot::Allocated(set)) => Some(set),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, handle: AdvertisingHandle) -> Option<&mut AdvertisingSet> {
        match self.slots.get_mut(handle as usize) {
            Some(AdvertisingSlot::Allocated(set)) => Some(set),
            _ => None,
        }
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (AdvertisingHandle, &mut AdvertisingSet)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                AdvertisingSlot::Allocated(set) => Some((index as AdvertisingHandle, set)),
                AdvertisingSlot::Free => None,
            })
    }

    pub(crate) fn any_active(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| matches!(slot, AdvertisingSlot::Allocated(set) if set.is_active()))
    }
}
