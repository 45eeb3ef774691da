//! Advertising reports delivered while scanning
//!
//! Reports carry the raw advertising payload; the helpers here split it into
//! AD structures.

use super::constants::*;
use super::types::{AddressType, BdAddr, Phy};

// Event type bits of an extended advertising report
pub const REPORT_CONNECTABLE: u16 = 0x0001;
pub const REPORT_SCANNABLE: u16 = 0x0002;
pub const REPORT_DIRECTED: u16 = 0x0004;
pub const REPORT_SCAN_RESPONSE: u16 = 0x0008;
pub const REPORT_LEGACY: u16 = 0x0010;

/// An advertising or scan response packet seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingReport {
    /// Bitfield of `REPORT_*` flags
    pub event_type: u16,
    pub address_type: AddressType,
    pub address: BdAddr,
    pub primary_phy: Phy,
    pub secondary_phy: Option<Phy>,
    pub sid: Option<u8>,
    pub tx_power: Option<i8>,
    pub rssi: i8,
    /// Interval of the associated periodic advertising, 0 when absent
    pub periodic_interval: u16,
    pub direct_address: Option<(AddressType, BdAddr)>,
    pub data: Vec<u8>,
}

impl AdvertisingReport {
    /// Report of a legacy advertising PDU.
    pub fn legacy(event_type: u16, address_type: AddressType, address: BdAddr, rssi: i8, data: Vec<u8>) -> Self {
        Self {
            event_type: event_type | REPORT_LEGACY,
            address_type,
            address,
            primary_phy: Phy::Le1M,
            secondary_phy: None,
            sid: None,
            tx_power: None,
            rssi,
            periodic_interval: 0,
            direct_address: None,
            data,
        }
    }

    pub fn is_connectable(&self) -> bool {
        self.event_type & REPORT_CONNECTABLE != 0
    }

    pub fn is_scan_response(&self) -> bool {
        self.event_type & REPORT_SCAN_RESPONSE != 0
    }

    pub fn is_legacy(&self) -> bool {
        self.event_type & REPORT_LEGACY != 0
    }

    /// AD structures of the payload, as `(type, data)` pairs.
    pub fn ad_structures(&self) -> Vec<(u8, Vec<u8>)> {
        parse_advertising_data(&self.data)
    }

    /// Complete local name, or the shortened one when that is all there is.
    pub fn local_name(&self) -> Option<String> {
        let structures = self.ad_structures();
        let find = |wanted: u8| {
            structures
                .iter()
                .find(|(ad_type, _)| *ad_type == wanted)
                .map(|(_, data)| String::from_utf8_lossy(data).into_owned())
        };
        find(ADV_TYPE_COMPLETE_LOCAL_NAME).or_else(|| find(ADV_TYPE_SHORT_LOCAL_NAME))
    }

    pub fn flags(&self) -> Option<u8> {
        self.ad_structures()
            .into_iter()
            .find(|(ad_type, data)| *ad_type == ADV_TYPE_FLAGS && !data.is_empty())
            .map(|(_, data)| data[0])
    }
}

/// Parse advertisement data into AD structures
///
/// Parsing stops at the first zero length field or at a structure running
/// past the end of the buffer.
///
/// # Returns
///
/// A vector of (type, data) tuples
pub fn parse_advertising_data(data: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i] as usize;
        if length == 0 || i + length >= data.len() {
            break;
        }

        let ad_type = data[i + 1];
        let ad_data = data[i + 2..i + 1 + length].to_vec();

        result.push((ad_type, ad_data));

        i += 1 + length;
    }

    result
}

/// Builds an AD structure: length, type, data.
pub fn ad_structure(ad_type: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 2);
    out.push((data.len() + 1) as u8);
    out.push(ad_type);
    out.extend_from_slice(data);
    out
}
