//! Key material exchanged during pairing
//!
//! All keys are plain byte arrays in the byte order used on the air. Their
//! textual form is lowercase hex, in the same byte order.

use super::constants::*;
use crate::error::BleError;
use std::fmt;
use std::str::FromStr;

macro_rules! key_type {
    ($(#[$doc:meta])* $name:ident, $len:expr) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        // Key material never ends up in debug logs.
        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(..)", stringify!($name))
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(s, &mut bytes)?;
                Ok(Self(bytes))
            }
        }
    };
}

key_type!(
    /// Long Term Key
    Ltk,
    16
);
key_type!(
    /// Identity Resolving Key
    Irk,
    16
);
key_type!(
    /// Connection Signature Resolving Key
    Csrk,
    16
);
key_type!(
    /// Encrypted diversifier identifying a legacy LTK
    Ediv,
    2
);
key_type!(
    /// Random number identifying a legacy LTK
    Rand,
    8
);
key_type!(
    /// Temporary key supplied out of band during legacy pairing
    OobTk,
    16
);
key_type!(
    /// Random value of secure connections OOB data
    OobRand,
    16
);
key_type!(
    /// Confirm value of secure connections OOB data
    OobConfirm,
    16
);

/// A six digit passkey held as ASCII digits, most significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Passkey([u8; PASSKEY_LENGTH]);

impl Passkey {
    /// Builds a passkey from its numeric value, `None` above 999999.
    pub fn from_num(mut value: u32) -> Option<Self> {
        if value > PASSKEY_MAX {
            return None;
        }
        let mut digits = [b'0'; PASSKEY_LENGTH];
        for digit in digits.iter_mut().rev() {
            *digit = b'0' + (value % 10) as u8;
            value /= 10;
        }
        Some(Self(digits))
    }

    /// Builds a passkey from six ASCII digits.
    pub fn from_ascii(digits: [u8; PASSKEY_LENGTH]) -> Option<Self> {
        if digits.iter().all(u8::is_ascii_digit) {
            Some(Self(digits))
        } else {
            None
        }
    }

    pub fn to_num(&self) -> u32 {
        self.0
            .iter()
            .fold(0u32, |acc, digit| acc * 10 + u32::from(digit - b'0'))
    }

    pub fn as_ascii(&self) -> &[u8; PASSKEY_LENGTH] {
        &self.0
    }
}

impl fmt::Display for Passkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for digit in &self.0 {
            write!(f, "{}", *digit as char)?;
        }
        Ok(())
    }
}

impl FromStr for Passkey {
    type Err = BleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.as_bytes()
            .try_into()
            .ok()
            .and_then(Self::from_ascii)
            .ok_or_else(|| BleError::invalid("passkey must be six decimal digits"))
    }
}
