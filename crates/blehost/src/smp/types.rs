//! Type definitions for the Security Manager
use super::constants::*;
use super::keys::{Csrk, Passkey};
use crate::gap::{ConnectionHandle, Whitelist};
use bitflags::bitflags;
use std::fmt;

/// IO Capability types for pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IoCapability {
    /// Display only capability
    DisplayOnly,
    /// Display with yes/no capability
    DisplayYesNo,
    /// Keyboard only
    KeyboardOnly,
    /// No input, no output
    #[default]
    NoInputNoOutput,
    /// Both keyboard and display
    KeyboardDisplay,
}

impl IoCapability {
    /// Convert to u8 value for protocol
    pub fn to_u8(&self) -> u8 {
        match self {
            IoCapability::DisplayOnly => SMP_IO_CAPABILITY_DISPLAY_ONLY,
            IoCapability::DisplayYesNo => SMP_IO_CAPABILITY_DISPLAY_YES_NO,
            IoCapability::KeyboardOnly => SMP_IO_CAPABILITY_KEYBOARD_ONLY,
            IoCapability::NoInputNoOutput => SMP_IO_CAPABILITY_NO_INPUT_NO_OUTPUT,
            IoCapability::KeyboardDisplay => SMP_IO_CAPABILITY_KEYBOARD_DISPLAY,
        }
    }

    /// Convert from u8 value from protocol
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            SMP_IO_CAPABILITY_DISPLAY_ONLY => Some(IoCapability::DisplayOnly),
            SMP_IO_CAPABILITY_DISPLAY_YES_NO => Some(IoCapability::DisplayYesNo),
            SMP_IO_CAPABILITY_KEYBOARD_ONLY => Some(IoCapability::KeyboardOnly),
            SMP_IO_CAPABILITY_NO_INPUT_NO_OUTPUT => Some(IoCapability::NoInputNoOutput),
            SMP_IO_CAPABILITY_KEYBOARD_DISPLAY => Some(IoCapability::KeyboardDisplay),
            _ => None,
        }
    }
}

impl fmt::Display for IoCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoCapability::DisplayOnly => write!(f, "Display Only"),
            IoCapability::DisplayYesNo => write!(f, "Display Yes/No"),
            IoCapability::KeyboardOnly => write!(f, "Keyboard Only"),
            IoCapability::NoInputNoOutput => write!(f, "No Input No Output"),
            IoCapability::KeyboardDisplay => write!(f, "Keyboard Display"),
        }
    }
}

bitflags! {
    /// Authentication requirements carried in pairing requests and
    /// security requests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AuthenticationMask: u8 {
        const BONDING = SMP_AUTH_REQ_BONDING;
        const MITM = SMP_AUTH_REQ_MITM;
        const SECURE_CONNECTIONS = SMP_AUTH_REQ_SC;
        const KEYPRESS_NOTIFICATION = SMP_AUTH_REQ_KEYPRESS;
        const CT2 = SMP_AUTH_REQ_CT2;
    }
}

bitflags! {
    /// Keys a device offers to distribute at the end of pairing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeyDistribution: u8 {
        /// LTK, EDIV and RAND
        const ENCRYPTION = SMP_KEY_DIST_ENC_KEY;
        /// IRK and identity address
        const IDENTITY = SMP_KEY_DIST_ID_KEY;
        /// CSRK
        const SIGNING = SMP_KEY_DIST_SIGN_KEY;
        const LINK = SMP_KEY_DIST_LINK_KEY;
    }
}

/// Reason carried by an SMP Pairing Failed PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingFailure {
    PasskeyEntryFailed,
    OobNotAvailable,
    AuthenticationRequirements,
    ConfirmValueFailed,
    PairingNotSupported,
    EncryptionKeySize,
    CommandNotSupported,
    UnspecifiedReason,
    RepeatedAttempts,
    InvalidParameters,
    DhKeyCheckFailed,
    NumericComparisonFailed,
    BrEdrPairingInProgress,
    CrossTransportKeyDerivationNotAllowed,
}

impl PairingFailure {
    pub fn to_u8(&self) -> u8 {
        match self {
            PairingFailure::PasskeyEntryFailed => SMP_REASON_PASSKEY_ENTRY_FAILED,
            PairingFailure::OobNotAvailable => SMP_REASON_OOB_NOT_AVAILABLE,
            PairingFailure::AuthenticationRequirements => SMP_REASON_AUTHENTICATION_REQUIREMENTS,
            PairingFailure::ConfirmValueFailed => SMP_REASON_CONFIRM_VALUE_FAILED,
            PairingFailure::PairingNotSupported => SMP_REASON_PAIRING_NOT_SUPPORTED,
            PairingFailure::EncryptionKeySize => SMP_REASON_ENCRYPTION_KEY_SIZE,
            PairingFailure::CommandNotSupported => SMP_REASON_COMMAND_NOT_SUPPORTED,
            PairingFailure::UnspecifiedReason => SMP_REASON_UNSPECIFIED_REASON,
            PairingFailure::RepeatedAttempts => SMP_REASON_REPEATED_ATTEMPTS,
            PairingFailure::InvalidParameters => SMP_REASON_INVALID_PARAMETERS,
            PairingFailure::DhKeyCheckFailed => SMP_REASON_DHKEY_CHECK_FAILED,
            PairingFailure::NumericComparisonFailed => SMP_REASON_NUMERIC_COMPARISON_FAILED,
            PairingFailure::BrEdrPairingInProgress => SMP_REASON_BR_EDR_PAIRING_IN_PROGRESS,
            PairingFailure::CrossTransportKeyDerivationNotAllowed => {
                SMP_REASON_CROSS_TRANSPORT_KEY_NOT_ALLOWED
            }
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            SMP_REASON_PASSKEY_ENTRY_FAILED => Some(PairingFailure::PasskeyEntryFailed),
            SMP_REASON_OOB_NOT_AVAILABLE => Some(PairingFailure::OobNotAvailable),
            SMP_REASON_AUTHENTICATION_REQUIREMENTS => Some(PairingFailure::AuthenticationRequirements),
            SMP_REASON_CONFIRM_VALUE_FAILED => Some(PairingFailure::ConfirmValueFailed),
            SMP_REASON_PAIRING_NOT_SUPPORTED => Some(PairingFailure::PairingNotSupported),
            SMP_REASON_ENCRYPTION_KEY_SIZE => Some(PairingFailure::EncryptionKeySize),
            SMP_REASON_COMMAND_NOT_SUPPORTED => Some(PairingFailure::CommandNotSupported),
            SMP_REASON_UNSPECIFIED_REASON => Some(PairingFailure::UnspecifiedReason),
            SMP_REASON_REPEATED_ATTEMPTS => Some(PairingFailure::RepeatedAttempts),
            SMP_REASON_INVALID_PARAMETERS => Some(PairingFailure::InvalidParameters),
            SMP_REASON_DHKEY_CHECK_FAILED => Some(PairingFailure::DhKeyCheckFailed),
            SMP_REASON_NUMERIC_COMPARISON_FAILED => Some(PairingFailure::NumericComparisonFailed),
            SMP_REASON_BR_EDR_PAIRING_IN_PROGRESS => Some(PairingFailure::BrEdrPairingInProgress),
            SMP_REASON_CROSS_TRANSPORT_KEY_NOT_ALLOWED => {
                Some(PairingFailure::CrossTransportKeyDerivationNotAllowed)
            }
            _ => None,
        }
    }
}

impl fmt::Display for PairingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PairingFailure::PasskeyEntryFailed => "passkey entry failed",
            PairingFailure::OobNotAvailable => "OOB data not available",
            PairingFailure::AuthenticationRequirements => "authentication requirements not met",
            PairingFailure::ConfirmValueFailed => "confirm value failed",
            PairingFailure::PairingNotSupported => "pairing not supported",
            PairingFailure::EncryptionKeySize => "encryption key size",
            PairingFailure::CommandNotSupported => "command not supported",
            PairingFailure::UnspecifiedReason => "unspecified reason",
            PairingFailure::RepeatedAttempts => "too many pairing attempts",
            PairingFailure::InvalidParameters => "invalid parameters",
            PairingFailure::DhKeyCheckFailed => "DHKey check failed",
            PairingFailure::NumericComparisonFailed => "numeric comparison failed",
            PairingFailure::BrEdrPairingInProgress => "BR/EDR pairing in progress",
            PairingFailure::CrossTransportKeyDerivationNotAllowed => {
                "cross-transport key derivation not allowed"
            }
        };
        f.write_str(text)
    }
}

/// Outcome reported at the end of a pairing procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityCompletionStatus {
    Success,
    Timeout,
    Failure(PairingFailure),
}

/// Encryption state of a link, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkEncryption {
    NotEncrypted,
    EncryptionInProgress,
    Encrypted,
    EncryptedWithMitm,
    EncryptedWithScAndMitm,
}

/// Security requirement applied to a link by `set_link_security`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    /// Security mode 1 level 1: no security
    EncryptionOpenLink,
    /// Security mode 1 level 2: unauthenticated encryption
    EncryptionNoMitm,
    /// Security mode 1 level 3: authenticated encryption
    EncryptionWithMitm,
    /// Security mode 2 level 1: unauthenticated data signing
    SignedNoMitm,
    /// Security mode 2 level 2: authenticated data signing
    SignedWithMitm,
}

/// Progress of pairing on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PairingState {
    #[default]
    Idle,
    RequestSent,
    RequestReceived,
    KeyExchangeInProgress,
    Paired,
}

/// Keypress notification type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keypress {
    /// Entry started
    EntryStarted,
    /// Digit entered
    DigitEntered,
    /// Digit erased
    DigitErased,
    /// Entry cleared
    Cleared,
    /// Entry completed
    EntryCompleted,
}

impl Keypress {
    pub fn to_u8(&self) -> u8 {
        match self {
            Keypress::EntryStarted => SMP_KEYPRESS_ENTRY_STARTED,
            Keypress::DigitEntered => SMP_KEYPRESS_DIGIT_ENTERED,
            Keypress::DigitErased => SMP_KEYPRESS_DIGIT_ERASED,
            Keypress::Cleared => SMP_KEYPRESS_CLEARED,
            Keypress::EntryCompleted => SMP_KEYPRESS_ENTRY_COMPLETED,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            SMP_KEYPRESS_ENTRY_STARTED => Some(Keypress::EntryStarted),
            SMP_KEYPRESS_DIGIT_ENTERED => Some(Keypress::DigitEntered),
            SMP_KEYPRESS_DIGIT_ERASED => Some(Keypress::DigitErased),
            SMP_KEYPRESS_CLEARED => Some(Keypress::Cleared),
            SMP_KEYPRESS_ENTRY_COMPLETED => Some(Keypress::EntryCompleted),
            _ => None,
        }
    }
}

/// Initial settings of the Security Manager.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SecurityConfig {
    /// Keep keys after pairing and request bonding from peers
    pub bondable: bool,
    /// Require MITM protection when pairing
    pub mitm: bool,
    pub io_capability: IoCapability,
    /// Static passkey to display, `None` lets the controller pick one
    pub passkey: Option<Passkey>,
    /// Distribute and request signing keys
    pub signing: bool,
    pub secure_connections: bool,
    pub min_encryption_key_size: u8,
    pub max_encryption_key_size: u8,
    /// Ask the application before answering pairing requests
    pub pairing_authorisation: bool,
    pub legacy_pairing_allowed: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            bondable: true,
            mitm: true,
            io_capability: IoCapability::NoInputNoOutput,
            passkey: None,
            signing: true,
            secure_connections: true,
            min_encryption_key_size: SMP_MIN_ENCRYPTION_KEY_SIZE,
            max_encryption_key_size: SMP_MAX_ENCRYPTION_KEY_SIZE,
            pairing_authorisation: false,
            legacy_pairing_allowed: true,
        }
    }
}

/// Notifications delivered to the application by the Security Manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    /// A peer asked to pair and pairing authorisation is enabled
    PairingRequest(ConnectionHandle),
    /// Pairing finished
    PairingResult {
        connection: ConnectionHandle,
        status: SecurityCompletionStatus,
    },
    /// Encryption state of the link changed
    LinkEncryptionResult {
        connection: ConnectionHandle,
        result: LinkEncryption,
    },
    /// Signing key of the peer, with its MITM protection
    SigningKey {
        connection: ConnectionHandle,
        csrk: Csrk,
        authenticated: bool,
    },
    PasskeyDisplay {
        connection: ConnectionHandle,
        passkey: Passkey,
    },
    PasskeyRequest(ConnectionHandle),
    ConfirmationRequest(ConnectionHandle),
    KeypressNotification {
        connection: ConnectionHandle,
        keypress: Keypress,
    },
    LegacyPairingOobRequest(ConnectionHandle),
    OobRequest(ConnectionHandle),
    ValidMicTimeout(ConnectionHandle),
    /// Keys of the connection reached the security database
    SecurityContextStored(ConnectionHandle),
    WhitelistFromBondTable(Whitelist),
}
