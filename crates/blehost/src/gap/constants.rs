// Address types
pub const PUBLIC_DEVICE_ADDRESS: u8 = 0x00;
pub const RANDOM_DEVICE_ADDRESS: u8 = 0x01;
pub const PUBLIC_IDENTITY_ADDRESS: u8 = 0x02;
pub const RANDOM_IDENTITY_ADDRESS: u8 = 0x03;

// Own address types used in controller commands
pub const OWN_ADDRESS_PUBLIC: u8 = 0x00;
pub const OWN_ADDRESS_RANDOM: u8 = 0x01;
pub const OWN_ADDRESS_RPA_PUBLIC_FALLBACK: u8 = 0x02;
pub const OWN_ADDRESS_RPA_RANDOM_FALLBACK: u8 = 0x03;

// Advertising set bookkeeping
pub const MAX_ADVERTISING_SETS: usize = 15;
pub const LEGACY_ADVERTISING_HANDLE: u8 = 0x00;
pub const MAX_HCI_DATA_LENGTH: usize = 251;
pub const LEGACY_ADVERTISING_MAX_DATA_LENGTH: usize = 31;

// Advertising intervals (0.625 ms units)
pub const DEFAULT_ADVERTISING_INTERVAL_MIN: u32 = 0x0400;
pub const DEFAULT_ADVERTISING_INTERVAL_MAX: u32 = 0x0800;
pub const NON_CONNECTABLE_ADVERTISING_INTERVAL_MIN: u32 = 0x00A0;
pub const ADVERTISING_TX_POWER_NO_PREFERENCE: i8 = 127;

// Advertising durations are expressed in 10 ms units
pub const ADVERTISING_DURATION_UNIT_MS: u64 = 10;
// Scan durations are expressed in 10 ms units
pub const SCAN_DURATION_UNIT_MS: u64 = 10;

// LE Scan parameters (0.625 ms units)
pub const LE_SCAN_INTERVAL: u16 = 0x0004;
pub const LE_SCAN_WINDOW: u16 = 0x0004;

// LE Connection parameters
pub const LE_CONN_INTERVAL_MIN: u16 = 0x0018; // 30 ms
pub const LE_CONN_INTERVAL_MAX: u16 = 0x0028; // 50 ms
pub const LE_CONN_LATENCY: u16 = 0x0000;
pub const LE_SUPERVISION_TIMEOUT: u16 = 0x01F4; // 5 s
pub const LE_MIN_CE_LENGTH: u16 = 0x0000;
pub const LE_MAX_CE_LENGTH: u16 = 0x0000;

// Rotation period of non resolvable private addresses
pub const DEFAULT_PRIVATE_ADDRESS_TIMEOUT_S: u64 = 15 * 60;

// HCI status codes reported in events
pub const HCI_SUCCESS: u8 = 0x00;
pub const HCI_ADVERTISING_TIMEOUT: u8 = 0x3C;

// Disconnection reasons
pub const HCI_AUTHENTICATION_FAILURE: u8 = 0x05;
pub const HCI_REMOTE_USER_TERMINATED: u8 = 0x13;
pub const HCI_REMOTE_DEV_LOW_RESOURCES: u8 = 0x14;
pub const HCI_REMOTE_DEV_POWER_OFF: u8 = 0x15;
pub const HCI_LOCAL_HOST_TERMINATED: u8 = 0x16;
pub const HCI_UNSUPPORTED_REMOTE_FEATURE: u8 = 0x1A;
pub const HCI_PAIRING_WITH_UNIT_KEY_NOT_SUPPORTED: u8 = 0x29;
pub const HCI_UNACCEPTABLE_CONNECTION_PARAMETERS: u8 = 0x3B;

// Advertising Data Types
pub const ADV_TYPE_FLAGS: u8 = 0x01;
pub const ADV_TYPE_16BIT_SERVICE_UUID_PARTIAL: u8 = 0x02;
pub const ADV_TYPE_16BIT_SERVICE_UUID_COMPLETE: u8 = 0x03;
pub const ADV_TYPE_128BIT_SERVICE_UUID_PARTIAL: u8 = 0x06;
pub const ADV_TYPE_128BIT_SERVICE_UUID_COMPLETE: u8 = 0x07;
pub const ADV_TYPE_SHORT_LOCAL_NAME: u8 = 0x08;
pub const ADV_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;
pub const ADV_TYPE_TX_POWER_LEVEL: u8 = 0x0A;
pub const ADV_TYPE_APPEARANCE: u8 = 0x19;
pub const ADV_TYPE_MANUFACTURER_SPECIFIC: u8 = 0xFF;

// Flags AD type bits
pub const ADV_FLAG_LE_LIMITED_DISCOVERABLE: u8 = 0x01;
pub const ADV_FLAG_LE_GENERAL_DISCOVERABLE: u8 = 0x02;
pub const ADV_FLAG_BR_EDR_NOT_SUPPORTED: u8 = 0x04;
