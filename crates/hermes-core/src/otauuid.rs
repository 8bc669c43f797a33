//! # Over-The-Air UUIDs
//!
//! Messages that may travel over the satellite link carry a custom
//! bit-packed UUID so the 16 bytes double as routing metadata.
//!
//! ## Bit Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      OTA UUID (16 bytes)                                │
//! │                                                                         │
//! │  byte  0..4   timestamp (big-endian u32, seconds)                       │
//! │  byte  4,5    random[0..2]                                              │
//! │  byte  6      1 . . . g g g g   marker | group_index + 1 (0 = none)     │
//! │  byte  7      random[2]                                                 │
//! │  byte  8      1 . r f f f f f   marker | reserved1 | fragment_idx + 1   │
//! │  byte  9..14  random[3..8]                                              │
//! │  byte  14     1 . h h h h h h   marker | reserved2 high 6 bits          │
//! │  byte  15     reserved2 low 8 bits                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The three `0x80` marker bits (bytes 6, 8, 14) are what distinguish an
//! OTA UUID from an ordinary v4 identifier.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Field Limits
// =============================================================================

/// Highest group index the 4-bit nibble can carry (stored offset by one).
pub const MAX_GROUP_INDEX: u8 = 14;

/// Highest fragment index the 5-bit field can carry (stored offset by one).
pub const MAX_FRAGMENT_INDEX: u8 = 30;

/// Highest value of the 14-bit reserved2 field.
pub const MAX_RESERVED2: u16 = (1 << 14) - 1;

// =============================================================================
// Parameters
// =============================================================================

/// Optional inputs for [`generate_ota_uuid`].
///
/// Every `None` field falls back to a live value (current time, fresh
/// entropy) or to "absent" for the indexed fields. Fixing `timestamp` and
/// `random_value` makes generation deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtaUuidParams {
    /// Seconds value packed into the first four bytes. Defaults to now.
    pub timestamp: Option<u32>,
    /// The eight scattered entropy bytes. Defaults to fresh randomness.
    pub random_value: Option<u64>,
    /// Multi-recipient group slot, 0..=14.
    pub group_index: Option<u8>,
    /// Fragment slot for multi-part messages, 0..=30.
    pub fragment_index: Option<u8>,
    /// Single reserved flag bit.
    pub reserved1: Option<u8>,
    /// 14-bit reserved field.
    pub reserved2: Option<u16>,
}

// =============================================================================
// Generation
// =============================================================================

/// Generates an OTA UUID from the given parameters.
///
/// Returns [`CoreError::FieldOutOfRange`] when an indexed field exceeds the
/// bits reserved for it.
pub fn generate_ota_uuid(params: OtaUuidParams) -> CoreResult<Uuid> {
    let group_nibble = match params.group_index {
        Some(g) if g > MAX_GROUP_INDEX => {
            return Err(CoreError::FieldOutOfRange {
                field: "group_index",
                value: g as u32,
                max: MAX_GROUP_INDEX as u32,
            })
        }
        Some(g) => g + 1,
        None => 0,
    };

    let fragment_bits = match params.fragment_index {
        Some(f) if f > MAX_FRAGMENT_INDEX => {
            return Err(CoreError::FieldOutOfRange {
                field: "fragment_index",
                value: f as u32,
                max: MAX_FRAGMENT_INDEX as u32,
            })
        }
        Some(f) => f + 1,
        None => 0,
    };

    let reserved1 = params.reserved1.unwrap_or(0);
    if reserved1 > 1 {
        return Err(CoreError::FieldOutOfRange {
            field: "reserved1",
            value: reserved1 as u32,
            max: 1,
        });
    }

    let reserved2 = params.reserved2.unwrap_or(0);
    if reserved2 > MAX_RESERVED2 {
        return Err(CoreError::FieldOutOfRange {
            field: "reserved2",
            value: reserved2 as u32,
            max: MAX_RESERVED2 as u32,
        });
    }

    let timestamp = params
        .timestamp
        .unwrap_or_else(|| Utc::now().timestamp() as u32);
    let random_value = params.random_value.unwrap_or_else(rand::random);

    let ts = timestamp.to_be_bytes();
    let rb = random_value.to_be_bytes();

    let mut raw = [0u8; 16];
    raw[0..4].copy_from_slice(&ts);
    raw[4] = rb[0];
    raw[5] = rb[1];
    raw[6] = 0x80 | (group_nibble & 0x0F);
    raw[7] = rb[2];
    raw[8] = 0x80 | ((reserved1 & 0x01) << 5) | (fragment_bits & 0x1F);
    raw[9] = rb[3];
    raw[10] = rb[4];
    raw[11] = rb[5];
    raw[12] = rb[6];
    raw[13] = rb[7];
    raw[14] = 0x80 | ((reserved2 >> 8) as u8 & 0x3F);
    raw[15] = (reserved2 & 0xFF) as u8;

    Ok(Uuid::from_bytes(raw))
}

// =============================================================================
// Unit Tests
// =============================================================================
