//! # Error Types
//!
//! Model and codec errors for hermes-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  hermes-core errors (this file)                                        │
//! │  └── CoreError        - Model decoding / identifier packing failures   │
//! │                                                                         │
//! │  hermes-live errors (separate crate)                                   │
//! │  └── LiveError        - Network, auth, and transport failures          │
//! │                                                                         │
//! │  Flow: CoreError → LiveError → caller                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field name, offending value)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Model and codec errors.
///
/// These errors represent malformed payloads or out-of-range identifier
/// fields. They are pure data failures with no I/O cause attached.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An identifier field fell outside the range the wire format can carry.
    ///
    /// ## When This Occurs
    /// - `group_index` above 14 (stored in a 4-bit nibble, offset by one)
    /// - `fragment_index` above 30 (stored in 5 bits, offset by one)
    /// - `reserved1` above 1, `reserved2` above 16383
    #[error("{field} out of range: {value} (maximum {max})")]
    FieldOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    /// A string that should contain a UUID did not parse as one.
    #[error("invalid UUID in {field}: {source}")]
    InvalidUuid {
        field: &'static str,
        #[source]
        source: uuid::Error,
    },

    /// A payload failed JSON decoding.
    #[error("payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::FieldOutOfRange {
            field: "group_index",
            value: 15,
            max: 14,
        };
        assert_eq!(err.to_string(), "group_index out of range: 15 (maximum 14)");
    }

    #[test]
    fn test_decode_error_wraps_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let core_err: CoreError = parse_err.into();
        assert!(matches!(core_err, CoreError::Decode(_)));
    }
}
