//! # Live Error Types
//!
//! Error types for the realtime delivery layer.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Live Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  InvalidFrame           │ │
//! │  │  InvalidUrl     │  │  Disconnected   │  │  HandshakeRejected      │ │
//! │  │  ConfigLoad     │  │  Timeout        │  │  DeserializationFailed  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │      Auth       │  │      API        │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │ Unauthenticated │  │  ApiStatus      │  │  ChannelError           │ │
//! │  │ RefreshFailed   │  │  CatchupUnavail │  │  ShuttingDown           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for realtime delivery operations.
pub type LiveResult<T> = Result<T, LiveError>;

/// Live error type covering all delivery-layer failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum LiveError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid backend or hub URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Auth Errors
    // =========================================================================
    /// No stored session. The caller must complete registration first.
    #[error("Not authenticated. Complete phone registration first.")]
    Unauthenticated,

    /// The backend rejected the refresh token; the session is dead.
    #[error("Token refresh rejected (HTTP {status}). Re-register this device.")]
    RefreshFailed { status: u16 },

    /// A registration request is already pending for this number.
    #[error("A verification code was already requested. Retry after {retry_after_secs} seconds.")]
    OtpOutstanding { retry_after_secs: u64 },

    /// Failed to read or write the credential file.
    #[error("Credential store error: {0}")]
    CredentialStore(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection dropped unexpectedly.
    #[error("Disconnected from {0}")]
    Disconnected(&'static str),

    /// Operation timed out.
    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Malformed or unexpected frame on a live connection.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The hub rejected our protocol handshake.
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The push endpoint closed the stream with an error stanza.
    #[error("Push stream error: code {code}, {text}")]
    PushStreamError { code: String, text: String },

    /// Failed to serialize a payload.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize a payload.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // API Errors
    // =========================================================================
    /// The backend returned a non-success HTTP status.
    #[error("API error: {method} {path} returned HTTP {status}")]
    ApiStatus {
        method: &'static str,
        path: String,
        status: u16,
    },

    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The push channel could not be prepared, so no catch-up bound exists.
    #[error("Catch-up unavailable: {0}")]
    CatchupUnavailable(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal coordinator error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The delivery coordinator is shutting down.
    #[error("Delivery coordinator is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<hermes_core::CoreError> for LiveError {
    fn from(err: hermes_core::CoreError) -> Self {
        LiveError::DeserializationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for LiveError {
    fn from(err: serde_json::Error) -> Self {
        LiveError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for LiveError {
    fn from(err: url::ParseError) -> Self {
        LiveError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for LiveError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed => LiveError::Disconnected("hub"),
            WsError::AlreadyClosed => LiveError::Disconnected("hub"),
            WsError::Protocol(p) => LiveError::WebSocketError(p.to_string()),
            WsError::Io(io) => LiveError::ConnectionFailed(io.to_string()),
            WsError::Tls(tls) => LiveError::TlsError(tls.to_string()),
            other => LiveError::WebSocketError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for LiveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LiveError::Timeout(0)
        } else if err.is_connect() {
            LiveError::ConnectionFailed(err.to_string())
        } else {
            LiveError::Http(err.to_string())
        }
    }
}

impl From<std::io::Error> for LiveError {
    fn from(err: std::io::Error) -> Self {
        LiveError::ConnectionFailed(err.to_string())
    }
}

impl From<prost::DecodeError> for LiveError {
    fn from(err: prost::DecodeError) -> Self {
        LiveError::InvalidFrame(err.to_string())
    }
}

impl From<toml::de::Error> for LiveError {
    fn from(err: toml::de::Error) -> Self {
        LiveError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for LiveError {
    fn from(err: toml::ser::Error) -> Self {
        LiveError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl LiveError {
    /// Returns true if this error is recoverable and the operation can be retried.
    ///
    /// ## Retryable Errors
    /// - Connection failures (network issues)
    /// - Timeouts
    /// - Unexpected disconnections
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Dead sessions (rejected refresh tokens)
    /// - Protocol violations
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LiveError::ConnectionFailed(_)
                | LiveError::Disconnected(_)
                | LiveError::Timeout(_)
                | LiveError::WebSocketError(_)
                | LiveError::Http(_)
                | LiveError::PushStreamError { .. }
        )
    }

    /// Returns true if this error means the session must be re-established
    /// by the user (registration flow), not by retrying.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            LiveError::Unauthenticated | LiveError::RefreshFailed { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            LiveError::InvalidConfig(_)
                | LiveError::InvalidUrl(_)
                | LiveError::ConfigLoadFailed(_)
                | LiveError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error indicates a protocol violation.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            LiveError::InvalidFrame(_)
                | LiveError::HandshakeRejected(_)
                | LiveError::SerializationFailed(_)
                | LiveError::DeserializationFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(LiveError::ConnectionFailed("network error".into()).is_retryable());
        assert!(LiveError::Disconnected("hub").is_retryable());
        assert!(LiveError::Timeout(30).is_retryable());

        assert!(!LiveError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!LiveError::Unauthenticated.is_retryable());
        assert!(!LiveError::RefreshFailed { status: 401 }.is_retryable());
    }

    #[test]
    fn test_auth_errors_are_terminal() {
        assert!(LiveError::Unauthenticated.is_auth_error());
        assert!(LiveError::RefreshFailed { status: 403 }.is_auth_error());
        assert!(!LiveError::Timeout(5).is_auth_error());
    }

    #[test]
    fn test_error_display() {
        let err = LiveError::ApiStatus {
            method: "GET",
            path: "/Conversation/Updated".into(),
            status: 503,
        };
        assert!(err.to_string().contains("/Conversation/Updated"));
        assert!(err.to_string().contains("503"));
    }
}
