//! # Hub Wire Codec
//!
//! Framing and message model for the hub's JSON protocol. Every frame is a
//! JSON document terminated by a 0x1E record separator; several frames may
//! arrive inside one WebSocket message.
//!
//! ## Connection Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  POST /messaging/negotiate          → connectionId (or redirect)        │
//! │  WS upgrade  wss://.../messaging?id=<connectionId>                      │
//! │  → {"protocol":"json","version":1}\x1e                                  │
//! │  ← {}\x1e                           (empty object = accepted)           │
//! │  ← {"type":1,"target":"ReceiveMessage","arguments":[...]}\x1e           │
//! │  ← {"type":6}\x1e                   (ping, answered in kind)            │
//! │  ← {"type":7,"error":"..."}\x1e     (close)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A negotiate response may instead carry `url` and `accessToken`, which
//! redirects the connection to a relay endpoint with its own token.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LiveError, LiveResult};

/// Record separator terminating every hub frame.
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// Message type tag for invocations.
const TYPE_INVOCATION: u64 = 1;
/// Message type tag for pings.
const TYPE_PING: u64 = 6;
/// Message type tag for close.
const TYPE_CLOSE: u64 = 7;

// =============================================================================
// Negotiate
// =============================================================================

/// Response from the negotiate endpoint.
///
/// Either `connection_id` is set (connect directly to the hub path) or
/// `url`/`access_token` are set (reconnect against the relay endpoint,
/// negotiating again there).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

impl NegotiateResponse {
    /// True when this response redirects to a relay endpoint.
    pub fn is_redirect(&self) -> bool {
        self.url.is_some()
    }
}

// =============================================================================
// Frames
// =============================================================================

/// A decoded hub frame.
#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    /// Server invoked a client method.
    Invocation { target: String, arguments: Vec<Value> },
    /// Keep-alive ping.
    Ping,
    /// Server is closing the connection.
    Close { error: Option<String> },
    /// A frame type we do not handle (stream items, completions).
    Other(u64),
}

#[derive(Deserialize)]
struct WireFrame {
    #[serde(rename = "type")]
    kind: u64,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<String>,
}

/// Serializes the protocol handshake frame.
pub fn handshake_frame() -> Vec<u8> {
    let mut out = br#"{"protocol":"json","version":1}"#.to_vec();
    out.push(RECORD_SEPARATOR);
    out
}

/// Checks the server's handshake response frame.
///
/// An empty JSON object means the protocol was accepted; anything with an
/// `error` field is a rejection.
pub fn check_handshake_response(frame: &[u8]) -> LiveResult<()> {
    #[derive(Deserialize)]
    struct HandshakeReply {
        #[serde(default)]
        error: Option<String>,
    }

    let reply: HandshakeReply = serde_json::from_slice(frame)
        .map_err(|e| LiveError::HandshakeRejected(format!("unparseable response: {e}")))?;
    match reply.error {
        Some(error) => Err(LiveError::HandshakeRejected(error)),
        None => Ok(()),
    }
}

/// Serializes a ping frame.
pub fn ping_frame() -> Vec<u8> {
    let mut out = br#"{"type":6}"#.to_vec();
    out.push(RECORD_SEPARATOR);
    out
}

/// Serializes a non-blocking invocation of a hub method.
pub fn invocation_frame(target: &str, arguments: &[Value]) -> LiveResult<Vec<u8>> {
    #[derive(Serialize)]
    struct Outgoing<'a> {
        #[serde(rename = "type")]
        kind: u64,
        target: &'a str,
        arguments: &'a [Value],
    }

    let mut out = serde_json::to_vec(&Outgoing {
        kind: TYPE_INVOCATION,
        target,
        arguments,
    })?;
    out.push(RECORD_SEPARATOR);
    Ok(out)
}

/// Splits a WebSocket payload into hub frames and decodes each.
///
/// Trailing bytes after the last separator are a protocol violation (the
/// hub never splits a frame across WebSocket messages) and are rejected.
pub fn decode_frames(payload: &[u8]) -> LiveResult<Vec<HubFrame>> {
    let mut frames = Vec::new();
    let mut rest = payload;

    while !rest.is_empty() {
        let Some(end) = rest.iter().position(|&b| b == RECORD_SEPARATOR) else {
            return Err(LiveError::InvalidFrame(
                "payload not terminated by record separator".into(),
            ));
        };
        frames.push(decode_frame(&rest[..end])?);
        rest = &rest[end + 1..];
    }

    Ok(frames)
}

fn decode_frame(frame: &[u8]) -> LiveResult<HubFrame> {
    let wire: WireFrame = serde_json::from_slice(frame)
        .map_err(|e| LiveError::InvalidFrame(e.to_string()))?;

    Ok(match wire.kind {
        TYPE_INVOCATION => HubFrame::Invocation {
            target: wire.target.unwrap_or_default(),
            arguments: wire.arguments.unwrap_or_default(),
        },
        TYPE_PING => HubFrame::Ping,
        TYPE_CLOSE => HubFrame::Close { error: wire.error },
        other => HubFrame::Other(other),
    })
}
