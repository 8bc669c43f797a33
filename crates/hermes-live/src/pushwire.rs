//! # Push Wire Codec
//!
//! Framing, protobuf messages, and payload decoding for the push channel.
//! Everything about the byte format lives here so the transport in `push.rs`
//! only deals in whole packets and decoded events.
//!
//! ## Packet Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  first packet of a stream:                                              │
//! │    [version: u8 = 41] [tag: u8] [length: uvarint] [protobuf body]       │
//! │  every later packet:                                                    │
//! │    [tag: u8] [length: uvarint] [protobuf body]                          │
//! │                                                                         │
//! │  tags:  0 HeartbeatPing    1 HeartbeatAck     2 LoginRequest            │
//! │         3 LoginResponse    4 Close            8 DataMessageStanza       │
//! │        10 StreamErrorStanza                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data stanzas carry key/value app data. The key `newMessage` holds a full
//! message JSON payload; decoding stays isolated here so a fetch-on-notify
//! fallback would not touch the transport or the coordinator.

use bytes::BytesMut;
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

use hermes_core::MessageModel;

use crate::error::{LiveError, LiveResult};

/// Protocol version byte sent and expected once per stream.
pub const WIRE_VERSION: u8 = 41;

/// Largest packet body we will read. Anything bigger is a corrupt stream.
const MAX_PACKET_SIZE: u64 = 1024 * 1024;

// =============================================================================
// Packet Tags
// =============================================================================

pub const TAG_HEARTBEAT_PING: u8 = 0;
pub const TAG_HEARTBEAT_ACK: u8 = 1;
pub const TAG_LOGIN_REQUEST: u8 = 2;
pub const TAG_LOGIN_RESPONSE: u8 = 3;
pub const TAG_CLOSE: u8 = 4;
pub const TAG_DATA_MESSAGE_STANZA: u8 = 8;
pub const TAG_STREAM_ERROR_STANZA: u8 = 10;

// =============================================================================
// Protobuf Messages (hand-derived, no build-time codegen)
// =============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct HeartbeatPing {
    #[prost(int32, optional, tag = "1")]
    pub stream_id: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub last_stream_id_received: Option<i32>,
    #[prost(int64, optional, tag = "3")]
    pub status: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct HeartbeatAck {
    #[prost(int32, optional, tag = "1")]
    pub stream_id: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub last_stream_id_received: Option<i32>,
    #[prost(int64, optional, tag = "3")]
    pub status: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Setting {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LoginRequest {
    #[prost(string, optional, tag = "1")]
    pub id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub domain: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub user: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub resource: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub auth_token: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub device_id: Option<String>,
    #[prost(int64, optional, tag = "7")]
    pub last_rmq_id: Option<i64>,
    #[prost(message, repeated, tag = "8")]
    pub setting: Vec<Setting>,
    #[prost(string, repeated, tag = "10")]
    pub received_persistent_id: Vec<String>,
    #[prost(bool, optional, tag = "12")]
    pub adaptive_heartbeat: Option<bool>,
    #[prost(bool, optional, tag = "14")]
    pub use_rmq2: Option<bool>,
    #[prost(int64, optional, tag = "15")]
    pub account_id: Option<i64>,
    /// 2 = android id auth.
    #[prost(int32, optional, tag = "16")]
    pub auth_service: Option<i32>,
    #[prost(int32, optional, tag = "17")]
    pub network_type: Option<i32>,
    #[prost(int64, optional, tag = "18")]
    pub status: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LoginResponse {
    #[prost(string, optional, tag = "1")]
    pub id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub jid: Option<String>,
    #[prost(int32, optional, tag = "5")]
    pub stream_id: Option<i32>,
    #[prost(int32, optional, tag = "6")]
    pub last_stream_id_received: Option<i32>,
    #[prost(int64, optional, tag = "8")]
    pub server_timestamp: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CloseStanza {}

#[derive(Clone, PartialEq, Message)]
pub struct AppData {
    #[prost(string, optional, tag = "1")]
    pub key: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DataMessageStanza {
    #[prost(string, optional, tag = "2")]
    pub id: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub from: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub to: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub category: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub token: Option<String>,
    #[prost(message, repeated, tag = "7")]
    pub app_data: Vec<AppData>,
    #[prost(bool, optional, tag = "8")]
    pub from_trusted_server: Option<bool>,
    #[prost(string, optional, tag = "9")]
    pub persistent_id: Option<String>,
    #[prost(int32, optional, tag = "10")]
    pub stream_id: Option<i32>,
    #[prost(int32, optional, tag = "11")]
    pub last_stream_id_received: Option<i32>,
    #[prost(string, optional, tag = "13")]
    pub reg_id: Option<String>,
    #[prost(int32, optional, tag = "17")]
    pub ttl: Option<i32>,
    #[prost(int64, optional, tag = "18")]
    pub sent: Option<i64>,
    #[prost(bytes = "vec", optional, tag = "21")]
    pub raw_data: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StreamErrorStanza {
    #[prost(string, optional, tag = "1")]
    pub r#type: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub text: Option<String>,
}

// =============================================================================
// Check-In Messages
// =============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct AndroidBuildProto {
    /// Build fingerprint.
    #[prost(string, optional, tag = "1")]
    pub id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub product: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub radio: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub bootloader: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub client_id: Option<String>,
    #[prost(int64, optional, tag = "7")]
    pub timestamp: Option<i64>,
    #[prost(int32, optional, tag = "8")]
    pub google_services: Option<i32>,
    #[prost(string, optional, tag = "9")]
    pub device: Option<String>,
    #[prost(int32, optional, tag = "10")]
    pub sdk_version: Option<i32>,
    #[prost(string, optional, tag = "11")]
    pub model: Option<String>,
    #[prost(string, optional, tag = "12")]
    pub manufacturer: Option<String>,
    #[prost(string, optional, tag = "13")]
    pub build_product: Option<String>,
    #[prost(bool, optional, tag = "14")]
    pub ota_installed: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AndroidCheckinProto {
    #[prost(message, optional, tag = "1")]
    pub build: Option<AndroidBuildProto>,
    #[prost(int64, optional, tag = "2")]
    pub last_checkin_msec: Option<i64>,
    #[prost(string, optional, tag = "6")]
    pub cell_operator: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub sim_operator: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub roaming: Option<String>,
    #[prost(int32, optional, tag = "9")]
    pub user_number: Option<i32>,
    /// 1 = android os device.
    #[prost(int32, optional, tag = "12")]
    pub r#type: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AndroidCheckinRequest {
    #[prost(int64, optional, tag = "2")]
    pub id: Option<i64>,
    #[prost(string, optional, tag = "3")]
    pub digest: Option<String>,
    #[prost(message, optional, tag = "4")]
    pub checkin: Option<AndroidCheckinProto>,
    #[prost(string, optional, tag = "6")]
    pub locale: Option<String>,
    #[prost(int64, optional, tag = "7")]
    pub logging_id: Option<i64>,
    #[prost(string, optional, tag = "12")]
    pub time_zone: Option<String>,
    #[prost(fixed64, optional, tag = "13")]
    pub security_token: Option<u64>,
    #[prost(int32, optional, tag = "14")]
    pub version: Option<i32>,
    #[prost(int32, optional, tag = "20")]
    pub fragment: Option<i32>,
    #[prost(int32, optional, tag = "22")]
    pub user_serial_number: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AndroidCheckinResponse {
    #[prost(bool, optional, tag = "1")]
    pub stats_ok: Option<bool>,
    #[prost(int64, optional, tag = "3")]
    pub time_msec: Option<i64>,
    #[prost(string, optional, tag = "4")]
    pub digest: Option<String>,
    #[prost(fixed64, optional, tag = "7")]
    pub android_id: Option<u64>,
    #[prost(fixed64, optional, tag = "8")]
    pub security_token: Option<u64>,
    #[prost(string, optional, tag = "10")]
    pub version_info: Option<String>,
}

// =============================================================================
// Framing
// =============================================================================

/// Encodes one packet. The version byte is prepended only for the first
/// packet of a stream.
pub fn encode_packet<M: Message>(tag: u8, message: &M, include_version: bool) -> Vec<u8> {
    let body_len = message.encoded_len();
    let mut out = BytesMut::with_capacity(body_len + 12);
    if include_version {
        out.extend_from_slice(&[WIRE_VERSION]);
    }
    out.extend_from_slice(&[tag]);
    encode_uvarint(body_len as u64, &mut out);
    // encoding into a BytesMut with reserved capacity cannot fail
    let _ = message.encode(&mut out);
    out.to_vec()
}

fn encode_uvarint(mut value: u64, out: &mut BytesMut) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.extend_from_slice(&[byte]);
            return;
        }
        out.extend_from_slice(&[byte | 0x80]);
    }
}

/// Reads the stream's version byte and checks it.
pub async fn read_version<R: AsyncRead + Unpin>(reader: &mut R) -> LiveResult<()> {
    let version = reader.read_u8().await?;
    if version != WIRE_VERSION {
        return Err(LiveError::InvalidFrame(format!(
            "unexpected push protocol version {version}"
        )));
    }
    Ok(())
}

/// Reads one packet: tag, varint length, body.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> LiveResult<(u8, Vec<u8>)> {
    let tag = reader.read_u8().await?;
    let size = read_uvarint(reader).await?;
    if size > MAX_PACKET_SIZE {
        return Err(LiveError::InvalidFrame(format!(
            "push packet of {size} bytes exceeds limit"
        )));
    }

    let mut body = vec![0u8; size as usize];
    reader.read_exact(&mut body).await?;
    Ok((tag, body))
}

async fn read_uvarint<R: AsyncRead + Unpin>(reader: &mut R) -> LiveResult<u64> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = reader.read_u8().await?;
        result |= u64::from(byte & 0x7F) << shift;
        if byte < 0x80 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(LiveError::InvalidFrame("varint overflow".into()));
        }
    }
}

// =============================================================================
// Login & Check-In Builders
// =============================================================================

/// Builds the login packet for a checked-in device, acknowledging the ids of
/// stanzas already processed in earlier sessions.
pub fn build_login_request(
    android_id: u64,
    security_token: u64,
    received_persistent_ids: Vec<String>,
) -> LoginRequest {
    let decimal_id = android_id.to_string();
    let login_id = format!("android-{android_id:x}");

    LoginRequest {
        id: Some(login_id.clone()),
        domain: Some("mcs.android.com".into()),
        user: Some(decimal_id.clone()),
        resource: Some(decimal_id),
        auth_token: Some(security_token.to_string()),
        device_id: Some(login_id),
        last_rmq_id: Some(1),
        setting: vec![Setting {
            name: Some("new_vc".into()),
            value: Some("1".into()),
        }],
        received_persistent_id: received_persistent_ids,
        adaptive_heartbeat: Some(false),
        use_rmq2: Some(true),
        account_id: Some(1_000_000),
        auth_service: Some(2),
        network_type: Some(1),
        status: None,
    }
}

/// Hardware identity presented at check-in. Defaults describe a current
/// mainstream handset so the registration is accepted.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub build_fingerprint: String,
    pub device: String,
    pub model: String,
    pub manufacturer: String,
    pub product: String,
    pub bootloader: String,
    pub radio: String,
    pub build_time: i64,
    pub sdk_version: i32,
    pub gms_version: i32,
    pub chrome_version: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        DeviceProfile {
            build_fingerprint:
                "google/panther/panther:13/TQ3A.230805.001/10316531:user/release-keys".into(),
            device: "panther".into(),
            model: "Pixel 7".into(),
            manufacturer: "Google".into(),
            product: "panther".into(),
            bootloader: "slider-1.2-9819352".into(),
            radio: "g5300g-230511-230925-B-10484716".into(),
            build_time: 1_691_193_600,
            sdk_version: 33,
            gms_version: 241_516_037,
            chrome_version: "120.0.6099.144".into(),
        }
    }
}

/// Builds a check-in request. `identity` carries the id and security token
/// from a previous check-in, if any.
pub fn build_checkin_request(
    profile: &DeviceProfile,
    identity: Option<(u64, u64)>,
) -> AndroidCheckinRequest {
    let build = AndroidBuildProto {
        id: Some(profile.build_fingerprint.clone()),
        product: Some(profile.product.clone()),
        radio: Some(profile.radio.clone()),
        bootloader: Some(profile.bootloader.clone()),
        client_id: Some("android-google".into()),
        timestamp: Some(profile.build_time),
        google_services: Some(profile.gms_version),
        device: Some(profile.device.clone()),
        sdk_version: Some(profile.sdk_version),
        model: Some(profile.model.clone()),
        manufacturer: Some(profile.manufacturer.clone()),
        build_product: Some(profile.product.clone()),
        ota_installed: Some(false),
    };

    AndroidCheckinRequest {
        id: identity.map(|(android_id, _)| android_id as i64),
        digest: None,
        checkin: Some(AndroidCheckinProto {
            build: Some(build),
            last_checkin_msec: Some(0),
            cell_operator: None,
            sim_operator: None,
            roaming: None,
            user_number: Some(0),
            r#type: Some(1),
        }),
        locale: Some("en_US".into()),
        logging_id: None,
        time_zone: Some("America/New_York".into()),
        security_token: identity.map(|(_, token)| token),
        version: Some(3),
        fragment: Some(0),
        user_serial_number: Some(0),
    }
}

// =============================================================================
// App Data Decoding
// =============================================================================

/// An event decoded from a data stanza's app data.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// A full message payload.
    NewMessage(Box<MessageModel>),
    /// A device-originated message exists for the given IMEI.
    DeviceMessage(String),
    /// The backend changed something about the account registration.
    AccountUpdate,
}

/// Decodes the app data of a stanza into a push event. Stanzas carrying no
/// recognized key decode to `None`.
pub fn decode_app_data(stanza: &DataMessageStanza) -> LiveResult<Option<PushEvent>> {
    for entry in &stanza.app_data {
        let (Some(key), Some(value)) = (entry.key.as_deref(), entry.value.as_deref()) else {
            continue;
        };
        match key {
            "newMessage" => {
                let message: MessageModel = serde_json::from_str(value)
                    .map_err(|e| LiveError::DeserializationFailed(e.to_string()))?;
                return Ok(Some(PushEvent::NewMessage(Box::new(message))));
            }
            "nonconversationalMessageExists" => {
                return Ok(Some(PushEvent::DeviceMessage(value.to_string())));
            }
            "deviceAccountUpdate" => {
                return Ok(Some(PushEvent::AccountUpdate));
            }
            _ => {}
        }
    }
    if !stanza.app_data.is_empty() {
        warn!(
            category = stanza.category.as_deref().unwrap_or(""),
            "Push stanza carried no recognized app data key"
        );
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_packet_round_trip() {
        let ping = HeartbeatPing {
            stream_id: Some(3),
            last_stream_id_received: Some(2),
            status: None,
        };
        let encoded = encode_packet(TAG_HEARTBEAT_PING, &ping, true);
        assert_eq!(encoded[0], WIRE_VERSION);

        let mut cursor = Cursor::new(encoded);
        read_version(&mut cursor).await.unwrap();
        let (tag, body) = read_packet(&mut cursor).await.unwrap();
        assert_eq!(tag, TAG_HEARTBEAT_PING);
        assert_eq!(HeartbeatPing::decode(body.as_slice()).unwrap(), ping);
    }

    #[tokio::test]
    async fn test_later_packets_omit_version() {
        let ack = HeartbeatAck::default();
        let encoded = encode_packet(TAG_HEARTBEAT_ACK, &ack, false);
        let mut cursor = Cursor::new(encoded);
        let (tag, body) = read_packet(&mut cursor).await.unwrap();
        assert_eq!(tag, TAG_HEARTBEAT_ACK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_version_is_rejected() {
        let mut cursor = Cursor::new(vec![40u8]);
        let err = read_version(&mut cursor).await.unwrap_err();
        assert!(matches!(err, LiveError::InvalidFrame(_)));
    }

    #[tokio::test]
    async fn test_multibyte_varint_length() {
        // a body longer than 127 bytes forces a two-byte varint
        let stanza = DataMessageStanza {
            persistent_id: Some("p".repeat(200)),
            ..Default::default()
        };
        let encoded = encode_packet(TAG_DATA_MESSAGE_STANZA, &stanza, false);
        let mut cursor = Cursor::new(encoded);
        let (tag, body) = read_packet(&mut cursor).await.unwrap();
        assert_eq!(tag, TAG_DATA_MESSAGE_STANZA);
        assert_eq!(DataMessageStanza::decode(body.as_slice()).unwrap(), stanza);
    }

    #[tokio::test]
    async fn test_oversized_packet_is_rejected() {
        // tag + varint claiming 2 MiB
        let mut framed = vec![TAG_DATA_MESSAGE_STANZA];
        let mut size = 2u64 * 1024 * 1024;
        loop {
            let byte = (size & 0x7F) as u8;
            size >>= 7;
            if size == 0 {
                framed.push(byte);
                break;
            }
            framed.push(byte | 0x80);
        }
        let mut cursor = Cursor::new(framed);
        let err = read_packet(&mut cursor).await.unwrap_err();
        assert!(matches!(err, LiveError::InvalidFrame(_)));
    }

    #[test]
    fn test_login_request_carries_persistent_ids() {
        let login = build_login_request(0xAB54A98CEB1F0AD2, 42, vec!["id-1".into(), "id-2".into()]);
        assert_eq!(login.id.as_deref(), Some("android-ab54a98ceb1f0ad2"));
        assert_eq!(login.user.as_deref(), Some("12345678901234567890"));
        assert_eq!(login.auth_token.as_deref(), Some("42"));
        assert_eq!(login.received_persistent_id.len(), 2);
        assert_eq!(login.auth_service, Some(2));
    }

    #[test]
    fn test_checkin_request_reuses_identity() {
        let profile = DeviceProfile::default();

        let fresh = build_checkin_request(&profile, None);
        assert_eq!(fresh.id, None);
        assert_eq!(fresh.security_token, None);
        assert_eq!(fresh.version, Some(3));

        let repeat = build_checkin_request(&profile, Some((7, 9)));
        assert_eq!(repeat.id, Some(7));
        assert_eq!(repeat.security_token, Some(9));
    }

    #[test]
    fn test_decode_new_message_app_data() {
        let payload = serde_json::json!({
            "messageGuid": "6f2cb2e5-96d8-4d11-92ef-000000000001",
            "conversationGuid": "aa70e3dc-33bb-48a9-a7c6-000000000002",
            "messageBody": "over the hill"
        })
        .to_string();

        let stanza = DataMessageStanza {
            app_data: vec![AppData {
                key: Some("newMessage".into()),
                value: Some(payload),
            }],
            ..Default::default()
        };

        match decode_app_data(&stanza).unwrap() {
            Some(PushEvent::NewMessage(message)) => {
                assert_eq!(message.message_body.as_deref(), Some("over the hill"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_device_message_app_data() {
        let stanza = DataMessageStanza {
            app_data: vec![AppData {
                key: Some("nonconversationalMessageExists".into()),
                value: Some("300434060123450".into()),
            }],
            ..Default::default()
        };
        assert_eq!(
            decode_app_data(&stanza).unwrap(),
            Some(PushEvent::DeviceMessage("300434060123450".into()))
        );
    }

    #[test]
    fn test_unrecognized_app_data_is_none() {
        let stanza = DataMessageStanza {
            app_data: vec![AppData {
                key: Some("somethingElse".into()),
                value: Some("x".into()),
            }],
            ..Default::default()
        };
        assert_eq!(decode_app_data(&stanza).unwrap(), None);
    }

    #[test]
    fn test_malformed_new_message_is_an_error() {
        let stanza = DataMessageStanza {
            app_data: vec![AppData {
                key: Some("newMessage".into()),
                value: Some("{not json".into()),
            }],
            ..Default::default()
        };
        assert!(decode_app_data(&stanza).is_err());
    }
}
