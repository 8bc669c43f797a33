//! # Wire Models
//!
//! Payload shapes exchanged with the Hermes backend over REST, the realtime
//! hub, and the push channel.
//!
//! ## Model Groups
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Wire Models                                     │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  MessageModel   │   │ Conversation    │   │  Registration   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  message_id     │   │  conversation_id│   │  request_id     │       │
//! │  │  body, media    │   │  member_ids     │   │  tokens         │       │
//! │  │  location       │   │  muted flag     │   │  instance_id    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  StatusReceipt  │   │ Hub event DTOs  │   │  MessageStatus  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  user_id        │   │  status update  │   │  Sent           │       │
//! │  │  status         │   │  mute update    │   │  Delivered      │       │
//! │  │  updated_at     │   │  block update   │   │  Read ...       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Spelling Decode
//! The REST API spells message identity `messageId`/`conversationId`; the
//! push channel spells the same fields `messageGuid`/`conversationGuid` and
//! sends `""` for absent parents. [`MessageModel`] decodes both spellings,
//! preferring the push spelling when present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Identity Derivation
// =============================================================================

/// UUID v5 namespace the backend uses to derive user identifiers from
/// phone numbers.
pub const USER_NAMESPACE: Uuid = Uuid::from_u128(0x65F85187_FAE9_4211_90D9_8F534AFA231B);

/// Derives a user's backend UUID from their phone number.
///
/// The backend has no explicit "look up user by phone" endpoint; user IDs
/// are UUID v5 hashes of the E.164 phone number under [`USER_NAMESPACE`].
pub fn phone_to_user_id(phone: &str) -> Uuid {
    Uuid::new_v5(&USER_NAMESPACE, phone.as_bytes())
}

// =============================================================================
// Enums
// =============================================================================

/// The kind of device a message was sent from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    MessengerApp,
    #[serde(rename = "inReach")]
    InReach,
    External,
    GarminOSApp,
    #[serde(other)]
    Unknown,
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageStatus {
    Initialized,
    Processing,
    Sent,
    Delivered,
    Read,
    Undeliverable,
    RetryableError,
    Deleted,
    Expired,
    Uninitialized,
}

/// Semantic type of a message beyond plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    MapShare,
    ReferencePoint,
    #[serde(other)]
    Unknown,
}

/// Media attachment encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    ImageAvif,
    AudioOgg,
}

// =============================================================================
// Shared Sub-Models
// =============================================================================

/// GPS coordinates and motion data attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude_degrees: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude_degrees: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_velocity_meters_per_second: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_degrees: Option<f64>,
}

/// A delivery/read receipt for a message, per recipient device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReceipt {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_or_device_instance_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    pub message_status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Identifies a message within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundMessageId {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
}

/// Dimensions and duration for media attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i32>,
}

// =============================================================================
// Message Model
// =============================================================================

/// The full message shape delivered by the hub's `ReceiveMessage` event,
/// the push channel's payload, and some REST endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageModel {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_body: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<StatusReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_location: Option<UserLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_point: Option<UserLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_share_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_share_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_track_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_device_type: Option<DeviceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_metadata: Option<MediaMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ota_uuid: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_unit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intended_unit_id: Option<String>,
}

impl MessageModel {
    /// The compound identity of this message.
    pub fn compound_id(&self) -> CompoundMessageId {
        CompoundMessageId {
            message_id: self.message_id,
            conversation_id: self.conversation_id,
        }
    }
}

// Push notifications spell identity fields `*Guid` and send "" for absent
// parents; REST spells them `*Id`. Decode accepts both, preferring `*Guid`.
impl<'de> Deserialize<'de> for MessageModel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Wire {
            #[serde(default)]
            message_id: Option<Uuid>,
            #[serde(default)]
            conversation_id: Option<Uuid>,
            #[serde(default)]
            parent_message_id: Option<Uuid>,
            #[serde(default)]
            message_guid: Option<String>,
            #[serde(default)]
            conversation_guid: Option<String>,
            #[serde(default)]
            parent_message_guid: Option<String>,
            #[serde(default)]
            message_body: Option<String>,
            #[serde(default)]
            to: Vec<String>,
            #[serde(default)]
            from: Option<String>,
            #[serde(default)]
            sent_at: Option<DateTime<Utc>>,
            #[serde(default)]
            received_at: Option<DateTime<Utc>>,
            #[serde(default)]
            status: Vec<StatusReceipt>,
            #[serde(default)]
            user_location: Option<UserLocation>,
            #[serde(default)]
            reference_point: Option<UserLocation>,
            #[serde(default)]
            message_type: Option<MessageKind>,
            #[serde(default)]
            map_share_url: Option<String>,
            #[serde(default)]
            map_share_password: Option<String>,
            #[serde(default)]
            live_track_url: Option<String>,
            #[serde(default)]
            from_device_type: Option<DeviceType>,
            #[serde(default)]
            media_id: Option<Uuid>,
            #[serde(default)]
            media_type: Option<MediaType>,
            #[serde(default)]
            media_metadata: Option<MediaMetadata>,
            #[serde(default)]
            uuid: Option<Uuid>,
            #[serde(default)]
            transcription: Option<String>,
            #[serde(default)]
            ota_uuid: Option<Uuid>,
            #[serde(default)]
            from_unit_id: Option<String>,
            #[serde(default)]
            intended_unit_id: Option<String>,
        }

        fn parse_guid<E: serde::de::Error>(field: &str, value: &str) -> Result<Uuid, E> {
            Uuid::parse_str(value)
                .map_err(|e| E::custom(format_args!("parsing {field}: {e}")))
        }

        let w = Wire::deserialize(deserializer)?;

        let mut message_id = w.message_id.unwrap_or_else(Uuid::nil);
        let mut conversation_id = w.conversation_id.unwrap_or_else(Uuid::nil);
        let mut parent_message_id = w.parent_message_id;

        if let Some(g) = w.message_guid.as_deref().filter(|s| !s.is_empty()) {
            message_id = parse_guid("messageGuid", g)?;
        }
        if let Some(g) = w.conversation_guid.as_deref().filter(|s| !s.is_empty()) {
            conversation_id = parse_guid("conversationGuid", g)?;
        }
        if let Some(g) = w.parent_message_guid.as_deref().filter(|s| !s.is_empty()) {
            parent_message_id = Some(parse_guid("parentMessageGuid", g)?);
        }

        Ok(MessageModel {
            message_id,
            conversation_id,
            parent_message_id,
            message_body: w.message_body,
            to: w.to,
            from: w.from,
            sent_at: w.sent_at,
            received_at: w.received_at,
            status: w.status,
            user_location: w.user_location,
            reference_point: w.reference_point,
            message_type: w.message_type,
            map_share_url: w.map_share_url,
            map_share_password: w.map_share_password,
            live_track_url: w.live_track_url,
            from_device_type: w.from_device_type,
            media_id: w.media_id,
            media_type: w.media_type,
            media_metadata: w.media_metadata,
            uuid: w.uuid,
            transcription: w.transcription,
            ota_uuid: w.ota_uuid,
            from_unit_id: w.from_unit_id,
            intended_unit_id: w.intended_unit_id,
        })
    }
}

// =============================================================================
// Conversation Models
// =============================================================================

/// Metadata about a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetaModel {
    pub conversation_id: Uuid,
    pub member_ids: Vec<String>,
    pub updated_date: DateTime<Utc>,
    pub created_date: DateTime<Utc>,
    pub is_muted: bool,
    pub is_post: bool,
}

/// Response page from `GET Conversation/Updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetConversationsModel {
    pub conversations: Vec<ConversationMetaModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_conversation_id: Option<Uuid>,
}

/// Member info within a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

// The backend sends "" for members without an avatar; normalize to None.
impl<'de> Deserialize<'de> for UserInfoModel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Wire {
            #[serde(default)]
            user_identifier: Option<String>,
            #[serde(default)]
            address: Option<String>,
            #[serde(default)]
            friendly_name: Option<String>,
            #[serde(default)]
            image_url: Option<String>,
        }

        let w = Wire::deserialize(deserializer)?;
        Ok(UserInfoModel {
            user_identifier: w.user_identifier,
            address: w.address,
            friendly_name: w.friendly_name,
            image_url: w.image_url.filter(|s| !s.is_empty()),
        })
    }
}

// =============================================================================
// Status Models
// =============================================================================

/// A single item for `PUT Status/UpdateMessageStatuses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessageStatusRequest {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub message_status: MessageStatus,
}

/// Response item from status update endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessageStatusResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
}

/// Status receipts for a single message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReceiptsForMessage {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_receipts: Vec<StatusReceipt>,
}

/// Response page from `GET Status/Updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUpdatedStatusesResponse {
    pub status_receipts_for_messages: Vec<StatusReceiptsForMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<Uuid>,
}

// =============================================================================
// Network / Registration Maintenance Models
// =============================================================================

/// Response from `GET NetworkInfo/Properties`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPropertiesResponse {
    pub data_constrained: bool,
    pub enables_premium_messaging: bool,
}

/// Request body for `PATCH Registration/App` (push handle update).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppPnsHandleBody {
    pub pns_handle: String,
    pub pns_environment: String,
    pub app_description: String,
}

// =============================================================================
// Auth Models
// =============================================================================

/// The JWT token pair issued by registration and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessAndRefreshToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Request body for `POST Registration/App`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppRegistrationBody {
    pub sms_number: String,
    pub platform: String,
}

/// Response from `POST Registration/App`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppRegistrationResponse {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<i32>,
}

/// A pending one-time-passcode request awaiting SMS confirmation.
///
/// Serialized with snake_case keys: this shape is persisted locally between
/// the request and confirm steps, it never goes over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpRequest {
    pub request_id: String,
    pub phone_number: String,
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<i32>,
}

/// Request body for `POST Registration/App/Confirm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmAppRegistrationBody {
    pub request_id: String,
    pub sms_number: String,
    pub verification_code: String,
    pub platform: String,
    pub pns_handle: String,
    pub pns_environment: String,
    pub app_description: String,
    pub opt_in_for_sms: bool,
}

/// SMS opt-in outcome reported by registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsOptInResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<bool>,
}

/// Response from `POST Registration/App/Confirm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRegistrationResponse {
    pub instance_id: String,
    pub access_and_refresh_token: AccessAndRefreshToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms_opt_in_result: Option<SmsOptInResult>,
}

/// Request body for `POST Registration/App/Refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshAuthBody {
    pub refresh_token: String,
    pub instance_id: String,
}

// =============================================================================
// Hub Event Models
// =============================================================================

/// A message status change pushed over the hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatusUpdate {
    pub message_id: CompoundMessageId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_instance_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_status: Option<MessageStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// The hub spells the status field "messageStatus" on some events and
// "status" on others. Accept both, preferring "messageStatus".
impl<'de> Deserialize<'de> for MessageStatusUpdate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Wire {
            message_id: CompoundMessageId,
            #[serde(default)]
            user_id: Option<Uuid>,
            #[serde(default)]
            device_instance_id: Option<Uuid>,
            #[serde(default)]
            device_type: Option<DeviceType>,
            #[serde(default)]
            message_status: Option<MessageStatus>,
            #[serde(default)]
            status: Option<MessageStatus>,
            #[serde(default)]
            updated_at: Option<DateTime<Utc>>,
        }

        let w = Wire::deserialize(deserializer)?;
        Ok(MessageStatusUpdate {
            message_id: w.message_id,
            user_id: w.user_id,
            device_instance_id: w.device_instance_id,
            device_type: w.device_type,
            message_status: w.message_status.or(w.status),
            updated_at: w.updated_at,
        })
    }
}

/// A conversation mute toggle pushed over the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMuteStatusUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_muted: Option<bool>,
}

/// A user block toggle pushed over the hub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBlockStatusUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_blocked: Option<bool>,
}

/// A server-initiated notification pushed over the hub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerNotification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn msg_id() -> Uuid {
        Uuid::parse_str("6f2cb2e5-96d8-4d11-92ef-000000000001").unwrap()
    }

    fn conv_id() -> Uuid {
        Uuid::parse_str("aa70e3dc-33bb-48a9-a7c6-000000000002").unwrap()
    }

    #[test]
    fn test_phone_to_user_id_known_vector() {
        assert_eq!(
            phone_to_user_id("+15555550100").to_string(),
            "11153808-b0a5-5f9b-bbcf-b35be7e4359e"
        );
    }

    #[test]
    fn test_phone_to_user_id_is_v5_and_deterministic() {
        let a = phone_to_user_id("+15551234567");
        let b = phone_to_user_id("+15551234567");
        assert_eq!(a, b);
        assert_eq!(a.get_version_num(), 5);
        assert_ne!(a, phone_to_user_id("+15559876543"));
    }

    #[test]
    fn test_message_decodes_rest_spelling() {
        let json = format!(
            r#"{{"messageId":"{}","conversationId":"{}","messageBody":"hi"}}"#,
            msg_id(),
            conv_id()
        );
        let m: MessageModel = serde_json::from_str(&json).unwrap();
        assert_eq!(m.message_id, msg_id());
        assert_eq!(m.conversation_id, conv_id());
        assert_eq!(m.message_body.as_deref(), Some("hi"));
    }

    #[test]
    fn test_message_decodes_push_spelling() {
        let json = format!(
            r#"{{"messageGuid":"{}","conversationGuid":"{}","parentMessageGuid":""}}"#,
            msg_id(),
            conv_id()
        );
        let m: MessageModel = serde_json::from_str(&json).unwrap();
        assert_eq!(m.message_id, msg_id());
        assert_eq!(m.conversation_id, conv_id());
        // empty string means no parent
        assert_eq!(m.parent_message_id, None);
    }

    #[test]
    fn test_message_prefers_guid_spelling_when_both_present() {
        let other = Uuid::parse_str("00000000-0000-0000-0000-0000000000aa").unwrap();
        let json = format!(
            r#"{{"messageId":"{}","messageGuid":"{}","conversationId":"{}"}}"#,
            other,
            msg_id(),
            conv_id()
        );
        let m: MessageModel = serde_json::from_str(&json).unwrap();
        assert_eq!(m.message_id, msg_id());
    }

    #[test]
    fn test_message_invalid_guid_is_an_error() {
        let err = serde_json::from_str::<MessageModel>(
            r#"{"messageGuid":"not-a-uuid","conversationGuid":""}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("messageGuid"));
    }

    #[test]
    fn test_status_update_accepts_both_status_keys() {
        let base = format!(
            r#""messageId":{{"messageId":"{}","conversationId":"{}"}}"#,
            msg_id(),
            conv_id()
        );

        let u: MessageStatusUpdate =
            serde_json::from_str(&format!(r#"{{{},"messageStatus":"Read"}}"#, base)).unwrap();
        assert_eq!(u.message_status, Some(MessageStatus::Read));

        let u: MessageStatusUpdate =
            serde_json::from_str(&format!(r#"{{{},"status":"Delivered"}}"#, base)).unwrap();
        assert_eq!(u.message_status, Some(MessageStatus::Delivered));

        // messageStatus wins when both are present
        let u: MessageStatusUpdate = serde_json::from_str(&format!(
            r#"{{{},"status":"Delivered","messageStatus":"Read"}}"#,
            base
        ))
        .unwrap();
        assert_eq!(u.message_status, Some(MessageStatus::Read));
    }

    #[test]
    fn test_user_info_empty_image_url_is_none() {
        let u: UserInfoModel =
            serde_json::from_str(r#"{"friendlyName":"Sam","imageUrl":""}"#).unwrap();
        assert_eq!(u.friendly_name.as_deref(), Some("Sam"));
        assert_eq!(u.image_url, None);
    }

    #[test]
    fn test_device_type_unknown_values_decode() {
        let d: DeviceType = serde_json::from_str(r#""inReach""#).unwrap();
        assert_eq!(d, DeviceType::InReach);
        let d: DeviceType = serde_json::from_str(r#""SomeFutureDevice""#).unwrap();
        assert_eq!(d, DeviceType::Unknown);
    }

    #[test]
    fn test_status_receipt_round_trip() {
        let receipt = StatusReceipt {
            user_id: "user-1".into(),
            app_or_device_instance_id: None,
            device_type: Some(DeviceType::MessengerApp),
            message_status: MessageStatus::Delivered,
            updated_at: None,
        };
        let json = serde_json::to_string(&receipt).unwrap();
        assert!(json.contains(r#""messageStatus":"Delivered""#));
        assert!(!json.contains("updatedAt"));
        let back: StatusReceipt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, receipt);
    }

    #[test]
    fn test_registration_response_decodes() {
        let json = r#"{
            "instanceId": "inst-123",
            "accessAndRefreshToken": {
                "accessToken": "at",
                "refreshToken": "rt",
                "expiresIn": 3600
            }
        }"#;
        let resp: AppRegistrationResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.instance_id, "inst-123");
        assert_eq!(resp.access_and_refresh_token.expires_in, 3600);
        assert_eq!(resp.sms_opt_in_result, None);
    }
}
