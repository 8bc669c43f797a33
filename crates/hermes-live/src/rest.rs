//! # REST Boundary
//!
//! The small slice of the backend's REST surface the delivery core needs:
//! conversation listings for context, status pages for catch-up, and the
//! receipt endpoints used as fallbacks when the hub is down.
//!
//! All calls carry a bearer token from the [`TokenAuthority`], which
//! transparently refreshes stale tokens before the request goes out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use hermes_core::{
    GetConversationsModel, GetUpdatedStatusesResponse, NetworkPropertiesResponse,
    UpdateMessageStatusRequest, UpdateMessageStatusResponse, UserInfoModel,
};

use crate::auth::TokenAuthority;
use crate::config::LiveConfig;
use crate::error::{LiveError, LiveResult};

/// Default page size for listing endpoints.
const DEFAULT_LIMIT: u32 = 50;

// =============================================================================
// REST Client
// =============================================================================

/// Authenticated client for the backend's REST endpoints.
#[derive(Clone)]
pub struct RestClient {
    base: String,
    http: reqwest::Client,
    auth: Arc<TokenAuthority>,
}

impl RestClient {
    /// Creates a REST client sharing the given token authority.
    pub fn new(config: &LiveConfig, auth: Arc<TokenAuthority>) -> LiveResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.api.request_timeout_secs))
            .build()
            .map_err(|e| LiveError::Internal(e.to_string()))?;

        Ok(RestClient {
            base: config.api_base().to_string(),
            http,
            auth,
        })
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// Lists conversations updated after the given date.
    pub async fn get_conversations(
        &self,
        after_date: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> LiveResult<GetConversationsModel> {
        let mut query = vec![("Limit", limit.unwrap_or(DEFAULT_LIMIT).to_string())];
        if let Some(after) = after_date {
            query.push(("AfterDate", after.to_rfc3339()));
        }
        self.do_get("Conversation/Updated", &query, "1.0").await
    }

    /// Returns member details for a conversation.
    pub async fn get_conversation_members(
        &self,
        conversation_id: Uuid,
    ) -> LiveResult<Vec<UserInfoModel>> {
        self.do_get(
            &format!("Conversation/Members/{conversation_id}"),
            &[],
            "1.0",
        )
        .await
    }

    // =========================================================================
    // Statuses
    // =========================================================================

    /// Returns status receipts changed after the given date.
    pub async fn get_updated_statuses(
        &self,
        after_date: DateTime<Utc>,
        limit: Option<u32>,
    ) -> LiveResult<GetUpdatedStatusesResponse> {
        let query = [
            ("AfterDate", after_date.to_rfc3339()),
            ("Limit", limit.unwrap_or(DEFAULT_LIMIT).to_string()),
        ];
        self.do_get("Status/Updated", &query, "1.0").await
    }

    /// Marks a message delivered over REST.
    ///
    /// Fallback path: when the hub is connected, delivery receipts ride the
    /// hub instead.
    pub async fn mark_delivered(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> LiveResult<UpdateMessageStatusResponse> {
        self.do_put::<(), _>(
            &format!("Status/Delivered/{conversation_id}/{message_id}"),
            None,
            "1.0",
        )
        .await
    }

    /// Marks a message read over REST.
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> LiveResult<UpdateMessageStatusResponse> {
        self.do_put::<(), _>(
            &format!("Status/Read/{conversation_id}/{message_id}"),
            None,
            "1.0",
        )
        .await
    }

    /// Applies a batch of status updates in one call.
    pub async fn update_message_statuses(
        &self,
        updates: &[UpdateMessageStatusRequest],
    ) -> LiveResult<Vec<UpdateMessageStatusResponse>> {
        self.do_put("Status/UpdateMessageStatuses", Some(&updates), "1.0")
            .await
    }

    // =========================================================================
    // Network Info
    // =========================================================================

    /// Returns the account's network status flags.
    pub async fn get_network_properties(&self) -> LiveResult<NetworkPropertiesResponse> {
        self.do_get("NetworkInfo/Properties", &[], "1.0").await
    }

    // =========================================================================
    // Internal HTTP Helpers
    // =========================================================================

    async fn do_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        api_version: &str,
    ) -> LiveResult<T> {
        let token = self.auth.bearer_token().await?;
        let url = format!("{}/{}", self.base, path);

        debug!(path = %path, "GET");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header("Api-Version", api_version)
            .query(query)
            .send()
            .await?;

        Self::decode("GET", path, resp).await
    }

    async fn do_put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
        api_version: &str,
    ) -> LiveResult<T> {
        let token = self.auth.bearer_token().await?;
        let url = format!("{}/{}", self.base, path);

        debug!(path = %path, "PUT");
        let mut req = self
            .http
            .put(&url)
            .bearer_auth(token)
            .header("Api-Version", api_version);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;

        Self::decode("PUT", path, resp).await
    }

    async fn decode<T: DeserializeOwned>(
        method: &'static str,
        path: &str,
        resp: reqwest::Response,
    ) -> LiveResult<T> {
        let status = resp.status();
        if !status.is_success() {
            return Err(LiveError::ApiStatus {
                method,
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| LiveError::DeserializationFailed(e.to_string()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
