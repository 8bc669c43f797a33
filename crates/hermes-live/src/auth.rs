//! # Token Authority
//!
//! Owns the session token pair and every registration endpoint.
//!
//! ## Token Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Token Lifecycle                                  │
//! │                                                                         │
//! │  request_otp ──► SMS code ──► confirm_otp ──► tokens + instance_id     │
//! │                                                    │                    │
//! │                                                    ▼                    │
//! │                                       hermes_credentials.json           │
//! │                                                    │                    │
//! │  bearer_token() ◄──────────────── resume() ◄───────┘                    │
//! │       │                                                                 │
//! │       │  expired (60s buffer)?                                          │
//! │       ▼                                                                 │
//! │  POST Registration/App/Refresh ──► new tokens ──► saved + returned      │
//! │                                                                         │
//! │  Concurrent callers of bearer_token() queue on one async lock, so a     │
//! │  refresh happens once no matter how many connections need it.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use hermes_core::{
    AppRegistrationResponse, ConfirmAppRegistrationBody, NewAppRegistrationBody,
    NewAppRegistrationResponse, OtpRequest, RefreshAuthBody, UpdateAppPnsHandleBody,
};

use crate::config::LiveConfig;
use crate::credentials::{CredentialStore, StoredCredentials};
use crate::error::{LiveError, LiveResult};

// =============================================================================
// Registration Constants
// =============================================================================

/// API key the mobile app presents on registration endpoints.
pub const REGISTRATION_API_KEY: &str = "?E2PFAzUzKx!S&1k1D";

/// Push notification environment reported at registration.
pub const PNS_ENVIRONMENT: &str = "Production";

/// Placeholder push handle used when no real push token exists yet.
/// Replaced via [`TokenAuthority::update_pns_handle`] after push registration.
pub const DEFAULT_PNS_HANDLE: &str = "cXr1bp_PSqaKHFG8W4vLHi:APA91bH8kL2xNmQpZ9vYtD5n3R7fUwXoEjKm4sCgBpV6qI0hA1dWzOyFuN8rT3lMxJvQ2bGnYk9wRcHiP7eDsUaZoL5fXtW4mBjK0vNq6SyRgCpAhD1iOuE3wTlMx";

const DEFAULT_OTP_RETRY_WAIT: Duration = Duration::from_secs(30);

// =============================================================================
// Token Authority
// =============================================================================

/// Manages the full authentication lifecycle against the backend.
///
/// Not clonable; share it with `Arc<TokenAuthority>`.
pub struct TokenAuthority {
    base: String,
    platform: String,
    http: reqwest::Client,
    store: CredentialStore,
    /// Session state. The lock is held across a refresh so concurrent
    /// callers ride on one HTTP call.
    creds: Mutex<Option<StoredCredentials>>,
    pns_handle: std::sync::Mutex<String>,
    otp_retry_wait: Duration,
}

impl TokenAuthority {
    /// Creates a token authority for the configured backend and session dir.
    pub fn new(config: &LiveConfig) -> LiveResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.request_timeout_secs))
            .build()
            .map_err(|e| LiveError::Internal(e.to_string()))?;

        Ok(TokenAuthority {
            base: config.api_base().to_string(),
            platform: config.session.platform.clone(),
            http,
            store: CredentialStore::new(&config.session_dir()),
            creds: Mutex::new(None),
            pns_handle: std::sync::Mutex::new(DEFAULT_PNS_HANDLE.to_string()),
            otp_retry_wait: DEFAULT_OTP_RETRY_WAIT,
        })
    }

    /// Restores a persisted session, refreshing the token if it is stale.
    pub async fn resume(&self) -> LiveResult<()> {
        let stored = self.store.load()?.ok_or(LiveError::Unauthenticated)?;

        debug!(
            instance_id = %stored.instance_id,
            remaining_secs = stored.remaining_secs(),
            "Resumed session credentials"
        );

        let mut guard = self.creds.lock().await;
        *guard = Some(stored);
        if guard.as_ref().is_some_and(|c| c.is_expired()) {
            self.refresh_locked(&mut guard).await?;
        }
        Ok(())
    }

    /// Returns a fresh access token, refreshing behind the lock if needed.
    pub async fn bearer_token(&self) -> LiveResult<String> {
        let mut guard = self.creds.lock().await;
        match guard.as_ref() {
            None => return Err(LiveError::Unauthenticated),
            Some(c) if c.is_expired() => {
                self.refresh_locked(&mut guard).await?;
            }
            Some(_) => {}
        }
        // refresh_locked always leaves valid credentials behind on Ok
        guard
            .as_ref()
            .map(|c| c.access_token.clone())
            .ok_or(LiveError::Unauthenticated)
    }

    /// Returns the registration instance ID of this session.
    pub async fn instance_id(&self) -> LiveResult<String> {
        let guard = self.creds.lock().await;
        guard
            .as_ref()
            .map(|c| c.instance_id.clone())
            .ok_or(LiveError::Unauthenticated)
    }

    /// Current push handle value used on registration endpoints.
    pub fn pns_handle(&self) -> String {
        self.pns_handle
            .lock()
            .map(|h| h.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }

    // =========================================================================
    // Registration Flow
    // =========================================================================

    /// Requests an SMS verification code for the given phone number.
    ///
    /// A 409 means a previous request is still outstanding; the backend
    /// refuses a new code until it lapses, so wait out the window and
    /// retry exactly once.
    pub async fn request_otp(&self, phone: &str, device_name: &str) -> LiveResult<OtpRequest> {
        debug!(phone = %phone, "Requesting SMS verification code");

        let url = format!("{}/Registration/App", self.base);
        let body = NewAppRegistrationBody {
            sms_number: phone.to_string(),
            platform: self.platform.clone(),
        };

        let mut resp = self.registration_post(&url, &body).await?;
        if resp.status() == StatusCode::CONFLICT {
            warn!(
                wait_secs = self.otp_retry_wait.as_secs(),
                "Previous verification request still active, waiting before retry"
            );
            tokio::time::sleep(self.otp_retry_wait).await;
            resp = self.registration_post(&url, &body).await?;
        }

        let resp = check_status("POST", "/Registration/App", resp)?;
        let otp: NewAppRegistrationResponse = resp.json().await?;

        debug!(request_id = %otp.request_id, "Verification code requested");

        Ok(OtpRequest {
            request_id: otp.request_id,
            phone_number: phone.to_string(),
            device_name: device_name.to_string(),
            valid_until: otp.valid_until,
            attempts_remaining: otp.attempts_remaining,
        })
    }

    /// Confirms registration with the SMS code and persists the session.
    pub async fn confirm_otp(&self, otp: &OtpRequest, code: &str) -> LiveResult<()> {
        debug!("Confirming verification code");

        let url = format!("{}/Registration/App/Confirm", self.base);
        let body = ConfirmAppRegistrationBody {
            request_id: otp.request_id.clone(),
            sms_number: otp.phone_number.clone(),
            verification_code: code.to_string(),
            platform: self.platform.clone(),
            pns_handle: self.pns_handle(),
            pns_environment: PNS_ENVIRONMENT.to_string(),
            app_description: otp.device_name.clone(),
            opt_in_for_sms: true,
        };

        let resp = self.registration_post(&url, &body).await?;
        let resp = check_status("POST", "/Registration/App/Confirm", resp)?;
        let reg: AppRegistrationResponse = resp.json().await?;

        debug!(instance_id = %reg.instance_id, "Registration successful");

        let mut guard = self.creds.lock().await;
        self.store_locked(&mut guard, reg)?;
        Ok(())
    }

    /// Updates the push handle on the existing registration.
    pub async fn update_pns_handle(&self, handle: &str, app_description: &str) -> LiveResult<()> {
        debug!("Updating push handle on registration");

        let token = self.bearer_token().await?;
        let url = format!("{}/Registration/App", self.base);
        let body = UpdateAppPnsHandleBody {
            pns_handle: handle.to_string(),
            pns_environment: PNS_ENVIRONMENT.to_string(),
            app_description: app_description.to_string(),
        };

        let resp = self
            .http
            .patch(&url)
            .bearer_auth(token)
            .header("Api-Version", "1.0")
            .json(&body)
            .send()
            .await?;
        check_status("PATCH", "/Registration/App", resp)?;

        if let Ok(mut h) = self.pns_handle.lock() {
            *h = handle.to_string();
        }
        Ok(())
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Refreshes the token pair. Must run with the creds lock held.
    async fn refresh_locked(
        &self,
        guard: &mut tokio::sync::MutexGuard<'_, Option<StoredCredentials>>,
    ) -> LiveResult<()> {
        let current = guard.as_ref().ok_or(LiveError::Unauthenticated)?;

        debug!("Refreshing access token");

        let url = format!("{}/Registration/App/Refresh", self.base);
        let body = RefreshAuthBody {
            refresh_token: current.refresh_token.clone(),
            instance_id: current.instance_id.clone(),
        };

        let resp = self
            .http
            .post(&url)
            .header("Api-Version", "1.0")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_client_error() {
            // The backend invalidated this session. Only a new registration
            // can recover, so surface a terminal error.
            return Err(LiveError::RefreshFailed {
                status: status.as_u16(),
            });
        }
        let resp = check_status("POST", "/Registration/App/Refresh", resp)?;
        let reg: AppRegistrationResponse = resp.json().await?;

        self.store_locked(guard, reg)?;
        Ok(())
    }

    fn store_locked(
        &self,
        guard: &mut tokio::sync::MutexGuard<'_, Option<StoredCredentials>>,
        reg: AppRegistrationResponse,
    ) -> LiveResult<()> {
        let creds =
            StoredCredentials::from_tokens(&reg.access_and_refresh_token, reg.instance_id);
        self.store.save(&creds)?;
        **guard = Some(creds);
        Ok(())
    }

    async fn registration_post<B: serde::Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> LiveResult<reqwest::Response> {
        Ok(self
            .http
            .post(url)
            .header("RegistrationApiKey", REGISTRATION_API_KEY)
            .header("Api-Version", "1.0")
            .json(body)
            .send()
            .await?)
    }
}

fn check_status(
    method: &'static str,
    path: &str,
    resp: reqwest::Response,
) -> LiveResult<reqwest::Response> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(LiveError::ApiStatus {
            method,
            path: path.to_string(),
            status: resp.status().as_u16(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server_url: &str, dir: &std::path::Path) -> LiveConfig {
        let mut config = LiveConfig::default();
        config.api.base_url = server_url.to_string();
        config.session.session_dir = Some(dir.to_path_buf());
        config
    }

    fn expired_creds() -> StoredCredentials {
        StoredCredentials {
            access_token: "stale".into(),
            refresh_token: "rt-1".into(),
            instance_id: "inst-1".into(),
            expires_at: 0.0,
        }
    }

    fn refresh_response() -> serde_json::Value {
        serde_json::json!({
            "instanceId": "inst-1",
            "accessAndRefreshToken": {
                "accessToken": "fresh",
                "refreshToken": "rt-2",
                "expiresIn": 3600
            }
        })
    }

    #[tokio::test]
    async fn test_resume_without_session_is_unauthenticated() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config("https://unused.invalid", dir.path());
        let auth = TokenAuthority::new(&config).unwrap();
        let err = auth.resume().await.unwrap_err();
        assert!(err.is_auth_error());
    }

    #[tokio::test]
    async fn test_refresh_is_single_flight() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/Registration/App/Refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(refresh_response())
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), dir.path());
        CredentialStore::new(dir.path()).save(&expired_creds()).unwrap();

        let auth = Arc::new(TokenAuthority::new(&config).unwrap());
        {
            let mut guard = auth.creds.lock().await;
            *guard = Some(expired_creds());
        }

        let mut handles = Vec::new();
        for _ in 0..5 {
            let auth = Arc::clone(&auth);
            handles.push(tokio::spawn(async move { auth.bearer_token().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "fresh");
        }
        // mock's expect(1) verifies exactly one refresh call on drop
    }

    #[tokio::test]
    async fn test_refresh_rejection_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/Registration/App/Refresh"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), dir.path());
        CredentialStore::new(dir.path()).save(&expired_creds()).unwrap();
        let auth = TokenAuthority::new(&config).unwrap();
        {
            let mut guard = auth.creds.lock().await;
            *guard = Some(expired_creds());
        }

        let err = auth.bearer_token().await.unwrap_err();
        assert!(matches!(err, LiveError::RefreshFailed { status: 401 }));
        assert!(err.is_auth_error());

        // the rejected refresh must leave the session exactly as it was
        {
            let guard = auth.creds.lock().await;
            assert_eq!(guard.as_ref().unwrap().access_token, "stale");
        }
        let on_disk = CredentialStore::new(dir.path()).load().unwrap().unwrap();
        assert_eq!(on_disk.access_token, "stale");
        assert_eq!(on_disk.refresh_token, "rt-1");
    }

    #[tokio::test]
    async fn test_request_otp_retries_once_on_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/Registration/App"))
            .respond_with(ResponseTemplate::new(409))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/Registration/App"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "requestId": "req-7",
                "attemptsRemaining": 3
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), dir.path());
        let mut auth = TokenAuthority::new(&config).unwrap();
        auth.otp_retry_wait = Duration::from_millis(10);

        let otp = auth.request_otp("+15555550100", "test-device").await.unwrap();
        assert_eq!(otp.request_id, "req-7");
        assert_eq!(otp.phone_number, "+15555550100");
        assert_eq!(otp.attempts_remaining, Some(3));
    }

    #[tokio::test]
    async fn test_confirm_otp_persists_session() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/Registration/App/Confirm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(refresh_response()))
            .mount(&server)
            .await;

        let config = test_config(&server.uri(), dir.path());
        let auth = TokenAuthority::new(&config).unwrap();
        let otp = OtpRequest {
            request_id: "req-1".into(),
            phone_number: "+15555550100".into(),
            device_name: "test-device".into(),
            valid_until: None,
            attempts_remaining: None,
        };

        auth.confirm_otp(&otp, "123456").await.unwrap();
        assert_eq!(auth.bearer_token().await.unwrap(), "fresh");

        let on_disk = CredentialStore::new(dir.path()).load().unwrap().unwrap();
        assert_eq!(on_disk.instance_id, "inst-1");
        assert_eq!(on_disk.access_token, "fresh");
    }
}
