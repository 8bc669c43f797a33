//! # Push Transport
//!
//! One-shot catch-up listener over the vendor push channel. The transport
//! registers the device (check-in plus token registration, cached between
//! runs), then holds a framed TLS stream open: login, heartbeats, data
//! stanzas. It never reconnects on its own; `listen` returns the failure and
//! the coordinator decides what happens next.
//!
//! ## Session Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  register():  cached token? ──yes──▶ done                               │
//! │                   │ no                                                  │
//! │                   ▼                                                     │
//! │               check-in (protobuf POST) ──▶ device id + security token   │
//! │                   ▼                                                     │
//! │               token registration (form POST) ──▶ push token             │
//! │                                                                         │
//! │  listen():    TCP/TLS ──▶ LoginRequest(+acked ids) ──▶ LoginResponse    │
//! │                   ▼                                                     │
//! │               read loop: data stanzas ──▶ handler                       │
//! │                          heartbeat ping every 5 min                     │
//! │               exit on cancel, server close, or stream error             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every processed stanza's persistent id is recorded and acknowledged on
//! the next login, so the server replays anything we missed in between.

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use prost::Message;

use crate::config::{LiveConfig, PushSettings};
use crate::error::{LiveError, LiveResult};
use crate::pushwire::{
    self, AndroidCheckinResponse, DataMessageStanza, DeviceProfile, HeartbeatAck, HeartbeatPing,
    LoginResponse, PushEvent, StreamErrorStanza, TAG_CLOSE, TAG_DATA_MESSAGE_STANZA,
    TAG_HEARTBEAT_ACK, TAG_HEARTBEAT_PING, TAG_LOGIN_REQUEST, TAG_LOGIN_RESPONSE,
    TAG_STREAM_ERROR_STANZA,
};

const PUSH_CREDENTIALS_FILE: &str = "push_credentials.json";

/// Most recent stanza ids kept for acknowledgement. Oldest pruned first.
const MAX_PERSISTENT_IDS: usize = 200;

/// App version code reported at token registration.
const APP_VERSION_CODE: &str = "160500";

// =============================================================================
// State & Credentials
// =============================================================================

/// Push channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    /// No usable registration yet.
    CheckedOut,
    CheckingIn,
    LoggingIn,
    Active,
}

/// Cached device registration plus the ids of stanzas already processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushCredentials {
    pub android_id: u64,
    pub security_token: u64,
    pub token: String,
    #[serde(default)]
    pub persistent_ids: Vec<String>,
}

/// Reads and writes `push_credentials.json` under the session directory.
#[derive(Debug, Clone)]
struct PushCredentialStore {
    path: std::path::PathBuf,
}

impl PushCredentialStore {
    fn new(session_dir: &Path) -> Self {
        PushCredentialStore {
            path: session_dir.join(PUSH_CREDENTIALS_FILE),
        }
    }

    fn load(&self) -> LiveResult<Option<PushCredentials>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LiveError::CredentialStore(e.to_string())),
        };
        let creds = serde_json::from_str(&data).map_err(|e| {
            LiveError::CredentialStore(format!("parsing {PUSH_CREDENTIALS_FILE}: {e}"))
        })?;
        Ok(Some(creds))
    }

    fn save(&self, creds: &PushCredentials) -> LiveResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LiveError::CredentialStore(e.to_string()))?;
        }
        let data = serde_json::to_string_pretty(creds)
            .map_err(|e| LiveError::CredentialStore(e.to_string()))?;
        std::fs::write(&self.path, data).map_err(|e| LiveError::CredentialStore(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| LiveError::CredentialStore(e.to_string()))?;
        }
        Ok(())
    }
}

// =============================================================================
// Push Transport
// =============================================================================

pub type PushEventHandler = Arc<dyn Fn(PushEvent) + Send + Sync>;
pub type PushLifecycleHandler = Arc<dyn Fn() + Send + Sync>;

pub struct PushTransport {
    settings: PushSettings,
    profile: DeviceProfile,
    http: reqwest::Client,
    store: PushCredentialStore,
    state: RwLock<PushState>,
    on_message: Mutex<Option<PushEventHandler>>,
    on_connected: Mutex<Option<PushLifecycleHandler>>,
    creds: tokio::sync::Mutex<Option<PushCredentials>>,
}

impl PushTransport {
    pub fn new(config: &LiveConfig) -> LiveResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.api.request_timeout_secs))
            .build()
            .map_err(|e| LiveError::Internal(e.to_string()))?;

        Ok(PushTransport {
            settings: config.push.clone(),
            profile: DeviceProfile::default(),
            http,
            store: PushCredentialStore::new(&config.session_dir()),
            state: RwLock::new(PushState::CheckedOut),
            on_message: Mutex::new(None),
            on_connected: Mutex::new(None),
            creds: tokio::sync::Mutex::new(None),
        })
    }

    /// Current channel state.
    pub fn state(&self) -> PushState {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(_) => PushState::CheckedOut,
        }
    }

    /// Whether a registration with a token is already on disk. Cheap enough
    /// to gate a catch-up attempt on without touching the network.
    pub fn has_cached_registration(&self) -> bool {
        matches!(self.store.load(), Ok(Some(creds)) if !creds.token.is_empty())
    }

    /// Registers the handler for decoded push events. Call before `listen`.
    pub fn on_message(&self, handler: PushEventHandler) {
        if let Ok(mut guard) = self.on_message.lock() {
            *guard = Some(handler);
        }
    }

    /// Registers a handler fired once login succeeds.
    pub fn on_connected(&self, handler: PushLifecycleHandler) {
        if let Ok(mut guard) = self.on_connected.lock() {
            *guard = Some(handler);
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Returns the push token, registering the device first if no cached
    /// token exists.
    pub async fn register(&self) -> LiveResult<String> {
        let mut creds = self.creds.lock().await;
        if creds.is_none() {
            *creds = self.store.load()?;
        }
        if let Some(existing) = creds.as_ref() {
            if !existing.token.is_empty() {
                debug!("Reusing cached push registration");
                return Ok(existing.token.clone());
            }
        }

        self.set_state(PushState::CheckingIn);
        let identity = creds
            .as_ref()
            .map(|c| (c.android_id, c.security_token));
        let (android_id, security_token) = self.checkin(identity).await?;
        let token = self.register_token(android_id, security_token).await?;

        let persistent_ids = creds
            .take()
            .map(|c| c.persistent_ids)
            .unwrap_or_default();
        let new_creds = PushCredentials {
            android_id,
            security_token,
            token: token.clone(),
            persistent_ids,
        };
        self.store.save(&new_creds)?;
        *creds = Some(new_creds);

        info!(android_id = android_id, "Push registration complete");
        Ok(token)
    }

    /// Device check-in. Reuses a previous identity when one exists so the
    /// server hands back the same device id.
    async fn checkin(&self, identity: Option<(u64, u64)>) -> LiveResult<(u64, u64)> {
        let request = pushwire::build_checkin_request(&self.profile, identity);
        debug!(url = %self.settings.checkin_url, "Push check-in");

        let resp = self
            .http
            .post(&self.settings.checkin_url)
            .header("Content-Type", "application/x-protobuf")
            .body(request.encode_to_vec())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LiveError::ApiStatus {
                method: "POST",
                path: "checkin".into(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(LiveError::from)?;
        let decoded = AndroidCheckinResponse::decode(body.as_ref())?;
        match (decoded.android_id, decoded.security_token) {
            (Some(android_id), Some(security_token)) => Ok((android_id, security_token)),
            _ => Err(LiveError::InvalidFrame(
                "check-in response missing device identity".into(),
            )),
        }
    }

    /// Token registration against the c2dm endpoint. The response body is
    /// `token=<value>` on success or `Error=<code>` on failure.
    async fn register_token(&self, android_id: u64, security_token: u64) -> LiveResult<String> {
        let instance_id = generate_instance_id();
        let gms = self.profile.gms_version.to_string();
        let device = android_id.to_string();
        let osv = self.profile.sdk_version.to_string();
        let cliv = format!("iid-{}", self.profile.chrome_version);

        let form = [
            ("app", self.settings.app_package.as_str()),
            ("sender", self.settings.sender_id.as_str()),
            ("device", device.as_str()),
            ("cert", self.settings.apk_cert_sha1.as_str()),
            ("app_ver", APP_VERSION_CODE),
            ("gcm_ver", gms.as_str()),
            ("X-scope", "GCM"),
            ("X-appid", instance_id.as_str()),
            ("X-osv", osv.as_str()),
            ("X-gmsv", gms.as_str()),
            ("X-cliv", cliv.as_str()),
        ];

        debug!(url = %self.settings.register_url, "Push token registration");
        let resp = self
            .http
            .post(&self.settings.register_url)
            .header(
                "Authorization",
                format!("AidLogin {android_id}:{security_token}"),
            )
            .header(
                "User-Agent",
                format!(
                    "Android-GCM/1.5 ({} {})",
                    self.profile.device, self.profile.model
                ),
            )
            .header("app", &self.settings.app_package)
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.map_err(LiveError::from)?;
        if !status.is_success() {
            return Err(LiveError::ApiStatus {
                method: "POST",
                path: "register".into(),
                status: status.as_u16(),
            });
        }

        match body.strip_prefix("token=") {
            Some(token) => Ok(token.trim().to_string()),
            None => Err(LiveError::CatchupUnavailable(format!(
                "token registration rejected: {body}"
            ))),
        }
    }

    // =========================================================================
    // Listening
    // =========================================================================

    /// Connects and processes stanzas until cancelled or the stream fails.
    /// A clean cancellation returns `Ok(())`; everything else returns the
    /// error so the caller can decide.
    pub async fn listen(&self, cancel: &CancellationToken) -> LiveResult<()> {
        let (android_id, security_token, acked_ids) = {
            let mut creds = self.creds.lock().await;
            if creds.is_none() {
                *creds = self.store.load()?;
            }
            let Some(existing) = creds.as_ref() else {
                return Err(LiveError::CatchupUnavailable(
                    "no push registration, call register first".into(),
                ));
            };
            if existing.token.is_empty() {
                return Err(LiveError::CatchupUnavailable(
                    "push registration has no token".into(),
                ));
            }
            (
                existing.android_id,
                existing.security_token,
                existing.persistent_ids.clone(),
            )
        };

        self.set_state(PushState::LoggingIn);
        debug!(endpoint = %self.settings.endpoint, "Connecting push stream");
        let tcp = TcpStream::connect(&self.settings.endpoint).await?;

        let result = if self.settings.use_tls {
            let domain = self
                .settings
                .endpoint
                .split(':')
                .next()
                .unwrap_or(&self.settings.endpoint)
                .to_string();
            let connector = tokio_native_tls::native_tls::TlsConnector::new()
                .map_err(|e| LiveError::TlsError(e.to_string()))?;
            let tls = tokio_native_tls::TlsConnector::from(connector)
                .connect(&domain, tcp)
                .await
                .map_err(|e| LiveError::TlsError(e.to_string()))?;
            self.run_stream(tls, android_id, security_token, acked_ids, cancel)
                .await
        } else {
            self.run_stream(tcp, android_id, security_token, acked_ids, cancel)
                .await
        };

        self.set_state(PushState::CheckedOut);
        result
    }

    async fn run_stream<S>(
        &self,
        stream: S,
        android_id: u64,
        security_token: u64,
        acked_ids: Vec<String>,
        cancel: &CancellationToken,
    ) -> LiveResult<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);

        // Dedicated writer task so heartbeats and acks never block the read
        // loop. Closing the channel ends it.
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(16);
        let heartbeat_secs = self.settings.heartbeat_interval_secs;
        let writer_task = tokio::spawn(async move {
            let mut heartbeat =
                tokio::time::interval(std::time::Duration::from_secs(heartbeat_secs));
            heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            heartbeat.tick().await; // first tick fires immediately, skip it
            loop {
                tokio::select! {
                    outgoing = rx.recv() => {
                        let Some(packet) = outgoing else { break };
                        if writer.write_all(&packet).await.is_err() {
                            break;
                        }
                    }
                    _ = heartbeat.tick() => {
                        let ping = pushwire::encode_packet(
                            TAG_HEARTBEAT_PING, &HeartbeatPing::default(), false);
                        if writer.write_all(&ping).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let login = pushwire::build_login_request(android_id, security_token, acked_ids);
        let login_packet = pushwire::encode_packet(TAG_LOGIN_REQUEST, &login, true);
        tx.send(login_packet)
            .await
            .map_err(|_| LiveError::ChannelError("push writer gone".into()))?;

        let result = self.read_loop(&mut reader, &tx, cancel).await;

        drop(tx);
        writer_task.abort();
        result
    }

    async fn read_loop<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
        tx: &mpsc::Sender<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> LiveResult<()> {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            version = pushwire::read_version(reader) => version?,
        }

        loop {
            let (tag, body) = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                packet = pushwire::read_packet(reader) => packet?,
            };

            match tag {
                TAG_LOGIN_RESPONSE => {
                    let resp = LoginResponse::decode(body.as_slice())?;
                    info!(id = resp.id.as_deref().unwrap_or(""), "Push login accepted");
                    // acked ids were delivered with the login, drop them
                    self.clear_acked_ids().await?;
                    self.set_state(PushState::Active);
                    let handler = self.on_connected.lock().ok().and_then(|g| g.clone());
                    if let Some(handler) = handler {
                        handler();
                    }
                }
                TAG_HEARTBEAT_PING => {
                    let ack =
                        pushwire::encode_packet(TAG_HEARTBEAT_ACK, &HeartbeatAck::default(), false);
                    tx.send(ack)
                        .await
                        .map_err(|_| LiveError::ChannelError("push writer gone".into()))?;
                }
                TAG_HEARTBEAT_ACK => {
                    debug!("Push heartbeat acknowledged");
                }
                TAG_DATA_MESSAGE_STANZA => {
                    let stanza = DataMessageStanza::decode(body.as_slice())?;
                    self.handle_stanza(&stanza).await?;
                }
                TAG_CLOSE => {
                    return Err(LiveError::Disconnected("push"));
                }
                TAG_STREAM_ERROR_STANZA => {
                    let error = StreamErrorStanza::decode(body.as_slice())?;
                    return Err(LiveError::PushStreamError {
                        code: error.r#type.unwrap_or_default(),
                        text: error.text.unwrap_or_default(),
                    });
                }
                other => {
                    debug!(tag = other, "Ignoring unknown push packet");
                }
            }
        }
    }

    async fn handle_stanza(&self, stanza: &DataMessageStanza) -> LiveResult<()> {
        match pushwire::decode_app_data(stanza) {
            Ok(Some(event)) => {
                let handler = self.on_message.lock().ok().and_then(|g| g.clone());
                if let Some(handler) = handler {
                    handler(event);
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Dropping undecodable push stanza");
            }
        }

        if let Some(id) = stanza.persistent_id.as_deref() {
            if !id.is_empty() {
                self.record_persistent_id(id).await?;
            }
        }
        Ok(())
    }

    /// Appends a processed stanza id and persists, pruning oldest beyond the
    /// cap.
    async fn record_persistent_id(&self, id: &str) -> LiveResult<()> {
        let mut creds = self.creds.lock().await;
        let Some(existing) = creds.as_mut() else {
            return Ok(());
        };
        push_persistent_id(&mut existing.persistent_ids, id.to_string());
        self.store.save(existing)
    }

    async fn clear_acked_ids(&self) -> LiveResult<()> {
        let mut creds = self.creds.lock().await;
        if let Some(existing) = creds.as_mut() {
            if !existing.persistent_ids.is_empty() {
                existing.persistent_ids.clear();
                self.store.save(existing)?;
            }
        }
        Ok(())
    }

    fn set_state(&self, state: PushState) {
        if let Ok(mut guard) = self.state.write() {
            *guard = state;
        }
    }
}

fn push_persistent_id(ids: &mut Vec<String>, id: String) {
    ids.push(id);
    if ids.len() > MAX_PERSISTENT_IDS {
        let excess = ids.len() - MAX_PERSISTENT_IDS;
        ids.drain(..excess);
    }
}

/// Random 11-character hex instance id, the shape the registration endpoint
/// expects.
fn generate_instance_id() -> String {
    let bytes: [u8; 6] = rand::random();
    let mut hex = String::with_capacity(12);
    for byte in bytes {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex.truncate(11);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pushwire::AppData;
    use tokio::io::AsyncReadExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_with_dir(dir: &Path) -> LiveConfig {
        let mut config = LiveConfig::default();
        config.session.session_dir = Some(dir.to_path_buf());
        config.push.use_tls = false;
        config
    }

    #[test]
    fn test_instance_id_shape() {
        let id = generate_instance_id();
        assert_eq!(id.len(), 11);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_persistent_id_cap_keeps_newest() {
        let mut ids: Vec<String> = (0..MAX_PERSISTENT_IDS).map(|i| format!("id-{i}")).collect();
        push_persistent_id(&mut ids, "id-new".into());
        assert_eq!(ids.len(), MAX_PERSISTENT_IDS);
        assert_eq!(ids.first().map(String::as_str), Some("id-1"));
        assert_eq!(ids.last().map(String::as_str), Some("id-new"));
    }

    #[test]
    fn test_has_cached_registration() {
        let dir = tempfile::tempdir().unwrap();
        let transport = PushTransport::new(&config_with_dir(dir.path())).unwrap();
        assert!(!transport.has_cached_registration());

        PushCredentialStore::new(dir.path())
            .save(&PushCredentials {
                android_id: 1,
                security_token: 2,
                token: "tok".into(),
                persistent_ids: vec![],
            })
            .unwrap();
        assert!(transport.has_cached_registration());
    }

    #[tokio::test]
    async fn test_register_reuses_cached_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = PushCredentialStore::new(dir.path());
        store
            .save(&PushCredentials {
                android_id: 11,
                security_token: 22,
                token: "cached-token".into(),
                persistent_ids: vec![],
            })
            .unwrap();

        let transport = PushTransport::new(&config_with_dir(dir.path())).unwrap();
        let token = transport.register().await.unwrap();
        assert_eq!(token, "cached-token");
    }

    #[tokio::test]
    async fn test_register_checks_in_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;

        let checkin_resp = AndroidCheckinResponse {
            stats_ok: Some(true),
            android_id: Some(4242),
            security_token: Some(9999),
            ..Default::default()
        };
        Mock::given(method("POST"))
            .and(path("/checkin"))
            .and(header("Content-Type", "application/x-protobuf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(checkin_resp.encode_to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/c2dm/register3"))
            .and(header("Authorization", "AidLogin 4242:9999"))
            .respond_with(ResponseTemplate::new(200).set_body_string("token=fresh-token\n"))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config_with_dir(dir.path());
        config.push.checkin_url = format!("{}/checkin", server.uri());
        config.push.register_url = format!("{}/c2dm/register3", server.uri());

        let transport = PushTransport::new(&config).unwrap();
        let token = transport.register().await.unwrap();
        assert_eq!(token, "fresh-token");

        let saved = PushCredentialStore::new(dir.path()).load().unwrap().unwrap();
        assert_eq!(saved.android_id, 4242);
        assert_eq!(saved.security_token, 9999);
        assert_eq!(saved.token, "fresh-token");
    }

    #[tokio::test]
    async fn test_register_rejection_is_catchup_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;

        let checkin_resp = AndroidCheckinResponse {
            android_id: Some(1),
            security_token: Some(2),
            ..Default::default()
        };
        Mock::given(method("POST"))
            .and(path("/checkin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(checkin_resp.encode_to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/c2dm/register3"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Error=PHONE_REGISTRATION_ERROR"))
            .mount(&server)
            .await;

        let mut config = config_with_dir(dir.path());
        config.push.checkin_url = format!("{}/checkin", server.uri());
        config.push.register_url = format!("{}/c2dm/register3", server.uri());

        let transport = PushTransport::new(&config).unwrap();
        let err = transport.register().await.unwrap_err();
        assert!(matches!(err, LiveError::CatchupUnavailable(_)));
    }

    #[tokio::test]
    async fn test_listen_without_registration_fails() {
        let dir = tempfile::tempdir().unwrap();
        let transport = PushTransport::new(&config_with_dir(dir.path())).unwrap();
        let cancel = CancellationToken::new();
        let err = transport.listen(&cancel).await.unwrap_err();
        assert!(matches!(err, LiveError::CatchupUnavailable(_)));
    }

    /// Full plaintext session against a local fake: login, one data stanza,
    /// then a server close.
    #[tokio::test]
    async fn test_listen_processes_stanzas_and_acks() {
        let dir = tempfile::tempdir().unwrap();
        let store = PushCredentialStore::new(dir.path());
        store
            .save(&PushCredentials {
                android_id: 7,
                security_token: 8,
                token: "tok".into(),
                persistent_ids: vec!["old-id".into()],
            })
            .unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // client speaks first: version byte then login
            let version = socket.read_u8().await.unwrap();
            assert_eq!(version, pushwire::WIRE_VERSION);
            let (tag, body) = pushwire::read_packet(&mut socket).await.unwrap();
            assert_eq!(tag, TAG_LOGIN_REQUEST);
            let login = pushwire::LoginRequest::decode(body.as_slice()).unwrap();
            assert_eq!(login.received_persistent_id, vec!["old-id".to_string()]);

            // server side: version byte, login response, data stanza, close
            socket.write_all(&[pushwire::WIRE_VERSION]).await.unwrap();
            let accept = pushwire::encode_packet(
                TAG_LOGIN_RESPONSE,
                &LoginResponse {
                    id: Some("android-7".into()),
                    ..Default::default()
                },
                false,
            );
            socket.write_all(&accept).await.unwrap();

            let payload = serde_json::json!({
                "messageGuid": "6f2cb2e5-96d8-4d11-92ef-000000000001",
                "conversationGuid": "aa70e3dc-33bb-48a9-a7c6-000000000002",
                "messageBody": "checking in"
            })
            .to_string();
            let stanza = pushwire::encode_packet(
                TAG_DATA_MESSAGE_STANZA,
                &DataMessageStanza {
                    persistent_id: Some("stanza-1".into()),
                    app_data: vec![AppData {
                        key: Some("newMessage".into()),
                        value: Some(payload),
                    }],
                    ..Default::default()
                },
                false,
            );
            socket.write_all(&stanza).await.unwrap();

            let close = pushwire::encode_packet(TAG_CLOSE, &pushwire::CloseStanza {}, false);
            socket.write_all(&close).await.unwrap();
        });

        let mut config = config_with_dir(dir.path());
        config.push.endpoint = addr.to_string();

        let transport = Arc::new(PushTransport::new(&config).unwrap());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        transport.on_message(Arc::new(move |event| {
            if let Ok(mut guard) = sink.lock() {
                guard.push(event);
            }
        }));

        let cancel = CancellationToken::new();
        let err = transport.listen(&cancel).await.unwrap_err();
        assert!(matches!(err, LiveError::Disconnected("push")));
        server.await.unwrap();

        let events = received.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            PushEvent::NewMessage(message) => {
                assert_eq!(message.message_body.as_deref(), Some("checking in"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // ack bookkeeping: login cleared the old id, the stanza added its own
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.persistent_ids, vec!["stanza-1".to_string()]);
    }
}
