//! # Hub Transport
//!
//! Persistent connection to the backend's messaging hub. Owns the negotiate,
//! WebSocket upgrade, and handshake sequence, then dispatches server
//! invocations to registered handlers until stopped.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Idle ──start()──▶ Connecting ──handshake ok──▶ Connected              │
//! │                        │  ▲                          │                  │
//! │                        │  │ backoff 5s..120s (x2)    │ read error       │
//! │                        ▼  │                          ▼                  │
//! │                      Reconnecting ◀──────────── (disconnected)          │
//! │                        │                                                │
//! │                        └──stop()──▶ Stopped                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The backoff interval resets after every successful connect. `start` waits
//! on the first attempt and returns its error; later failures are reported
//! through the error handler and retried, except auth errors, which stop the
//! loop for good.
//!
//! Outbound receipts (`mark_delivered`, `mark_read`) ride a bounded queue and
//! are dropped when the hub is down. Receipts are best-effort by contract;
//! the REST fallback covers anything that matters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hermes_core::{
    ConversationMuteStatusUpdate, MessageModel, MessageStatusUpdate, ServerNotification,
    UserBlockStatusUpdate,
};

use crate::auth::TokenAuthority;
use crate::config::LiveConfig;
use crate::error::{LiveError, LiveResult};
use crate::signalr::{self, HubFrame, NegotiateResponse};

// =============================================================================
// State & Handlers
// =============================================================================

/// Hub connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Stopped,
}

pub type MessageHandler = Arc<dyn Fn(MessageModel) + Send + Sync>;
pub type StatusUpdateHandler = Arc<dyn Fn(MessageStatusUpdate) + Send + Sync>;
pub type MuteUpdateHandler = Arc<dyn Fn(ConversationMuteStatusUpdate) + Send + Sync>;
pub type BlockUpdateHandler = Arc<dyn Fn(UserBlockStatusUpdate) + Send + Sync>;
pub type NotificationHandler = Arc<dyn Fn(ServerNotification) + Send + Sync>;
pub type DeviceMessageHandler = Arc<dyn Fn(String) + Send + Sync>;
pub type LifecycleHandler = Arc<dyn Fn() + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(LiveError) + Send + Sync>;

/// Handler set dispatched from the read loop. Register everything before
/// `start`; the run loop takes a snapshot.
#[derive(Default, Clone)]
struct HubHandlers {
    on_message: Option<MessageHandler>,
    on_status_update: Option<StatusUpdateHandler>,
    on_mute_update: Option<MuteUpdateHandler>,
    on_block_update: Option<BlockUpdateHandler>,
    on_notification: Option<NotificationHandler>,
    on_device_message: Option<DeviceMessageHandler>,
    on_connected: Option<LifecycleHandler>,
    on_disconnected: Option<LifecycleHandler>,
    on_error: Option<ErrorHandler>,
}

// =============================================================================
// Hub Transport
// =============================================================================

/// The persistent hub connection.
pub struct HubTransport {
    hub_url: String,
    connect_timeout_secs: u64,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
    auth: Arc<TokenAuthority>,
    http: reqwest::Client,

    handlers: Mutex<HubHandlers>,
    state: Arc<RwLock<HubState>>,
    running: AtomicBool,

    outgoing_tx: mpsc::Sender<Vec<u8>>,
    outgoing_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HubTransport {
    pub fn new(config: &LiveConfig, auth: Arc<TokenAuthority>) -> LiveResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.hub.connect_timeout_secs))
            .build()
            .map_err(|e| LiveError::Internal(e.to_string()))?;

        let (outgoing_tx, outgoing_rx) = mpsc::channel(config.hub.outgoing_queue_size);

        Ok(HubTransport {
            hub_url: config.hub_url(),
            connect_timeout_secs: config.hub.connect_timeout_secs,
            initial_backoff_secs: config.hub.initial_backoff_secs,
            max_backoff_secs: config.hub.max_backoff_secs,
            auth,
            http,
            handlers: Mutex::new(HubHandlers::default()),
            state: Arc::new(RwLock::new(HubState::Idle)),
            running: AtomicBool::new(false),
            outgoing_tx,
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        })
    }

    /// Current connection state.
    pub fn state(&self) -> HubState {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(_) => HubState::Stopped,
        }
    }

    // =========================================================================
    // Handler Registration (before start)
    // =========================================================================

    pub fn on_message(&self, handler: MessageHandler) {
        if let Ok(mut h) = self.handlers.lock() {
            h.on_message = Some(handler);
        }
    }

    pub fn on_status_update(&self, handler: StatusUpdateHandler) {
        if let Ok(mut h) = self.handlers.lock() {
            h.on_status_update = Some(handler);
        }
    }

    pub fn on_mute_update(&self, handler: MuteUpdateHandler) {
        if let Ok(mut h) = self.handlers.lock() {
            h.on_mute_update = Some(handler);
        }
    }

    pub fn on_block_update(&self, handler: BlockUpdateHandler) {
        if let Ok(mut h) = self.handlers.lock() {
            h.on_block_update = Some(handler);
        }
    }

    pub fn on_notification(&self, handler: NotificationHandler) {
        if let Ok(mut h) = self.handlers.lock() {
            h.on_notification = Some(handler);
        }
    }

    pub fn on_device_message(&self, handler: DeviceMessageHandler) {
        if let Ok(mut h) = self.handlers.lock() {
            h.on_device_message = Some(handler);
        }
    }

    pub fn on_connected(&self, handler: LifecycleHandler) {
        if let Ok(mut h) = self.handlers.lock() {
            h.on_connected = Some(handler);
        }
    }

    pub fn on_disconnected(&self, handler: LifecycleHandler) {
        if let Ok(mut h) = self.handlers.lock() {
            h.on_disconnected = Some(handler);
        }
    }

    pub fn on_error(&self, handler: ErrorHandler) {
        if let Ok(mut h) = self.handlers.lock() {
            h.on_error = Some(handler);
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the connection run loop and waits for the first connect
    /// attempt to succeed or fail. A failed first attempt unwinds the loop
    /// and returns its error, leaving the transport startable again. After
    /// the first success the loop reconnects on its own. Idempotent: a
    /// second call while running succeeds without doing anything.
    pub async fn start(self: &Arc<Self>) -> LiveResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Hub already running");
            return Ok(());
        }

        let outgoing_rx = match self.take_outgoing() {
            Ok(rx) => rx,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        if let Ok(mut guard) = self.cancel.lock() {
            *guard = Some(cancel.clone());
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let transport = Arc::clone(self);
        let task = tokio::spawn(async move {
            transport.run_loop(outgoing_rx, cancel, ready_tx).await;
        });
        if let Ok(mut guard) = self.task.lock() {
            *guard = Some(task);
        }

        match ready_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                // first attempt failed, the run loop has already unwound
                let task = self.task.lock().ok().and_then(|mut g| g.take());
                if let Some(task) = task {
                    let _ = task.await;
                }
                Err(e)
            }
            Err(_) => Err(LiveError::ShuttingDown),
        }
    }

    fn take_outgoing(&self) -> LiveResult<mpsc::Receiver<Vec<u8>>> {
        self.outgoing_rx
            .lock()
            .map_err(|_| LiveError::Internal("outgoing queue poisoned".into()))?
            .take()
            .ok_or(LiveError::ShuttingDown)
    }

    /// Stops the run loop and waits for it to exit.
    pub async fn stop(&self) {
        let cancel = self.cancel.lock().ok().and_then(|mut g| g.take());
        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        let task = self.task.lock().ok().and_then(|mut g| g.take());
        if let Some(task) = task {
            let _ = task.await;
        }
        self.set_state(HubState::Stopped);
    }

    // =========================================================================
    // Outbound Invocations
    // =========================================================================

    /// Queues a MarkAsDelivered invocation. Dropped when the hub is down.
    pub fn mark_delivered(&self, conversation_id: Uuid, message_id: Uuid) {
        self.send_invocation(
            "MarkAsDelivered",
            &[
                serde_json::Value::String(conversation_id.to_string()),
                serde_json::Value::String(message_id.to_string()),
            ],
        );
    }

    /// Queues a MarkAsRead invocation. Dropped when the hub is down.
    pub fn mark_read(&self, conversation_id: Uuid, message_id: Uuid) {
        self.send_invocation(
            "MarkAsRead",
            &[
                serde_json::Value::String(conversation_id.to_string()),
                serde_json::Value::String(message_id.to_string()),
            ],
        );
    }

    fn send_invocation(&self, target: &str, arguments: &[serde_json::Value]) {
        let frame = match signalr::invocation_frame(target, arguments) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(target = target, error = %e, "Failed to encode hub invocation");
                return;
            }
        };
        if self.outgoing_tx.try_send(frame).is_err() {
            debug!(target = target, "Hub outgoing queue unavailable, dropping invocation");
        }
    }

    // =========================================================================
    // Run Loop
    // =========================================================================

    async fn run_loop(
        &self,
        mut outgoing_rx: mpsc::Receiver<Vec<u8>>,
        cancel: CancellationToken,
        ready: oneshot::Sender<LiveResult<()>>,
    ) {
        let handlers = match self.handlers.lock() {
            Ok(h) => h.clone(),
            Err(_) => HubHandlers::default(),
        };

        let mut backoff = ExponentialBackoff {
            initial_interval: std::time::Duration::from_secs(self.initial_backoff_secs),
            current_interval: std::time::Duration::from_secs(self.initial_backoff_secs),
            max_interval: std::time::Duration::from_secs(self.max_backoff_secs),
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        // consumed when the first connect attempt resolves
        let mut ready = Some(ready);
        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.set_state(if ready.is_some() {
                HubState::Connecting
            } else {
                HubState::Reconnecting
            });

            match self
                .run_session(&handlers, &mut outgoing_rx, &mut backoff, &cancel, &mut ready)
                .await
            {
                Ok(()) => break,
                Err(e) => {
                    warn!(error = %e, "Hub session ended");
                    if let Some(tx) = ready.take() {
                        // never connected: hand the error back to start()
                        // and put the queue back so a retry is possible
                        let _ = tx.send(Err(e));
                        if let Ok(mut guard) = self.outgoing_rx.lock() {
                            *guard = Some(outgoing_rx);
                        }
                        self.set_state(HubState::Idle);
                        self.running.store(false, Ordering::SeqCst);
                        return;
                    }
                    let fatal = e.is_auth_error();
                    if let Some(on_error) = &handlers.on_error {
                        on_error(e);
                    }
                    if let Some(on_disconnected) = &handlers.on_disconnected {
                        on_disconnected();
                    }
                    if fatal {
                        warn!("Session rejected by the backend, giving up until re-registration");
                        break;
                    }
                }
            }

            self.set_state(HubState::Reconnecting);
            let delay = backoff
                .next_backoff()
                .unwrap_or(std::time::Duration::from_secs(self.max_backoff_secs));
            info!(delay_secs = delay.as_secs(), "Hub reconnecting after backoff");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(HubState::Stopped);
    }

    /// One connect + dispatch session. `Ok(())` means a clean cancellation;
    /// any `Err` sends the loop into backoff.
    async fn run_session(
        &self,
        handlers: &HubHandlers,
        outgoing_rx: &mut mpsc::Receiver<Vec<u8>>,
        backoff: &mut ExponentialBackoff,
        cancel: &CancellationToken,
        ready: &mut Option<oneshot::Sender<LiveResult<()>>>,
    ) -> LiveResult<()> {
        let (ws_url, token) = self.negotiate().await?;

        debug!(url = %ws_url, "Opening hub WebSocket");
        let mut request = ws_url.as_str().into_client_request()?;
        let auth_value = format!("Bearer {token}")
            .parse()
            .map_err(|_| LiveError::Internal("invalid authorization header".into()))?;
        request.headers_mut().insert("Authorization", auth_value);

        let connect = tokio_tungstenite::connect_async(request);
        let (ws, _) = tokio::time::timeout(
            std::time::Duration::from_secs(self.connect_timeout_secs),
            connect,
        )
        .await
        .map_err(|_| LiveError::Timeout(self.connect_timeout_secs))??;
        let (mut sink, mut stream) = ws.split();

        // Protocol handshake: send ours, first frame back is the verdict.
        sink.send(WsMessage::Binary(signalr::handshake_frame().into()))
            .await?;
        let reply = match stream.next().await {
            Some(frame) => frame?,
            None => return Err(LiveError::Disconnected("hub")),
        };
        let reply_data = reply.into_data();
        let reply_body = reply_data
            .strip_suffix(&[signalr::RECORD_SEPARATOR])
            .unwrap_or(&reply_data);
        signalr::check_handshake_response(reply_body)?;

        info!("Hub connected");
        self.set_state(HubState::Connected);
        backoff.reset();
        if let Some(tx) = ready.take() {
            let _ = tx.send(Ok(()));
        }
        if let Some(on_connected) = &handlers.on_connected {
            on_connected();
        }

        let mut ping = tokio::time::interval(std::time::Duration::from_secs(15));
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
                _ = ping.tick() => {
                    sink.send(WsMessage::Binary(signalr::ping_frame().into())).await?;
                }
                outgoing = outgoing_rx.recv() => {
                    match outgoing {
                        Some(frame) => sink.send(WsMessage::Binary(frame.into())).await?,
                        None => return Ok(()),
                    }
                }
                incoming = stream.next() => {
                    let message = match incoming {
                        Some(message) => message?,
                        None => return Err(LiveError::Disconnected("hub")),
                    };
                    match message {
                        WsMessage::Text(_) | WsMessage::Binary(_) => {
                            if let Some(error) = self.dispatch_payload(handlers, &message.into_data()) {
                                return Err(error);
                            }
                        }
                        WsMessage::Close(_) => return Err(LiveError::Disconnected("hub")),
                        _ => {}
                    }
                }
            }
        }
    }

    /// Negotiates a connection, following one relay redirect if the server
    /// issues one. Returns the WebSocket URL and the bearer token to present.
    async fn negotiate(&self) -> LiveResult<(String, String)> {
        let token = self.auth.bearer_token().await?;
        let negotiated = self.negotiate_once(&self.hub_url, &token).await?;

        if negotiated.is_redirect() {
            let url = negotiated.url.unwrap_or_default();
            let relay_token = negotiated.access_token.unwrap_or_default();
            debug!(url = %url, "Hub negotiate redirected to relay");
            return Ok((to_ws_scheme(&url)?, relay_token));
        }

        let connection_id = negotiated.connection_id.ok_or_else(|| {
            LiveError::HandshakeRejected("negotiate returned neither connectionId nor url".into())
        })?;
        let mut ws_url = url::Url::parse(&to_ws_scheme(&self.hub_url)?)?;
        ws_url
            .query_pairs_mut()
            .append_pair("id", &connection_id);
        Ok((ws_url.to_string(), token))
    }

    async fn negotiate_once(&self, hub_url: &str, token: &str) -> LiveResult<NegotiateResponse> {
        let url = format!("{hub_url}/negotiate");
        debug!(url = %url, "Hub negotiate");
        let resp = self.http.post(&url).bearer_auth(token).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LiveError::ApiStatus {
                method: "POST",
                path: "negotiate".into(),
                status: status.as_u16(),
            });
        }
        resp.json::<NegotiateResponse>()
            .await
            .map_err(|e| LiveError::DeserializationFailed(e.to_string()))
    }

    /// Decodes one WebSocket payload and dispatches its frames. A malformed
    /// payload is logged and dropped. Returns an error only for a server
    /// close frame.
    fn dispatch_payload(&self, handlers: &HubHandlers, payload: &[u8]) -> Option<LiveError> {
        let frames = match signalr::decode_frames(payload) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(error = %e, "Dropping malformed hub payload");
                return None;
            }
        };

        for frame in frames {
            match frame {
                HubFrame::Invocation { target, arguments } => {
                    self.dispatch_invocation(handlers, &target, arguments);
                }
                HubFrame::Ping => {}
                HubFrame::Close { error } => {
                    if let Some(error) = error {
                        warn!(error = %error, "Hub sent close frame");
                    }
                    return Some(LiveError::Disconnected("hub"));
                }
                HubFrame::Other(kind) => {
                    debug!(kind = kind, "Ignoring unhandled hub frame type");
                }
            }
        }
        None
    }

    fn dispatch_invocation(
        &self,
        handlers: &HubHandlers,
        target: &str,
        mut arguments: Vec<serde_json::Value>,
    ) {
        let Some(argument) = arguments.drain(..).next() else {
            warn!(target = target, "Hub invocation without arguments");
            return;
        };

        match target {
            "ReceiveMessage" => {
                dispatch_typed::<MessageModel>(target, argument, handlers.on_message.as_deref());
            }
            "ReceiveMessageUpdate" => {
                dispatch_typed::<MessageStatusUpdate>(
                    target,
                    argument,
                    handlers.on_status_update.as_deref(),
                );
            }
            "ReceiveConversationMuteStatusUpdate" => {
                dispatch_typed::<ConversationMuteStatusUpdate>(
                    target,
                    argument,
                    handlers.on_mute_update.as_deref(),
                );
            }
            "ReceiveUserBlockStatusUpdate" => {
                dispatch_typed::<UserBlockStatusUpdate>(
                    target,
                    argument,
                    handlers.on_block_update.as_deref(),
                );
            }
            "ReceiveServerNotification" => {
                dispatch_typed::<ServerNotification>(
                    target,
                    argument,
                    handlers.on_notification.as_deref(),
                );
            }
            "ReceiveNonconversationalMessage" => {
                // The device identifier arrives as a string or a bare number.
                let imei = match argument {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Number(n) => n.to_string(),
                    other => {
                        warn!(raw = %other, "Unparseable device message identifier");
                        return;
                    }
                };
                if let Some(handler) = &handlers.on_device_message {
                    handler(imei);
                }
            }
            other => {
                debug!(target = other, "Ignoring unknown hub invocation");
            }
        }
    }

    fn set_state(&self, state: HubState) {
        if let Ok(mut guard) = self.state.write() {
            *guard = state;
        }
    }
}

fn dispatch_typed<T: serde::de::DeserializeOwned>(
    target: &str,
    argument: serde_json::Value,
    handler: Option<&(dyn Fn(T) + Send + Sync)>,
) {
    let value: T = match serde_json::from_value(argument) {
        Ok(value) => value,
        Err(e) => {
            warn!(target = target, error = %e, "Dropping undecodable hub invocation");
            return;
        }
    };
    if let Some(handler) = handler {
        handler(value);
    }
}

fn to_ws_scheme(url: &str) -> LiveResult<String> {
    let mut parsed = url::Url::parse(url)?;
    let scheme = match parsed.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(LiveError::InvalidUrl(format!(
                "unsupported scheme: {other}"
            )))
        }
    };
    parsed
        .set_scheme(scheme)
        .map_err(|_| LiveError::InvalidUrl(url.to_string()))?;
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialStore, StoredCredentials};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn seeded_config(dir: &std::path::Path, base_url: String) -> LiveConfig {
        CredentialStore::new(dir)
            .save(&StoredCredentials {
                access_token: "at".into(),
                refresh_token: "rt-1".into(),
                instance_id: "inst-1".into(),
                expires_at: chrono::Utc::now().timestamp() as f64 + 3600.0,
            })
            .unwrap();

        let mut config = LiveConfig::default();
        config.api.base_url = base_url;
        config.session.session_dir = Some(dir.to_path_buf());
        config
    }

    #[tokio::test]
    async fn test_start_reports_first_connect_failure() {
        let dir = tempfile::tempdir().unwrap();
        // nothing listens on this port, so negotiate fails
        let config = seeded_config(dir.path(), "http://127.0.0.1:9".into());

        let auth = Arc::new(TokenAuthority::new(&config).unwrap());
        auth.resume().await.unwrap();

        let hub = Arc::new(HubTransport::new(&config, auth).unwrap());
        let err = hub.start().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(hub.state(), HubState::Idle);
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;

        // resume hands out one already-stale token, every refresh after
        // that is rejected
        Mock::given(method("POST"))
            .and(path("/Registration/App/Refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "instanceId": "inst-1",
                "accessAndRefreshToken": {
                    "accessToken": "short",
                    "refreshToken": "rt-2",
                    "expiresIn": 0
                }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/Registration/App/Refresh"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let config = seeded_config(dir.path(), server.uri());
        CredentialStore::new(dir.path())
            .save(&StoredCredentials {
                access_token: "stale".into(),
                refresh_token: "rt-1".into(),
                instance_id: "inst-1".into(),
                expires_at: 0.0,
            })
            .unwrap();

        let auth = Arc::new(TokenAuthority::new(&config).unwrap());
        auth.resume().await.unwrap();

        let hub = Arc::new(HubTransport::new(&config, auth).unwrap());
        let err = hub.start().await.unwrap_err();
        assert!(err.is_auth_error());
        assert_eq!(hub.state(), HubState::Idle);
        // expect(1) on the 401 mock verifies the rejection hit once, not in
        // a backoff loop
    }

    #[test]
    fn test_ws_scheme_translation() {
        assert_eq!(
            to_ws_scheme("https://hub.example/messaging").unwrap(),
            "wss://hub.example/messaging"
        );
        assert_eq!(
            to_ws_scheme("http://127.0.0.1:8080/messaging").unwrap(),
            "ws://127.0.0.1:8080/messaging"
        );
        assert!(to_ws_scheme("ftp://hub.example").is_err());
    }

    #[test]
    fn test_backoff_schedule_is_bounded() {
        let mut backoff = ExponentialBackoff {
            initial_interval: std::time::Duration::from_secs(5),
            current_interval: std::time::Duration::from_secs(5),
            max_interval: std::time::Duration::from_secs(120),
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        let mut previous = std::time::Duration::ZERO;
        for _ in 0..12 {
            let delay = backoff.next_backoff().unwrap();
            assert!(delay >= previous);
            assert!(delay >= std::time::Duration::from_secs(5));
            assert!(delay <= std::time::Duration::from_secs(120));
            previous = delay;
        }
        assert_eq!(previous, std::time::Duration::from_secs(120));

        backoff.reset();
        assert_eq!(
            backoff.next_backoff().unwrap(),
            std::time::Duration::from_secs(5)
        );
    }
}
