//! # Delivery Coordinator
//!
//! Owns the listening session: starts the hub, runs the time-boxed catch-up
//! episode over the push channel, merges both sources through the dedup
//! cache, and emits one ordered stream of delivery events.
//!
//! ## Session Timeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  start_listening()                                                      │
//! │    ├── cached push registration? ──▶ enable dedup, spawn episode        │
//! │    │     register ── push.listen() ── PATCH pns handle                  │
//! │    │     raced against {timeout T, stream exit, cancellation}           │
//! │    │     episode over ──▶ await stream, disable + clear dedup           │
//! │    └── hub.start()            (waits for first connect, then            │
//! │                                reconnects on its own)                   │
//! │                                                                         │
//! │  events:  hub ───┬──▶ dedup (episode only) ──▶ event stream             │
//! │           push ──┘         │                                            │
//! │                            └──▶ MarkAsDelivered (every copy)            │
//! │                                                                         │
//! │  stop_listening()                                                       │
//! │    cancel root token ──▶ hub stopped, episode awaited, dedup cleared    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status updates are never deduplicated; the same receipt twice is
//! harmless, a lost one is not.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hermes_core::{
    ConversationMuteStatusUpdate, MessageModel, MessageStatusUpdate, ServerNotification,
    UserBlockStatusUpdate,
};

use crate::auth::TokenAuthority;
use crate::config::LiveConfig;
use crate::dedup::DedupCache;
use crate::error::{LiveError, LiveResult};
use crate::hub::{HubState, HubTransport};
use crate::push::PushTransport;
use crate::pushwire::PushEvent;
use crate::rest::RestClient;

// =============================================================================
// Events & Options
// =============================================================================

/// Everything the merged stream can carry.
#[derive(Debug, Clone)]
pub enum DeliveryEvent {
    /// A new message, deduplicated across hub and push during catch-up.
    Message(MessageModel),
    /// A status receipt. Never deduplicated.
    StatusUpdate(MessageStatusUpdate),
    MuteUpdate(ConversationMuteStatusUpdate),
    BlockUpdate(UserBlockStatusUpdate),
    Notification(ServerNotification),
    /// A device-originated message exists for this IMEI.
    DeviceMessage(String),
}

/// Options for one listening session.
#[derive(Debug, Clone, Default)]
pub struct ListenOptions {
    /// Skip the push catch-up episode and go hub-only.
    pub skip_catchup: bool,
    /// Override for the catch-up time box.
    pub catchup_timeout: Option<std::time::Duration>,
}

// =============================================================================
// Delivery Coordinator
// =============================================================================

pub struct DeliveryCoordinator {
    config: LiveConfig,
    auth: Arc<TokenAuthority>,
    hub: Arc<HubTransport>,
    push: Arc<PushTransport>,
    rest: RestClient,

    dedup: Arc<DedupCache>,
    dedup_enabled: Arc<AtomicBool>,
    listening: AtomicBool,

    events_tx: mpsc::UnboundedSender<DeliveryEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<DeliveryEvent>>>,

    cancel: Mutex<Option<CancellationToken>>,
    episode_task: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryCoordinator {
    pub fn new(config: LiveConfig) -> LiveResult<Self> {
        config.validate()?;

        let auth = Arc::new(TokenAuthority::new(&config)?);
        let hub = Arc::new(HubTransport::new(&config, Arc::clone(&auth))?);
        let push = Arc::new(PushTransport::new(&config)?);
        let rest = RestClient::new(&config, Arc::clone(&auth))?;
        let dedup = Arc::new(DedupCache::new(config.delivery.dedup_capacity));

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(DeliveryCoordinator {
            config,
            auth,
            hub,
            push,
            rest,
            dedup,
            dedup_enabled: Arc::new(AtomicBool::new(false)),
            listening: AtomicBool::new(false),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            cancel: Mutex::new(None),
            episode_task: Mutex::new(None),
        })
    }

    /// Takes the event stream. One logical subscriber per process; a second
    /// call returns an error.
    pub fn events(&self) -> LiveResult<mpsc::UnboundedReceiver<DeliveryEvent>> {
        self.events_rx
            .lock()
            .map_err(|_| LiveError::Internal("event channel poisoned".into()))?
            .take()
            .ok_or_else(|| LiveError::Internal("event stream already taken".into()))
    }

    /// Whether a listening session is active.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// The authority backing this session, for registration flows.
    pub fn auth(&self) -> &Arc<TokenAuthority> {
        &self.auth
    }

    /// The REST boundary sharing this session's credentials.
    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the session: the catch-up episode when a cached push
    /// registration exists, then the hub connection. Dedup is armed and the
    /// episode launched before the hub's first connect, so a message the hub
    /// delivers right away is still recorded against its push copy.
    /// Idempotent; a second call while listening is a no-op.
    pub async fn start_listening(self: &Arc<Self>, opts: ListenOptions) -> LiveResult<()> {
        if self.listening.swap(true, Ordering::SeqCst) {
            debug!("Already listening");
            return Ok(());
        }

        if let Err(e) = self.auth.resume().await {
            self.listening.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let cancel = CancellationToken::new();
        if let Ok(mut guard) = self.cancel.lock() {
            *guard = Some(cancel.clone());
        }

        self.wire_hub_handlers();

        let catchup = !opts.skip_catchup && self.push.has_cached_registration();
        if opts.skip_catchup {
            info!("Catch-up skipped, hub only");
        } else if !catchup {
            info!("No cached push registration, going hub-only");
        }

        if catchup {
            let timeout = opts.catchup_timeout.unwrap_or(std::time::Duration::from_secs(
                self.config.delivery.catchup_timeout_secs,
            ));
            self.dedup.clear();
            self.dedup_enabled.store(true, Ordering::SeqCst);

            let coordinator = Arc::clone(self);
            let child = cancel.child_token();
            let task = tokio::spawn(async move {
                coordinator.run_catchup_episode(timeout, child).await;
            });
            if let Ok(mut guard) = self.episode_task.lock() {
                *guard = Some(task);
            }
        }

        if let Err(e) = self.hub.start().await {
            if let Some(cancel) = self.cancel.lock().ok().and_then(|mut g| g.take()) {
                cancel.cancel();
            }
            if let Some(episode) = self.episode_task.lock().ok().and_then(|mut g| g.take()) {
                let _ = episode.await;
            }
            self.dedup_enabled.store(false, Ordering::SeqCst);
            self.dedup.clear();
            self.listening.store(false, Ordering::SeqCst);
            return Err(e);
        }

        Ok(())
    }

    /// Stops the session and waits until nothing is left running.
    pub async fn stop_listening(&self) {
        if !self.listening.load(Ordering::SeqCst) {
            return;
        }

        let cancel = self.cancel.lock().ok().and_then(|mut g| g.take());
        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        let episode = self.episode_task.lock().ok().and_then(|mut g| g.take());
        if let Some(episode) = episode {
            let _ = episode.await;
        }

        self.hub.stop().await;

        self.dedup_enabled.store(false, Ordering::SeqCst);
        self.dedup.clear();
        self.listening.store(false, Ordering::SeqCst);
        info!("Listening stopped");
    }

    // =========================================================================
    // Catch-Up Episode
    // =========================================================================

    /// Runs the push channel for at most `timeout`. The caller has already
    /// armed dedup; this always disarms it on the way out. The episode ends
    /// on whichever comes first: the time box, the push stream exiting, or
    /// session cancellation.
    async fn run_catchup_episode(self: &Arc<Self>, timeout: std::time::Duration, cancel: CancellationToken) {
        let coordinator = Arc::clone(self);
        self.push.on_message(Arc::new(move |event| {
            coordinator.deliver_push_event(event);
        }));

        let token = match self.push.register().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Push registration failed, ending catch-up");
                self.dedup_enabled.store(false, Ordering::SeqCst);
                self.dedup.clear();
                return;
            }
        };

        let push = Arc::clone(&self.push);
        let listen_cancel = cancel.clone();
        let mut listen_task = tokio::spawn(async move { push.listen(&listen_cancel).await });

        // Point the backend's notifications at the registration we hold.
        if let Err(e) = self
            .auth
            .update_pns_handle(&token, &self.config.session.app_description)
            .await
        {
            warn!(error = %e, "Failed to update push handle");
        }

        info!(timeout_secs = timeout.as_secs(), "Catch-up episode started");
        let stream_done = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Catch-up cancelled");
                false
            }
            _ = tokio::time::sleep(timeout) => {
                debug!("Catch-up time box elapsed");
                false
            }
            result = &mut listen_task => {
                log_listen_result(result);
                true
            }
        };

        // The time box and cancellation leave the push stream running;
        // cancel and wait for it before declaring the episode over.
        if !stream_done {
            cancel.cancel();
            log_listen_result(listen_task.await);
        }

        self.dedup_enabled.store(false, Ordering::SeqCst);
        self.dedup.clear();
        info!("Catch-up episode over");
    }

    // =========================================================================
    // Event Fan-In
    // =========================================================================

    fn wire_hub_handlers(self: &Arc<Self>) {
        let coordinator = Arc::clone(self);
        self.hub.on_message(Arc::new(move |message| {
            coordinator.deliver_message(message);
        }));

        let coordinator = Arc::clone(self);
        self.hub.on_status_update(Arc::new(move |update| {
            coordinator.emit(DeliveryEvent::StatusUpdate(update));
        }));

        let coordinator = Arc::clone(self);
        self.hub.on_mute_update(Arc::new(move |update| {
            coordinator.emit(DeliveryEvent::MuteUpdate(update));
        }));

        let coordinator = Arc::clone(self);
        self.hub.on_block_update(Arc::new(move |update| {
            coordinator.emit(DeliveryEvent::BlockUpdate(update));
        }));

        let coordinator = Arc::clone(self);
        self.hub.on_notification(Arc::new(move |notification| {
            coordinator.emit(DeliveryEvent::Notification(notification));
        }));

        let coordinator = Arc::clone(self);
        self.hub.on_device_message(Arc::new(move |imei| {
            coordinator.emit(DeliveryEvent::DeviceMessage(imei));
        }));

        self.hub.on_error(Arc::new(|e| {
            warn!(error = %e, "Hub error");
        }));
    }

    fn deliver_push_event(self: &Arc<Self>, event: PushEvent) {
        match event {
            PushEvent::NewMessage(message) => self.deliver_message(*message),
            PushEvent::DeviceMessage(imei) => self.emit(DeliveryEvent::DeviceMessage(imei)),
            PushEvent::AccountUpdate => {
                debug!("Push account update received");
            }
        }
    }

    /// The single path every message takes, whatever channel it arrived on.
    /// Receipts go out for every copy; the event stream sees each id once.
    fn deliver_message(self: &Arc<Self>, message: MessageModel) {
        let duplicate = self.dedup_enabled.load(Ordering::SeqCst)
            && self.dedup.check_and_insert(message.message_id);

        self.send_delivery_receipt(message.conversation_id, message.message_id);

        if duplicate {
            debug!(message_id = %message.message_id, "Suppressing duplicate delivery");
            return;
        }
        self.emit(DeliveryEvent::Message(message));
    }

    /// Best-effort MarkAsDelivered: over the hub when connected, over REST
    /// otherwise. Failures are logged and forgotten.
    fn send_delivery_receipt(self: &Arc<Self>, conversation_id: uuid::Uuid, message_id: uuid::Uuid) {
        if conversation_id.is_nil() || message_id.is_nil() {
            return;
        }

        if self.hub.state() == HubState::Connected {
            self.hub.mark_delivered(conversation_id, message_id);
            return;
        }

        let rest = self.rest.clone();
        tokio::spawn(async move {
            if let Err(e) = rest.mark_delivered(conversation_id, message_id).await {
                debug!(error = %e, message_id = %message_id, "Delivery receipt failed");
            }
        });
    }

    fn emit(&self, event: DeliveryEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("Event stream dropped, discarding event");
        }
    }
}

fn log_listen_result(result: Result<LiveResult<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Push stream ended"),
        Err(e) => warn!(error = %e, "Push task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialStore, StoredCredentials};

    fn seeded_config(dir: &std::path::Path, base_url: String) -> LiveConfig {
        CredentialStore::new(dir)
            .save(&StoredCredentials {
                access_token: "at".into(),
                refresh_token: "rt".into(),
                instance_id: "inst".into(),
                expires_at: chrono::Utc::now().timestamp() as f64 + 3600.0,
            })
            .unwrap();

        let mut config = LiveConfig::default();
        config.api.base_url = base_url;
        config.session.session_dir = Some(dir.to_path_buf());
        config.hub.initial_backoff_secs = 5;
        config
    }

    fn seeded_push_registration(dir: &std::path::Path) {
        std::fs::write(
            dir.join("push_credentials.json"),
            serde_json::json!({
                "android_id": 7,
                "security_token": 8,
                "token": "cached",
                "persistent_ids": []
            })
            .to_string(),
        )
        .unwrap();
    }

    /// A negotiate endpoint plus a WebSocket listener that completes the
    /// protocol handshake. `hold_open` keeps each connection alive;
    /// otherwise the server drops it right after the handshake.
    async fn fake_hub(hold_open: bool) -> (wiremock::MockServer, tokio::task::JoinHandle<()>) {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::tungstenite::Message as WsMessage;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_addr = listener.local_addr().unwrap();

        let negotiate = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messaging/negotiate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": format!("http://{ws_addr}/client"),
                "accessToken": "relay-token"
            })))
            .mount(&negotiate)
            .await;

        let server = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                if ws.next().await.is_none() {
                    continue;
                }
                if ws.send(WsMessage::Text("{}\u{1e}".into())).await.is_err() {
                    continue;
                }
                if hold_open {
                    while let Some(Ok(_)) = ws.next().await {}
                }
            }
        });
        (negotiate, server)
    }

    fn sample_message(id: uuid::Uuid) -> MessageModel {
        serde_json::from_value(serde_json::json!({
            "messageId": id,
            "conversationId": "aa70e3dc-33bb-48a9-a7c6-000000000002",
            "messageBody": "hello"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_without_session_is_unauthenticated() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LiveConfig::default();
        config.session.session_dir = Some(dir.path().to_path_buf());

        let coordinator = Arc::new(DeliveryCoordinator::new(config).unwrap());
        let err = coordinator
            .start_listening(ListenOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_auth_error());
        assert!(!coordinator.is_listening());
    }

    #[tokio::test]
    async fn test_start_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        // nothing listens here, so the hub's first connect attempt fails
        let config = seeded_config(dir.path(), "http://127.0.0.1:9".into());

        let coordinator = Arc::new(DeliveryCoordinator::new(config).unwrap());
        let err = coordinator
            .start_listening(ListenOptions {
                skip_catchup: true,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(!coordinator.is_listening());
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_resets() {
        let dir = tempfile::tempdir().unwrap();
        let (negotiate, _server) = fake_hub(true).await;
        let config = seeded_config(dir.path(), negotiate.uri());

        let coordinator = Arc::new(DeliveryCoordinator::new(config).unwrap());
        let opts = ListenOptions {
            skip_catchup: true,
            ..Default::default()
        };

        coordinator.start_listening(opts.clone()).await.unwrap();
        assert!(coordinator.is_listening());
        coordinator.start_listening(opts).await.unwrap();
        assert!(coordinator.is_listening());

        coordinator.stop_listening().await;
        assert!(!coordinator.is_listening());
        assert_eq!(coordinator.hub.state(), HubState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_while_reconnecting_halts_attempts() {
        let dir = tempfile::tempdir().unwrap();
        // each connection drops right after the handshake, so the client
        // connects once and then sits in reconnect backoff
        let (negotiate, _server) = fake_hub(false).await;
        let config = seeded_config(dir.path(), negotiate.uri());

        let coordinator = Arc::new(DeliveryCoordinator::new(config).unwrap());
        coordinator
            .start_listening(ListenOptions {
                skip_catchup: true,
                ..Default::default()
            })
            .await
            .unwrap();

        // wait for the dropped connection to register
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert_eq!(coordinator.hub.state(), HubState::Reconnecting);

        coordinator.stop_listening().await;
        assert_eq!(coordinator.hub.state(), HubState::Stopped);

        // no further state changes after stop
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(coordinator.hub.state(), HubState::Stopped);
    }

    #[tokio::test]
    async fn test_catchup_skipped_without_cached_registration() {
        let dir = tempfile::tempdir().unwrap();
        let (negotiate, _server) = fake_hub(true).await;
        let config = seeded_config(dir.path(), negotiate.uri());

        let coordinator = Arc::new(DeliveryCoordinator::new(config).unwrap());
        coordinator
            .start_listening(ListenOptions::default())
            .await
            .unwrap();

        // no push_credentials.json: hub-only, no episode, no check-in
        assert!(coordinator.is_listening());
        assert!(!coordinator.dedup_enabled.load(Ordering::SeqCst));
        assert!(coordinator.episode_task.lock().unwrap().is_none());
        assert_eq!(coordinator.push.state(), crate::push::PushState::CheckedOut);

        coordinator.stop_listening().await;
    }

    #[tokio::test]
    async fn test_dedup_armed_before_hub_connects() {
        let dir = tempfile::tempdir().unwrap();
        seeded_push_registration(dir.path());
        let (negotiate, _server) = fake_hub(true).await;

        // a push endpoint that accepts and stays silent keeps the episode
        // open for the whole test
        let push_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let push_addr = push_listener.local_addr().unwrap();
        let _push_server = tokio::spawn(async move {
            let Ok((socket, _)) = push_listener.accept().await else {
                return;
            };
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            drop(socket);
        });

        let mut config = seeded_config(dir.path(), negotiate.uri());
        config.push.use_tls = false;
        config.push.endpoint = push_addr.to_string();

        let coordinator = Arc::new(DeliveryCoordinator::new(config).unwrap());
        coordinator
            .start_listening(ListenOptions {
                skip_catchup: false,
                catchup_timeout: Some(std::time::Duration::from_secs(30)),
            })
            .await
            .unwrap();

        // by the time the hub is connected the dedup window is already armed
        assert_eq!(coordinator.hub.state(), HubState::Connected);
        assert!(coordinator.dedup_enabled.load(Ordering::SeqCst));

        coordinator.stop_listening().await;
        assert!(!coordinator.dedup_enabled.load(Ordering::SeqCst));
    }

    /// The episode ends as soon as the push stream dies, not at the time
    /// box.
    #[tokio::test]
    async fn test_catchup_ends_when_push_stream_fails() {
        let dir = tempfile::tempdir().unwrap();
        seeded_push_registration(dir.path());
        let (negotiate, _server) = fake_hub(true).await;

        let mut config = seeded_config(dir.path(), negotiate.uri());
        config.push.use_tls = false;
        // nothing listens here, so push.listen fails on connect
        config.push.endpoint = "127.0.0.1:9".into();

        let coordinator = Arc::new(DeliveryCoordinator::new(config).unwrap());
        coordinator
            .start_listening(ListenOptions {
                skip_catchup: false,
                catchup_timeout: Some(std::time::Duration::from_secs(30)),
            })
            .await
            .unwrap();

        // well before the 30s box: the dead stream already ended the episode
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert!(!coordinator.dedup_enabled.load(Ordering::SeqCst));
        assert_eq!(coordinator.push.state(), crate::push::PushState::CheckedOut);
        assert!(coordinator.is_listening());

        coordinator.stop_listening().await;
    }

    #[tokio::test]
    async fn test_deliver_message_dedups_during_episode() {
        let dir = tempfile::tempdir().unwrap();
        let config = seeded_config(dir.path(), "http://127.0.0.1:9".into());

        let coordinator = Arc::new(DeliveryCoordinator::new(config).unwrap());
        let mut events = coordinator.events().unwrap();
        coordinator.dedup_enabled.store(true, Ordering::SeqCst);

        let id = uuid::Uuid::new_v4();
        coordinator.deliver_message(sample_message(id));
        coordinator.deliver_message(sample_message(id));

        let first = events.try_recv().unwrap();
        assert!(matches!(first, DeliveryEvent::Message(m) if m.message_id == id));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_messages_pass_through_outside_episode() {
        let dir = tempfile::tempdir().unwrap();
        let config = seeded_config(dir.path(), "http://127.0.0.1:9".into());

        let coordinator = Arc::new(DeliveryCoordinator::new(config).unwrap());
        let mut events = coordinator.events().unwrap();

        let id = uuid::Uuid::new_v4();
        coordinator.deliver_message(sample_message(id));
        coordinator.deliver_message(sample_message(id));

        // dedup disabled: both copies flow through
        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_ok());
    }

    /// Full hub-only session against a local fake: negotiate redirect, WS
    /// handshake, one message in, one MarkAsDelivered back.
    #[tokio::test]
    async fn test_hub_only_listen_delivers_and_acks() {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::tungstenite::Message as WsMessage;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let dir = tempfile::tempdir().unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_addr = listener.local_addr().unwrap();

        let negotiate = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messaging/negotiate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": format!("http://{ws_addr}/client"),
                "accessToken": "relay-token"
            })))
            .mount(&negotiate)
            .await;

        let msg_id = uuid::Uuid::new_v4();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            // protocol handshake
            let hello = ws.next().await.unwrap().unwrap();
            assert!(String::from_utf8_lossy(&hello.into_data()).contains("\"protocol\":\"json\""));
            ws.send(WsMessage::Text("{}\u{1e}".into())).await.unwrap();

            let payload = serde_json::json!({
                "messageId": msg_id,
                "conversationId": "aa70e3dc-33bb-48a9-a7c6-000000000002",
                "messageBody": "hub says hi"
            });
            let frame = format!(
                "{{\"type\":1,\"target\":\"ReceiveMessage\",\"arguments\":[{payload}]}}\u{1e}"
            );
            ws.send(WsMessage::Text(frame.into())).await.unwrap();

            // wait for the delivery receipt, skipping client pings
            loop {
                let incoming = ws.next().await.unwrap().unwrap();
                let text = String::from_utf8_lossy(&incoming.into_data()).to_string();
                if text.contains("MarkAsDelivered") {
                    assert!(text.contains(&msg_id.to_string()));
                    return;
                }
            }
        });

        let config = seeded_config(dir.path(), negotiate.uri());
        let coordinator = Arc::new(DeliveryCoordinator::new(config).unwrap());
        let mut events = coordinator.events().unwrap();
        coordinator
            .start_listening(ListenOptions {
                skip_catchup: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            DeliveryEvent::Message(message) => {
                assert_eq!(message.message_id, msg_id);
                assert_eq!(message.message_body.as_deref(), Some("hub says hi"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        coordinator.stop_listening().await;
    }

    /// The catch-up episode ends at the time box even when the push stream
    /// stays healthy, and leaves dedup disabled.
    #[tokio::test]
    async fn test_catchup_episode_is_time_boxed() {
        use crate::push::PushState;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let dir = tempfile::tempdir().unwrap();
        seeded_push_registration(dir.path());
        let (negotiate, _hub_server) = fake_hub(true).await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let push_addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let version = socket.read_u8().await.unwrap();
            assert_eq!(version, crate::pushwire::WIRE_VERSION);
            let (tag, _) = crate::pushwire::read_packet(&mut socket).await.unwrap();
            assert_eq!(tag, crate::pushwire::TAG_LOGIN_REQUEST);

            socket
                .write_all(&[crate::pushwire::WIRE_VERSION])
                .await
                .unwrap();
            let accept = crate::pushwire::encode_packet(
                crate::pushwire::TAG_LOGIN_RESPONSE,
                &crate::pushwire::LoginResponse::default(),
                false,
            );
            socket.write_all(&accept).await.unwrap();

            // hold the stream open until the client goes away
            let mut buf = [0u8; 64];
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        });

        let mut config = seeded_config(dir.path(), negotiate.uri());
        config.push.use_tls = false;
        config.push.endpoint = push_addr.to_string();

        let coordinator = Arc::new(DeliveryCoordinator::new(config).unwrap());
        coordinator
            .start_listening(ListenOptions {
                skip_catchup: false,
                catchup_timeout: Some(std::time::Duration::from_millis(400)),
            })
            .await
            .unwrap();

        // mid-episode: push is logged in, dedup armed
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(coordinator.push.state(), PushState::Active);
        assert!(coordinator.dedup_enabled.load(Ordering::SeqCst));

        // past the time box: episode torn down, session still listening
        tokio::time::sleep(std::time::Duration::from_millis(600)).await;
        assert_eq!(coordinator.push.state(), PushState::CheckedOut);
        assert!(!coordinator.dedup_enabled.load(Ordering::SeqCst));
        assert!(coordinator.is_listening());

        tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        coordinator.stop_listening().await;
    }

    #[tokio::test]
    async fn test_event_stream_single_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        let config = seeded_config(dir.path(), "http://127.0.0.1:9".into());

        let coordinator = DeliveryCoordinator::new(config).unwrap();
        let _events = coordinator.events().unwrap();
        assert!(coordinator.events().is_err());
    }
}
