//! # Live Configuration
//!
//! Configuration management for the realtime delivery layer.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HERMES_API_BASE=https://staging.example.com                        │
//! │     HERMES_SESSION_DIR=/tmp/hermes-test                                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/hermes-messenger/live.toml (Linux)                       │
//! │     ~/Library/Application Support/com.hermes.messenger/live.toml (mac) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Production backend, 15s catch-up window, 5s..120s hub backoff      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # live.toml
//! [api]
//! base_url = "https://hermes.inreachapp.com"
//! api_version = "1.0"
//!
//! [session]
//! device_name = "workstation"
//!
//! [hub]
//! initial_backoff_secs = 5
//! max_backoff_secs = 120
//!
//! [push]
//! endpoint = "mtalk.google.com:5228"
//!
//! [delivery]
//! catchup_timeout_secs = 15
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{LiveError, LiveResult};

// =============================================================================
// API Settings
// =============================================================================

/// Settings for the Hermes REST backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Value for the `Api-Version` header on authorized calls.
    /// Registration endpoints always pin version 1.0.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://hermes.inreachapp.com".to_string()
}

fn default_api_version() -> String {
    "2.0".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            api_version: default_api_version(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Session Settings
// =============================================================================

/// Settings for the locally persisted session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Directory holding credential files.
    /// Defaults to the platform data directory when unset.
    #[serde(default)]
    pub session_dir: Option<PathBuf>,

    /// Device name sent with registration requests.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Platform string the backend expects during registration.
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Human-readable description shown in the account's device list.
    #[serde(default = "default_app_description")]
    pub app_description: String,
}

fn default_device_name() -> String {
    "Hermes Client".to_string()
}

fn default_platform() -> String {
    "android".to_string()
}

fn default_app_description() -> String {
    "Hermes Messenger for Rust".to_string()
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            session_dir: None,
            device_name: default_device_name(),
            platform: default_platform(),
            app_description: default_app_description(),
        }
    }
}

// =============================================================================
// Hub Settings
// =============================================================================

/// Settings for the realtime hub connection.
///
/// ## Reconnect Policy
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                       Hub Reconnect Schedule                            │
/// │                                                                         │
/// │  attempt 1   wait 5s                                                    │
/// │  attempt 2   wait 10s                                                   │
/// │  attempt 3   wait 20s            (doubling, with jitter)                │
/// │  attempt 4   wait 40s                                                   │
/// │  attempt 5   wait 80s                                                   │
/// │  attempt 6+  wait 120s           (capped, retries forever)              │
/// │                                                                         │
/// │  Any successful connection resets the schedule to 5s.                   │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Path of the messaging hub, appended to the API base URL.
    #[serde(default = "default_hub_path")]
    pub hub_path: String,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Initial backoff before the first reconnect attempt (seconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    /// Backoff cap (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Capacity of the outbound receipt queue. Receipts submitted while
    /// the hub is down are dropped once this fills.
    #[serde(default = "default_outgoing_queue")]
    pub outgoing_queue_size: usize,
}

fn default_hub_path() -> String {
    "/messaging".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_initial_backoff() -> u64 {
    5
}

fn default_max_backoff() -> u64 {
    120
}

fn default_outgoing_queue() -> usize {
    64
}

impl Default for HubSettings {
    fn default() -> Self {
        HubSettings {
            hub_path: default_hub_path(),
            connect_timeout_secs: default_connect_timeout(),
            initial_backoff_secs: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            outgoing_queue_size: default_outgoing_queue(),
        }
    }
}

// =============================================================================
// Push Settings
// =============================================================================

/// Settings for the push notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSettings {
    /// Host:port of the push endpoint.
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,

    /// Whether to wrap the push socket in TLS.
    /// Disabled only by tests talking to a local fake.
    #[serde(default = "default_true")]
    pub use_tls: bool,

    /// Device check-in endpoint.
    #[serde(default = "default_checkin_url")]
    pub checkin_url: String,

    /// Token registration endpoint.
    #[serde(default = "default_register_url")]
    pub register_url: String,

    /// Upstream sender the token registration is scoped to.
    #[serde(default = "default_sender_id")]
    pub sender_id: String,

    /// Package name presented during registration.
    #[serde(default = "default_app_package")]
    pub app_package: String,

    /// SHA1 of the signing certificate presented during registration.
    #[serde(default = "default_apk_cert")]
    pub apk_cert_sha1: String,

    /// Keep-alive ping interval (seconds).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

fn default_push_endpoint() -> String {
    "mtalk.google.com:5228".to_string()
}

fn default_true() -> bool {
    true
}

fn default_checkin_url() -> String {
    "https://android.clients.google.com/checkin".to_string()
}

fn default_register_url() -> String {
    "https://android.clients.google.com/c2dm/register3".to_string()
}

fn default_sender_id() -> String {
    "571894001081".to_string()
}

fn default_app_package() -> String {
    "com.garmin.android.apps.messenger".to_string()
}

fn default_apk_cert() -> String {
    "9a421ecf21f9db35d98287cbfca9b6f29b1dadd5".to_string()
}

fn default_heartbeat_interval() -> u64 {
    300
}

impl Default for PushSettings {
    fn default() -> Self {
        PushSettings {
            endpoint: default_push_endpoint(),
            use_tls: true,
            checkin_url: default_checkin_url(),
            register_url: default_register_url(),
            sender_id: default_sender_id(),
            app_package: default_app_package(),
            apk_cert_sha1: default_apk_cert(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

// =============================================================================
// Delivery Settings
// =============================================================================

/// Settings for the delivery coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySettings {
    /// Upper bound on the start-up catch-up episode (seconds).
    #[serde(default = "default_catchup_timeout")]
    pub catchup_timeout_secs: u64,

    /// Number of message IDs the dedup cache holds before resetting.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

fn default_catchup_timeout() -> u64 {
    15
}

fn default_dedup_capacity() -> usize {
    1024
}

impl Default for DeliverySettings {
    fn default() -> Self {
        DeliverySettings {
            catchup_timeout_secs: default_catchup_timeout(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

// =============================================================================
// Main Live Configuration
// =============================================================================

/// Complete realtime delivery configuration.
///
/// ## Example Config File
/// ```toml
/// [api]
/// base_url = "https://hermes.inreachapp.com"
///
/// [session]
/// device_name = "workstation"
///
/// [hub]
/// initial_backoff_secs = 5
/// max_backoff_secs = 120
///
/// [delivery]
/// catchup_timeout_secs = 15
/// dedup_capacity = 1024
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveConfig {
    /// REST backend settings.
    #[serde(default)]
    pub api: ApiSettings,

    /// Local session settings.
    #[serde(default)]
    pub session: SessionSettings,

    /// Hub connection settings.
    #[serde(default)]
    pub hub: HubSettings,

    /// Push channel settings.
    #[serde(default)]
    pub push: PushSettings,

    /// Delivery coordinator settings.
    #[serde(default)]
    pub delivery: DeliverySettings,
}

impl LiveConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (live.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> LiveResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading live config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| LiveError::ConfigLoadFailed(e.to_string()))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load live config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> LiveResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| LiveError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LiveError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| LiveError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Live config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LiveResult<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(LiveError::InvalidUrl(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.hub.initial_backoff_secs == 0
            || self.hub.initial_backoff_secs > self.hub.max_backoff_secs
        {
            return Err(LiveError::InvalidConfig(format!(
                "hub backoff range is invalid: initial {}s, max {}s",
                self.hub.initial_backoff_secs, self.hub.max_backoff_secs
            )));
        }

        if self.delivery.catchup_timeout_secs == 0 {
            return Err(LiveError::InvalidConfig(
                "catchup_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.delivery.dedup_capacity == 0 {
            return Err(LiveError::InvalidConfig(
                "dedup_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(base) = std::env::var("HERMES_API_BASE") {
            debug!(base = %base, "Overriding API base URL from environment");
            self.api.base_url = base;
        }

        if let Ok(dir) = std::env::var("HERMES_SESSION_DIR") {
            debug!(dir = %dir, "Overriding session dir from environment");
            self.session.session_dir = Some(PathBuf::from(dir));
        }

        if let Ok(name) = std::env::var("HERMES_DEVICE_NAME") {
            self.session.device_name = name;
        }

        if let Ok(endpoint) = std::env::var("HERMES_PUSH_ENDPOINT") {
            debug!(endpoint = %endpoint, "Overriding push endpoint from environment");
            self.push.endpoint = endpoint;
        }

        if let Ok(secs) = std::env::var("HERMES_CATCHUP_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.delivery.catchup_timeout_secs = s;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "hermes", "messenger").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("live.toml")
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the directory holding credential files, creating nothing.
    ///
    /// Falls back to the platform data directory, then to `.` as a last
    /// resort (containerized environments without a home directory).
    pub fn session_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.session.session_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("com", "hermes", "messenger")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Returns the full hub URL (API base + hub path).
    pub fn hub_url(&self) -> String {
        format!(
            "{}{}",
            self.api.base_url.trim_end_matches('/'),
            self.hub.hub_path
        )
    }

    /// Returns the REST base URL with no trailing slash.
    pub fn api_base(&self) -> &str {
        self.api.base_url.trim_end_matches('/')
    }
}
