//! # Credential Store
//!
//! Persistence for the backend session: access token, refresh token, and
//! the device instance ID issued at registration.
//!
//! ## On-Disk Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      <session_dir>/                                     │
//! │                                                                         │
//! │  hermes_credentials.json   (mode 0600)                                  │
//! │  {                                                                      │
//! │    "access_token":  "eyJhbGciOi...",                                    │
//! │    "refresh_token": "eyJhbGciOi...",                                    │
//! │    "instance_id":   "d2f9...",                                          │
//! │    "expires_at":    1756400000.0     ← unix seconds, fractional ok      │
//! │  }                                                                      │
//! │                                                                         │
//! │  push_credentials.json     (mode 0600, owned by push.rs)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A token counts as expired [`EXPIRY_BUFFER_SECS`] before its actual
//! expiry so in-flight requests never carry a token that dies mid-request.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use hermes_core::AccessAndRefreshToken;

use crate::error::{LiveError, LiveResult};

/// Seconds before actual expiry at which a token counts as expired.
pub const EXPIRY_BUFFER_SECS: f64 = 60.0;

const CREDENTIALS_FILE: &str = "hermes_credentials.json";

// =============================================================================
// Stored Credentials
// =============================================================================

/// The persisted session: token pair plus the registration instance ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub instance_id: String,
    /// Unix timestamp (seconds) when the access token expires.
    pub expires_at: f64,
}

impl StoredCredentials {
    /// Builds credentials from a freshly issued token pair.
    pub fn from_tokens(tokens: &AccessAndRefreshToken, instance_id: String) -> Self {
        StoredCredentials {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            instance_id,
            expires_at: now_unix() + tokens.expires_in as f64,
        }
    }

    /// Returns true once the token is within the expiry buffer.
    pub fn is_expired(&self) -> bool {
        now_unix() >= self.expires_at - EXPIRY_BUFFER_SECS
    }

    /// Seconds of usable lifetime left, zero when inside the buffer.
    pub fn remaining_secs(&self) -> f64 {
        (self.expires_at - EXPIRY_BUFFER_SECS - now_unix()).max(0.0)
    }
}

fn now_unix() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

// =============================================================================
// Credential Store
// =============================================================================

/// Reads and writes the credential file under the session directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Creates a store rooted at the given session directory.
    pub fn new(session_dir: &Path) -> Self {
        CredentialStore {
            path: session_dir.join(CREDENTIALS_FILE),
        }
    }

    /// Path of the credential file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads stored credentials. Returns `Ok(None)` when no session exists.
    pub fn load(&self) -> LiveResult<Option<StoredCredentials>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LiveError::CredentialStore(e.to_string())),
        };

        let creds: StoredCredentials = serde_json::from_str(&data)
            .map_err(|e| LiveError::CredentialStore(format!("parsing {}: {e}", CREDENTIALS_FILE)))?;
        Ok(Some(creds))
    }

    /// Writes credentials with owner-only permissions.
    pub fn save(&self, creds: &StoredCredentials) -> LiveResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LiveError::CredentialStore(e.to_string()))?;
        }

        let data = serde_json::to_string_pretty(creds)
            .map_err(|e| LiveError::CredentialStore(e.to_string()))?;
        std::fs::write(&self.path, data)
            .map_err(|e| LiveError::CredentialStore(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| LiveError::CredentialStore(e.to_string()))?;
        }

        debug!(path = %self.path.display(), "Saved session credentials");
        Ok(())
    }

    /// Deletes the credential file, ignoring a missing file.
    pub fn clear(&self) -> LiveResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LiveError::CredentialStore(e.to_string())),
        }
    }
}
