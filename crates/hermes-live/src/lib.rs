//! # hermes-live: Real-Time Delivery Core for Hermes
//!
//! This crate keeps a Hermes session alive: a persistent hub connection that
//! reconnects across failures, a push catch-up channel raced against it at
//! start-up, and a coordinator that merges both into one deduplicated stream
//! of delivery events.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Delivery Core Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                DeliveryCoordinator (Orchestrator)                │  │
//! │  │                                                                  │  │
//! │  │  start/stop lifecycle, catch-up episode time box,                │  │
//! │  │  dedup-filtered fan-in, delivery receipts                        │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  HubTransport  │  │ PushTransport  │  │     RestClient         │    │
//! │  │                │  │                │  │                        │    │
//! │  │ negotiate + WS │  │ check-in,      │  │ conversations,         │    │
//! │  │ auto-reconnect │  │ login, framed  │  │ statuses, receipt      │    │
//! │  │ 5s..120s       │  │ protobuf, no   │  │ fallbacks              │    │
//! │  │ backoff        │  │ self-reconnect │  │                        │    │
//! │  └───────┬────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │          │                   │                       │                  │
//! │          └───────────────────┴───────────┬───────────┘                  │
//! │                                          ▼                              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                       TokenAuthority                             │   │
//! │  │                                                                 │   │
//! │  │ OTP registration, single-flight token refresh,                  │   │
//! │  │ credential persistence (0600)                                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`coordinator`] - `DeliveryCoordinator` orchestrator and event stream
//! - [`hub`] - persistent hub connection with reconnect backoff
//! - [`signalr`] - hub wire codec (0x1E-framed JSON, negotiate model)
//! - [`push`] - push catch-up transport (check-in, register, listen)
//! - [`pushwire`] - push wire codec (tag/varint framing, protobuf stanzas)
//! - [`dedup`] - bounded message-id dedup cache
//! - [`auth`] - `TokenAuthority`: registration and single-flight refresh
//! - [`credentials`] - session credential persistence
//! - [`rest`] - authenticated REST boundary
//! - [`config`] - TOML configuration with env overrides
//! - [`error`] - `LiveError` taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hermes_live::{DeliveryCoordinator, DeliveryEvent, ListenOptions, LiveConfig};
//!
//! let config = LiveConfig::load_or_default(None);
//! let coordinator = Arc::new(DeliveryCoordinator::new(config)?);
//! let mut events = coordinator.events()?;
//!
//! coordinator.start_listening(ListenOptions::default()).await?;
//! while let Some(event) = events.recv().await {
//!     if let DeliveryEvent::Message(message) = event {
//!         println!("{}", message.message_body.unwrap_or_default());
//!     }
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod dedup;
pub mod error;
pub mod hub;
pub mod push;
pub mod pushwire;
pub mod rest;
pub mod signalr;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::TokenAuthority;
pub use config::LiveConfig;
pub use coordinator::{DeliveryCoordinator, DeliveryEvent, ListenOptions};
pub use credentials::{CredentialStore, StoredCredentials};
pub use dedup::DedupCache;
pub use error::{LiveError, LiveResult};
pub use hub::{HubState, HubTransport};
pub use push::{PushState, PushTransport};
pub use rest::RestClient;
