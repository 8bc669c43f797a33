//! # hermes-core: Pure Wire & Data Models for the Hermes Messenger Client
//!
//! This crate defines every payload shape exchanged with the Hermes backend
//! as plain serde types, plus the identifier codecs the backend expects.
//! There is zero I/O here.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Hermes Messenger Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Front ends (CLI, bridges)                       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 hermes-live (delivery core)                     │   │
//! │  │    auth ──► hub ──► push ──► coordinator ──► REST boundary     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ hermes-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐       ┌───────────┐       ┌───────────┐        │   │
//! │  │   │  models   │       │  otauuid  │       │   error   │        │   │
//! │  │   │ Message   │       │ bit-packed│       │ CoreError │        │   │
//! │  │   │ Receipt   │       │ satellite │       │           │        │   │
//! │  │   │ Auth DTOs │       │ ids       │       │           │        │   │
//! │  │   └───────────┘       └───────────┘       └───────────┘        │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO FILES • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`models`] - Payload shapes (messages, conversations, receipts, auth)
//! - [`otauuid`] - Over-the-air UUID generation (satellite message identity)
//! - [`error`] - Model/codec error types
//!
//! ## Design Principles
//!
//! 1. **One shape, one place**: every backend payload is defined exactly once
//! 2. **No I/O**: network, file system, and async code are FORBIDDEN here
//! 3. **Lossless decode**: field aliases cover both REST and push spellings
//! 4. **Explicit Errors**: all errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod models;
pub mod otauuid;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use hermes_core::MessageModel` instead of
// `use hermes_core::models::MessageModel`

pub use error::{CoreError, CoreResult};
pub use models::*;
pub use otauuid::{generate_ota_uuid, OtaUuidParams};
