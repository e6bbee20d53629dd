//! # SMART Health Check-in SDK
//!
//! A unified Rust SDK for the browser credential-exchange handshake
//! supporting both native and WASM targets.
//!
//! A requester opens a picker in a transient context with a request carried
//! in the URL fragment. A source answers by navigating back to the
//! requester's return URL. The return page forwards the answer over a
//! same-origin relay to the waiting requester, which correlates it by
//! `state`.
//!
//! ## Architecture
//!
//! The SDK is organized in layers:
//!
//! 1. **Core**: envelopes, fragment frames, sealing, errors (always available, WASM-safe)
//! 2. **Capabilities**: `Relay` and transport traits, with an in-process relay
//! 3. **Roles**: `Requester` (orchestrator), `ReturnHandler`, source and picker helpers
//! 4. **Browser**: `window.open`, `BroadcastChannel` and `localStorage` bindings (feature `wasm`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use smart_checkin::prelude::*;
//!
//! // Requesting page
//! let query = DcqlQuery::new(vec![CredentialQuery::new(
//!     "coverage-1",
//!     "smart_artifact",
//!     serde_json::json!({"profile": "C4DIC-Coverage"}),
//! )]);
//! let response = request_in_window(query, RequestOptions::new("https://picker.example/")).await?;
//! let coverage = &response.credentials.unwrap()[&ItemId::new("coverage-1")];
//!
//! // Return page, on load
//! maybe_handle_return_in_window(&ReturnOptions::default()).await?;
//! ```

#[cfg(all(target_arch = "wasm32", not(feature = "wasm")))]
compile_error!("building for wasm32 requires the `wasm` feature");

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared newtypes and token generation.
pub mod shared;

/// Request/response envelopes: types, wire types, codec, rehydration.
pub mod envelope;

/// Fragment parameters and the two wire profiles.
pub mod frame;

/// Optional end-to-end payload sealing.
pub mod seal;

/// Unified SDK error types.
pub mod error;

/// Protocol constants.
pub mod defaults;

// ── Layer 2: Capabilities ────────────────────────────────────────────────────

/// Cross-context transport: opening transient contexts, reading fragments.
pub mod transport;

/// Response relay keyed by `state`.
pub mod relay;

// ── Layer 3: Roles ───────────────────────────────────────────────────────────

/// `Requester`: the request orchestrator.
pub mod orchestrator;

/// `ReturnHandler`: forwards responses from the return context.
pub mod return_handler;

/// Source and picker helpers.
pub mod source;

// ── Layer 4: Browser ─────────────────────────────────────────────────────────

/// Entry points bound to the current window.
#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub mod browser;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared newtypes
    pub use crate::shared::{ItemId, Nonce, State};

    // Envelopes
    pub use crate::envelope::{
        rehydrate, rehydrate_for, Artifact, ArtifactRef, ArtifactType, CredentialQuery,
        Credentials, DcqlQuery, RemoteError, RequestEnvelope, ResponseEnvelope, ResponseResult,
        SuccessPayload,
    };
    pub use crate::frame::{Frame, Profile};
    pub use crate::seal::{RecipientKey, SealedPayload, SecretKey};

    // Capabilities
    pub use crate::relay::{Delivery, MalformedMessage, MemoryRelay, Relay, RelayMessage};
    pub use crate::transport::{
        ContextOpener, CurrentContext, Notice, OutboundRequest, TransientContext,
    };

    // Roles
    pub use crate::orchestrator::{CheckinResponse, RequestOptions, Requester};
    pub use crate::return_handler::{ReturnHandler, ReturnOptions};
    pub use crate::source::{decline_url, picker, respond_url, ResponseBuilder};

    // Errors
    pub use crate::error::{CheckinError, ErrorKind};

    // Browser
    #[cfg(all(feature = "wasm", target_arch = "wasm32"))]
    pub use crate::browser::{maybe_handle_return_in_window, request_in_window};
    #[cfg(all(feature = "wasm", target_arch = "wasm32"))]
    pub use crate::relay::wasm::{BroadcastRelay, BrowserRelay, StorageRelay};
    #[cfg(all(feature = "wasm", target_arch = "wasm32"))]
    pub use crate::transport::wasm::BrowserWindow;
}
