//! Protocol constants for the check-in handshake.

use std::time::Duration;

/// Envelope protocol version. Decoding rejects anything else.
pub const PROTOCOL_VERSION: u32 = 1;

/// Relay channel names are this prefix followed by the exchange `state`.
pub const CHANNEL_PREFIX: &str = "smart-checkin:";

/// How long a requester waits for a response before timing out.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// `client_id` prefix in the OID4VP profile. Only the origin of the return
/// URL is authenticated, never an asserted identity.
pub const CLIENT_ID_PREFIX: &str = "redirect_uri:";

/// `localStorage` key prefix used by the storage-event relay.
pub const STORAGE_KEY_PREFIX: &str = "smart-checkin-relay:";

// ─── Fragment keys ───────────────────────────────────────────────────────────

/// Simple profile: encoded request envelope.
pub const FRAGMENT_REQUEST: &str = "req";
/// Simple profile: encoded response envelope.
pub const FRAGMENT_RESPONSE: &str = "res";

pub const PARAM_CLIENT_ID: &str = "client_id";
pub const PARAM_RESPONSE_TYPE: &str = "response_type";
pub const PARAM_RESPONSE_MODE: &str = "response_mode";
pub const PARAM_STATE: &str = "state";
pub const PARAM_NONCE: &str = "nonce";
pub const PARAM_DCQL_QUERY: &str = "dcql_query";
pub const PARAM_RECIPIENT_KEY: &str = "recipient_key";
pub const PARAM_VP_TOKEN: &str = "vp_token";
pub const PARAM_SMART_ARTIFACTS: &str = "smart_artifacts";
pub const PARAM_SEALED: &str = "sealed";
pub const PARAM_ERROR: &str = "error";
pub const PARAM_ERROR_DESCRIPTION: &str = "error_description";

pub const RESPONSE_TYPE_VP_TOKEN: &str = "vp_token";
pub const RESPONSE_MODE_FRAGMENT: &str = "fragment";
