//! Wire shapes for envelopes and relay messages.
//!
//! Every field is optional so decoding can report precisely which required
//! field is missing instead of a generic serde error. Validation happens in
//! `convert`.

use serde::{Deserialize, Serialize};

use crate::envelope::{DcqlQuery, SuccessPayload};
use crate::seal::{RecipientKey, SealedPayload};
use crate::shared::{Nonce, State};

/// Simple-profile request envelope (`#req=`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Nonce>,
    #[serde(rename = "returnUrl", default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<DcqlQuery>,
    #[serde(rename = "recipientKey", default, skip_serializing_if = "Option::is_none")]
    pub recipient_key: Option<RecipientKey>,
}

/// The result-bearing fields shared by responses and relay messages.
///
/// Exactly one of `result`, `sealed` or `error` must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SuccessPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealed: Option<SealedPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Simple-profile response envelope (`#res=`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
    #[serde(flatten)]
    pub body: ResultWire,
}

/// Relay message as posted on a broadcast channel: `{state, result}` or
/// `{state, error, error_description}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
    #[serde(flatten)]
    pub body: ResultWire,
}
