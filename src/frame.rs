//! Transport frames: envelopes as URL-fragment key/value sets.
//!
//! Two profiles share the same envelopes:
//!
//! - **Simple**: `#req=<base64url(JSON)>` / `#res=<base64url(JSON)>`
//! - **OID4VP**: query-style parameters mirroring OpenID for Verifiable
//!   Presentations (`client_id`, `response_type=vp_token`,
//!   `response_mode=fragment`, `state`, `nonce`, `dcql_query` on the way out;
//!   `vp_token` + `smart_artifacts`, `sealed`, or `error` on the way back)
//!
//! Envelope content only ever lives after the `#`. Nothing here touches the
//! path or query string of a URL.

use crate::defaults::*;
use crate::envelope::codec;
use crate::envelope::wire::ResultWire;
use crate::envelope::{
    RequestEnvelope, ResponseEnvelope, ResponseResult, SuccessPayload,
};
use crate::error::EnvelopeError;
use crate::shared::{Nonce, State};

/// Wire profile for frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Simple,
    Oid4vp,
}

impl Profile {
    /// The profile a request frame was written in.
    pub fn of_request(frame: &Frame) -> Profile {
        if frame.contains(FRAGMENT_REQUEST) {
            Profile::Simple
        } else {
            Profile::Oid4vp
        }
    }
}

// ─── Frame ───────────────────────────────────────────────────────────────────

/// Ordered, percent-decoded fragment parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    params: Vec<(String, String)>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a fragment (with or without the leading `#`).
    ///
    /// Pairs without `=` become keys with an empty value. Fails only on
    /// invalid percent-encoding.
    pub fn parse(fragment: &str) -> Result<Self, EnvelopeError> {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
        let mut params = Vec::new();
        for pair in fragment.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            params.push((percent_decode(k)?, percent_decode(v)?));
        }
        Ok(Self { params })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.params.push((key.to_string(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Render as fragment text, without the leading `#`.
    pub fn to_fragment(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn require(&self, key: &'static str) -> Result<&str, EnvelopeError> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or(EnvelopeError::MissingField(key))
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_fragment())
    }
}

fn percent_decode(s: &str) -> Result<String, EnvelopeError> {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .map_err(|e| EnvelopeError::Fragment(e.to_string()))
}

// ─── URL helpers ─────────────────────────────────────────────────────────────

/// Split a URL into the part before `#` and the fragment, if any.
pub fn split_fragment(url: &str) -> (&str, Option<&str>) {
    match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    }
}

/// The URL with any fragment removed.
pub fn strip_fragment(url: &str) -> &str {
    split_fragment(url).0
}

/// `base` (with any existing fragment replaced) followed by `#frame`.
pub fn with_fragment(base: &str, frame: &Frame) -> String {
    format!("{}#{}", strip_fragment(base), frame.to_fragment())
}

// ─── Requests ────────────────────────────────────────────────────────────────

pub fn request_frame(envelope: &RequestEnvelope, profile: Profile) -> Result<Frame, EnvelopeError> {
    let mut frame = Frame::new();
    match profile {
        Profile::Simple => {
            frame.push(FRAGMENT_REQUEST, codec::encode_request(envelope)?);
        }
        Profile::Oid4vp => {
            let nonce = envelope
                .nonce
                .as_ref()
                .ok_or(EnvelopeError::MissingField("nonce"))?;
            frame.push(
                PARAM_CLIENT_ID,
                format!("{}{}", CLIENT_ID_PREFIX, envelope.return_url),
            );
            frame.push(PARAM_RESPONSE_TYPE, RESPONSE_TYPE_VP_TOKEN);
            frame.push(PARAM_RESPONSE_MODE, RESPONSE_MODE_FRAGMENT);
            frame.push(PARAM_STATE, envelope.state.as_str());
            frame.push(PARAM_NONCE, nonce.as_str());
            frame.push(PARAM_DCQL_QUERY, serde_json::to_string(&envelope.query)?);
            if let Some(key) = &envelope.recipient_key {
                frame.push(PARAM_RECIPIENT_KEY, key.to_base64url());
            }
        }
    }
    Ok(frame)
}

/// Decode a request from a frame in either profile.
///
/// `Ok(None)` means the frame carries no request at all.
pub fn parse_request(frame: &Frame) -> Result<Option<RequestEnvelope>, EnvelopeError> {
    if let Some(text) = frame.get(FRAGMENT_REQUEST) {
        return codec::decode_request(text).map(Some);
    }
    if !frame.contains(PARAM_DCQL_QUERY) && !frame.contains(PARAM_CLIENT_ID) {
        return Ok(None);
    }

    let client_id = frame.require(PARAM_CLIENT_ID)?;
    let return_url = client_id
        .strip_prefix(CLIENT_ID_PREFIX)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| EnvelopeError::UnexpectedValue {
            field: PARAM_CLIENT_ID,
            value: client_id.to_string(),
        })?;

    let response_type = frame.require(PARAM_RESPONSE_TYPE)?;
    if response_type != RESPONSE_TYPE_VP_TOKEN {
        return Err(EnvelopeError::UnexpectedValue {
            field: PARAM_RESPONSE_TYPE,
            value: response_type.to_string(),
        });
    }
    if let Some(mode) = frame.get(PARAM_RESPONSE_MODE) {
        if mode != RESPONSE_MODE_FRAGMENT {
            return Err(EnvelopeError::UnexpectedValue {
                field: PARAM_RESPONSE_MODE,
                value: mode.to_string(),
            });
        }
    }

    let state = State::new(frame.require(PARAM_STATE)?);
    let nonce = Nonce::new(frame.require(PARAM_NONCE)?);
    let query = serde_json::from_str(frame.require(PARAM_DCQL_QUERY)?)?;
    let recipient_key = frame
        .get(PARAM_RECIPIENT_KEY)
        .map(|k| {
            crate::seal::RecipientKey::from_base64url(k).map_err(|e| {
                EnvelopeError::UnexpectedValue {
                    field: PARAM_RECIPIENT_KEY,
                    value: e.to_string(),
                }
            })
        })
        .transpose()?;

    let envelope = RequestEnvelope {
        version: PROTOCOL_VERSION,
        state,
        nonce: Some(nonce),
        return_url: return_url.to_string(),
        query,
        recipient_key,
    };
    if let Some(dup) = envelope.query.duplicate_id() {
        return Err(EnvelopeError::DuplicateItemId(dup.to_string()));
    }
    Ok(Some(envelope))
}

// ─── Responses ───────────────────────────────────────────────────────────────

pub fn response_frame(
    envelope: &ResponseEnvelope,
    profile: Profile,
) -> Result<Frame, EnvelopeError> {
    let mut frame = Frame::new();
    match profile {
        Profile::Simple => {
            frame.push(FRAGMENT_RESPONSE, codec::encode_response(envelope)?);
        }
        Profile::Oid4vp => {
            match &envelope.result {
                ResponseResult::Success(payload) => {
                    frame.push(PARAM_VP_TOKEN, serde_json::to_string(&payload.answers)?);
                    frame.push(
                        PARAM_SMART_ARTIFACTS,
                        serde_json::to_string(&payload.artifacts)?,
                    );
                }
                ResponseResult::Sealed(sealed) => {
                    frame.push(PARAM_SEALED, serde_json::to_string(sealed)?);
                }
                ResponseResult::Error(err) => {
                    frame.push(PARAM_ERROR, err.code.as_str());
                    if let Some(description) = &err.description {
                        frame.push(PARAM_ERROR_DESCRIPTION, description.as_str());
                    }
                }
            }
            frame.push(PARAM_STATE, envelope.state.as_str());
        }
    }
    Ok(frame)
}

/// Decode a response from a frame in either profile.
///
/// `Ok(None)` means the frame carries no response at all.
pub fn parse_response(frame: &Frame) -> Result<Option<ResponseEnvelope>, EnvelopeError> {
    if let Some(text) = frame.get(FRAGMENT_RESPONSE) {
        return codec::decode_response(text).map(Some);
    }
    let has_result = frame.contains(PARAM_VP_TOKEN)
        || frame.contains(PARAM_SEALED)
        || frame.contains(PARAM_ERROR);
    if !has_result {
        return Ok(None);
    }

    let state = State::new(frame.require(PARAM_STATE)?);
    let result = match frame.get(PARAM_VP_TOKEN) {
        Some(vp_token) => Some(SuccessPayload {
            answers: serde_json::from_str(vp_token)?,
            artifacts: match frame.get(PARAM_SMART_ARTIFACTS) {
                Some(artifacts) => serde_json::from_str(artifacts)?,
                None => Vec::new(),
            },
        }),
        None => None,
    };
    let sealed = frame
        .get(PARAM_SEALED)
        .map(serde_json::from_str)
        .transpose()?;

    let wire = ResultWire {
        result,
        sealed,
        error: frame.get(PARAM_ERROR).map(str::to_string),
        error_description: frame.get(PARAM_ERROR_DESCRIPTION).map(str::to_string),
    };

    Ok(Some(ResponseEnvelope {
        version: PROTOCOL_VERSION,
        state,
        result: ResponseResult::try_from(wire)?,
    }))
}
