//! Conversions between wire shapes and validated domain types.

use crate::defaults::PROTOCOL_VERSION;
use crate::envelope::wire::{RelayWire, RequestWire, ResponseWire, ResultWire};
use crate::envelope::{RemoteError, RequestEnvelope, ResponseEnvelope, ResponseResult};
use crate::error::EnvelopeError;
use crate::relay::RelayMessage;
use crate::shared::State;

// ─── Shared checks ───────────────────────────────────────────────────────────

pub(crate) fn check_version(v: Option<u32>) -> Result<u32, EnvelopeError> {
    match v {
        None => Err(EnvelopeError::MissingField("v")),
        Some(PROTOCOL_VERSION) => Ok(PROTOCOL_VERSION),
        Some(other) => Err(EnvelopeError::UnsupportedVersion(other)),
    }
}

pub(crate) fn check_state(state: Option<State>) -> Result<State, EnvelopeError> {
    match state {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(EnvelopeError::MissingField("state")),
    }
}

// ─── Request ─────────────────────────────────────────────────────────────────

impl From<&RequestEnvelope> for RequestWire {
    fn from(env: &RequestEnvelope) -> Self {
        Self {
            v: Some(env.version),
            state: Some(env.state.clone()),
            nonce: env.nonce.clone(),
            return_url: Some(env.return_url.clone()),
            query: Some(env.query.clone()),
            recipient_key: env.recipient_key.clone(),
        }
    }
}

impl TryFrom<RequestWire> for RequestEnvelope {
    type Error = EnvelopeError;

    fn try_from(wire: RequestWire) -> Result<Self, Self::Error> {
        let version = check_version(wire.v)?;
        let state = check_state(wire.state)?;
        let return_url = wire
            .return_url
            .filter(|u| !u.is_empty())
            .ok_or(EnvelopeError::MissingField("returnUrl"))?;
        let query = wire.query.ok_or(EnvelopeError::MissingField("query"))?;
        if let Some(dup) = query.duplicate_id() {
            return Err(EnvelopeError::DuplicateItemId(dup.to_string()));
        }

        Ok(Self {
            version,
            state,
            nonce: wire.nonce,
            return_url,
            query,
            recipient_key: wire.recipient_key,
        })
    }
}

// ─── Result ──────────────────────────────────────────────────────────────────

impl From<&ResponseResult> for ResultWire {
    fn from(result: &ResponseResult) -> Self {
        match result {
            ResponseResult::Success(payload) => Self {
                result: Some(payload.clone()),
                ..Default::default()
            },
            ResponseResult::Sealed(sealed) => Self {
                sealed: Some(sealed.clone()),
                ..Default::default()
            },
            ResponseResult::Error(err) => Self {
                error: Some(err.code.clone()),
                error_description: err.description.clone(),
                ..Default::default()
            },
        }
    }
}

impl TryFrom<ResultWire> for ResponseResult {
    type Error = EnvelopeError;

    fn try_from(wire: ResultWire) -> Result<Self, EnvelopeError> {
        match (wire.result, wire.sealed, wire.error) {
            (Some(payload), None, None) => {
                payload.validate()?;
                Ok(Self::Success(payload))
            }
            (None, Some(sealed), None) => Ok(Self::Sealed(sealed)),
            (None, None, Some(code)) => Ok(Self::Error(RemoteError {
                code,
                description: wire.error_description,
            })),
            (None, None, None) => Err(EnvelopeError::MissingField("result")),
            _ => Err(EnvelopeError::AmbiguousResult),
        }
    }
}

// ─── Response ────────────────────────────────────────────────────────────────

impl From<&ResponseEnvelope> for ResponseWire {
    fn from(env: &ResponseEnvelope) -> Self {
        Self {
            v: Some(env.version),
            state: Some(env.state.clone()),
            body: ResultWire::from(&env.result),
        }
    }
}

impl TryFrom<ResponseWire> for ResponseEnvelope {
    type Error = EnvelopeError;

    fn try_from(wire: ResponseWire) -> Result<Self, Self::Error> {
        Ok(Self {
            version: check_version(wire.v)?,
            state: check_state(wire.state)?,
            result: ResponseResult::try_from(wire.body)?,
        })
    }
}

// ─── Relay message ───────────────────────────────────────────────────────────

impl From<&RelayMessage> for RelayWire {
    fn from(msg: &RelayMessage) -> Self {
        Self {
            state: Some(msg.state.clone()),
            body: ResultWire::from(&msg.result),
        }
    }
}

impl TryFrom<RelayWire> for RelayMessage {
    type Error = EnvelopeError;

    fn try_from(wire: RelayWire) -> Result<Self, Self::Error> {
        Ok(Self {
            state: check_state(wire.state)?,
            result: ResponseResult::try_from(wire.body)?,
        })
    }
}
