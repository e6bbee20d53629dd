//! Request and response envelopes.
//!
//! Domain types live here. `wire` holds the lenient serde shapes that travel
//! inside fragments and over the relay, `convert` validates wire → domain,
//! `codec` turns envelopes into fragment-safe text, and `rehydrate` resolves
//! artifact references into a per-item view.

pub mod codec;
pub mod convert;
pub mod rehydrate;
pub mod wire;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::defaults::PROTOCOL_VERSION;
use crate::seal::{RecipientKey, SealedPayload};
use crate::shared::{ItemId, Nonce, State};

pub use codec::{decode_request, decode_response, encode_request, encode_response};
pub use rehydrate::{rehydrate, rehydrate_for, Credentials};

// ─── Query ───────────────────────────────────────────────────────────────────

/// A DCQL-shaped query: the list of credentials being requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DcqlQuery {
    pub credentials: Vec<CredentialQuery>,
}

impl DcqlQuery {
    pub fn new(credentials: Vec<CredentialQuery>) -> Self {
        Self { credentials }
    }

    pub fn item_ids(&self) -> impl Iterator<Item = &ItemId> {
        self.credentials.iter().map(|c| &c.id)
    }

    /// The first item id that appears more than once, if any.
    pub fn duplicate_id(&self) -> Option<&ItemId> {
        let mut seen = std::collections::HashSet::new();
        self.item_ids().find(|id| !seen.insert(*id))
    }
}

/// One requested credential.
///
/// `meta` is format-specific constraint data interpreted only by the source:
/// a canonical profile reference, an embedded questionnaire, a signing
/// strategy preference list, and so on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialQuery {
    pub id: ItemId,
    pub format: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

impl CredentialQuery {
    pub fn new(id: impl Into<ItemId>, format: impl Into<String>, meta: Value) -> Self {
        Self {
            id: id.into(),
            format: format.into(),
            meta,
        }
    }
}

// ─── Request envelope ────────────────────────────────────────────────────────

/// Created once per exchange by the requester. Opaque to the picker.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub version: u32,
    pub state: State,
    /// Present in the OID4VP profile only.
    pub nonce: Option<Nonce>,
    /// Origin + path the response is delivered to. Never carries a fragment.
    pub return_url: String,
    pub query: DcqlQuery,
    /// Requester's public key when the sealed payload path is enabled.
    pub recipient_key: Option<RecipientKey>,
}

impl RequestEnvelope {
    pub fn new(state: State, return_url: impl Into<String>, query: DcqlQuery) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            state,
            nonce: None,
            return_url: return_url.into(),
            query,
            recipient_key: None,
        }
    }

    pub fn with_nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_recipient_key(mut self, key: RecipientKey) -> Self {
        self.recipient_key = Some(key);
        self
    }
}

// ─── Response envelope ───────────────────────────────────────────────────────

/// Created once by the source. `state` must equal the request's `state`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub version: u32,
    pub state: State,
    pub result: ResponseResult,
}

impl ResponseEnvelope {
    pub fn new(state: State, result: ResponseResult) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            state,
            result,
        }
    }

    /// Fail with `StateMismatch` unless this response answers `expected`.
    pub fn ensure_state(&self, expected: &State) -> Result<(), crate::error::CheckinError> {
        if &self.state == expected {
            Ok(())
        } else {
            Err(crate::error::CheckinError::StateMismatch {
                expected: expected.clone(),
                actual: self.state.clone(),
            })
        }
    }
}

/// Outcome carried by a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseResult {
    /// Artifacts in the clear.
    Success(SuccessPayload),
    /// Artifacts encrypted to the requester's `recipient_key`.
    Sealed(SealedPayload),
    /// The source declined or could not answer.
    Error(RemoteError),
}

impl ResponseResult {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Explicit error result from the source (e.g. `access_denied`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub code: String,
    pub description: Option<String>,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, description: Option<String>) -> Self {
        Self {
            code: code.into(),
            description,
        }
    }
}

// ─── Success payload ─────────────────────────────────────────────────────────

/// Artifacts plus the many-to-many mapping of which artifacts answer which
/// request items.
///
/// One artifact can satisfy several items without being duplicated. Item ids
/// absent from `answers` were not granted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SuccessPayload {
    #[serde(rename = "vp_token", default)]
    pub answers: BTreeMap<ItemId, Vec<ArtifactRef>>,
    #[serde(rename = "smart_artifacts", default)]
    pub artifacts: Vec<Artifact>,
}

impl SuccessPayload {
    /// Check every reference points into `artifacts`.
    pub fn validate(&self) -> Result<(), crate::error::EnvelopeError> {
        let len = self.artifacts.len();
        for (item, refs) in &self.answers {
            if let Some(bad) = refs.iter().find(|r| r.artifact >= len) {
                return Err(crate::error::EnvelopeError::ArtifactOutOfRange {
                    item: item.to_string(),
                    index: bad.artifact,
                    len,
                });
            }
        }
        Ok(())
    }
}

/// Reference from a request item to an entry in the artifact array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub artifact: usize,
}

impl From<usize> for ArtifactRef {
    fn from(artifact: usize) -> Self {
        Self { artifact }
    }
}

/// A typed unit of returned credential data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub data: Value,
}

impl Artifact {
    pub fn new(artifact_type: ArtifactType, data: Value) -> Self {
        Self {
            artifact_type,
            data,
        }
    }
}

/// Closed set of artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// Raw structured FHIR resource.
    FhirResource,
    /// Signed compact credential (JWS).
    SmartHealthCard,
    /// SMART Health Link reference.
    Shl,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FhirResource => "fhir_resource",
            Self::SmartHealthCard => "smart_health_card",
            Self::Shl => "shl",
        }
    }
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicate_id_detected() {
        let query = DcqlQuery::new(vec![
            CredentialQuery::new("a", "smart_artifact", Value::Null),
            CredentialQuery::new("b", "smart_artifact", Value::Null),
            CredentialQuery::new("a", "smart_artifact", Value::Null),
        ]);
        assert_eq!(query.duplicate_id(), Some(&ItemId::new("a")));
    }

    #[test]
    fn test_artifact_type_wire_names() {
        let artifact = Artifact::new(ArtifactType::SmartHealthCard, json!("eyJ..."));
        let v = serde_json::to_value(&artifact).unwrap();
        assert_eq!(v["type"], "smart_health_card");
        assert_eq!(v["data"], "eyJ...");
    }

    #[test]
    fn test_unknown_artifact_type_rejected() {
        let err = serde_json::from_value::<Artifact>(json!({"type": "pdf", "data": {}}));
        assert!(err.is_err());
    }

    #[test]
    fn test_payload_validate_out_of_range() {
        let mut answers = BTreeMap::new();
        answers.insert(ItemId::new("a"), vec![ArtifactRef::from(1)]);
        let payload = SuccessPayload {
            answers,
            artifacts: vec![Artifact::new(ArtifactType::Shl, json!("shlink:/..."))],
        };
        assert!(matches!(
            payload.validate(),
            Err(crate::error::EnvelopeError::ArtifactOutOfRange { index: 1, len: 1, .. })
        ));
    }

    #[test]
    fn test_meta_omitted_when_null() {
        let q = CredentialQuery::new("coverage-1", "smart_artifact", Value::Null);
        let v = serde_json::to_value(&q).unwrap();
        assert!(v.get("meta").is_none());
    }

    #[test]
    fn test_ensure_state() {
        let state = State::new("s1");
        let response = ResponseEnvelope::new(
            state.clone(),
            ResponseResult::Error(RemoteError::new("access_denied", None)),
        );
        assert!(response.ensure_state(&state).is_ok());
        let err = response.ensure_state(&State::new("s2")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StateMismatch);
    }
}
