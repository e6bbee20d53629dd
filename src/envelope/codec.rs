//! Envelope codec: JSON, then unpadded base64url.
//!
//! The output alphabet is `[A-Za-z0-9_-]`, so encoded envelopes can sit in a
//! URL fragment without further escaping. Decoding is all-or-nothing.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::envelope::wire::{RequestWire, ResponseWire};
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::EnvelopeError;

/// Emits no padding; accepts input with or without it.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Serialize any value as base64url(JSON).
pub fn encode<T: Serialize>(value: &T) -> Result<String, EnvelopeError> {
    let json = serde_json::to_vec(value)?;
    Ok(URL_SAFE_LENIENT.encode(json))
}

/// Inverse of [`encode`].
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, EnvelopeError> {
    let bytes = URL_SAFE_LENIENT.decode(text.trim().as_bytes())?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn encode_request(envelope: &RequestEnvelope) -> Result<String, EnvelopeError> {
    encode(&RequestWire::from(envelope))
}

pub fn decode_request(text: &str) -> Result<RequestEnvelope, EnvelopeError> {
    RequestEnvelope::try_from(decode::<RequestWire>(text)?)
}

pub fn encode_response(envelope: &ResponseEnvelope) -> Result<String, EnvelopeError> {
    encode(&ResponseWire::from(envelope))
}

pub fn decode_response(text: &str) -> Result<ResponseEnvelope, EnvelopeError> {
    ResponseEnvelope::try_from(decode::<ResponseWire>(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{
        Artifact, ArtifactRef, ArtifactType, CredentialQuery, DcqlQuery, RemoteError,
        ResponseResult, SuccessPayload,
    };
    use crate::shared::{ItemId, Nonce, State};
    use serde_json::json;

    fn sample_request() -> RequestEnvelope {
        let query = DcqlQuery::new(vec![
            CredentialQuery::new(
                "coverage-1",
                "smart_artifact",
                json!({"profile": "http://hl7.org/fhir/us/insurance-card/StructureDefinition/C4DIC-Coverage"}),
            ),
            CredentialQuery::new(
                "intake",
                "smart_artifact",
                json!({"questionnaire": {"resourceType": "Questionnaire", "item": []}}),
            ),
        ]);
        RequestEnvelope::new(State::generate(), "https://clinic.example/checkin", query)
            .with_nonce(Nonce::generate())
    }

    fn sample_payload() -> SuccessPayload {
        let mut payload = SuccessPayload::default();
        payload.artifacts.push(Artifact::new(
            ArtifactType::FhirResource,
            json!({"resourceType": "Coverage", "id": "c1"}),
        ));
        payload
            .answers
            .insert(ItemId::new("coverage-1"), vec![ArtifactRef::from(0)]);
        payload
    }

    #[test]
    fn test_request_roundtrip() {
        let env = sample_request();
        let text = encode_request(&env).unwrap();
        assert_eq!(decode_request(&text).unwrap(), env);
    }

    #[test]
    fn test_response_roundtrip_success_and_error() {
        let ok = ResponseEnvelope::new(State::generate(), ResponseResult::Success(sample_payload()));
        assert_eq!(decode_response(&encode_response(&ok).unwrap()).unwrap(), ok);

        let declined = ResponseEnvelope::new(
            State::generate(),
            ResponseResult::Error(RemoteError::new("access_denied", Some("No thanks".into()))),
        );
        assert_eq!(
            decode_response(&encode_response(&declined).unwrap()).unwrap(),
            declined
        );
    }

    #[test]
    fn test_encoded_text_is_fragment_safe() {
        let text = encode_request(&sample_request()).unwrap();
        assert!(text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(!text.contains('='));
    }

    #[test]
    fn test_padded_input_accepted() {
        let env = sample_request();
        let mut text = encode_request(&env).unwrap();
        while text.len() % 4 != 0 {
            text.push('=');
        }
        assert_eq!(decode_request(&text).unwrap(), env);
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        assert!(matches!(
            decode_request("not*base64!"),
            Err(EnvelopeError::Base64(_))
        ));
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let text = URL_SAFE_LENIENT.encode(b"hello world");
        assert!(matches!(decode_request(&text), Err(EnvelopeError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_missing_state() {
        let text = encode(&json!({"v": 1, "returnUrl": "https://a.example/", "query": {"credentials": []}})).unwrap();
        assert!(matches!(
            decode_request(&text),
            Err(EnvelopeError::MissingField("state"))
        ));
    }

    #[test]
    fn test_decode_rejects_duplicate_ids() {
        let text = encode(&json!({
            "v": 1,
            "state": "abc",
            "returnUrl": "https://a.example/",
            "query": {"credentials": [
                {"id": "x", "format": "smart_artifact"},
                {"id": "x", "format": "smart_artifact"}
            ]}
        }))
        .unwrap();
        assert!(matches!(
            decode_request(&text),
            Err(EnvelopeError::DuplicateItemId(id)) if id == "x"
        ));
    }

    #[test]
    fn test_error_response_wire_shape() {
        let declined = ResponseEnvelope::new(
            State::new("abc"),
            ResponseResult::Error(RemoteError::new("access_denied", None)),
        );
        let value: serde_json::Value = decode(&encode_response(&declined).unwrap()).unwrap();
        assert_eq!(value, json!({"v": 1, "state": "abc", "error": "access_denied"}));
    }
}
