//! Helpers for pages on the other side of the handoff: pickers forwarding the
//! opaque request, and sources building the answer.

use crate::envelope::{
    Artifact, ArtifactRef, RemoteError, RequestEnvelope, ResponseEnvelope, ResponseResult,
    SuccessPayload,
};
use crate::error::{EnvelopeError, SealError};
use crate::frame::{self, Profile};
use crate::seal::{PayloadTransform, X25519ChaCha};
use crate::shared::ItemId;

/// Standard error code for a user declining to share.
pub const ACCESS_DENIED: &str = "access_denied";

// ─── Building answers ────────────────────────────────────────────────────────

/// Accumulates a [`SuccessPayload`]. An artifact answering several items is
/// stored once and referenced from each.
#[derive(Debug, Clone, Default)]
pub struct ResponseBuilder {
    payload: SuccessPayload,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `artifact` for `item`.
    pub fn add(mut self, item: impl Into<ItemId>, artifact: Artifact) -> Self {
        let index = match self.payload.artifacts.iter().position(|a| *a == artifact) {
            Some(index) => index,
            None => {
                self.payload.artifacts.push(artifact);
                self.payload.artifacts.len() - 1
            }
        };
        let refs = self.payload.answers.entry(item.into()).or_default();
        let reference = ArtifactRef::from(index);
        if !refs.contains(&reference) {
            refs.push(reference);
        }
        self
    }

    pub fn build(self) -> SuccessPayload {
        self.payload
    }

    /// The answer `request` asked for: sealed when it carries a recipient
    /// key, in the clear otherwise.
    pub fn into_result(self, request: &RequestEnvelope) -> Result<ResponseResult, SealError> {
        self.into_result_with(request, &X25519ChaCha)
    }

    pub fn into_result_with(
        self,
        request: &RequestEnvelope,
        transform: &dyn PayloadTransform,
    ) -> Result<ResponseResult, SealError> {
        match &request.recipient_key {
            Some(key) => Ok(ResponseResult::Sealed(transform.seal(&self.payload, key)?)),
            None => Ok(ResponseResult::Success(self.payload)),
        }
    }
}

// ─── Return navigation ───────────────────────────────────────────────────────

/// URL the source navigates to in order to hand `result` back.
pub fn respond_url(
    request: &RequestEnvelope,
    result: ResponseResult,
    profile: Profile,
) -> Result<String, EnvelopeError> {
    let envelope = ResponseEnvelope::new(request.state.clone(), result);
    let frame = frame::response_frame(&envelope, profile)?;
    Ok(frame::with_fragment(&request.return_url, &frame))
}

/// URL reporting that the request was not fulfilled.
pub fn decline_url(
    request: &RequestEnvelope,
    code: &str,
    description: Option<&str>,
    profile: Profile,
) -> Result<String, EnvelopeError> {
    let error = RemoteError::new(code, description.map(str::to_string));
    respond_url(request, ResponseResult::Error(error), profile)
}

pub mod picker {
    use super::*;

    /// URL routing the unmodified request on to the chosen source.
    pub fn forward_url(
        source_base_url: &str,
        request: &RequestEnvelope,
        profile: Profile,
    ) -> Result<String, EnvelopeError> {
        let frame = frame::request_frame(request, profile)?;
        Ok(frame::with_fragment(source_base_url, &frame))
    }
}
