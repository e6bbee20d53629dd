//! Cross-context transport.
//!
//! Requests travel outward as the fragment of a newly opened context's URL;
//! responses come back as the fragment of the return URL. Fragments never
//! reach a server, so nothing here touches the network.

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub mod wasm;

use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::{EnvelopeError, TransportError};
use crate::frame::{self, Frame, Profile};

// ─── Capabilities ────────────────────────────────────────────────────────────

/// A transient context (popup) opened by the requester. Only its opener may
/// close it.
pub trait TransientContext {
    fn close(&self);
    fn is_closed(&self) -> bool;
}

/// Host primitive for opening transient contexts.
pub trait ContextOpener {
    type Handle: TransientContext;

    /// Open a new context at `url`. Must fail synchronously with
    /// [`TransportError::ContextBlocked`] when the host refuses.
    fn open_context(&self, url: &str) -> Result<Self::Handle, TransportError>;
}

/// The context this code is running in.
pub trait CurrentContext {
    /// Full address, fragment included. Empty when the host cannot report it.
    fn href(&self) -> String;

    /// Self-terminate. Hosts may refuse for contexts not opened by script.
    fn close_self(&self) -> Result<(), TransportError>;

    fn render_notice(&self, notice: &Notice);
}

impl<T: TransientContext + ?Sized> TransientContext for &T {
    fn close(&self) {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

impl<O: ContextOpener + ?Sized> ContextOpener for &O {
    type Handle = O::Handle;

    fn open_context(&self, url: &str) -> Result<Self::Handle, TransportError> {
        (**self).open_context(url)
    }
}

impl<C: CurrentContext + ?Sized> CurrentContext for &C {
    fn href(&self) -> String {
        (**self).href()
    }

    fn close_self(&self) -> Result<(), TransportError> {
        (**self).close_self()
    }

    fn render_notice(&self, notice: &Notice) {
        (**self).render_notice(notice)
    }
}

// ─── Notice ──────────────────────────────────────────────────────────────────

/// Minimal human-readable outcome shown by a return context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success,
    Failure {
        code: String,
        description: Option<String>,
    },
}

impl Notice {
    pub fn title(&self) -> &'static str {
        match self {
            Notice::Success => "Shared successfully",
            Notice::Failure { .. } => "Sharing did not complete",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Notice::Success)
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::Success => write!(f, "{}. You can close this window.", self.title()),
            Notice::Failure {
                code,
                description: Some(description),
            } => write!(f, "{}: {} ({})", self.title(), description, code),
            Notice::Failure {
                code,
                description: None,
            } => write!(f, "{}: {}", self.title(), code),
        }
    }
}

// ─── Outbound ────────────────────────────────────────────────────────────────

/// A request ready to hand off: the envelope and the exact URL that carries
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub envelope: RequestEnvelope,
    pub url: String,
}

/// Encode `envelope` as the fragment of `target_base_url`.
pub fn prepare(
    target_base_url: &str,
    envelope: RequestEnvelope,
    profile: Profile,
) -> Result<OutboundRequest, EnvelopeError> {
    let frame = frame::request_frame(&envelope, profile)?;
    let url = frame::with_fragment(target_base_url, &frame);
    Ok(OutboundRequest { envelope, url })
}

/// Open a transient context carrying `outbound`.
pub fn open<O: ContextOpener>(
    opener: &O,
    outbound: &OutboundRequest,
) -> Result<O::Handle, TransportError> {
    let handle = opener.open_context(&outbound.url)?;
    tracing::debug!(
        "Opened transient context (state={})",
        outbound.envelope.state
    );
    Ok(handle)
}

// ─── Incoming ────────────────────────────────────────────────────────────────

fn incoming_frame<C: CurrentContext>(context: &C) -> Option<Frame> {
    let href = context.href();
    let fragment = frame::split_fragment(&href).1?;
    if fragment.is_empty() {
        return None;
    }
    match Frame::parse(fragment) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::debug!("Ignoring unparseable fragment: {}", e);
            None
        }
    }
}

/// The request this context was opened with, if any.
///
/// Unrelated or malformed fragments yield `None`.
pub fn read_incoming_request<C: CurrentContext>(context: &C) -> Option<RequestEnvelope> {
    read_incoming_request_with_profile(context).map(|(envelope, _)| envelope)
}

/// Like [`read_incoming_request`], also reporting the wire profile so the
/// answer can be written in kind.
pub fn read_incoming_request_with_profile<C: CurrentContext>(
    context: &C,
) -> Option<(RequestEnvelope, Profile)> {
    let frame = incoming_frame(context)?;
    match frame::parse_request(&frame) {
        Ok(envelope) => envelope.map(|e| (e, Profile::of_request(&frame))),
        Err(e) => {
            tracing::warn!("Ignoring malformed incoming request: {}", e);
            None
        }
    }
}

/// The response this context was navigated to with, if any.
///
/// Unrelated or malformed fragments yield `None`.
pub fn read_incoming_response<C: CurrentContext>(context: &C) -> Option<ResponseEnvelope> {
    let frame = incoming_frame(context)?;
    match frame::parse_response(&frame) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Ignoring malformed incoming response: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{CredentialQuery, DcqlQuery, RemoteError, ResponseResult};
    use crate::shared::{Nonce, State};
    use serde_json::json;
    use std::cell::RefCell;

    struct Page {
        href: String,
        notices: RefCell<Vec<Notice>>,
    }

    impl Page {
        fn at(href: &str) -> Self {
            Self {
                href: href.to_string(),
                notices: RefCell::new(Vec::new()),
            }
        }
    }

    impl CurrentContext for Page {
        fn href(&self) -> String {
            self.href.clone()
        }

        fn close_self(&self) -> Result<(), TransportError> {
            Ok(())
        }

        fn render_notice(&self, notice: &Notice) {
            self.notices.borrow_mut().push(notice.clone());
        }
    }

    fn request() -> RequestEnvelope {
        RequestEnvelope::new(
            State::new("st-1"),
            "https://app.example/visit",
            DcqlQuery::new(vec![CredentialQuery::new(
                "coverage-1",
                "smart_artifact",
                json!({"profile": "C4DIC-Coverage"}),
            )]),
        )
        .with_nonce(Nonce::new("n-1"))
    }

    #[test]
    fn test_prepare_replaces_existing_fragment() {
        let out = prepare("https://picker.example/#old", request(), Profile::Simple).unwrap();
        assert!(out.url.starts_with("https://picker.example/#req="));
        assert!(!out.url.contains("old"));
    }

    #[test]
    fn test_request_survives_handoff_in_both_profiles() {
        for profile in [Profile::Simple, Profile::Oid4vp] {
            let out = prepare("https://picker.example/", request(), profile).unwrap();
            let page = Page::at(&out.url);
            assert_eq!(
                read_incoming_request_with_profile(&page),
                Some((request(), profile))
            );
        }
    }

    #[test]
    fn test_ordinary_pages_are_not_handoffs() {
        for href in [
            "https://app.example/",
            "https://app.example/#",
            "https://app.example/#section-2",
            "https://app.example/#tab=settings&x=1",
        ] {
            let page = Page::at(href);
            assert_eq!(read_incoming_request(&page), None, "{href}");
            assert_eq!(read_incoming_response(&page), None, "{href}");
        }
    }

    #[test]
    fn test_malformed_handoff_yields_none() {
        let page = Page::at("https://app.example/#res=%%%not-base64");
        assert_eq!(read_incoming_response(&page), None);
        let page = Page::at("https://app.example/#req=bm90IGpzb24");
        assert_eq!(read_incoming_request(&page), None);
    }

    #[test]
    fn test_reads_oid4vp_error_response() {
        let page = Page::at(
            "https://app.example/visit#error=access_denied&error_description=User%20declined&state=st-1",
        );
        let envelope = read_incoming_response(&page).unwrap();
        assert_eq!(envelope.state, State::new("st-1"));
        assert_eq!(
            envelope.result,
            ResponseResult::Error(RemoteError::new("access_denied", Some("User declined".into())))
        );
    }

    #[test]
    fn test_notice_text() {
        assert_eq!(
            Notice::Failure {
                code: "access_denied".into(),
                description: None
            }
            .to_string(),
            "Sharing did not complete: access_denied"
        );
        assert!(Notice::Success.to_string().starts_with("Shared successfully"));
    }
}
