//! In-process fakes for the host capabilities.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;

use smart_checkin::error::TransportError;
use smart_checkin::frame::Profile;
use smart_checkin::prelude::*;
use smart_checkin::return_handler::ReturnHandler;
use smart_checkin::transport;

pub const APP_URL: &str = "https://app.example/visit";
pub const PICKER_URL: &str = "https://picker.example/";

// ─── Opener ──────────────────────────────────────────────────────────────────

/// Records every URL it is asked to open.
#[derive(Default)]
pub struct FakeOpener {
    pub blocked: Cell<bool>,
    opened: RefCell<Vec<String>>,
    popups: RefCell<Vec<Rc<Cell<bool>>>>,
}

impl FakeOpener {
    pub fn blocking() -> Self {
        let opener = Self::default();
        opener.blocked.set(true);
        opener
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.borrow().clone()
    }

    pub fn last_url(&self) -> Option<String> {
        self.opened.borrow().last().cloned()
    }

    /// Whether every popup opened so far has been closed.
    pub fn all_closed(&self) -> bool {
        self.popups.borrow().iter().all(|c| c.get())
    }
}

pub struct FakePopup {
    closed: Rc<Cell<bool>>,
}

impl TransientContext for FakePopup {
    fn close(&self) {
        self.closed.set(true);
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl ContextOpener for FakeOpener {
    type Handle = FakePopup;

    fn open_context(&self, url: &str) -> Result<FakePopup, TransportError> {
        if self.blocked.get() {
            return Err(TransportError::ContextBlocked("popup blocked".into()));
        }
        self.opened.borrow_mut().push(url.to_string());
        let closed = Rc::new(Cell::new(false));
        self.popups.borrow_mut().push(Rc::clone(&closed));
        Ok(FakePopup { closed })
    }
}

// ─── Page ────────────────────────────────────────────────────────────────────

/// A browsing context sitting at a fixed address.
pub struct FakePage {
    href: String,
    pub refuse_close: bool,
    pub closed: Cell<bool>,
    pub notices: RefCell<Vec<Notice>>,
}

impl FakePage {
    pub fn at(href: &str) -> Self {
        Self {
            href: href.to_string(),
            refuse_close: false,
            closed: Cell::new(false),
            notices: RefCell::new(Vec::new()),
        }
    }

    /// A page the host will not let script close.
    pub fn navigated_to(href: &str) -> Self {
        Self {
            refuse_close: true,
            ..Self::at(href)
        }
    }
}

impl CurrentContext for FakePage {
    fn href(&self) -> String {
        self.href.clone()
    }

    fn close_self(&self) -> Result<(), TransportError> {
        if self.refuse_close {
            return Err(TransportError::CloseRefused(
                "scripts may only close windows they opened".into(),
            ));
        }
        self.closed.set(true);
        Ok(())
    }

    fn render_notice(&self, notice: &Notice) {
        self.notices.borrow_mut().push(notice.clone());
    }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

pub fn coverage_query() -> DcqlQuery {
    DcqlQuery::new(vec![CredentialQuery::new(
        "coverage-1",
        "smart_artifact",
        json!({"profile": "http://hl7.org/fhir/us/insurance-card/StructureDefinition/C4DIC-Coverage"}),
    )])
}

pub fn coverage(member: &str) -> Artifact {
    Artifact::new(
        ArtifactType::FhirResource,
        json!({"resourceType": "Coverage", "subscriberId": member}),
    )
}

/// Wait for the requester to open its popup and return the request it
/// carries, with its wire profile.
pub async fn incoming_request(opener: &FakeOpener, seen: usize) -> (RequestEnvelope, Profile) {
    loop {
        if let Some(url) = opener.opened().get(seen) {
            let page = FakePage::at(url);
            return transport::read_incoming_request_with_profile(&page)
                .expect("popup URL carries a request");
        }
        tokio::task::yield_now().await;
    }
}

/// Land a return page at `return_url` and let it forward the response.
pub async fn land_return_page(relay: &MemoryRelay, return_url: &str) -> bool {
    let page = FakePage::at(return_url);
    ReturnHandler::new(relay.clone(), &page)
        .maybe_handle_return(&ReturnOptions::default())
        .await
        .expect("return handler publishes")
}

/// Play picker and source: wait for the request, answer with `payload`.
pub async fn grant(relay: &MemoryRelay, opener: &FakeOpener, payload: ResponseBuilder) {
    let (request, profile) = incoming_request(opener, 0).await;
    let result = payload.into_result(&request).expect("answer seals");
    let url = respond_url(&request, result, profile).expect("response encodes");
    assert!(land_return_page(relay, &url).await);
}
