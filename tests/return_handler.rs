//! Return page behavior: detection, forwarding, idempotence, best-effort close.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use smart_checkin::prelude::*;
use smart_checkin::source::ACCESS_DENIED;

use common::*;

fn pending_request(state: &str) -> RequestEnvelope {
    RequestEnvelope::new(State::new(state), APP_URL, coverage_query())
}

/// Subscribe on `state` and collect everything delivered.
fn listen(relay: &MemoryRelay, state: &str) -> Rc<RefCell<Vec<RelayMessage>>> {
    let inbox: Rc<RefCell<Vec<RelayMessage>>> = Rc::default();
    let sink = Rc::clone(&inbox);
    relay
        .subscribe(
            &State::new(state),
            Box::new(move |delivery: Delivery| match delivery {
                Ok(message) => sink.borrow_mut().push(message),
                Err(malformed) => panic!("malformed relay message: {:?}", malformed),
            }),
        )
        .unwrap();
    inbox
}

#[tokio::test]
async fn ordinary_page_is_not_a_return() {
    let relay = MemoryRelay::new();
    let inbox = listen(&relay, "st-1");

    for href in [APP_URL, "https://app.example/visit#faq", "https://app.example/#a=1&b=2"] {
        let page = FakePage::at(href);
        let handler = ReturnHandler::new(relay.clone(), &page);
        assert!(!handler.maybe_handle_return(&ReturnOptions::default()).await.unwrap());
        assert!(!page.closed.get());
        assert!(page.notices.borrow().is_empty());
    }
    assert!(inbox.borrow().is_empty());
}

#[tokio::test]
async fn success_is_forwarded_and_context_closes() {
    let relay = MemoryRelay::new();
    let inbox = listen(&relay, "st-1");
    let request = pending_request("st-1");
    let result = ResponseBuilder::new()
        .add("coverage-1", coverage("M-1"))
        .into_result(&request)
        .unwrap();
    let url = respond_url(&request, result.clone(), Profile::Simple).unwrap();

    let page = FakePage::at(&url);
    let handler = ReturnHandler::new(relay.clone(), &page);
    assert!(handler.maybe_handle_return(&ReturnOptions::default()).await.unwrap());

    assert_eq!(*inbox.borrow(), vec![RelayMessage::new(State::new("st-1"), result)]);
    assert!(page.closed.get());
    assert_eq!(*page.notices.borrow(), vec![Notice::Success]);
}

#[tokio::test]
async fn error_is_forwarded_with_description() {
    let relay = MemoryRelay::new();
    let inbox = listen(&relay, "st-2");
    let url = decline_url(
        &pending_request("st-2"),
        ACCESS_DENIED,
        Some("User declined to share"),
        Profile::Oid4vp,
    )
    .unwrap();

    let page = FakePage::at(&url);
    let handler = ReturnHandler::new(relay.clone(), &page);
    assert!(handler.maybe_handle_return(&ReturnOptions::default()).await.unwrap());

    let inbox = inbox.borrow();
    assert_eq!(inbox.len(), 1);
    assert_eq!(
        inbox[0].result,
        ResponseResult::Error(RemoteError::new(
            "access_denied",
            Some("User declined to share".into())
        ))
    );
    assert_eq!(
        *page.notices.borrow(),
        vec![Notice::Failure {
            code: "access_denied".into(),
            description: Some("User declined to share".into()),
        }]
    );
}

#[tokio::test]
async fn repeat_calls_publish_once() {
    let relay = MemoryRelay::new();
    let inbox = listen(&relay, "st-3");
    let url = decline_url(&pending_request("st-3"), ACCESS_DENIED, None, Profile::Simple).unwrap();

    let page = FakePage::at(&url);
    let handler = ReturnHandler::new(relay.clone(), &page);
    for _ in 0..3 {
        assert!(handler.maybe_handle_return(&ReturnOptions::default()).await.unwrap());
    }

    assert_eq!(inbox.borrow().len(), 1);
    assert!(handler.has_handled(&State::new("st-3")));
}

#[tokio::test]
async fn refused_close_is_tolerated() {
    let relay = MemoryRelay::new();
    let inbox = listen(&relay, "st-4");
    let url = decline_url(&pending_request("st-4"), ACCESS_DENIED, None, Profile::Simple).unwrap();

    let page = FakePage::navigated_to(&url);
    let handler = ReturnHandler::new(relay.clone(), &page);
    assert!(handler.maybe_handle_return(&ReturnOptions::default()).await.unwrap());

    assert!(!page.closed.get());
    assert_eq!(inbox.borrow().len(), 1);
}

#[tokio::test]
async fn rendering_can_be_suppressed() {
    let relay = MemoryRelay::new();
    let url = decline_url(&pending_request("st-5"), ACCESS_DENIED, None, Profile::Simple).unwrap();

    let page = FakePage::at(&url);
    let handler = ReturnHandler::new(relay.clone(), &page);
    let options = ReturnOptions::default().render(false);
    assert!(handler.maybe_handle_return(&options).await.unwrap());

    assert!(page.notices.borrow().is_empty());
    assert!(page.closed.get());
}

#[tokio::test]
async fn malformed_return_fragment_is_ignored() {
    let relay = MemoryRelay::new();
    let inbox = listen(&relay, "st-6");

    let page = FakePage::at("https://app.example/visit#res=bm90IGpzb24");
    let handler = ReturnHandler::new(relay.clone(), &page);
    assert!(!handler.maybe_handle_return(&ReturnOptions::default()).await.unwrap());
    assert!(inbox.borrow().is_empty());
}
