//! Entry points for the current browser window.
//!
//! Wires [`BrowserRelay`] and [`BrowserWindow`] into the protocol roles so a
//! page only has to call [`request_in_window`] (requester) or
//! [`maybe_handle_return_in_window`] (on load of the return page).

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::envelope::DcqlQuery;
use crate::error::CheckinError;
use crate::orchestrator::{CheckinResponse, RequestOptions, Requester};
use crate::relay::wasm::BrowserRelay;
use crate::return_handler::{ReturnHandler, ReturnOptions};
use crate::transport::wasm::BrowserWindow;

type WindowReturnHandler = ReturnHandler<BrowserRelay, BrowserWindow>;

thread_local! {
    /// One handler per window, so repeat calls (e.g. re-renders) stay
    /// idempotent per `state`.
    static RETURN_HANDLER: RefCell<Option<Rc<WindowReturnHandler>>> = RefCell::new(None);
}

fn current_window() -> Result<BrowserWindow, CheckinError> {
    BrowserWindow::current().ok_or(CheckinError::MissingConfiguration("window"))
}

/// Run one exchange from this window.
pub async fn request_in_window(
    query: DcqlQuery,
    options: RequestOptions,
) -> Result<CheckinResponse, CheckinError> {
    let window = current_window()?;
    Requester::new(BrowserRelay, window.clone(), window)
        .request(query, options)
        .await
}

/// Forward the response this window was navigated with, if any.
pub async fn maybe_handle_return_in_window(options: &ReturnOptions) -> Result<bool, CheckinError> {
    let existing = RETURN_HANDLER.with(|slot| slot.borrow().clone());
    let handler = match existing {
        Some(handler) => handler,
        None => {
            let handler = Rc::new(ReturnHandler::new(BrowserRelay, current_window()?));
            RETURN_HANDLER.with(|slot| *slot.borrow_mut() = Some(Rc::clone(&handler)));
            handler
        }
    };
    handler.maybe_handle_return(options).await
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

pub(crate) fn js_error(err: &JsValue) -> String {
    if let Some(error) = err.dyn_ref::<js_sys::Error>() {
        let name = error.name().as_string().unwrap_or_else(|| "Error".to_string());
        let message = error.message().as_string().unwrap_or_default();
        if message.is_empty() {
            return name;
        }
        return format!("{}: {}", name, message);
    }

    if let Some(s) = err.as_string() {
        if !s.is_empty() {
            return s;
        }
    }

    if let Ok(json) = js_sys::JSON::stringify(err) {
        if let Some(s) = json.as_string() {
            if !s.is_empty() && s != "null" && s != "undefined" {
                return s;
            }
        }
    }

    "unknown JS error".to_string()
}
