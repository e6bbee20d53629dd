//! `window.open` transport and the current browser window.

use web_sys::Window;

use crate::browser::js_error;
use crate::error::TransportError;
use crate::transport::{ContextOpener, CurrentContext, Notice, TransientContext};

/// The window this code runs in.
#[derive(Debug, Clone)]
pub struct BrowserWindow {
    window: Window,
}

impl BrowserWindow {
    /// `None` outside a window context (e.g. in a worker).
    pub fn current() -> Option<Self> {
        web_sys::window().map(|window| Self { window })
    }
}

/// Popup opened by [`BrowserWindow::open_context`].
#[derive(Debug, Clone)]
pub struct Popup {
    window: Window,
}

impl TransientContext for Popup {
    fn close(&self) {
        if let Err(e) = self.window.close() {
            tracing::warn!("Failed to close popup: {}", js_error(&e));
        }
    }

    fn is_closed(&self) -> bool {
        self.window.closed().unwrap_or(true)
    }
}

impl ContextOpener for BrowserWindow {
    type Handle = Popup;

    fn open_context(&self, url: &str) -> Result<Popup, TransportError> {
        match self.window.open_with_url_and_target(url, "_blank") {
            Ok(Some(window)) => Ok(Popup { window }),
            Ok(None) => Err(TransportError::ContextBlocked(
                "window.open returned null".to_string(),
            )),
            Err(e) => Err(TransportError::ContextBlocked(js_error(&e))),
        }
    }
}

impl CurrentContext for BrowserWindow {
    fn href(&self) -> String {
        self.window.location().href().unwrap_or_else(|e| {
            tracing::warn!("Could not read location.href: {}", js_error(&e));
            String::new()
        })
    }

    fn close_self(&self) -> Result<(), TransportError> {
        self.window
            .close()
            .map_err(|e| TransportError::CloseRefused(js_error(&e)))
    }

    fn render_notice(&self, notice: &Notice) {
        let Some(document) = self.window.document() else {
            return;
        };
        document.set_title(notice.title());
        match document.body() {
            Some(body) => body.set_text_content(Some(&notice.to_string())),
            None => tracing::debug!("No document body to render notice into"),
        }
    }
}
