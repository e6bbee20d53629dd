//! Return handler: runs on page load of any context that might be a return
//! target, forwards the response it was navigated with to the waiting
//! requester, then tries to close itself.

use std::cell::RefCell;
use std::collections::HashSet;

use crate::envelope::{ResponseEnvelope, ResponseResult};
use crate::error::CheckinError;
use crate::relay::{Relay, RelayMessage};
use crate::shared::State;
use crate::transport::{self, CurrentContext, Notice};

/// Configuration for [`ReturnHandler::maybe_handle_return`].
#[derive(Debug, Clone)]
pub struct ReturnOptions {
    /// Render a success/failure notice before closing. Turn off for
    /// non-visual return contexts.
    pub render: bool,
}

impl Default for ReturnOptions {
    fn default() -> Self {
        Self { render: true }
    }
}

impl ReturnOptions {
    pub fn render(mut self, render: bool) -> Self {
        self.render = render;
        self
    }
}

/// Forwards incoming responses onto the relay, at most once per `state`.
pub struct ReturnHandler<R, C> {
    relay: R,
    context: C,
    handled: RefCell<HashSet<State>>,
}

impl<R: Relay, C: CurrentContext> ReturnHandler<R, C> {
    pub fn new(relay: R, context: C) -> Self {
        Self {
            relay,
            context,
            handled: RefCell::new(HashSet::new()),
        }
    }

    /// Returns `Ok(false)` on an ordinary page load.
    ///
    /// Repeat calls for a `state` already forwarded report `true` without
    /// publishing again. Closing the context is best-effort and never fails
    /// the call.
    pub async fn maybe_handle_return(&self, options: &ReturnOptions) -> Result<bool, CheckinError> {
        let Some(envelope) = transport::read_incoming_response(&self.context) else {
            return Ok(false);
        };
        let ResponseEnvelope { state, result, .. } = envelope;

        if self.handled.borrow().contains(&state) {
            tracing::debug!("Response already forwarded (state={})", state);
            return Ok(true);
        }

        let notice = notice_for(&result);
        let message = RelayMessage::new(state.clone(), result);
        self.relay.publish(&state, &message)?;
        self.handled.borrow_mut().insert(state.clone());
        tracing::info!(
            "Forwarded response (state={}, success={})",
            state,
            notice.is_success()
        );

        if options.render {
            self.context.render_notice(&notice);
        }
        if let Err(e) = self.context.close_self() {
            tracing::debug!("Return context stays open: {}", e);
        }
        Ok(true)
    }

    pub fn has_handled(&self, state: &State) -> bool {
        self.handled.borrow().contains(state)
    }
}

fn notice_for(result: &ResponseResult) -> Notice {
    match result {
        ResponseResult::Success(_) | ResponseResult::Sealed(_) => Notice::Success,
        ResponseResult::Error(err) => Notice::Failure {
            code: err.code.clone(),
            description: err.description.clone(),
        },
    }
}
