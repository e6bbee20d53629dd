//! Request orchestrator: the requester's side of one credential exchange.
//!
//! ```text
//! Idle → AwaitingSourceSelection → AwaitingResponse → {Resolved, Failed, TimedOut}
//! ```
//!
//! Each call to [`Requester::request`] runs its own exchange with a fresh
//! `state`, a fresh relay subscription and its own timer. The subscription
//! is taken before the transient context opens and is released on every exit
//! path, including when the returned future is dropped.

use std::rc::Rc;
use std::time::Duration;

use futures_channel::mpsc;
use futures_util::future::{self, Either};
use futures_util::{pin_mut, StreamExt};

use crate::defaults::DEFAULT_TIMEOUT;
use crate::envelope::{
    rehydrate_for, Credentials, DcqlQuery, RequestEnvelope, ResponseResult, SuccessPayload,
};
use crate::error::{CheckinError, EnvelopeError, RelayError};
use crate::frame::{strip_fragment, Profile};
use crate::relay::{Delivery, Relay, RelayMessage};
use crate::seal::{PayloadTransform, SecretKey, X25519ChaCha};
use crate::shared::{Nonce, State};
use crate::transport::{self, ContextOpener, CurrentContext, OutboundRequest, TransientContext};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Callback receiving the finalized outbound request, before the context
/// opens.
pub type OnRequest = Rc<dyn Fn(&OutboundRequest)>;

/// Per-call configuration for [`Requester::request`].
#[derive(Clone)]
pub struct RequestOptions {
    /// Base URL of the picker page. Required.
    pub picker_base_url: Option<String>,
    pub timeout: Duration,
    /// Resolve artifact references into [`CheckinResponse::credentials`].
    pub rehydrate: bool,
    pub profile: Profile,
    pub on_request: Option<OnRequest>,
    /// Ask the source to seal its answer to this key's public half.
    pub sealing: Option<SecretKey>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            picker_base_url: None,
            timeout: DEFAULT_TIMEOUT,
            rehydrate: true,
            profile: Profile::default(),
            on_request: None,
            sealing: None,
        }
    }
}

impl RequestOptions {
    pub fn new(picker_base_url: &str) -> Self {
        Self::default().picker_base_url(picker_base_url)
    }

    pub fn picker_base_url(mut self, url: &str) -> Self {
        self.picker_base_url = Some(url.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rehydrate(mut self, rehydrate: bool) -> Self {
        self.rehydrate = rehydrate;
        self
    }

    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn on_request(mut self, callback: impl Fn(&OutboundRequest) + 'static) -> Self {
        self.on_request = Some(Rc::new(callback));
        self
    }

    pub fn sealing(mut self, secret: SecretKey) -> Self {
        self.sealing = Some(secret);
        self
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("picker_base_url", &self.picker_base_url)
            .field("timeout", &self.timeout)
            .field("rehydrate", &self.rehydrate)
            .field("profile", &self.profile)
            .field("on_request", &self.on_request.is_some())
            .field("sealing", &self.sealing.is_some())
            .finish()
    }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// A resolved exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckinResponse {
    pub state: State,
    /// The success payload as delivered (opened, if it was sealed).
    pub payload: SuccessPayload,
    /// Item id → artifact data, present when rehydration is on. Every
    /// requested id is listed; ids the source did not grant map to `[]`.
    pub credentials: Option<Credentials>,
}

// ─── Exchange phases ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    Idle,
    AwaitingSourceSelection,
    AwaitingResponse,
    Resolved,
    Failed,
    TimedOut,
}

impl ExchangePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Failed | Self::TimedOut)
    }
}

/// Phase bookkeeping for one exchange. Terminal phases are final.
#[derive(Debug)]
struct Exchange {
    state: State,
    phase: ExchangePhase,
}

impl Exchange {
    fn new(state: State) -> Self {
        Self {
            state,
            phase: ExchangePhase::Idle,
        }
    }

    fn advance(&mut self, next: ExchangePhase) -> bool {
        if self.phase.is_terminal() {
            tracing::warn!(
                "Exchange already settled (state={}, phase={:?}), ignoring {:?}",
                self.state,
                self.phase,
                next
            );
            return false;
        }
        tracing::debug!(
            "Exchange {:?} -> {:?} (state={})",
            self.phase,
            next,
            self.state
        );
        self.phase = next;
        true
    }

    /// Record the outcome of `result` and pass it through.
    fn settle<T>(&mut self, result: Result<T, CheckinError>) -> Result<T, CheckinError> {
        let phase = match &result {
            Ok(_) => ExchangePhase::Resolved,
            Err(e) if e.is_timeout() => ExchangePhase::TimedOut,
            Err(_) => ExchangePhase::Failed,
        };
        self.advance(phase);
        match &result {
            Ok(_) => tracing::info!("Exchange resolved (state={})", self.state),
            Err(e) => tracing::info!("Exchange {:?} (state={}): {}", phase, self.state, e),
        }
        result
    }
}

// ─── Teardown ────────────────────────────────────────────────────────────────

/// Owns everything an exchange must release. Dropping it closes the
/// transient context if still open and unsubscribes from the relay.
struct Teardown<'r, R: Relay, H: TransientContext> {
    relay: &'r R,
    subscription: Option<R::Subscription>,
    context: Option<H>,
    state: State,
}

impl<R: Relay, H: TransientContext> Drop for Teardown<'_, R, H> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            if !context.is_closed() {
                context.close();
            }
        }
        if let Some(subscription) = self.subscription.take() {
            self.relay.unsubscribe(subscription);
            tracing::debug!("Released relay subscription (state={})", self.state);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Requester
// ═════════════════════════════════════════════════════════════════════════════

/// Runs credential exchanges from the requesting context.
///
/// Capabilities are injected: `relay` carries responses back, `opener`
/// creates transient contexts and `context` is the requesting page itself.
pub struct Requester<R, O, C> {
    relay: R,
    opener: O,
    context: C,
    transform: Rc<dyn PayloadTransform>,
}

impl<R, O, C> Requester<R, O, C>
where
    R: Relay,
    O: ContextOpener,
    C: CurrentContext,
{
    pub fn new(relay: R, opener: O, context: C) -> Self {
        Self {
            relay,
            opener,
            context,
            transform: Rc::new(X25519ChaCha),
        }
    }

    /// Replace the transform used to open sealed answers.
    pub fn with_transform(mut self, transform: impl PayloadTransform + 'static) -> Self {
        self.transform = Rc::new(transform);
        self
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    /// Run one exchange to completion.
    ///
    /// Fails before any side effect with `InvalidQuery` or
    /// `MissingConfiguration`, and without waiting for the timer with
    /// `PopupBlocked`. Otherwise settles exactly once, on the first relay
    /// message carrying this exchange's `state`, or on timeout. A message
    /// for this `state` that fails validation settles as `MalformedEnvelope`.
    ///
    /// On native targets the timer is `tokio::time::sleep`, so the future
    /// must be polled inside a Tokio runtime with the time driver enabled
    /// (`#[tokio::main]`, or a builder with `enable_time()`); polling it
    /// elsewhere panics. On `wasm32` the timer is `gloo-timers` and needs no
    /// runtime.
    pub async fn request(
        &self,
        query: DcqlQuery,
        options: RequestOptions,
    ) -> Result<CheckinResponse, CheckinError> {
        validate_query(&query)?;
        let picker_base_url = options
            .picker_base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(CheckinError::MissingConfiguration("picker_base_url"))?;
        let href = self.context.href();
        let return_url = strip_fragment(&href);
        if return_url.trim().is_empty() {
            return Err(CheckinError::MissingConfiguration("return_url"));
        }

        let state = State::generate();
        let mut exchange = Exchange::new(state.clone());
        exchange.advance(ExchangePhase::AwaitingSourceSelection);
        tracing::info!(
            "Starting exchange (state={}, items={}, profile={:?})",
            state,
            query.credentials.len(),
            options.profile
        );

        let (tx, mut rx) = mpsc::unbounded::<Delivery>();
        let expected = state.clone();
        let subscription = self
            .relay
            .subscribe(
                &state,
                Box::new(move |delivery: Delivery| {
                    let actual = match &delivery {
                        Ok(message) => &message.state,
                        Err(malformed) => &malformed.state,
                    };
                    if *actual != expected {
                        let mismatch = CheckinError::StateMismatch {
                            expected: expected.clone(),
                            actual: actual.clone(),
                        };
                        tracing::debug!("Ignoring relay message: {}", mismatch);
                        return;
                    }
                    // Fails once the exchange has settled; later messages are no-ops.
                    let _ = tx.unbounded_send(delivery);
                }),
            )
            .map_err(|e| exchange_failed(&mut exchange, e.into()))?;

        let mut teardown: Teardown<'_, R, O::Handle> = Teardown {
            relay: &self.relay,
            subscription: Some(subscription),
            context: None,
            state: state.clone(),
        };

        let outbound = self
            .outbound(picker_base_url, state.clone(), return_url, query, &options)
            .map_err(|e| exchange_failed(&mut exchange, e))?;
        if let Some(on_request) = &options.on_request {
            on_request(&outbound);
        }

        let handle = transport::open(&self.opener, &outbound)
            .map_err(|e| exchange_failed(&mut exchange, CheckinError::PopupBlocked(e)))?;
        teardown.context = Some(handle);
        exchange.advance(ExchangePhase::AwaitingResponse);

        let received = {
            let next = rx.next();
            let timer = sleep(options.timeout);
            pin_mut!(next, timer);
            match future::select(next, timer).await {
                Either::Left((Some(Ok(message)), _)) => Ok(message),
                Either::Left((Some(Err(malformed)), _)) => {
                    Err(CheckinError::MalformedEnvelope(malformed.error))
                }
                Either::Left((None, _)) => Err(CheckinError::Relay(
                    RelayError::ChannelUnavailable("relay dropped the subscription".to_string()),
                )),
                Either::Right(_) => Err(CheckinError::Timeout {
                    after: options.timeout,
                }),
            }
        };
        drop(teardown);

        let result = received.and_then(|message| {
            self.accept(message, &outbound.envelope.query, &options)
        });
        exchange.settle(result)
    }

    fn outbound(
        &self,
        picker_base_url: &str,
        state: State,
        return_url: &str,
        query: DcqlQuery,
        options: &RequestOptions,
    ) -> Result<OutboundRequest, CheckinError> {
        let mut envelope = RequestEnvelope::new(state, return_url, query);
        if options.profile == Profile::Oid4vp {
            envelope = envelope.with_nonce(Nonce::generate());
        }
        if let Some(secret) = &options.sealing {
            envelope = envelope.with_recipient_key(secret.public_key());
        }
        Ok(transport::prepare(picker_base_url, envelope, options.profile)?)
    }

    /// Turn the first matching relay message into the call's outcome.
    fn accept(
        &self,
        message: RelayMessage,
        query: &DcqlQuery,
        options: &RequestOptions,
    ) -> Result<CheckinResponse, CheckinError> {
        let payload = match message.result {
            ResponseResult::Success(payload) => payload,
            ResponseResult::Sealed(sealed) => {
                let secret = options.sealing.as_ref().ok_or(EnvelopeError::UnexpectedValue {
                    field: "sealed",
                    value: "sealing was not requested".to_string(),
                })?;
                self.transform.open(&sealed, secret)?
            }
            ResponseResult::Error(err) => {
                return Err(CheckinError::RemoteDeclined {
                    code: err.code,
                    description: err.description,
                })
            }
        };
        payload.validate()?;

        let credentials = if options.rehydrate {
            Some(rehydrate_for(&payload, query)?)
        } else {
            None
        };
        Ok(CheckinResponse {
            state: message.state,
            payload,
            credentials,
        })
    }
}

fn validate_query(query: &DcqlQuery) -> Result<(), CheckinError> {
    if query.credentials.is_empty() {
        return Err(CheckinError::InvalidQuery(
            "query must request at least one credential".to_string(),
        ));
    }
    if query.item_ids().any(|id| id.is_empty()) {
        return Err(CheckinError::InvalidQuery(
            "credential item ids must be non-empty".to_string(),
        ));
    }
    if let Some(dup) = query.duplicate_id() {
        return Err(CheckinError::InvalidQuery(format!(
            "duplicate credential item id: {}",
            dup
        )));
    }
    Ok(())
}

fn exchange_failed(exchange: &mut Exchange, error: CheckinError) -> CheckinError {
    exchange.advance(ExchangePhase::Failed);
    tracing::info!("Exchange failed (state={}): {}", exchange.state, error);
    error
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await
}

#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
async fn sleep(duration: Duration) {
    gloo_timers::future::sleep(duration).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::CredentialQuery;
    use serde_json::json;

    fn item(id: &str) -> CredentialQuery {
        CredentialQuery::new(id, "smart_artifact", json!(null))
    }

    #[test]
    fn test_validate_query() {
        assert!(validate_query(&DcqlQuery::new(vec![item("a"), item("b")])).is_ok());
        assert!(matches!(
            validate_query(&DcqlQuery::new(vec![])),
            Err(CheckinError::InvalidQuery(_))
        ));
        assert!(matches!(
            validate_query(&DcqlQuery::new(vec![item("a"), item("a")])),
            Err(CheckinError::InvalidQuery(_))
        ));
        assert!(matches!(
            validate_query(&DcqlQuery::new(vec![item("")])),
            Err(CheckinError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_terminal_phase_is_final() {
        let mut exchange = Exchange::new(State::new("s"));
        assert!(exchange.advance(ExchangePhase::AwaitingSourceSelection));
        assert!(exchange.advance(ExchangePhase::AwaitingResponse));
        assert!(exchange.advance(ExchangePhase::Resolved));
        assert!(!exchange.advance(ExchangePhase::Failed));
        assert_eq!(exchange.phase, ExchangePhase::Resolved);
    }

    #[test]
    fn test_settle_classifies_timeout() {
        let mut exchange = Exchange::new(State::new("s"));
        exchange.advance(ExchangePhase::AwaitingResponse);
        let out: Result<(), _> = exchange.settle(Err(CheckinError::Timeout {
            after: Duration::from_secs(1),
        }));
        assert!(out.is_err());
        assert_eq!(exchange.phase, ExchangePhase::TimedOut);
    }

    #[test]
    fn test_options_defaults_and_setters() {
        let options = RequestOptions::default();
        assert_eq!(options.timeout, DEFAULT_TIMEOUT);
        assert!(options.rehydrate);
        assert_eq!(options.profile, Profile::Simple);
        assert!(options.picker_base_url.is_none());

        let options = RequestOptions::new("https://picker.example/")
            .timeout(Duration::from_secs(5))
            .rehydrate(false)
            .profile(Profile::Oid4vp);
        assert_eq!(options.picker_base_url.as_deref(), Some("https://picker.example/"));
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert!(!options.rehydrate);

        let shown = format!("{:?}", options.on_request(|_| {}));
        assert!(shown.contains("on_request: true"));
    }
}
