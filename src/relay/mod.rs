//! Response relay: same-origin publish/subscribe keyed by `state`.
//!
//! The concrete relay is chosen by the host:
//! - [`memory::MemoryRelay`]: in-process registry (native hosts, tests)
//! - `wasm::BroadcastRelay`: `BroadcastChannel` (feature `wasm`)
//! - `wasm::StorageRelay`: `localStorage` events for hosts without
//!   `BroadcastChannel` (feature `wasm`)
//!
//! Channel names are partitioned per exchange, but subscribers still check
//! the embedded `state` before acting on a message.

pub mod memory;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub mod wasm;

use crate::defaults::CHANNEL_PREFIX;
use serde::Deserialize;

use crate::envelope::wire::RelayWire;
use crate::envelope::{ResponseEnvelope, ResponseResult};
use crate::error::{EnvelopeError, RelayError};
use crate::shared::State;

pub use memory::MemoryRelay;

/// Ephemeral `{state, result}` message from a return context to the waiting
/// requester. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayMessage {
    pub state: State,
    pub result: ResponseResult,
}

impl RelayMessage {
    pub fn new(state: State, result: ResponseResult) -> Self {
        Self { state, result }
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(&RelayWire::from(self))?)
    }

    pub fn from_json(text: &str) -> Result<Self, EnvelopeError> {
        RelayMessage::try_from(serde_json::from_str::<RelayWire>(text)?)
    }
}

impl From<ResponseEnvelope> for RelayMessage {
    fn from(envelope: ResponseEnvelope) -> Self {
        Self {
            state: envelope.state,
            result: envelope.result,
        }
    }
}

/// A relay message that names a `state` but fails validation. Only its
/// subscriber can tell whether the `state` is the one it waits for.
#[derive(Debug)]
pub struct MalformedMessage {
    pub state: State,
    pub error: EnvelopeError,
}

/// What a subscriber receives for each message on its channel.
pub type Delivery = Result<RelayMessage, MalformedMessage>;

/// Callback invoked for every message published on a subscribed channel.
pub type MessageHandler = Box<dyn Fn(Delivery)>;

#[derive(Deserialize)]
struct StateOnly {
    state: Option<State>,
}

/// Decode a relay message as posted on the channel.
///
/// Text that does not even carry a `state` is dropped with a warning and
/// yields `None`.
pub fn decode_delivery(text: &str) -> Option<Delivery> {
    let error = match RelayMessage::from_json(text) {
        Ok(message) => return Some(Ok(message)),
        Err(e) => e,
    };
    match serde_json::from_str::<StateOnly>(text).map(|s| s.state) {
        Ok(Some(state)) if !state.is_empty() => Some(Err(MalformedMessage { state, error })),
        _ => {
            tracing::warn!("Ignoring undecodable relay message: {}", error);
            None
        }
    }
}

/// Relay channel name for an exchange.
pub fn channel_name(state: &State) -> String {
    format!("{}{}", CHANNEL_PREFIX, state)
}

/// Capability interface over the host's same-origin broadcast primitive.
///
/// Delivery is fire-and-forget with no acknowledgement. Handlers run on the
/// context's own event loop; nothing here is `Send`.
pub trait Relay {
    type Subscription;

    /// Register `on_message` for every message on `state`'s channel.
    fn subscribe(
        &self,
        state: &State,
        on_message: MessageHandler,
    ) -> Result<Self::Subscription, RelayError>;

    /// Broadcast to every same-channel subscriber.
    fn publish(&self, state: &State, message: &RelayMessage) -> Result<(), RelayError>;

    /// Release a subscription. Must run on every exit path.
    fn unsubscribe(&self, subscription: Self::Subscription);
}

impl<R: Relay + ?Sized> Relay for &R {
    type Subscription = R::Subscription;

    fn subscribe(
        &self,
        state: &State,
        on_message: MessageHandler,
    ) -> Result<Self::Subscription, RelayError> {
        (**self).subscribe(state, on_message)
    }

    fn publish(&self, state: &State, message: &RelayMessage) -> Result<(), RelayError> {
        (**self).publish(state, message)
    }

    fn unsubscribe(&self, subscription: Self::Subscription) {
        (**self).unsubscribe(subscription)
    }
}
