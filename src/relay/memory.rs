//! In-process relay.
//!
//! Delivers synchronously to every handler registered on the channel at the
//! time of publishing. Handlers may subscribe or unsubscribe from inside a
//! delivery. Messages travel as JSON text, decoded per subscriber the same
//! way the browser relays decode them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RelayError;
use crate::relay::{channel_name, decode_delivery, Delivery, MessageHandler, Relay, RelayMessage};
use crate::shared::State;

type SharedHandler = Rc<dyn Fn(Delivery)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    channels: HashMap<String, Vec<(u64, SharedHandler)>>,
}

/// Cheap to clone; clones share one registry, like windows of one origin
/// sharing the browser's channel namespace.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    registry: Rc<RefCell<Registry>>,
}

/// Handle returned by [`MemoryRelay::subscribe`].
#[derive(Debug)]
pub struct MemorySubscription {
    channel: String,
    id: u64,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriptions on `state`'s channel.
    pub fn subscriber_count(&self, state: &State) -> usize {
        self.registry
            .borrow()
            .channels
            .get(&channel_name(state))
            .map_or(0, Vec::len)
    }

    /// Channels with at least one live subscription.
    pub fn channel_count(&self) -> usize {
        self.registry.borrow().channels.len()
    }

    /// Post raw text on `state`'s channel, as any same-origin script could.
    pub fn publish_text(&self, state: &State, text: &str) -> Result<(), RelayError> {
        // Snapshot so handlers can (un)subscribe while we deliver.
        let handlers: Vec<SharedHandler> = self
            .registry
            .try_borrow()
            .map_err(|e| RelayError::PublishFailed(e.to_string()))?
            .channels
            .get(&channel_name(state))
            .map(|subs| subs.iter().map(|(_, h)| Rc::clone(h)).collect())
            .unwrap_or_default();

        tracing::debug!(
            "Publishing on relay channel (state={}) to {} subscriber(s)",
            state,
            handlers.len()
        );
        for handler in handlers {
            if let Some(delivery) = decode_delivery(text) {
                handler(delivery);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRelay")
            .field("channels", &self.channel_count())
            .finish()
    }
}

impl Relay for MemoryRelay {
    type Subscription = MemorySubscription;

    fn subscribe(
        &self,
        state: &State,
        on_message: MessageHandler,
    ) -> Result<MemorySubscription, RelayError> {
        let channel = channel_name(state);
        let mut registry = self
            .registry
            .try_borrow_mut()
            .map_err(|e| RelayError::ChannelUnavailable(e.to_string()))?;

        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .channels
            .entry(channel.clone())
            .or_default()
            .push((id, Rc::from(on_message)));

        tracing::debug!("Subscribed to relay channel (state={})", state);
        Ok(MemorySubscription { channel, id })
    }

    fn publish(&self, state: &State, message: &RelayMessage) -> Result<(), RelayError> {
        let text = message
            .to_json()
            .map_err(|e| RelayError::PublishFailed(e.to_string()))?;
        self.publish_text(state, &text)
    }

    fn unsubscribe(&self, subscription: MemorySubscription) {
        let Ok(mut registry) = self.registry.try_borrow_mut() else {
            tracing::error!("Could not unsubscribe - relay registry already borrowed");
            return;
        };
        if let Some(subs) = registry.channels.get_mut(&subscription.channel) {
            subs.retain(|(id, _)| *id != subscription.id);
            if subs.is_empty() {
                registry.channels.remove(&subscription.channel);
            }
        }
    }
}
