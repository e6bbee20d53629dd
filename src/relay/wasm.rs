//! Browser relays: `BroadcastChannel`, with a `localStorage` fallback.
//!
//! Both carry [`RelayMessage`] as a JSON string, decoded on receipt with
//! [`decode_delivery`](crate::relay::decode_delivery). Subscriptions own their JS
//! closures; dropping one without [`Relay::unsubscribe`] detaches nothing,
//! so callers must always unsubscribe.

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{BroadcastChannel, MessageEvent, Storage, StorageEvent, Window};

use crate::browser::js_error;
use crate::defaults::STORAGE_KEY_PREFIX;
use crate::error::RelayError;
use crate::relay::{channel_name, decode_delivery, MessageHandler, Relay, RelayMessage};
use crate::shared::State;

fn deliver(text: &str, on_message: &MessageHandler) {
    if let Some(delivery) = decode_delivery(text) {
        on_message(delivery);
    }
}

// ─── BroadcastChannel ────────────────────────────────────────────────────────

/// Relay over the `BroadcastChannel` API.
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastRelay;

pub struct BroadcastSubscription {
    channel: BroadcastChannel,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
}

impl BroadcastRelay {
    /// Whether the host exposes `BroadcastChannel`.
    pub fn is_supported() -> bool {
        js_sys::Reflect::has(&js_sys::global(), &JsValue::from_str("BroadcastChannel"))
            .unwrap_or(false)
    }
}

impl Relay for BroadcastRelay {
    type Subscription = BroadcastSubscription;

    fn subscribe(
        &self,
        state: &State,
        on_message: MessageHandler,
    ) -> Result<BroadcastSubscription, RelayError> {
        let channel = BroadcastChannel::new(&channel_name(state))
            .map_err(|e| RelayError::ChannelUnavailable(js_error(&e)))?;

        let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |e: MessageEvent| {
            match e.data().as_string() {
                Some(text) => deliver(&text, &on_message),
                None => tracing::warn!("Ignoring non-string relay message"),
            }
        });
        channel.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

        tracing::debug!("Subscribed to BroadcastChannel (state={})", state);
        Ok(BroadcastSubscription {
            channel,
            _on_message: on_message,
        })
    }

    fn publish(&self, state: &State, message: &RelayMessage) -> Result<(), RelayError> {
        let text = message
            .to_json()
            .map_err(|e| RelayError::PublishFailed(e.to_string()))?;
        let channel = BroadcastChannel::new(&channel_name(state))
            .map_err(|e| RelayError::ChannelUnavailable(js_error(&e)))?;

        let sent = channel
            .post_message(&JsValue::from_str(&text))
            .map_err(|e| RelayError::PublishFailed(js_error(&e)));
        channel.close();
        sent
    }

    fn unsubscribe(&self, subscription: BroadcastSubscription) {
        subscription.channel.set_onmessage(None);
        subscription.channel.close();
    }
}

// ─── localStorage ────────────────────────────────────────────────────────────

/// Relay over `localStorage` writes, observed through `storage` events in
/// other same-origin windows. The key is removed right after writing.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageRelay;

pub struct StorageSubscription {
    window: Window,
    on_storage: Closure<dyn FnMut(StorageEvent)>,
}

fn window() -> Result<Window, RelayError> {
    web_sys::window().ok_or_else(|| RelayError::ChannelUnavailable("no window".to_string()))
}

fn local_storage(window: &Window) -> Result<Storage, RelayError> {
    window
        .local_storage()
        .map_err(|e| RelayError::ChannelUnavailable(js_error(&e)))?
        .ok_or_else(|| RelayError::ChannelUnavailable("localStorage disabled".to_string()))
}

fn storage_key(state: &State) -> String {
    format!("{}{}", STORAGE_KEY_PREFIX, state)
}

impl Relay for StorageRelay {
    type Subscription = StorageSubscription;

    fn subscribe(
        &self,
        state: &State,
        on_message: MessageHandler,
    ) -> Result<StorageSubscription, RelayError> {
        let window = window()?;
        let key = storage_key(state);

        let on_storage = Closure::<dyn FnMut(StorageEvent)>::new(move |e: StorageEvent| {
            if e.key().as_deref() != Some(key.as_str()) {
                return;
            }
            // Removal events carry no value.
            if let Some(text) = e.new_value() {
                deliver(&text, &on_message);
            }
        });
        window
            .add_event_listener_with_callback("storage", on_storage.as_ref().unchecked_ref())
            .map_err(|e| RelayError::ChannelUnavailable(js_error(&e)))?;

        tracing::debug!("Subscribed to storage relay (state={})", state);
        Ok(StorageSubscription {
            window,
            on_storage,
        })
    }

    fn publish(&self, state: &State, message: &RelayMessage) -> Result<(), RelayError> {
        let text = message
            .to_json()
            .map_err(|e| RelayError::PublishFailed(e.to_string()))?;
        let storage = local_storage(&window()?)?;
        let key = storage_key(state);

        storage
            .set_item(&key, &text)
            .map_err(|e| RelayError::PublishFailed(js_error(&e)))?;
        if let Err(e) = storage.remove_item(&key) {
            tracing::warn!("Failed to clear storage relay key: {}", js_error(&e));
        }
        Ok(())
    }

    fn unsubscribe(&self, subscription: StorageSubscription) {
        if let Err(e) = subscription.window.remove_event_listener_with_callback(
            "storage",
            subscription.on_storage.as_ref().unchecked_ref(),
        ) {
            tracing::warn!("Failed to detach storage listener: {}", js_error(&e));
        }
    }
}

// ─── Auto-selection ──────────────────────────────────────────────────────────

/// `BroadcastChannel` when available, otherwise `localStorage`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserRelay;

pub enum BrowserSubscription {
    Broadcast(BroadcastSubscription),
    Storage(StorageSubscription),
}

impl Relay for BrowserRelay {
    type Subscription = BrowserSubscription;

    fn subscribe(
        &self,
        state: &State,
        on_message: MessageHandler,
    ) -> Result<BrowserSubscription, RelayError> {
        if BroadcastRelay::is_supported() {
            BroadcastRelay
                .subscribe(state, on_message)
                .map(BrowserSubscription::Broadcast)
        } else {
            StorageRelay
                .subscribe(state, on_message)
                .map(BrowserSubscription::Storage)
        }
    }

    fn publish(&self, state: &State, message: &RelayMessage) -> Result<(), RelayError> {
        if BroadcastRelay::is_supported() {
            BroadcastRelay.publish(state, message)
        } else {
            StorageRelay.publish(state, message)
        }
    }

    fn unsubscribe(&self, subscription: BrowserSubscription) {
        match subscription {
            BrowserSubscription::Broadcast(sub) => BroadcastRelay.unsubscribe(sub),
            BrowserSubscription::Storage(sub) => StorageRelay.unsubscribe(sub),
        }
    }
}
