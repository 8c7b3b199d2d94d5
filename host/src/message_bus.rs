//! The channel registry behind `sendMessage`/`sendMessageAsync` (spec §6.2).
//! Handlers are plain host closures keyed by channel name, invoked in
//! registration order; there is no cross-realm or cross-thread delivery
//! here (spec §5 scopes workers out), so this is a simpler single-map
//! pub-sub table rather than the `CliHostHooks` multi-channel mpsc wiring
//! it's grounded on.

use ahash::AHashMap;
use js_runtime::{Agent, JsResult, Value};
use std::rc::Rc;

pub type Handler = Rc<dyn Fn(&mut Agent, &[Value]) -> JsResult<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
pub struct MessageBus {
    channels: AHashMap<std::string::String, Vec<(HandlerId, Handler)>>,
    next_id: u64,
}

impl MessageBus {
    pub fn register(&mut self, channel: &str, handler: impl Fn(&mut Agent, &[Value]) -> JsResult<Value> + 'static) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.channels.entry(channel.to_string()).or_default().push((id, Rc::new(handler)));
        id
    }

    pub fn remove_channel(&mut self, channel: &str) {
        self.channels.remove(channel);
    }

    pub fn remove_callback(&mut self, channel: &str, handler: HandlerId) {
        if let Some(handlers) = self.channels.get_mut(channel) {
            handlers.retain(|(id, _)| *id != handler);
        }
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }

    pub fn handlers_for(&self, channel: &str) -> Vec<Handler> {
        self.channels.get(channel).map(|hs| hs.iter().map(|(_, h)| h.clone()).collect()).unwrap_or_default()
    }
}
