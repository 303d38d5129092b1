//! Per-channel adapter lookup, keyed by the numeric channel id. New
//! channels are wired in by registration, not by editing dispatcher
//! code — the same named-registry shape as the kumod queue manager's
//! `DashMap<String, QueueSlot>`.

use std::sync::Arc;

use dashmap::DashMap;
use msgq_store::Channel;

use crate::adapter::ChannelAdapter;

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: DashMap<i32, Arc<dyn ChannelAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, channel: Channel, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(channel as i32, adapter);
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&(channel as i32)).map(|e| e.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::adapter::RecordingAdapter;

    #[test]
    fn lookup_by_unregistered_channel_is_none() {
        let reg = AdapterRegistry::new();
        assert!(reg.get(Channel::Sms).is_none());
    }

    #[tokio::test]
    async fn registered_adapter_is_retrievable_and_callable() {
        let reg = AdapterRegistry::new();
        let adapter = Arc::new(RecordingAdapter::default());
        reg.register(Channel::Email, adapter.clone());

        let fetched = reg.get(Channel::Email).expect("adapter registered");
        fetched.send("a@b.com", Some("hi"), "body").await.unwrap();
        assert_eq!(adapter.sent.lock().len(), 1);
    }
}
