//! Process-wide state, built once at startup and threaded through as an
//! explicit `Arc<AppState>` rather than reached for via globals (the one
//! exception being `msgq-server-lifecycle`'s shutdown signal, which is
//! inherently process-wide).

use std::sync::Arc;

use msgq_channel::AdapterRegistry;
use msgq_queue::QueueHandle;
use msgq_store::Store;
use msgq_throttle::QuotaCache;

use crate::config::Config;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub queue: QueueHandle,
    pub adapters: AdapterRegistry,
    pub quota_cache: QuotaCache,
    pub redis: redis::aio::ConnectionManager,
}

pub type SharedState = Arc<AppState>;
