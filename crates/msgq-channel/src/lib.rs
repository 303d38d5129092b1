//! Channel adapter trait/registry and the rendering helpers the
//! dispatcher needs before handing a message to one: literal variable
//! substitution, and the CHAT card-vs-text heuristic.

pub mod adapter;
pub mod chat;
pub mod registry;
pub mod template;

pub use adapter::{AdapterError, ChannelAdapter, RecordingAdapter};
pub use registry::AdapterRegistry;
