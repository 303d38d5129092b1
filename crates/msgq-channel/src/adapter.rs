//! The channel adapter seam. This crate ships the trait, the registry
//! and an in-memory test double; concrete vendor adapters (SMTP/HTTP
//! SMS gateway/chat bot API) are out of scope.

use async_trait::async_trait;

#[derive(thiserror::Error, Debug)]
pub enum AdapterError {
    #[error("channel transport error: {0}")]
    Transport(String),
    #[error("channel rejected the message: {0}")]
    Rejected(String),
}

/// What the dispatcher calls once a template has been resolved (and, for
/// EMAIL/CHAT, rendered) for one recipient.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn send(&self, to: &str, subject: Option<&str>, content: &str) -> Result<(), AdapterError>;
}

/// Records every call instead of delivering anything. Used by the
/// dispatcher's own tests and by anything downstream that wants to
/// observe what would have been sent.
#[derive(Default)]
pub struct RecordingAdapter {
    pub sent: parking_lot::Mutex<Vec<(String, Option<String>, String)>>,
    pub fail_next: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl ChannelAdapter for RecordingAdapter {
    async fn send(&self, to: &str, subject: Option<&str>, content: &str) -> Result<(), AdapterError> {
        if self.fail_next.swap(false, std::sync::atomic::Ordering::SeqCst) {
            return Err(AdapterError::Transport("forced failure".into()));
        }
        self.sent
            .lock()
            .push((to.to_string(), subject.map(str::to_string), content.to_string()));
        Ok(())
    }
}
