//! The error taxonomy the ingress pipeline and dispatcher surface at
//! their boundaries. Internal plumbing uses `anyhow::Result`; it is
//! converted to one of these variants only at the seam a caller
//! actually observes.

#[derive(thiserror::Error, Debug)]
pub enum IngressError {
    #[error("input invalid: {0}")]
    InputInvalid(String),
    #[error("template not ready")]
    TemplateNotReady,
    #[error("rate limited")]
    RateLimited,
    #[error("persist failed: {0}")]
    PersistError(String),
    #[error("enqueue failed: {0}")]
    EnqueueError(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("adapter error: {0}")]
    AdapterError(String),
    #[error("channel unsupported")]
    ChannelUnsupported,
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Only [`DispatchError::AdapterError`] is retried; an unsupported
    /// channel or an internal failure to even reach the adapter is
    /// terminal immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::AdapterError(_))
    }
}
