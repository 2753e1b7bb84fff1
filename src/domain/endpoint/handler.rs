use super::EndpointRequest;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Failure of a resolved callback at request time. Never shown to HTTP callers.
#[derive(Debug, thiserror::Error)]
pub enum HandlerFault {
    #[error("callback failed: {0}")]
    Callback(#[from] anyhow::Error),

    #[error("script error: {0}")]
    Script(String),

    #[error("execution exceeded {0:?}")]
    Timeout(Duration),

    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("callback panicked")]
    Panicked,
}

/// The resolved callback of a compiled endpoint.
#[async_trait]
pub trait EndpointHandler: Send + Sync {
    /// Short label for logs and route summaries.
    fn kind(&self) -> &'static str;

    async fn call(&self, request: EndpointRequest) -> Result<JsonValue, HandlerFault>;
}
