//! Request-processing stages wrapped around an endpoint callback.
//!
//! Stages run in the order the compiler attaches them. Each stage may answer on its own
//! (short-circuit) or call [`Next::run`] and post-process what comes back.

use crate::domain::endpoint::{CompiledEndpoint, EndpointRequest, EndpointResponse};
use async_trait::async_trait;
use std::sync::Arc;

pub mod auth;
pub mod cors;
pub mod rate_limit;
pub mod response_cache;
pub mod schema;

pub use auth::JwtAuth;
pub use cors::Cors;
pub use rate_limit::{RateDecision, RateLimit, RateLimitStore};
pub use response_cache::{ResponseCache, ResponseStore};
pub use schema::SchemaValidator;

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, request: EndpointRequest, next: Next<'_>) -> EndpointResponse;
}

/// The remainder of the chain, ending in the endpoint callback.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    endpoint: &'a CompiledEndpoint,
}

impl<'a> Next<'a> {
    pub(crate) fn new(stages: &'a [Arc<dyn Middleware>], endpoint: &'a CompiledEndpoint) -> Self {
        Self { stages, endpoint }
    }

    pub async fn run(self, request: EndpointRequest) -> EndpointResponse {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                stage
                    .handle(
                        request,
                        Next {
                            stages: rest,
                            endpoint: self.endpoint,
                        },
                    )
                    .await
            }
            None => self.endpoint.invoke(request).await,
        }
    }
}
