//! Compiled endpoints: a route key, a resolved callback and its middleware chain.

use crate::domain::definition::HttpMethod;
use crate::domain::middleware::{Cors, Middleware, Next};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub mod handler;
pub mod request;
pub mod response;
pub mod table;

pub use handler::{EndpointHandler, HandlerFault};
pub use request::{parse_bearer, EndpointRequest};
pub use response::EndpointResponse;
pub use table::{RouteMatch, RouteSummary, RouteTable};

/// `(namespace, version, route, method)`, the identity of a mounted route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub namespace: String,
    pub version: String,
    pub route: String,
    pub method: HttpMethod,
}

impl RouteKey {
    pub fn new(
        namespace: impl Into<String>,
        version: impl Into<String>,
        route: impl Into<String>,
        method: HttpMethod,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            version: version.into(),
            route: route.into(),
            method,
        }
    }

    /// Splits `/{namespace}/{version}/{route...}`; the route may itself contain `/`.
    pub fn from_path(path: &str, method: HttpMethod) -> Option<Self> {
        let mut parts = path.trim_matches('/').splitn(3, '/');
        let namespace = parts.next().filter(|s| !s.is_empty())?;
        let version = parts.next().filter(|s| !s.is_empty())?;
        let route = parts.next().map(|r| r.trim_end_matches('/')).filter(|s| !s.is_empty())?;
        Some(Self::new(namespace, version, route, method))
    }

    pub fn path(&self) -> String {
        format!("/{}/{}/{}", self.namespace, self.version, self.route)
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path())
    }
}

pub struct CompiledEndpoint {
    pub key: RouteKey,
    pub definition_id: Uuid,
    handler: Arc<dyn EndpointHandler>,
    middlewares: Vec<Arc<dyn Middleware>>,
    cors: Arc<Cors>,
}

impl CompiledEndpoint {
    /// `middlewares` is the ordered chain; `cors` must already be its last stage.
    pub fn new(
        key: RouteKey,
        definition_id: Uuid,
        handler: Arc<dyn EndpointHandler>,
        middlewares: Vec<Arc<dyn Middleware>>,
        cors: Arc<Cors>,
    ) -> Self {
        Self {
            key,
            definition_id,
            handler,
            middlewares,
            cors,
        }
    }

    /// Runs the request through the chain and the callback.
    ///
    /// Responses from stages that answer before reaching CORS still get CORS headers.
    pub async fn handle(&self, request: EndpointRequest) -> EndpointResponse {
        let origin = request.header(axum::http::header::ORIGIN).map(str::to_owned);
        let mut response = Next::new(&self.middlewares, self).run(request).await;
        self.cors.apply(&mut response, origin.as_deref());
        response
    }

    /// Answers an `OPTIONS` preflight without touching the rest of the chain.
    pub fn preflight(&self, request: &EndpointRequest, allowed: &[HttpMethod]) -> EndpointResponse {
        self.cors.preflight(request, allowed)
    }

    /// Invokes the callback, turning any fault into the opaque 500.
    pub(crate) async fn invoke(&self, request: EndpointRequest) -> EndpointResponse {
        match self.handler.call(request).await {
            Ok(body) => EndpointResponse::ok(body),
            Err(fault) => {
                tracing::error!(
                    endpoint_id = %self.definition_id,
                    route = %self.key,
                    error = %fault,
                    "endpoint callback failed"
                );
                EndpointResponse::internal_error()
            }
        }
    }

    pub fn handler_kind(&self) -> &'static str {
        self.handler.kind()
    }

    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }
}
