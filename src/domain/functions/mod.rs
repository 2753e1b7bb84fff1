//! FunctionRegistry mapping callback names to trusted host functions.
//!
//! Named-function endpoints can only reference what the embedding application registered
//! here before the server started; nothing else in the process is reachable by name.

use crate::domain::endpoint::EndpointRequest;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub mod builtin;

pub type FunctionFuture = Pin<Box<dyn Future<Output = anyhow::Result<JsonValue>> + Send>>;

/// A trusted host function callable by name from an endpoint definition.
pub type RegisteredFunction = Arc<dyn Fn(EndpointRequest) -> FunctionFuture + Send + Sync>;

/// A registry that maps callback names to their host implementations.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, RegisteredFunction>,
}

impl FunctionRegistry {
    /// Creates a new empty FunctionRegistry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `function` under `name`, replacing any earlier registration.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(EndpointRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<JsonValue>> + Send + 'static,
    {
        let function: RegisteredFunction =
            Arc::new(move |request: EndpointRequest| -> FunctionFuture { Box::pin(function(request)) });
        self.functions.insert(name.into(), function);
    }

    /// Retrieves a function by name.
    pub fn get(&self, name: &str) -> Option<RegisteredFunction> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Returns all registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}
