use super::methods::RequestShape;
use crate::domain::endpoint::{EndpointHandler, EndpointRequest, HandlerFault};
use crate::domain::functions::RegisteredFunction;
use crate::infra::sandbox::Sandbox;
use async_trait::async_trait;
use rhai::AST;
use serde_json::Value as JsonValue;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Calls a trusted host function from the [`FunctionRegistry`](crate::domain::functions::FunctionRegistry).
pub struct NamedFunctionHandler {
    name: String,
    function: RegisteredFunction,
    shape: RequestShape,
}

impl NamedFunctionHandler {
    pub fn new(name: impl Into<String>, function: RegisteredFunction, shape: RequestShape) -> Self {
        Self {
            name: name.into(),
            function,
            shape,
        }
    }
}

#[async_trait]
impl EndpointHandler for NamedFunctionHandler {
    fn kind(&self) -> &'static str {
        "named_function"
    }

    /// Host functions are trusted but may still panic; both the call and the future are
    /// isolated so a panic becomes [`HandlerFault::Panicked`].
    async fn call(&self, request: EndpointRequest) -> Result<JsonValue, HandlerFault> {
        tracing::trace!(function = %self.name, "calling named function");
        let request = self.shape.apply(request);
        let future = panic::catch_unwind(AssertUnwindSafe(|| (self.function)(request)))
            .map_err(|_| HandlerFault::Panicked)?;

        match tokio::spawn(future).await {
            Ok(result) => Ok(result?),
            Err(join) if join.is_panic() => Err(HandlerFault::Panicked),
            Err(join) => Err(HandlerFault::Script(join.to_string())),
        }
    }
}

/// Runs pre-validated inline code in the sandbox, one isolated unit per call.
pub struct InlineCodeHandler {
    ast: Arc<AST>,
    sandbox: Arc<Sandbox>,
    shape: RequestShape,
}

impl InlineCodeHandler {
    pub fn new(ast: AST, sandbox: Arc<Sandbox>, shape: RequestShape) -> Self {
        Self {
            ast: Arc::new(ast),
            sandbox,
            shape,
        }
    }
}

#[async_trait]
impl EndpointHandler for InlineCodeHandler {
    fn kind(&self) -> &'static str {
        "inline_code"
    }

    async fn call(&self, request: EndpointRequest) -> Result<JsonValue, HandlerFault> {
        let request = self.shape.apply(request).to_callback_value();
        self.sandbox.run(self.ast.clone(), request).await
    }
}
