//! Turns stored definitions into a routable [`RouteTable`].
//!
//! Compilation is pure with respect to storage: it never writes. Definitions that fail a
//! compile-time check are reported in the [`CompileOutcome`]; the caller decides what to
//! persist. One definition failing never stops the others from compiling.

use crate::domain::definition::{CallbackType, EndpointDefinition, EndpointStatus};
use crate::domain::endpoint::{CompiledEndpoint, EndpointHandler, RouteKey, RouteTable};
use crate::domain::functions::FunctionRegistry;
use crate::domain::middleware::{
    Cors, JwtAuth, Middleware, RateLimit, RateLimitStore, ResponseCache, ResponseStore, SchemaValidator,
};
use crate::domain::validator::CodeValidator;
use crate::infra::sandbox::Sandbox;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod handlers;
pub mod methods;

pub use handlers::{InlineCodeHandler, NamedFunctionHandler};
pub use methods::{strategy_for, MethodStrategy, RequestShape};

/// Why a definition was left out of the route table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileSkip {
    #[error("definition is not active")]
    Inactive,
    #[error("definition has not passed validation")]
    NotSafe,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unsupported HTTP method '{0}'")]
    UnknownMethod(String),
    #[error("inline code is disabled")]
    InlineCodeDisabled,
    /// The callback failed the compile-time re-check.
    #[error("{message}")]
    Rejected { message: String, mark_unsafe: bool },
    #[error("invalid {stage} configuration: {reason}")]
    InvalidMiddleware { stage: &'static str, reason: String },
}

/// A definition the compile pass found unsafe; the store should persist the verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UnsafeMark {
    pub definition_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SkippedDefinition {
    pub definition_id: Uuid,
    pub route: String,
    pub reason: String,
}

pub struct CompileOutcome {
    pub table: RouteTable,
    pub skipped: Vec<SkippedDefinition>,
    pub unsafe_marks: Vec<UnsafeMark>,
}

pub struct EndpointCompiler {
    validator: CodeValidator,
    functions: Arc<FunctionRegistry>,
    sandbox: Arc<Sandbox>,
    responses: Arc<ResponseStore>,
    rate_limits: Arc<RateLimitStore>,
    allow_inline_code: bool,
    cors_origins: Vec<String>,
}

impl EndpointCompiler {
    pub fn new(
        functions: Arc<FunctionRegistry>,
        sandbox: Arc<Sandbox>,
        responses: Arc<ResponseStore>,
        rate_limits: Arc<RateLimitStore>,
    ) -> Self {
        Self {
            validator: CodeValidator::new(),
            functions,
            sandbox,
            responses,
            rate_limits,
            allow_inline_code: false,
            cors_origins: vec!["*".to_string()],
        }
    }

    pub fn allow_inline_code(mut self, allow: bool) -> Self {
        self.allow_inline_code = allow;
        self
    }

    pub fn cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Compiles `definitions` in order. Later definitions win key collisions.
    pub fn compile(&self, definitions: &[EndpointDefinition]) -> CompileOutcome {
        let mut table = RouteTable::new();
        let mut skipped = Vec::new();
        let mut unsafe_marks = Vec::new();

        for definition in definitions {
            match self.compile_one(definition) {
                Ok(endpoint) => {
                    let key = endpoint.key.clone();
                    if let Some(previous) = table.insert(endpoint) {
                        tracing::warn!(
                            route = %key,
                            replaced = %previous.definition_id,
                            endpoint_id = %definition.id,
                            "route key collision, last definition wins"
                        );
                    }
                }
                Err(reason) => {
                    if reason == CompileSkip::Inactive {
                        tracing::debug!(endpoint_id = %definition.id, "skipping inactive definition");
                    } else {
                        tracing::info!(
                            endpoint_id = %definition.id,
                            route = %definition.full_path(),
                            reason = %reason,
                            "definition skipped"
                        );
                    }
                    if let CompileSkip::Rejected {
                        message,
                        mark_unsafe: true,
                    } = &reason
                    {
                        unsafe_marks.push(UnsafeMark {
                            definition_id: definition.id,
                            message: message.clone(),
                        });
                    }
                    skipped.push(SkippedDefinition {
                        definition_id: definition.id,
                        route: definition.full_path(),
                        reason: reason.to_string(),
                    });
                }
            }
        }

        CompileOutcome {
            table,
            skipped,
            unsafe_marks,
        }
    }

    pub fn compile_one(&self, definition: &EndpointDefinition) -> Result<CompiledEndpoint, CompileSkip> {
        if definition.status != EndpointStatus::Active {
            return Err(CompileSkip::Inactive);
        }
        if !definition.is_safe {
            return Err(CompileSkip::NotSafe);
        }
        for (field, value) in [
            ("namespace", &definition.namespace),
            ("version", &definition.version),
            ("route", &definition.route),
            ("http_method", &definition.http_method),
            ("callback_ref", &definition.callback_ref),
        ] {
            if value.trim().is_empty() {
                return Err(CompileSkip::MissingField(field));
            }
        }

        let strategy = strategy_for(&definition.http_method)
            .ok_or_else(|| CompileSkip::UnknownMethod(definition.http_method.clone()))?;
        let key = RouteKey::new(
            definition.namespace.clone(),
            definition.version.clone(),
            definition.route.clone(),
            strategy.method,
        );

        let handler = self.resolve_callback(definition, strategy)?;
        let (middlewares, cors) = self.middleware_chain(definition, &key)?;

        Ok(CompiledEndpoint::new(key, definition.id, handler, middlewares, cors))
    }

    fn resolve_callback(
        &self,
        definition: &EndpointDefinition,
        strategy: MethodStrategy,
    ) -> Result<Arc<dyn EndpointHandler>, CompileSkip> {
        let callback = definition.callback_ref.trim();
        match definition.callback_type {
            CallbackType::NamedFunction => {
                let verdict = self
                    .validator
                    .validate_reference(callback, |name| self.functions.contains(name));
                let function = match self.functions.get(callback) {
                    Some(function) if verdict.ok => function,
                    _ => {
                        return Err(CompileSkip::Rejected {
                            message: verdict.message,
                            mark_unsafe: true,
                        })
                    }
                };
                Ok(Arc::new(NamedFunctionHandler::new(callback, function, strategy.shape)))
            }
            CallbackType::InlineCode => {
                if !self.allow_inline_code {
                    return Err(CompileSkip::InlineCodeDisabled);
                }
                let verdict = self.validator.validate(&definition.callback_ref);
                if !verdict.ok {
                    return Err(CompileSkip::Rejected {
                        message: verdict.message,
                        mark_unsafe: false,
                    });
                }
                let ast = self.sandbox.compile(&definition.callback_ref).map_err(|e| CompileSkip::Rejected {
                    message: format!("Syntax error: {}", e),
                    mark_unsafe: false,
                })?;
                Ok(Arc::new(InlineCodeHandler::new(ast, self.sandbox.clone(), strategy.shape)))
            }
        }
    }

    /// schema → auth → response cache → rate limit → CORS.
    fn middleware_chain(
        &self,
        definition: &EndpointDefinition,
        key: &RouteKey,
    ) -> Result<(Vec<Arc<dyn Middleware>>, Arc<Cors>), CompileSkip> {
        let settings = &definition.settings;
        let mut chain: Vec<Arc<dyn Middleware>> = Vec::new();

        if let Some(schema) = &settings.schema {
            let validator = SchemaValidator::new(schema).map_err(|reason| CompileSkip::InvalidMiddleware {
                stage: "schema",
                reason,
            })?;
            chain.push(Arc::new(validator));
        }

        if let Some(auth) = settings.auth.as_ref().filter(|a| a.jwt_enabled) {
            if auth.secret.trim().is_empty() {
                return Err(CompileSkip::InvalidMiddleware {
                    stage: "auth",
                    reason: "JWT is enabled without a secret".to_string(),
                });
            }
            chain.push(Arc::new(JwtAuth::new(&auth.secret)));
        }

        if let Some(cache) = settings.cache.as_ref().filter(|c| c.enabled) {
            if cache.ttl_seconds == 0 {
                return Err(CompileSkip::InvalidMiddleware {
                    stage: "cache",
                    reason: "ttl_seconds must be greater than zero".to_string(),
                });
            }
            // Revision-scoped so an edited definition never replays old output.
            let scope = format!(
                "{}#{}@{}",
                key,
                definition.id,
                definition.updated_at.timestamp_micros()
            );
            chain.push(Arc::new(ResponseCache::new(
                self.responses.clone(),
                Duration::from_secs(cache.ttl_seconds),
                scope,
            )));
        }

        if let Some(limit) = settings.rate_limit.as_ref().filter(|r| r.enabled) {
            if limit.max_calls == 0 || limit.window_seconds == 0 {
                return Err(CompileSkip::InvalidMiddleware {
                    stage: "rate_limit",
                    reason: "max_calls and window_seconds must be greater than zero".to_string(),
                });
            }
            chain.push(Arc::new(RateLimit::new(
                self.rate_limits.clone(),
                limit.max_calls,
                Duration::from_secs(limit.window_seconds),
                limit.key_by,
                key.to_string(),
            )));
        }

        let cors = Arc::new(Cors::new(self.cors_origins.clone(), vec![key.method]));
        chain.push(cors.clone());

        Ok((chain, cors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::definition::{
        AuthSettings, CacheSettings, DefinitionInput, HttpMethod, MiddlewareSettings, RateLimitKey,
        RateLimitSettings,
    };
    use crate::domain::endpoint::{EndpointRequest, RouteMatch};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    fn functions() -> Arc<FunctionRegistry> {
        let mut registry = FunctionRegistry::new();
        registry.register("list_orders", |_req: EndpointRequest| async move {
            Ok(json!([{ "id": 1 }, { "id": 2 }]))
        });
        Arc::new(registry)
    }

    fn compiler() -> EndpointCompiler {
        EndpointCompiler::new(
            functions(),
            Arc::new(Sandbox::default()),
            Arc::new(ResponseStore::new()),
            Arc::new(RateLimitStore::new()),
        )
    }

    fn definition(route: &str, callback_type: CallbackType, callback_ref: &str) -> EndpointDefinition {
        let mut def = EndpointDefinition::from_input(
            Uuid::new_v4(),
            DefinitionInput {
                namespace: "shop".to_string(),
                version: "v1".to_string(),
                route: route.to_string(),
                http_method: "GET".to_string(),
                callback_type,
                callback_ref: callback_ref.to_string(),
                status: EndpointStatus::Active,
                settings: MiddlewareSettings::default(),
            },
        );
        def.is_safe = true;
        def
    }

    #[test]
    fn named_function_compiles_with_only_cors() {
        let outcome = compiler().compile(&[definition("orders", CallbackType::NamedFunction, "list_orders")]);

        assert!(outcome.skipped.is_empty());
        let summaries = outcome.table.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].path, "/shop/v1/orders");
        assert_eq!(summaries[0].method, HttpMethod::Get);
        assert_eq!(summaries[0].handler, "named_function");
        assert_eq!(summaries[0].middlewares, vec!["cors".to_string()]);
    }

    #[test]
    fn middleware_order_is_fixed() {
        let mut def = definition("orders", CallbackType::NamedFunction, "list_orders");
        def.settings = MiddlewareSettings {
            schema: Some(json!({ "type": "object" })),
            auth: Some(AuthSettings {
                jwt_enabled: true,
                secret: "s3cret".to_string(),
            }),
            cache: Some(CacheSettings {
                enabled: true,
                ttl_seconds: 30,
            }),
            rate_limit: Some(RateLimitSettings {
                enabled: true,
                max_calls: 5,
                window_seconds: 60,
                key_by: RateLimitKey::Ip,
            }),
        };

        let endpoint = compiler().compile_one(&def).expect("compiles");
        assert_eq!(
            endpoint.middleware_names(),
            vec!["schema", "auth", "response_cache", "rate_limit", "cors"]
        );
    }

    #[test]
    fn denylisted_or_missing_names_are_marked_unsafe() {
        let defs = vec![
            definition("exec", CallbackType::NamedFunction, "exec"),
            definition("gone", CallbackType::NamedFunction, "no_such_function"),
            definition("orders", CallbackType::NamedFunction, "list_orders"),
        ];
        let outcome = compiler().compile(&defs);

        assert_eq!(outcome.table.len(), 1);
        assert_eq!(outcome.unsafe_marks.len(), 2);
        assert!(outcome.unsafe_marks[0].message.contains("Forbidden function"));
        assert!(outcome.unsafe_marks[1].message.contains("Undefined function"));
    }

    #[test]
    fn inline_code_requires_the_global_flag() {
        let def = definition("calc", CallbackType::InlineCode, "40 + 2");

        let outcome = compiler().compile(&[def.clone()]);
        assert!(outcome.table.is_empty());
        assert!(outcome.unsafe_marks.is_empty());
        assert_eq!(outcome.skipped[0].reason, CompileSkip::InlineCodeDisabled.to_string());

        let outcome = compiler().allow_inline_code(true).compile(&[def]);
        assert_eq!(outcome.table.len(), 1);
    }

    #[test]
    fn failing_inline_recheck_skips_without_marking() {
        let def = definition("bad", CallbackType::InlineCode, r#"system("ls")"#);
        let outcome = compiler().allow_inline_code(true).compile(&[def]);

        assert!(outcome.table.is_empty());
        assert!(outcome.unsafe_marks.is_empty());
        assert!(outcome.skipped[0].reason.contains("Forbidden function"));
    }

    #[test]
    fn one_broken_definition_does_not_block_others() {
        let mut unknown_method = definition("patch", CallbackType::NamedFunction, "list_orders");
        unknown_method.http_method = "PATCH".to_string();
        let mut inactive = definition("off", CallbackType::NamedFunction, "list_orders");
        inactive.status = EndpointStatus::Inactive;
        let mut unsafe_def = definition("unsafe", CallbackType::NamedFunction, "list_orders");
        unsafe_def.is_safe = false;
        let mut no_secret = definition("auth", CallbackType::NamedFunction, "list_orders");
        no_secret.settings.auth = Some(AuthSettings {
            jwt_enabled: true,
            secret: String::new(),
        });
        let mut bad_schema = definition("schema", CallbackType::NamedFunction, "list_orders");
        bad_schema.settings.schema = Some(json!({ "type": 5 }));

        let outcome = compiler().compile(&[
            unknown_method,
            inactive,
            unsafe_def,
            no_secret,
            bad_schema,
            definition("orders", CallbackType::NamedFunction, "list_orders"),
        ]);

        assert_eq!(outcome.table.len(), 1);
        assert_eq!(outcome.skipped.len(), 5);
        assert!(outcome.unsafe_marks.is_empty());
    }

    #[test]
    fn collisions_are_last_write_wins() {
        let first = definition("orders", CallbackType::NamedFunction, "list_orders");
        let second = definition("/orders/", CallbackType::NamedFunction, "list_orders");
        let winner = second.id;

        let outcome = compiler().compile(&[first, second]);
        assert_eq!(outcome.table.len(), 1);
        assert_eq!(outcome.table.summaries()[0].definition_id, winner);
    }

    #[test]
    fn compiling_twice_is_structurally_identical() {
        let defs = vec![
            definition("orders", CallbackType::NamedFunction, "list_orders"),
            definition("calc", CallbackType::InlineCode, "request.params"),
        ];
        let c = compiler().allow_inline_code(true);
        assert_eq!(c.compile(&defs).table.summaries(), c.compile(&defs).table.summaries());
    }

    #[tokio::test]
    async fn compiled_route_serves_the_callback() {
        let outcome = compiler().compile(&[definition("orders", CallbackType::NamedFunction, "list_orders")]);
        let RouteMatch::Found(endpoint) = outcome.table.resolve("/shop/v1/orders", &Method::GET) else {
            panic!("route should resolve");
        };
        let resp = endpoint
            .handle(EndpointRequest::new(Method::GET, "/shop/v1/orders"))
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body, json!([{ "id": 1 }, { "id": 2 }]));
        assert!(matches!(
            outcome.table.resolve("/shop/v1/orders", &Method::POST),
            RouteMatch::MethodNotAllowed(_)
        ));
    }

    #[tokio::test]
    async fn inline_faults_become_opaque_errors() {
        let def = definition("boom", CallbackType::InlineCode, r#"throw "secret detail";"#);
        let outcome = compiler().allow_inline_code(true).compile(&[def]);
        let RouteMatch::Found(endpoint) = outcome.table.resolve("/shop/v1/boom", &Method::GET) else {
            panic!("route should resolve");
        };
        let resp = endpoint.handle(EndpointRequest::new(Method::GET, "/shop/v1/boom")).await;
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.body, json!({ "success": false, "error": "Internal server error" }));
    }
}
