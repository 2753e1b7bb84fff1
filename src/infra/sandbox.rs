//! Bounded execution of inline endpoint code.
//!
//! Every invocation gets a freshly built Rhai engine and scope on the blocking pool. The
//! engine enforces operation, depth and size ceilings and checks a wall-clock deadline from
//! its progress hook; an outer tokio timeout backs that up.

use crate::domain::endpoint::HandlerFault;
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Extra time the async side waits past the in-engine deadline before giving up on the task.
const OUTER_TIMEOUT_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    pub timeout: Duration,
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_function_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2_000),
            max_operations: 1_000_000,
            max_call_levels: 32,
            max_expr_depth: 64,
            max_function_expr_depth: 32,
            max_string_size: 1024 * 1024,
            max_array_size: 10_000,
            max_map_size: 10_000,
        }
    }
}

/// Compiles and runs inline code under [`SandboxLimits`].
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    limits: SandboxLimits,
}

impl Sandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Parses `source` with the same symbol restrictions the execution engine applies.
    pub fn compile(&self, source: &str) -> Result<AST, String> {
        base_engine(&self.limits)
            .compile(source)
            .map_err(|e| e.to_string())
    }

    /// Runs a compiled script with `request` bound as the only variable.
    pub async fn run(&self, ast: Arc<AST>, request: JsonValue) -> Result<JsonValue, HandlerFault> {
        let limits = self.limits.clone();
        let timeout = limits.timeout;
        let task = tokio::task::spawn_blocking(move || ExecutionUnit::new(&limits).run(&ast, &request));

        match tokio::time::timeout(timeout.saturating_add(OUTER_TIMEOUT_GRACE), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) if join.is_panic() => Err(HandlerFault::Panicked),
            Ok(Err(join)) => Err(HandlerFault::Script(join.to_string())),
            Err(_) => Err(HandlerFault::Timeout(timeout)),
        }
    }
}

/// Engine with limits and the `eval` symbol disabled, without the deadline hook.
fn base_engine(limits: &SandboxLimits) -> Engine {
    let mut engine = Engine::new();
    engine.disable_symbol("eval");
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_function_expr_depth);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
    engine.on_print(|text| tracing::info!(target: "api_maker::script", "{}", text));
    engine.on_debug(|text, _source, pos| {
        tracing::debug!(target: "api_maker::script", position = %pos, "{}", text)
    });
    engine
}

/// One invocation's engine and scope. Dropped when the invocation ends, on every path.
struct ExecutionUnit {
    engine: Engine,
    scope: Scope<'static>,
    timeout: Duration,
}

impl ExecutionUnit {
    fn new(limits: &SandboxLimits) -> Self {
        let mut engine = base_engine(limits);
        // No representable deadline means the outer timeout is the only bound.
        if let Some(deadline) = Instant::now().checked_add(limits.timeout) {
            engine.on_progress(move |_ops| {
                if Instant::now() >= deadline {
                    Some(Dynamic::from("deadline"))
                } else {
                    None
                }
            });
        }
        Self {
            engine,
            scope: Scope::new(),
            timeout: limits.timeout,
        }
    }

    fn run(mut self, ast: &AST, request: &JsonValue) -> Result<JsonValue, HandlerFault> {
        let request = rhai::serde::to_dynamic(request).map_err(|e| HandlerFault::Script(e.to_string()))?;
        self.scope.push_dynamic("request", request);

        let value = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, ast)
            .map_err(|e| self.fault(*e))?;

        rhai::serde::from_dynamic::<JsonValue>(&value).map_err(|e| HandlerFault::Script(e.to_string()))
    }

    fn fault(&self, error: EvalAltResult) -> HandlerFault {
        match error {
            EvalAltResult::ErrorTerminated(..) => HandlerFault::Timeout(self.timeout),
            EvalAltResult::ErrorTooManyOperations(..)
            | EvalAltResult::ErrorStackOverflow(..)
            | EvalAltResult::ErrorDataTooLarge(..) => HandlerFault::ResourceLimit(error.to_string()),
            other => HandlerFault::Script(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sandbox() -> Sandbox {
        Sandbox::new(SandboxLimits {
            timeout: Duration::from_millis(500),
            max_operations: 50_000,
            ..SandboxLimits::default()
        })
    }

    async fn run(source: &str, request: JsonValue) -> Result<JsonValue, HandlerFault> {
        let sb = sandbox();
        let ast = Arc::new(sb.compile(source).expect("compiles"));
        sb.run(ast, request).await
    }

    #[tokio::test]
    async fn returns_last_expression_as_json() {
        let out = run(
            r#"#{ greeting: "hi " + request.params.name, total: request.body.qty * 2 }"#,
            json!({ "params": { "name": "ann" }, "body": { "qty": 4 } }),
        )
        .await
        .expect("runs");
        assert_eq!(out, json!({ "greeting": "hi ann", "total": 8 }));
    }

    #[tokio::test]
    async fn unit_result_is_null() {
        let out = run("let x = 1;", json!({})).await.expect("runs");
        assert_eq!(out, JsonValue::Null);
    }

    #[tokio::test]
    async fn runaway_loop_hits_a_limit() {
        let err = run("loop { }", json!({})).await.expect_err("bounded");
        assert!(
            matches!(err, HandlerFault::ResourceLimit(_) | HandlerFault::Timeout(_)),
            "unexpected fault: {err:?}"
        );
    }

    #[tokio::test]
    async fn wall_clock_deadline_terminates_long_runs() {
        let sb = Sandbox::new(SandboxLimits {
            timeout: Duration::from_millis(200),
            max_operations: 0,
            ..SandboxLimits::default()
        });
        let ast = Arc::new(sb.compile("let n = 0; loop { n += 1; }").expect("compiles"));

        let started = Instant::now();
        let err = sb.run(ast, json!({})).await.expect_err("deadline");
        assert!(matches!(err, HandlerFault::Timeout(t) if t == Duration::from_millis(200)), "unexpected fault: {err:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn huge_timeouts_do_not_overflow() {
        let sb = Sandbox::new(SandboxLimits {
            timeout: Duration::MAX,
            ..SandboxLimits::default()
        });
        let ast = Arc::new(sb.compile("40 + 2").expect("compiles"));
        assert_eq!(sb.run(ast, json!({})).await.expect("runs"), json!(42));
    }

    #[tokio::test]
    async fn oversized_strings_are_refused() {
        let err = run(r#"let s = "x"; loop { s += s; }"#, json!({}))
            .await
            .expect_err("bounded");
        assert!(matches!(err, HandlerFault::ResourceLimit(_)), "unexpected fault: {err:?}");
    }

    #[tokio::test]
    async fn runtime_errors_are_script_faults() {
        let err = run(r#"throw "boom";"#, json!({})).await.expect_err("throws");
        assert!(matches!(err, HandlerFault::Script(_)));
    }

    #[tokio::test]
    async fn scope_is_not_shared_between_invocations() {
        let sb = sandbox();
        let ast = Arc::new(sb.compile("let seen = 1; seen").expect("compiles"));
        assert_eq!(sb.run(ast.clone(), json!({})).await.expect("first"), json!(1));
        assert_eq!(sb.run(ast, json!({})).await.expect("second"), json!(1));
    }

    #[test]
    fn eval_is_not_available() {
        assert!(sandbox().compile(r#"eval("1 + 1")"#).is_err());
    }
}
