//! Host functions shipped with the server binary.

use super::FunctionRegistry;
use crate::domain::endpoint::EndpointRequest;
use chrono::Utc;
use serde_json::json;

/// Registers `echo` and `server_time`.
pub fn register_builtins(registry: &mut FunctionRegistry) {
    registry.register("echo", |request: EndpointRequest| async move {
        Ok(request.to_callback_value())
    });
    registry.register("server_time", |_request: EndpointRequest| async move {
        Ok(json!({ "now": Utc::now().to_rfc3339() }))
    });
}
