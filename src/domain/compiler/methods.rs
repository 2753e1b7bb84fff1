//! Lookup table from HTTP verbs to handler-construction strategies.

use crate::domain::definition::HttpMethod;
use crate::domain::endpoint::EndpointRequest;

/// Which parts of a request reach the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    /// Query parameters only; any body is dropped.
    ParamsOnly,
    /// Query parameters and the JSON body.
    ParamsAndBody,
}

impl RequestShape {
    pub fn apply(self, mut request: EndpointRequest) -> EndpointRequest {
        if self == RequestShape::ParamsOnly {
            request.body = None;
        }
        request
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodStrategy {
    pub method: HttpMethod,
    pub shape: RequestShape,
}

const METHOD_STRATEGIES: [(&str, MethodStrategy); 4] = [
    (
        "GET",
        MethodStrategy {
            method: HttpMethod::Get,
            shape: RequestShape::ParamsOnly,
        },
    ),
    (
        "POST",
        MethodStrategy {
            method: HttpMethod::Post,
            shape: RequestShape::ParamsAndBody,
        },
    ),
    (
        "PUT",
        MethodStrategy {
            method: HttpMethod::Put,
            shape: RequestShape::ParamsAndBody,
        },
    ),
    (
        "DELETE",
        MethodStrategy {
            method: HttpMethod::Delete,
            shape: RequestShape::ParamsOnly,
        },
    ),
];

/// Resolves a stored method string; `None` for anything outside the closed set.
pub fn strategy_for(raw: &str) -> Option<MethodStrategy> {
    let raw = raw.trim();
    METHOD_STRATEGIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(raw))
        .map(|(_, strategy)| *strategy)
}
