use super::{Middleware, Next};
use crate::domain::definition::HttpMethod;
use crate::domain::endpoint::{EndpointRequest, EndpointResponse};
use async_trait::async_trait;
use axum::http::{header, Method};

const ALLOWED_HEADERS: &str = "Content-Type, Authorization";
const PREFLIGHT_MAX_AGE_SECS: u64 = 600;

/// Always the last stage. Decorates responses and answers preflights.
pub struct Cors {
    allowed_origins: Vec<String>,
    methods: Vec<HttpMethod>,
}

impl Cors {
    pub fn new(allowed_origins: Vec<String>, methods: Vec<HttpMethod>) -> Self {
        Self {
            allowed_origins,
            methods,
        }
    }

    /// `Access-Control-Allow-Origin` value for a request origin, if it may be allowed at all.
    pub fn allow_origin<'a>(&'a self, origin: Option<&'a str>) -> Option<&'a str> {
        if self.allowed_origins.iter().any(|o| o == "*") {
            return Some("*");
        }
        let origin = origin?;
        self.allowed_origins
            .iter()
            .find(|o| o.as_str() == origin)
            .map(String::as_str)
    }

    /// Adds the CORS headers for this endpoint's methods.
    pub fn apply(&self, response: &mut EndpointResponse, origin: Option<&str>) {
        self.decorate(response, origin, &self.methods);
    }

    fn decorate(&self, response: &mut EndpointResponse, origin: Option<&str>, methods: &[HttpMethod]) {
        let Some(allow) = self.allow_origin(origin) else {
            return;
        };
        response.set_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow);
        if allow != "*" {
            response.set_header(header::VARY, "Origin");
        }
        let mut listed: Vec<&str> = methods.iter().map(HttpMethod::as_str).collect();
        listed.push("OPTIONS");
        response.set_header(header::ACCESS_CONTROL_ALLOW_METHODS, &listed.join(", "));
        response.set_header(header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS);
    }

    pub fn preflight(&self, request: &EndpointRequest, allowed: &[HttpMethod]) -> EndpointResponse {
        let mut response = EndpointResponse::no_content();
        self.decorate(&mut response, request.header(header::ORIGIN), allowed);
        response.set_header(
            header::ACCESS_CONTROL_MAX_AGE,
            &PREFLIGHT_MAX_AGE_SECS.to_string(),
        );
        response
    }
}

#[async_trait]
impl Middleware for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn handle(&self, request: EndpointRequest, next: Next<'_>) -> EndpointResponse {
        if request.method == Method::OPTIONS {
            return self.preflight(&request, &self.methods);
        }
        let origin = request.header(header::ORIGIN).map(str::to_owned);
        let mut response = next.run(request).await;
        self.decorate(&mut response, origin.as_deref(), &self.methods);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_allows_any_origin() {
        let cors = Cors::new(vec!["*".to_string()], vec![HttpMethod::Get]);
        assert_eq!(cors.allow_origin(Some("https://a.example")), Some("*"));
        assert_eq!(cors.allow_origin(None), Some("*"));
    }

    #[test]
    fn explicit_origins_must_match() {
        let cors = Cors::new(vec!["https://a.example".to_string()], vec![HttpMethod::Get]);
        assert_eq!(cors.allow_origin(Some("https://a.example")), Some("https://a.example"));
        assert_eq!(cors.allow_origin(Some("https://evil.example")), None);
        assert_eq!(cors.allow_origin(None), None);
    }

    #[test]
    fn preflight_lists_methods_and_options() {
        let cors = Cors::new(vec!["*".to_string()], vec![HttpMethod::Get]);
        let req = EndpointRequest::new(Method::OPTIONS, "/a/v1/b")
            .with_header(header::ORIGIN, "https://a.example");
        let resp = cors.preflight(&req, &[HttpMethod::Get, HttpMethod::Post]);

        assert_eq!(resp.status, axum::http::StatusCode::NO_CONTENT);
        assert_eq!(
            resp.headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).and_then(|v| v.to_str().ok()),
            Some("GET, POST, OPTIONS")
        );
        assert_eq!(
            resp.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }
}
