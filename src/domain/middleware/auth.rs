use super::{Middleware, Next};
use crate::domain::endpoint::{EndpointRequest, EndpointResponse};
use async_trait::async_trait;
use axum::http::StatusCode;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
}

/// HS256 bearer-token check with a per-endpoint shared secret.
///
/// Missing token is 401; a token that fails verification or has expired is 403.
pub struct JwtAuth {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl Middleware for JwtAuth {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn handle(&self, mut request: EndpointRequest, next: Next<'_>) -> EndpointResponse {
        let Some(token) = request.bearer_token() else {
            return EndpointResponse::error(StatusCode::UNAUTHORIZED, "Missing authorization token");
        };

        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => {
                if data.claims.sub.is_some() {
                    request.user = data.claims.sub;
                }
                next.run(request).await
            }
            Err(e) => {
                tracing::debug!(path = %request.path, error = %e, "token rejected");
                let message = match e.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    _ => "Invalid token",
                };
                EndpointResponse::error(StatusCode::FORBIDDEN, message)
            }
        }
    }
}
