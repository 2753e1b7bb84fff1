//! Endpoint definitions: the declarative records authored through the admin API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod describe;

pub use describe::{human_readable_duration, specifications};

/// HTTP verbs an endpoint can be mounted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 4] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn to_http(self) -> axum::http::Method {
        match self {
            HttpMethod::Get => axum::http::Method::GET,
            HttpMethod::Post => axum::http::Method::POST,
            HttpMethod::Put => axum::http::Method::PUT,
            HttpMethod::Delete => axum::http::Method::DELETE,
        }
    }

    pub fn from_http(method: &axum::http::Method) -> Option<Self> {
        Self::from_str(method.as_str()).ok()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unsupported HTTP method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallbackType {
    /// `callback_ref` names a trusted function registered by the host application.
    NamedFunction,
    /// `callback_ref` holds Rhai source executed inside the sandbox.
    InlineCode,
}

impl CallbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackType::NamedFunction => "named_function",
            CallbackType::InlineCode => "inline_code",
        }
    }
}

impl FromStr for CallbackType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "named_function" => Ok(CallbackType::NamedFunction),
            "inline_code" => Ok(CallbackType::InlineCode),
            other => Err(format!("unknown callback type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Active,
    #[default]
    Inactive,
}

impl EndpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Active => "active",
            EndpointStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for EndpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EndpointStatus::Active),
            "inactive" => Ok(EndpointStatus::Inactive),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthSettings {
    pub jwt_enabled: bool,
    /// Write-only from the admin API's point of view; listings blank it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKey {
    #[default]
    Ip,
    User,
    Endpoint,
}

impl RateLimitKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitKey::Ip => "ip",
            RateLimitKey::User => "user",
            RateLimitKey::Endpoint => "endpoint",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub max_calls: u32,
    pub window_seconds: u64,
    #[serde(default)]
    pub key_by: RateLimitKey,
}

/// Optional per-endpoint middleware configuration, persisted as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MiddlewareSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub schema: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitSettings>,
}

/// Authoring payload. Everything the validator derives is absent on purpose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DefinitionInput {
    pub namespace: String,
    pub version: String,
    pub route: String,
    /// Kept as text: an unknown verb is an authoring mistake reported at compile time.
    pub http_method: String,
    pub callback_type: CallbackType,
    pub callback_ref: String,
    #[serde(default)]
    pub status: EndpointStatus,
    #[serde(flatten)]
    pub settings: MiddlewareSettings,
}

/// A stored endpoint definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EndpointDefinition {
    pub id: Uuid,
    pub namespace: String,
    pub version: String,
    pub route: String,
    pub http_method: String,
    pub callback_type: CallbackType,
    pub callback_ref: String,
    pub status: EndpointStatus,
    /// Derived by the validator on save, never accepted from authors.
    pub is_safe: bool,
    pub validation_errors: Option<String>,
    #[serde(flatten)]
    pub settings: MiddlewareSettings,
    pub updated_at: DateTime<Utc>,
}

impl EndpointDefinition {
    /// Builds an unvalidated record from an authoring payload.
    ///
    /// `is_safe` starts false; only the definition store flips it after a passing verdict.
    pub fn from_input(id: Uuid, input: DefinitionInput) -> Self {
        let input = input.normalized();
        Self {
            id,
            namespace: input.namespace,
            version: input.version,
            route: input.route,
            http_method: input.http_method,
            callback_type: input.callback_type,
            callback_ref: input.callback_ref,
            status: input.status,
            is_safe: false,
            validation_errors: None,
            settings: input.settings,
            updated_at: Utc::now(),
        }
    }

    /// `active`, validated safe, and with a callback to run.
    pub fn is_eligible(&self) -> bool {
        self.status == EndpointStatus::Active && self.is_safe && !self.callback_ref.trim().is_empty()
    }

    pub fn method(&self) -> Option<HttpMethod> {
        self.http_method.parse().ok()
    }

    /// `namespace/version`, the unique path prefix of the endpoint.
    pub fn prefix(&self) -> String {
        format!("{}/{}", self.namespace, self.version)
    }

    pub fn full_path(&self) -> String {
        format!("/{}/{}/{}", self.namespace, self.version, self.route)
    }

    /// Label shown in admin listings.
    pub fn status_label(&self) -> &'static str {
        if !self.is_safe {
            return "Inactive: Unsafe";
        }
        self.status.as_str()
    }
}

impl DefinitionInput {
    pub fn normalized(mut self) -> Self {
        self.namespace = slugify(&self.namespace);
        self.version = slugify(&self.version);
        self.route = normalize_route(&self.route);
        self.http_method = self.http_method.trim().to_ascii_uppercase();
        self
    }
}

/// Lowercases and collapses anything outside `[a-z0-9_]` into single dashes.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for c in raw.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Trims whitespace and leading/trailing `/` separators.
pub fn normalize_route(raw: &str) -> String {
    raw.trim().trim_matches('/').trim().to_string()
}
