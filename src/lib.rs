pub mod app {
    pub mod bootstrap;
    pub mod definition_store;
    pub mod endpoint_registry;
}
pub mod domain {
    pub mod compiler;
    pub mod definition;
    pub mod endpoint;
    pub mod functions;
    pub mod middleware;
    pub mod validator;
}
pub mod infra {
    pub mod config;
    pub mod sandbox;
    pub mod telemetry;
}
pub mod storage {
    pub mod cache;
    pub mod definitions;
}
pub mod transport {
    pub mod http;
}

// Convenience re-exports (keeps call-sites clean)
pub use app::bootstrap::{build_state, connect_backend};
pub use app::definition_store::DefinitionStore;
pub use app::endpoint_registry::EndpointRegistry;
pub use domain::definition::{DefinitionInput, EndpointDefinition};
pub use domain::functions::FunctionRegistry;
pub use domain::validator::{CodeValidator, ValidationVerdict};
pub use infra::config::Settings;
