//! Structured logging setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "api_maker=info,tower_http=info";

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let fmt_layer = fmt::layer().with_target(true);

    let _ = tracing_subscriber::registry().with(filter).with(fmt_layer).try_init();
}
