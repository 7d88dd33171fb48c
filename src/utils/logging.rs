use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Used when `RUST_LOG` is unset. Exchange lines log under the `http` target,
/// security events under `audit`.
pub const DEFAULT_FILTER: &str = "info";

pub fn init() {
    let fmt_layer = fmt::layer().with_target(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
