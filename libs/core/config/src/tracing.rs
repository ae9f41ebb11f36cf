use crate::Environment;
use tracing::{debug, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Install color-eyre for `dbctl`-style binaries.
///
/// Shows the error location, hides the environment section. Repeated calls are
/// ignored.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Initialize the global subscriber for `environment`.
///
/// Production logs are flattened JSON at `info`; development logs are pretty
/// at `debug`. Both carry an `ErrorLayer` so `eyre` reports include span
/// traces of the connection lifecycle. `RUST_LOG` overrides the level.
///
/// A second initialization is logged and otherwise ignored.
///
/// ```ignore
/// use core_config::{Environment, tracing::init_tracing};
///
/// init_tracing(&Environment::from_env());
/// ```
pub fn init_tracing(environment: &Environment) {
    init_tracing_with(environment, &[]);
}

/// [`init_tracing`] with extra directives on top of the default level, e.g.
/// `"database=debug"` to surface driver command events.
///
/// Directives that fail to parse are skipped. All of them are ignored when
/// `RUST_LOG` is set.
pub fn init_tracing_with(environment: &Environment, directives: &[&str]) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(environment, directives));

    let result = if environment.is_production() {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    };

    match result {
        Ok(()) => info!(?environment, "Tracing initialized"),
        Err(_) => debug!("Tracing already initialized"),
    }
}

/// Filter used when `RUST_LOG` is unset
fn default_filter(environment: &Environment, directives: &[&str]) -> EnvFilter {
    let base = if environment.is_production() {
        "info"
    } else {
        "debug"
    };

    directives
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(EnvFilter::new(base), EnvFilter::add_directive)
}
