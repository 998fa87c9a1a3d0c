//! Tracing bootstrap

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::TelemetrySettings;

/// Install the global subscriber
///
/// `RUST_LOG` wins over `settings.log_filter`. Returns `false` when a
/// subscriber was already installed (tests, embedding hosts).
pub fn init_tracing(settings: &TelemetrySettings) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if settings.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    installed.is_ok()
}
