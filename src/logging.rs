//! Tracing subscriber setup for applications embedding the crate

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Install a global subscriber
///
/// `RUST_LOG` wins over the configured level when set. Returns `false` if a
/// global subscriber was already installed.
pub fn init(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format.as_str() {
        "json" => registry.with(fmt::layer().json()).try_init(),
        _ => registry.with(fmt::layer()).try_init(),
    };

    installed.is_ok()
}

fn default_directive(level: &str) -> String {
    format!("stealth_egress={}", level.trim().to_ascii_lowercase())
}
