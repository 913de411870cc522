//! Tracing setup for the `careaxis` binary.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment flag that switches log output to JSON lines.
pub const LOG_JSON_ENV: &str = "CAREAXIS_LOG_JSON";

/// True when `CAREAXIS_LOG_JSON` is `1` or `true`.
pub fn json_logs_requested() -> bool {
    std::env::var(LOG_JSON_ENV)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true"))
        .unwrap_or(false)
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
///
/// Only the first call takes effect. Logs go to stderr so stdout stays free
/// for the results path.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
