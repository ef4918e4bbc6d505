use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global `tracing` subscriber from a [`LoggingConfig`]. Call once at
/// process start; every log line emitted by the core thereafter — including worker
/// stdout/stderr relays and RPC handler logs — picks up the configured level filter and
/// output shape.
///
/// `json_format` selects newline-delimited JSON records (for production log shippers)
/// over human-readable pretty output (for local development). Either way, spans entered
/// via [`crate::trace::TraceContext::span`] attach `trace_id`/`step`/`flows` fields to
/// every event underneath them.
pub fn init(config: &LoggingConfig) -> Result<(), String> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| format!("invalid log level '{}': {e}", config.level))?;

    let subscriber = fmt().with_env_filter(filter).with_target(true);

    let result = if config.json_format {
        subscriber.json().try_init()
    } else {
        subscriber.pretty().try_init()
    };

    result.map_err(|e| format!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_rejects_invalid_level_filter() {
        let config = LoggingConfig {
            level: "not-a-real-level".to_string(),
            json_format: false,
        };
        assert!(init(&config).is_err());
    }
}
