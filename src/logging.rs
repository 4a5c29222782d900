//! Initializes the `tracing` subscriber once at process start.
//!
//! The stdio transport owns stdout for the MCP wire protocol, so logs always
//! go to stderr (optionally also to a rolling file); nothing may write to
//! stdout outside the framed message stream.

use std::io::stderr;
use std::sync::Once;

use tracing_subscriber::{fmt::layer, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// `verbosity` follows the CLI's repeatable `-v`: 0 → warn, 1 → info, ≥2 → debug.
/// `RUST_LOG` overrides this entirely when set.
pub fn init(verbosity: u8, log_file: Option<&std::path::Path>) {
    INIT.call_once(|| {
        let default_level = match verbosity {
            0 => "warn",
            1 => "info",
            _ => "debug",
        };
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{default_level},airflow_mcp_server={default_level}")));

        if let Some(path) = log_file {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("airflow-mcp-server.log");
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer().with_writer(stderr).with_ansi(true))
                .with(layer().with_writer(non_blocking).with_ansi(false))
                .init();

            // Leaked intentionally: the non-blocking writer must outlive the
            // subscriber, and the subscriber is itself process-lifetime global state.
            Box::leak(Box::new(guard));
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer().with_writer(stderr).with_ansi(true))
                .init();
        }
    });
}
