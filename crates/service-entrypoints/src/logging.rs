/*!
Logging and profiling setup for services.

Logs go to stdout through a `fmt` layer filtered by `RUST_LOG`. When the `profiling` feature
is compiled in and `ENABLE_PROFILING` is set, a chrome trace layer records spans to a
`trace-*.json` file in the working directory; the file is flushed when the returned
[`LoggingGuard`] is dropped.
*/

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Keeps the trace file open; drop it at shutdown to flush
#[must_use = "dropping the guard flushes and closes the trace file"]
pub struct LoggingGuard {
    #[cfg(feature = "profiling")]
    _chrome: Option<tracing_chrome::FlushGuard>,
}

/// `RUST_LOG` used when the environment does not set one
pub fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "debug,async_nats=info,rustls=info"
    } else {
        "info,async_nats=warn"
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn setup_logging() -> LoggingGuard {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter()));
    let fmt_layer = fmt::layer().with_filter(filter);

    #[cfg(feature = "profiling")]
    {
        let (chrome_layer, chrome_guard) = if std::env::var("ENABLE_PROFILING").is_ok() {
            let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new().build();
            (Some(layer), Some(guard))
        } else {
            (None, None)
        };
        let profiling = chrome_layer.is_some();
        tracing_subscriber::registry()
            .with(chrome_layer)
            .with(fmt_layer)
            .init();
        if profiling {
            tracing::info!("ENABLE_PROFILING set - recording chrome trace");
        }
        LoggingGuard {
            _chrome: chrome_guard,
        }
    }
    #[cfg(not(feature = "profiling"))]
    {
        tracing_subscriber::registry().with(fmt_layer).init();
        tracing::debug!("Logging initialized (profiling disabled in this build)");
        LoggingGuard {}
    }
}
