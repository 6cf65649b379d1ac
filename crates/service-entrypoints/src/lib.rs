//! Entry points for long-running tokio services
//!
//! This crate provides the startup sequence shared by every service binary: structured logging
//! (with optional chrome tracing), build metadata, settings parsing and graceful shutdown.
//!
//! # Usage
//!
//! ```ignore
//! fn main() -> std::process::ExitCode {
//!     service_entrypoints::run_service("My Service", |settings: MySettings, cancel| async move {
//!         my_service::run(settings, cancel).await
//!     })
//! }
//! ```

pub mod cli;
pub mod logging;
pub mod runtime;

// Re-export commonly used types
pub use cli::parse_args;
pub use logging::{LoggingGuard, setup_logging};
pub use runtime::{build_runtime, cancel_on_ctrl_c, spawn};
pub use tokio_util::sync::CancellationToken;

mod metadata;
pub use metadata::{log_version_info, short_version_info};

use std::future::Future;
use std::process::ExitCode;

/// Run a service to completion.
///
/// Installs logging, logs the build, parses `S` from the command line, then drives the future
/// returned by `service` on a multi-threaded runtime. The token passed to the service is
/// cancelled on Ctrl-C.
pub fn run_service<S, F, Fut, E>(service_name: &str, service: F) -> ExitCode
where
    S: clap::Parser,
    F: FnOnce(S, CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    // Must happen before anything logs so every layer sees every event
    let _logging = setup_logging();
    log_version_info(service_name);

    let settings = match parse_args::<S>() {
        Ok(settings) => settings,
        Err(e) => {
            // Help and version requests are reported as errors by clap
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let _ctrl_c = cancel_on_ctrl_c(cancel.clone());
        service(settings, cancel).await
    });

    match result {
        Ok(()) => {
            tracing::info!("{service_name} stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{service_name} failed: {e}");
            ExitCode::FAILURE
        }
    }
}
