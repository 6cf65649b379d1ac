//! Tokio runtime helpers shared by every service binary

use tokio_util::sync::CancellationToken;

/// Spawn an async task on the current runtime.
///
/// With the `profiling` feature the task runs inside a profiling scope tagged with its future
/// type, so spawned workers are easy to tell apart in traces.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    #[cfg(feature = "profiling")]
    {
        tokio::spawn(async move {
            profiling::scope!(
                "runtime::spawn",
                format!("task_type={}", std::any::type_name::<F>()).as_str()
            );
            future.await
        })
    }
    #[cfg(not(feature = "profiling"))]
    {
        tokio::spawn(future)
    }
}

/// Multi-threaded runtime with every driver enabled
pub fn build_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

/// Cancel `token` on the first Ctrl-C
pub fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
                    Err(e) => tracing::error!("Failed to listen for Ctrl-C: {e}"),
                }
                token.cancel();
            }
        }
    })
}
