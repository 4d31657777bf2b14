//! A concurrent runner for the long-lived processes of a shopstream deployment.
//!
//! The runner orchestrates named processes and named closers, providing:
//! - Concurrent execution of every registered process
//! - Graceful shutdown on SIGTERM/SIGINT
//! - Cancellation of all processes as soon as one of them fails
//! - Closers that always run afterwards, bounded by a configurable timeout
//!
//! Every process receives the same [`CancellationToken`] and is expected to
//! return once it is cancelled.
//!
//! # Example
//!
//! ```no_run
//! use shopstream_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_named_process("ticker", |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => {
//!                         tracing::info!("ticker stopping");
//!                         break;
//!                     }
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("tick");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer("flush", || async move {
//!             tracing::info!("flushing buffers");
//!             Ok(())
//!         })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Boxed future returned by processes and closers
pub type ProcessFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Type alias for a process function.
/// Takes the shared cancellation token and returns a [`ProcessFuture`].
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> ProcessFuture + Send>;

/// Type alias for a closer function, run once all processes have stopped.
pub type Closer = Box<dyn FnOnce() -> ProcessFuture + Send>;

/// Time allowed for all closers to finish
pub const DEFAULT_CLOSER_TIMEOUT: Duration = Duration::from_secs(10);

/// Runner orchestrates named processes and closers.
///
/// - Processes run concurrently until one fails or shutdown is requested
/// - Closers run afterwards, whatever the outcome
pub struct Runner {
    processes: Vec<(String, AppProcess)>,
    closers: Vec<(String, Closer)>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a new runner.
    ///
    /// Default settings:
    /// - Closer timeout: 10 seconds
    /// - SIGINT/SIGTERM handlers installed
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: DEFAULT_CLOSER_TIMEOUT,
            cancellation_token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    /// Adds a named process to the runner.
    ///
    /// Processes run concurrently. If any process returns an error, the
    /// shared token is cancelled, every other process is asked to stop and
    /// the closers are executed. The name only appears in logs and errors.
    ///
    /// # Arguments
    ///
    /// * `name` - Identifies the process in logs
    /// * `process` - A function that takes a CancellationToken and returns a Future
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Adds a named closer to the runner.
    ///
    /// Closers are executed concurrently after all processes have stopped,
    /// whether they stopped because of an error, a signal or cancellation.
    /// A failing closer is logged and does not prevent the others from running.
    ///
    /// # Arguments
    ///
    /// * `name` - Identifies the closer in logs
    /// * `closer` - A function that returns a Future for cleanup
    pub fn with_closer<F, Fut>(mut self, name: impl Into<String>, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers
            .push((name.into(), Box::new(|| Box::pin(closer()))));
        self
    }

    /// Sets the timeout for executing closers.
    ///
    /// Default is 10 seconds.
    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Sets a custom cancellation token, allowing external control over
    /// shutdown (tests cancel it instead of sending a signal).
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Skip installing SIGINT/SIGTERM handlers
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Runs all processes and exits the application when they are done.
    ///
    /// This method:
    /// 1. Delegates to [`Runner::wait`]
    /// 2. Exits with code 0 when every process finished cleanly or shutdown was requested
    /// 3. Exits with code 1 when a process failed or panicked
    pub async fn run(self) {
        match self.wait().await {
            Ok(()) => {
                info!("Application exiting normally");
                std::process::exit(0);
            }
            Err(err) => {
                error!("Application exiting with error: {:#}", err);
                std::process::exit(1);
            }
        }
    }

    /// Runs all processes and waits for completion or a shutdown signal.
    ///
    /// This method:
    /// 1. Spawns all processes concurrently
    /// 2. Monitors for SIGTERM/SIGINT unless signal handling was disabled
    /// 3. Cancels all processes when a signal arrives or any process fails
    /// 4. Executes all closers with the configured timeout
    /// 5. Returns the first process error, if any
    ///
    /// Unlike [`Runner::run`] it does not exit the application, so it can be
    /// embedded in tests.
    pub async fn wait(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.processes {
            let process_token = token.clone();
            debug!(process = %name, "starting process");
            join_set.spawn(async move { (name, process(process_token).await) });
        }

        if self.handle_signals {
            let signal_token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown_signal() => signal_token.cancel(),
                    _ = signal_token.cancelled() => {}
                }
            });
        }

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!(process = %name, "process finished"),
                Ok((name, Err(err))) => {
                    if !token.is_cancelled() {
                        error!(process = %name, "process failed: {:#}", err);
                        first_error = Some(err.context(format!("process {name} failed")));
                    }
                    token.cancel();
                }
                Err(err) => {
                    error!("process panicked: {}", err);
                    if first_error.is_none() && !token.is_cancelled() {
                        first_error = Some(anyhow::anyhow!("process panicked: {err}"));
                    }
                    token.cancel();
                }
            }

            if token.is_cancelled() {
                break;
            }
        }

        join_set.shutdown().await;
        token.cancel();

        if !self.closers.is_empty() {
            info!("Running closers with timeout of {:?}", self.closer_timeout);
            if tokio::time::timeout(self.closer_timeout, run_closers(self.closers))
                .await
                .is_err()
            {
                error!("Closers timed out after {:?}", self.closer_timeout);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Runs all closers concurrently, logging each outcome.
async fn run_closers(closers: Vec<(String, Closer)>) {
    let mut closer_set = JoinSet::new();
    for (name, closer) in closers {
        closer_set.spawn(async move { (name, closer().await) });
    }

    while let Some(joined) = closer_set.join_next().await {
        match joined {
            Ok((name, Ok(()))) => debug!(closer = %name, "closer completed"),
            Ok((name, Err(err))) => error!(closer = %name, "closer failed: {:#}", err),
            Err(err) => error!("closer panicked: {}", err),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Error setting up SIGINT handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Error setting up SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cancellation_stops_processes_and_runs_closers() {
        let closed = Arc::new(AtomicBool::new(false));
        let closed_clone = closed.clone();
        let token = CancellationToken::new();
        let cancel = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result = Runner::new()
            .without_signal_handlers()
            .with_cancellation_token(token)
            .with_named_process("worker", |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .with_closer("flag", move || async move {
                closed_clone.store(true, Ordering::SeqCst);
                Ok(())
            })
            .wait()
            .await;

        assert!(result.is_ok());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failing_process_cancels_siblings() {
        let sibling_stopped = Arc::new(AtomicBool::new(false));
        let sibling_flag = sibling_stopped.clone();

        let result = Runner::new()
            .without_signal_handlers()
            .with_named_process("broken", |_ctx| async move {
                Err(anyhow::anyhow!("listener failed"))
            })
            .with_named_process("sibling", move |ctx| async move {
                ctx.cancelled().await;
                sibling_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .wait()
            .await;

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("listener failed"));
        assert!(format!("{err:#}").contains("broken"));
    }

    #[tokio::test]
    async fn test_all_closers_run_even_if_one_fails() {
        let count = Arc::new(AtomicUsize::new(0));
        let first = count.clone();
        let second = count.clone();

        let result = Runner::new()
            .without_signal_handlers()
            .with_closer("failing", move || async move {
                first.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("close failed"))
            })
            .with_closer("ok", move || async move {
                second.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .wait()
            .await;

        assert!(result.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_closer_is_abandoned_after_timeout() {
        let started = std::time::Instant::now();

        Runner::new()
            .without_signal_handlers()
            .with_closer_timeout(Duration::from_millis(50))
            .with_closer("stuck", || async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .wait()
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
