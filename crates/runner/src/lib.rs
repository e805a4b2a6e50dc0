//! Application runner for long-lived device processes with graceful shutdown.
//!
//! The runner owns a set of named app processes and a set of closers:
//! - Processes run concurrently until one fails or a shutdown signal
//!   (SIGINT/SIGTERM) arrives; either cancels the shared token.
//! - Cancelled processes get a bounded grace period to finish on their own
//!   (flushing connections, closing sessions) before being aborted.
//! - Closers run afterward, sequentially, under one overall timeout.
//! - `run` returns the process exit code instead of exiting, so shutdown
//!   behavior is testable.
//!
//! # Example
//!
//! ```no_run
//! use thermpub_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let code = Runner::new()
//!         .with_named_process("heartbeat", |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("beat");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("releasing resources");
//!             Ok(())
//!         })
//!         .run()
//!         .await;
//!     std::process::exit(code);
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type ProcessFuture = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;
type Process = Box<dyn FnOnce(CancellationToken) -> ProcessFuture + Send>;
type Closer = Box<dyn FnOnce() -> ProcessFuture + Send>;

pub struct Runner {
    processes: Vec<(String, Process)>,
    closers: Vec<Closer>,
    shutdown_grace: Duration,
    closer_timeout: Duration,
    shutdown_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            shutdown_grace: Duration::from_secs(30),
            closer_timeout: Duration::from_secs(10),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Adds a named app process. Processes run concurrently; the first
    /// failure cancels the rest.
    pub fn with_named_process<N, F, Fut>(mut self, name: N, process: F) -> Self
    where
        N: Into<String>,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Adds a closer, executed after all processes have stopped regardless
    /// of how they stopped.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    /// How long cancelled processes may keep running before being aborted
    /// (default: 30 seconds)
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Overall timeout for the closers (default: 10 seconds)
    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally-owned shutdown token
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = token;
        self
    }

    /// Runs all processes to completion and returns the exit code: 0 when
    /// every process stopped cleanly, 1 when any failed or panicked.
    pub async fn run(self) -> i32 {
        let token = self.shutdown_token;
        let mut join_set: JoinSet<(String, Result<(), anyhow::Error>)> = JoinSet::new();

        for (name, process) in self.processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                let result = process(process_token).await;
                (name, result)
            });
        }

        spawn_signal_watchers(token.clone());

        let mut failed = false;
        loop {
            // Once shutdown is underway, remaining processes get a bounded
            // grace period to finish flushing and closing
            let joined = if token.is_cancelled() {
                match tokio::time::timeout(self.shutdown_grace, join_set.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        error!(
                            grace = ?self.shutdown_grace,
                            "processes did not stop within the shutdown grace period, aborting"
                        );
                        join_set.shutdown().await;
                        break;
                    }
                }
            } else {
                tokio::select! {
                    // External cancellation must wake the drain so the grace
                    // period starts counting
                    _ = token.cancelled() => continue,
                    joined = join_set.join_next() => joined,
                }
            };

            let Some(result) = joined else { break };
            match result {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "app process completed");
                }
                Ok((name, Err(err))) => {
                    error!(process = %name, "app process failed: {:#}", err);
                    failed = true;
                    token.cancel();
                }
                Err(err) => {
                    error!("app process panicked: {}", err);
                    failed = true;
                    token.cancel();
                }
            }
        }

        if !self.closers.is_empty() {
            info!(timeout = ?self.closer_timeout, "running closers");
            let closer_result =
                tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await;
            match closer_result {
                Ok(()) => info!("all closers completed"),
                Err(_) => error!(timeout = ?self.closer_timeout, "closers timed out"),
            }
        }

        if failed {
            1
        } else {
            0
        }
    }
}

/// Closers run in registration order; one failing must not stop the rest
async fn run_closers(closers: Vec<Closer>) {
    for closer in closers {
        if let Err(err) = closer().await {
            error!("closer failed: {:#}", err);
        }
    }
}

fn spawn_signal_watchers(token: CancellationToken) {
    let interrupt_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received interrupt signal");
                interrupt_token.cancel();
            }
            Err(err) => {
                error!("error setting up signal handler: {}", err);
            }
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("received SIGTERM");
                    token.cancel();
                }
                Err(err) => {
                    error!("error setting up SIGTERM handler: {}", err);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_completed_processes_exit_zero() {
        let code = Runner::new()
            .with_named_process("one-shot", |_ctx| async move { Ok(()) })
            .run()
            .await;
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_failed_process_exits_one_and_cancels_others() {
        let other_stopped = Arc::new(AtomicBool::new(false));
        let other_stopped_clone = other_stopped.clone();

        let code = Runner::new()
            .with_named_process("failing", |_ctx| async move {
                Err(anyhow::anyhow!("boom"))
            })
            .with_named_process("long-running", move |ctx| async move {
                ctx.cancelled().await;
                other_stopped_clone.store(true, Ordering::SeqCst);
                Ok(())
            })
            .run()
            .await;

        assert_eq!(code, 1);
        assert!(other_stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_external_cancellation_exits_zero() {
        let token = CancellationToken::new();
        let cancel_trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_trigger.cancel();
        });

        let code = Runner::new()
            .with_named_process("loop", |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .with_shutdown_token(token)
            .run()
            .await;

        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_closers_run_after_processes() {
        let closed = Arc::new(AtomicU32::new(0));
        let first = closed.clone();
        let second = closed.clone();

        let code = Runner::new()
            .with_named_process("one-shot", |_ctx| async move { Ok(()) })
            .with_closer(move || async move {
                first.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_closer(move || async move {
                second.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("closer fault must not stop the rest"))
            })
            .with_closer_timeout(Duration::from_secs(1))
            .run()
            .await;

        assert_eq!(code, 0);
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_hung_process_is_aborted_after_grace() {
        let token = CancellationToken::new();
        let cancel_trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_trigger.cancel();
        });

        let code = Runner::new()
            .with_named_process("ignores-cancellation", |_ctx| async move {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(())
            })
            .with_shutdown_token(token)
            .with_shutdown_grace(Duration::from_millis(100))
            .run()
            .await;

        // Aborted, not failed
        assert_eq!(code, 0);
    }
}
