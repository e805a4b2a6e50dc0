//! Basic example of using the runner
//!
//! Demonstrates named concurrent processes, graceful shutdown on
//! SIGINT/SIGTERM, and cleanup with closers.
//!
//! Run with: cargo run --example basic_runner

use std::time::Duration;
use thermpub_runner::Runner;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting runner example, press Ctrl+C for graceful shutdown");

    let code = Runner::new()
        .with_named_process("counter", |ctx| async move {
            let mut counter = 0;
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => {
                        tracing::info!("counter stopping at {}", counter);
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {
                        counter += 1;
                        tracing::info!("counter: {}", counter);
                    }
                }
            }
            Ok(())
        })
        .with_named_process("faulty", |ctx| async move {
            // Fails after 30 seconds unless shut down first
            tokio::select! {
                _ = ctx.cancelled() => Ok(()),
                _ = tokio::time::sleep(Duration::from_secs(30)) => {
                    Err(anyhow::anyhow!("simulated fault after 30 seconds"))
                }
            }
        })
        .with_closer(|| async move {
            tracing::info!("flushing buffers");
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(5))
        .run()
        .await;

    std::process::exit(code);
}
