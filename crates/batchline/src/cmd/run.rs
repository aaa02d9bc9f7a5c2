//! Run command - batch stdin lines into the configured sink
//!
//! Every line read from stdin becomes one item. On end of input or a
//! shutdown signal the executor is stopped, which delivers everything
//! already queued before the process exits.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use batchline_config::Config;
use batchline_executor::{AsyncBatchExecutor, ExecutorMetricsHandle, MetricsSnapshot};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::sink_builder::{build_sink, executor_config};

/// Name of the stdin executor in logs
const EXECUTOR_NAME: &str = "stdin";

/// Run the run command
pub async fn run(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        sink = config.sink.type_name(),
        batch_size = config.executor.batch_size,
        queue_capacity = config.executor.queue_capacity,
        "batchline starting"
    );

    let input = BufReader::new(tokio::io::stdin());
    let snapshot = run_pipeline(&config, input, wait_for_shutdown()).await?;

    info!(
        items_delivered = snapshot.items_delivered,
        batches_delivered = snapshot.batches_delivered,
        "batchline shutdown complete"
    );
    Ok(())
}

/// Feed `input` line by line into an executor until EOF or `shutdown`
///
/// Returns the executor's final metrics once every accepted line has been
/// delivered and the sink finalized.
pub async fn run_pipeline<R, S>(config: &Config, input: R, shutdown: S) -> Result<MetricsSnapshot>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let sink = build_sink(&config.sink)?;
    let executor = AsyncBatchExecutor::with_name(executor_config(&config.executor), sink, EXECUTOR_NAME)
        .context("failed to create executor")?;
    executor.start().context("failed to start executor")?;

    let cancel = CancellationToken::new();
    let reporter = config.metrics.enabled.then(|| {
        spawn_metrics_reporter(executor.metrics_handle(), config.metrics.interval, cancel.clone())
    });

    let mut lines = input.lines();
    let mut read_error = None;
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping");
                break;
            }
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("end of input");
                break;
            }
            Err(e) => {
                error!(error = %e, "failed to read input");
                read_error = Some(e);
                break;
            }
        };

        // A full queue blocks here; a signal must still get through
        let outcome = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("shutdown signal received while the queue was full, stopping");
                break;
            }
            outcome = executor.enqueue(line) => outcome,
        };

        if !outcome.is_accepted() {
            warn!(outcome = ?outcome, "executor stopped accepting input");
            break;
        }
    }

    info!(queued = executor.queue_size(), "draining executor");
    executor.stop().await;

    cancel.cancel();
    if let Some(reporter) = reporter
        && let Err(e) = reporter.await
    {
        warn!(error = %e, "metrics reporter panicked");
    }

    let snapshot = executor.metrics_handle().snapshot();
    log_snapshot(EXECUTOR_NAME, &snapshot);

    match read_error {
        Some(e) => Err(e).context("failed to read input"),
        None => Ok(snapshot),
    }
}

/// Log the executor metrics every `interval` until cancelled
fn spawn_metrics_reporter(
    handle: ExecutorMetricsHandle<String>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => log_snapshot(handle.name(), &handle.snapshot()),
            }
        }
    })
}

fn log_snapshot(name: &str, snapshot: &MetricsSnapshot) {
    info!(
        executor = %name,
        queue_size = snapshot.queue_size,
        fill = format!("{:.1}%", snapshot.fill_fraction() * 100.0),
        items_enqueued = snapshot.items_enqueued,
        items_delivered = snapshot.items_delivered,
        batches_delivered = snapshot.batches_delivered,
        delivery_failures = snapshot.delivery_failures,
        items_rejected = snapshot.items_rejected,
        items_interrupted = snapshot.items_interrupted,
        backlog_events = snapshot.backlog_events,
        "executor metrics"
    );
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
