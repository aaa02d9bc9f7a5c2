//! Receive command - accept batches from forwarder sinks
//!
//! Counterpart of the `forwarder` sink. Every item of every received batch is
//! printed to stdout as one line; the batch is acked only after it has been
//! written, so a forwarder never loses a batch the receiver failed to print.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use batchline_sinks::forwarder::ForwarderError;
use batchline_sinks::forwarder::frame::{ACK_OK, ACK_REJECTED, read_batch, write_ack};
use clap::Args;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default listen address
pub const DEFAULT_LISTEN: &str = "0.0.0.0:7070";

/// Receive command arguments
#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// Address to listen on (host:port)
    #[arg(long, default_value = DEFAULT_LISTEN)]
    pub listen: String,
}

/// Run the receive command
pub async fn run(args: ReceiveArgs) -> Result<()> {
    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received, stopping receiver");
                signal_cancel.cancel();
            }
            Err(e) => warn!(error = %e, "failed to install Ctrl+C handler"),
        }
    });

    let output = Arc::new(Mutex::new(tokio::io::stdout()));
    serve(listener, output, cancel).await
}

/// Accept connections until cancelled, each served by its own task
pub async fn serve<W>(listener: TcpListener, output: Arc<Mutex<W>>, cancel: CancellationToken) -> Result<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let local_addr = listener.local_addr().context("listener has no local address")?;
    info!(address = %local_addr, "receiver listening");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "connection opened");
                    let output = Arc::clone(&output);
                    tokio::spawn(async move {
                        match handle_connection(stream, &output).await {
                            Ok(batches) => debug!(peer = %peer, batches, "connection closed"),
                            Err(e) => warn!(peer = %peer, error = %e, "connection error"),
                        }
                    });
                }
                // Transient accept errors - log and continue
                Err(e) => warn!(error = %e, "accept error"),
            },
        }
    }

    info!(address = %local_addr, "receiver stopped");
    Ok(())
}

/// Read frames until the peer disconnects, returning the batch count
async fn handle_connection<W>(stream: TcpStream, output: &Mutex<W>) -> Result<u64, ForwarderError>
where
    W: AsyncWrite + Unpin,
{
    let peer = peer_addr(&stream);
    let mut stream = BufReader::new(stream);
    let mut batches = 0u64;

    while let Some(items) = read_batch(&mut stream).await? {
        let written = {
            let mut out = output.lock().await;
            write_items(&mut *out, &items).await
        };

        if let Err(e) = written {
            warn!(peer = %peer, error = %e, "failed to write batch, rejecting");
            write_ack(&mut stream, ACK_REJECTED).await?;
            return Err(e.into());
        }

        write_ack(&mut stream, ACK_OK).await?;
        batches += 1;
        debug!(peer = %peer, items = items.len(), "batch received");
    }

    Ok(batches)
}

async fn write_items<W, I>(out: &mut W, items: &[I]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    I: AsRef<[u8]>,
{
    for item in items {
        out.write_all(item.as_ref()).await?;
        out.write_all(b"\n").await?;
    }
    out.flush().await
}

fn peer_addr(stream: &TcpStream) -> String {
    stream
        .peer_addr()
        .map(|addr: SocketAddr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchline_executor::BatchHandler;
    use batchline_sinks::forwarder::{BatchForwarder, TcpClientFactory, TcpForwarderConfig};
    use std::time::Duration;

    async fn start_receiver() -> (SocketAddr, Arc<Mutex<Vec<u8>>>, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let output = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        tokio::spawn(serve(listener, Arc::clone(&output), cancel.clone()));
        (addr, output, cancel)
    }

    async fn deliver<H: BatchHandler<String>>(handler: &mut H, batch: &[String]) -> bool {
        handler.handle(batch).await
    }

    async fn finish<H: BatchHandler<String>>(handler: &mut H) {
        handler.finalize().await.unwrap();
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_receives_forwarded_batches() {
        let (addr, output, cancel) = start_receiver().await;

        let factory = TcpClientFactory::new(TcpForwarderConfig::new(addr.to_string()));
        let mut forwarder = BatchForwarder::new(factory);

        assert!(deliver(&mut forwarder, &lines(&["one", "two"])).await);
        assert!(deliver(&mut forwarder, &lines(&["three"])).await);
        finish(&mut forwarder).await;

        // The ack is sent after the items are written
        assert_eq!(&output.lock().await[..], b"one\ntwo\nthree\n");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_empty_batch_is_acked() {
        let (addr, output, cancel) = start_receiver().await;

        let factory = TcpClientFactory::new(TcpForwarderConfig::new(addr.to_string()));
        let mut forwarder = BatchForwarder::new(factory);

        assert!(deliver(&mut forwarder, &[]).await);
        assert!(output.lock().await.is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_concurrent_forwarders() {
        let (addr, output, cancel) = start_receiver().await;

        let mut tasks = Vec::new();
        for n in 0..4 {
            let target = addr.to_string();
            tasks.push(tokio::spawn(async move {
                let mut forwarder = BatchForwarder::new(TcpClientFactory::new(TcpForwarderConfig::new(target)));
                let batch = vec![format!("a{n}"), format!("b{n}")];
                let delivered = deliver(&mut forwarder, &batch).await;
                finish(&mut forwarder).await;
                delivered
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }

        let text = String::from_utf8(output.lock().await.clone()).unwrap();
        assert_eq!(text.lines().count(), 8);
        // A batch is written under one lock, so its items stay adjacent
        for n in 0..4 {
            assert!(text.contains(&format!("a{n}\nb{n}\n")));
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let output = Arc::new(Mutex::new(Vec::<u8>::new()));

        let task = tokio::spawn(serve(listener, output, cancel.clone()));
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(result.unwrap().unwrap().is_ok());
    }
}
