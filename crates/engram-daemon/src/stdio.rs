//! Stdio transport
//!
//! Every request line is handled on its own task, so a long ingestion never
//! holds up searches. A single writer task emits responses in completion
//! order; clients pair them with requests by `id`.

use anyhow::Context;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, warn};

use crate::protocol::ToolResponse;

const RESPONSE_BUFFER: usize = 64;

/// Read requests from `input` until EOF, answering each through `handler`
///
/// Returns once every in-flight request has been answered.
pub async fn serve<R, W, H, F>(input: R, output: W, handler: H) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    H: Fn(String) -> F,
    F: Future<Output = ToolResponse> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<ToolResponse>(RESPONSE_BUFFER);
    let writer = tokio::spawn(write_responses(output, rx));

    let mut lines = input.lines();
    let mut in_flight = JoinSet::new();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handler(line);
        let tx = tx.clone();
        in_flight.spawn(async move {
            if tx.send(response.await).await.is_err() {
                warn!("Response dropped, output closed");
            }
        });
        while let Some(done) = in_flight.try_join_next() {
            if let Err(e) = done {
                error!("Request task failed: {}", e);
            }
        }
    }

    while let Some(done) = in_flight.join_next().await {
        if let Err(e) = done {
            error!("Request task failed: {}", e);
        }
    }
    drop(tx);
    writer.await.context("response writer")?
}

async fn write_responses<W>(mut output: W, mut rx: mpsc::Receiver<ToolResponse>) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut encoded = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize response: {}", e);
                r#"{"id":null,"error":"Internal error"}"#.to_string()
            }
        };
        encoded.push('\n');
        output.write_all(encoded.as_bytes()).await.context("writing stdout")?;
        output.flush().await.context("flushing stdout")?;
    }
    Ok(())
}
