//! Newline-delimited JSON-RPC over stdin/stdout
//!
//! Only protocol frames are written to stdout. Each line is handled on its own
//! task; replies are serialized through a single writer and may arrive out of
//! order.

use crate::auth::RequestMetadata;
use crate::config::CredentialHeaders;
use crate::error::{GatewayError, Result};
use crate::mcp::handler::handle_frame;
use crate::mcp::server::GatewayState;
use crate::routing::TransportKind;
use actix_web::web::Bytes;
use futures_util::stream;
use std::io::BufRead;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

pub const ENV_VENDOR_KEY: &str = "TOOLGATE_VENDOR_KEY";
pub const ENV_INTERNAL_KEY: &str = "TOOLGATE_INTERNAL_KEY";
pub const ENV_API_KEY: &str = "TOOLGATE_API_KEY";
pub const ENV_BEARER_TOKEN: &str = "TOOLGATE_BEARER_TOKEN";

/// Build request metadata from credential values, mapped onto the
/// configured header names
pub fn credentials_metadata<F>(headers: &CredentialHeaders, lookup: F) -> RequestMetadata
where
    F: Fn(&str) -> Option<String>,
{
    let mut metadata = RequestMetadata::new().with_peer("stdio");
    if let Some(key) = lookup(ENV_VENDOR_KEY) {
        metadata.insert(&headers.vendor_key, key);
    }
    if let Some(key) = lookup(ENV_INTERNAL_KEY) {
        metadata.insert(&headers.internal_key, key);
    }
    if let Some(key) = lookup(ENV_API_KEY) {
        metadata.insert(&headers.api_key, key);
    }
    if let Some(token) = lookup(ENV_BEARER_TOKEN) {
        metadata.insert(&headers.bearer, format!("Bearer {}", token));
    }
    metadata
}

/// Credentials for the stdio session, read once from the process environment
pub fn metadata_from_env(headers: &CredentialHeaders) -> RequestMetadata {
    credentials_metadata(headers, |name| std::env::var(name).ok().filter(|v| !v.is_empty()))
}

/// Feed lines from a blocking reader through a dedicated OS thread.
///
/// The thread is detached: a read that never returns cannot hold up runtime
/// shutdown the way a read parked on tokio's blocking pool does.
pub fn spawn_line_reader<R>(mut reader: R) -> Result<impl AsyncBufRead + Unpin + Send>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(16);
    std::thread::Builder::new()
        .name("toolgate-stdin".to_string())
        .spawn(move || loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.blocking_send(Ok(Bytes::from(line))).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    break;
                }
            }
        })?;

    let lines = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
    Ok(StreamReader::new(Box::pin(lines)))
}

/// The process's stdin, read on its own thread
pub fn detached_stdin() -> Result<impl AsyncBufRead + Unpin + Send> {
    spawn_line_reader(std::io::BufReader::new(std::io::stdin()))
}

/// Serve JSON-RPC on the given reader/writer until EOF or force-close.
///
/// Requests still running at EOF are allowed to finish so their replies are
/// written before this returns.
pub async fn run_stdio<R, W>(
    state: Arc<GatewayState>,
    metadata: RequestMetadata,
    reader: R,
    mut writer: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let metadata = Arc::new(metadata);
    let token = state.shutdown().connection_token();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            writer.write_all(frame.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    info!("stdio transport ready");

    let mut lines = reader.lines();
    let mut tasks = JoinSet::new();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin closed");
                break;
            }
            Err(e) => {
                warn!("Failed to read from stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let state = state.clone();
        let metadata = metadata.clone();
        let tx = tx.clone();
        let token = token.clone();
        tasks.spawn(async move {
            let reply = handle_frame(&state, &line, &metadata, TransportKind::Stdio, &token).await;
            if let Some(reply) = reply {
                match serde_json::to_string(&reply) {
                    Ok(frame) => {
                        let _ = tx.send(frame);
                    }
                    Err(e) => warn!("Failed to encode stdio reply: {}", e),
                }
            }
        });

        // Reap finished tasks so the set does not grow with the session
        while tasks.try_join_next().is_some() {}
    }

    let finished = tokio::select! {
        _ = token.cancelled() => false,
        _ = async { while tasks.join_next().await.is_some() {} } => true,
    };
    if !finished {
        tasks.abort_all();
    }
    drop(tx);

    let written = writer_task
        .await
        .map_err(|e| GatewayError::transport(format!("stdio writer task failed: {}", e)))?;
    written.map_err(GatewayError::from)?;

    info!("stdio transport closed");
    Ok(())
}
