//! TCP front-end: one session per connection, one JSON message per line

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use warden_bus::Transport;
use warden_session::SessionManager;

/// Longest accepted inbound line, in bytes
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// How long open sessions get to wind down before they are aborted
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Server {
    listener: TcpListener,
    sessions: Arc<SessionManager>,
}

impl Server {
    pub async fn bind(addr: &str, sessions: Arc<SessionManager>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        Ok(Self { listener, sessions })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled, then let open
    /// sessions cancel their tasks and close before aborting stragglers
    pub async fn run(self, shutdown: CancellationToken) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Connection from {}", peer);
                        let sessions = self.sessions.clone();
                        connections.spawn(serve_connection(sessions, stream, peer, shutdown.clone()));
                    }
                    Err(e) => error!("◆ ACCEPT FAILED: {}", e),
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        error!("◆ CONNECTION TASK FAILED: {}", e);
                    }
                }
            }
        }

        info!("◆ SERVER STOPPING: closing {} connection(s)", connections.len());
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("◆ {} CONNECTION(S) DID NOT CLOSE, ABORTING", connections.len());
            connections.shutdown().await;
        }
    }
}

async fn serve_connection(
    sessions: Arc<SessionManager>,
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_FRAME_LEN));
    let mut sink = FramedWrite::new(write_half, LinesCodec::new());

    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (server_tx, mut server_rx) = mpsc::unbounded_channel();

    let reader = tokio::spawn(async move {
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    if frame_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Read from {} failed: {}", peer, e);
                    break;
                }
            }
        }
    });

    let writer = tokio::spawn(async move {
        while let Some(msg) = server_rx.recv().await {
            let line = match serde_json::to_string(&msg) {
                Ok(line) => line,
                Err(e) => {
                    error!("◆ COULD NOT ENCODE MESSAGE: {}", e);
                    continue;
                }
            };
            if let Err(e) = sink.send(line).await {
                debug!("Write to {} failed: {}", peer, e);
                break;
            }
        }
    });

    let end = sessions
        .serve_until(Transport::new(frame_rx, server_tx), shutdown)
        .await;
    info!("Connection {} closed: {:?}", peer, end);

    reader.abort();
    // Drains once the session and its tasks have dropped their senders
    if let Err(e) = writer.await {
        error!("◆ WRITER FOR {} FAILED: {}", peer, e);
    }
}
