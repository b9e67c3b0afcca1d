//! Check-in endpoint on the control plane port.
//!
//! A launched group connects and sends one line holding its group name. The
//! reply is `OK` or `ERR <reason>`, after which the connection is closed.

use stagehand_process::ShutdownSignal;
use stagehand_supervisor::Fleet;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// How long a connection may take to send its group name.
pub const CHECK_IN_READ_TIMEOUT: Duration = Duration::from_secs(5);

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept check-ins until `shutdown` is triggered.
pub async fn serve(listener: TcpListener, fleet: Arc<Fleet>, shutdown: ShutdownSignal) {
    loop {
        tokio::select! {
            _ = shutdown.triggered() => {
                debug!("Check-in listener stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let fleet = Arc::clone(&fleet);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &fleet).await {
                            debug!(%peer, "Check-in connection failed: {}", e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Failed to accept check-in connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, fleet: &Fleet) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut line = String::new();
    let read = tokio::time::timeout(CHECK_IN_READ_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no group name received"))??;
    if read == 0 {
        return Ok(());
    }

    let group = line.trim();
    let reply = match fleet.check_in(group) {
        Ok(()) => {
            info!(group = %group, "Stage group checked in");
            "OK\n".to_string()
        }
        Err(e) => {
            warn!(group = %group, "Rejected check-in: {}", e);
            format!("ERR {}\n", e)
        }
    };

    writer.write_all(reply.as_bytes()).await?;
    writer.shutdown().await
}
