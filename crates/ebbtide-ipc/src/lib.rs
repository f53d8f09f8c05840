//! Single-instance coordination over a Unix domain socket.
//!
//! The first process to claim the endpoint becomes the primary: it binds the
//! socket and owns a [`RequestListener`] that relays payloads from later
//! invocations. A later invocation connects as a client, hands over one
//! UTF-8 payload (typically a magnet link), waits for the `OK`
//! acknowledgement, and exits without initializing anything else.

#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use error::{IpcError, IpcResult};

/// File name of the coordination socket inside the system temp directory.
pub const INSTANCE_SOCKET_NAME: &str = "ebbtide.sock";

/// Acknowledgement sent for each accepted request payload.
pub const INSTANCE_ACK: &[u8] = b"OK";

/// Upper bound on a single forwarded payload.
const MAX_REQUEST_LEN: u64 = 16 * 1024;

/// How long a secondary invocation waits for the acknowledgement.
const ACK_TIMEOUT: Duration = Duration::from_secs(2);

const REQUEST_BUFFER: usize = 16;

/// Default coordination endpoint for this machine.
#[must_use]
pub fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join(INSTANCE_SOCKET_NAME)
}

/// Outcome of claiming the coordination endpoint.
#[derive(Debug)]
pub enum InstanceRole {
    /// A primary instance is already running and accepted the payload.
    Forwarded,
    /// This process now owns the endpoint.
    Primary(RequestListener),
    /// The endpoint could not be bound; run standalone without coordination.
    Degraded,
}

/// Claim the coordination endpoint.
///
/// Connects as a client first. When a primary answers, `payload` is handed
/// over and the caller should exit. Otherwise any stale socket file is
/// removed and this process binds the endpoint itself; a bind failure
/// downgrades to [`InstanceRole::Degraded`] rather than failing startup.
///
/// # Errors
///
/// Returns an error when a primary instance accepted the connection but the
/// handshake failed partway, leaving the payload in an unknown state.
pub async fn claim(socket_path: &Path, payload: &str) -> IpcResult<InstanceRole> {
    match UnixStream::connect(socket_path).await {
        Ok(stream) => {
            forward_to_primary(stream, socket_path, payload).await?;
            return Ok(InstanceRole::Forwarded);
        }
        Err(err) => {
            debug!(path = %socket_path.display(), error = %err, "no primary instance reachable");
        }
    }

    if socket_path.exists() {
        // Leftover from a crashed primary; the connect attempt above already
        // ruled out a live listener.
        let _ = std::fs::remove_file(socket_path);
    }
    match UnixListener::bind(socket_path) {
        Ok(listener) => Ok(InstanceRole::Primary(RequestListener::spawn(
            listener,
            socket_path.to_path_buf(),
        ))),
        Err(err) => {
            warn!(
                path = %socket_path.display(),
                error = %err,
                "instance socket bind failed, continuing without coordination"
            );
            Ok(InstanceRole::Degraded)
        }
    }
}

async fn forward_to_primary(
    mut stream: UnixStream,
    socket_path: &Path,
    payload: &str,
) -> IpcResult<()> {
    stream
        .write_all(payload.as_bytes())
        .await
        .map_err(|source| IpcError::io("write", socket_path.to_path_buf(), source))?;
    stream
        .shutdown()
        .await
        .map_err(|source| IpcError::io("shutdown", socket_path.to_path_buf(), source))?;

    let mut ack = Vec::with_capacity(INSTANCE_ACK.len());
    match tokio::time::timeout(ACK_TIMEOUT, stream.read_to_end(&mut ack)).await {
        Ok(Ok(_)) if ack == INSTANCE_ACK => {
            debug!(
                path = %socket_path.display(),
                bytes = payload.len(),
                "request forwarded to primary instance"
            );
            Ok(())
        }
        Ok(Ok(_)) => Err(IpcError::handshake(socket_path.to_path_buf())),
        Ok(Err(source)) => Err(IpcError::io("read", socket_path.to_path_buf(), source)),
        Err(_) => Err(IpcError::handshake(socket_path.to_path_buf())),
    }
}

/// Receiving end of the primary instance's request relay.
///
/// Dropping the listener stops the accept loop and unlinks the socket file.
#[derive(Debug)]
pub struct RequestListener {
    requests: mpsc::Receiver<String>,
    socket_path: PathBuf,
    accept_task: JoinHandle<()>,
}

impl RequestListener {
    fn spawn(listener: UnixListener, socket_path: PathBuf) -> Self {
        let (forward, requests) = mpsc::channel(REQUEST_BUFFER);
        let accept_task = tokio::spawn(accept_loop(listener, forward));
        Self {
            requests,
            socket_path,
            accept_task,
        }
    }

    /// Wait for the next payload forwarded by a secondary invocation.
    ///
    /// Returns `None` once the accept loop has shut down.
    pub async fn recv(&mut self) -> Option<String> {
        self.requests.recv().await
    }

    /// Path of the socket this listener owns.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for RequestListener {
    fn drop(&mut self) {
        self.accept_task.abort();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn accept_loop(listener: UnixListener, forward: mpsc::Sender<String>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let forward = forward.clone();
                let _ = tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, forward).await {
                        debug!(error = %err, "instance request connection failed");
                    }
                });
            }
            Err(err) => {
                warn!(error = %err, "instance socket accept failed");
                return;
            }
        }
    }
}

async fn serve_connection(
    stream: UnixStream,
    forward: mpsc::Sender<String>,
) -> std::io::Result<()> {
    let mut payload = Vec::new();
    let mut reader = stream.take(MAX_REQUEST_LEN);
    reader.read_to_end(&mut payload).await?;
    let mut stream = reader.into_inner();

    let Ok(request) = String::from_utf8(payload) else {
        debug!("discarding non-utf8 instance request");
        return Ok(());
    };
    if forward.send(request).await.is_err() {
        // Listener dropped while this connection was in flight.
        return Ok(());
    }
    stream.write_all(INSTANCE_ACK).await?;
    stream.shutdown().await?;
    Ok(())
}
