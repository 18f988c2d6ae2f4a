//! Local IPC over Unix domain sockets.
//!
//! Not available on Windows; use TCP on localhost there.

#[cfg(unix)]
use std::io;
#[cfg(unix)]
use std::path::{Path, PathBuf};

#[cfg(unix)]
use futures::future::BoxFuture;
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
#[cfg(unix)]
use tokio::sync::mpsc;
#[cfg(unix)]
use tracing::{error, info, instrument};

#[cfg(unix)]
use crate::error::Result;
#[cfg(unix)]
use crate::service::server::BosonServer;
#[cfg(unix)]
use crate::transport::{Acceptor, Connector};

/// Connects to a Unix domain socket path.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: PathBuf,
}

#[cfg(unix)]
impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(unix)]
impl Connector for UnixConnector {
    type Stream = UnixStream;

    fn connect(&self) -> BoxFuture<'static, io::Result<UnixStream>> {
        let path = self.path.clone();
        Box::pin(async move { UnixStream::connect(path).await })
    }
}

#[cfg(unix)]
impl Acceptor for UnixListener {
    type Stream = UnixStream;

    fn accept(&mut self) -> BoxFuture<'_, io::Result<(UnixStream, String)>> {
        Box::pin(async move {
            let (stream, addr) = UnixListener::accept(self).await?;
            let peer = addr
                .as_pathname()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "unix:unnamed".to_string());
            Ok((stream, peer))
        })
    }
}

/// Serve `server` on a Unix socket until CTRL+C.
#[cfg(unix)]
#[instrument(skip(path, server), fields(socket_path = %path.as_ref().display()))]
pub async fn start_server<P: AsRef<Path>>(path: P, server: &BosonServer) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    start_server_with_shutdown(path, server, shutdown_rx).await
}

/// Serve `server` on a Unix socket with an external shutdown channel.
///
/// A stale socket file at `path` is replaced; the file is removed on shutdown.
#[cfg(unix)]
#[instrument(skip(path, server, shutdown_rx), fields(socket_path = %path.as_ref().display()))]
pub async fn start_server_with_shutdown<P: AsRef<Path>>(
    path: P,
    server: &BosonServer,
    shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        tokio::fs::remove_file(path).await.ok();
    }

    let listener = UnixListener::bind(path)?;
    info!(path = %path.display(), "Listening on unix socket");

    let result = server.serve(listener, shutdown_rx).await;

    if path.exists() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            error!(error = %e, path = %path.display(), "Failed to remove socket file");
        } else {
            info!(path = %path.display(), "Removed socket file");
        }
    }
    result
}
