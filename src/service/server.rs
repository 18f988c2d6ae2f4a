//! # RPC Server
//!
//! Accepts connections from any [`Acceptor`], runs each on its own task and
//! routes inbound requests through a shared [`Dispatcher`] and queueing
//! strategy.
//!
//! Shutdown stops accepting, waits up to `shutdown_timeout` for peers to
//! disconnect, closes whatever is left, then shuts the strategy down.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{BosonConfig, CodecConfig, DispatchConfig, ServerConfig};
use crate::core::encoding::ValueCodec;
use crate::core::mutator::FrozenRegistry;
use crate::error::constants::ERR_NO_RUNTIME;
use crate::error::{BosonError, Result, TransportError};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::message::{Message, Payload};
use crate::protocol::queue::{build_strategy, QueueingStrategy};
use crate::service::connection::{ConnectionContext, Listeners};
use crate::transport::Acceptor;
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::SHUTDOWN_POLL_INTERVAL;

pub struct ServerBuilder {
    config: ServerConfig,
    codec: CodecConfig,
    dispatch: DispatchConfig,
    mutators: Arc<FrozenRegistry>,
    dispatcher: Arc<Dispatcher>,
    listeners: Listeners,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            codec: CodecConfig::default(),
            dispatch: DispatchConfig::default(),
            mutators: FrozenRegistry::generic(),
            dispatcher: Arc::new(Dispatcher::new()),
            listeners: Listeners::default(),
        }
    }

    pub fn from_config(config: &BosonConfig) -> Self {
        Self::new()
            .config(config.server.clone())
            .codec(config.codec.clone())
            .dispatch(config.dispatch.clone())
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    pub fn dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn mutators(mut self, mutators: Arc<FrozenRegistry>) -> Self {
        self.mutators = mutators;
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn on_connected<F>(mut self, f: F) -> Self
    where
        F: Fn(&ConnectionContext) + Send + Sync + 'static,
    {
        self.listeners.on_connected = Some(Arc::new(f));
        self
    }

    pub fn on_disconnected<F>(mut self, f: F) -> Self
    where
        F: Fn(&ConnectionContext) + Send + Sync + 'static,
    {
        self.listeners.on_disconnected = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&ConnectionContext, &BosonError) + Send + Sync + 'static,
    {
        self.listeners.on_error = Some(Arc::new(f));
        self
    }

    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<BosonServer> {
        let runtime =
            Handle::try_current().map_err(|_| BosonError::Custom(ERR_NO_RUNTIME.to_string()))?;
        let strategy = build_strategy(&self.dispatch, self.dispatcher.clone())?;
        Ok(BosonServer {
            inner: Arc::new(ServerInner {
                codec: Arc::new(ValueCodec::new(self.codec, self.mutators)),
                config: self.config,
                dispatcher: self.dispatcher,
                strategy,
                listeners: self.listeners,
                connections: DashMap::new(),
                slots: AtomicUsize::new(0),
                runtime,
            }),
        })
    }
}

struct ServerInner {
    config: ServerConfig,
    codec: Arc<ValueCodec>,
    dispatcher: Arc<Dispatcher>,
    strategy: Arc<dyn QueueingStrategy>,
    listeners: Listeners,
    connections: DashMap<u64, ConnectionContext>,
    /// Reserved connection slots, bounded by `max_connections`.
    slots: AtomicUsize,
    runtime: Handle,
}

impl ServerInner {
    fn reserve_slot(&self) -> bool {
        let max = self.config.max_connections;
        self.slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok()
    }

    fn release_slot(&self) {
        self.slots.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Clone)]
pub struct BosonServer {
    inner: Arc<ServerInner>,
}

impl BosonServer {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn register<F>(&self, method: &str, handler: F) -> Result<()>
    where
        F: Fn(&ConnectionContext, &Message) -> Result<Option<Payload>> + Send + Sync + 'static,
    {
        self.inner.dispatcher.register(method, handler)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Snapshot of the live connections.
    pub fn connections(&self) -> Vec<ConnectionContext> {
        self.inner
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Serve an already-established stream.
    pub fn accept_stream<S>(&self, stream: S, peer: impl Into<String>) -> Result<ConnectionContext>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let inner = &self.inner;
        if inner.strategy.is_shutdown() {
            return Err(BosonError::closed());
        }
        if !inner.reserve_slot() {
            let max = inner.config.max_connections;
            return Err(TransportError::ConnectError(format!(
                "connection limit reached ({max})"
            ))
            .into());
        }

        let connection = ConnectionContext::new(
            Arc::clone(&inner.codec),
            inner.config.outbound.clone(),
            inner.config.call_timeout,
            inner.listeners.clone(),
            inner.runtime.clone(),
        );
        connection.set_peer(peer);
        inner.connections.insert(connection.id(), connection.clone());

        let task_inner = Arc::clone(inner);
        let task_connection = connection.clone();
        inner.runtime.spawn(async move {
            let strategy = Arc::clone(&task_inner.strategy);
            task_connection.run(stream, strategy).await;
            task_connection.close();
            task_inner.connections.remove(&task_connection.id());
            task_inner.release_slot();
        });
        Ok(connection)
    }

    /// Accept until `shutdown_rx` fires, then shut down gracefully.
    #[instrument(skip(self, acceptor, shutdown_rx))]
    pub async fn serve<A: Acceptor>(
        &self,
        mut acceptor: A,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        info!(max_connections = self.inner.config.max_connections, "Server accepting connections");
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server. Waiting for connections to close...");
                    self.shutdown().await;
                    return Ok(());
                }

                accepted = acceptor.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(peer = %peer, "Accepted connection");
                            if let Err(e) = self.accept_stream(stream, peer) {
                                warn!(error = %e, "Rejected connection");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
            }
        }
    }

    /// Bind `config.address` and serve until CTRL+C.
    pub async fn bind_and_serve(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.inner.config.address).await?;
        info!(address = %self.inner.config.address, "Server listening");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });

        self.serve(listener, shutdown_rx).await
    }

    /// Wait for peers to leave, force-close the rest, stop dispatching.
    pub async fn shutdown(&self) {
        let timeout = self.inner.config.shutdown_timeout;
        let drained = tokio::time::timeout(timeout, async {
            while !self.inner.connections.is_empty() {
                debug!(
                    connections = self.inner.connections.len(),
                    "Waiting for connections to close"
                );
                tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
            }
        })
        .await;

        if drained.is_err() {
            let remaining = self.connections();
            warn!(
                connections = remaining.len(),
                "Shutdown timeout reached, closing remaining connections"
            );
            for connection in remaining {
                connection.close();
            }
        }

        self.inner.strategy.shutdown();
        global_metrics().log_metrics();
        info!("Server shut down");
    }
}
