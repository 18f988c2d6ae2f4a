//! # RPC Client
//!
//! `connect` returns a [`BosonClient`] immediately and establishes the
//! transport in the background. Calls made in the meantime are buffered and
//! flushed in submission order once the stream is ready.
//!
//! ```rust,no_run
//! use boson_rpc::prelude::*;
//!
//! # async fn demo() -> boson_rpc::error::Result<()> {
//! let client = ClientBuilder::new().connect_tcp()?;
//! let reply = client
//!     .call("echo", Payload::from_values([Value::I64(42)]))
//!     .await?;
//! assert_eq!(reply.first(), Some(&Value::I64(42)));
//! client.close();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::config::{BosonConfig, ClientConfig, CodecConfig, DispatchConfig};
use crate::core::encoding::ValueCodec;
use crate::core::mutator::FrozenRegistry;
use crate::error::constants::{ERR_CONNECT_TIMEOUT, ERR_NO_RUNTIME};
use crate::error::{BosonError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::message::{Message, Payload};
use crate::protocol::queue::{build_strategy, QueueingStrategy};
use crate::service::connection::{CallOptions, ConnectionContext, Listeners};
use crate::transport::{Connector, TcpConnector};

pub struct ClientBuilder {
    config: ClientConfig,
    codec: CodecConfig,
    dispatch: DispatchConfig,
    mutators: Arc<FrozenRegistry>,
    dispatcher: Arc<Dispatcher>,
    listeners: Listeners,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            codec: CodecConfig::default(),
            dispatch: DispatchConfig::default(),
            mutators: FrozenRegistry::generic(),
            dispatcher: Arc::new(Dispatcher::new()),
            listeners: Listeners::default(),
        }
    }

    /// Take the client, codec and dispatch sections of `config`.
    pub fn from_config(config: &BosonConfig) -> Self {
        Self::new()
            .config(config.client.clone())
            .codec(config.codec.clone())
            .dispatch(config.dispatch.clone())
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
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

    /// Handlers for calls initiated by the server.
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

    /// Connect to `config.address` over TCP.
    pub fn connect_tcp(self) -> Result<BosonClient> {
        let connector = TcpConnector::new(self.config.address.clone());
        self.connect(connector)
    }

    /// Start connecting through `connector` and return the handle right away.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn connect<C: Connector>(self, connector: C) -> Result<BosonClient> {
        let runtime =
            Handle::try_current().map_err(|_| BosonError::Custom(ERR_NO_RUNTIME.to_string()))?;
        let strategy = build_strategy(&self.dispatch, self.dispatcher.clone())?;
        let codec = Arc::new(ValueCodec::new(self.codec, self.mutators));
        let connection = ConnectionContext::new(
            codec,
            self.config.outbound.clone(),
            self.config.call_timeout,
            self.listeners,
            runtime.clone(),
        );

        let task_connection = connection.clone();
        let task_strategy = Arc::clone(&strategy);
        let connect_timeout = self.config.connection_timeout;
        runtime.spawn(async move {
            match tokio::time::timeout(connect_timeout, connector.connect()).await {
                Ok(Ok(stream)) => task_connection.run(stream, task_strategy).await,
                Ok(Err(e)) => task_connection.fail_connect(e.to_string()),
                Err(_) => task_connection.fail_connect(ERR_CONNECT_TIMEOUT.to_string()),
            }
        });

        debug!(connection_id = connection.id(), "Client connecting");
        Ok(BosonClient {
            connection,
            strategy,
            dispatcher: self.dispatcher,
        })
    }
}

/// Handle to one client connection. Closing (or dropping) it fails every
/// outstanding call with `ConnectionClosed`.
pub struct BosonClient {
    connection: ConnectionContext,
    strategy: Arc<dyn QueueingStrategy>,
    dispatcher: Arc<Dispatcher>,
}

impl BosonClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn invoke<F>(&self, method: impl Into<String>, payload: Payload, callback: F) -> Result<u64>
    where
        F: FnOnce(Result<Payload>) + Send + 'static,
    {
        self.connection.invoke(method, payload, callback)
    }

    pub fn invoke_with<F>(
        &self,
        method: impl Into<String>,
        payload: Payload,
        options: CallOptions,
        callback: F,
    ) -> Result<u64>
    where
        F: FnOnce(Result<Payload>) + Send + 'static,
    {
        self.connection.invoke_with(method, payload, options, callback)
    }

    pub fn notify(&self, method: impl Into<String>, payload: Payload) -> Result<u64> {
        self.connection.notify(method, payload)
    }

    pub async fn call(&self, method: impl Into<String>, payload: Payload) -> Result<Payload> {
        self.connection.call(method, payload).await
    }

    pub async fn call_with(
        &self,
        method: impl Into<String>,
        payload: Payload,
        options: CallOptions,
    ) -> Result<Payload> {
        self.connection.call_with(method, payload, options).await
    }

    /// Register a handler for calls the server makes on this connection.
    pub fn register<F>(&self, method: &str, handler: F) -> Result<()>
    where
        F: Fn(&ConnectionContext, &Message) -> Result<Option<Payload>> + Send + Sync + 'static,
    {
        self.dispatcher.register(method, handler)
    }

    pub fn connection(&self) -> &ConnectionContext {
        &self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    pub fn close(&self) {
        if !self.connection.is_closed() {
            info!(connection_id = self.connection.id(), "Closing client");
        }
        self.connection.close();
        self.strategy.shutdown();
    }
}

impl Drop for BosonClient {
    fn drop(&mut self) {
        self.close();
    }
}
