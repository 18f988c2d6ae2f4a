//! # Transport Layer
//!
//! The core only needs a bidirectional byte stream. A [`Connector`] produces
//! one for a client, an [`Acceptor`] produces them for a server; anything that
//! is `AsyncRead + AsyncWrite` can be plugged in.
//!
//! ## Components
//! - **TCP**: `TcpConnector` and `Acceptor for TcpListener`
//! - **Local**: Unix domain sockets (Unix only)
//! - **FnConnector**: wraps an async closure, handy for in-memory streams

use std::future::Future;
use std::io;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

pub mod local;

/// Client-side stream factory.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn connect(&self) -> BoxFuture<'static, io::Result<Self::Stream>>;
}

/// Server-side source of accepted streams, paired with a peer description.
pub trait Acceptor: Send {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn accept(&mut self) -> BoxFuture<'_, io::Result<(Self::Stream, String)>>;
}

/// TCP connector with `TCP_NODELAY` set.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self) -> BoxFuture<'static, io::Result<TcpStream>> {
        let address = self.address.clone();
        Box::pin(async move {
            let stream = TcpStream::connect(&address).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    fn accept(&mut self) -> BoxFuture<'_, io::Result<(TcpStream, String)>> {
        Box::pin(async move {
            let (stream, addr) = TcpListener::accept(self).await?;
            stream.set_nodelay(true)?;
            Ok((stream, addr.to_string()))
        })
    }
}

/// Connector backed by an async closure.
pub struct FnConnector<F> {
    connect: F,
}

/// Build a connector from `f`, called once per connection attempt.
pub fn connector_fn<F, Fut, S>(f: F) -> FnConnector<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = io::Result<S>> + Send + 'static,
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    FnConnector { connect: f }
}

impl<F, Fut, S> Connector for FnConnector<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = io::Result<S>> + Send + 'static,
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Stream = S;

    fn connect(&self) -> BoxFuture<'static, io::Result<S>> {
        Box::pin((self.connect)())
    }
}
