use crate::error::constants::{ERR_DISPATCHER_READ_LOCK, ERR_DISPATCHER_WRITE_LOCK};
use crate::error::{BosonError, Result};
use crate::protocol::message::{Message, MessageKind, Payload};
use crate::protocol::queue::QueueEntry;
use crate::service::connection::ConnectionContext;
use crate::utils::metrics::global_metrics;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Application handler. `Some` is the reply to a request; it is ignored for one-way messages.
pub type HandlerFn =
    dyn Fn(&ConnectionContext, &Message) -> Result<Option<Payload>> + Send + Sync + 'static;

/// Consumer side of a queueing strategy.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, entry: QueueEntry);
}

/// Routes inbound messages by exact, case-sensitive method name.
///
/// Several handlers may share a method; all of them run, in registration order.
/// For a request the first `Some` reply is sent back. A request nobody answers
/// gets an empty response, and an unknown method or a handler error turns into
/// an `Error` reply so the caller is never left waiting.
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<String, Vec<Arc<HandlerFn>>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register<F>(&self, method: &str, handler: F) -> Result<()>
    where
        F: Fn(&ConnectionContext, &Message) -> Result<Option<Payload>> + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| BosonError::Custom(ERR_DISPATCHER_WRITE_LOCK.to_string()))?;

        handlers
            .entry(method.to_string())
            .or_default()
            .push(Arc::new(handler));
        Ok(())
    }

    pub fn has_handler(&self, method: &str) -> bool {
        self.handlers
            .read()
            .map(|h| h.contains_key(method))
            .unwrap_or(false)
    }

    /// Snapshot of the handlers for `method`, so none run under the lock.
    fn handlers_for(&self, method: &str) -> Result<Vec<Arc<HandlerFn>>> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| BosonError::Custom(ERR_DISPATCHER_READ_LOCK.to_string()))?;
        Ok(handlers.get(method).cloned().unwrap_or_default())
    }

    /// Run every handler for `message` and collect the first reply.
    pub fn invoke_handlers(
        &self,
        connection: &ConnectionContext,
        message: &Message,
    ) -> Result<Option<Payload>> {
        let handlers = self.handlers_for(&message.method)?;
        if handlers.is_empty() {
            return Err(BosonError::NoHandler(message.method.clone()));
        }

        let mut reply = None;
        for handler in handlers {
            let out = handler(connection, message)?;
            if reply.is_none() {
                reply = out;
            }
        }
        Ok(reply)
    }

    fn handle_request(&self, connection: &ConnectionContext, message: &Message) {
        let sent = match self.invoke_handlers(connection, message) {
            Ok(reply) => connection.respond(message, reply.unwrap_or_default()),
            Err(e) => {
                global_metrics().dispatch_error();
                warn!(
                    connection_id = connection.id(),
                    call_id = message.call_id,
                    method = %message.method,
                    error = %e,
                    "Request failed"
                );
                connection.respond_error(message, e.to_string())
            }
        };
        if let Err(e) = sent {
            debug!(connection_id = connection.id(), call_id = message.call_id, error = %e, "Reply not sent");
        }
    }
}

impl Dispatch for Dispatcher {
    fn dispatch(&self, entry: QueueEntry) {
        let QueueEntry {
            connection,
            message,
        } = entry;
        global_metrics().dispatched();

        match message.kind {
            MessageKind::Response | MessageKind::Error => connection.complete_call(message),
            MessageKind::Request => self.handle_request(&connection, &message),
            MessageKind::OneWay => {
                if let Err(e) = self.invoke_handlers(&connection, &message) {
                    global_metrics().dispatch_error();
                    warn!(
                        connection_id = connection.id(),
                        method = %message.method,
                        error = %e,
                        "One-way handler failed"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::core::encoding::ValueCodec;
    use crate::core::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_all_handlers_run_first_reply_wins() {
        let dispatcher = Dispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        dispatcher
            .register("sum", move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
            .unwrap();
        let c = calls.clone();
        dispatcher
            .register("sum", move |_, _| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Payload::from_values([Value::I64(1)])))
            })
            .unwrap();
        dispatcher
            .register("sum", |_, _| Ok(Some(Payload::from_values([Value::I64(2)]))))
            .unwrap();

        let ctx = ConnectionContext::detached(Arc::new(ValueCodec::default())).unwrap();
        let msg = Message::request(1, "sum", Payload::empty());
        let reply = dispatcher.invoke_handlers(&ctx, &msg).unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(reply.values, vec![Value::I64(1)]);
    }

    #[tokio::test]
    async fn test_method_match_is_case_sensitive() {
        let dispatcher = Dispatcher::new();
        dispatcher.register("Echo", |_, _| Ok(None)).unwrap();
        assert!(dispatcher.has_handler("Echo"));
        assert!(!dispatcher.has_handler("echo"));

        let ctx = ConnectionContext::detached(Arc::new(ValueCodec::default())).unwrap();
        let msg = Message::request(1, "echo", Payload::empty());
        assert!(matches!(
            dispatcher.invoke_handlers(&ctx, &msg),
            Err(BosonError::NoHandler(m)) if m == "echo"
        ));
    }
}
