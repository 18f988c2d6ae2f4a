//! End-to-end calls between a client and a server over in-memory streams

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use boson_rpc::config::{ClientConfig, ServerConfig, PROTOCOL_VERSION};
use boson_rpc::error::constants::ERR_CONNECT_TIMEOUT;
use boson_rpc::error::TransportError;
use boson_rpc::prelude::*;
use boson_rpc::protocol::message::MessageKind;
use boson_rpc::transport::{connector_fn, Connector};
use boson_rpc::utils::timeout::with_timeout_error;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(WAIT, fut).await.expect("timed out")
}

fn echo_server() -> BosonServer {
    let server = ServerBuilder::new().build().unwrap();
    server
        .register("echo", |_ctx, msg| Ok(Some(msg.payload.clone())))
        .unwrap();
    server
}

/// Attach one end of a pipe to `server` and hand out the other end after `delay`.
fn memory_link(server: &BosonServer, delay: Duration) -> impl Connector<Stream = DuplexStream> {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    server.accept_stream(server_end, "mem").unwrap();

    let slot = Arc::new(Mutex::new(Some(client_end)));
    connector_fn(move || {
        let slot = Arc::clone(&slot);
        async move {
            tokio::time::sleep(delay).await;
            slot.lock()
                .unwrap()
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "stream already taken"))
        }
    })
}

fn connect(server: &BosonServer) -> BosonClient {
    ClientBuilder::new()
        .connect(memory_link(server, Duration::ZERO))
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_calls_issued_while_connecting_complete_in_order() {
    let server = echo_server();
    let client = ClientBuilder::new()
        .connect(memory_link(&server, Duration::from_millis(50)))
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    for n in [42i64, 43] {
        let tx = tx.clone();
        client
            .invoke("echo", Payload::from_values([Value::I64(n)]), move |r| {
                let value = r.unwrap().first().and_then(Value::as_i64).unwrap();
                tx.send(value).unwrap();
            })
            .unwrap();
    }
    assert!(!client.is_connected());
    assert_eq!(client.connection().outbound_len(), 2);

    let first = within(rx.recv()).await;
    let second = within(rx.recv()).await;
    assert_eq!((first, second), (Some(42), Some(43)));
    assert!(client.connection().pending().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_object_graph_survives_a_round_trip() {
    let server = echo_server();
    let client = connect(&server);

    let mut heap = Heap::new();
    let a = heap.insert_record("Node", Record::new().with("label", "a"));
    let b = heap.insert_record("Node", Record::new().with("label", "b").with("peer", a));
    heap.record_mut(a).unwrap().set("peer", b);

    let reply = with_timeout_error(
        client.call("echo", Payload::new(vec![Value::Object(a)], heap)),
        WAIT,
    )
    .await
    .unwrap();

    let root = reply.first().and_then(Value::as_object).unwrap();
    let peer = reply.heap.record(root).unwrap().get("peer").and_then(Value::as_object).unwrap();
    assert_eq!(
        reply.heap.record(peer).unwrap().get("peer"),
        Some(&Value::Object(root))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_method_is_a_remote_error() {
    let server = echo_server();
    let client = connect(&server);

    let err = with_timeout_error(client.call("missing", Payload::empty()), WAIT)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, BosonError::Call(CallError::Remote(reason)) if reason.contains("missing")),
        "unexpected error: {err}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handler_error_is_a_remote_error() {
    let server = echo_server();
    server
        .register("divide", |_ctx, msg| {
            let divisor = msg.payload.values.get(1).and_then(Value::as_i64).unwrap_or(0);
            if divisor == 0 {
                return Err(BosonError::Custom("division by zero".into()));
            }
            let dividend = msg.payload.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(Some(Payload::from_values([Value::I64(dividend / divisor)])))
        })
        .unwrap();
    let client = connect(&server);

    let ok = with_timeout_error(
        client.call("divide", Payload::from_values([Value::I64(9), Value::I64(3)])),
        WAIT,
    )
    .await
    .unwrap();
    assert_eq!(ok.first(), Some(&Value::I64(3)));

    let err = with_timeout_error(
        client.call("divide", Payload::from_values([Value::I64(1), Value::I64(0)])),
        WAIT,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BosonError::Call(CallError::Remote(r)) if r.contains("division by zero")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handler_without_reply_answers_empty() {
    let server = echo_server();
    server.register("touch", |_ctx, _msg| Ok(None)).unwrap();
    let client = connect(&server);

    let reply = with_timeout_error(client.call("touch", Payload::empty()), WAIT)
        .await
        .unwrap();
    assert!(reply.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_reply_times_out_exactly_once() {
    let server = echo_server();
    server
        .register("slow", |_ctx, msg| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(Some(msg.payload.clone()))
        })
        .unwrap();
    let client = connect(&server);

    let hits = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let counter = Arc::clone(&hits);
    client
        .invoke_with(
            "slow",
            Payload::empty(),
            CallOptions::with_timeout(Duration::from_millis(10)),
            move |r| {
                counter.fetch_add(1, Ordering::SeqCst);
                tx.send(r.is_err()).unwrap();
            },
        )
        .unwrap();

    let timed_out = within(rx.recv()).await;
    assert_eq!(timed_out, Some(true));

    // The late response is discarded.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(client.connection().pending().is_empty());
    assert!(client.is_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_configured_timeout_applies_to_every_call() {
    let server = echo_server();
    server
        .register("never", |_ctx, _msg| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(None)
        })
        .unwrap();
    let client = ClientBuilder::new()
        .config(ClientConfig {
            call_timeout: Some(Duration::from_millis(20)),
            ..ClientConfig::default()
        })
        .connect(memory_link(&server, Duration::ZERO))
        .unwrap();

    let err = with_timeout_error(client.call("never", Payload::empty()), WAIT)
        .await
        .unwrap_err();
    assert!(matches!(err, BosonError::Call(CallError::Timeout)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_fails_outstanding_calls() {
    let server = echo_server();
    server
        .register("hang", |_ctx, _msg| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(None)
        })
        .unwrap();
    let client = connect(&server);

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .invoke("hang", Payload::empty(), move |r| {
            tx.send(r).unwrap();
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.close();

    let outcome = within(rx.recv()).await.unwrap();
    assert!(matches!(
        outcome,
        Err(BosonError::Transport(TransportError::ConnectionClosed))
    ));
    assert!(matches!(
        client.invoke("echo", Payload::empty(), |_| {}),
        Err(BosonError::Transport(TransportError::ConnectionClosed))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_one_way_reaches_handler_without_reply() {
    let server = echo_server();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let tx = Mutex::new(tx);
    server
        .register("log", move |_ctx, msg| {
            let line = msg.payload.first().and_then(Value::as_str).unwrap_or("").to_string();
            tx.lock().unwrap().send(line).unwrap();
            Ok(Some(Payload::from_values([Value::from("ignored")])))
        })
        .unwrap();
    let client = connect(&server);

    client
        .notify("log", Payload::from_values([Value::from("started")]))
        .unwrap();
    assert!(client.connection().pending().is_empty());

    let line = within(rx.recv()).await;
    assert_eq!(line.as_deref(), Some("started"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_can_call_back_into_the_client() {
    let server = echo_server();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let tx = Mutex::new(tx);
    server
        .register("hello", move |ctx, _msg| {
            let tx = tx.lock().unwrap().clone();
            ctx.invoke("whoami", Payload::empty(), move |r| {
                let name = r
                    .ok()
                    .and_then(|p| p.first().and_then(Value::as_str).map(str::to_owned));
                let _ = tx.send(name);
            })?;
            Ok(None)
        })
        .unwrap();

    let client = connect(&server);
    client
        .register("whoami", |_ctx, _msg| {
            Ok(Some(Payload::from_values([Value::from("client-1")])))
        })
        .unwrap();

    with_timeout_error(client.call("hello", Payload::empty()), WAIT)
        .await
        .unwrap();
    let name = within(rx.recv()).await;
    assert_eq!(name, Some(Some("client-1".to_string())));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_connect_fails_buffered_calls() {
    let errors = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&errors);
    let client = ClientBuilder::new()
        .on_error(move |_ctx, _err| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .connect(connector_fn(|| async {
            Err::<DuplexStream, _>(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }))
        .unwrap();

    let err = with_timeout_error(client.call("echo", Payload::empty()), WAIT)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BosonError::Transport(TransportError::ConnectError(_)) | BosonError::Transport(TransportError::ConnectionClosed)
    ));
    assert!(client.is_closed());
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_timeout() {
    let client = ClientBuilder::new()
        .config(ClientConfig {
            connection_timeout: Duration::from_millis(100),
            ..ClientConfig::default()
        })
        .connect(connector_fn(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err::<DuplexStream, _>(io::Error::new(io::ErrorKind::TimedOut, "unreachable"))
        }))
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .invoke("echo", Payload::empty(), move |r| {
            tx.send(r).unwrap();
        })
        .unwrap();

    let outcome = within(rx.recv()).await.unwrap();
    assert!(matches!(
        outcome,
        Err(BosonError::Transport(TransportError::ConnectError(reason))) if reason == ERR_CONNECT_TIMEOUT
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_listeners_fire_on_connect_and_disconnect() {
    let server = echo_server();
    let connected = Arc::new(AtomicUsize::new(0));
    let disconnected = Arc::new(AtomicUsize::new(0));
    let (c, d) = (Arc::clone(&connected), Arc::clone(&disconnected));

    let client = ClientBuilder::new()
        .on_connected(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .on_disconnected(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        })
        .connect(memory_link(&server, Duration::ZERO))
        .unwrap();

    with_timeout_error(client.call("echo", Payload::empty()), WAIT)
        .await
        .unwrap();
    assert_eq!(connected.load(Ordering::SeqCst), 1);

    client.close();
    with_timeout_error(
        async {
            while disconnected.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(())
        },
        WAIT,
    )
    .await
    .unwrap();
    assert_eq!(connected.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_enforces_connection_limit() {
    let server = ServerBuilder::new()
        .config(ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        })
        .build()
        .unwrap();

    let (_a, server_a) = tokio::io::duplex(1024);
    let (_b, server_b) = tokio::io::duplex(1024);
    server.accept_stream(server_a, "a").unwrap();
    let err = server.accept_stream(server_b, "b").unwrap_err();
    assert!(matches!(
        err,
        BosonError::Transport(TransportError::ConnectError(_))
    ));
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_accepts_respect_connection_limit() {
    const LIMIT: usize = 4;
    const PEERS: usize = 16;
    let server = ServerBuilder::new()
        .config(ServerConfig {
            max_connections: LIMIT,
            ..ServerConfig::default()
        })
        .build()
        .unwrap();

    let barrier = Arc::new(std::sync::Barrier::new(PEERS));
    let threads: Vec<_> = (0..PEERS)
        .map(|i| {
            let server = server.clone();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let (client_end, server_end) = tokio::io::duplex(1024);
                barrier.wait();
                let accepted = server.accept_stream(server_end, format!("peer-{i}")).is_ok();
                (accepted, client_end)
            })
        })
        .collect();
    let results: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|(accepted, _)| *accepted).count(), LIMIT);
    assert_eq!(server.connection_count(), LIMIT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_call_timeout_applies_to_calls_back_to_clients() {
    let server = ServerBuilder::new()
        .config(ServerConfig {
            call_timeout: Some(Duration::from_millis(20)),
            ..ServerConfig::default()
        })
        .build()
        .unwrap();
    let client = connect(&server);
    client
        .register("stall", |_ctx, _msg| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Some(Payload::empty()))
        })
        .unwrap();

    let peer = server.connections().pop().unwrap();
    let err = with_timeout_error(peer.call("stall", Payload::empty()), WAIT)
        .await
        .unwrap_err();
    assert!(matches!(err, BosonError::Call(CallError::Timeout)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_inline_dispatch_round_trip() {
    let server = ServerBuilder::new()
        .dispatch(DispatchConfig {
            strategy: StrategyKind::Inline,
            workers: 1,
        })
        .build()
        .unwrap();
    server
        .register("double", |_ctx, msg| {
            let n = msg.payload.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(Some(Payload::from_values([Value::I64(n * 2)])))
        })
        .unwrap();
    let client = ClientBuilder::new()
        .dispatch(DispatchConfig {
            strategy: StrategyKind::Inline,
            workers: 1,
        })
        .connect(memory_link(&server, Duration::ZERO))
        .unwrap();

    for n in 0..20i64 {
        let reply = with_timeout_error(
            client.call("double", Payload::from_values([Value::I64(n)])),
            WAIT,
        )
        .await
        .unwrap();
        assert_eq!(reply.first(), Some(&Value::I64(n * 2)));
    }
}

mod deadline_race {
    use super::*;
    use boson_rpc::service::pending::{PendingCall, PendingCalls};
    use tokio::runtime::Handle;

    fn arm(calls: &Arc<PendingCalls>, outcomes: &Arc<Mutex<Vec<Result<Payload>>>>) {
        let sink = Arc::clone(outcomes);
        let deadline = Duration::from_millis(10);
        calls.insert(PendingCall::new(
            1,
            Some(deadline),
            Box::new(move |r| sink.lock().unwrap().push(r)),
        ));
        calls.arm_timeout(1, deadline, &Handle::current());
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_before_deadline_wins() {
        let calls = Arc::new(PendingCalls::new());
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        arm(&calls, &outcomes);

        tokio::time::sleep(Duration::from_millis(9)).await;
        assert!(calls.resolve(1, Ok(Payload::from_values([Value::I64(42)]))));

        tokio::time::sleep(Duration::from_millis(5)).await;
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].as_ref().unwrap().first(), Some(&Value::I64(42)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_after_deadline_is_discarded() {
        let calls = Arc::new(PendingCalls::new());
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        arm(&calls, &outcomes);

        tokio::time::sleep(Duration::from_millis(11)).await;
        assert!(!calls.resolve(1, Ok(Payload::from_values([Value::I64(42)]))));

        // The timeout outcome is delivered off the timer task.
        within(async {
            while outcomes.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0],
            Err(BosonError::Call(CallError::Timeout))
        ));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tcp_serve_and_graceful_shutdown() {
    use boson_rpc::transport::TcpConnector;
    use tokio::net::TcpListener;

    let server = ServerBuilder::new()
        .config(ServerConfig {
            shutdown_timeout: Duration::from_secs(1),
            ..ServerConfig::default()
        })
        .build()
        .unwrap();
    server
        .register("echo", |_ctx, msg| Ok(Some(msg.payload.clone())))
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let serving = server.clone();
    let handle = tokio::spawn(async move { serving.serve(listener, shutdown_rx).await });

    let client = ClientBuilder::new()
        .connect(TcpConnector::new(address))
        .unwrap();
    let reply = with_timeout_error(
        client.call("echo", Payload::from_values([Value::from("over tcp")])),
        WAIT,
    )
    .await
    .unwrap();
    assert_eq!(reply.first(), Some(&Value::from("over tcp")));
    assert_eq!(server.connection_count(), 1);

    // The client stays connected, so shutdown has to force-close it.
    shutdown_tx.send(()).await.unwrap();
    within(handle).await.unwrap().unwrap();

    within(async {
        while server.connection_count() > 0 || !client.is_closed() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(client.invoke("echo", Payload::empty(), |_| {}).is_err());
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unix_socket_round_trip() {
    use boson_rpc::transport::local::{start_server_with_shutdown, UnixConnector};

    let path = std::env::temp_dir().join(format!("boson-rpc-{}.sock", std::process::id()));
    let server = echo_server();
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let serving = server.clone();
    let socket = path.clone();
    let handle =
        tokio::spawn(async move { start_server_with_shutdown(socket, &serving, shutdown_rx).await });

    within(async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    let client = ClientBuilder::new()
        .connect(UnixConnector::new(&path))
        .unwrap();
    let reply = with_timeout_error(
        client.call("echo", Payload::from_values([Value::I32(7)])),
        WAIT,
    )
    .await
    .unwrap();
    assert_eq!(reply.first(), Some(&Value::I32(7)));

    client.close();
    shutdown_tx.send(()).await.unwrap();
    within(handle).await.unwrap().unwrap();
    assert!(!path.exists());
}

/// A client whose peer is driven by hand. Returns the peer end, the errors
/// reported to `on_error` and the outcome of one outstanding call.
async fn client_facing_raw_peer(
    codec: CodecConfig,
) -> (
    BosonClient,
    DuplexStream,
    Arc<Mutex<Vec<String>>>,
    mpsc::UnboundedReceiver<Result<Payload>>,
) {
    let (client_end, peer_end) = tokio::io::duplex(64 * 1024);
    let slot = Arc::new(Mutex::new(Some(client_end)));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&errors);

    let client = ClientBuilder::new()
        .codec(codec)
        .on_error(move |_ctx, err| seen.lock().unwrap().push(err.to_string()))
        .connect(connector_fn(move || {
            let stream = slot.lock().unwrap().take();
            async move {
                stream.ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "stream already taken"))
            }
        }))
        .unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    client
        .invoke("echo", Payload::from_values([Value::I32(1)]), move |r| {
            tx.send(r).unwrap();
        })
        .unwrap();
    within(async {
        while !client.is_connected() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;

    (client, peer_end, errors, rx)
}

async fn assert_closed_by_corrupt_input(
    client: &BosonClient,
    errors: &Mutex<Vec<String>>,
    mut outcomes: mpsc::UnboundedReceiver<Result<Payload>>,
    expected: &str,
) {
    let outcome = within(outcomes.recv()).await.unwrap();
    assert!(matches!(
        outcome,
        Err(BosonError::Transport(TransportError::ConnectionClosed))
    ));
    assert!(client.is_closed());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains(expected), "{errors:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_value_tag_closes_the_connection() {
    use tokio::io::AsyncWriteExt;

    let (client, mut peer, errors, outcomes) =
        client_facing_raw_peer(CodecConfig::default()).await;

    let mut payload = vec![PROTOCOL_VERSION, MessageKind::Request as u8];
    payload.extend_from_slice(&9u64.to_be_bytes());
    payload.extend_from_slice(&4u32.to_be_bytes());
    payload.extend_from_slice(b"echo");
    payload.extend_from_slice(&1u32.to_be_bytes());
    payload.push(0xEE);
    let mut frame = (payload.len() as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(&payload);
    peer.write_all(&frame).await.unwrap();

    assert_closed_by_corrupt_input(&client, &errors, outcomes, "0xEE").await;
    assert!(client.invoke("echo", Payload::empty(), |_| {}).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_frame_closes_the_connection() {
    use tokio::io::AsyncWriteExt;

    let codec = CodecConfig {
        max_frame_size: 1024,
        ..CodecConfig::default()
    };
    let (client, mut peer, errors, outcomes) = client_facing_raw_peer(codec).await;

    peer.write_all(&(1u32 << 20).to_be_bytes()).await.unwrap();

    assert_closed_by_corrupt_input(&client, &errors, outcomes, "1048576").await;
}
