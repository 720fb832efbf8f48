//! WebSocket transport
//!
//! Every packet is one binary WebSocket message, so the transport owns all
//! length framing. Each connection runs a read task and a write task (the
//! split-socket pattern); neither touches relay state. Everything they see
//! is funneled through a single channel that `poll` drains on the relay's
//! own thread.
//!
//! If a connection key is configured, clients must present it during the
//! handshake, either as `?key=<value>` in the request URI or in an
//! `x-connection-key` header. The query value is compared verbatim, without
//! percent-decoding.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::transport::{DisconnectReason, ListenConfig, Transport, TransportEvent};
use crate::types::{ConnectionHandle, Delivery};

/// Channel buffer size for connection → relay events
const EVENT_BUFFER_SIZE: usize = 1024;

/// Per-connection outbound queue length
const OUTBOUND_BUFFER_SIZE: usize = 256;

/// Header carrying the connection key
const KEY_HEADER: &str = "x-connection-key";

/// Events sent from connection tasks to the transport
enum ConnEvent {
    Opened {
        handle: ConnectionHandle,
        outbound: mpsc::Sender<Message>,
    },
    Packet {
        handle: ConnectionHandle,
        payload: Vec<u8>,
    },
    Closed {
        handle: ConnectionHandle,
        reason: DisconnectReason,
    },
    Failed {
        handle: Option<ConnectionHandle>,
        error: TransportError,
    },
}

/// WebSocket transport built on tokio-tungstenite
pub struct WebSocketTransport {
    events_tx: mpsc::Sender<ConnEvent>,
    events_rx: mpsc::Receiver<ConnEvent>,
    /// Outbound queues of the connections reported as connected
    connections: HashMap<ConnectionHandle, mpsc::Sender<Message>>,
    acceptor: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        Self {
            events_tx,
            events_rx,
            connections: HashMap::new(),
            acceptor: None,
        }
    }

    /// Number of connections currently open
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
    }
}

impl Transport for WebSocketTransport {
    /// Bind and start the accept loop
    ///
    /// Must be called from within a tokio runtime.
    fn listen(&mut self, config: &ListenConfig) -> Result<SocketAddr, TransportError> {
        if self.acceptor.is_some() {
            return Err(TransportError::AlreadyListening);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let std_listener =
            std::net::TcpListener::bind((config.bind_address.as_str(), config.port))?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;

        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(std_listener)?
        };

        let key: Option<Arc<str>> = config.connection_key.as_deref().map(Arc::from);
        self.acceptor = Some(runtime.spawn(accept_loop(listener, key, self.events_tx.clone())));

        info!("WebSocket transport listening on {}", local_addr);
        Ok(local_addr)
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                ConnEvent::Opened { handle, outbound } => {
                    self.connections.insert(handle, outbound);
                    events.push(TransportEvent::Connected { handle });
                }
                ConnEvent::Packet { handle, payload } => {
                    events.push(TransportEvent::PacketReceived {
                        handle,
                        payload,
                        delivery: Delivery::Reliable,
                    });
                }
                ConnEvent::Closed { handle, reason } => {
                    self.connections.remove(&handle);
                    events.push(TransportEvent::Disconnected { handle, reason });
                }
                ConnEvent::Failed { handle, error } => {
                    events.push(TransportEvent::Error { handle, error });
                }
            }
        }
        events
    }

    /// Queue a binary message
    ///
    /// WebSocket delivery is always reliable and ordered, so the requested
    /// classification does not change how the packet travels.
    fn send(
        &mut self,
        handle: ConnectionHandle,
        payload: &[u8],
        _delivery: Delivery,
    ) -> Result<(), TransportError> {
        let outbound = self
            .connections
            .get(&handle)
            .ok_or(TransportError::UnknownConnection(handle))?;
        outbound
            .try_send(Message::Binary(payload.to_vec()))
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::QueueFull(handle),
                TrySendError::Closed(_) => TransportError::UnknownConnection(handle),
            })
    }

    /// Drop every outbound queue; each write task then sends a close frame
    fn disconnect_all(&mut self) {
        debug!("Disconnecting {} connections", self.connections.len());
        self.connections.clear();
    }

    fn shutdown(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
            info!("WebSocket transport stopped listening");
        }
    }
}

/// Accept TCP connections and spawn a task per connection
async fn accept_loop(
    listener: TcpListener,
    key: Option<Arc<str>>,
    events: mpsc::Sender<ConnEvent>,
) {
    let mut next_handle = 0u64;
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                next_handle += 1;
                let handle = ConnectionHandle(next_handle);
                info!("Connection request from {} ({})", peer, handle);

                let key = key.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    let result = handle_connection(stream, peer, handle, key, events.clone()).await;
                    if let Err(e) = result {
                        warn!("Connection {} from {} failed: {}", handle, peer, e);
                        let _ = events
                            .send(ConnEvent::Failed {
                                handle: Some(handle),
                                error: e,
                            })
                            .await;
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                if events
                    .send(ConnEvent::Failed {
                        handle: None,
                        error: e.into(),
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }
}

/// Key presented by the client, from header or query string
fn presented_key(req: &Request) -> Option<String> {
    if let Some(value) = req.headers().get(KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }
    req.uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("key="))
        .map(str::to_string)
}

/// Handle one connection from handshake to close
///
/// Errors before the handshake completes are returned; once the
/// connection is open every ending is reported as `ConnEvent::Closed`.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handle: ConnectionHandle,
    key: Option<Arc<str>>,
    events: mpsc::Sender<ConnEvent>,
) -> Result<(), TransportError> {
    let rejected = AtomicBool::new(false);
    let check_key = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let Some(expected) = key.as_deref() else {
            return Ok(resp);
        };
        if presented_key(req).as_deref() == Some(expected) {
            return Ok(resp);
        }
        rejected.store(true, Ordering::Relaxed);
        let mut err = ErrorResponse::new(Some("invalid connection key".to_string()));
        *err.status_mut() = StatusCode::UNAUTHORIZED;
        Err(err)
    };

    let handshake = tokio_tungstenite::accept_hdr_async(stream, check_key).await;
    let ws_stream = match handshake {
        Ok(ws) => ws,
        Err(_) if rejected.load(Ordering::Relaxed) => {
            return Err(TransportError::KeyRejected(peer))
        }
        Err(e) => return Err(e.into()),
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Create channel for relay -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER_SIZE);

    if events
        .send(ConnEvent::Opened {
            handle,
            outbound: msg_tx,
        })
        .await
        .is_err()
    {
        return Err(TransportError::Closed);
    }
    debug!("Connection {} open from {}", handle, peer);

    // Spawn read task (WebSocket -> events)
    let events_read = events.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Binary(payload)) => {
                    if events_read
                        .send(ConnEvent::Packet { handle, payload })
                        .await
                        .is_err()
                    {
                        return DisconnectReason::Shutdown;
                    }
                }
                Ok(Message::Text(_)) => {
                    warn!("Text message from {} ignored, packets must be binary", handle);
                }
                Ok(Message::Close(frame)) => {
                    return match frame {
                        Some(frame) if !frame.reason.is_empty() => {
                            DisconnectReason::ClosedWithMessage(frame.reason.to_string())
                        }
                        _ => DisconnectReason::ClosedByPeer,
                    };
                }
                Ok(_) => {
                    // Ping/Pong are answered by tungstenite
                }
                Err(e) => {
                    return DisconnectReason::TransportFailure(e.to_string());
                }
            }
        }
        DisconnectReason::ClosedByPeer
    });

    // Spawn write task (outbound queue -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            if let Err(e) = ws_sender.send(msg).await {
                return DisconnectReason::TransportFailure(e.to_string());
            }
        }
        // Queue dropped by the transport: server-side close
        let _ = ws_sender.close().await;
        DisconnectReason::Shutdown
    });

    // Wait for either task to complete
    let result = tokio::select! {
        result = &mut read_task => result,
        result = &mut write_task => result,
    };
    read_task.abort();
    write_task.abort();
    let reason = result.unwrap_or_else(|e| DisconnectReason::TransportFailure(e.to_string()));

    debug!("Connection {} closed: {}", handle, reason);
    let _ = events.send(ConnEvent::Closed { handle, reason }).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    use super::*;

    fn local_config(key: Option<&str>) -> ListenConfig {
        ListenConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            connection_key: key.map(str::to_string),
        }
    }

    /// Poll until `pred` matches an event, returning everything seen
    async fn poll_until<F>(transport: &mut WebSocketTransport, pred: F) -> Vec<TransportEvent>
    where
        F: Fn(&TransportEvent) -> bool,
    {
        let mut seen = Vec::new();
        for _ in 0..300 {
            let batch = transport.poll();
            let done = batch.iter().any(&pred);
            seen.extend(batch);
            if done {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for transport event, saw {:?}", seen);
    }

    #[tokio::test]
    async fn test_binary_roundtrip() {
        let mut transport = WebSocketTransport::new();
        let addr = transport.listen(&local_config(None)).unwrap();

        let (mut client, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();

        let events = poll_until(&mut transport, |e| {
            matches!(e, TransportEvent::Connected { .. })
        })
        .await;
        let handle = match events.last() {
            Some(TransportEvent::Connected { handle }) => *handle,
            other => panic!("expected Connected, got {:?}", other),
        };

        client
            .send(Message::Binary(vec![0xAD, 0xDE]))
            .await
            .unwrap();
        let events = poll_until(&mut transport, |e| {
            matches!(e, TransportEvent::PacketReceived { .. })
        })
        .await;
        assert!(events.iter().any(|e| matches!(
            e,
            TransportEvent::PacketReceived { payload, delivery: Delivery::Reliable, .. }
                if payload == &vec![0xAD, 0xDE]
        )));

        transport.send(handle, &[1, 2, 3], Delivery::Reliable).unwrap();
        let reply = client.next().await.unwrap().unwrap();
        assert_eq!(reply, Message::Binary(vec![1, 2, 3]));

        transport.shutdown();
    }

    #[tokio::test]
    async fn test_close_reason_reported() {
        let mut transport = WebSocketTransport::new();
        let addr = transport.listen(&local_config(None)).unwrap();

        let (mut client, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
        poll_until(&mut transport, |e| matches!(e, TransportEvent::Connected { .. })).await;

        client.close(None).await.unwrap();
        let events = poll_until(&mut transport, |e| {
            matches!(e, TransportEvent::Disconnected { .. })
        })
        .await;
        assert!(events.iter().any(|e| matches!(
            e,
            TransportEvent::Disconnected {
                reason: DisconnectReason::ClosedByPeer,
                ..
            }
        )));
        assert_eq!(transport.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_key_query_and_header() {
        let mut transport = WebSocketTransport::new();
        let addr = transport.listen(&local_config(Some("secret"))).unwrap();

        let ok = connect_async(format!("ws://{}/?key=secret", addr)).await;
        assert!(ok.is_ok());

        let mut request = format!("ws://{}/", addr).into_client_request().unwrap();
        request
            .headers_mut()
            .insert(KEY_HEADER, "secret".parse().unwrap());
        assert!(connect_async(request).await.is_ok());

        let wrong = connect_async(format!("ws://{}/?key=wrong", addr)).await;
        assert!(wrong.is_err());
        let missing = connect_async(format!("ws://{}/", addr)).await;
        assert!(missing.is_err());

        let mut seen = Vec::new();
        let (mut connected, mut rejected) = (0, 0);
        for _ in 0..300 {
            seen.extend(transport.poll());
            connected = seen
                .iter()
                .filter(|e| matches!(e, TransportEvent::Connected { .. }))
                .count();
            rejected = seen
                .iter()
                .filter(|e| {
                    matches!(
                        e,
                        TransportEvent::Error {
                            handle: Some(_),
                            error: TransportError::KeyRejected(_),
                        }
                    )
                })
                .count();
            if connected >= 2 && rejected >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(connected, 2, "events: {:?}", seen);
        assert_eq!(rejected, 2, "events: {:?}", seen);
    }

    #[tokio::test]
    async fn test_send_unknown_handle() {
        let mut transport = WebSocketTransport::new();
        assert!(matches!(
            transport.send(ConnectionHandle(42), &[1], Delivery::Reliable),
            Err(TransportError::UnknownConnection(ConnectionHandle(42)))
        ));
    }

    #[tokio::test]
    async fn test_listen_twice() {
        let mut transport = WebSocketTransport::new();
        transport.listen(&local_config(None)).unwrap();
        assert!(matches!(
            transport.listen(&local_config(None)),
            Err(TransportError::AlreadyListening)
        ));
    }

    #[test]
    fn test_listen_without_runtime() {
        let mut transport = WebSocketTransport::new();
        assert!(matches!(
            transport.listen(&local_config(None)),
            Err(TransportError::NoRuntime)
        ));
    }
}
