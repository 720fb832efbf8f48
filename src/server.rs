//! RelayServer poll loop
//!
//! The server owns the transport, the registry and the room. Once per tick
//! it drains every pending transport event and handles them one after the
//! other, so no two packets are ever processed at the same time and the
//! relay state needs no locks. Packets from one connection are handled in
//! arrival order; across connections, in the order the transport reports.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::context::RelayContext;
use crate::dispatcher::{broadcast_roster, send_command, CommandDispatcher};
use crate::error::TransportError;
use crate::message::ServerCommand;
use crate::router::route_packet;
use crate::transport::{DisconnectReason, ListenConfig, Transport, TransportEvent};
use crate::types::{ConnectionHandle, Delivery};

/// Default delay between two polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(15);

/// The relay server
pub struct RelayServer<T: Transport> {
    transport: T,
    context: RelayContext,
    dispatcher: CommandDispatcher,
    poll_interval: Duration,
}

impl<T: Transport> RelayServer<T> {
    /// Create a server on top of `transport`
    pub fn new(transport: T, poll_interval: Duration) -> Self {
        Self {
            transport,
            context: RelayContext::new(),
            dispatcher: CommandDispatcher::new(),
            poll_interval,
        }
    }

    /// Start listening through the transport
    pub fn listen(&mut self, config: &ListenConfig) -> Result<SocketAddr, TransportError> {
        info!("Starting server...");
        self.transport.listen(config)
    }

    pub fn context(&self) -> &RelayContext {
        &self.context
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Number of connected sessions
    pub fn session_count(&self) -> usize {
        self.context.registry.len()
    }

    /// Drain and handle every pending transport event
    ///
    /// Returns the number of events handled.
    pub fn tick(&mut self) -> usize {
        let events = self.transport.poll();
        let count = events.len();
        for event in events {
            self.handle_event(event);
        }
        count
    }

    /// Poll until `shutdown` completes, then shut down in order
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Server started, waiting for connections...");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        self.shutdown();
    }

    /// Disconnect every session and release the listener
    pub fn shutdown(&mut self) {
        info!("Closing server...");
        self.transport.disconnect_all();
        self.context.registry.clear(&mut self.context.room);
        self.transport.shutdown();
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { handle } => {
                self.handle_connect(handle);
            }
            TransportEvent::Disconnected { handle, reason } => {
                self.handle_disconnect(handle, reason);
            }
            TransportEvent::PacketReceived {
                handle,
                payload,
                delivery,
            } => {
                self.handle_packet(handle, payload, delivery);
            }
            TransportEvent::Error { handle, error } => match handle {
                Some(handle) => warn!("Network error from {}: {}", handle, error),
                None => warn!("Network error: {}", error),
            },
        }
    }

    /// Register the session and tell the client who it is
    fn handle_connect(&mut self, handle: ConnectionHandle) {
        let id = match self.context.registry.on_connect(handle) {
            Ok(session) => session.id(),
            Err(e) => {
                error!("Connect rejected: {}", e);
                return;
            }
        };
        info!("Client {} connected as {}", handle, id);

        send_command(
            &mut self.transport,
            handle,
            &ServerCommand::AssignIdentity { id: id.to_string() },
        );
        info!("Number of clients online: {}", self.context.registry.len());
    }

    /// Leave the room if needed, then drop the session
    fn handle_disconnect(&mut self, handle: ConnectionHandle, reason: DisconnectReason) {
        match self
            .context
            .registry
            .on_disconnect(handle, &mut self.context.room)
        {
            Ok(departure) => {
                info!(
                    "Client {} ({}) disconnected: {}",
                    handle,
                    departure.session.id(),
                    reason
                );
                if departure.left_room {
                    info!(
                        "Client {} left the room ({} members)",
                        handle,
                        self.context.room.len()
                    );
                    broadcast_roster(&self.context, &mut self.transport);
                }
            }
            Err(e) => {
                error!("Disconnect ignored: {}", e);
            }
        }
        info!("Number of clients online: {}", self.context.registry.len());
    }

    /// Route one packet; the router logs every drop itself
    fn handle_packet(&mut self, handle: ConnectionHandle, payload: Vec<u8>, delivery: Delivery) {
        route_packet(
            &mut self.context,
            &self.dispatcher,
            &mut self.transport,
            handle,
            payload,
            delivery,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::message::{decode_server, ClientCommand, MemberEntry};
    use crate::transport::MemoryTransport;

    fn server() -> RelayServer<MemoryTransport> {
        RelayServer::new(MemoryTransport::new(), DEFAULT_POLL_INTERVAL)
    }

    fn decoded(
        server: &RelayServer<MemoryTransport>,
        handle: ConnectionHandle,
    ) -> Vec<ServerCommand> {
        server
            .transport()
            .sent_to(handle)
            .iter()
            .map(|b| decode_server(b).unwrap())
            .collect()
    }

    #[test]
    fn test_connect_assigns_identity_first() {
        let mut server = server();
        let a = server.transport_mut().connect();
        // Client traffic queued in the same tick as the connect
        let join = ClientCommand::JoinRoom.encode().unwrap();
        server.transport_mut().receive(a, join, Delivery::Reliable);
        server.tick();

        let id = server.context().registry.lookup(a).unwrap().id();
        let sent = decoded(&server, a);
        assert_eq!(
            sent[0],
            ServerCommand::AssignIdentity { id: id.to_string() }
        );
        assert!(matches!(sent[1], ServerCommand::MemberList { .. }));
    }

    #[test]
    fn test_disconnect_rebroadcasts_roster() {
        let mut server = server();
        let a = server.transport_mut().connect();
        let b = server.transport_mut().connect();
        for h in [a, b] {
            let join = ClientCommand::JoinRoom.encode().unwrap();
            server.transport_mut().receive(h, join, Delivery::Reliable);
        }
        server.tick();
        let id_b = server.context().registry.lookup(b).unwrap().id();

        server
            .transport_mut()
            .disconnect(a, DisconnectReason::ClosedWithMessage("bye".to_string()));
        server.tick();

        assert_eq!(server.session_count(), 1);
        assert_eq!(server.context().room.all_members(), &[id_b]);
        assert_eq!(
            decoded(&server, b).last().unwrap(),
            &ServerCommand::MemberList {
                members: vec![MemberEntry {
                    id: id_b.to_string(),
                    name: String::new()
                }]
            }
        );
    }

    #[test]
    fn test_disconnect_unknown_handle_is_harmless() {
        let mut server = server();
        server.transport_mut().inject(TransportEvent::Disconnected {
            handle: ConnectionHandle(77),
            reason: DisconnectReason::ClosedByPeer,
        });
        assert_eq!(server.tick(), 1);
        assert_eq!(server.session_count(), 0);
    }

    #[test]
    fn test_transport_error_does_not_stop_loop() {
        let mut server = server();
        let a = server.transport_mut().connect();
        server.transport_mut().fail(Some(a), TransportError::QueueFull(a));
        server.transport_mut().fail(None, TransportError::Closed);
        assert_eq!(server.tick(), 3);
        assert_eq!(server.session_count(), 1);
    }

    #[test]
    fn test_shutdown_clears_state() {
        let mut server = server();
        let a = server.transport_mut().connect();
        let join = ClientCommand::JoinRoom.encode().unwrap();
        server.transport_mut().receive(a, join, Delivery::Reliable);
        server.tick();

        server.shutdown();
        assert_eq!(server.session_count(), 0);
        assert!(server.context().room.is_empty());
        assert!(!server.transport().is_open(a));
        assert!(!server.transport().is_listening());
    }

    /// Shared buffer the test subscriber writes formatted records into
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[test]
    fn test_non_member_relay_logs_one_record() {
        let mut server = server();
        let a = server.transport_mut().connect();
        let b = server.transport_mut().connect();
        let join = ClientCommand::JoinRoom.encode().unwrap();
        server.transport_mut().receive(a, join, Delivery::Reliable);
        server.tick();
        server.transport_mut().take_sent();

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            server
                .transport_mut()
                .receive(b, vec![0x10, 0x20], Delivery::Reliable);
            assert_eq!(server.tick(), 1);
        });

        let lines = logs.lines();
        assert_eq!(lines.len(), 1, "expected one record, got {:?}", lines);
        assert!(lines[0].contains("WARN"));
        assert!(lines[0].contains("not a member of the room"));
        assert!(server.transport().sent().is_empty());
    }

    #[tokio::test]
    async fn test_run_until_stops_on_signal() {
        let mut server = server();
        let a = server.transport_mut().connect();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        stop_tx.send(()).unwrap();

        server
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await;

        assert_eq!(server.session_count(), 0);
        assert!(!server.transport().is_open(a));
    }
}
