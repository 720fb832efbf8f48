//! In-process transport
//!
//! Deterministic transport with no sockets: the embedder scripts inbound
//! events and inspects every packet the relay sent. Used for the protocol
//! tests and for running the relay core inside another process.

use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::net::SocketAddr;

use crate::error::TransportError;
use crate::transport::{DisconnectReason, ListenConfig, Transport, TransportEvent};
use crate::types::{ConnectionHandle, Delivery};

/// A packet the relay handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub handle: ConnectionHandle,
    pub payload: Vec<u8>,
    pub delivery: Delivery,
}

/// Scripted transport
#[derive(Debug, Default)]
pub struct MemoryTransport {
    pending: VecDeque<TransportEvent>,
    open: BTreeSet<ConnectionHandle>,
    sent: Vec<SentPacket>,
    next_handle: u64,
    listening: Option<ListenConfig>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new client connection
    pub fn connect(&mut self) -> ConnectionHandle {
        self.next_handle += 1;
        let handle = ConnectionHandle(self.next_handle);
        self.open.insert(handle);
        self.pending.push_back(TransportEvent::Connected { handle });
        handle
    }

    /// Close a client connection from the client side
    pub fn disconnect(&mut self, handle: ConnectionHandle, reason: DisconnectReason) {
        if self.open.remove(&handle) {
            self.pending
                .push_back(TransportEvent::Disconnected { handle, reason });
        }
    }

    /// Deliver a packet from a client
    pub fn receive(&mut self, handle: ConnectionHandle, payload: Vec<u8>, delivery: Delivery) {
        self.pending.push_back(TransportEvent::PacketReceived {
            handle,
            payload,
            delivery,
        });
    }

    /// Queue an arbitrary event (including ones a real transport would never produce)
    pub fn inject(&mut self, event: TransportEvent) {
        self.pending.push_back(event);
    }

    /// Report a transport error
    pub fn fail(&mut self, handle: Option<ConnectionHandle>, error: TransportError) {
        self.pending.push_back(TransportEvent::Error { handle, error });
    }

    /// Everything sent so far, in send order
    pub fn sent(&self) -> &[SentPacket] {
        &self.sent
    }

    /// Take and clear the sent log
    pub fn take_sent(&mut self) -> Vec<SentPacket> {
        std::mem::take(&mut self.sent)
    }

    /// Take and clear the payloads sent to one connection
    pub fn take_sent_to(&mut self, handle: ConnectionHandle) -> Vec<Vec<u8>> {
        let (mine, rest): (Vec<SentPacket>, Vec<SentPacket>) = std::mem::take(&mut self.sent)
            .into_iter()
            .partition(|p| p.handle == handle);
        self.sent = rest;
        mine.into_iter().map(|p| p.payload).collect()
    }

    /// Payloads sent to one connection, in send order
    pub fn sent_to(&self, handle: ConnectionHandle) -> Vec<Vec<u8>> {
        self.sent
            .iter()
            .filter(|p| p.handle == handle)
            .map(|p| p.payload.clone())
            .collect()
    }

    pub fn is_open(&self, handle: ConnectionHandle) -> bool {
        self.open.contains(&handle)
    }

    pub fn is_listening(&self) -> bool {
        self.listening.is_some()
    }
}

impl Transport for MemoryTransport {
    fn listen(&mut self, config: &ListenConfig) -> Result<SocketAddr, TransportError> {
        let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.listening = Some(config.clone());
        Ok(addr)
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        self.pending.drain(..).collect()
    }

    fn send(
        &mut self,
        handle: ConnectionHandle,
        payload: &[u8],
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        if !self.open.contains(&handle) {
            return Err(TransportError::UnknownConnection(handle));
        }
        self.sent.push(SentPacket {
            handle,
            payload: payload.to_vec(),
            delivery,
        });
        Ok(())
    }

    fn disconnect_all(&mut self) {
        let handles: Vec<ConnectionHandle> = std::mem::take(&mut self.open).into_iter().collect();
        for handle in handles {
            self.pending.push_back(TransportEvent::Disconnected {
                handle,
                reason: DisconnectReason::Shutdown,
            });
        }
    }

    fn shutdown(&mut self) {
        self.listening = None;
    }
}
