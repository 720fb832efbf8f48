//! Relay router
//!
//! Decides, for each inbound packet, whether it is a command for the server
//! or an opaque payload to rebroadcast. A packet is a command iff its first
//! two bytes read as the command marker; applications must never start a
//! payload with that value. Relayed packets are forwarded byte for byte with
//! the delivery class they arrived with.

use tracing::{error, trace, warn};

use crate::context::RelayContext;
use crate::dispatcher::{CommandDispatcher, DispatchOutcome};
use crate::message::ClientTag;
use crate::packet::{Packet, COMMAND_MARKER};
use crate::transport::Transport;
use crate::types::{ConnectionHandle, Delivery};

/// Why a packet was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No session for the handle (registry/transport out of sync)
    UnknownConnection,
    /// Too short to hold a marker, or a marker without a tag
    Truncated,
    /// Marker present but the tag is not a client command
    UnknownCommand(i16),
    /// Command packet sent over an unreliable channel
    CommandOverUnreliable,
    /// Relay payload from a session outside the room
    NotAMember,
}

/// What the router did with a packet
#[derive(Debug)]
pub enum RouteOutcome {
    Dispatched {
        tag: ClientTag,
        outcome: DispatchOutcome,
    },
    Relayed {
        recipients: usize,
    },
    Dropped(DropReason),
}

/// Route one inbound packet
pub fn route_packet(
    ctx: &mut RelayContext,
    dispatcher: &CommandDispatcher,
    transport: &mut dyn Transport,
    handle: ConnectionHandle,
    payload: Vec<u8>,
    delivery: Delivery,
) -> RouteOutcome {
    let session_id = match ctx.registry.lookup(handle) {
        Ok(session) => session.id(),
        Err(e) => {
            error!("Packet dropped: {}", e);
            return RouteOutcome::Dropped(DropReason::UnknownConnection);
        }
    };

    let mut packet = Packet::from_bytes(payload);
    let lead = match packet.peek_i16() {
        Ok(value) => value,
        Err(_) => {
            warn!(
                "Invalid packet received from {} ({} bytes)",
                handle,
                packet.len()
            );
            return RouteOutcome::Dropped(DropReason::Truncated);
        }
    };

    if lead == COMMAND_MARKER {
        if delivery != Delivery::Reliable {
            warn!("Client {} sent a command packet over {} delivery", handle, delivery);
            return RouteOutcome::Dropped(DropReason::CommandOverUnreliable);
        }

        let raw_tag = match packet.read_i16().and_then(|_| packet.read_i16()) {
            Ok(tag) => tag,
            Err(_) => {
                warn!("Command packet without a tag from {}", handle);
                return RouteOutcome::Dropped(DropReason::Truncated);
            }
        };
        let Ok(tag) = ClientTag::try_from(raw_tag) else {
            warn!("Invalid command {} received from {}", raw_tag, handle);
            return RouteOutcome::Dropped(DropReason::UnknownCommand(raw_tag));
        };

        let outcome = dispatcher.dispatch(ctx, transport, handle, tag, &mut packet);
        return RouteOutcome::Dispatched { tag, outcome };
    }

    if !ctx.room.contains(session_id) {
        warn!("Client {} is not a member of the room, relay dropped", handle);
        return RouteOutcome::Dropped(DropReason::NotAMember);
    }

    let recipients: Vec<ConnectionHandle> = ctx
        .room
        .members_except(session_id)
        .filter_map(|id| ctx.registry.get_by_id(id).map(|s| s.handle()))
        .collect();

    trace!(
        "Relaying {} bytes from {} to {} members",
        packet.len(),
        handle,
        recipients.len()
    );
    for recipient in &recipients {
        if let Err(e) = transport.send(*recipient, packet.as_bytes(), delivery) {
            warn!("Relay to {} failed: {}", recipient, e);
        }
    }

    RouteOutcome::Relayed {
        recipients: recipients.len(),
    }
}
