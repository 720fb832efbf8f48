//! Command dispatcher
//!
//! Maps each client command tag to its handler. Handlers mutate one session
//! field or the room and emit responses; a client-state conflict becomes an
//! `InvalidRequest` to the sender and never escapes `dispatch`.

use tracing::{debug, error, info, warn};

use crate::context::RelayContext;
use crate::error::{CodecError, RelayError};
use crate::message::{ClientTag, MemberEntry, ServerCommand};
use crate::packet::Packet;
use crate::transport::Transport;
use crate::types::{ConnectionHandle, Delivery};

/// Command handler signature
///
/// `packet` is positioned on the first field after the tag.
pub type Handler = fn(
    &mut RelayContext,
    &mut dyn Transport,
    ConnectionHandle,
    &mut Packet,
) -> Result<(), RelayError>;

/// What happened to a dispatched command
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Handler ran and state changed
    Applied,
    /// Refused; an `InvalidRequest` was sent to the sender
    Rejected(RelayError),
    /// Command fields could not be decoded; dropped
    Malformed(CodecError),
    /// Internal invariant violation; dropped
    Failed(RelayError),
}

/// Fixed tag → handler mapping
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandDispatcher;

impl CommandDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Handler registered for `tag`
    pub fn handler_for(&self, tag: ClientTag) -> Handler {
        match tag {
            ClientTag::SetName => handle_set_name,
            ClientTag::JoinRoom => handle_join_room,
        }
    }

    /// Run the handler for `tag` and absorb its errors
    pub fn dispatch(
        &self,
        ctx: &mut RelayContext,
        transport: &mut dyn Transport,
        handle: ConnectionHandle,
        tag: ClientTag,
        packet: &mut Packet,
    ) -> DispatchOutcome {
        debug!("Received command {:?} from {}", tag, handle);
        let handler = self.handler_for(tag);
        match handler(ctx, transport, handle, packet) {
            Ok(()) => DispatchOutcome::Applied,
            Err(RelayError::Codec(e)) => {
                warn!("Malformed {:?} command from {}: {}", tag, handle, e);
                DispatchOutcome::Malformed(e)
            }
            Err(err) if err.is_client_conflict() => {
                warn!("Client {} sent invalid {:?}: {}", handle, tag, err);
                let response = ServerCommand::from(&err);
                send_command(transport, handle, &response);
                DispatchOutcome::Rejected(err)
            }
            Err(err) => {
                error!("Command {:?} from {} failed: {}", tag, handle, err);
                DispatchOutcome::Failed(err)
            }
        }
    }
}

/// `SetName`: store the session's display name, once
fn handle_set_name(
    ctx: &mut RelayContext,
    _transport: &mut dyn Transport,
    handle: ConnectionHandle,
    packet: &mut Packet,
) -> Result<(), RelayError> {
    let session = ctx.registry.lookup_mut(handle)?;
    if session.has_name() {
        return Err(RelayError::NameAlreadySet);
    }

    let name = packet.read_string()?;
    info!("Client {} set their name to '{}'", handle, name);
    session.set_name(name);
    Ok(())
}

/// `JoinRoom`: append the session to the room and broadcast the roster
fn handle_join_room(
    ctx: &mut RelayContext,
    transport: &mut dyn Transport,
    handle: ConnectionHandle,
    _packet: &mut Packet,
) -> Result<(), RelayError> {
    let id = ctx.registry.lookup(handle)?.id();
    ctx.room.join(id)?;

    info!("Client {} joined the room ({} members)", handle, ctx.room.len());
    broadcast_roster(ctx, transport);
    Ok(())
}

/// Encode and send one command, logging failures
pub fn send_command(transport: &mut dyn Transport, handle: ConnectionHandle, cmd: &ServerCommand) {
    let bytes = match cmd.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to encode {:?} for {}: {}", cmd.tag(), handle, e);
            return;
        }
    };
    debug!("Sending command {:?} to {}", cmd.tag(), handle);
    if let Err(e) = transport.send(handle, &bytes, Delivery::Reliable) {
        warn!("Failed to send {:?} to {}: {}", cmd.tag(), handle, e);
    }
}

/// Current roster, in join order
pub fn roster(ctx: &RelayContext) -> Vec<MemberEntry> {
    ctx.room
        .all_members()
        .iter()
        .filter_map(|id| match ctx.registry.get_by_id(*id) {
            Some(session) => Some(MemberEntry {
                id: id.to_string(),
                name: session.display_name().to_string(),
            }),
            None => {
                error!("Room member {} has no registered session", id);
                None
            }
        })
        .collect()
}

/// Send the current roster to every room member
pub fn broadcast_roster(ctx: &RelayContext, transport: &mut dyn Transport) {
    let members = roster(ctx);
    let cmd = ServerCommand::MemberList { members };
    for id in ctx.room.all_members() {
        if let Some(session) = ctx.registry.get_by_id(*id) {
            send_command(transport, session.handle(), &cmd);
        }
    }
}
