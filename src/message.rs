//! Command protocol definitions
//!
//! Command packets share the channel with opaque relay payloads. They are
//! told apart by a leading `i16` marker of `-1`, followed by an `i16` tag
//! and the tag's fields:
//!
//! | Tag | Direction | Fields |
//! |---|---|---|
//! | `AssignIdentity` (0) | server → client | identity string |
//! | `MemberList` (1) | server → client | `i32` count, then count × (identity, name) |
//! | `InvalidRequest` (2) | server → client | message string |
//! | `SetName` (0) | client → server | name string |
//! | `JoinRoom` (1) | client → server | none |
//!
//! Both directions can be encoded and decoded so that test clients and
//! embedders can speak the protocol with the same code as the server.

use thiserror::Error;

use crate::error::{CodecError, RelayError};
use crate::packet::{Packet, COMMAND_MARKER};

/// Client → Server command tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientTag {
    /// Set display name (once)
    SetName,
    /// Join the room
    JoinRoom,
}

impl ClientTag {
    pub fn to_i16(self) -> i16 {
        match self {
            ClientTag::SetName => 0,
            ClientTag::JoinRoom => 1,
        }
    }
}

impl TryFrom<i16> for ClientTag {
    type Error = i16;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ClientTag::SetName),
            1 => Ok(ClientTag::JoinRoom),
            other => Err(other),
        }
    }
}

/// Server → Client command tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerTag {
    /// Session identity issued on connect
    AssignIdentity,
    /// Current room roster
    MemberList,
    /// A request was refused
    InvalidRequest,
}

impl ServerTag {
    pub fn to_i16(self) -> i16 {
        match self {
            ServerTag::AssignIdentity => 0,
            ServerTag::MemberList => 1,
            ServerTag::InvalidRequest => 2,
        }
    }
}

impl TryFrom<i16> for ServerTag {
    type Error = i16;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ServerTag::AssignIdentity),
            1 => Ok(ServerTag::MemberList),
            2 => Ok(ServerTag::InvalidRequest),
            other => Err(other),
        }
    }
}

/// Client → Server command with its decoded fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    SetName { name: String },
    JoinRoom,
}

impl ClientCommand {
    pub fn tag(&self) -> ClientTag {
        match self {
            ClientCommand::SetName { .. } => ClientTag::SetName,
            ClientCommand::JoinRoom => ClientTag::JoinRoom,
        }
    }

    /// Encode as a full command packet (marker, tag, fields)
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut packet = command_packet(self.tag().to_i16());
        match self {
            ClientCommand::SetName { name } => packet.write_string(name)?,
            ClientCommand::JoinRoom => {}
        }
        Ok(packet.into_bytes())
    }

    /// Decode the fields of `tag` from a packet positioned after the tag
    pub fn decode_body(tag: ClientTag, packet: &mut Packet) -> Result<Self, CodecError> {
        match tag {
            ClientTag::SetName => Ok(ClientCommand::SetName {
                name: packet.read_string()?,
            }),
            ClientTag::JoinRoom => Ok(ClientCommand::JoinRoom),
        }
    }
}

/// One roster entry of a `MemberList`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    /// Session identity, string form
    pub id: String,
    /// Display name, empty if never set
    pub name: String,
}

/// Server → Client command with its fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    AssignIdentity { id: String },
    MemberList { members: Vec<MemberEntry> },
    InvalidRequest { message: String },
}

impl ServerCommand {
    pub fn tag(&self) -> ServerTag {
        match self {
            ServerCommand::AssignIdentity { .. } => ServerTag::AssignIdentity,
            ServerCommand::MemberList { .. } => ServerTag::MemberList,
            ServerCommand::InvalidRequest { .. } => ServerTag::InvalidRequest,
        }
    }

    /// Encode as a full command packet (marker, tag, fields)
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut packet = command_packet(self.tag().to_i16());
        match self {
            ServerCommand::AssignIdentity { id } => packet.write_string(id)?,
            ServerCommand::MemberList { members } => {
                let count = i32::try_from(members.len())
                    .map_err(|_| CodecError::TooLarge(members.len()))?;
                packet.write_i32(count);
                for member in members {
                    packet.write_string(&member.id)?;
                    packet.write_string(&member.name)?;
                }
            }
            ServerCommand::InvalidRequest { message } => packet.write_string(message)?,
        }
        Ok(packet.into_bytes())
    }

    /// Decode the fields of `tag` from a packet positioned after the tag
    pub fn decode_body(tag: ServerTag, packet: &mut Packet) -> Result<Self, CodecError> {
        match tag {
            ServerTag::AssignIdentity => Ok(ServerCommand::AssignIdentity {
                id: packet.read_string()?,
            }),
            ServerTag::MemberList => {
                let count = packet.read_count()?;
                // Each entry is at least two empty strings (8 bytes); cap the
                // preallocation by what the buffer could possibly hold.
                let mut members = Vec::with_capacity(count.min(packet.remaining() / 8));
                for _ in 0..count {
                    let id = packet.read_string()?;
                    let name = packet.read_string()?;
                    members.push(MemberEntry { id, name });
                }
                Ok(ServerCommand::MemberList { members })
            }
            ServerTag::InvalidRequest => Ok(ServerCommand::InvalidRequest {
                message: packet.read_string()?,
            }),
        }
    }
}

/// Errors from decoding a whole command packet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Leading value is not the command marker (a relay packet)
    #[error("not a command packet")]
    NotACommand,

    /// Tag value is not defined for this direction
    #[error("unknown command tag {0}")]
    UnknownTag(i16),

    /// Fields could not be read
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Read marker and tag, leaving the cursor on the first field
fn read_header(packet: &mut Packet) -> Result<i16, DecodeError> {
    if packet.read_i16()? != COMMAND_MARKER {
        return Err(DecodeError::NotACommand);
    }
    Ok(packet.read_i16()?)
}

/// Decode a complete client → server command packet
pub fn decode_client(bytes: &[u8]) -> Result<ClientCommand, DecodeError> {
    let mut packet = Packet::from_bytes(bytes.to_vec());
    let raw = read_header(&mut packet)?;
    let tag = ClientTag::try_from(raw).map_err(DecodeError::UnknownTag)?;
    Ok(ClientCommand::decode_body(tag, &mut packet)?)
}

/// Decode a complete server → client command packet
pub fn decode_server(bytes: &[u8]) -> Result<ServerCommand, DecodeError> {
    let mut packet = Packet::from_bytes(bytes.to_vec());
    let raw = read_header(&mut packet)?;
    let tag = ServerTag::try_from(raw).map_err(DecodeError::UnknownTag)?;
    Ok(ServerCommand::decode_body(tag, &mut packet)?)
}

fn command_packet(tag: i16) -> Packet {
    let mut packet = Packet::new();
    packet.write_i16(COMMAND_MARKER);
    packet.write_i16(tag);
    packet
}

/// Convert a client-state conflict into the response sent to the client
impl From<&RelayError> for ServerCommand {
    fn from(err: &RelayError) -> Self {
        let message = match err {
            RelayError::NameAlreadySet | RelayError::AlreadyMember => err.to_string(),
            RelayError::Codec(e) => format!("Malformed command: {}", e),
            // Invariant violations are not normally reported to clients
            _ => "Internal error".to_string(),
        };
        ServerCommand::InvalidRequest { message }
    }
}
