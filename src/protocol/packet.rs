//! Packet Framework
//!
//! Tagged union over every protocol message kind. The framework owns the
//! common header (a single unsigned varint packet id); payload code never
//! reads or writes the id itself.

use thiserror::Error;

use super::game::{
    AvailableCommandsPacket, ChunkRadiusUpdatedPacket, LevelChunkPacket, StartGamePacket,
};
use super::login::LoginPacket;
use super::status::{DisconnectPacket, PlayStatusPacket, ResourcePacksInfoPacket};
use super::stream::{PacketStream, StreamError};
use super::text::TextPacket;

/// On-wire packet ids, fixed per kind.
pub mod ids {
    /// Login request.
    pub const LOGIN: u32 = 0x01;
    /// Play status notification.
    pub const PLAY_STATUS: u32 = 0x02;
    /// Disconnect notification.
    pub const DISCONNECT: u32 = 0x05;
    /// Resource pack advertisement.
    pub const RESOURCE_PACKS_INFO: u32 = 0x06;
    /// Text message.
    pub const TEXT: u32 = 0x09;
    /// World join bootstrap.
    pub const START_GAME: u32 = 0x0b;
    /// Chunk payload.
    pub const LEVEL_CHUNK: u32 = 0x3a;
    /// View distance confirmation.
    pub const CHUNK_RADIUS_UPDATED: u32 = 0x46;
    /// Command capability advertisement.
    pub const AVAILABLE_COMMANDS: u32 = 0x4c;
}

/// Errors raised while encoding or decoding a packet payload.
#[derive(Debug, Error)]
pub enum PacketError {
    /// The underlying cursor ran out of bytes or hit malformed primitives.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// A text packet carried an unknown type discriminant.
    #[error("unknown text message type {0}")]
    UnknownTextType(u8),

    /// A play status packet carried an unknown status code.
    #[error("unknown play status code {0}")]
    UnknownPlayStatus(u32),

    /// A game rule carried an unknown value tag.
    #[error("unknown game rule value tag {0}")]
    UnknownGameRuleTag(u8),

    /// The login payload's chain envelope or token claims were malformed.
    #[error("malformed login payload: {0}")]
    MalformedLogin(String),
}

/// Outcome of decoding inbound bytes.
///
/// Unknown ids are not an error: the session logs and drops them rather
/// than treating the connection as protocol-violating.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// A recognized, fully decoded packet.
    Packet(Packet),
    /// An id this endpoint does not know.
    Unknown {
        /// The unrecognized packet id.
        id: u32,
    },
}

/// A protocol message. Constructed by decoding inbound bytes or by
/// application code for outbound send, consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Login request with identity token chain.
    Login(LoginPacket),
    /// Login progress / failure status.
    PlayStatus(PlayStatusPacket),
    /// Disconnect notification.
    Disconnect(DisconnectPacket),
    /// Resource pack advertisement.
    ResourcePacksInfo(ResourcePacksInfoPacket),
    /// Chat / translation / popup text.
    Text(TextPacket),
    /// World join bootstrap.
    StartGame(StartGamePacket),
    /// Chunk payload.
    LevelChunk(LevelChunkPacket),
    /// View distance confirmation.
    ChunkRadiusUpdated(ChunkRadiusUpdatedPacket),
    /// Command capability advertisement.
    AvailableCommands(AvailableCommandsPacket),
}

impl Packet {
    /// The packet's fixed on-wire id.
    pub fn id(&self) -> u32 {
        match self {
            Packet::Login(_) => ids::LOGIN,
            Packet::PlayStatus(_) => ids::PLAY_STATUS,
            Packet::Disconnect(_) => ids::DISCONNECT,
            Packet::ResourcePacksInfo(_) => ids::RESOURCE_PACKS_INFO,
            Packet::Text(_) => ids::TEXT,
            Packet::StartGame(_) => ids::START_GAME,
            Packet::LevelChunk(_) => ids::LEVEL_CHUNK,
            Packet::ChunkRadiusUpdated(_) => ids::CHUNK_RADIUS_UPDATED,
            Packet::AvailableCommands(_) => ids::AVAILABLE_COMMANDS,
        }
    }

    /// Human-readable kind name, used in logs and contract-violation panics.
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Login(_) => "LoginPacket",
            Packet::PlayStatus(_) => "PlayStatusPacket",
            Packet::Disconnect(_) => "DisconnectPacket",
            Packet::ResourcePacksInfo(_) => "ResourcePacksInfoPacket",
            Packet::Text(_) => "TextPacket",
            Packet::StartGame(_) => "StartGamePacket",
            Packet::LevelChunk(_) => "LevelChunkPacket",
            Packet::ChunkRadiusUpdated(_) => "ChunkRadiusUpdatedPacket",
            Packet::AvailableCommands(_) => "AvailableCommandsPacket",
        }
    }

    /// Whether this packet may be sent to a client that has not logged in.
    ///
    /// Only the status / disconnect / resource-pack advertisement kinds are
    /// allowed before login; sending anything else is a caller bug.
    pub fn can_be_sent_before_login(&self) -> bool {
        matches!(
            self,
            Packet::PlayStatus(_) | Packet::Disconnect(_) | Packet::ResourcePacksInfo(_)
        )
    }

    /// Encode the id header followed by the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut stream = PacketStream::new();
        stream.write_unsigned_var_int(self.id());
        match self {
            Packet::Login(p) => p.encode_payload(&mut stream),
            Packet::PlayStatus(p) => p.encode_payload(&mut stream),
            Packet::Disconnect(p) => p.encode_payload(&mut stream),
            Packet::ResourcePacksInfo(p) => p.encode_payload(&mut stream),
            Packet::Text(p) => p.encode_payload(&mut stream),
            Packet::StartGame(p) => p.encode_payload(&mut stream),
            Packet::LevelChunk(p) => p.encode_payload(&mut stream),
            Packet::ChunkRadiusUpdated(p) => p.encode_payload(&mut stream),
            Packet::AvailableCommands(p) => p.encode_payload(&mut stream),
        }
        stream.into_bytes()
    }

    /// Decode the id header and dispatch to the payload decoder.
    pub fn decode(bytes: &[u8]) -> Result<DecodeOutcome, PacketError> {
        let mut stream = PacketStream::from_bytes(bytes.to_vec());
        let id = stream.read_unsigned_var_int()?;

        let packet = match id {
            ids::LOGIN => Packet::Login(LoginPacket::decode_payload(&mut stream)?),
            ids::PLAY_STATUS => Packet::PlayStatus(PlayStatusPacket::decode_payload(&mut stream)?),
            ids::DISCONNECT => Packet::Disconnect(DisconnectPacket::decode_payload(&mut stream)?),
            ids::RESOURCE_PACKS_INFO => {
                Packet::ResourcePacksInfo(ResourcePacksInfoPacket::decode_payload(&mut stream)?)
            }
            ids::TEXT => Packet::Text(TextPacket::decode_payload(&mut stream)?),
            ids::START_GAME => Packet::StartGame(StartGamePacket::decode_payload(&mut stream)?),
            ids::LEVEL_CHUNK => Packet::LevelChunk(LevelChunkPacket::decode_payload(&mut stream)?),
            ids::CHUNK_RADIUS_UPDATED => {
                Packet::ChunkRadiusUpdated(ChunkRadiusUpdatedPacket::decode_payload(&mut stream)?)
            }
            ids::AVAILABLE_COMMANDS => {
                Packet::AvailableCommands(AvailableCommandsPacket::decode_payload(&mut stream)?)
            }
            _ => return Ok(DecodeOutcome::Unknown { id }),
        };

        Ok(DecodeOutcome::Packet(packet))
    }
}

// =============================================================================
// TESTS
// =============================================================================
