//! Protocol Layer
//!
//! Binary packet codec: the position-tracked byte stream, the packet
//! framework with its id header, and the payload codecs for every message
//! kind this endpoint speaks.

pub mod game;
pub mod login;
pub mod packet;
pub mod status;
pub mod stream;
pub mod text;

pub use game::{
    AvailableCommandsPacket, ChunkRadiusUpdatedPacket, CommandData, CommandParameter, GameRule,
    GameRuleValue, LevelChunkPacket, StartGamePacket,
};
pub use login::{ChainEnvelope, ClientDataClaims, LoginPacket};
pub use packet::{ids, DecodeOutcome, Packet, PacketError};
pub use status::{
    DisconnectPacket, PlayStatus, PlayStatusPacket, ResourcePackEntry, ResourcePacksInfoPacket,
};
pub use stream::{PacketStream, StreamError};
pub use text::{TextMessageType, TextPacket};
