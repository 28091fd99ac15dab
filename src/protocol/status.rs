//! Status Packets
//!
//! The small family of packets allowed before login: play status, disconnect
//! notification, and the resource pack advertisement.

use super::packet::PacketError;
use super::stream::PacketStream;

/// Login progress / failure codes carried by [`PlayStatusPacket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PlayStatus {
    /// Login accepted.
    LoginSuccess = 0,
    /// Client protocol older than the server's.
    LoginFailedClient = 1,
    /// Client protocol newer than the server's.
    LoginFailedServer = 2,
    /// Client may spawn into the world.
    PlayerSpawn = 3,
    /// Server is at capacity.
    LoginFailedServerFull = 7,
}

impl PlayStatus {
    fn from_u32(value: u32) -> Result<Self, PacketError> {
        Ok(match value {
            0 => PlayStatus::LoginSuccess,
            1 => PlayStatus::LoginFailedClient,
            2 => PlayStatus::LoginFailedServer,
            3 => PlayStatus::PlayerSpawn,
            7 => PlayStatus::LoginFailedServerFull,
            other => return Err(PacketError::UnknownPlayStatus(other)),
        })
    }
}

/// Tells the client where it stands in the login sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayStatusPacket {
    /// The status code.
    pub status: PlayStatus,
}

impl PlayStatusPacket {
    /// Decode the payload following the id header.
    pub fn decode_payload(stream: &mut PacketStream) -> Result<Self, PacketError> {
        let status = PlayStatus::from_u32(stream.read_u32()?)?;
        Ok(Self { status })
    }

    /// Encode the payload following the id header.
    pub fn encode_payload(&self, stream: &mut PacketStream) {
        stream.write_u32(self.status as u32);
    }
}

/// Tells the client why it is being disconnected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisconnectPacket {
    /// Suppress the client-side disconnect screen (silent close).
    pub hide_disconnect_screen: bool,
    /// Human-readable reason, omitted on the wire when the screen is hidden.
    pub message: String,
}

impl DisconnectPacket {
    /// Decode the payload following the id header.
    pub fn decode_payload(stream: &mut PacketStream) -> Result<Self, PacketError> {
        let hide_disconnect_screen = stream.read_bool()?;
        let message = if hide_disconnect_screen {
            String::new()
        } else {
            stream.read_string()?
        };
        Ok(Self {
            hide_disconnect_screen,
            message,
        })
    }

    /// Encode the payload following the id header.
    pub fn encode_payload(&self, stream: &mut PacketStream) {
        stream.write_bool(self.hide_disconnect_screen);
        if !self.hide_disconnect_screen {
            stream.write_string(&self.message);
        }
    }
}

/// One advertised resource or behavior pack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourcePackEntry {
    /// Pack identifier.
    pub uuid: String,
    /// Pack version string.
    pub version: String,
    /// Pack size in bytes.
    pub size: u64,
}

impl ResourcePackEntry {
    fn decode(stream: &mut PacketStream) -> Result<Self, PacketError> {
        Ok(Self {
            uuid: stream.read_string()?,
            version: stream.read_string()?,
            size: stream.read_u64()?,
        })
    }

    fn encode(&self, stream: &mut PacketStream) {
        stream.write_string(&self.uuid);
        stream.write_string(&self.version);
        stream.write_u64(self.size);
    }
}

/// Advertises the packs a client must (or may) download before joining.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourcePacksInfoPacket {
    /// Whether the client must accept the packs to join.
    pub must_accept: bool,
    /// Behavior pack entries.
    pub behavior_packs: Vec<ResourcePackEntry>,
    /// Resource pack entries.
    pub resource_packs: Vec<ResourcePackEntry>,
}

impl ResourcePacksInfoPacket {
    /// Decode the payload following the id header.
    pub fn decode_payload(stream: &mut PacketStream) -> Result<Self, PacketError> {
        let must_accept = stream.read_bool()?;

        let mut behavior_packs = Vec::new();
        for _ in 0..stream.read_unsigned_var_int()? {
            behavior_packs.push(ResourcePackEntry::decode(stream)?);
        }

        let mut resource_packs = Vec::new();
        for _ in 0..stream.read_unsigned_var_int()? {
            resource_packs.push(ResourcePackEntry::decode(stream)?);
        }

        Ok(Self {
            must_accept,
            behavior_packs,
            resource_packs,
        })
    }

    /// Encode the payload following the id header.
    pub fn encode_payload(&self, stream: &mut PacketStream) {
        stream.write_bool(self.must_accept);

        stream.write_unsigned_var_int(self.behavior_packs.len() as u32);
        for pack in &self.behavior_packs {
            pack.encode(stream);
        }

        stream.write_unsigned_var_int(self.resource_packs.len() as u32);
        for pack in &self.resource_packs {
            pack.encode(stream);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
