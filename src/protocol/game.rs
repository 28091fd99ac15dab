//! Gameplay Packets
//!
//! Packets the session sends once a login has been accepted: the world join
//! bootstrap, chunk payloads, view distance confirmation, and the command
//! capability advertisement.

use super::packet::PacketError;
use super::stream::PacketStream;

/// A game rule value, tagged on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum GameRuleValue {
    /// Boolean rule (tag 0).
    Bool(bool),
    /// Integer rule (tag 1).
    Int(u32),
}

/// A named game rule sent with the world join bootstrap.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRule {
    /// Rule name, e.g. `pvp`.
    pub name: String,
    /// Rule value.
    pub value: GameRuleValue,
}

impl GameRule {
    /// Convenience constructor for a boolean rule.
    pub fn bool(name: impl Into<String>, value: bool) -> Self {
        Self {
            name: name.into(),
            value: GameRuleValue::Bool(value),
        }
    }

    /// Convenience constructor for an integer rule.
    pub fn int(name: impl Into<String>, value: u32) -> Self {
        Self {
            name: name.into(),
            value: GameRuleValue::Int(value),
        }
    }

    fn decode(stream: &mut PacketStream) -> Result<Self, PacketError> {
        let name = stream.read_string()?;
        let value = match stream.read_byte()? {
            0 => GameRuleValue::Bool(stream.read_bool()?),
            1 => GameRuleValue::Int(stream.read_unsigned_var_int()?),
            other => return Err(PacketError::UnknownGameRuleTag(other)),
        };
        Ok(Self { name, value })
    }

    fn encode(&self, stream: &mut PacketStream) {
        stream.write_string(&self.name);
        match &self.value {
            GameRuleValue::Bool(b) => {
                stream.write_byte(0);
                stream.write_bool(*b);
            }
            GameRuleValue::Int(i) => {
                stream.write_byte(1);
                stream.write_unsigned_var_int(*i);
            }
        }
    }
}

/// Bootstraps the client into the world after login.
#[derive(Debug, Clone, PartialEq)]
pub struct StartGamePacket {
    /// The joining player's gamemode.
    pub player_gamemode: u32,
    /// Player spawn position (block coordinates).
    pub player_position: [i32; 3],
    /// World seed.
    pub seed: u32,
    /// Terrain generator id.
    pub generator: u32,
    /// Level default gamemode.
    pub level_gamemode: u32,
    /// World spawn position (block coordinates).
    pub spawn_position: [i32; 3],
    /// Whether this is a multiplayer game.
    pub is_multiplayer: bool,
    /// Whether LAN broadcast is enabled.
    pub has_lan_broadcast: bool,
    /// Whether commands are enabled for this client.
    pub commands_enabled: bool,
    /// World display name.
    pub level_name: String,
    /// Server tick at join time.
    pub current_tick: u64,
    /// Enchantment RNG seed.
    pub enchantment_seed: u32,
    /// Active game rules.
    pub game_rules: Vec<GameRule>,
}

impl Default for StartGamePacket {
    fn default() -> Self {
        Self {
            player_gamemode: 0,
            player_position: [0, 20, 0],
            seed: 0,
            generator: 2,
            level_gamemode: 0,
            spawn_position: [0, 5, 0],
            is_multiplayer: true,
            has_lan_broadcast: true,
            commands_enabled: true,
            level_name: String::new(),
            current_tick: 0,
            enchantment_seed: 0,
            game_rules: Vec::new(),
        }
    }
}

impl StartGamePacket {
    fn read_position(stream: &mut PacketStream) -> Result<[i32; 3], PacketError> {
        Ok([
            stream.read_u32()? as i32,
            stream.read_u32()? as i32,
            stream.read_u32()? as i32,
        ])
    }

    fn write_position(stream: &mut PacketStream, position: &[i32; 3]) {
        for axis in position {
            stream.write_u32(*axis as u32);
        }
    }

    /// Decode the payload following the id header.
    pub fn decode_payload(stream: &mut PacketStream) -> Result<Self, PacketError> {
        let player_gamemode = stream.read_unsigned_var_int()?;
        let player_position = Self::read_position(stream)?;
        let seed = stream.read_u32()?;
        let generator = stream.read_unsigned_var_int()?;
        let level_gamemode = stream.read_unsigned_var_int()?;
        let spawn_position = Self::read_position(stream)?;
        let is_multiplayer = stream.read_bool()?;
        let has_lan_broadcast = stream.read_bool()?;
        let commands_enabled = stream.read_bool()?;
        let level_name = stream.read_string()?;
        let current_tick = stream.read_u64()?;
        let enchantment_seed = stream.read_u32()?;

        let mut game_rules = Vec::new();
        for _ in 0..stream.read_unsigned_var_int()? {
            game_rules.push(GameRule::decode(stream)?);
        }

        Ok(Self {
            player_gamemode,
            player_position,
            seed,
            generator,
            level_gamemode,
            spawn_position,
            is_multiplayer,
            has_lan_broadcast,
            commands_enabled,
            level_name,
            current_tick,
            enchantment_seed,
            game_rules,
        })
    }

    /// Encode the payload following the id header.
    pub fn encode_payload(&self, stream: &mut PacketStream) {
        stream.write_unsigned_var_int(self.player_gamemode);
        Self::write_position(stream, &self.player_position);
        stream.write_u32(self.seed);
        stream.write_unsigned_var_int(self.generator);
        stream.write_unsigned_var_int(self.level_gamemode);
        Self::write_position(stream, &self.spawn_position);
        stream.write_bool(self.is_multiplayer);
        stream.write_bool(self.has_lan_broadcast);
        stream.write_bool(self.commands_enabled);
        stream.write_string(&self.level_name);
        stream.write_u64(self.current_tick);
        stream.write_u32(self.enchantment_seed);
        stream.write_unsigned_var_int(self.game_rules.len() as u32);
        for rule in &self.game_rules {
            rule.encode(stream);
        }
    }
}

/// The rule set handed to clients when the server has no world-specific
/// overrides.
pub fn default_game_rules() -> Vec<GameRule> {
    vec![
        GameRule::bool("commandBlockOutput", true),
        GameRule::bool("doDaylightCycle", true),
        GameRule::bool("doEntityDrops", true),
        GameRule::bool("doFireTick", true),
        GameRule::bool("doMobLoot", true),
        GameRule::bool("doMobSpawning", true),
        GameRule::bool("doTileDrops", true),
        GameRule::bool("doWeatherCycle", true),
        GameRule::bool("drowningDamage", true),
        GameRule::bool("fallDamage", true),
        GameRule::bool("fireDamage", true),
        GameRule::bool("keepInventory", false),
        GameRule::bool("mobGriefing", true),
        GameRule::bool("naturalRegeneration", true),
        GameRule::bool("pvp", true),
        GameRule::bool("sendCommandFeedback", true),
        GameRule::bool("showCoordinates", true),
        GameRule::int("randomTickSpeed", 3),
        GameRule::bool("tntExplodes", true),
    ]
}

/// A serialized chunk column, opaque to this endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelChunkPacket {
    /// Chunk X coordinate.
    pub chunk_x: u32,
    /// Chunk Z coordinate.
    pub chunk_z: u32,
    /// Serialized chunk payload, produced by the world layer.
    pub data: Vec<u8>,
}

impl LevelChunkPacket {
    /// Decode the payload following the id header.
    pub fn decode_payload(stream: &mut PacketStream) -> Result<Self, PacketError> {
        Ok(Self {
            chunk_x: stream.read_unsigned_var_int()?,
            chunk_z: stream.read_unsigned_var_int()?,
            data: stream.read_bytes()?,
        })
    }

    /// Encode the payload following the id header.
    pub fn encode_payload(&self, stream: &mut PacketStream) {
        stream.write_unsigned_var_int(self.chunk_x);
        stream.write_unsigned_var_int(self.chunk_z);
        stream.write_bytes(&self.data);
    }
}

/// Confirms a negotiated view distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkRadiusUpdatedPacket {
    /// View distance in chunks.
    pub radius: u32,
}

impl ChunkRadiusUpdatedPacket {
    /// Decode the payload following the id header.
    pub fn decode_payload(stream: &mut PacketStream) -> Result<Self, PacketError> {
        Ok(Self {
            radius: stream.read_unsigned_var_int()?,
        })
    }

    /// Encode the payload following the id header.
    pub fn encode_payload(&self, stream: &mut PacketStream) {
        stream.write_unsigned_var_int(self.radius);
    }
}

/// One parameter of an advertised command overload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandParameter {
    /// Parameter name shown to the client.
    pub name: String,
    /// Parameter type flags.
    pub kind: u32,
    /// Whether the parameter may be omitted.
    pub optional: bool,
}

impl CommandParameter {
    fn decode(stream: &mut PacketStream) -> Result<Self, PacketError> {
        Ok(Self {
            name: stream.read_string()?,
            kind: stream.read_u32()?,
            optional: stream.read_bool()?,
        })
    }

    fn encode(&self, stream: &mut PacketStream) {
        stream.write_string(&self.name);
        stream.write_u32(self.kind);
        stream.write_bool(self.optional);
    }
}

/// One advertised command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandData {
    /// Command name.
    pub name: String,
    /// Command description.
    pub description: String,
    /// Command flags.
    pub flags: u8,
    /// Required permission level.
    pub permission: u8,
    /// Alias names.
    pub aliases: Vec<String>,
    /// Parameters of the single advertised overload.
    pub parameters: Vec<CommandParameter>,
}

impl CommandData {
    fn decode(stream: &mut PacketStream) -> Result<Self, PacketError> {
        let name = stream.read_string()?;
        let description = stream.read_string()?;
        let flags = stream.read_byte()?;
        let permission = stream.read_byte()?;

        let mut aliases = Vec::new();
        for _ in 0..stream.read_unsigned_var_int()? {
            aliases.push(stream.read_string()?);
        }

        let mut parameters = Vec::new();
        for _ in 0..stream.read_unsigned_var_int()? {
            parameters.push(CommandParameter::decode(stream)?);
        }

        Ok(Self {
            name,
            description,
            flags,
            permission,
            aliases,
            parameters,
        })
    }

    fn encode(&self, stream: &mut PacketStream) {
        stream.write_string(&self.name);
        stream.write_string(&self.description);
        stream.write_byte(self.flags);
        stream.write_byte(self.permission);

        stream.write_unsigned_var_int(self.aliases.len() as u32);
        for alias in &self.aliases {
            stream.write_string(alias);
        }

        stream.write_unsigned_var_int(self.parameters.len() as u32);
        for parameter in &self.parameters {
            parameter.encode(stream);
        }
    }
}

/// Advertises the server's command set to a joined client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvailableCommandsPacket {
    /// Advertised commands.
    pub commands: Vec<CommandData>,
}

impl AvailableCommandsPacket {
    /// Decode the payload following the id header.
    pub fn decode_payload(stream: &mut PacketStream) -> Result<Self, PacketError> {
        let mut commands = Vec::new();
        for _ in 0..stream.read_unsigned_var_int()? {
            commands.push(CommandData::decode(stream)?);
        }
        Ok(Self { commands })
    }

    /// Encode the payload following the id header.
    pub fn encode_payload(&self, stream: &mut PacketStream) {
        stream.write_unsigned_var_int(self.commands.len() as u32);
        for command in &self.commands {
            command.encode(stream);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
