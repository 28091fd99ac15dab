//! Text Packet
//!
//! One packet, nine on-wire layouts selected by a type byte. The chat /
//! whisper / announcement subset carries a source name before sharing the
//! message field with the raw / tip / system subset; the translation / popup
//! subset follows the message with a count-prefixed parameter list. Every
//! layout terminates with the xuid and platform chat id strings.

use super::packet::PacketError;
use super::stream::PacketStream;

/// Text message type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TextMessageType {
    /// Plain message, no source.
    Raw = 0,
    /// Player chat with a source name.
    Chat = 1,
    /// Client-side translation key with parameters.
    Translation = 2,
    /// Popup with parameters.
    Popup = 3,
    /// Jukebox popup with parameters.
    JukeboxPopup = 4,
    /// Tip overlay.
    Tip = 5,
    /// System message.
    System = 6,
    /// Private message with a source name.
    Whisper = 7,
    /// Server-wide announcement with a source name.
    Announcement = 8,
}

impl TextMessageType {
    fn from_byte(value: u8) -> Result<Self, PacketError> {
        Ok(match value {
            0 => TextMessageType::Raw,
            1 => TextMessageType::Chat,
            2 => TextMessageType::Translation,
            3 => TextMessageType::Popup,
            4 => TextMessageType::JukeboxPopup,
            5 => TextMessageType::Tip,
            6 => TextMessageType::System,
            7 => TextMessageType::Whisper,
            8 => TextMessageType::Announcement,
            other => return Err(PacketError::UnknownTextType(other)),
        })
    }

    /// Whether this layout carries a source name before the message.
    pub fn has_source_name(self) -> bool {
        matches!(
            self,
            TextMessageType::Chat | TextMessageType::Whisper | TextMessageType::Announcement
        )
    }

    /// Whether this layout carries a parameter list after the message.
    pub fn has_parameters(self) -> bool {
        matches!(
            self,
            TextMessageType::Translation | TextMessageType::Popup | TextMessageType::JukeboxPopup
        )
    }
}

/// A text message in any of its nine layouts.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPacket {
    /// Layout discriminant.
    pub message_type: TextMessageType,
    /// Whether the client should run translation on the message.
    pub needs_translation: bool,
    /// Sender name (chat / whisper / announcement layouts only).
    pub source_name: String,
    /// The message or translation key.
    pub message: String,
    /// Translation / popup parameters (translation subset only).
    pub parameters: Vec<String>,
    /// Sender xuid, present in every layout.
    pub xuid: String,
    /// Sender platform chat id, present in every layout.
    pub platform_chat_id: String,
}

impl TextPacket {
    /// Build a raw text message, the layout used for server broadcasts.
    pub fn raw(message: impl Into<String>) -> Self {
        Self {
            message_type: TextMessageType::Raw,
            needs_translation: false,
            source_name: String::new(),
            message: message.into(),
            parameters: Vec::new(),
            xuid: String::new(),
            platform_chat_id: String::new(),
        }
    }

    /// Decode the payload following the id header.
    pub fn decode_payload(stream: &mut PacketStream) -> Result<Self, PacketError> {
        let message_type = TextMessageType::from_byte(stream.read_byte()?)?;
        let needs_translation = stream.read_bool()?;

        let mut source_name = String::new();
        let mut parameters = Vec::new();

        // The source-name layouts fall through into the shared message read;
        // the parameter layouts read the message then their list.
        if message_type.has_source_name() {
            source_name = stream.read_string()?;
        }
        let message = stream.read_string()?;
        if message_type.has_parameters() {
            let count = stream.read_unsigned_var_int()?;
            for _ in 0..count {
                parameters.push(stream.read_string()?);
            }
        }

        let xuid = stream.read_string()?;
        let platform_chat_id = stream.read_string()?;

        Ok(Self {
            message_type,
            needs_translation,
            source_name,
            message,
            parameters,
            xuid,
            platform_chat_id,
        })
    }

    /// Encode the payload following the id header.
    pub fn encode_payload(&self, stream: &mut PacketStream) {
        stream.write_byte(self.message_type as u8);
        stream.write_bool(self.needs_translation);

        if self.message_type.has_source_name() {
            stream.write_string(&self.source_name);
        }
        stream.write_string(&self.message);
        if self.message_type.has_parameters() {
            stream.write_unsigned_var_int(self.parameters.len() as u32);
            for parameter in &self.parameters {
                stream.write_string(parameter);
            }
        }

        stream.write_string(&self.xuid);
        stream.write_string(&self.platform_chat_id);
    }
}

// =============================================================================
// TESTS
// =============================================================================
