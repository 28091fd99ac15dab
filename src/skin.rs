//! Player Skins
//!
//! Structured skin record built from the base64-encoded claims a client
//! sends at login. Replaces the untyped claim dictionary with named, typed
//! fields validated at construction.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Accepted skin bitmap sizes in bytes (RGBA 64x32, 64x64, 128x64, 128x128).
const VALID_SKIN_SIZES: [usize; 4] = [8192, 16384, 32768, 65536];

/// Cape bitmap size in bytes (RGBA 64x32).
const CAPE_SIZE: usize = 8192;

/// Errors building a skin from login claims.
#[derive(Debug, Error)]
pub enum SkinError {
    /// A bitmap or geometry field was not valid base64.
    #[error("malformed base64 in skin field {0}")]
    MalformedField(&'static str),
}

/// A player's skin as declared at login.
///
/// The id and geometry name travel as plain strings; the bitmap and geometry
/// payloads arrive base64-encoded and are decoded at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Skin {
    /// Skin identifier string.
    pub skin_id: String,
    /// Raw RGBA skin bitmap.
    pub skin_data: Vec<u8>,
    /// Raw RGBA cape bitmap, possibly empty.
    pub cape_data: Vec<u8>,
    /// Geometry model name.
    pub geometry_name: String,
    /// Raw geometry JSON payload.
    pub geometry_data: Vec<u8>,
}

impl Skin {
    /// Build a skin from the base64-encoded login claim fields.
    ///
    /// Absent claims decode as empty; a present claim that is not valid
    /// base64 is an error (the login is rejected as "Invalid Skin").
    pub fn from_claims(
        skin_id: &str,
        skin_data_b64: &str,
        cape_data_b64: &str,
        geometry_name: &str,
        geometry_b64: &str,
    ) -> Result<Self, SkinError> {
        let skin_data = STANDARD
            .decode(skin_data_b64)
            .map_err(|_| SkinError::MalformedField("SkinData"))?;
        let cape_data = STANDARD
            .decode(cape_data_b64)
            .map_err(|_| SkinError::MalformedField("CapeData"))?;
        let geometry_data = STANDARD
            .decode(geometry_b64)
            .map_err(|_| SkinError::MalformedField("SkinGeometry"))?;

        Ok(Self {
            skin_id: skin_id.to_string(),
            skin_data,
            cape_data,
            geometry_name: geometry_name.to_string(),
            geometry_data,
        })
    }

    /// Check skin well-formedness: a non-empty id, a skin bitmap of a known
    /// size, and a cape that is either absent or exactly cape-sized.
    pub fn is_valid(&self) -> bool {
        !self.skin_id.is_empty()
            && VALID_SKIN_SIZES.contains(&self.skin_data.len())
            && (self.cape_data.is_empty() || self.cape_data.len() == CAPE_SIZE)
    }
}

// =============================================================================
// TESTS
// =============================================================================
