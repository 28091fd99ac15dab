//! Login Packet
//!
//! The login request carries the protocol version, a JSON envelope holding
//! the ordered identity token chain, and a standalone client-data token.
//! Decoding extracts the identity claims (display name, identity UUID, xuid)
//! and the client-data claims (skin fields, client random id) from the token
//! payloads without verifying signatures; signature verification happens in
//! the authenticator, off the connection task.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::packet::PacketError;
use super::stream::PacketStream;

/// The JSON envelope wrapping the ordered token chain.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChainEnvelope {
    /// Identity tokens, root first.
    pub chain: Vec<String>,
}

/// The identity claims embedded in the final chain token.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExtraData {
    /// The player's display name.
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    /// The player's identity UUID.
    #[serde(default)]
    pub identity: String,
    /// The player's xuid.
    #[serde(rename = "XUID", default)]
    pub xuid: String,
}

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    #[serde(rename = "extraData")]
    extra_data: Option<ExtraData>,
}

/// Client-provided claims from the standalone client-data token.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClientDataClaims {
    /// Skin identifier.
    #[serde(rename = "SkinId", default)]
    pub skin_id: String,
    /// Base64 skin bitmap.
    #[serde(rename = "SkinData", default)]
    pub skin_data: String,
    /// Base64 cape bitmap, empty when absent.
    #[serde(rename = "CapeData", default)]
    pub cape_data: String,
    /// Skin geometry name.
    #[serde(rename = "SkinGeometryName", default)]
    pub skin_geometry_name: String,
    /// Base64 skin geometry JSON.
    #[serde(rename = "SkinGeometry", default)]
    pub skin_geometry: String,
    /// Client-chosen random id for this install.
    #[serde(rename = "ClientRandomId", default)]
    pub client_random_id: i64,
}

/// Decode the claims segment of a serialized token without verifying it.
pub fn decode_claims<T: for<'de> Deserialize<'de>>(token: &str) -> Result<T, PacketError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| PacketError::MalformedLogin("token is not three dot-joined segments".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| PacketError::MalformedLogin(format!("claims segment is not base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PacketError::MalformedLogin(format!("claims segment is not valid JSON: {e}")))
}

/// The login request.
///
/// The identity fields are derived from the token payloads at construction,
/// so a decoded packet compares equal to the one that was encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginPacket {
    /// Client protocol version.
    pub protocol: u32,
    /// Ordered identity token chain, root first.
    pub chain: Vec<String>,
    /// The standalone client-data token.
    pub client_data_jwt: String,
    /// Display name from the chain's identity claims, empty when absent.
    pub username: String,
    /// Identity UUID from the chain's identity claims, empty when absent.
    pub identity: String,
    /// Xuid from the chain's identity claims, empty when absent.
    pub xuid: String,
    /// Claims from the client-data token.
    pub client_data: ClientDataClaims,
}

impl LoginPacket {
    /// Build a login packet from its wire constituents, deriving the
    /// identity fields from the token payloads.
    pub fn new(
        protocol: u32,
        chain: Vec<String>,
        client_data_jwt: String,
    ) -> Result<Self, PacketError> {
        // The identity claims live in whichever chain token carries them;
        // absence is not fatal here, the session rejects the empty name.
        let mut extra_data = ExtraData::default();
        for token in &chain {
            let claims: IdentityClaims = decode_claims(token)?;
            if let Some(found) = claims.extra_data {
                extra_data = found;
                break;
            }
        }

        let client_data: ClientDataClaims = decode_claims(&client_data_jwt)?;

        Ok(Self {
            protocol,
            chain,
            client_data_jwt,
            username: extra_data.display_name,
            identity: extra_data.identity,
            xuid: extra_data.xuid,
            client_data,
        })
    }

    /// Decode the payload following the id header.
    pub fn decode_payload(stream: &mut PacketStream) -> Result<Self, PacketError> {
        let protocol = stream.read_u32()?;
        let chain_json = stream.read_string()?;
        let client_data_jwt = stream.read_string()?;

        let envelope: ChainEnvelope = serde_json::from_str(&chain_json)
            .map_err(|e| PacketError::MalformedLogin(format!("chain envelope: {e}")))?;

        Self::new(protocol, envelope.chain, client_data_jwt)
    }

    /// Encode the payload following the id header.
    pub fn encode_payload(&self, stream: &mut PacketStream) {
        stream.write_u32(self.protocol);
        let envelope = ChainEnvelope {
            chain: self.chain.clone(),
        };
        // Serializing a vec of strings cannot fail.
        let chain_json = serde_json::to_string(&envelope).unwrap_or_default();
        stream.write_string(&chain_json);
        stream.write_string(&self.client_data_jwt);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fake_token(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"ES384","x5u":"key"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{header}.{payload}.c2ln")
    }

    fn sample_packet() -> LoginPacket {
        let chain = vec![
            fake_token(json!({ "identityPublicKey": "next" })),
            fake_token(json!({
                "extraData": {
                    "displayName": "Steve",
                    "identity": "d6b1f49f-1111-4c52-92a3-1e1a7b0d98a5",
                    "XUID": "2535405"
                }
            })),
        ];
        let client_data = fake_token(json!({
            "SkinId": "Standard_Custom",
            "SkinData": URL_SAFE_NO_PAD.encode([0u8; 4]),
            "ClientRandomId": 42_i64
        }));
        LoginPacket::new(282, chain, client_data).unwrap()
    }

    #[test]
    fn test_identity_claims_extracted() {
        let packet = sample_packet();
        assert_eq!(packet.username, "Steve");
        assert_eq!(packet.identity, "d6b1f49f-1111-4c52-92a3-1e1a7b0d98a5");
        assert_eq!(packet.xuid, "2535405");
        assert_eq!(packet.client_data.skin_id, "Standard_Custom");
        assert_eq!(packet.client_data.client_random_id, 42);
    }

    #[test]
    fn test_roundtrip() {
        let packet = sample_packet();
        let mut stream = PacketStream::new();
        packet.encode_payload(&mut stream);
        let mut reader = PacketStream::from_bytes(stream.into_bytes());
        let decoded = LoginPacket::decode_payload(&mut reader).unwrap();
        assert!(reader.is_at_end());
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_missing_extra_data_yields_empty_identity() {
        let chain = vec![fake_token(json!({ "identityPublicKey": "k" }))];
        let client_data = fake_token(json!({}));
        let packet = LoginPacket::new(282, chain, client_data).unwrap();
        assert_eq!(packet.username, "");
        assert_eq!(packet.xuid, "");
    }

    #[test]
    fn test_malformed_envelope_rejected() {
        let mut stream = PacketStream::new();
        stream.write_u32(282);
        stream.write_string("not json");
        stream.write_string(&fake_token(json!({})));
        let mut reader = PacketStream::from_bytes(stream.into_bytes());
        let err = LoginPacket::decode_payload(&mut reader).unwrap_err();
        assert!(matches!(err, PacketError::MalformedLogin(_)));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let chain = vec!["only-one-segment".to_string()];
        let err = LoginPacket::new(282, chain, fake_token(json!({}))).unwrap_err();
        assert!(matches!(err, PacketError::MalformedLogin(_)));
    }
}
