//! Blockhaven Server
//!
//! Demo binary: stands up an in-process transport and registry, runs one
//! client through the full login lifecycle, and logs every frame the
//! server emits.

use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use p384::ecdsa::signature::Signer;
use p384::ecdsa::{Signature, SigningKey};
use p384::pkcs8::EncodePublicKey;
use rand::rngs::OsRng;
use serde_json::json;

use blockhaven::auth::unix_now;
use blockhaven::network::{
    ChannelTransport, PlayerSession, RegistryConfig, ServerRegistry, TransportEvent,
};
use blockhaven::protocol::{DecodeOutcome, LoginPacket, Packet};
use blockhaven::{PROTOCOL_VERSION, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Blockhaven Server v{}", VERSION);
    info!("Protocol Version: {}", PROTOCOL_VERSION);

    demo_login().await
}

/// Run a scripted client through login, join, chat, and kick.
async fn demo_login() -> anyhow::Result<()> {
    info!("=== Starting Demo Login ===");

    let (transport, mut rx) = ChannelTransport::new();
    let registry = Arc::new(ServerRegistry::new(
        RegistryConfig {
            motd: "Blockhaven Demo".to_string(),
            ..Default::default()
        },
        transport,
    ));

    // Log every frame the server emits.
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                TransportEvent::Frame { conn, bytes, .. } => match Packet::decode(&bytes) {
                    Ok(DecodeOutcome::Packet(packet)) => {
                        info!(%conn, kind = packet.name(), "outbound frame");
                    }
                    Ok(DecodeOutcome::Unknown { id }) => {
                        info!(%conn, id, "outbound frame with unknown id");
                    }
                    Err(err) => error!(%conn, error = %err, "outbound frame failed to decode"),
                },
                TransportEvent::Closed { conn, reason } => {
                    info!(%conn, %reason, "transport closed");
                }
            }
        }
    });

    let session = registry.open_session("127.0.0.1", 19132).await;
    let login = scripted_login("Steve")?;
    let bytes = Packet::Login(login).encode();

    PlayerSession::handle_data_packet(&session, &registry, &bytes).await?;
    PlayerSession::complete_login_sequence(&session, &registry).await;
    PlayerSession::chat(&session, &registry, "hello from the demo client").await;
    PlayerSession::kick(&session, &registry, "demo over", true).await;

    // Let the frame logger drain.
    tokio::task::yield_now().await;
    info!("=== Demo Login Complete ===");
    Ok(())
}

fn key_b64(key: &SigningKey) -> anyhow::Result<String> {
    let der = key.verifying_key().to_public_key_der()?;
    Ok(STANDARD.encode(der.as_bytes()))
}

fn sign_token(
    key: &SigningKey,
    header: serde_json::Value,
    claims: serde_json::Value,
) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string().as_bytes());
    let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    let message = format!("{header_b64}.{claims_b64}");
    let signature: Signature = key.sign(message.as_bytes());
    format!("{message}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes()))
}

/// Build a self-consistent login for the demo client. The chain verifies
/// end to end but is not vendor-anchored, so the session logs in
/// unauthenticated.
fn scripted_login(name: &str) -> anyhow::Result<LoginPacket> {
    let root = SigningKey::random(&mut OsRng);
    let client = SigningKey::random(&mut OsRng);
    let now = unix_now();

    let chain_token = sign_token(
        &root,
        json!({ "alg": "ES384", "x5u": key_b64(&root)? }),
        json!({
            "nbf": now - 60,
            "exp": now + 3600,
            "identityPublicKey": key_b64(&client)?,
            "extraData": {
                "displayName": name,
                "identity": "d6b1f49f-1111-4c52-92a3-1e1a7b0d98a5",
                "XUID": "2535405",
            },
        }),
    );

    let client_data = sign_token(
        &client,
        json!({ "alg": "ES384" }),
        json!({
            "SkinId": "Standard_Custom",
            "SkinData": STANDARD.encode(vec![0u8; 8192]),
            "SkinGeometryName": "geometry.humanoid",
            "ClientRandomId": 7_i64,
        }),
    );

    Ok(LoginPacket::new(PROTOCOL_VERSION, vec![chain_token], client_data)?)
}
