//! Player Session
//!
//! One client connection's lifecycle: awaiting login, asynchronous chain
//! verification, login success, the join sequence, and teardown. Sessions
//! are owned by the [`ServerRegistry`] behind `Arc<RwLock<_>>`; the
//! multi-step operations are associated functions taking the shared handle
//! so they can drop the guard across await points.
//!
//! Verification runs off-task; its verdict is delivered through
//! [`PlayerSession::on_verify_completed`], which re-checks liveness first so
//! a verdict arriving after a disconnect is discarded rather than reopening
//! the session.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{self, VerificationVerdict};
use crate::format;
use crate::protocol::{
    AvailableCommandsPacket, ChunkRadiusUpdatedPacket, DisconnectPacket, LevelChunkPacket,
    LoginPacket, Packet, PacketError, PlayStatus, PlayStatusPacket, ResourcePacksInfoPacket,
    StartGamePacket, TextMessageType, TextPacket,
};
use crate::skin::Skin;
use crate::PROTOCOL_VERSION;

use crate::protocol::game::default_game_rules;

use super::registry::{PlayerRecord, SendInterceptor, ServerRegistry};
use super::transport::{ConnectionId, Transport};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport handshake in progress, no session object yet.
    Connecting,
    /// Connected, waiting for the login packet.
    AwaitingLogin,
    /// Login received, chain verification in flight.
    Verifying,
    /// Verification passed, login acknowledged.
    LoggedIn,
    /// Join sequence completed, player is in the world.
    Joined,
    /// Terminal. The session is deregistered and its transport torn down.
    Closed,
}

/// Reasons an outbound packet never reached the transport.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The session has no live transport handle.
    #[error("session is not connected")]
    Disconnected,
    /// The interception hook cancelled the send.
    #[error("send cancelled by interceptor")]
    Cancelled,
}

/// One client connection.
pub struct PlayerSession {
    id: ConnectionId,
    address: String,
    port: u16,
    state: SessionState,
    protocol: u32,
    username: String,
    display_name: String,
    iusername: String,
    identity: String,
    xuid: String,
    client_random_id: i64,
    skin: Option<Skin>,
    authenticated: bool,
    view_distance: u32,
    /// Outbound ack id -> whether the acknowledgement has arrived.
    pending_acks: HashMap<u32, bool>,
    /// Presence of the handle defines connectivity.
    transport: Option<Arc<dyn Transport>>,
    interceptor: Arc<dyn SendInterceptor>,
}

impl PlayerSession {
    /// Create a session for a freshly connected client. Construction lands
    /// in `AwaitingLogin` directly.
    pub fn new(
        address: String,
        port: u16,
        transport: Arc<dyn Transport>,
        interceptor: Arc<dyn SendInterceptor>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            address,
            port,
            state: SessionState::AwaitingLogin,
            protocol: 0,
            username: String::new(),
            display_name: String::new(),
            iusername: String::new(),
            identity: String::new(),
            xuid: String::new(),
            client_random_id: 0,
            skin: None,
            authenticated: false,
            view_distance: 0,
            pending_acks: HashMap::new(),
            transport: Some(transport),
            interceptor,
        }
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Display name, falling back to the address for pre-login sessions.
    pub fn name(&self) -> String {
        if self.display_name.is_empty() {
            format!("{}:{}", self.address, self.port)
        } else {
            self.display_name.clone()
        }
    }

    /// Normalized lowercase username.
    pub fn iusername(&self) -> &str {
        &self.iusername
    }

    /// Identity UUID string from the login chain.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Xuid from the login chain.
    pub fn xuid(&self) -> &str {
        &self.xuid
    }

    /// Skin accepted at login.
    pub fn skin(&self) -> Option<&Skin> {
        self.skin.as_ref()
    }

    /// Whether the login chain was anchored at the vendor root.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// A live transport handle defines connectivity.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether login has been acknowledged.
    pub fn has_logged_in(&self) -> bool {
        matches!(self.state, SessionState::LoggedIn | SessionState::Joined)
    }

    /// The message broadcast when this player leaves. Empty until the join
    /// sequence completed; nobody saw them arrive.
    pub fn leave_message(&self) -> String {
        if self.state == SessionState::Joined {
            format!("{}{} has left the game", format::YELLOW, self.name())
        } else {
            String::new()
        }
    }

    /// Encode and queue a packet for this client.
    ///
    /// On success yields the acknowledgement id when one was requested and
    /// granted. A disconnected session or an interceptor cancellation is a
    /// [`SendError`] the caller can observe.
    ///
    /// # Panics
    ///
    /// Panics when called with a gameplay packet before login has been
    /// acknowledged; that is a bug in the caller, not a client-triggerable
    /// condition.
    pub fn send_data_packet(
        &mut self,
        packet: &Packet,
        need_ack: bool,
        immediate: bool,
    ) -> Result<Option<u32>, SendError> {
        let transport = self.transport.as_ref().ok_or(SendError::Disconnected)?;

        if !self.has_logged_in() && !packet.can_be_sent_before_login() {
            panic!(
                "attempted to send {} to {} before they logged in",
                packet.name(),
                self.name()
            );
        }

        if !self.interceptor.before_send(self.id, packet) {
            return Err(SendError::Cancelled);
        }

        let ack = transport.send(self.id, packet.encode(), need_ack, immediate);
        if need_ack {
            if let Some(ack) = ack {
                self.pending_acks.insert(ack, false);
                return Ok(Some(ack));
            }
        }
        Ok(None)
    }

    /// Queue a play status notification.
    pub fn send_play_status(&mut self, status: PlayStatus, immediate: bool) {
        let _ = self.send_data_packet(&Packet::PlayStatus(PlayStatusPacket { status }), false, immediate);
    }

    /// Queue a raw text message.
    pub fn send_message(&mut self, message: &str) {
        let _ = self.send_data_packet(&Packet::Text(TextPacket::raw(message)), false, false);
    }

    /// Grant a view distance and confirm it to the client.
    pub fn set_view_distance(&mut self, distance: u32) {
        self.view_distance = distance;
        let _ = self.send_data_packet(
            &Packet::ChunkRadiusUpdated(ChunkRadiusUpdatedPacket { radius: distance }),
            false,
            false,
        );
        debug!(name = %self.name(), distance, "set view distance");
    }

    /// Granted view distance.
    pub fn view_distance(&self) -> u32 {
        self.view_distance
    }

    /// Queue a serialized chunk column.
    pub fn send_chunk(&mut self, chunk: LevelChunkPacket) {
        let _ = self.send_data_packet(&Packet::LevelChunk(chunk), false, false);
    }

    /// Mark an outstanding acknowledgement as received.
    pub fn acknowledge(&mut self, ack: u32) {
        match self.pending_acks.get_mut(&ack) {
            Some(received) => *received = true,
            None => debug!(name = %self.name(), ack, "ack was never requested"),
        }
    }

    /// Whether a requested acknowledgement has arrived.
    pub fn is_acknowledged(&self, ack: u32) -> bool {
        self.pending_acks.get(&ack).copied().unwrap_or(false)
    }

    /// Decode inbound bytes and dispatch by packet kind. Unknown ids are
    /// logged and dropped; malformed payloads are an error the caller may
    /// close the connection over.
    pub async fn handle_data_packet(
        session: &Arc<RwLock<PlayerSession>>,
        registry: &Arc<ServerRegistry>,
        bytes: &[u8],
    ) -> Result<(), PacketError> {
        use crate::protocol::DecodeOutcome;

        match Packet::decode(bytes)? {
            DecodeOutcome::Unknown { id } => {
                debug!(id, "dropping unknown packet");
            }
            DecodeOutcome::Packet(Packet::Login(login)) => {
                Self::handle_login(session, registry, login).await;
            }
            DecodeOutcome::Packet(Packet::Text(text)) => {
                if text.message_type == TextMessageType::Chat {
                    Self::chat(session, registry, &text.message).await;
                }
            }
            DecodeOutcome::Packet(other) => {
                debug!(kind = other.name(), "unhandled inbound packet");
            }
        }
        Ok(())
    }

    /// Process a login request: synchronous screening (protocol, username,
    /// skin, bans, capacity), then asynchronous chain verification.
    pub async fn handle_login(
        session: &Arc<RwLock<PlayerSession>>,
        registry: &Arc<ServerRegistry>,
        login: LoginPacket,
    ) {
        let (chain, client_data_jwt) = {
            let mut guard = session.write().await;

            if guard.state != SessionState::AwaitingLogin {
                warn!(
                    name = %guard.name(),
                    state = ?guard.state,
                    "ignoring login: one is already in progress"
                );
                return;
            }

            guard.protocol = login.protocol;
            if login.protocol != PROTOCOL_VERSION {
                let status = if login.protocol < PROTOCOL_VERSION {
                    PlayStatus::LoginFailedClient
                } else {
                    PlayStatus::LoginFailedServer
                };
                guard.send_play_status(status, true);
                drop(guard);
                Self::close(session, registry, "", "Incompatible Protocol", false).await;
                return;
            }

            let username = format::clean(&login.username);
            guard.username = username.clone();
            guard.display_name = username.clone();
            guard.iusername = username.to_lowercase();

            if registry.is_full().await {
                guard.send_play_status(PlayStatus::LoginFailedServerFull, true);
                drop(guard);
                Self::close(session, registry, "", "Server Full", false).await;
                return;
            }

            guard.identity = login.identity.clone();
            guard.xuid = login.xuid.clone();
            guard.client_random_id = login.client_data.client_random_id;

            if !format::is_valid_username(&guard.username) {
                drop(guard);
                Self::close(session, registry, "", "Invalid Username", true).await;
                return;
            }

            let skin = Skin::from_claims(
                &login.client_data.skin_id,
                &login.client_data.skin_data,
                &login.client_data.cape_data,
                &login.client_data.skin_geometry_name,
                &login.client_data.skin_geometry,
            );
            match skin {
                Ok(skin) if skin.is_valid() => guard.skin = Some(skin),
                _ => {
                    drop(guard);
                    Self::close(session, registry, "", "Invalid Skin", true).await;
                    return;
                }
            }

            if registry.bans().is_banned(&guard.username) {
                drop(guard);
                Self::close(
                    session,
                    registry,
                    "",
                    "You are currently banned from this server.",
                    true,
                )
                .await;
                return;
            }

            guard.state = SessionState::Verifying;
            (login.chain.clone(), login.client_data_jwt.clone())
        };

        let verdict = match auth::spawn_verification(chain, client_data_jwt).await {
            Ok(verdict) => verdict,
            Err(err) => {
                error!(error = %err, "verification task failed");
                VerificationVerdict {
                    valid: false,
                    authenticated: false,
                }
            }
        };

        Self::on_verify_completed(session, registry, verdict).await;
    }

    /// Deliver a verification verdict. A verdict for a session that closed
    /// mid-flight only logs; that liveness check is the cancellation
    /// mechanism for in-flight verification.
    pub async fn on_verify_completed(
        session: &Arc<RwLock<PlayerSession>>,
        registry: &Arc<ServerRegistry>,
        verdict: VerificationVerdict,
    ) {
        {
            let guard = session.read().await;
            if guard.state == SessionState::Closed || !guard.is_connected() {
                error!(
                    name = %guard.name(),
                    "player was disconnected before their login could be verified"
                );
                return;
            }
        }

        if !verdict.valid {
            Self::close(session, registry, "", "Invalid Session", true).await;
            return;
        }

        session.write().await.authenticated = verdict.authenticated;
        if !verdict.authenticated {
            let guard = session.read().await;
            debug!(name = %guard.name(), "login chain is not vendor-anchored");
        }

        Self::process_login(session, registry).await;
    }

    /// Finish login: resolve name conflicts, acknowledge success, register
    /// with the server, advertise resource packs.
    async fn process_login(session: &Arc<RwLock<PlayerSession>>, registry: &Arc<ServerRegistry>) {
        // The claim and the state transition happen under the session guard
        // so a concurrent login for the same name cannot interleave between
        // them: whichever claim runs second displaces the other's
        // registration and kicks its session.
        let (name, displaced) = {
            let mut guard = session.write().await;
            if !guard.is_connected() {
                // Closed while the verdict was being delivered; registering
                // now would leave a name pointing at a dead session.
                return;
            }
            let displaced = registry.claim_login_name(&guard.iusername, guard.id).await;
            guard.send_play_status(PlayStatus::LoginSuccess, false);
            guard.state = SessionState::LoggedIn;
            (guard.name(), displaced)
        };

        // The earlier holder yields; its logout leaves the new registration
        // untouched because the name index no longer points at it.
        if let Some(other) = displaced {
            if !Arc::ptr_eq(&other, session) {
                Self::kick(&other, registry, "Logged in from another location", false).await;
            }
        }

        info!(name = %name, "player logged in");

        let config = registry.config();
        let packs = ResourcePacksInfoPacket {
            must_accept: config.force_resource_packs,
            behavior_packs: config.behavior_packs.clone(),
            resource_packs: config.resource_packs.clone(),
        };
        let _ = session
            .write()
            .await
            .send_data_packet(&Packet::ResourcePacksInfo(packs), false, false);
    }

    /// Run the join sequence for a logged-in session: world bootstrap,
    /// command advertisement, spawn status, online registration.
    pub async fn complete_login_sequence(
        session: &Arc<RwLock<PlayerSession>>,
        registry: &Arc<ServerRegistry>,
    ) {
        let (id, iusername, name) = {
            let mut guard = session.write().await;
            if guard.state != SessionState::LoggedIn {
                warn!(name = %guard.name(), state = ?guard.state, "join sequence out of order");
                return;
            }

            info!(
                "{} ({}:{}) is attempting to join",
                guard.name(),
                guard.address,
                guard.port
            );

            let config = registry.config();
            let start = StartGamePacket {
                player_gamemode: config.gamemode,
                player_position: [0, 20, 0],
                seed: 0xDEAD_BEEF,
                generator: 2,
                level_gamemode: config.gamemode,
                spawn_position: [0, 5, 0],
                is_multiplayer: true,
                has_lan_broadcast: true,
                commands_enabled: true,
                level_name: config.motd.clone(),
                current_tick: registry.current_tick(),
                enchantment_seed: 123_456,
                game_rules: default_game_rules(),
            };
            let _ = guard.send_data_packet(&Packet::StartGame(start), false, false);

            let commands = AvailableCommandsPacket {
                commands: registry.commands().advertised(),
            };
            let _ = guard.send_data_packet(&Packet::AvailableCommands(commands), false, false);

            guard.set_view_distance(config.view_distance);

            guard.state = SessionState::Joined;
            guard.send_play_status(PlayStatus::PlayerSpawn, false);
            (guard.id, guard.iusername.clone(), guard.name())
        };

        registry.add_online(iusername).await;
        registry
            .broadcast_message(
                &format!("{}{} has joined the game", format::YELLOW, name),
                Some(id),
            )
            .await;
    }

    /// Handle a chat line from this player. Format codes are stripped,
    /// multi-line input is split, slash lines go to the command registry,
    /// everything else is broadcast.
    pub async fn chat(
        session: &Arc<RwLock<PlayerSession>>,
        registry: &Arc<ServerRegistry>,
        message: &str,
    ) {
        let name = {
            let guard = session.read().await;
            if !guard.has_logged_in() {
                return;
            }
            guard.name()
        };

        let message = format::clean(message);
        for part in message.split('\n') {
            let part = part.trim();
            if part.is_empty() || part.len() > 255 {
                continue;
            }
            // "./cmd" is an escaped literal "/cmd".
            let part = part.strip_prefix('.').filter(|r| r.starts_with('/')).unwrap_or(part);

            if let Some(line) = part.strip_prefix('/') {
                if let Err(err) = registry.commands().dispatch(&name, line) {
                    warn!(name = %name, error = %err, "command dispatch failed");
                }
            } else {
                let line = format!("<{name}> {part}");
                info!("{line}");
                registry.broadcast_message(&line, None).await;
            }
        }
    }

    /// Kick this player. An admin kick composes the standard admin message;
    /// otherwise the reason is shown verbatim.
    pub async fn kick(
        session: &Arc<RwLock<PlayerSession>>,
        registry: &Arc<ServerRegistry>,
        reason: &str,
        is_admin: bool,
    ) -> bool {
        let message = if is_admin {
            if reason.is_empty() {
                "Kicked by admin.".to_string()
            } else {
                format!("Kicked by admin. Reason: {reason}")
            }
        } else if reason.is_empty() {
            "Unknown Reason.".to_string()
        } else {
            reason.to_string()
        };

        let leave = session.read().await.leave_message();
        Self::close(session, registry, &leave, &message, true).await;
        true
    }

    /// Close the session. Idempotent: a second close on an already closed
    /// or already disconnected session is a no-op.
    ///
    /// After the optional disconnect notification, the transport handle is
    /// cleared before any further side effect so that racing completions
    /// observe "not connected". Save and deregistration failures are logged,
    /// never propagated; transport teardown and registry removal always run.
    pub async fn close(
        session: &Arc<RwLock<PlayerSession>>,
        registry: &Arc<ServerRegistry>,
        leave_message: &str,
        reason: &str,
        notify: bool,
    ) {
        let (id, iusername, name, address, port, was_joined, was_logged_in, transport, record) = {
            let mut guard = session.write().await;
            if guard.state == SessionState::Closed || !guard.is_connected() {
                return;
            }

            // The notification goes through the normal send path while the
            // handle is still live, so the interceptor can veto it like any
            // other outbound packet. Only then does the handle get cleared.
            if notify && !reason.is_empty() {
                let pk = Packet::Disconnect(DisconnectPacket {
                    hide_disconnect_screen: false,
                    message: reason.to_string(),
                });
                let _ = guard.send_data_packet(&pk, false, true);
            }
            let transport = guard.transport.take();

            let was_joined = guard.state == SessionState::Joined;
            let was_logged_in = guard.has_logged_in();
            guard.state = SessionState::Closed;

            let record = PlayerRecord {
                username: guard.username.clone(),
                identity: guard.identity.clone(),
                xuid: guard.xuid.clone(),
                last_seen: auth::unix_now(),
            };

            (
                guard.id,
                guard.iusername.clone(),
                guard.name(),
                guard.address.clone(),
                guard.port,
                was_joined,
                was_logged_in,
                transport,
                record,
            )
        };

        if was_joined {
            if let Err(err) = registry.store().save(&iusername, &record) {
                error!(name = %name, error = %err, "failed to save player data");
            }
        }

        if was_logged_in {
            registry.on_player_logout(&iusername, id).await;
            if !leave_message.is_empty() {
                registry.broadcast_message(leave_message, Some(id)).await;
            }
        }

        info!(
            "{}{}{} ({}:{}) has disconnected due to {}",
            format::AQUA,
            name,
            format::WHITE,
            address,
            port,
            reason
        );

        if let Some(transport) = transport {
            transport.close(id, if notify { reason } else { "" });
        }
        registry.remove_session(id).await;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::registry::{MemoryBanList, RegistryConfig};
    use crate::network::transport::{ChannelTransport, TransportEvent};
    use crate::protocol::DecodeOutcome;
    use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
    use base64::Engine;
    use p384::ecdsa::signature::Signer;
    use p384::ecdsa::{Signature, SigningKey};
    use p384::pkcs8::EncodePublicKey;
    use rand::rngs::OsRng;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn key_b64(key: &SigningKey) -> String {
        STANDARD.encode(key.verifying_key().to_public_key_der().unwrap().as_bytes())
    }

    fn sign_token(key: &SigningKey, header: serde_json::Value, claims: serde_json::Value) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string().as_bytes());
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        let message = format!("{header_b64}.{claims_b64}");
        let signature: Signature = key.sign(message.as_bytes());
        format!("{message}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes()))
    }

    /// Self-consistent chain: verifies end to end but is not vendor-anchored.
    fn build_login(name: &str, protocol: u32, valid_chain: bool) -> LoginPacket {
        let root = SigningKey::random(&mut OsRng);
        let client = SigningKey::random(&mut OsRng);
        let now = auth::unix_now();

        let chain_token = sign_token(
            &root,
            json!({ "alg": "ES384", "x5u": key_b64(&root) }),
            json!({
                "nbf": now - 60,
                "exp": now + 3600,
                "identityPublicKey": key_b64(&client),
                "extraData": {
                    "displayName": name,
                    "identity": "d6b1f49f-1111-4c52-92a3-1e1a7b0d98a5",
                    "XUID": "2535405",
                },
            }),
        );

        let client_data_signer = if valid_chain {
            &client
        } else {
            // Signed by a key the chain never endorsed.
            &root
        };
        let client_data = sign_token(
            client_data_signer,
            json!({ "alg": "ES384" }),
            json!({
                "SkinId": "Standard_Custom",
                "SkinData": STANDARD.encode(vec![0u8; 8192]),
                "SkinGeometryName": "geometry.humanoid",
                "ClientRandomId": 99_i64,
            }),
        );

        LoginPacket::new(protocol, vec![chain_token], client_data).unwrap()
    }

    async fn setup(
        config: RegistryConfig,
    ) -> (
        Arc<ServerRegistry>,
        UnboundedReceiver<TransportEvent>,
    ) {
        let (transport, rx) = ChannelTransport::new();
        (Arc::new(ServerRegistry::new(config, transport)), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<TransportEvent>) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn decoded_frames(events: &[TransportEvent]) -> Vec<Packet> {
        events
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Frame { bytes, .. } => match Packet::decode(bytes).unwrap() {
                    DecodeOutcome::Packet(packet) => Some(packet),
                    DecodeOutcome::Unknown { .. } => None,
                },
                TransportEvent::Closed { .. } => None,
            })
            .collect()
    }

    fn disconnect_reason(events: &[TransportEvent]) -> Option<String> {
        decoded_frames(events).into_iter().find_map(|packet| match packet {
            Packet::Disconnect(pk) => Some(pk.message),
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_successful_login() {
        let (registry, mut rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;

        let login = build_login("Steve", PROTOCOL_VERSION, true);
        PlayerSession::handle_login(&session, &registry, login).await;

        let guard = session.read().await;
        assert_eq!(guard.state(), SessionState::LoggedIn);
        assert!(!guard.is_authenticated());
        assert_eq!(guard.iusername(), "steve");
        assert_eq!(guard.xuid(), "2535405");
        assert!(guard.skin().is_some());
        drop(guard);

        let frames = decoded_frames(&drain(&mut rx));
        assert!(matches!(
            frames[0],
            Packet::PlayStatus(PlayStatusPacket {
                status: PlayStatus::LoginSuccess
            })
        ));
        assert!(matches!(frames[1], Packet::ResourcePacksInfo(_)));
        assert_eq!(registry.player_count().await, 1);
    }

    #[tokio::test]
    async fn test_incompatible_protocol_rejected() {
        let (registry, mut rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;

        let login = build_login("Steve", PROTOCOL_VERSION - 1, true);
        PlayerSession::handle_login(&session, &registry, login).await;

        assert_eq!(session.read().await.state(), SessionState::Closed);
        let events = drain(&mut rx);
        let frames = decoded_frames(&events);
        assert!(matches!(
            frames[0],
            Packet::PlayStatus(PlayStatusPacket {
                status: PlayStatus::LoginFailedClient
            })
        ));
        // Notification suppressed: no disconnect packet, silent teardown.
        assert_eq!(disconnect_reason(&events), None);
        assert!(events
            .iter()
            .any(|e| matches!(e, TransportEvent::Closed { reason, .. } if reason.is_empty())));
    }

    #[tokio::test]
    async fn test_invalid_username_rejected() {
        let (registry, mut rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;

        let login = build_login("rcon", PROTOCOL_VERSION, true);
        PlayerSession::handle_login(&session, &registry, login).await;

        assert_eq!(session.read().await.state(), SessionState::Closed);
        assert_eq!(
            disconnect_reason(&drain(&mut rx)),
            Some("Invalid Username".to_string())
        );
    }

    #[tokio::test]
    async fn test_invalid_skin_rejected() {
        let (registry, mut rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;

        let mut login = build_login("Steve", PROTOCOL_VERSION, true);
        login.client_data.skin_data = STANDARD.encode(vec![0u8; 100]);
        PlayerSession::handle_login(&session, &registry, login).await;

        assert_eq!(
            disconnect_reason(&drain(&mut rx)),
            Some("Invalid Skin".to_string())
        );
    }

    #[tokio::test]
    async fn test_banned_player_rejected() {
        let (transport, mut rx) = ChannelTransport::new();
        let bans = Arc::new(MemoryBanList::default());
        bans.ban("Steve");
        let registry = Arc::new(
            ServerRegistry::new(RegistryConfig::default(), transport).with_ban_list(bans),
        );
        let session = registry.open_session("10.0.0.1", 19132).await;

        let login = build_login("Steve", PROTOCOL_VERSION, true);
        PlayerSession::handle_login(&session, &registry, login).await;

        assert_eq!(
            disconnect_reason(&drain(&mut rx)),
            Some("You are currently banned from this server.".to_string())
        );
    }

    #[tokio::test]
    async fn test_server_full_rejected() {
        let (registry, mut rx) = setup(RegistryConfig {
            max_players: 0,
            ..Default::default()
        })
        .await;
        let session = registry.open_session("10.0.0.1", 19132).await;

        let login = build_login("Steve", PROTOCOL_VERSION, true);
        PlayerSession::handle_login(&session, &registry, login).await;

        // The status carries the rejection; the close itself is silent.
        assert_eq!(session.read().await.state(), SessionState::Closed);
        let events = drain(&mut rx);
        let frames = decoded_frames(&events);
        assert!(matches!(
            frames[0],
            Packet::PlayStatus(PlayStatusPacket {
                status: PlayStatus::LoginFailedServerFull
            })
        ));
        assert_eq!(disconnect_reason(&events), None);
        assert!(events.iter().any(|e| matches!(e, TransportEvent::Closed { .. })));
    }

    #[tokio::test]
    async fn test_invalid_chain_rejected() {
        let (registry, mut rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;

        let login = build_login("Steve", PROTOCOL_VERSION, false);
        PlayerSession::handle_login(&session, &registry, login).await;

        assert_eq!(session.read().await.state(), SessionState::Closed);
        assert_eq!(
            disconnect_reason(&drain(&mut rx)),
            Some("Invalid Session".to_string())
        );
    }

    #[tokio::test]
    async fn test_second_login_during_verification_ignored() {
        let (registry, _rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;

        session.write().await.state = SessionState::Verifying;
        let login = build_login("Steve", PROTOCOL_VERSION, true);
        PlayerSession::handle_login(&session, &registry, login).await;

        // Untouched: no concurrent second verification started.
        assert_eq!(session.read().await.state(), SessionState::Verifying);
    }

    #[tokio::test]
    async fn test_name_conflict_kicks_earlier_session() {
        let (registry, mut rx) = setup(RegistryConfig::default()).await;

        let first = registry.open_session("10.0.0.1", 19132).await;
        PlayerSession::handle_login(&first, &registry, build_login("Steve", PROTOCOL_VERSION, true))
            .await;
        drain(&mut rx);

        let second = registry.open_session("10.0.0.2", 19132).await;
        PlayerSession::handle_login(
            &second,
            &registry,
            build_login("Steve", PROTOCOL_VERSION, true),
        )
        .await;

        assert_eq!(first.read().await.state(), SessionState::Closed);
        assert_eq!(second.read().await.state(), SessionState::LoggedIn);
        assert_eq!(
            disconnect_reason(&drain(&mut rx)),
            Some("Logged in from another location".to_string())
        );
        // The name index points at the survivor.
        let survivor = registry.logged_in_with_name("steve").await.unwrap();
        assert!(Arc::ptr_eq(&survivor, &second));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (registry, mut rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;

        PlayerSession::close(&session, &registry, "", "Kicked by admin.", true).await;
        PlayerSession::close(&session, &registry, "", "Kicked by admin.", true).await;

        let events = drain(&mut rx);
        let closes = events
            .iter()
            .filter(|e| matches!(e, TransportEvent::Closed { .. }))
            .count();
        assert_eq!(closes, 1);
        assert!(!session.read().await.is_connected());
    }

    #[tokio::test]
    async fn test_late_verdict_after_close_is_discarded() {
        let (registry, mut rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;

        session.write().await.state = SessionState::Verifying;
        PlayerSession::close(&session, &registry, "", "Unknown Reason.", true).await;
        drain(&mut rx);

        PlayerSession::on_verify_completed(
            &session,
            &registry,
            VerificationVerdict {
                valid: true,
                authenticated: true,
            },
        )
        .await;

        // Nothing reopened, nothing sent.
        assert_eq!(session.read().await.state(), SessionState::Closed);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(registry.player_count().await, 0);
    }

    #[tokio::test]
    async fn test_join_sequence_and_leave_broadcast() {
        let (registry, mut rx) = setup(RegistryConfig::default()).await;

        let watcher = registry.open_session("10.0.0.2", 19132).await;
        PlayerSession::handle_login(&watcher, &registry, build_login("Alex", PROTOCOL_VERSION, true))
            .await;
        PlayerSession::complete_login_sequence(&watcher, &registry).await;

        let joiner = registry.open_session("10.0.0.1", 19132).await;
        PlayerSession::handle_login(&joiner, &registry, build_login("Steve", PROTOCOL_VERSION, true))
            .await;
        drain(&mut rx);

        PlayerSession::complete_login_sequence(&joiner, &registry).await;
        assert_eq!(joiner.read().await.state(), SessionState::Joined);

        let frames = decoded_frames(&drain(&mut rx));
        assert!(frames.iter().any(|p| matches!(p, Packet::StartGame(_))));
        assert!(frames.iter().any(|p| matches!(p, Packet::AvailableCommands(_))));
        assert!(frames.iter().any(|p| matches!(
            p,
            Packet::PlayStatus(PlayStatusPacket {
                status: PlayStatus::PlayerSpawn
            })
        )));
        // The watcher saw the join broadcast.
        assert!(frames.iter().any(|p| matches!(
            p,
            Packet::Text(text) if text.message.contains("Steve has joined the game")
        )));

        let leave = joiner.read().await.leave_message();
        PlayerSession::close(&joiner, &registry, &leave, "Unknown Reason.", true).await;
        let frames = decoded_frames(&drain(&mut rx));
        assert!(frames.iter().any(|p| matches!(
            p,
            Packet::Text(text) if text.message.contains("Steve has left the game")
        )));
    }

    #[tokio::test]
    async fn test_chat_broadcast_and_command_dispatch() {
        let (registry, mut rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;
        PlayerSession::handle_login(&session, &registry, build_login("Steve", PROTOCOL_VERSION, true))
            .await;
        drain(&mut rx);

        PlayerSession::chat(&session, &registry, "hello\n/help\n   \n").await;

        let frames = decoded_frames(&drain(&mut rx));
        let texts: Vec<_> = frames
            .iter()
            .filter_map(|p| match p {
                Packet::Text(text) => Some(text.message.clone()),
                _ => None,
            })
            .collect();
        // One broadcast line; the slash line went to dispatch, blanks dropped.
        assert_eq!(texts, vec!["<Steve> hello".to_string()]);
    }

    #[tokio::test]
    #[should_panic(expected = "before they logged in")]
    async fn test_pre_login_gameplay_send_panics() {
        let (registry, _rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;
        let _ = session
            .write()
            .await
            .send_data_packet(&Packet::Text(TextPacket::raw("hi")), false, false);
    }

    struct BlockDisconnects;

    impl SendInterceptor for BlockDisconnects {
        fn before_send(&self, _conn: ConnectionId, packet: &Packet) -> bool {
            !matches!(packet, Packet::Disconnect(_))
        }
    }

    #[tokio::test]
    async fn test_interceptor_can_veto_disconnect_notification() {
        let (transport, mut rx) = ChannelTransport::new();
        let registry = Arc::new(
            ServerRegistry::new(RegistryConfig::default(), transport)
                .with_interceptor(Arc::new(BlockDisconnects)),
        );
        let session = registry.open_session("10.0.0.1", 19132).await;
        PlayerSession::handle_login(&session, &registry, build_login("Steve", PROTOCOL_VERSION, true))
            .await;
        drain(&mut rx);

        PlayerSession::kick(&session, &registry, "bye", true).await;

        // The notification was vetoed; the teardown still ran.
        let events = drain(&mut rx);
        assert_eq!(disconnect_reason(&events), None);
        assert_eq!(session.read().await.state(), SessionState::Closed);
        assert!(events.iter().any(|e| matches!(e, TransportEvent::Closed { .. })));
    }

    #[tokio::test]
    async fn test_send_reports_cancellation_and_disconnection() {
        let (transport, _rx) = ChannelTransport::new();
        let registry = Arc::new(
            ServerRegistry::new(RegistryConfig::default(), transport)
                .with_interceptor(Arc::new(BlockDisconnects)),
        );
        let session = registry.open_session("10.0.0.1", 19132).await;
        PlayerSession::handle_login(&session, &registry, build_login("Steve", PROTOCOL_VERSION, true))
            .await;

        {
            let mut guard = session.write().await;
            assert_eq!(
                guard.send_data_packet(&Packet::Text(TextPacket::raw("hi")), false, false),
                Ok(None)
            );
            let vetoed = Packet::Disconnect(DisconnectPacket {
                hide_disconnect_screen: false,
                message: "x".into(),
            });
            assert_eq!(
                guard.send_data_packet(&vetoed, false, false),
                Err(SendError::Cancelled)
            );
        }

        PlayerSession::close(&session, &registry, "", "", false).await;
        assert_eq!(
            session
                .write()
                .await
                .send_data_packet(&Packet::Text(TextPacket::raw("hi")), false, false),
            Err(SendError::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_ack_tracking() {
        let (registry, _rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;
        PlayerSession::handle_login(&session, &registry, build_login("Steve", PROTOCOL_VERSION, true))
            .await;

        let mut guard = session.write().await;
        let ack = guard
            .send_data_packet(&Packet::Text(TextPacket::raw("hi")), true, false)
            .unwrap()
            .unwrap();
        assert!(!guard.is_acknowledged(ack));
        guard.acknowledge(ack);
        assert!(guard.is_acknowledged(ack));
    }

    #[tokio::test]
    async fn test_transport_loss_closes_silently() {
        let (registry, mut rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;
        PlayerSession::handle_login(&session, &registry, build_login("Steve", PROTOCOL_VERSION, true))
            .await;
        drain(&mut rx);

        let id = session.read().await.id();
        registry
            .session_closed_from_transport(id, "client disconnect")
            .await;

        assert_eq!(session.read().await.state(), SessionState::Closed);
        assert_eq!(registry.player_count().await, 0);
        assert!(registry.session(id).await.is_none());
        // The client is gone: no disconnect notification was produced.
        assert_eq!(disconnect_reason(&drain(&mut rx)), None);
    }

    #[tokio::test]
    async fn test_registry_routes_acks() {
        let (registry, _rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;
        PlayerSession::handle_login(&session, &registry, build_login("Steve", PROTOCOL_VERSION, true))
            .await;

        let (id, ack) = {
            let mut guard = session.write().await;
            let ack = guard
                .send_data_packet(&Packet::Text(TextPacket::raw("hi")), true, false)
                .unwrap()
                .unwrap();
            (guard.id(), ack)
        };
        registry.on_ack_received(id, ack).await;
        assert!(session.read().await.is_acknowledged(ack));
    }

    #[tokio::test]
    async fn test_inbound_dispatch() {
        let (registry, mut rx) = setup(RegistryConfig::default()).await;
        let session = registry.open_session("10.0.0.1", 19132).await;

        let login = build_login("Steve", PROTOCOL_VERSION, true);
        let bytes = Packet::Login(login).encode();
        PlayerSession::handle_data_packet(&session, &registry, &bytes)
            .await
            .unwrap();
        assert_eq!(session.read().await.state(), SessionState::LoggedIn);
        drain(&mut rx);

        // Unknown ids are dropped without error.
        let mut unknown = crate::protocol::PacketStream::new();
        unknown.write_unsigned_var_int(0xFF);
        PlayerSession::handle_data_packet(&session, &registry, &unknown.into_bytes())
            .await
            .unwrap();

        // Truncated input is an error.
        assert!(PlayerSession::handle_data_packet(&session, &registry, &[])
            .await
            .is_err());
    }
}
