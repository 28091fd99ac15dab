//! Server Registry
//!
//! Shared server-side state every session coordinates through: the session
//! table, the logged-in name index, the online roster, and the pluggable
//! collaborators (ban list, command registry, player data store, outbound
//! packet interceptor).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::debug;

use crate::protocol::{CommandData, Packet, ResourcePackEntry};

use super::session::PlayerSession;
use super::transport::{ConnectionId, Transport};

/// Server-wide configuration the login sequence reads.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of logged-in players.
    pub max_players: usize,
    /// Server name, shown as the level name on join.
    pub motd: String,
    /// Default gamemode handed to joining players.
    pub gamemode: u32,
    /// Whether clients must accept the advertised packs.
    pub force_resource_packs: bool,
    /// Advertised resource packs.
    pub resource_packs: Vec<ResourcePackEntry>,
    /// Advertised behavior packs.
    pub behavior_packs: Vec<ResourcePackEntry>,
    /// View distance granted to clients, in chunks.
    pub view_distance: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_players: 20,
            motd: "A Blockhaven Server".to_string(),
            gamemode: 0,
            force_resource_packs: false,
            resource_packs: Vec::new(),
            behavior_packs: Vec::new(),
            view_distance: 8,
        }
    }
}

/// Hook invoked before every outbound packet. Returning `false` drops the
/// packet without sending.
pub trait SendInterceptor: Send + Sync {
    /// Decide whether the packet may go out.
    fn before_send(&self, conn: ConnectionId, packet: &Packet) -> bool {
        let _ = (conn, packet);
        true
    }
}

/// Interceptor that lets everything through.
pub struct AllowAll;

impl SendInterceptor for AllowAll {}

/// Name-based ban lookup consulted during login.
pub trait BanList: Send + Sync {
    /// Whether the given display name is banned.
    fn is_banned(&self, name: &str) -> bool;
}

/// Ban list with nobody on it.
pub struct NoBans;

impl BanList for NoBans {
    fn is_banned(&self, _name: &str) -> bool {
        false
    }
}

/// In-memory ban list, case-insensitive on names.
#[derive(Default)]
pub struct MemoryBanList {
    names: Mutex<HashSet<String>>,
}

impl MemoryBanList {
    /// Ban a name.
    pub fn ban(&self, name: &str) {
        if let Ok(mut names) = self.names.lock() {
            names.insert(name.to_lowercase());
        }
    }

    /// Lift a ban.
    pub fn pardon(&self, name: &str) {
        if let Ok(mut names) = self.names.lock() {
            names.remove(&name.to_lowercase());
        }
    }
}

impl BanList for MemoryBanList {
    fn is_banned(&self, name: &str) -> bool {
        self.names
            .lock()
            .map(|names| names.contains(&name.to_lowercase()))
            .unwrap_or(false)
    }
}

/// Command surface advertised to joined clients and dispatched to on chat
/// lines starting with a slash.
pub trait CommandRegistry: Send + Sync {
    /// Commands to advertise after join.
    fn advertised(&self) -> Vec<CommandData>;

    /// Execute a command line (leading slash stripped) on behalf of a player.
    fn dispatch(&self, sender: &str, line: &str) -> anyhow::Result<()>;
}

/// Command registry with no commands.
pub struct NoCommands;

impl CommandRegistry for NoCommands {
    fn advertised(&self) -> Vec<CommandData> {
        Vec::new()
    }

    fn dispatch(&self, sender: &str, line: &str) -> anyhow::Result<()> {
        anyhow::bail!("unknown command from {sender}: /{line}")
    }
}

/// Persistent record saved when a joined player disconnects.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlayerRecord {
    /// Display name.
    pub username: String,
    /// Identity UUID string from the login chain.
    pub identity: String,
    /// Xuid from the login chain.
    pub xuid: String,
    /// Unix time of the last disconnect.
    pub last_seen: i64,
}

/// Storage for player records.
pub trait PlayerDataStore: Send + Sync {
    /// Load a record by lowercase name.
    fn load(&self, name: &str) -> anyhow::Result<Option<PlayerRecord>>;

    /// Save a record under a lowercase name.
    fn save(&self, name: &str, record: &PlayerRecord) -> anyhow::Result<()>;
}

/// In-memory player data store.
#[derive(Default)]
pub struct MemoryPlayerStore {
    records: Mutex<HashMap<String, PlayerRecord>>,
}

impl PlayerDataStore for MemoryPlayerStore {
    fn load(&self, name: &str) -> anyhow::Result<Option<PlayerRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("player store poisoned"))?;
        Ok(records.get(&name.to_lowercase()).cloned())
    }

    fn save(&self, name: &str, record: &PlayerRecord) -> anyhow::Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("player store poisoned"))?;
        records.insert(name.to_lowercase(), record.clone());
        Ok(())
    }
}

/// Shared server state.
pub struct ServerRegistry {
    config: RegistryConfig,
    transport: Arc<dyn Transport>,
    interceptor: Arc<dyn SendInterceptor>,
    bans: Arc<dyn BanList>,
    commands: Arc<dyn CommandRegistry>,
    store: Arc<dyn PlayerDataStore>,
    sessions: RwLock<HashMap<ConnectionId, Arc<RwLock<PlayerSession>>>>,
    /// Lowercase name -> connection, populated at login.
    logged_in: RwLock<HashMap<String, ConnectionId>>,
    /// Lowercase names of players that completed the join sequence.
    online: RwLock<HashSet<String>>,
    current_tick: AtomicU64,
}

impl ServerRegistry {
    /// Create a registry with no-op collaborators.
    pub fn new(config: RegistryConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            interceptor: Arc::new(AllowAll),
            bans: Arc::new(NoBans),
            commands: Arc::new(NoCommands),
            store: Arc::new(MemoryPlayerStore::default()),
            sessions: RwLock::new(HashMap::new()),
            logged_in: RwLock::new(HashMap::new()),
            online: RwLock::new(HashSet::new()),
            current_tick: AtomicU64::new(0),
        }
    }

    /// Replace the ban list.
    pub fn with_ban_list(mut self, bans: Arc<dyn BanList>) -> Self {
        self.bans = bans;
        self
    }

    /// Replace the command registry.
    pub fn with_commands(mut self, commands: Arc<dyn CommandRegistry>) -> Self {
        self.commands = commands;
        self
    }

    /// Replace the player data store.
    pub fn with_store(mut self, store: Arc<dyn PlayerDataStore>) -> Self {
        self.store = store;
        self
    }

    /// Replace the outbound interceptor.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn SendInterceptor>) -> Self {
        self.interceptor = interceptor;
        self
    }

    /// Server configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Ban list.
    pub fn bans(&self) -> &dyn BanList {
        self.bans.as_ref()
    }

    /// Command registry.
    pub fn commands(&self) -> &dyn CommandRegistry {
        self.commands.as_ref()
    }

    /// Player data store.
    pub fn store(&self) -> &dyn PlayerDataStore {
        self.store.as_ref()
    }

    /// Current server tick.
    pub fn current_tick(&self) -> u64 {
        self.current_tick.load(Ordering::Relaxed)
    }

    /// Advance the server tick counter.
    pub fn advance_tick(&self) -> u64 {
        self.current_tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register a new connection and create its session.
    pub async fn open_session(
        &self,
        address: impl Into<String>,
        port: u16,
    ) -> Arc<RwLock<PlayerSession>> {
        let session = PlayerSession::new(
            address.into(),
            port,
            Arc::clone(&self.transport),
            Arc::clone(&self.interceptor),
        );
        let id = session.id();
        let session = Arc::new(RwLock::new(session));
        self.sessions.write().await.insert(id, Arc::clone(&session));
        session
    }

    /// Look up a session by connection id.
    pub async fn session(&self, id: ConnectionId) -> Option<Arc<RwLock<PlayerSession>>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Number of logged-in players.
    pub async fn player_count(&self) -> usize {
        self.logged_in.read().await.len()
    }

    /// Whether the server is at capacity.
    pub async fn is_full(&self) -> bool {
        self.player_count().await >= self.config.max_players
    }

    /// Session currently logged in under the given lowercase name.
    pub async fn logged_in_with_name(
        &self,
        iusername: &str,
    ) -> Option<Arc<RwLock<PlayerSession>>> {
        let id = *self.logged_in.read().await.get(iusername)?;
        self.session(id).await
    }

    /// Record a successful login.
    pub async fn on_player_login(&self, iusername: String, id: ConnectionId) {
        self.logged_in.write().await.insert(iusername, id);
    }

    /// Atomically take over a login name. The lookup and the insert happen
    /// under one acquisition of the name index, so two concurrent logins for
    /// the same name cannot both observe an empty slot; exactly one ends up
    /// registered. Returns the displaced holder's session, which the caller
    /// must kick.
    pub async fn claim_login_name(
        &self,
        iusername: &str,
        id: ConnectionId,
    ) -> Option<Arc<RwLock<PlayerSession>>> {
        let previous = self
            .logged_in
            .write()
            .await
            .insert(iusername.to_string(), id);
        match previous {
            Some(prev) if prev != id => self.session(prev).await,
            _ => None,
        }
    }

    /// Record a completed join sequence.
    pub async fn add_online(&self, iusername: String) {
        self.online.write().await.insert(iusername);
    }

    /// Drop login and online registrations for a departing session. The
    /// name index is only cleared when it still points at this connection,
    /// so a replacement login is never unregistered by its predecessor.
    pub async fn on_player_logout(&self, iusername: &str, id: ConnectionId) {
        {
            let mut logged_in = self.logged_in.write().await;
            if logged_in.get(iusername) == Some(&id) {
                logged_in.remove(iusername);
            }
        }
        self.online.write().await.remove(iusername);
    }

    /// Remove a session from the table.
    pub async fn remove_session(&self, id: ConnectionId) {
        self.sessions.write().await.remove(&id);
    }

    /// The transport reported a connection loss; close the session without
    /// notifying the (gone) client.
    pub async fn session_closed_from_transport(self: &Arc<Self>, id: ConnectionId, reason: &str) {
        if let Some(session) = self.session(id).await {
            let leave = session.read().await.leave_message();
            PlayerSession::close(&session, self, &leave, reason, false).await;
        }
    }

    /// Deliver a received acknowledgement to its session.
    pub async fn on_ack_received(&self, id: ConnectionId, ack: u32) {
        match self.session(id).await {
            Some(session) => session.write().await.acknowledge(ack),
            None => debug!(%id, ack, "ack for unknown session"),
        }
    }

    /// Send a raw text message to every logged-in player, optionally
    /// skipping one connection.
    pub async fn broadcast_message(&self, message: &str, except: Option<ConnectionId>) {
        let targets: Vec<_> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(id, _)| Some(**id) != except)
            .map(|(_, session)| Arc::clone(session))
            .collect();

        for session in targets {
            let mut guard = session.write().await;
            if guard.has_logged_in() && guard.is_connected() {
                guard.send_message(message);
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
