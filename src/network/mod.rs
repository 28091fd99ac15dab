//! Network Layer
//!
//! Per-connection session state machines, the shared server registry, and
//! the transport abstraction they send frames through. All protocol
//! encoding lives in `protocol/`; all token verification in `auth/`.

pub mod registry;
pub mod session;
pub mod transport;

pub use registry::{
    AllowAll, BanList, CommandRegistry, MemoryBanList, MemoryPlayerStore, NoBans, NoCommands,
    PlayerDataStore, PlayerRecord, RegistryConfig, SendInterceptor, ServerRegistry,
};
pub use session::{PlayerSession, SendError, SessionState};
pub use transport::{ChannelTransport, ConnectionId, Transport, TransportEvent};
