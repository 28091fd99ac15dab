//! # Blockhaven Server
//!
//! Protocol endpoint for a block-game server: accepts client connections,
//! authenticates them through a chained identity token, and drives each one
//! through the login lifecycle before handing it to gameplay logic.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    BLOCKHAVEN SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  protocol/       - Binary packet codec                       │
//! │  ├── stream.rs   - Position-tracked byte cursor              │
//! │  ├── packet.rs   - Packet framework and id dispatch          │
//! │  ├── login.rs    - Login request and claim extraction        │
//! │  ├── status.rs   - Play status / disconnect / pack info      │
//! │  ├── text.rs     - Text packet, nine layouts                 │
//! │  └── game.rs     - Start game, chunks, commands              │
//! │                                                              │
//! │  auth/           - Chain-of-trust authentication             │
//! │  ├── chain.rs    - Ordered token chain verification          │
//! │  └── der.rs      - Raw r||s signature repacking              │
//! │                                                              │
//! │  network/        - Sessions and shared server state          │
//! │  ├── session.rs  - Per-connection login state machine        │
//! │  ├── registry.rs - Session table, rosters, collaborators     │
//! │  └── transport.rs- Outbound frame abstraction                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency Model
//!
//! Sessions live behind `Arc<RwLock<_>>` in the registry. Multi-step login
//! operations are associated functions that drop the session guard across
//! await points; chain verification runs on the blocking pool and its
//! verdict is re-checked against session liveness before it takes effect,
//! so a disconnect mid-verification simply discards the verdict.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod auth;
pub mod format;
pub mod network;
pub mod protocol;
pub mod skin;

// Re-export commonly used types
pub use network::{PlayerSession, RegistryConfig, ServerRegistry, SessionState};
pub use protocol::{Packet, PacketStream};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version this endpoint speaks. Clients on any other version are
/// turned away during login.
pub const PROTOCOL_VERSION: u32 = 282;
