//! Guide Network Library
//!
//! TCP transport for the realtime core.
//!
//! # Architecture
//!
//! - **Server**: accepts connections, authenticates them, applies effects
//! - **Client**: small async client for tests and tooling
//! - **Protocol**: length-prefixed JSON events, with legacy name upgrades
//!
//! # Usage
//!
//! ```ignore
//! let server = Server::start(addr, Database::open(path)?, ServerOptions::default()).await?;
//!
//! let mut client = Client::connect(server.addr(), "token").await?;
//! client.send(ClientEvent::JoinRoom { room: RoomKey::Conversation(ConversationId(42)) }).await?;
//! while let Some(event) = client.next_event().await {
//!     match event {
//!         ServerEvent::MessageCreated(message) => { /* handle */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
pub mod error;
mod frame;
pub mod protocol;
pub mod server;

pub use client::{Client, ConnectionState};
pub use error::{Error, Result};
pub use frame::MAX_FRAME_SIZE;
pub use protocol::{decode_client_event, legacy_room_name};
pub use server::{Server, ServerOptions};

/// Default port for Guide servers
pub const DEFAULT_PORT: u16 = 7341;
