//! Guide Core Library
//!
//! Realtime core of the Guide counseling portal: room routing, presence,
//! inquiry message delivery, call rendezvous, and the SQLite store behind
//! them.

pub mod delivery;
pub mod dispatch;
pub mod effects;
pub mod error;
pub mod events;
pub mod models;
pub mod permissions;
pub mod presence;
pub mod rendezvous;
pub mod rooms;
pub mod storage;

#[cfg(test)]
mod testing;

pub use dispatch::{handle_event, on_connect, on_disconnect, Caller};
pub use effects::{Effect, Effects};
pub use error::{Error, Result};
pub use events::{CallUpdate, ClientEvent, ServerEvent, Signal, SignalKind};
pub use models::*;
pub use permissions::*;
pub use rooms::*;
pub use storage::{Database, Storage};
