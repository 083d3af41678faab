//! Data models for Guide

mod conversation;
mod identity;
mod ids;
mod message;
mod records;
mod session;

pub use conversation::*;
pub use identity::*;
pub use ids::*;
pub use message::*;
pub use records::*;
pub use session::*;
