//! `ProChat` realtime relay library.
//!
//! Exposes the relay server for use in tests and embedding. The relay maps
//! authenticated users to their live WebSocket connections, fans chat
//! messages and typing indicators out to the right sockets, and brokers call
//! setup and peer signaling between users.

pub mod calls;
pub mod config;
pub mod fanout;
pub mod identity;
pub mod registry;
pub mod relay;
pub mod rooms;
pub mod signaling;
pub mod typing;
