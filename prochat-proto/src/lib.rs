//! Shared protocol definitions for the `ProChat` relay wire format.

pub mod codec;
pub mod event;
pub mod ids;
pub mod message;
