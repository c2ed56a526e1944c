#![forbid(unsafe_code)]

//! Parley chat server: QUIC transport, realtime hub, and message storage.

pub mod clock;
pub mod config;
pub mod hub;
pub mod quic;
pub mod server;
pub mod store;
