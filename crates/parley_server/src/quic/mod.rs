#![forbid(unsafe_code)]

pub mod config;

pub use config::QuicServerConfig;
