//! Precache Server - HTTP front for the precache layer
//!
//! At startup the server precaches the configured asset list into a named
//! cache store. Every request afterwards is answered from that store when a
//! stored response matches, and fetched from the upstream origin otherwise.

/// Version of the precache-server crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::PrecacheServer;
