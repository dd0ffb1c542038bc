//! worldcast server library.
//!
//! Keeps the authoritative state of every connected player and broadcasts a
//! consistent snapshot of it to all connections at a fixed tick rate.

pub mod config;
pub mod registry;
pub mod server;
pub mod stats;

// Re-export commonly used types
pub use config::Config;
pub use registry::{ConnectionHandle, Player, PlayerRegistry};
pub use server::{BroadcastReport, Server, ServerError, TickReport, TickScheduler, run};
