//! Message definitions for the worldcast JSON protocol.
//!
//! This module contains both client->server and server->client message types.
//! There is no type tag on the wire: inbound payloads go through an ordered
//! decode chain (structured update first, plain text otherwise).

mod client;
mod server;

pub use client::*;
pub use server::*;
