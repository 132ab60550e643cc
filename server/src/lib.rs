//! # Room Server Library
//!
//! Authoritative server for the rumble and slimevolley games. Clients connect
//! over WebSocket, create or join a room, and from then on only send intents;
//! the room simulates at a fixed rate and replicates full snapshots back.
//!
//! ## Architecture
//!
//! ### One Task Per Room
//! Each room is a tokio task that exclusively owns its simulation, sessions
//! and replicator. Connection tasks talk to it through a bounded command
//! queue, so room state is never shared or locked. Commands are applied
//! between ticks, never during one.
//!
//! ### Fixed Tick
//! A room advances by a constant `dt` (milliseconds) per tick. Late ticks
//! delay the following ones instead of being skipped, and a panic inside a
//! tick is caught and logged so the room carries on with the next one.
//!
//! ### Fire-and-Forget Replication
//! After each tick the room compares the new snapshot with the last one it
//! sent and broadcasts it only if something changed. Delivery uses
//! `try_send` on per-session queues; a slow client loses frames, never
//! stalls the room.
//!
//! ## Module Organization
//!
//! - `game`: the `Simulation` trait both games implement, plus the join-ordered `Roster`
//! - `rumble`, `volley`: the two rule sets
//! - `timer`: cancel-and-replace deadlines on the room clock
//! - `session_manager`: presence, reconnection grace and outbound queues
//! - `replication`: snapshot change detection
//! - `room`: the room task, its command queue and the room registry
//! - `network`: WebSocket accept loop and per-connection handshake
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod game;
pub mod network;
pub mod replication;
pub mod room;
pub mod rumble;
pub mod session_manager;
pub mod timer;
pub mod volley;
