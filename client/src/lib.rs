//! # Room Client Library
//!
//! Headless client for the rumble and slimevolley room server. It connects
//! over WebSocket, creates or joins a room, forwards typed commands and keeps
//! a local view of the room that stays responsive between snapshots.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! The own entity is stepped locally every frame with the same shared physics
//! the server runs, using the input the player last sent. Prediction only runs
//! while a match is in progress.
//!
//! ### Reconciliation
//! Each snapshot is authoritative. When the predicted entity is close to the
//! server's, it is eased toward it; when it is far off (a respawn, a round
//! reset, a kick) it is replaced outright.
//!
//! ### Interpolation
//! Other players and the ball are not predicted. Their displayed positions
//! close part of the gap to the latest snapshot each frame.
//!
//! ## Module Organization
//!
//! - `game`: the `Reconciler` and per-game adapters, plus `GameView`
//! - `input`: maps typed lines to room commands
//! - `network`: WebSocket `Connection` and the headless `Client` loop
//! - `error`: `ClientError`
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, Connection};
//! use shared::RoomKind;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut connection = Connection::connect("ws://127.0.0.1:2567").await?;
//!     let joined = connection.create(RoomKind::Rumble).await?;
//!     Client::new(connection, joined).run().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod game;
pub mod input;
pub mod network;
