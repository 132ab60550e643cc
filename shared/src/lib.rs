//! Shared simulation core for the rumble and slimevolley rooms
//!
//! Everything that must behave identically on the authoritative server and in
//! client-side prediction lives here: the vector primitives, both games' entity
//! models and physics steps, and the wire protocol.

pub mod protocol;
pub mod rumble;
pub mod vec;
pub mod volley;

pub use protocol::{
    ClientMessage, Command, GameStatus, RoomKind, RoomSnapshot, RumbleSnapshot, ServerMessage,
    SessionId, VolleySnapshot,
};
pub use vec::{Body, Vec2};
