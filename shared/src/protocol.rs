//! Wire protocol between clients and the room server
//!
//! Every frame is one bincode-encoded message. The server replicates full room
//! snapshots, so a client can rebuild the whole room from any single snapshot.

use crate::rumble::RumblePlayer;
use crate::volley::{Ball, VolleyPlayer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Server-assigned participant identifier, unique for the lifetime of the server.
pub type SessionId = u32;

/// The two supported room types, addressed by name when creating a room.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKind {
    Rumble,
    SlimeVolley,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::Rumble => "rumble",
            RoomKind::SlimeVolley => "slimevolley",
        }
    }
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rumble" => Ok(RoomKind::Rumble),
            "slimevolley" => Ok(RoomKind::SlimeVolley),
            other => Err(format!("unknown room type '{}'", other)),
        }
    }
}

/// Room lifecycle: Lobby -> InGame -> GameOver -> (host reset) -> Lobby.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameStatus {
    #[default]
    Lobby,
    InGame,
    GameOver,
}

/// In-room commands a session can send once it has joined.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Command {
    /// Survival: held acceleration angle in radians, `None` to coast.
    Direction(Option<f32>),
    /// Survival: radial push, needs a full charge.
    Kick,
    SetName(String),
    SetColor(String),
    SetReady(bool),
    Start,
    /// Survival: match length in seconds.
    SetGameTime(u32),
    Reset,
    KickPlayer(SessionId),
    /// Volleyball: horizontal intent, -1, 0 or 1.
    Move(i8),
    /// Volleyball: jump on the next tick if grounded.
    Jump,
}

impl Command {
    /// Commands only the room host may issue.
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            Command::Start | Command::SetGameTime(_) | Command::Reset | Command::KickPlayer(_)
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ClientMessage {
    /// Create a room of the named type (`"rumble"` or `"slimevolley"`) and join it.
    Create { kind: String },
    Join { room_id: String },
    /// Re-attach to an entity that is still inside its reconnection grace window.
    Reconnect { room_id: String, session_id: SessionId },
    Command(Command),
    Leave,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ServerMessage {
    Joined {
        room_id: String,
        session_id: SessionId,
        kind: RoomKind,
    },
    /// Structured join failure; `code` follows HTTP conventions (404, 409).
    JoinRejected { code: u16, reason: String },
    Snapshot { tick: u64, state: RoomSnapshot },
    /// The session was removed by the server (host kick, room closed).
    Disconnected { reason: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum RoomSnapshot {
    Rumble(RumbleSnapshot),
    SlimeVolley(VolleySnapshot),
}

impl RoomSnapshot {
    pub fn status(&self) -> GameStatus {
        match self {
            RoomSnapshot::Rumble(s) => s.state,
            RoomSnapshot::SlimeVolley(s) => s.state,
        }
    }

    pub fn host_id(&self) -> Option<SessionId> {
        match self {
            RoomSnapshot::Rumble(s) => s.host_id,
            RoomSnapshot::SlimeVolley(s) => s.host_id,
        }
    }
}

/// Survival room state. Players are listed in join order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RumbleSnapshot {
    pub players: Vec<RumblePlayer>,
    pub world_size: f32,
    pub game_time: u32,
    pub state: GameStatus,
    /// Names in elimination order; survivors are appended when the match ends.
    pub lost: Vec<String>,
    pub host_id: Option<SessionId>,
}

/// Volleyball room state. Players are listed in join order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VolleySnapshot {
    pub players: Vec<VolleyPlayer>,
    pub ball: Ball,
    pub state: GameStatus,
    pub host_id: Option<SessionId>,
    pub score_l: u32,
    pub score_r: u32,
    /// False once the current round's point has been awarded.
    pub ball_is_hot: bool,
    pub left_won_last: bool,
}

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(message)
}

pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volley::Side;

    #[test]
    fn test_room_kind_names() {
        assert_eq!("rumble".parse::<RoomKind>(), Ok(RoomKind::Rumble));
        assert_eq!("slimevolley".parse::<RoomKind>(), Ok(RoomKind::SlimeVolley));
        assert!("chess".parse::<RoomKind>().is_err());
        assert_eq!(RoomKind::SlimeVolley.to_string(), "slimevolley");
    }

    #[test]
    fn test_privileged_commands() {
        assert!(Command::Start.is_privileged());
        assert!(Command::Reset.is_privileged());
        assert!(Command::SetGameTime(60).is_privileged());
        assert!(Command::KickPlayer(2).is_privileged());
        assert!(!Command::Kick.is_privileged());
        assert!(!Command::SetReady(true).is_privileged());
        assert!(!Command::Move(1).is_privileged());
    }

    #[test]
    fn test_snapshot_message_serialization() {
        let snapshot = VolleySnapshot {
            players: vec![VolleyPlayer::new(1, Side::Left), VolleyPlayer::new(2, Side::Right)],
            ball: Ball::new(Side::Left),
            state: GameStatus::InGame,
            host_id: Some(1),
            score_l: 3,
            score_r: 4,
            ball_is_hot: true,
            left_won_last: false,
        };
        let message = ServerMessage::Snapshot {
            tick: 42,
            state: RoomSnapshot::SlimeVolley(snapshot.clone()),
        };

        let bytes = encode(&message).unwrap();
        let decoded: ServerMessage = decode(&bytes).unwrap();

        match decoded {
            ServerMessage::Snapshot { tick, state } => {
                assert_eq!(tick, 42);
                assert_eq!(state.status(), GameStatus::InGame);
                assert_eq!(state.host_id(), Some(1));
                assert_eq!(state, RoomSnapshot::SlimeVolley(snapshot));
            }
            _ => panic!("Wrong message type after deserialization"),
        }
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let bytes = encode(&ClientMessage::Create {
            kind: "rumble".to_string(),
        })
        .unwrap();
        let result: Result<ClientMessage, _> = decode(&bytes[..bytes.len() / 2]);
        assert!(result.is_err());
    }
}
