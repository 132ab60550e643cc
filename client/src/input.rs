//! Text command input for the headless client
//!
//! Each stdin line maps to one room command. Movement words depend on the
//! game: `dir`/`stop` steer in rumble, `left`/`right`/`stop` in slimevolley.

use shared::{Command, RoomKind, SessionId};

/// What a typed line asks the client to do
#[derive(Debug, Clone, PartialEq)]
pub enum LineInput {
    Send(Command),
    Status,
    TogglePrediction,
    ToggleInterpolation,
    Quit,
}

pub fn parse_line(kind: RoomKind, line: &str) -> Option<LineInput> {
    let mut words = line.split_whitespace();
    let word = words.next()?.to_ascii_lowercase();
    let rest = words.collect::<Vec<_>>().join(" ");

    let command = match (word.as_str(), kind) {
        ("status", _) => return Some(LineInput::Status),
        ("quit" | "exit", _) => return Some(LineInput::Quit),
        ("prediction", _) => return Some(LineInput::TogglePrediction),
        ("interpolation", _) => return Some(LineInput::ToggleInterpolation),

        ("ready", _) => Command::SetReady(true),
        ("unready", _) => Command::SetReady(false),
        ("start", _) => Command::Start,
        ("reset", _) => Command::Reset,
        ("name", _) if !rest.is_empty() => Command::SetName(rest),
        ("color", _) if !rest.is_empty() => Command::SetColor(rest),
        ("kickplayer", _) => Command::KickPlayer(rest.parse::<SessionId>().ok()?),

        ("dir", RoomKind::Rumble) => {
            let degrees: f32 = rest.parse().ok()?;
            Command::Direction(Some(degrees.to_radians()))
        }
        ("stop", RoomKind::Rumble) => Command::Direction(None),
        ("kick", RoomKind::Rumble) => Command::Kick,
        ("time", RoomKind::Rumble) => Command::SetGameTime(rest.parse().ok()?),

        ("left", RoomKind::SlimeVolley) => Command::Move(-1),
        ("right", RoomKind::SlimeVolley) => Command::Move(1),
        ("stop", RoomKind::SlimeVolley) => Command::Move(0),
        ("jump", RoomKind::SlimeVolley) => Command::Jump,

        _ => return None,
    };
    Some(LineInput::Send(command))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_common_commands() {
        assert_eq!(
            parse_line(RoomKind::Rumble, "ready"),
            Some(LineInput::Send(Command::SetReady(true)))
        );
        assert_eq!(
            parse_line(RoomKind::SlimeVolley, "  START "),
            Some(LineInput::Send(Command::Start))
        );
        assert_eq!(
            parse_line(RoomKind::Rumble, "name Big Bob"),
            Some(LineInput::Send(Command::SetName("Big Bob".to_string())))
        );
        assert_eq!(
            parse_line(RoomKind::Rumble, "kickplayer 12"),
            Some(LineInput::Send(Command::KickPlayer(12)))
        );
        assert_eq!(parse_line(RoomKind::Rumble, "status"), Some(LineInput::Status));
    }

    #[test]
    fn test_rumble_direction_in_degrees() {
        match parse_line(RoomKind::Rumble, "dir 90") {
            Some(LineInput::Send(Command::Direction(Some(angle)))) => {
                assert_approx_eq!(angle, std::f32::consts::FRAC_PI_2);
            }
            other => panic!("Unexpected parse: {:?}", other),
        }
        assert_eq!(
            parse_line(RoomKind::Rumble, "stop"),
            Some(LineInput::Send(Command::Direction(None)))
        );
    }

    #[test]
    fn test_game_specific_words() {
        assert_eq!(
            parse_line(RoomKind::SlimeVolley, "stop"),
            Some(LineInput::Send(Command::Move(0)))
        );
        assert_eq!(parse_line(RoomKind::SlimeVolley, "kick"), None);
        assert_eq!(parse_line(RoomKind::Rumble, "jump"), None);
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(parse_line(RoomKind::Rumble, ""), None);
        assert_eq!(parse_line(RoomKind::Rumble, "dir north"), None);
        assert_eq!(parse_line(RoomKind::Rumble, "kickplayer"), None);
        assert_eq!(parse_line(RoomKind::Rumble, "name"), None);
    }
}
