//! Two-player volleyball room
//!
//! Exactly one slime per side of the net. A round ends when the ball touches
//! the floor: the side it did not land on scores, the ball stops being "hot"
//! so further bounces cannot score again, and after a short pause the ball is
//! served again on the side that lost the point. First to five wins.

use crate::error::JoinError;
use crate::game::{Roster, Simulation};
use crate::timer::Timer;
use log::{debug, info};
use shared::volley::{
    truncate_name, update_ball_physics, update_player_physics, Ball, Side, VolleyPlayer,
    MAX_SCORE, ROUND_RESET_DELAY_MS,
};
use shared::{Body, Command, GameStatus, RoomKind, RoomSnapshot, SessionId, VolleySnapshot};
use std::collections::HashMap;

/// Latest control input per player. Movement persists until changed; a jump
/// request is consumed by the next tick whether or not it could be honoured.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Intent {
    move_direction: i8,
    jump: bool,
}

pub struct VolleyRoom {
    players: Roster<VolleyPlayer>,
    ball: Ball,
    state: GameStatus,
    score_l: u32,
    score_r: u32,
    ball_is_hot: bool,
    left_won_last: bool,
    intents: HashMap<SessionId, Intent>,
    round_reset: Timer,
}

impl Default for VolleyRoom {
    fn default() -> Self {
        Self::new()
    }
}

impl VolleyRoom {
    pub fn new() -> Self {
        Self {
            players: Roster::new(),
            ball: Ball::new(Side::Left),
            state: GameStatus::Lobby,
            score_l: 0,
            score_r: 0,
            ball_is_hot: false,
            left_won_last: false,
            intents: HashMap::new(),
            round_reset: Timer::new(),
        }
    }

    pub fn player(&self, id: SessionId) -> Option<&VolleyPlayer> {
        self.players.get(id)
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    pub fn scores(&self) -> (u32, u32) {
        (self.score_l, self.score_r)
    }

    pub fn ball_is_hot(&self) -> bool {
        self.ball_is_hot
    }

    pub fn round_reset_pending(&self) -> bool {
        self.round_reset.is_pending()
    }

    fn free_side(&self) -> Side {
        if self.players.values().any(|p| p.side == Side::Left) {
            Side::Right
        } else {
            Side::Left
        }
    }

    fn can_start(&self) -> bool {
        self.state == GameStatus::Lobby
            && self.players.len() == 2
            && self.players.values().all(|p| p.is_ready)
    }

    pub fn start_game(&mut self) -> bool {
        if !self.can_start() {
            debug!(
                "Start ignored: state {:?}, {} players",
                self.state,
                self.players.len()
            );
            return false;
        }

        self.score_l = 0;
        self.score_r = 0;
        self.left_won_last = false;
        for player in self.players.values_mut() {
            player.score = 0;
            player.is_dancing = false;
            player.respawn();
        }
        self.ball = Ball::new(Side::Left);
        self.ball_is_hot = true;
        self.round_reset.cancel();
        self.state = GameStatus::InGame;
        info!("Volleyball match started");
        true
    }

    /// GameOver -> Lobby with scores cleared and everyone unready.
    pub fn reset(&mut self) -> bool {
        if self.state != GameStatus::GameOver {
            debug!("Reset ignored in state {:?}", self.state);
            return false;
        }

        self.score_l = 0;
        self.score_r = 0;
        self.left_won_last = false;
        self.ball_is_hot = false;
        self.ball = Ball::new(Side::Left);
        self.round_reset.cancel();
        for player in self.players.values_mut() {
            player.score = 0;
            player.is_ready = false;
            player.is_dancing = false;
            player.respawn();
        }
        for intent in self.intents.values_mut() {
            *intent = Intent::default();
        }

        self.state = GameStatus::Lobby;
        info!("Volleyball room reset to lobby");
        true
    }

    /// Serves a new round on the side that lost the last point.
    fn reset_round(&mut self) {
        let serve = if self.left_won_last {
            Side::Right
        } else {
            Side::Left
        };
        self.ball = Ball::new(serve);
        self.ball_is_hot = true;
        for player in self.players.values_mut() {
            player.is_dancing = false;
            player.respawn();
        }
        debug!("New round, serving on the {:?} side", serve);
    }

    fn score_goal(&mut self, now: f64) {
        let scorer = Side::of_x(self.ball.position.x).opponent();
        let score = match scorer {
            Side::Left => {
                self.score_l += 1;
                self.score_l
            }
            Side::Right => {
                self.score_r += 1;
                self.score_r
            }
        };

        self.ball_is_hot = false;
        self.left_won_last = scorer == Side::Left;
        for player in self.players.values_mut() {
            if player.side == scorer {
                player.score = score;
                player.is_dancing = true;
            }
        }
        info!(
            "Point to {:?}, score {}-{}",
            scorer, self.score_l, self.score_r
        );

        if score >= MAX_SCORE {
            self.round_reset.cancel();
            self.state = GameStatus::GameOver;
            info!("Volleyball match won by the {:?} side", scorer);
        } else {
            self.round_reset.schedule(now, ROUND_RESET_DELAY_MS);
        }
    }

    fn update(&mut self, dt: f32, now: f64) {
        for (id, player) in self.players.entries_mut() {
            let intent = self.intents.entry(*id).or_default();
            update_player_physics(player, intent.move_direction, intent.jump, dt);
            intent.jump = false;
        }

        let slimes: Vec<Body> = self.players.values().map(VolleyPlayer::body).collect();
        let hit_floor = update_ball_physics(&mut self.ball, &slimes, dt);

        if hit_floor && self.ball_is_hot {
            self.score_goal(now);
        }
    }
}

impl Simulation for VolleyRoom {
    fn kind(&self) -> RoomKind {
        RoomKind::SlimeVolley
    }

    fn status(&self) -> GameStatus {
        self.state
    }

    fn host_id(&self) -> Option<SessionId> {
        self.players.host_id()
    }

    fn player_count(&self) -> usize {
        self.players.len()
    }

    fn contains(&self, id: SessionId) -> bool {
        self.players.contains(id)
    }

    fn add_player(&mut self, id: SessionId) -> Result<(), JoinError> {
        if self.state != GameStatus::Lobby {
            return Err(JoinError::InProgress(RoomKind::SlimeVolley));
        }
        if self.players.len() >= 2 {
            return Err(JoinError::RoomFull);
        }

        let side = self.free_side();
        self.players.insert(id, VolleyPlayer::new(id, side));
        self.intents.insert(id, Intent::default());
        debug!("Player {} seated on the {:?} side", id, side);
        Ok(())
    }

    fn remove_player(&mut self, id: SessionId, _now: f64) {
        let previous_host = self.players.host_id();
        if self.players.remove(id).is_none() {
            return;
        }
        self.intents.remove(&id);

        if previous_host == Some(id) {
            info!("Host {} left, new host {:?}", id, self.players.host_id());
        }
        if self.state == GameStatus::InGame {
            self.round_reset.cancel();
            self.state = GameStatus::GameOver;
            info!("Player {} left mid-match, match over", id);
        }
    }

    fn release_control(&mut self, id: SessionId) {
        if let Some(intent) = self.intents.get_mut(&id) {
            *intent = Intent::default();
        }
    }

    fn set_connected(&mut self, id: SessionId, connected: bool) {
        self.players.set_connected(id, connected);
    }

    fn handle(&mut self, id: SessionId, command: Command, _now: f64) {
        if !self.players.contains(id) {
            return;
        }

        match command {
            Command::SetName(name) => {
                if let Some(player) = self.players.get_mut(id) {
                    player.name = truncate_name(&name);
                }
            }
            Command::SetColor(color) => {
                if let Some(player) = self.players.get_mut(id) {
                    player.color = color;
                }
            }
            Command::SetReady(ready) => {
                if let Some(player) = self.players.get_mut(id) {
                    player.is_ready = ready;
                }
            }
            Command::Move(direction) if self.state == GameStatus::InGame => {
                self.intents.entry(id).or_default().move_direction = direction.signum();
            }
            Command::Jump if self.state == GameStatus::InGame => {
                self.intents.entry(id).or_default().jump = true;
            }
            Command::Start => {
                self.start_game();
            }
            Command::Reset => {
                self.reset();
            }
            other => debug!(
                "Volleyball ignoring {:?} from {} in {:?}",
                other, id, self.state
            ),
        }
    }

    fn tick(&mut self, dt: f32, now: f64) {
        if self.state != GameStatus::InGame {
            return;
        }
        if self.round_reset.fire(now) {
            self.reset_round();
        }
        self.update(dt, now);
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot::SlimeVolley(VolleySnapshot {
            players: self.players.values().cloned().collect(),
            ball: self.ball.clone(),
            state: self.state,
            host_id: self.players.host_id(),
            score_l: self.score_l,
            score_r: self.score_r,
            ball_is_hot: self.ball_is_hot,
            left_won_last: self.left_won_last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::volley::{BALL_RADIUS, FLOOR_Y, REFERENCE_DT, SLIME_RADIUS};
    use shared::Vec2;

    const DT: f32 = REFERENCE_DT;

    fn started() -> VolleyRoom {
        let mut room = VolleyRoom::new();
        room.add_player(1).unwrap();
        room.add_player(2).unwrap();
        room.handle(1, Command::SetReady(true), 0.0);
        room.handle(2, Command::SetReady(true), 0.0);
        room.handle(1, Command::Start, 0.0);
        assert_eq!(room.status(), GameStatus::InGame);
        room
    }

    fn drop_ball_on(room: &mut VolleyRoom, x: f32) {
        room.ball.position = Vec2::new(x, FLOOR_Y - BALL_RADIUS - 1.0);
        room.ball.velocity = Vec2::new(0.0, 5.0);
    }

    #[test]
    fn test_side_assignment() {
        let mut room = VolleyRoom::new();
        room.add_player(1).unwrap();
        room.add_player(2).unwrap();
        assert_eq!(room.player(1).unwrap().side, Side::Left);
        assert_eq!(room.player(2).unwrap().side, Side::Right);

        assert_eq!(room.add_player(3), Err(JoinError::RoomFull));
        assert_eq!(room.player(1).unwrap().side, Side::Left);
        assert_eq!(room.player(2).unwrap().side, Side::Right);
    }

    #[test]
    fn test_vacated_left_side_is_reused() {
        let mut room = VolleyRoom::new();
        room.add_player(1).unwrap();
        room.add_player(2).unwrap();
        room.remove_player(1, 0.0);
        room.add_player(3).unwrap();
        assert_eq!(room.player(3).unwrap().side, Side::Left);
        assert_eq!(room.host_id(), Some(2));
    }

    #[test]
    fn test_join_rejected_mid_match() {
        let mut room = started();
        room.remove_player(2, 0.0);
        let err = room.add_player(3).unwrap_err();
        assert_eq!(err.code(), 409);
    }

    #[test]
    fn test_start_needs_two_ready_players() {
        let mut room = VolleyRoom::new();
        room.add_player(1).unwrap();
        room.handle(1, Command::SetReady(true), 0.0);
        room.handle(1, Command::Start, 0.0);
        assert_eq!(room.status(), GameStatus::Lobby);

        room.add_player(2).unwrap();
        room.handle(1, Command::Start, 0.0);
        assert_eq!(room.status(), GameStatus::Lobby);
    }

    #[test]
    fn test_ball_deflects_off_resting_slime() {
        let mut room = started();
        room.ball.position = Vec2::new(200.0, FLOOR_Y - 65.0);
        room.ball.velocity = Vec2::new(0.0, 4.0);

        room.tick(DT, DT as f64);

        assert!(room.ball().velocity.y < 0.0);
        let slime = room.player(1).unwrap().position;
        assert!(room.ball().position.distance(slime) >= BALL_RADIUS + SLIME_RADIUS - 1e-3);
    }

    #[test]
    fn test_goal_scores_once_then_serves_loser() {
        let mut room = started();
        drop_ball_on(&mut room, 700.0);

        room.tick(DT, DT as f64);
        assert_eq!(room.scores(), (1, 0));
        assert!(!room.ball_is_hot());
        assert!(room.player(1).unwrap().is_dancing);
        assert_eq!(room.player(1).unwrap().score, 1);

        // Further floor contacts during the pause do not score
        let mut now = DT as f64;
        drop_ball_on(&mut room, 100.0);
        now += DT as f64;
        room.tick(DT, now);
        assert_eq!(room.scores(), (1, 0));

        while room.round_reset_pending() {
            now += DT as f64;
            room.tick(DT, now);
        }
        assert!(room.ball_is_hot());
        assert!(!room.player(1).unwrap().is_dancing);
        // Right lost the point, so the serve comes from the right
        assert!(room.ball().position.x > 400.0);
    }

    #[test]
    fn test_match_ends_at_max_score() {
        let mut room = started();
        room.score_r = MAX_SCORE - 1;
        drop_ball_on(&mut room, 60.0);

        room.tick(DT, DT as f64);
        assert_eq!(room.scores(), (0, MAX_SCORE));
        assert_eq!(room.status(), GameStatus::GameOver);
        assert!(!room.round_reset_pending());
    }

    #[test]
    fn test_reset_from_game_over() {
        let mut room = started();
        room.score_l = MAX_SCORE - 1;
        drop_ball_on(&mut room, 720.0);
        room.tick(DT, DT as f64);
        assert_eq!(room.status(), GameStatus::GameOver);

        room.handle(1, Command::Reset, 0.0);
        assert_eq!(room.status(), GameStatus::Lobby);
        assert_eq!(room.scores(), (0, 0));
        assert!(!room.ball_is_hot());
        assert!(room.players.values().all(|p| !p.is_ready && p.score == 0));
    }

    #[test]
    fn test_leaving_mid_match_ends_it() {
        let mut room = started();
        room.remove_player(2, 100.0);
        assert_eq!(room.status(), GameStatus::GameOver);
        assert_eq!(room.host_id(), Some(1));
    }

    #[test]
    fn test_jump_is_consumed() {
        let mut room = started();
        room.handle(2, Command::Jump, 0.0);
        room.tick(DT, DT as f64);
        assert!(room.player(2).unwrap().position.y < FLOOR_Y);
        assert!(!room.intents[&2].jump);
    }

    #[test]
    fn test_move_ignored_outside_match() {
        let mut room = VolleyRoom::new();
        room.add_player(1).unwrap();
        room.handle(1, Command::Move(1), 0.0);
        assert_eq!(room.intents[&1].move_direction, 0);
    }

    #[test]
    fn test_release_control_stops_slime() {
        let mut room = started();
        room.handle(1, Command::Move(1), 0.0);
        room.release_control(1);
        let before = room.player(1).unwrap().position.x;
        room.tick(DT, DT as f64);
        assert_eq!(room.player(1).unwrap().position.x, before);
    }

    #[test]
    fn test_names_truncated() {
        let mut room = VolleyRoom::new();
        room.add_player(1).unwrap();
        room.handle(1, Command::SetName("Maximilian".to_string()), 0.0);
        assert_eq!(room.player(1).unwrap().name, "Maximili");
    }
}
