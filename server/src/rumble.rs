//! Survival room: last player standing on a shrinking-free ice floe
//!
//! Players push each other around with momentum and charged kicks; anyone who
//! leaves the floe is eliminated. When fewer than two remain the match ends
//! after a short delay so the final fall can play out on clients.

use crate::config::RoomConfig;
use crate::error::JoinError;
use crate::game::{Roster, Simulation};
use crate::timer::Timer;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::rumble::{
    apply_kick, resolve_collision, spawn_positions, RumblePlayer, DEFAULT_GAME_TIME,
    GAME_OVER_DELAY_MS, MAX_CHARGE, WORLD_SIZE,
};
use shared::{
    Command, GameStatus, RoomKind, RoomSnapshot, RumbleSnapshot, SessionId, Vec2,
};
use std::collections::{HashMap, HashSet};
use std::f32::consts::TAU;

pub struct RumbleRoom {
    players: Roster<RumblePlayer>,
    world_size: f32,
    game_time: u32,
    state: GameStatus,
    lost: Vec<String>,
    game_over: Timer,
    auto_start_on_ready: bool,
    rng: StdRng,
}

impl RumbleRoom {
    pub fn new(config: &RoomConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic spawn angles, for tests and replays.
    pub fn with_seed(config: &RoomConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &RoomConfig, rng: StdRng) -> Self {
        Self {
            players: Roster::new(),
            world_size: WORLD_SIZE,
            game_time: DEFAULT_GAME_TIME,
            state: GameStatus::Lobby,
            lost: Vec::new(),
            game_over: Timer::new(),
            auto_start_on_ready: config.auto_start_on_ready,
            rng,
        }
    }

    pub fn player(&self, id: SessionId) -> Option<&RumblePlayer> {
        self.players.get(id)
    }

    pub fn lost(&self) -> &[String] {
        &self.lost
    }

    pub fn world_size(&self) -> f32 {
        self.world_size
    }

    pub fn game_time(&self) -> u32 {
        self.game_time
    }

    pub fn game_over_pending(&self) -> bool {
        self.game_over.is_pending()
    }

    fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| p.is_ready)
    }

    fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.is_alive).count()
    }

    /// Lobby -> InGame. Everyone is placed evenly around the rim of the floe.
    pub fn start_game(&mut self) -> bool {
        if self.state != GameStatus::Lobby || !self.all_ready() {
            debug!(
                "Start ignored: state {:?}, all ready {}",
                self.state,
                self.all_ready()
            );
            return false;
        }

        let start_angle = self.rng.gen_range(0.0..TAU);
        let positions = spawn_positions(self.players.len(), WORLD_SIZE, start_angle);

        self.world_size = WORLD_SIZE;
        self.lost.clear();
        self.game_over.cancel();

        for (player, position) in self.players.values_mut().zip(positions) {
            player.position = position;
            player.velocity = Vec2::ZERO;
            player.accel_direction = None;
            player.is_alive = true;
            player.charge = MAX_CHARGE;
        }

        self.state = GameStatus::InGame;
        info!("Rumble match started with {} players", self.players.len());
        true
    }

    /// GameOver -> Lobby, keeping everyone who is still connected.
    pub fn reset(&mut self) -> bool {
        if self.state != GameStatus::GameOver {
            debug!("Reset ignored in state {:?}", self.state);
            return false;
        }

        self.world_size = WORLD_SIZE;
        self.lost.clear();
        self.game_over.cancel();
        for player in self.players.values_mut() {
            player.is_alive = true;
            player.is_ready = false;
            player.charge = MAX_CHARGE;
            player.velocity = Vec2::ZERO;
            player.accel_direction = None;
        }

        self.state = GameStatus::Lobby;
        info!("Rumble room reset to lobby");
        true
    }

    fn handle_kick(&mut self, id: SessionId) {
        let origin = match self.players.get_mut(id) {
            Some(kicker) if kicker.is_alive && kicker.is_charged() => {
                kicker.charge = 0.0;
                kicker.position
            }
            _ => return,
        };

        let mut hits = 0;
        for (other_id, other) in self.players.entries_mut() {
            if *other_id != id && apply_kick(origin, other) {
                hits += 1;
            }
        }
        debug!("Player {} kicked, {} players hit", id, hits);
    }

    fn update(&mut self, dt: f32) {
        for player in self.players.values_mut() {
            player.accelerate();
        }
        for player in self.players.values_mut() {
            player.integrate(dt);
        }
        self.update_collisions();
        self.update_alive();
    }

    /// Each overlapping pair is resolved at most once per tick: once `a` has
    /// bounced off `b`, `b` skips `a` for the rest of the pass.
    fn update_collisions(&mut self) {
        let entries = self.players.entries_mut();
        let mut resolved: HashMap<SessionId, HashSet<SessionId>> = HashMap::new();

        for i in 0..entries.len() {
            for j in 0..entries.len() {
                if i == j {
                    continue;
                }
                let (id, other_id) = (entries[i].0, entries[j].0);
                if resolved.get(&id).is_some_and(|skip| skip.contains(&other_id)) {
                    continue;
                }

                let (a, b) = pair_mut(entries, i, j);
                if resolve_collision(&mut a.1, &mut b.1) {
                    resolved.entry(other_id).or_default().insert(id);
                }
            }
        }
    }

    fn update_alive(&mut self) {
        for player in self.players.values_mut() {
            if player.is_alive && player.is_outside(self.world_size) {
                player.is_alive = false;
                player.accel_direction = None;
                info!("Player {} ({}) fell off the floe", player.id, player.name);
                self.lost.push(player.name.clone());
            }
        }
    }

    fn set_game_over(&mut self) {
        let survivors: Vec<String> = self
            .players
            .values()
            .filter(|p| p.is_alive)
            .map(|p| p.name.clone())
            .collect();
        self.lost.extend(survivors);
        self.state = GameStatus::GameOver;
        info!("Rumble match over, standings {:?}", self.lost);
    }
}

fn pair_mut<T>(slice: &mut [T], i: usize, j: usize) -> (&mut T, &mut T) {
    if i < j {
        let (head, tail) = slice.split_at_mut(j);
        (&mut head[i], &mut tail[0])
    } else {
        let (head, tail) = slice.split_at_mut(i);
        (&mut tail[0], &mut head[j])
    }
}

impl Simulation for RumbleRoom {
    fn kind(&self) -> RoomKind {
        RoomKind::Rumble
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
        let mut player = RumblePlayer::new(id);
        // Late joiners watch until the next match
        player.is_alive = self.state == GameStatus::Lobby;
        self.players.insert(id, player);
        Ok(())
    }

    fn remove_player(&mut self, id: SessionId, _now: f64) {
        let previous_host = self.players.host_id();
        if self.players.remove(id).is_some() && previous_host == Some(id) {
            info!("Host {} left, new host {:?}", id, self.players.host_id());
        }
    }

    fn release_control(&mut self, id: SessionId) {
        if let Some(player) = self.players.get_mut(id) {
            player.accel_direction = None;
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
                    player.name = name;
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
                if self.auto_start_on_ready && self.state == GameStatus::Lobby && self.all_ready()
                {
                    self.start_game();
                }
            }
            Command::Direction(angle) if self.state == GameStatus::InGame => {
                if let Some(player) = self.players.get_mut(id) {
                    player.accel_direction = angle.filter(|a| a.is_finite());
                }
            }
            Command::Kick if self.state == GameStatus::InGame => self.handle_kick(id),
            Command::Start => {
                self.start_game();
            }
            Command::Reset => {
                self.reset();
            }
            Command::SetGameTime(seconds) => {
                self.game_time = seconds;
            }
            other => debug!("Rumble ignoring {:?} from {} in {:?}", other, id, self.state),
        }
    }

    fn tick(&mut self, dt: f32, now: f64) {
        if self.game_over.fire(now) && self.state == GameStatus::InGame {
            self.set_game_over();
            return;
        }
        if self.state != GameStatus::InGame {
            return;
        }

        self.update(dt);

        if !self.game_over.is_pending() && self.alive_count() < 2 {
            debug!("Fewer than two players alive, game over scheduled");
            self.game_over.schedule(now, GAME_OVER_DELAY_MS);
        }
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot::Rumble(RumbleSnapshot {
            players: self.players.values().cloned().collect(),
            world_size: self.world_size,
            game_time: self.game_time,
            state: self.state,
            lost: self.lost.clone(),
            host_id: self.players.host_id(),
        })
    }
}
