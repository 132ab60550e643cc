//! The seam between the generic room task and the two game rule sets

use crate::error::JoinError;
use shared::{Command, GameStatus, RoomKind, RoomSnapshot, SessionId};
use std::collections::HashSet;

/// A game's authoritative state machine, driven by the room task.
///
/// The room task owns exactly one `Simulation` and calls into it between ticks
/// (commands, joins, removals) and once per tick (`tick`). Host privilege is
/// checked by the caller before `handle` sees a privileged command.
pub trait Simulation: Send + 'static {
    fn kind(&self) -> RoomKind;

    fn status(&self) -> GameStatus;

    /// Earliest-joined player that is still connected.
    fn host_id(&self) -> Option<SessionId>;

    fn player_count(&self) -> usize;

    fn contains(&self, id: SessionId) -> bool;

    /// Creates the entity for a newly admitted session.
    fn add_player(&mut self, id: SessionId) -> Result<(), JoinError>;

    /// Removes an entity for good: grace expiry, explicit kick.
    fn remove_player(&mut self, id: SessionId, now: f64);

    /// The session dropped; its entity stays but stops being driven.
    fn release_control(&mut self, id: SessionId);

    /// Tracks whether the player's session is attached, for host selection.
    fn set_connected(&mut self, id: SessionId, connected: bool);

    /// Applies one command from `id`. Unknown players and commands that do not
    /// fit the current state are ignored.
    fn handle(&mut self, id: SessionId, command: Command, now: f64);

    /// Advances the simulation by `dt` milliseconds; `now` is the room clock after the step.
    fn tick(&mut self, dt: f32, now: f64);

    fn snapshot(&self) -> RoomSnapshot;
}

/// Players in join order. The host is the earliest entry whose session is
/// connected, so a dropped or removed host hands it to the next-earliest
/// joiner. While nobody is connected the earliest entry stays host.
#[derive(Debug, Clone)]
pub struct Roster<P> {
    entries: Vec<(SessionId, P)>,
    detached: HashSet<SessionId>,
}

impl<P> Default for Roster<P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            detached: HashSet::new(),
        }
    }
}

impl<P> Roster<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: SessionId, player: P) {
        match self.entries.iter().position(|(pid, _)| *pid == id) {
            Some(index) => self.entries[index].1 = player,
            None => self.entries.push((id, player)),
        }
    }

    pub fn remove(&mut self, id: SessionId) -> Option<P> {
        self.detached.remove(&id);
        let index = self.entries.iter().position(|(pid, _)| *pid == id)?;
        Some(self.entries.remove(index).1)
    }

    pub fn set_connected(&mut self, id: SessionId, connected: bool) {
        if connected {
            self.detached.remove(&id);
        } else if self.contains(id) {
            self.detached.insert(id);
        }
    }

    pub fn host_id(&self) -> Option<SessionId> {
        self.entries
            .iter()
            .map(|(id, _)| *id)
            .find(|id| !self.detached.contains(id))
            .or_else(|| self.entries.first().map(|(id, _)| *id))
    }

    pub fn get(&self, id: SessionId) -> Option<&P> {
        self.entries
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|(_, p)| p)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut P> {
        self.entries
            .iter_mut()
            .find(|(pid, _)| *pid == id)
            .map(|(_, p)| p)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &P> {
        self.entries.iter().map(|(_, p)| p)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut P> {
        self.entries.iter_mut().map(|(_, p)| p)
    }

    /// Mutable access to the players as a slice, in join order.
    pub fn entries_mut(&mut self) -> &mut [(SessionId, P)] {
        &mut self.entries
    }
}
