//! Room tasks: one owner per room, fed by a command queue and a fixed tick
//!
//! Every room runs as its own tokio task that exclusively owns the
//! simulation, the sessions and the replicator. Connections never touch room
//! state directly; they enqueue `RoomCommand`s, which the task applies between
//! ticks. A tick therefore always sees a consistent roster, and joins, leaves
//! and host changes land fully before or fully after it.

use crate::config::RoomConfig;
use crate::error::JoinError;
use crate::game::Simulation;
use crate::replication::{snapshot_message, Replicator};
use crate::rumble::RumbleRoom;
use crate::session_manager::{Outbound, SessionManager};
use crate::volley::VolleyRoom;
use log::{debug, error, info};
use rand::distributions::Alphanumeric;
use rand::Rng;
use shared::{Command, RoomKind, ServerMessage, SessionId};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{self, MissedTickBehavior};

const ROOM_ID_LEN: usize = 9;

/// Requests from connection tasks to a room task
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        session_id: SessionId,
        outbound: Outbound,
        respond: oneshot::Sender<Result<(), JoinError>>,
    },
    Reconnect {
        session_id: SessionId,
        outbound: Outbound,
        respond: oneshot::Sender<Result<(), JoinError>>,
    },
    Message {
        session_id: SessionId,
        command: Command,
    },
    /// Explicit leave or a dropped connection; both start the grace window.
    /// Ignored unless `outbound` is still the session's current queue, so a
    /// connection that was taken over cannot detach its replacement.
    Leave {
        session_id: SessionId,
        outbound: Outbound,
    },
}

/// Cheap, cloneable address of a running room task.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub id: String,
    pub kind: RoomKind,
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub async fn join(&self, session_id: SessionId, outbound: Outbound) -> Result<(), JoinError> {
        let (respond, response) = oneshot::channel();
        self.tx
            .send(RoomCommand::Join {
                session_id,
                outbound,
                respond,
            })
            .await
            .map_err(|_| JoinError::RoomClosed)?;
        response.await.map_err(|_| JoinError::RoomClosed)?
    }

    pub async fn reconnect(
        &self,
        session_id: SessionId,
        outbound: Outbound,
    ) -> Result<(), JoinError> {
        let (respond, response) = oneshot::channel();
        self.tx
            .send(RoomCommand::Reconnect {
                session_id,
                outbound,
                respond,
            })
            .await
            .map_err(|_| JoinError::RoomClosed)?;
        response.await.map_err(|_| JoinError::RoomClosed)?
    }

    /// Enqueues a command. Returns false once the room has shut down.
    pub async fn send(&self, command: RoomCommand) -> bool {
        self.tx.send(command).await.is_ok()
    }
}

/// A room's authoritative state plus everything attached to it.
pub struct Room<S: Simulation> {
    id: String,
    config: RoomConfig,
    sim: S,
    sessions: SessionManager,
    replicator: Replicator,
    /// Simulation clock in milliseconds, advanced by exactly one `dt` per tick.
    clock: f64,
    tick: u64,
    empty_since: Option<f64>,
}

impl<S: Simulation> Room<S> {
    pub fn new(id: impl Into<String>, sim: S, config: RoomConfig) -> Self {
        let sessions = SessionManager::new(config.reconnect_grace);
        Self {
            id: id.into(),
            config,
            sim,
            sessions,
            replicator: Replicator::new(),
            clock: 0.0,
            tick: 0,
            empty_since: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn simulation(&self) -> &S {
        &self.sim
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join {
                session_id,
                outbound,
                respond,
            } => {
                let result = self.join(session_id, outbound);
                self.respond(session_id, respond, result);
            }
            RoomCommand::Reconnect {
                session_id,
                outbound,
                respond,
            } => {
                let result = self.reconnect(session_id, outbound);
                self.respond(session_id, respond, result);
            }
            RoomCommand::Message {
                session_id,
                command,
            } => self.handle_message(session_id, command),
            RoomCommand::Leave {
                session_id,
                outbound,
            } => {
                if self.sessions.is_current(session_id, &outbound) {
                    self.leave(session_id);
                } else {
                    debug!("Ignoring leave from a replaced connection of {}", session_id);
                }
            }
        }
    }

    fn respond(
        &mut self,
        session_id: SessionId,
        respond: oneshot::Sender<Result<(), JoinError>>,
        result: Result<(), JoinError>,
    ) {
        let admitted = result.is_ok();
        if respond.send(result).is_err() && admitted {
            // The connection went away while waiting for us
            self.leave(session_id);
        }
    }

    fn join(&mut self, session_id: SessionId, outbound: Outbound) -> Result<(), JoinError> {
        if let Err(e) = self.sim.add_player(session_id) {
            info!("Session {} refused by room {}: {}", session_id, self.id, e);
            return Err(e);
        }
        self.sessions.admit(session_id, outbound);
        self.empty_since = None;
        self.greet(session_id);
        info!(
            "Session {} joined {} room {} ({} players, host {:?})",
            session_id,
            self.sim.kind(),
            self.id,
            self.sim.player_count(),
            self.sim.host_id()
        );
        Ok(())
    }

    fn reconnect(&mut self, session_id: SessionId, outbound: Outbound) -> Result<(), JoinError> {
        if !self.sim.contains(session_id) {
            return Err(JoinError::NotResumable(session_id));
        }
        self.sessions.reconnect(session_id, outbound)?;
        self.sim.set_connected(session_id, true);
        self.greet(session_id);
        Ok(())
    }

    /// New and returning sessions always start from a full snapshot.
    fn greet(&mut self, session_id: SessionId) {
        self.sessions.send_to(
            session_id,
            ServerMessage::Joined {
                room_id: self.id.clone(),
                session_id,
                kind: self.sim.kind(),
            },
        );
        self.sessions.send_to(
            session_id,
            snapshot_message(self.tick, self.sim.snapshot()),
        );
    }

    fn handle_message(&mut self, session_id: SessionId, command: Command) {
        if !self.sessions.is_connected(session_id) {
            debug!("Dropping command from detached session {}", session_id);
            return;
        }
        if command.is_privileged() && self.sim.host_id() != Some(session_id) {
            debug!(
                "Session {} is not host of room {}, ignoring {:?}",
                session_id, self.id, command
            );
            return;
        }

        match command {
            Command::KickPlayer(target) => self.kick_player(session_id, target),
            other => self.sim.handle(session_id, other, self.clock),
        }
    }

    /// Removes `target` immediately, with no grace window.
    fn kick_player(&mut self, host: SessionId, target: SessionId) {
        if target == host || !self.sim.contains(target) {
            debug!("Ignoring kick of {} by {}", target, host);
            return;
        }

        self.sessions.send_to(
            target,
            ServerMessage::Disconnected {
                reason: "kicked by host".to_string(),
            },
        );
        self.sessions.remove(target);
        self.sim.remove_player(target, self.clock);
        info!("Host {} kicked session {} from room {}", host, target, self.id);
    }

    fn leave(&mut self, session_id: SessionId) {
        if self.sessions.disconnect(session_id, self.clock) {
            self.sim.release_control(session_id);
            self.sim.set_connected(session_id, false);
        }
    }

    /// Runs one fixed step. Returns false when the room should shut down.
    pub fn step(&mut self) -> bool {
        let dt = self.config.tick_ms();
        self.clock += dt as f64;
        self.tick += 1;

        for session_id in self.sessions.expired(self.clock) {
            let previous_host = self.sim.host_id();
            self.sim.remove_player(session_id, self.clock);
            if previous_host != self.sim.host_id() {
                info!("Room {} host is now {:?}", self.id, self.sim.host_id());
            }
        }

        let sim = &mut self.sim;
        let now = self.clock;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| sim.tick(dt, now))) {
            error!(
                "Room {} tick {} panicked: {}",
                self.id,
                self.tick,
                panic_message(payload.as_ref())
            );
        }

        self.replicate();

        if self.tick % 600 == 0 {
            debug!(
                "Room {} tick {}: {} sessions, {} players, {:?}",
                self.id,
                self.tick,
                self.sessions.connected_count(),
                self.sim.player_count(),
                self.sim.status()
            );
        }

        self.keep_alive()
    }

    /// Broadcasts the state if it changed. Otherwise sessions that dropped a
    /// frame get the current state again until one copy is queued.
    fn replicate(&mut self) {
        match self.replicator.diff(self.sim.snapshot()) {
            Some(changed) => {
                self.sessions
                    .broadcast(&snapshot_message(self.tick, changed));
            }
            None if self.sessions.resync_pending() => {
                if let Some(last) = self.replicator.last() {
                    let message = snapshot_message(self.tick, last.clone());
                    self.sessions.resync(&message);
                }
            }
            None => {}
        }
    }

    fn keep_alive(&mut self) -> bool {
        if self.sim.player_count() > 0 || !self.sessions.is_empty() {
            self.empty_since = None;
            return true;
        }
        let since = *self.empty_since.get_or_insert(self.clock);
        let idle_ms = self.config.empty_room_timeout.as_secs_f64() * 1000.0;
        self.clock - since < idle_ms
    }

    /// Tells every remaining session the room is going away.
    pub fn close(&mut self, reason: &str) {
        self.sessions.broadcast(&ServerMessage::Disconnected {
            reason: reason.to_string(),
        });
        for id in self.sessions.ids() {
            self.sessions.remove(id);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Drives a room until it goes idle or every handle is dropped.
///
/// Ticks are never skipped: if a tick runs late the following ones are
/// delayed rather than bunched up or dropped.
pub async fn run_room<S: Simulation>(mut room: Room<S>, mut commands: mpsc::Receiver<RoomCommand>) {
    let mut tick_interval = time::interval(room.config.tick_duration());
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Room {} ({}) running at {} Hz",
        room.id,
        room.sim.kind(),
        room.config.tick_rate_hz
    );

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                if !room.step() {
                    info!("Room {} idle, shutting down", room.id);
                    break;
                }
            },
            command = commands.recv() => {
                match command {
                    Some(command) => room.handle_command(command),
                    None => break,
                }
            },
        }
    }

    room.close("room closed");
}

fn random_room_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROOM_ID_LEN)
        .map(char::from)
        .collect()
}

/// All live rooms by id. Rooms remove themselves when their task ends.
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<String, RoomHandle>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a new room task of the given kind and registers it.
    pub async fn create(&self, kind: RoomKind, config: RoomConfig) -> RoomHandle {
        let (tx, rx) = mpsc::channel(config.command_queue);

        let handle = {
            let mut rooms = self.rooms.write().await;
            let id = loop {
                let id = random_room_id();
                if !rooms.contains_key(&id) {
                    break id;
                }
            };
            let handle = RoomHandle { id, kind, tx };
            rooms.insert(handle.id.clone(), handle.clone());
            handle
        };

        match kind {
            RoomKind::Rumble => {
                let sim = RumbleRoom::new(&config);
                self.spawn(Room::new(handle.id.clone(), sim, config), rx);
            }
            RoomKind::SlimeVolley => {
                let sim = VolleyRoom::new();
                self.spawn(Room::new(handle.id.clone(), sim, config), rx);
            }
        }

        info!("Created {} room {}", kind, handle.id);
        handle
    }

    fn spawn<S: Simulation>(&self, room: Room<S>, commands: mpsc::Receiver<RoomCommand>) {
        let registry = self.clone();
        tokio::spawn(async move {
            let id = room.id().to_string();
            run_room(room, commands).await;
            registry.rooms.write().await.remove(&id);
            info!("Room {} closed", id);
        });
    }

    pub async fn get(&self, id: &str) -> Option<RoomHandle> {
        self.rooms.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
