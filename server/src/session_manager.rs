//! Per-room session tracking and outbound delivery
//!
//! This module tracks who is attached to a room, including:
//! - Admission of new sessions and their outbound queues
//! - Reconnection grace windows after a connection drops
//! - Fire-and-forget delivery so a slow client never stalls the room tick
//!
//! A `SessionManager` is created with its room and dropped with it; there is
//! no process-wide session table.

use crate::error::JoinError;
use log::{debug, info, warn};
use shared::{ServerMessage, SessionId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Queue feeding one connection's writer task.
pub type Outbound = mpsc::Sender<ServerMessage>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presence {
    Connected,
    /// Connection lost; the entity is kept until `deadline` on the room clock.
    Reconnecting { deadline: f64 },
}

/// One participant attached to a room
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub presence: Presence,
    outbound: Option<Outbound>,
    /// Frames dropped because the outbound queue was full.
    pub dropped_frames: u64,
    lagging: bool,
    /// A frame was dropped and no full snapshot has been queued since.
    needs_resync: bool,
}

impl Session {
    pub fn new(id: SessionId, outbound: Outbound) -> Self {
        Self {
            id,
            presence: Presence::Connected,
            outbound: Some(outbound),
            dropped_frames: 0,
            lagging: false,
            needs_resync: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.presence == Presence::Connected
    }

    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    /// Queues a message without waiting.
    ///
    /// Returns false if the session is detached or its queue is full or
    /// closed. A full queue means the client is behind: the frame is dropped
    /// and the session is flagged until a later full snapshot gets through.
    pub fn send(&mut self, message: ServerMessage) -> bool {
        let Some(outbound) = &self.outbound else {
            return false;
        };
        let is_snapshot = matches!(message, ServerMessage::Snapshot { .. });

        match outbound.try_send(message) {
            Ok(()) => {
                self.lagging = false;
                if is_snapshot {
                    self.needs_resync = false;
                }
                true
            }
            Err(TrySendError::Full(_)) => {
                self.dropped_frames += 1;
                self.needs_resync = true;
                if !self.lagging {
                    warn!("Session {} is lagging, dropping frames", self.id);
                    self.lagging = true;
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Session {} outbound queue closed", self.id);
                false
            }
        }
    }
}

/// Sessions of a single room
///
/// Tracks presence per session and owns the outbound queues. Deadlines are
/// expressed on the room's simulation clock in milliseconds, so grace expiry
/// is applied between ticks like every other room mutation.
pub struct SessionManager {
    sessions: HashMap<SessionId, Session>,
    reconnect_grace_ms: f64,
}

impl SessionManager {
    pub fn new(reconnect_grace: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            reconnect_grace_ms: reconnect_grace.as_secs_f64() * 1000.0,
        }
    }

    pub fn admit(&mut self, id: SessionId, outbound: Outbound) {
        info!("Session {} attached", id);
        self.sessions.insert(id, Session::new(id, outbound));
    }

    /// Marks a session as dropped and starts its grace window.
    ///
    /// Returns false if the session is unknown or already reconnecting.
    pub fn disconnect(&mut self, id: SessionId, now: f64) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) if session.is_connected() => {
                let deadline = now + self.reconnect_grace_ms;
                session.presence = Presence::Reconnecting { deadline };
                session.outbound = None;
                info!(
                    "Session {} dropped, holding for {:.0} ms",
                    id, self.reconnect_grace_ms
                );
                true
            }
            _ => false,
        }
    }

    /// Re-attaches a new connection to an existing session.
    ///
    /// A session that still looks connected is taken over: its old
    /// connection has usually just not been noticed dead yet, and is told it
    /// was replaced before its queue is dropped.
    pub fn reconnect(&mut self, id: SessionId, outbound: Outbound) -> Result<(), JoinError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(JoinError::NotResumable(id))?;

        if session.is_connected() {
            session.send(ServerMessage::Disconnected {
                reason: "replaced by a new connection".to_string(),
            });
        }
        session.presence = Presence::Connected;
        session.outbound = Some(outbound);
        session.lagging = false;
        session.needs_resync = false;
        info!("Session {} reconnected", id);
        Ok(())
    }

    /// Removes and returns every session whose grace window has run out.
    pub fn expired(&mut self, now: f64) -> Vec<SessionId> {
        let expired: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| matches!(s.presence, Presence::Reconnecting { deadline } if now >= deadline))
            .map(|s| s.id)
            .collect();

        for id in &expired {
            self.sessions.remove(id);
            info!("Session {} did not reconnect in time", id);
        }
        expired
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn send_to(&mut self, id: SessionId, message: ServerMessage) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => session.send(message),
            None => false,
        }
    }

    /// Sends `message` to every connected session. Returns how many accepted it.
    pub fn broadcast(&mut self, message: &ServerMessage) -> usize {
        self.sessions
            .values_mut()
            .filter(|s| s.is_connected())
            .map(|s| s.send(message.clone()))
            .filter(|sent| *sent)
            .count()
    }

    pub fn resync_pending(&self) -> bool {
        self.sessions
            .values()
            .any(|s| s.is_connected() && s.needs_resync)
    }

    /// Sends `snapshot` only to connected sessions that dropped a frame.
    pub fn resync(&mut self, snapshot: &ServerMessage) -> usize {
        self.sessions
            .values_mut()
            .filter(|s| s.is_connected() && s.needs_resync)
            .map(|s| s.send(snapshot.clone()))
            .filter(|sent| *sent)
            .count()
    }

    /// The queue currently attached to `id`.
    pub fn outbound(&self, id: SessionId) -> Option<&Outbound> {
        self.sessions.get(&id).and_then(|s| s.outbound.as_ref())
    }

    /// True if `outbound` is the queue `id` is attached through right now.
    pub fn is_current(&self, id: SessionId, outbound: &Outbound) -> bool {
        self.outbound(id).is_some_and(|current| current.same_channel(outbound))
    }

    pub fn presence(&self, id: SessionId) -> Option<Presence> {
        self.sessions.get(&id).map(|s| s.presence)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn is_connected(&self, id: SessionId) -> bool {
        self.sessions.get(&id).is_some_and(Session::is_connected)
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_connected()).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(reason: &str) -> ServerMessage {
        ServerMessage::Disconnected {
            reason: reason.to_string(),
        }
    }

    fn manager() -> SessionManager {
        SessionManager::new(Duration::from_secs(2))
    }

    #[test]
    fn test_admit_and_send() {
        let mut sessions = manager();
        let (tx, mut rx) = mpsc::channel(4);
        sessions.admit(1, tx);

        assert!(sessions.is_connected(1));
        assert!(sessions.send_to(1, message("hello")));
        assert_eq!(rx.try_recv().unwrap(), message("hello"));
        assert!(!sessions.send_to(2, message("nobody")));
    }

    #[test]
    fn test_disconnect_starts_grace() {
        let mut sessions = manager();
        let (tx, _rx) = mpsc::channel(4);
        sessions.admit(1, tx);

        assert!(sessions.disconnect(1, 500.0));
        assert_eq!(
            sessions.presence(1),
            Some(Presence::Reconnecting { deadline: 2500.0 })
        );
        // Already dropped
        assert!(!sessions.disconnect(1, 600.0));
        assert!(!sessions.send_to(1, message("lost")));
        assert_eq!(sessions.connected_count(), 0);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_expiry_removes_session() {
        let mut sessions = manager();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        sessions.admit(1, tx1);
        sessions.admit(2, tx2);
        sessions.disconnect(1, 0.0);

        assert!(sessions.expired(1999.0).is_empty());
        assert_eq!(sessions.expired(2000.0), vec![1]);
        assert!(!sessions.contains(1));
        assert!(sessions.contains(2));
    }

    #[test]
    fn test_reconnect_within_grace() {
        let mut sessions = manager();
        let (tx, _rx) = mpsc::channel(4);
        sessions.admit(7, tx);
        sessions.disconnect(7, 0.0);

        let (tx, mut rx) = mpsc::channel(4);
        sessions.reconnect(7, tx).unwrap();
        assert!(sessions.is_connected(7));
        assert!(sessions.expired(10_000.0).is_empty());

        sessions.send_to(7, message("back"));
        assert_eq!(rx.try_recv().unwrap(), message("back"));
    }

    #[test]
    fn test_reconnect_unknown_session() {
        let mut sessions = manager();
        let (tx, _rx) = mpsc::channel(4);
        assert_eq!(sessions.reconnect(3, tx), Err(JoinError::NotResumable(3)));
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let mut sessions = manager();
        let (tx, mut rx) = mpsc::channel(1);
        sessions.admit(1, tx);

        assert!(sessions.send_to(1, message("first")));
        assert!(!sessions.send_to(1, message("second")));
        assert_eq!(sessions.remove(1).unwrap().dropped_frames, 1);
        assert_eq!(rx.try_recv().unwrap(), message("first"));
    }

    #[test]
    fn test_dropped_frame_flags_resync_until_snapshot_lands() {
        let mut sessions = manager();
        let (tx, mut rx) = mpsc::channel(1);
        sessions.admit(1, tx);

        assert!(sessions.send_to(1, message("filler")));
        assert!(!sessions.send_to(1, message("dropped")));
        assert!(sessions.resync_pending());

        rx.try_recv().unwrap();
        // Non-snapshot traffic does not count as catching up
        assert!(sessions.send_to(1, message("chat")));
        assert!(sessions.resync_pending());
        rx.try_recv().unwrap();

        let snapshot = ServerMessage::Snapshot {
            tick: 9,
            state: shared::RoomSnapshot::Rumble(shared::RumbleSnapshot {
                players: Vec::new(),
                world_size: 100.0,
                game_time: 75,
                state: shared::GameStatus::Lobby,
                lost: Vec::new(),
                host_id: None,
            }),
        };
        assert_eq!(sessions.resync(&snapshot), 1);
        assert!(!sessions.resync_pending());
        assert_eq!(rx.try_recv().unwrap(), snapshot);
    }

    #[test]
    fn test_takeover_notifies_old_connection() {
        let mut sessions = manager();
        let (old_tx, mut old_rx) = mpsc::channel(4);
        sessions.admit(1, old_tx.clone());
        assert!(sessions.is_current(1, &old_tx));

        let (new_tx, _new_rx) = mpsc::channel(4);
        sessions.reconnect(1, new_tx.clone()).unwrap();

        assert_eq!(
            old_rx.try_recv().unwrap(),
            message("replaced by a new connection")
        );
        assert!(!sessions.is_current(1, &old_tx));
        assert!(sessions.is_current(1, &new_tx));
    }

    #[test]
    fn test_broadcast_skips_reconnecting() {
        let mut sessions = manager();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        sessions.admit(1, tx1);
        sessions.admit(2, tx2);
        sessions.disconnect(2, 0.0);

        assert_eq!(sessions.broadcast(&message("tick")), 1);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }
}
