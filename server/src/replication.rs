//! Snapshot replication from a room to its sessions

use shared::{RoomSnapshot, ServerMessage};

/// Remembers the last broadcast snapshot so unchanged ticks send nothing.
///
/// Snapshots are always full state: a client that missed frames rebuilds
/// everything from the next one it receives.
#[derive(Debug, Default)]
pub struct Replicator {
    last: Option<RoomSnapshot>,
}

impl Replicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the snapshot to broadcast, or `None` if nothing changed since
    /// the previous broadcast.
    pub fn diff(&mut self, current: RoomSnapshot) -> Option<RoomSnapshot> {
        if self.last.as_ref() == Some(&current) {
            return None;
        }
        self.last = Some(current.clone());
        Some(current)
    }

    pub fn last(&self) -> Option<&RoomSnapshot> {
        self.last.as_ref()
    }
}

pub fn snapshot_message(tick: u64, state: RoomSnapshot) -> ServerMessage {
    ServerMessage::Snapshot { tick, state }
}
