//! Server and per-room configuration

use shared::RoomKind;
use std::time::Duration;

/// Process-wide settings, built from the command line.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Maximum concurrent connections across all rooms.
    pub max_clients: usize,
    pub tick_rate_hz: u32,
    pub empty_room_timeout: Duration,
    /// Outbound messages buffered per connection, whatever room it joins.
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:2567".to_string(),
            max_clients: 256,
            tick_rate_hz: 60,
            empty_room_timeout: Duration::from_secs(30),
            outbound_queue: 64,
        }
    }
}

impl ServerConfig {
    pub fn room_config(&self, kind: RoomKind) -> RoomConfig {
        RoomConfig {
            tick_rate_hz: self.tick_rate_hz,
            empty_room_timeout: self.empty_room_timeout,
            outbound_queue: self.outbound_queue,
            ..RoomConfig::for_kind(kind)
        }
    }
}

/// Settings for a single room task.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub tick_rate_hz: u32,
    /// How long a dropped session keeps its entity before it is removed.
    pub reconnect_grace: Duration,
    /// An empty room shuts down after this long.
    pub empty_room_timeout: Duration,
    /// Survival only: start as soon as everyone is ready, without waiting for the host.
    pub auto_start_on_ready: bool,
    /// Outbound messages buffered per session before frames are dropped.
    pub outbound_queue: usize,
    /// Inbound command queue depth for the room task.
    pub command_queue: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            reconnect_grace: Duration::from_secs(15),
            empty_room_timeout: Duration::from_secs(30),
            auto_start_on_ready: true,
            outbound_queue: 64,
            command_queue: 1024,
        }
    }
}

impl RoomConfig {
    pub fn for_kind(kind: RoomKind) -> Self {
        match kind {
            RoomKind::Rumble => Self::default(),
            RoomKind::SlimeVolley => Self {
                reconnect_grace: Duration::from_secs(2),
                auto_start_on_ready: false,
                ..Self::default()
            },
        }
    }

    /// Fixed simulation step in milliseconds.
    pub fn tick_ms(&self) -> f32 {
        1000.0 / self.tick_rate_hz.max(1) as f32
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz.max(1) as f64)
    }
}
