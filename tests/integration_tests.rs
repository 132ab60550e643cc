//! Integration tests across the shared core, the room server and the client
//!
//! The first groups drive rooms directly and feed what they broadcast into a
//! client view; the last group runs the real WebSocket server on a free port.

use client::error::ClientError;
use client::game::{BodyKey, Correction, GameView};
use client::network::Connection;
use server::config::{RoomConfig, ServerConfig};
use server::network::Server;
use server::room::{Room, RoomCommand};
use server::rumble::RumbleRoom;
use server::volley::VolleyRoom;
use shared::rumble::{resolve_collision, RumblePlayer, PLAYER_RADIUS};
use shared::{Command, GameStatus, RoomKind, RoomSnapshot, ServerMessage, SessionId, Vec2};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

fn join_room<S: server::game::Simulation>(
    room: &mut Room<S>,
    session_id: SessionId,
) -> mpsc::Receiver<ServerMessage> {
    let (outbound, inbox) = mpsc::channel(256);
    let (respond, mut response) = oneshot::channel();
    room.handle_command(RoomCommand::Join {
        session_id,
        outbound,
        respond,
    });
    response
        .try_recv()
        .expect("room did not answer")
        .expect("join rejected");
    inbox
}

fn send<S: server::game::Simulation>(room: &mut Room<S>, session_id: SessionId, command: Command) {
    room.handle_command(RoomCommand::Message {
        session_id,
        command,
    });
}

/// Applies every snapshot waiting in `inbox` and returns the corrections.
fn pump(inbox: &mut mpsc::Receiver<ServerMessage>, view: &mut GameView) -> Vec<Correction> {
    let mut corrections = Vec::new();
    while let Ok(message) = inbox.try_recv() {
        if let ServerMessage::Snapshot { tick, state } = message {
            corrections.push(view.apply_snapshot(tick, state));
        }
    }
    corrections
}

fn last_snapshot(inbox: &mut mpsc::Receiver<ServerMessage>) -> Option<RoomSnapshot> {
    let mut last = None;
    while let Ok(message) = inbox.try_recv() {
        if let ServerMessage::Snapshot { state, .. } = message {
            last = Some(state);
        }
    }
    last
}

/// SHARED PHYSICS
mod physics_tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Two players closing in on each other end up apart with swapped velocities
    #[test]
    fn head_on_collision_separates_and_bounces() {
        let mut a = RumblePlayer::new(1);
        let mut b = RumblePlayer::new(2);
        a.position = Vec2::new(-PLAYER_RADIUS * 0.75, 0.0);
        b.position = Vec2::new(PLAYER_RADIUS * 0.75, 0.0);
        a.velocity = Vec2::new(1.0, 0.0);
        b.velocity = Vec2::new(-1.0, 0.0);

        assert!(resolve_collision(&mut a, &mut b));

        assert!(a.position.distance(b.position) >= PLAYER_RADIUS * 2.0 - 1e-3);
        assert!(a.velocity.x < 0.0);
        assert!(b.velocity.x > 0.0);
        assert_approx_eq!(a.velocity.x, -1.0, 1e-4);
        assert_approx_eq!(b.velocity.x, 1.0, 1e-4);
    }
}

/// SURVIVAL ROOM AS SEEN BY CLIENTS
mod rumble_flow_tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn room() -> (Room<RumbleRoom>, RoomConfig) {
        let config = RoomConfig {
            auto_start_on_ready: false,
            ..RoomConfig::default()
        };
        let room = Room::new("arena", RumbleRoom::with_seed(&config, 11), config.clone());
        (room, config)
    }

    /// Four ready players, host starts: everyone sees the match on the spawn ring
    #[test]
    fn start_places_everyone_on_ring() {
        let (mut room, _) = room();
        let mut inboxes: Vec<_> = (1..=4).map(|id| join_room(&mut room, id)).collect();
        for id in 1..=4 {
            send(&mut room, id, Command::SetReady(true));
        }
        send(&mut room, 1, Command::Start);
        room.step();

        let snapshot = match last_snapshot(&mut inboxes[3]) {
            Some(RoomSnapshot::Rumble(snapshot)) => snapshot,
            other => panic!("Expected rumble snapshot, got {:?}", other),
        };
        assert_eq!(snapshot.state, GameStatus::InGame);
        assert!(snapshot.lost.is_empty());

        let ring = snapshot.world_size - PLAYER_RADIUS * 2.0;
        let angles: Vec<f32> = snapshot
            .players
            .iter()
            .map(|p| {
                assert_approx_eq!(p.position.length(), ring, 0.05);
                p.position.angle()
            })
            .collect();
        for pair in angles.windows(2) {
            let mut gap = pair[1] - pair[0];
            if gap < 0.0 {
                gap += std::f32::consts::TAU;
            }
            assert_approx_eq!(gap, std::f32::consts::FRAC_PI_2, 0.01);
        }

        for inbox in inboxes.iter_mut().take(3) {
            assert!(last_snapshot(inbox).is_some());
        }
    }

    /// Prediction with the same input the server got stays within blending range
    #[test]
    fn prediction_tracks_authority() {
        let (mut room, config) = room();
        let mut inbox = join_room(&mut room, 1);
        let _other = join_room(&mut room, 2);

        let mut view = GameView::new(RoomKind::Rumble, 1);
        assert!(pump(&mut inbox, &mut view).contains(&Correction::Snapped));

        send(&mut room, 1, Command::SetReady(true));
        send(&mut room, 2, Command::SetReady(true));
        send(&mut room, 1, Command::Start);
        room.step();
        pump(&mut inbox, &mut view);
        assert_eq!(view.status(), Some(GameStatus::InGame));

        let position = match &view {
            GameView::Rumble(reconciler) => reconciler.own_entity().map(|p| p.position),
            GameView::SlimeVolley(_) => None,
        }
        .expect("own player missing");
        let inward = (Vec2::ZERO - position).angle();

        send(&mut room, 1, Command::Direction(Some(inward)));
        if let GameView::Rumble(reconciler) = &mut view {
            reconciler.set_input(Some(inward));
        }

        for _ in 0..20 {
            room.step();
            view.predict(config.tick_ms());
            for correction in pump(&mut inbox, &mut view) {
                assert_eq!(correction, Correction::Blended);
            }
        }

        match &view {
            GameView::Rumble(reconciler) => {
                let own = reconciler.own_entity().expect("own player missing");
                assert!(own.position.length() < position.length());
                assert!(reconciler.remote_position(BodyKey::Player(2)).is_some());
            }
            GameView::SlimeVolley(_) => unreachable!(),
        }
    }

    /// A kicked player is told why and disappears from everyone's view
    #[test]
    fn host_kick_reaches_both_sides() {
        let (mut room, _) = room();
        let mut host_inbox = join_room(&mut room, 1);
        let mut guest_inbox = join_room(&mut room, 2);
        let mut view = GameView::new(RoomKind::Rumble, 1);

        send(&mut room, 1, Command::KickPlayer(2));
        room.step();

        let kicked = std::iter::from_fn(|| guest_inbox.try_recv().ok())
            .any(|m| matches!(m, ServerMessage::Disconnected { .. }));
        assert!(kicked);

        pump(&mut host_inbox, &mut view);
        assert_eq!(view.describe().len(), 1);
        assert_eq!(view.host_id(), Some(1));
    }
}

/// VOLLEYBALL ROOM AS SEEN BY CLIENTS
mod volley_flow_tests {
    use super::*;

    fn started() -> (Room<VolleyRoom>, Vec<mpsc::Receiver<ServerMessage>>) {
        let config = RoomConfig::for_kind(RoomKind::SlimeVolley);
        let mut room = Room::new("court", VolleyRoom::new(), config);
        let inboxes = vec![join_room(&mut room, 1), join_room(&mut room, 2)];
        send(&mut room, 1, Command::SetReady(true));
        send(&mut room, 2, Command::SetReady(true));
        send(&mut room, 1, Command::Start);
        room.step();
        (room, inboxes)
    }

    #[test]
    fn third_player_rejected_during_match() {
        let (mut room, _inboxes) = started();
        let (outbound, _inbox) = mpsc::channel(8);
        let (respond, mut response) = oneshot::channel();
        room.handle_command(RoomCommand::Join {
            session_id: 3,
            outbound,
            respond,
        });
        let error = response.try_recv().unwrap().unwrap_err();
        assert!(error.is_conflict());
    }

    /// Moving the own slime is predicted and agrees with the server
    #[test]
    fn predicted_slime_follows_server() {
        let (mut room, mut inboxes) = started();
        let config = RoomConfig::for_kind(RoomKind::SlimeVolley);
        let mut view = GameView::new(RoomKind::SlimeVolley, 2);
        pump(&mut inboxes[1], &mut view);
        assert_eq!(view.status(), Some(GameStatus::InGame));

        let start_x = match &view {
            GameView::SlimeVolley(reconciler) => reconciler.own_entity().map(|p| p.position.x),
            GameView::Rumble(_) => None,
        }
        .expect("own slime missing");

        send(&mut room, 2, Command::Move(1));
        if let GameView::SlimeVolley(reconciler) = &mut view {
            reconciler.input_mut().move_direction = 1;
        }

        for _ in 0..10 {
            room.step();
            view.predict(config.tick_ms());
            for correction in pump(&mut inboxes[1], &mut view) {
                assert_ne!(correction, Correction::Snapped);
            }
        }

        match &view {
            GameView::SlimeVolley(reconciler) => {
                let own = reconciler.own_entity().expect("own slime missing");
                assert!(own.position.x > start_x);
                assert!(reconciler.remote_position(BodyKey::Ball).is_some());
                assert!(reconciler.remote_position(BodyKey::Player(1)).is_some());
            }
            GameView::Rumble(_) => unreachable!(),
        }
    }

    #[test]
    fn leaving_mid_match_ends_it_after_grace() {
        let (mut room, mut inboxes) = started();
        let outbound = room.sessions().outbound(2).cloned().unwrap();
        room.handle_command(RoomCommand::Leave {
            session_id: 2,
            outbound,
        });

        // Two seconds of grace at 60 Hz, plus slack
        for _ in 0..130 {
            room.step();
        }

        match last_snapshot(&mut inboxes[0]) {
            Some(RoomSnapshot::SlimeVolley(snapshot)) => {
                assert_eq!(snapshot.state, GameStatus::GameOver);
                assert_eq!(snapshot.players.len(), 1);
            }
            other => panic!("Expected volleyball snapshot, got {:?}", other),
        }
    }
}

/// END-TO-END OVER WEBSOCKET
mod websocket_tests {
    use super::*;

    async fn start_server() -> String {
        let config = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        };
        let server = Server::new(config).await.expect("failed to bind");
        let addr = server.local_addr().expect("no local address");
        tokio::spawn(server.run());
        format!("ws://{}", addr)
    }

    async fn wait_for_status(connection: &mut Connection, status: GameStatus) -> RoomSnapshot {
        loop {
            let message = timeout(Duration::from_secs(5), connection.recv())
                .await
                .expect("timed out waiting for snapshot")
                .expect("connection error")
                .expect("server closed the connection");
            if let ServerMessage::Snapshot { state, .. } = message {
                if state.status() == status {
                    return state;
                }
            }
        }
    }

    #[tokio::test]
    async fn create_join_and_start_over_websocket() {
        let url = start_server().await;

        let mut host = Connection::connect(&url).await.unwrap();
        let created = host.create(RoomKind::SlimeVolley).await.unwrap();
        assert_eq!(created.kind, RoomKind::SlimeVolley);
        let lobby = wait_for_status(&mut host, GameStatus::Lobby).await;
        assert_eq!(lobby.host_id(), Some(created.session_id));

        let mut guest = Connection::connect(&url).await.unwrap();
        let joined = guest.join(&created.room_id).await.unwrap();
        assert_eq!(joined.room_id, created.room_id);
        assert_ne!(joined.session_id, created.session_id);

        host.command(Command::SetReady(true)).await.unwrap();
        guest.command(Command::SetReady(true)).await.unwrap();

        // Readiness travels on separate connections; wait until the host sees both
        loop {
            let state = wait_for_status(&mut host, GameStatus::Lobby).await;
            let all_ready = match &state {
                RoomSnapshot::SlimeVolley(s) => {
                    s.players.len() == 2 && s.players.iter().all(|p| p.is_ready)
                }
                RoomSnapshot::Rumble(_) => false,
            };
            if all_ready {
                break;
            }
        }

        host.command(Command::Start).await.unwrap();
        let started = wait_for_status(&mut host, GameStatus::InGame).await;
        assert_eq!(started.host_id(), Some(created.session_id));

        let mut late = Connection::connect(&url).await.unwrap();
        let error = late.join(&created.room_id).await.unwrap_err();
        assert!(error.is_conflict());
    }

    async fn recv_within(connection: &mut Connection) -> Option<ServerMessage> {
        timeout(Duration::from_secs(5), connection.recv())
            .await
            .expect("timed out waiting for the server")
            .expect("connection error")
    }

    /// A second socket resuming a live session takes it over cleanly
    #[tokio::test]
    async fn reconnect_takes_over_live_session() {
        let url = start_server().await;

        let mut first = Connection::connect(&url).await.unwrap();
        let created = first.create(RoomKind::Rumble).await.unwrap();
        wait_for_status(&mut first, GameStatus::Lobby).await;

        let mut second = Connection::connect(&url).await.unwrap();
        let resumed = second
            .reconnect(&created.room_id, created.session_id)
            .await
            .unwrap();
        assert_eq!(resumed.session_id, created.session_id);

        // The old socket is told why and then closed
        loop {
            match recv_within(&mut first).await {
                Some(ServerMessage::Disconnected { reason }) => {
                    assert!(reason.contains("replaced"));
                    break;
                }
                Some(_) => continue,
                None => panic!("closed without a reason"),
            }
        }

        second
            .command(Command::SetName("back".to_string()))
            .await
            .unwrap();
        loop {
            match recv_within(&mut second).await {
                Some(ServerMessage::Snapshot {
                    state: RoomSnapshot::Rumble(snapshot),
                    ..
                }) => {
                    if snapshot.players.iter().any(|p| p.name == "back") {
                        assert_eq!(snapshot.host_id, Some(created.session_id));
                        break;
                    }
                }
                Some(ServerMessage::Disconnected { reason }) => {
                    panic!("new connection dropped: {}", reason)
                }
                Some(_) => continue,
                None => panic!("new connection closed by server"),
            }
        }
    }

    #[tokio::test]
    async fn unknown_room_and_kind_rejected() {
        let url = start_server().await;
        let mut connection = Connection::connect(&url).await.unwrap();

        match connection.join("nosuchroom").await {
            Err(ClientError::Rejected { code, .. }) => assert_eq!(code, 404),
            other => panic!("Expected rejection, got {:?}", other),
        }

        // The connection stays usable after a rejection
        let created = connection.create(RoomKind::Rumble).await.unwrap();
        assert_eq!(created.kind, RoomKind::Rumble);
    }
}
