use crate::error::ClientError;
use crate::game::{Correction, GameView};
use crate::input::{parse_line, LineInput};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::protocol::{decode, encode};
use shared::{ClientMessage, Command, GameStatus, RoomKind, ServerMessage, SessionId};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{interval, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Local prediction step, matching the default server tick.
pub const FRAME_MS: f32 = 1000.0 / 60.0;

/// Result of a successful create, join or reconnect
#[derive(Debug, Clone, PartialEq)]
pub struct Joined {
    pub room_id: String,
    pub session_id: SessionId,
    pub kind: RoomKind,
}

/// A WebSocket link to the room server
pub struct Connection {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    fake_ping_ms: u64,
}

impl Connection {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (stream, _) = connect_async(url).await?;
        let (write, read) = stream.split();
        info!("Connected to {}", url);

        Ok(Self {
            write,
            read,
            fake_ping_ms: 0,
        })
    }

    /// Delays every outgoing frame by half of `ms` to simulate latency.
    pub fn set_fake_ping(&mut self, ms: u64) {
        self.fake_ping_ms = ms;
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = encode(message)?;
        self.write.send(Message::Binary(data)).await?;
        Ok(())
    }

    pub async fn command(&mut self, command: Command) -> Result<(), ClientError> {
        self.send(&ClientMessage::Command(command)).await
    }

    /// Next server message, or `None` once the server closed the socket.
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>, ClientError> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Binary(data))) => match decode::<ServerMessage>(&data) {
                    Ok(message) => return Ok(Some(message)),
                    Err(e) => warn!("Dropping malformed frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    pub async fn create(&mut self, kind: RoomKind) -> Result<Joined, ClientError> {
        self.send(&ClientMessage::Create {
            kind: kind.to_string(),
        })
        .await?;
        self.await_joined().await
    }

    pub async fn join(&mut self, room_id: &str) -> Result<Joined, ClientError> {
        self.send(&ClientMessage::Join {
            room_id: room_id.to_string(),
        })
        .await?;
        self.await_joined().await
    }

    pub async fn reconnect(
        &mut self,
        room_id: &str,
        session_id: SessionId,
    ) -> Result<Joined, ClientError> {
        self.send(&ClientMessage::Reconnect {
            room_id: room_id.to_string(),
            session_id,
        })
        .await?;
        self.await_joined().await
    }

    async fn await_joined(&mut self) -> Result<Joined, ClientError> {
        loop {
            match self.recv().await? {
                Some(ServerMessage::Joined {
                    room_id,
                    session_id,
                    kind,
                }) => {
                    return Ok(Joined {
                        room_id,
                        session_id,
                        kind,
                    })
                }
                Some(ServerMessage::JoinRejected { code, reason }) => {
                    return Err(ClientError::Rejected { code, reason })
                }
                Some(ServerMessage::Disconnected { reason }) => {
                    return Err(ClientError::Disconnected(reason))
                }
                Some(ServerMessage::Snapshot { .. }) => continue,
                None => return Err(ClientError::Closed),
            }
        }
    }

    /// Leaves the room and closes the socket.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::Leave).await?;
        self.write.close().await?;
        Ok(())
    }
}

/// Headless client: mirrors one room and forwards typed commands
pub struct Client {
    connection: Connection,
    joined: Joined,
    view: GameView,
    last_status: Option<GameStatus>,
    last_host: Option<SessionId>,
    prediction_enabled: bool,
    interpolation_enabled: bool,
}

impl Client {
    pub fn new(connection: Connection, joined: Joined) -> Self {
        let view = GameView::new(joined.kind, joined.session_id);
        Self {
            connection,
            joined,
            view,
            last_status: None,
            last_host: None,
            prediction_enabled: true,
            interpolation_enabled: true,
        }
    }

    pub fn joined(&self) -> &Joined {
        &self.joined
    }

    pub fn view(&self) -> &GameView {
        &self.view
    }

    pub async fn command(&mut self, command: Command) -> Result<(), ClientError> {
        self.apply_local_input(&command);
        self.connection.command(command).await
    }

    pub async fn run(mut self) -> Result<(), ClientError> {
        let mut frame_interval = interval(Duration::from_secs_f32(FRAME_MS / 1000.0));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        loop {
            tokio::select! {
                message = self.connection.recv() => {
                    match message? {
                        Some(message) => {
                            if !self.handle_message(message) {
                                return Ok(());
                            }
                        }
                        None => {
                            warn!("Server closed the connection");
                            return Ok(());
                        }
                    }
                },

                _ = frame_interval.tick() => {
                    self.view.predict(FRAME_MS);
                },

                line = lines.next_line(), if stdin_open => {
                    match line? {
                        Some(line) => {
                            if !self.handle_line(&line).await? {
                                break;
                            }
                        }
                        None => stdin_open = false,
                    }
                },
            }
        }

        self.connection.close().await
    }

    /// Returns false when the session is over.
    fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Snapshot { tick, state } => {
                let status = state.status();
                let host = state.host_id();

                match self.view.apply_snapshot(tick, state) {
                    Correction::Snapped => debug!("Tick {}: own entity snapped", tick),
                    Correction::Blended | Correction::None => {}
                }

                if self.last_status != Some(status) {
                    info!("Room {} is now {:?}", self.joined.room_id, status);
                    self.last_status = Some(status);
                }
                if self.last_host != host {
                    if host == Some(self.joined.session_id) {
                        info!("You are the host");
                    } else if let Some(host) = host {
                        info!("Host is now {}", host);
                    }
                    self.last_host = host;
                }
            }

            ServerMessage::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                return false;
            }

            ServerMessage::Joined { room_id, .. } => {
                warn!("Unexpected join confirmation for {}", room_id);
            }

            ServerMessage::JoinRejected { code, reason } => {
                warn!("Unexpected rejection ({}): {}", code, reason);
            }
        }
        true
    }

    /// Returns false when the user asked to quit.
    async fn handle_line(&mut self, line: &str) -> Result<bool, ClientError> {
        match parse_line(self.view.kind(), line) {
            Some(LineInput::Send(command)) => self.command(command).await?,
            Some(LineInput::Status) => {
                info!(
                    "Room {} ({}), session {}",
                    self.joined.room_id, self.joined.kind, self.joined.session_id
                );
                for line in self.view.describe() {
                    info!("{}", line);
                }
            }
            Some(LineInput::TogglePrediction) => {
                self.prediction_enabled = !self.prediction_enabled;
                self.view.set_prediction(self.prediction_enabled);
                info!("Client-side prediction: {}", self.prediction_enabled);
            }
            Some(LineInput::ToggleInterpolation) => {
                self.interpolation_enabled = !self.interpolation_enabled;
                self.view.set_interpolation(self.interpolation_enabled);
                info!("Interpolation: {}", self.interpolation_enabled);
            }
            Some(LineInput::Quit) => return Ok(false),
            None => {
                if !line.trim().is_empty() {
                    warn!("Unknown command: {}", line.trim());
                }
            }
        }
        Ok(true)
    }

    fn apply_local_input(&mut self, command: &Command) {
        match (&mut self.view, command) {
            (GameView::Rumble(view), Command::Direction(angle)) => view.set_input(*angle),
            (GameView::SlimeVolley(view), Command::Move(direction)) => {
                view.input_mut().move_direction = *direction
            }
            (GameView::SlimeVolley(view), Command::Jump) => view.input_mut().jump = true,
            _ => {}
        }
    }
}
