//! Server network layer: WebSocket connections, handshakes and frame routing

use crate::config::ServerConfig;
use crate::error::{JoinError, ServerError};
use crate::room::{RoomCommand, RoomHandle, RoomRegistry};
use crate::session_manager::Outbound;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::protocol::{decode, encode};
use shared::{ClientMessage, RoomKind, ServerMessage, SessionId};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type WsWriter = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsReader = SplitStream<WebSocketStream<TcpStream>>;

/// Accepts connections and hands each one to its room
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    rooms: RoomRegistry,
    next_session_id: Arc<AtomicU32>,
    connections: Arc<Semaphore>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            connections: Arc::new(Semaphore::new(config.max_clients)),
            config,
            rooms: RoomRegistry::new(),
            next_session_id: Arc::new(AtomicU32::new(1)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Accept loop. Runs until the process exits.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(
            "Server started: {} Hz, up to {} clients",
            self.config.tick_rate_hz, self.config.max_clients
        );

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let Ok(permit) = Arc::clone(&self.connections).try_acquire_owned() else {
                warn!("Server full, refusing {}", addr);
                tokio::spawn(refuse(stream, addr));
                continue;
            };

            let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
            let connection = Connection {
                addr,
                session_id,
                rooms: self.rooms.clone(),
                config: self.config.clone(),
            };

            tokio::spawn(async move {
                if let Err(e) = connection.run(stream).await {
                    match e {
                        ServerError::HandshakeAborted => debug!("{}: {}", addr, e),
                        other => warn!("Connection {} ended with error: {}", addr, other),
                    }
                }
                drop(permit);
            });
        }
    }
}

async fn refuse(stream: TcpStream, addr: SocketAddr) {
    let result: Result<(), ServerError> = async {
        let mut ws = accept_async(stream).await?;
        let bytes = encode(&ServerMessage::Disconnected {
            reason: "server full".to_string(),
        })?;
        ws.send(Message::Binary(bytes)).await?;
        ws.close(None).await?;
        Ok(())
    }
    .await;

    if let Err(e) = result {
        debug!("Failed to refuse {}: {}", addr, e);
    }
}

/// One client connection from handshake to close
struct Connection {
    addr: SocketAddr,
    /// Id this connection gets if it creates or joins a room.
    session_id: SessionId,
    rooms: RoomRegistry,
    config: ServerConfig,
}

impl Connection {
    async fn run(self, stream: TcpStream) -> Result<(), ServerError> {
        let ws = accept_async(stream).await?;
        info!("Client {} connected", self.addr);
        let (mut write, mut read) = ws.split();

        let (outbound, inbox) = mpsc::channel(self.config.outbound_queue.max(1));

        let (room, session_id) = self.handshake(&mut write, &mut read, &outbound).await?;
        // The room holds the only strong sender from here on; the weak one
        // identifies this connection when it leaves
        let identity = outbound.downgrade();
        drop(outbound);
        info!(
            "Client {} is session {} in room {}",
            self.addr, session_id, room.id
        );

        let result = forward(session_id, &room, &mut write, &mut read, inbox).await;

        // A connection that was replaced or kicked has no queue left in the room
        if let Some(outbound) = identity.upgrade() {
            room.send(RoomCommand::Leave {
                session_id,
                outbound,
            })
            .await;
        }
        let _ = write.close().await;
        info!("Session {} disconnected", session_id);
        result
    }

    /// Waits for a create, join or reconnect request that succeeds.
    /// Rejections are reported and the client may try again.
    async fn handshake(
        &self,
        write: &mut WsWriter,
        read: &mut WsReader,
        outbound: &Outbound,
    ) -> Result<(RoomHandle, SessionId), ServerError> {
        loop {
            let data = match read.next().await {
                Some(Ok(Message::Binary(data))) => data,
                Some(Ok(Message::Close(_))) | None => return Err(ServerError::HandshakeAborted),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };

            let request: ClientMessage = match decode(&data) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Malformed handshake frame from {}: {}", self.addr, e);
                    continue;
                }
            };

            match self.attach(request, outbound.clone()).await {
                Ok(Some(joined)) => return Ok(joined),
                Ok(None) => {
                    warn!("{}: {}", self.addr, ServerError::UnexpectedHandshake);
                }
                Err(e) => {
                    info!("Join from {} rejected: {}", self.addr, e);
                    let rejection = ServerMessage::JoinRejected {
                        code: e.code(),
                        reason: e.to_string(),
                    };
                    write.send(Message::Binary(encode(&rejection)?)).await?;
                }
            }
        }
    }

    /// Routes one handshake request. `Ok(None)` means it was not a join request.
    async fn attach(
        &self,
        request: ClientMessage,
        outbound: Outbound,
    ) -> Result<Option<(RoomHandle, SessionId)>, JoinError> {
        match request {
            ClientMessage::Create { kind } => {
                let kind: RoomKind = kind
                    .parse()
                    .map_err(|_| JoinError::UnknownKind(kind.clone()))?;
                let room = self
                    .rooms
                    .create(kind, self.config.room_config(kind))
                    .await;
                room.join(self.session_id, outbound).await?;
                Ok(Some((room, self.session_id)))
            }
            ClientMessage::Join { room_id } => {
                let room = self.find(&room_id).await?;
                room.join(self.session_id, outbound).await?;
                Ok(Some((room, self.session_id)))
            }
            ClientMessage::Reconnect {
                room_id,
                session_id,
            } => {
                let room = self.find(&room_id).await?;
                room.reconnect(session_id, outbound).await?;
                Ok(Some((room, session_id)))
            }
            ClientMessage::Command(_) | ClientMessage::Leave => Ok(None),
        }
    }

    async fn find(&self, room_id: &str) -> Result<RoomHandle, JoinError> {
        self.rooms
            .get(room_id)
            .await
            .ok_or_else(|| JoinError::RoomNotFound(room_id.to_string()))
    }
}

/// Pumps frames both ways until either side goes away.
async fn forward(
    session_id: SessionId,
    room: &RoomHandle,
    write: &mut WsWriter,
    read: &mut WsReader,
    mut inbox: mpsc::Receiver<ServerMessage>,
) -> Result<(), ServerError> {
    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Binary(data))) => match decode::<ClientMessage>(&data) {
                        Ok(ClientMessage::Command(command)) => {
                            let delivered = room
                                .send(RoomCommand::Message { session_id, command })
                                .await;
                            if !delivered {
                                return Ok(());
                            }
                        }
                        Ok(ClientMessage::Leave) => {
                            info!("Session {} left", session_id);
                            return Ok(());
                        }
                        Ok(other) => {
                            warn!("Session {} sent {:?} after joining", session_id, other);
                        }
                        Err(e) => {
                            warn!("Malformed frame from session {}: {}", session_id, e);
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                }
            },
            message = inbox.recv() => {
                // The room dropped our queue: kicked or closed
                let Some(message) = message else {
                    return Ok(());
                };
                let closing = matches!(message, ServerMessage::Disconnected { .. });
                write.send(Message::Binary(encode(&message)?)).await?;
                if closing {
                    return Ok(());
                }
            },
        }
    }
}
