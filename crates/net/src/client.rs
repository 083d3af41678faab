//! TCP client for the realtime server
//!
//! Used by integration tests and tooling. Performs the `hello` handshake,
//! then hands server events out through a channel.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use guide_core::{ClientEvent, ConnectionId, RoomKey, ServerEvent, UserId};

use crate::error::{Error, Result};
use crate::frame::{read_json, write_frame};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Client handle for network operations
pub struct Client {
    connection_id: ConnectionId,
    user_id: UserId,
    rooms: Vec<RoomKey>,
    state: Arc<RwLock<ConnectionState>>,
    event_rx: mpsc::Receiver<ServerEvent>,
    cmd_tx: mpsc::Sender<ClientCommand>,
}

enum ClientCommand {
    Send(ClientEvent),
    Disconnect,
}

impl Client {
    /// Connect and authenticate with an access token
    pub async fn connect(addr: SocketAddr, token: &str) -> Result<Self> {
        info!(addr = %addr, "Connecting to server");

        let stream = TcpStream::connect(addr).await?;
        let (mut reader, mut writer) = tokio::io::split(stream);

        let hello = ClientEvent::Hello {
            token: token.to_string(),
        };
        write_frame(&mut writer, &hello).await?;

        let (connection_id, user_id, rooms) = match read_json(&mut reader).await? {
            ServerEvent::Welcome {
                connection_id,
                user_id,
                rooms,
            } => (connection_id, user_id, rooms),
            ServerEvent::Error { message } => {
                warn!(reason = %message, "Handshake rejected");
                return Err(Error::Rejected(message));
            }
            other => {
                return Err(Error::Protocol(format!(
                    "Expected welcome, got {}",
                    other.name()
                )))
            }
        };
        info!(connection = %connection_id, user_id = %user_id, "Connected");

        let state = Arc::new(RwLock::new(ConnectionState::Connected));
        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        tokio::spawn(connection_task(
            reader,
            writer,
            state.clone(),
            event_tx,
            cmd_rx,
        ));

        Ok(Client {
            connection_id,
            user_id,
            rooms,
            state,
            event_rx,
            cmd_tx,
        })
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Rooms joined automatically at handshake
    pub fn rooms(&self) -> &[RoomKey] {
        &self.rooms
    }

    /// Get the next server event
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.event_rx.recv().await
    }

    /// Send an event to the server
    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        self.cmd_tx
            .send(ClientCommand::Send(event))
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// Disconnect from the server
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Disconnect).await;
    }

    /// Get current connection state
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }
}

/// Main connection task
async fn connection_task(
    mut reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    state: Arc<RwLock<ConnectionState>>,
    event_tx: mpsc::Sender<ServerEvent>,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
) {
    loop {
        tokio::select! {
            result = read_json::<_, ServerEvent>(&mut reader) => {
                match result {
                    Ok(event) => {
                        if event_tx.send(event).await.is_err() {
                            debug!("Client handle dropped");
                            break;
                        }
                    }
                    Err(Error::ConnectionClosed) => {
                        debug!("Server closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Read error");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(event)) => {
                        if let Err(e) = write_frame(&mut writer, &event).await {
                            warn!(error = %e, "Write error");
                            break;
                        }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        debug!("Disconnect requested");
                        break;
                    }
                }
            }
        }
    }

    *state.write().await = ConnectionState::Disconnected;
    info!("Disconnected from server");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{Server, ServerOptions};
    use guide_core::{Database, Identity, OfficeId};
    use std::time::Duration;

    #[tokio::test]
    async fn test_client_connect_and_disconnect() {
        let db = Database::open_in_memory().unwrap();
        db.users()
            .create(&Identity::office_admin(UserId(20), OfficeId(7), "Cora"))
            .unwrap();
        db.users().issue_token("tok-cora", UserId(20)).unwrap();

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = Server::start(addr, db, ServerOptions::default()).await.unwrap();

        let client = Client::connect(server.addr(), "tok-cora").await.unwrap();
        assert_eq!(client.user_id(), UserId(20));
        assert_eq!(
            client.rooms(),
            &[RoomKey::User(UserId(20)), RoomKey::Office(OfficeId(7))]
        );
        assert_eq!(client.connection_state().await, ConnectionState::Connected);

        client.disconnect().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);

        server.shutdown();
    }
}
