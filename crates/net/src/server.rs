//! TCP server for the realtime portal
//!
//! Each connection authenticates with a `hello` frame, then gets a reader
//! loop that handles its events in order and a writer task fed by a bounded
//! channel. Core operations run against the shared store and hand back
//! effects; this module applies them to the room registry and peer table.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use guide_core::dispatch::{self, Caller};
use guide_core::storage::{AuditRepository, IdentityRepository, NotificationRepository};
use guide_core::{
    ClientEvent, ConnectionId, Database, Effect, Effects, Identity, RoomRegistry, ServerEvent,
    UserId,
};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::decode_client_event;

/// How long a new connection has to send its `hello`
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a closing connection waits for its queued events to flush
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for a running server
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Live connections accepted before new ones are turned away
    pub max_connections: usize,
    /// Outbound events queued per connection before fan-out drops them
    pub outbound_buffer: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_connections: 256,
            outbound_buffer: 64,
        }
    }
}

/// Connected peer state
struct Peer {
    user_id: UserId,
    tx: mpsc::Sender<ServerEvent>,
}

/// Routing state shared across tasks
#[derive(Default)]
struct ServerState {
    peers: HashMap<ConnectionId, Peer>,
    rooms: RoomRegistry,
}

impl ServerState {
    /// Drop a connection and its memberships. Returns whether it was the
    /// user's last live connection.
    fn release(&mut self, connection: ConnectionId, user_id: UserId) -> bool {
        self.peers.remove(&connection);
        let left = self.rooms.leave_all(connection);
        debug!(connection = %connection, rooms = left.len(), "Dropped memberships");
        !self.peers.values().any(|peer| peer.user_id == user_id)
    }
}

struct Shared {
    state: RwLock<ServerState>,
    store: Mutex<Database>,
    options: ServerOptions,
}

impl Shared {
    fn store(&self) -> MutexGuard<'_, Database> {
        // A handler that panicked mid-call leaves rows consistent; SQLite
        // statements are atomic on their own.
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Realtime server handle
pub struct Server {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind and start accepting connections
    pub async fn start(addr: SocketAddr, store: Database, options: ServerOptions) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(
            addr = %bound_addr,
            max_connections = options.max_connections,
            "Server started"
        );

        let (shutdown_tx, _) = broadcast::channel(1);
        let shared = Arc::new(Shared {
            state: RwLock::new(ServerState::default()),
            store: Mutex::new(store),
            options,
        });

        tokio::spawn(accept_loop(
            listener,
            shared.clone(),
            shutdown_tx.clone(),
        ));

        Ok(Server {
            addr: bound_addr,
            shared,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of authenticated connections
    pub async fn connection_count(&self) -> usize {
        self.shared.state.read().await.peers.len()
    }

    /// Distinct users with at least one live connection
    pub async fn online_users(&self) -> Vec<UserId> {
        let state = self.shared.state.read().await;
        let mut users: Vec<UserId> = state.peers.values().map(|peer| peer.user_id).collect();
        users.sort_by_key(|id| id.0);
        users.dedup();
        users
    }

    /// Stop accepting and close every connection
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            shared.clone(),
                            shutdown_tx.subscribe(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Turn a connection away with a single error frame
async fn reject(mut writer: WriteHalf<TcpStream>, addr: SocketAddr, err: &Error) {
    warn!(addr = %addr, error = %err, "Connection rejected");
    let message = match err {
        Error::Core(core) => core.client_message(),
        other => other.to_string(),
    };
    let _ = write_frame(&mut writer, &ServerEvent::error(message)).await;
}

/// Handle a single client connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut reader, writer) = tokio::io::split(stream);

    let identity = match handshake(&mut reader, &shared).await {
        Ok(identity) => identity,
        Err(e) => {
            reject(writer, addr, &e).await;
            return;
        }
    };

    let caller = Caller::new(ConnectionId::new(), identity);
    let (tx, rx) = mpsc::channel(shared.options.outbound_buffer);
    if let Err(e) = register(&shared, &caller, tx).await {
        reject(writer, addr, &e).await;
        return;
    }

    info!(
        addr = %addr,
        connection = %caller.connection,
        user_id = %caller.identity.id,
        role = %caller.identity.role,
        "Peer connected"
    );

    let writer_handle = tokio::spawn(writer_task(writer, rx));

    let effects = {
        let store = shared.store();
        dispatch::on_connect(&*store, &caller)
    };
    apply_effects(&shared, &caller, effects).await;

    loop {
        tokio::select! {
            result = read_frame(&mut reader) => {
                match result {
                    Ok(payload) => handle_payload(&shared, &caller, &payload).await,
                    Err(Error::ConnectionClosed) => {
                        debug!(connection = %caller.connection, "Connection closed");
                        break;
                    }
                    Err(e) => {
                        warn!(connection = %caller.connection, error = %e, "Read error");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!(connection = %caller.connection, "Closing for shutdown");
                break;
            }
        }
    }

    // Removing the peer drops the last sender; the writer flushes what is
    // queued and exits.
    disconnect(&shared, &caller).await;
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer_handle).await.is_err() {
        debug!(connection = %caller.connection, "Writer still draining");
    }

    info!(connection = %caller.connection, user_id = %caller.identity.id, "Peer disconnected");
}

/// First frame must be `hello` with a token the directory recognizes
async fn handshake<R: AsyncRead + Unpin>(
    reader: &mut R,
    shared: &Shared,
) -> Result<Identity> {
    let payload = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_frame(reader))
        .await
        .map_err(|_| Error::Rejected("Handshake timed out".into()))??;

    let token = match decode_client_event(&payload)? {
        ClientEvent::Hello { token } => token,
        _ => return Err(Error::Protocol("Expected hello".into())),
    };

    let identity = shared.store().resolve_token(&token)?;
    identity.ok_or(Error::Core(guide_core::Error::AuthenticationRequired))
}

async fn register(
    shared: &Shared,
    caller: &Caller,
    tx: mpsc::Sender<ServerEvent>,
) -> Result<()> {
    let mut state = shared.state.write().await;
    if state.peers.len() >= shared.options.max_connections {
        return Err(Error::ServerFull);
    }
    state.peers.insert(
        caller.connection,
        Peer {
            user_id: caller.identity.id,
            tx,
        },
    );
    Ok(())
}

async fn handle_payload(shared: &Shared, caller: &Caller, payload: &[u8]) {
    let event = match decode_client_event(payload) {
        Ok(event) => event,
        Err(e) => {
            debug!(connection = %caller.connection, error = %e, "Malformed event");
            send_to(shared, caller.connection, ServerEvent::error(e.to_string())).await;
            return;
        }
    };

    let effects = {
        let state = shared.state.read().await;
        let store = shared.store();
        dispatch::handle_event(&*store, &state.rooms, caller, event)
    };
    apply_effects(shared, caller, effects).await;
}

async fn disconnect(shared: &Shared, caller: &Caller) {
    // Held across the offline write so a concurrent close or reconnect of
    // the same user sees either all of this or none of it.
    let effects = {
        let mut state = shared.state.write().await;
        let last_connection = state.release(caller.connection, caller.identity.id);
        let store = shared.store();
        dispatch::on_disconnect(&*store, caller, last_connection)
    };
    let effects = match effects {
        Ok(effects) => effects,
        Err(e) => {
            error!(connection = %caller.connection, error = %e, "Disconnect bookkeeping failed");
            Vec::new()
        }
    };

    apply_effects(shared, caller, effects).await;
}

/// Queue an event for one connection. A full queue drops the event.
fn deliver(peer: &Peer, connection: ConnectionId, event: ServerEvent) {
    if let Err(e) = peer.tx.try_send(event) {
        debug!(connection = %connection, error = %e, "Dropped outbound event");
    }
}

async fn send_to(shared: &Shared, connection: ConnectionId, event: ServerEvent) {
    let state = shared.state.read().await;
    if let Some(peer) = state.peers.get(&connection) {
        deliver(peer, connection, event);
    }
}

/// Apply effects in order on behalf of `caller`
async fn apply_effects(shared: &Shared, caller: &Caller, effects: Effects) {
    for effect in effects {
        match effect {
            Effect::Emit {
                rooms,
                event,
                except,
            } => {
                let state = shared.state.read().await;
                let audience = state.rooms.audience(&rooms, except);
                debug!(event = event.name(), recipients = audience.len(), "Emit");
                for connection in audience {
                    if let Some(peer) = state.peers.get(&connection) {
                        deliver(peer, connection, event.clone());
                    }
                }
            }
            Effect::Reply(event) => send_to(shared, caller.connection, event).await,
            Effect::Join(room) => {
                let mut state = shared.state.write().await;
                // A connection that already went away must not reappear
                if state.peers.contains_key(&caller.connection)
                    && state.rooms.join(caller.connection, room)
                {
                    debug!(connection = %caller.connection, room = %room, "Joined room");
                }
            }
            Effect::Leave(room) => {
                let mut state = shared.state.write().await;
                if state.rooms.leave(caller.connection, room) {
                    debug!(connection = %caller.connection, room = %room, "Left room");
                }
            }
            Effect::Notify(notification) => {
                let stored = shared.store().create_notification(&notification);
                if let Err(e) = stored {
                    warn!(
                        recipient = %notification.recipient_id,
                        error = %e,
                        "Failed to store notification"
                    );
                }
            }
            Effect::Audit(entry) => {
                let recorded = shared.store().record_audit(&entry);
                if let Err(e) = recorded {
                    warn!(action = %entry.action, error = %e, "Failed to record audit entry");
                }
            }
        }
    }
}

/// Writer task - sends events to the client
async fn writer_task<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::Receiver<ServerEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &event).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}
