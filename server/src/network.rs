//! WebSocket layer: handshake routing plus one reader and one writer task per player

use crate::config::ServerConfig;
use crate::hub::{Hub, HubHandle, Player, PlayerId};
use crate::session::{RoundSummary, Session};
use crate::store::TaskSource;
use crate::token::TokenCodec;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ServerMessage, CLOSE_BAD_REQUEST, CLOSE_GAME_NOT_FOUND};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, timeout};
use tokio_tungstenite::tungstenite::handshake::server::{Request as WsRequest, Response as WsResponse};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{accept_hdr_async_with_config, tungstenite::Message, WebSocketStream};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Extracts the game token from `/play/<token>/wire`.
fn parse_route(path: &str) -> Option<&str> {
    let token = path.strip_prefix("/play/")?.strip_suffix("/wire")?;
    (!token.is_empty() && !token.contains('/')).then_some(token)
}

/// Reads the `player` query parameter, decoded and sanitized.
fn player_name(query: &str) -> Option<String> {
    let raw = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("player="))?;
    let spaced = raw.replace('+', " ");
    let decoded = urlencoding::decode(&spaced).ok()?;
    let name = sanitize_name(&decoded);
    (!name.is_empty()).then_some(name)
}

/// Drops anything that looks like markup and trims surrounding whitespace.
fn sanitize_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => name.push(c),
            _ => {}
        }
    }
    name.trim().to_string()
}

fn close_frame(code: u16, reason: impl Into<String>) -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into().into(),
    }
}

/// State every connection task needs
#[derive(Clone)]
struct Shared {
    config: Arc<ServerConfig>,
    source: Arc<dyn TaskSource>,
    codec: Arc<TokenCodec>,
    hub: HubHandle,
    next_id: Arc<AtomicU64>,
}

/// A registered connection, as seen by its reader task
struct Peer {
    id: PlayerId,
    name: String,
    is_author: bool,
    game_id: u64,
    session: Arc<Session>,
    hub: HubHandle,
}

/// Accepts WebSocket connections and wires them to the hub
pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    source: Arc<dyn TaskSource>,
    codec: Arc<TokenCodec>,
}

impl Server {
    pub async fn new(config: ServerConfig, source: Arc<dyn TaskSource>) -> Result<Self, BoxError> {
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let codec = Arc::new(TokenCodec::new(&config.secret_key));
        Ok(Server {
            listener,
            config: Arc::new(config),
            source,
            codec,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Codec the server uses to resolve game tokens
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Starts the hub and serves connections until the listener fails.
    pub async fn run(self) -> Result<(), BoxError> {
        let (hub, handle) = Hub::new(Arc::clone(&self.source), self.config.close_grace);
        tokio::spawn(hub.run());

        let shared = Shared {
            config: self.config,
            source: self.source,
            codec: self.codec,
            hub: handle,
            next_id: Arc::new(AtomicU64::new(1)),
        };

        info!("Server started successfully");

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    continue;
                }
            };

            let shared = shared.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, shared).await {
                    warn!("Connection from {} failed: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, shared: Shared) -> Result<(), BoxError> {
    // Capture the request target from the handshake
    let target = Arc::new(StdMutex::new((String::new(), None::<String>)));
    let captured = Arc::clone(&target);

    // Oversized messages are refused before they are buffered
    let limits = WebSocketConfig {
        max_message_size: Some(shared.config.max_message_size),
        max_frame_size: Some(shared.config.max_message_size),
        ..WebSocketConfig::default()
    };

    let ws_stream = accept_hdr_async_with_config(
        stream,
        move |req: &WsRequest, resp: WsResponse| {
            if let Ok(mut target) = captured.lock() {
                *target = (
                    req.uri().path().to_string(),
                    req.uri().query().map(str::to_string),
                );
            }
            Ok(resp)
        },
        Some(limits),
    )
    .await?;

    let (path, query) = target
        .lock()
        .map(|target| target.clone())
        .unwrap_or_default();
    let (mut ws_tx, ws_rx) = ws_stream.split();

    let Some(token) = parse_route(&path) else {
        warn!("Invalid WebSocket URL {} from {}", path, addr);
        ws_tx
            .send(Message::Close(Some(close_frame(
                CLOSE_BAD_REQUEST,
                "Invalid URL. Use /play/<token>/wire",
            ))))
            .await?;
        return Ok(());
    };

    let Some(game) = shared
        .codec
        .decode(token)
        .and_then(|id| shared.source.game(id))
    else {
        warn!("Unknown game token {:?} from {}", token, addr);
        ws_tx
            .send(Message::Close(Some(close_frame(
                CLOSE_GAME_NOT_FOUND,
                format!("Game not found: {}", token),
            ))))
            .await?;
        return Ok(());
    };

    let Some(name) = query.as_deref().and_then(player_name) else {
        warn!("Connection from {} to game {} has no player name", addr, game.id);
        ws_tx
            .send(Message::Close(Some(close_frame(
                CLOSE_BAD_REQUEST,
                "Missing player name",
            ))))
            .await?;
        return Ok(());
    };

    info!("{} connected from {} to game {}", name, addr, game.id);

    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    let (sender, receiver) = mpsc::channel(shared.config.outbound_capacity);
    let writer = tokio::spawn(write_loop(
        ws_tx,
        receiver,
        Arc::clone(&shared.config),
        name.clone(),
    ));

    let player = Player::new(id, name.clone(), Arc::clone(&game), sender);
    let is_author = player.is_author;

    match shared.hub.register(player).await {
        Ok(session) => {
            let peer = Peer {
                id,
                name: name.clone(),
                is_author,
                game_id: game.id,
                session,
                hub: shared.hub.clone(),
            };
            serve_peer(ws_rx, &peer, &shared.config, writer).await?;
        }
        // The hub sent a rejection and will close the queue after the grace period
        Err(_) => {
            debug!("{} was turned away from game {}", name, game.id);
            writer.await?;
        }
    }

    info!("{} disconnected from {}", name, addr);
    Ok(())
}

/// Runs the reader until either side of the connection stops, then unregisters.
///
/// A writer that stops first (queue closed by the hub, failed or timed out
/// write) ends the reader too, so a dropped player can no longer act.
async fn serve_peer<S>(
    ws_rx: S,
    peer: &Peer,
    config: &ServerConfig,
    mut writer: JoinHandle<()>,
) -> Result<(), JoinError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let writer_done = tokio::select! {
        result = read_loop(ws_rx, peer, config) => {
            if let Err(e) = result {
                warn!("Dropping {}: {}", peer.name, e);
            }
            false
        }
        _ = &mut writer => {
            info!("Connection of {} lost its writer, closing", peer.name);
            true
        }
    };

    peer.hub.unregister(peer.id);
    if !writer_done {
        writer.await?;
    }
    Ok(())
}

/// Decodes inbound frames until the peer leaves or breaks the protocol.
async fn read_loop<S>(mut ws_rx: S, peer: &Peer, config: &ServerConfig) -> Result<(), BoxError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let frame = match timeout(config.pong_timeout, ws_rx.next()).await {
            Ok(Some(frame)) => frame?,
            Ok(None) => return Ok(()),
            Err(_) => return Err(format!("no traffic for {:?}", config.pong_timeout).into()),
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => return Ok(()),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            Message::Binary(_) => return Err("binary frames are not part of the protocol".into()),
        };

        if text.len() > config.max_message_size {
            return Err(format!(
                "message of {} bytes exceeds the {} byte limit",
                text.len(),
                config.max_message_size
            )
            .into());
        }

        let message: ClientMessage = serde_json::from_str(&text)?;
        dispatch(peer, message).await;
    }
}

async fn dispatch(peer: &Peer, message: ClientMessage) {
    if message.is_author_command() && !peer.is_author {
        debug!("Ignoring {:?} from non-author {}", message, peer.name);
        return;
    }

    let game_id = peer.game_id;
    match message {
        ClientMessage::GameStarted => {
            if let Some(num_tasks) = peer.session.start().await {
                peer.hub.broadcast(game_id, ServerMessage::GameStarted { num_tasks });
            }
        }
        ClientMessage::NextQuestion => {
            let ticks = peer.hub.clone();
            let results = peer.hub.clone();
            let opened = peer
                .session
                .next_task(
                    move |remaining| ticks.broadcast(game_id, ServerMessage::Timer(remaining)),
                    move |summary: &RoundSummary| {
                        results.broadcast(
                            game_id,
                            ServerMessage::TaskFinished {
                                index: summary.index,
                                correct_option: summary.task.correct_option,
                                stats: summary.stats.clone(),
                                leaderboard: summary.leaderboard.clone(),
                            },
                        )
                    },
                )
                .await;

            if let Some((index, task)) = opened {
                peer.hub.broadcast(
                    game_id,
                    ServerMessage::Task {
                        index,
                        question: task.question,
                        options: task.options,
                        time_limit: task.time_limit,
                    },
                );
            }
        }
        ClientMessage::GameFinished => {
            let table = peer.session.finish().await;
            peer.hub
                .broadcast(game_id, ServerMessage::GameFinished(table.leaderboard()));
        }
        ClientMessage::Answer(option) => {
            peer.session.answer(&peer.name, option).await;
        }
    }
}

/// Drains the outbound queue onto the socket and keeps the connection alive.
///
/// Ends with a close frame once the queue has been closed by the hub.
async fn write_loop(
    mut ws_tx: WsSink,
    mut outbound: mpsc::Receiver<ServerMessage>,
    config: Arc<ServerConfig>,
    name: String,
) {
    let mut ping = interval(config.ping_period);
    // Skip the first tick since it fires immediately
    ping.tick().await;

    loop {
        let frame = tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => match serde_json::to_string(&message) {
                    Ok(text) => Message::text(text),
                    Err(e) => {
                        error!("Failed to encode message for {}: {}", name, e);
                        continue;
                    }
                },
                None => {
                    let _ = timeout(config.write_timeout, ws_tx.send(Message::Close(None))).await;
                    break;
                }
            },
            _ = ping.tick() => Message::Ping(Vec::new()),
        };

        match timeout(config.write_timeout, ws_tx.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Write to {} failed: {}", name, e);
                break;
            }
            Err(_) => {
                warn!("Write to {} timed out", name);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Game, MemoryStore, Task};
    use shared::SessionState;

    #[test]
    fn test_parse_route() {
        assert_eq!(parse_route("/play/abc/wire"), Some("abc"));
        assert_eq!(parse_route("/play//wire"), None);
        assert_eq!(parse_route("/play/a/b/wire"), None);
        assert_eq!(parse_route("/play/abc"), None);
        assert_eq!(parse_route("/tasks"), None);
        assert_eq!(parse_route("/"), None);
    }

    #[test]
    fn test_player_name_from_query() {
        assert_eq!(player_name("player=alice"), Some("alice".to_string()));
        assert_eq!(player_name("x=1&player=Big%20Bob"), Some("Big Bob".to_string()));
        assert_eq!(player_name("player=Big+Bob"), Some("Big Bob".to_string()));
        assert_eq!(player_name("player=%20%20"), None);
        assert_eq!(player_name("player="), None);
        assert_eq!(player_name("name=alice"), None);
    }

    #[test]
    fn test_sanitize_name_strips_markup() {
        assert_eq!(sanitize_name("<b>bob</b>"), "bob");
        assert_eq!(sanitize_name("  carol "), "carol");
        assert_eq!(sanitize_name("<script>x</script>eve"), "xeve");
        assert_eq!(sanitize_name("<img src=x>"), "");
        assert_eq!(sanitize_name("a > b"), "a > b");
    }

    #[test]
    fn test_close_frame() {
        let frame = close_frame(CLOSE_GAME_NOT_FOUND, "gone");
        assert_eq!(u16::from(frame.code), 4004);
        assert_eq!(frame.reason, "gone");
    }

    fn peer(name: &str, is_author: bool, session: &Arc<Session>, hub: &HubHandle) -> Peer {
        Peer {
            id: 1,
            name: name.to_string(),
            is_author,
            game_id: session.game().id,
            session: Arc::clone(session),
            hub: hub.clone(),
        }
    }

    #[tokio::test]
    async fn test_author_commands_need_the_author() {
        let game = Arc::new(Game {
            id: 3,
            title: "Flags".to_string(),
            author: "alice".to_string(),
        });
        let task = Task {
            question: "Red and white?".to_string(),
            options: vec!["Japan".to_string(), "Chile".to_string()],
            correct_option: 0,
            time_limit: 5,
        };
        let session = Session::new(Arc::clone(&game), vec![task]);
        let (_hub, handle) = Hub::new(Arc::new(MemoryStore::new()), std::time::Duration::from_secs(1));

        let bob = peer("bob", false, &session, &handle);
        dispatch(&bob, ClientMessage::GameStarted).await;
        assert_eq!(session.state().await, SessionState::Ready);

        let alice = peer("alice", true, &session, &handle);
        dispatch(&alice, ClientMessage::GameStarted).await;
        assert_eq!(session.state().await, SessionState::Started);

        dispatch(&bob, ClientMessage::GameFinished).await;
        assert_eq!(session.state().await, SessionState::Started);
        dispatch(&alice, ClientMessage::GameFinished).await;
        assert_eq!(session.state().await, SessionState::Finished);
    }

    #[tokio::test]
    async fn test_stopped_writer_ends_the_connection() {
        let mut store = MemoryStore::new();
        let task = Task {
            question: "Largest ocean?".to_string(),
            options: vec!["Atlantic".to_string(), "Pacific".to_string()],
            correct_option: 1,
            time_limit: 5,
        };
        let game = store
            .insert(
                Game {
                    id: 4,
                    title: "Oceans".to_string(),
                    author: "alice".to_string(),
                },
                vec![task],
            )
            .unwrap();
        let (hub, handle) = Hub::new(Arc::new(store), std::time::Duration::from_secs(1));
        tokio::spawn(hub.run());

        let (alice_tx, mut alice_rx) = mpsc::channel(8);
        let session = handle
            .register(Player::new(1, "alice".to_string(), Arc::clone(&game), alice_tx))
            .await
            .unwrap();
        let (bob_tx, mut bob_rx) = mpsc::channel(8);
        handle
            .register(Player::new(2, "bob".to_string(), Arc::clone(&game), bob_tx))
            .await
            .unwrap();
        assert!(matches!(alice_rx.recv().await, Some(ServerMessage::Ready { .. })));
        assert!(matches!(alice_rx.recv().await, Some(ServerMessage::PlayerRegistered(_))));

        // The reader would wait forever; only the finished writer can end it
        let bob = Peer {
            id: 2,
            ..peer("bob", false, &session, &handle)
        };
        let writer = tokio::spawn(async {});
        let reader = futures_util::stream::pending::<Result<Message, WsError>>();
        serve_peer(reader, &bob, &ServerConfig::default(), writer)
            .await
            .unwrap();

        assert!(matches!(
            alice_rx.recv().await,
            Some(ServerMessage::PlayerUnregistered(ref info)) if info.name == "bob"
        ));
        assert!(matches!(bob_rx.recv().await, Some(ServerMessage::Ready { .. })));
        assert_eq!(bob_rx.recv().await, None);
        assert!(session.scores().await.get("bob").is_none());
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let server = Server::new(config, Arc::new(MemoryStore::new())).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert_eq!(server.codec().decode(&server.codec().encode(9)), Some(9));
    }
}
