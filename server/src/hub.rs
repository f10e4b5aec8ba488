//! Registry of connected players and fan-out of game events
//!
//! The hub is an actor: one task owns the set of registered players and
//! receives every mutation over three queues (register, unregister and
//! broadcast). Because only that task ever touches the registry, no lock is
//! needed around it; sessions keep their own lock since their countdown task
//! touches them concurrently.
//!
//! Each player has a bounded outbound queue drained by its connection's writer
//! task. The hub never waits on a queue: a player whose queue is full is
//! treated as disconnected and dropped, so one slow client cannot stall
//! delivery to everybody else.

use crate::session::Session;
use crate::store::{Game, TaskSource};
use log::{debug, error, info, warn};
use shared::{PlayerInfo, ServerMessage, SessionState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;

pub type PlayerId = u64;

/// A connected player as seen by the hub
///
/// Identity inside a game is the name; the id only tells apart connections
/// that claim the same name before the hub has accepted either of them.
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub game: Arc<Game>,
    pub is_author: bool,
    sender: mpsc::Sender<ServerMessage>,
    session: Option<Arc<Session>>,
}

impl Player {
    pub fn new(id: PlayerId, name: String, game: Arc<Game>, sender: mpsc::Sender<ServerMessage>) -> Self {
        let is_author = name == game.author;
        Self {
            id,
            name,
            game,
            is_author,
            sender,
            session: None,
        }
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            name: self.name.clone(),
            is_author: self.is_author,
        }
    }
}

/// Request to join a game. The session the player got attached to is sent
/// back on `attached`; dropping it unanswered means the player was rejected.
pub struct Registration {
    pub player: Player,
    pub attached: oneshot::Sender<Arc<Session>>,
}

#[derive(Debug, Clone)]
pub struct Broadcast {
    pub game_id: u64,
    pub message: ServerMessage,
}

/// Cheap cloneable sender side of the hub's queues
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::UnboundedSender<Registration>,
    unregister_tx: mpsc::UnboundedSender<PlayerId>,
    broadcast_tx: mpsc::UnboundedSender<Broadcast>,
}

impl HubHandle {
    pub fn register(&self, player: Player) -> oneshot::Receiver<Arc<Session>> {
        let (attached, receiver) = oneshot::channel();
        if let Err(e) = self.register_tx.send(Registration { player, attached }) {
            error!("Failed to queue registration of {}: hub stopped", e.0.player.name);
        }
        receiver
    }

    pub fn unregister(&self, id: PlayerId) {
        if self.unregister_tx.send(id).is_err() {
            error!("Failed to queue unregistration of player {}: hub stopped", id);
        }
    }

    pub fn broadcast(&self, game_id: u64, message: ServerMessage) {
        if self.broadcast_tx.send(Broadcast { game_id, message }).is_err() {
            error!("Failed to queue broadcast to game {}: hub stopped", game_id);
        }
    }
}

pub struct Hub {
    players: HashMap<PlayerId, Player>,
    source: Arc<dyn TaskSource>,
    close_grace: Duration,

    register_rx: mpsc::UnboundedReceiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<PlayerId>,
    broadcast_rx: mpsc::UnboundedReceiver<Broadcast>,
}

impl Hub {
    pub fn new(source: Arc<dyn TaskSource>, close_grace: Duration) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();

        let hub = Self {
            players: HashMap::new(),
            source,
            close_grace,
            register_rx,
            unregister_rx,
            broadcast_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
        };
        (hub, handle)
    }

    /// Processes events one at a time until every handle has been dropped.
    pub async fn run(mut self) {
        info!("Hub started");

        loop {
            tokio::select! {
                Some(registration) = self.register_rx.recv() => {
                    self.register(registration).await;
                },
                Some(id) = self.unregister_rx.recv() => {
                    self.unregister(id).await;
                },
                Some(broadcast) = self.broadcast_rx.recv() => {
                    self.broadcast(broadcast).await;
                },
                else => break,
            }
        }

        info!("Hub stopped");
    }

    fn players_of(&self, game_id: u64) -> impl Iterator<Item = &Player> {
        self.players
            .values()
            .filter(move |player| player.game.id == game_id)
    }

    async fn register(&mut self, registration: Registration) {
        let Registration { mut player, attached } = registration;
        let game_id = player.game.id;

        if self.players_of(game_id).any(|existing| existing.name == player.name) {
            warn!("Name {:?} is already taken in game {}", player.name, game_id);
            self.reject(player, ServerMessage::PlayerExists);
            return;
        }

        let mut session = None;
        let candidates: Vec<Arc<Session>> = self
            .players_of(game_id)
            .filter_map(|existing| existing.session.clone())
            .collect();
        for candidate in candidates {
            if candidate.state().await != SessionState::Finished {
                session = Some(candidate);
                break;
            }
        }

        let session = match session {
            Some(session) => session,
            None if player.is_author => {
                match Session::create(Arc::clone(&player.game), self.source.as_ref()) {
                    Ok(session) => session,
                    Err(e) => {
                        error!("Failed to create session for game {}: {}", game_id, e);
                        self.reject(player, ServerMessage::NotReady);
                        return;
                    }
                }
            }
            None => {
                info!("Game {} has no session yet, turning away {}", game_id, player.name);
                self.reject(player, ServerMessage::NotReady);
                return;
            }
        };

        self.fan_out(game_id, ServerMessage::PlayerRegistered(player.info()))
            .await;

        let mut roster: Vec<PlayerInfo> = self.players_of(game_id).map(Player::info).collect();
        roster.push(player.info());
        roster.sort_by(|a, b| a.name.cmp(&b.name));

        let ready = ServerMessage::Ready {
            name: player.name.clone(),
            players: roster,
            state: session.state().await,
            num_tasks: session.num_tasks(),
        };
        if let Err(e) = player.sender.try_send(ready) {
            warn!("Could not queue ready message for {}: {}", player.name, e);
        }

        session.init(&player.name).await;
        player.session = Some(Arc::clone(&session));

        if attached.send(session).is_err() {
            // The connection went away while we were registering it
            debug!("Connection of {} closed during registration", player.name);
            if let Some(session) = &player.session {
                session.remove_player(&player.name).await;
            }
            return;
        }

        info!(
            "Player {} joined game {}{}",
            player.name,
            game_id,
            if player.is_author { " as author" } else { "" }
        );
        self.players.insert(player.id, player);
    }

    /// Sends a single explanatory message and closes the queue once it had
    /// time to flush.
    fn reject(&self, player: Player, message: ServerMessage) {
        if let Err(e) = player.sender.try_send(message) {
            warn!("Could not queue rejection for {}: {}", player.name, e);
        }

        let sender = player.sender;
        let grace = self.close_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            drop(sender);
        });
    }

    async fn unregister(&mut self, id: PlayerId) {
        let Some(player) = self.players.remove(&id) else {
            debug!("Player {} was not registered", id);
            return;
        };

        let game_id = player.game.id;
        let info = player.info();
        let session = player.session.clone();
        // Dropping the player closes its outbound queue
        drop(player);

        if let Some(session) = session {
            session.remove_player(&info.name).await;
        }

        info!("Player {} left game {}", info.name, game_id);
        self.fan_out(game_id, ServerMessage::PlayerUnregistered(info))
            .await;
    }

    async fn broadcast(&mut self, broadcast: Broadcast) {
        self.fan_out(broadcast.game_id, broadcast.message).await;
    }

    /// Queues `message` for every player of the game, dropping players whose
    /// queue is full or closed. Returns how many players received it.
    ///
    /// A dropped player leaves the session's score table right away; its
    /// connection notices the closed queue and shuts down on its own.
    async fn fan_out(&mut self, game_id: u64, message: ServerMessage) -> usize {
        let mut delivered = 0;
        let mut dropped = Vec::new();

        for player in self.players_of(game_id) {
            match player.sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue of {} is full, dropping player", player.name);
                    dropped.push(player.id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Outbound queue of {} is closed", player.name);
                    dropped.push(player.id);
                }
            }
        }

        for id in dropped {
            let Some(player) = self.players.remove(&id) else {
                continue;
            };
            if let Some(session) = &player.session {
                session.remove_player(&player.name).await;
            }
            info!("Player {} was dropped from game {}", player.name, game_id);
        }
        delivered
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.players.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
