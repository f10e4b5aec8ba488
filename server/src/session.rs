//! Round-by-round state machine for one running game
//!
//! A session moves through `Ready → Started → Accepting → Started … → Finished`.
//! Every read and mutation goes through a single lock. The per-round countdown
//! runs as its own task and only re-takes the lock for the instant it needs to
//! score the round, so answers keep flowing while the clock ticks.
//!
//! Illegal calls (answering outside a round, answering twice, asking for the
//! next task mid-round) are no-ops that return `None`; clients race each other
//! over the network and such calls are expected rather than exceptional.

use crate::store::{Game, StoreError, Task, TaskSource};
use log::{debug, error, info};
use shared::{LeaderboardEntry, SessionState};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Per-task scores of one player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerScores {
    pub player: String,
    /// One slot per task, `None` until the player answered or the round was scored
    pub scores: Vec<Option<u64>>,
}

impl PlayerScores {
    fn new(player: &str, num_tasks: usize) -> Self {
        Self {
            player: player.to_string(),
            scores: vec![None; num_tasks],
        }
    }

    /// Sum of the strictly positive task scores
    pub fn total(&self) -> u64 {
        self.scores.iter().flatten().filter(|score| **score > 0).sum()
    }
}

/// Scores of every player, in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreTable {
    pub players: Vec<PlayerScores>,
}

impl ScoreTable {
    /// Players ranked by total score, highest first.
    ///
    /// The sort is stable, so players on equal totals keep their registration order.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut board: Vec<LeaderboardEntry> = self
            .players
            .iter()
            .map(|entry| LeaderboardEntry {
                player: entry.player.clone(),
                score: entry.total(),
            })
            .collect();
        board.sort_by(|a, b| b.score.cmp(&a.score));
        board
    }

    pub fn get(&self, player: &str) -> Option<&PlayerScores> {
        self.players.iter().find(|entry| entry.player == player)
    }

    fn get_mut(&mut self, player: &str) -> Option<&mut PlayerScores> {
        self.players.iter_mut().find(|entry| entry.player == player)
    }
}

/// Outcome of a finished round, handed to the round completion callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    pub index: usize,
    pub task: Task,
    /// Number of accepted answers per option index
    pub stats: BTreeMap<usize, usize>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

struct SessionInner {
    state: SessionState,
    current: usize,
    deadline: Instant,
    /// First accepted option per player for the active round
    answers: HashMap<String, usize>,
    table: ScoreTable,
}

pub struct Session {
    game: Arc<Game>,
    tasks: Vec<Task>,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub fn new(game: Arc<Game>, tasks: Vec<Task>) -> Arc<Self> {
        Arc::new(Self {
            game,
            tasks,
            inner: Mutex::new(SessionInner {
                state: SessionState::Ready,
                current: 0,
                deadline: Instant::now(),
                answers: HashMap::new(),
                table: ScoreTable::default(),
            }),
        })
    }

    /// Creates a session for `game`, fetching its tasks once from the source.
    pub fn create(game: Arc<Game>, source: &dyn TaskSource) -> Result<Arc<Self>, StoreError> {
        let tasks = source.tasks(&game)?;
        info!(
            "Session created for game {} ({:?}) with {} tasks",
            game.id,
            game.title,
            tasks.len()
        );
        Ok(Self::new(game, tasks))
    }

    pub fn game(&self) -> &Arc<Game> {
        &self.game
    }

    pub fn num_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Index of the task the next round will use (or the active one while accepting)
    pub async fn current_index(&self) -> usize {
        self.inner.lock().await.current
    }

    /// Allocates an unscored row for a newly attached player.
    pub async fn init(&self, player: &str) {
        let mut inner = self.inner.lock().await;
        let row = PlayerScores::new(player, self.tasks.len());
        match inner.table.get_mut(player) {
            Some(existing) => *existing = row,
            None => inner.table.players.push(row),
        }
    }

    pub async fn remove_player(&self, player: &str) {
        let mut inner = self.inner.lock().await;
        inner.table.players.retain(|entry| entry.player != player);
    }

    /// Rewinds to the first task. Returns the task count, or `None` when the
    /// session is mid-round or already finished.
    pub async fn start(&self) -> Option<usize> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SessionState::Ready | SessionState::Started => {
                inner.state = SessionState::Started;
                inner.current = 0;
                info!("Game {} started", self.game.id);
                Some(self.tasks.len())
            }
            state => {
                debug!("Ignoring start of game {} in state {:?}", self.game.id, state);
                None
            }
        }
    }

    /// Opens the next round and returns its index and task.
    ///
    /// A countdown task then calls `on_tick` once per second with the remaining
    /// whole seconds (time limit − 1 down to 0), scores the round, hands the
    /// summary to `on_finish` and moves the session back to `Started`.
    /// Returns `None` without touching anything unless the session is `Started`;
    /// when every task has been played the session becomes `Finished` instead.
    pub async fn next_task<T, F>(self: &Arc<Self>, on_tick: T, on_finish: F) -> Option<(usize, Task)>
    where
        T: Fn(u32) + Send + 'static,
        F: FnOnce(&RoundSummary) + Send + 'static,
    {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Started {
            return None;
        }
        if inner.current >= self.tasks.len() {
            inner.state = SessionState::Finished;
            info!("Game {} has no tasks left", self.game.id);
            return None;
        }

        let index = inner.current;
        let task = self.tasks[index].clone();
        inner.answers.clear();
        inner.deadline = Instant::now() + Duration::from_secs(u64::from(task.time_limit));
        inner.state = SessionState::Accepting;
        drop(inner);

        info!(
            "Game {} round {} open for {}s",
            self.game.id, index, task.time_limit
        );

        let session = Arc::clone(self);
        let time_limit = task.time_limit;
        tokio::spawn(async move {
            for remaining in (0..time_limit).rev() {
                sleep(Duration::from_secs(1)).await;
                on_tick(remaining);
            }
            session.complete_round(on_finish).await;
        });

        Some((index, task))
    }

    /// Records a player's answer for the active round and returns its score.
    ///
    /// A correct answer scores the milliseconds left until the deadline, a wrong
    /// one scores 0. Returns `None` when no round is accepting, the option does
    /// not exist, the player already answered this round or is not registered.
    pub async fn answer(&self, player: &str, option: usize) -> Option<u64> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.state != SessionState::Accepting {
            return None;
        }

        let index = inner.current;
        let task = &self.tasks[index];
        if option >= task.options.len() || inner.answers.contains_key(player) {
            debug!("Rejected answer {} from {} in round {}", option, player, index);
            return None;
        }

        let row = inner.table.get_mut(player)?;
        let score = if option == task.correct_option {
            inner
                .deadline
                .saturating_duration_since(Instant::now())
                .as_millis() as u64
        } else {
            0
        };

        row.scores[index] = Some(score);
        inner.answers.insert(player.to_string(), option);
        debug!("{} answered {} in round {} for {}", player, option, index, score);
        Some(score)
    }

    /// Ends the game from any state and returns the final score table.
    pub async fn finish(&self) -> ScoreTable {
        let mut inner = self.inner.lock().await;
        inner.state = SessionState::Finished;
        info!("Game {} finished", self.game.id);
        inner.table.clone()
    }

    pub async fn scores(&self) -> ScoreTable {
        self.inner.lock().await.table.clone()
    }

    async fn complete_round<F>(&self, on_finish: F)
    where
        F: FnOnce(&RoundSummary),
    {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.state != SessionState::Accepting {
            debug!(
                "Round {} of game {} ended after the session left accepting",
                inner.current, self.game.id
            );
            return;
        }

        let index = inner.current;
        let task = &self.tasks[index];
        if task.correct_option >= task.options.len() {
            error!(
                "Game {} task {} marks option {} correct but has {} options, aborting session",
                self.game.id,
                index,
                task.correct_option,
                task.options.len()
            );
            inner.state = SessionState::Finished;
            return;
        }

        for row in &mut inner.table.players {
            if let Some(slot) = row.scores.get_mut(index) {
                slot.get_or_insert(0);
            }
        }

        let mut stats = BTreeMap::new();
        for option in inner.answers.values() {
            *stats.entry(*option).or_insert(0) += 1;
        }

        let summary = RoundSummary {
            index,
            task: task.clone(),
            stats,
            leaderboard: inner.table.leaderboard(),
        };
        on_finish(&summary);

        inner.state = SessionState::Started;
        inner.current += 1;
        info!(
            "Game {} round {} scored, {} answers",
            self.game.id,
            index,
            inner.answers.len()
        );
    }
}
