//! Read-only source of games and their tasks
//!
//! The session layer only ever reads from here: a game is looked up by its
//! numeric id when a player connects, and its ordered task list is fetched
//! once when the author's connection creates a session.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read games file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse games file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("game {0} is defined more than once")]
    DuplicateGame(u64),
    #[error("game {0} does not exist")]
    UnknownGame(u64),
    #[error("task {task} of game {game} has no time to answer")]
    ZeroTimeLimit { game: u64, task: usize },
}

/// A single multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Task {
    pub question: String,
    pub options: Vec<String>,
    pub correct_option: usize,
    /// Seconds players have to answer
    pub time_limit: u32,
}

/// Game metadata. Tasks are fetched separately through [`TaskSource::tasks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    pub id: u64,
    pub title: String,
    pub author: String,
}

pub trait TaskSource: Send + Sync {
    fn game(&self, id: u64) -> Option<Arc<Game>>;

    /// Ordered task list of a game
    fn tasks(&self, game: &Game) -> Result<Vec<Task>, StoreError>;

    fn games(&self) -> Vec<Arc<Game>>;
}

#[derive(Debug, Deserialize)]
struct GamesFile {
    games: Vec<GameRecord>,
}

#[derive(Debug, Deserialize)]
struct GameRecord {
    id: u64,
    title: String,
    author: String,
    #[serde(default)]
    tasks: Vec<Task>,
}

/// In-memory store, usually loaded once from a JSON file at startup
#[derive(Debug, Default)]
pub struct MemoryStore {
    games: Vec<Arc<Game>>,
    tasks: HashMap<u64, Vec<Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, StoreError> {
        let file: GamesFile = serde_json::from_str(contents)?;

        let mut store = Self::new();
        for record in file.games {
            let game = Game {
                id: record.id,
                title: record.title,
                author: record.author,
            };
            store.insert(game, record.tasks)?;
        }
        Ok(store)
    }

    pub fn insert(&mut self, game: Game, tasks: Vec<Task>) -> Result<Arc<Game>, StoreError> {
        if self.tasks.contains_key(&game.id) {
            return Err(StoreError::DuplicateGame(game.id));
        }
        // A round must tick at least once before it is scored
        if let Some(task) = tasks.iter().position(|task| task.time_limit == 0) {
            return Err(StoreError::ZeroTimeLimit { game: game.id, task });
        }

        let game = Arc::new(game);
        self.tasks.insert(game.id, tasks);
        self.games.push(Arc::clone(&game));
        Ok(game)
    }
}

impl TaskSource for MemoryStore {
    fn game(&self, id: u64) -> Option<Arc<Game>> {
        self.games.iter().find(|game| game.id == id).cloned()
    }

    fn tasks(&self, game: &Game) -> Result<Vec<Task>, StoreError> {
        self.tasks
            .get(&game.id)
            .cloned()
            .ok_or(StoreError::UnknownGame(game.id))
    }

    fn games(&self) -> Vec<Arc<Game>> {
        self.games.clone()
    }
}
