//! # Quiz Server Library
//!
//! This library provides the authoritative server for live multiple-choice
//! quiz games. An author opens a game, players join it over WebSocket, and the
//! server runs timed rounds, scores answers by speed and broadcasts a running
//! leaderboard to everyone in the game.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Game Progress
//! Every game in progress is a [`session::Session`]: a small state machine
//! (`Ready → Started → Accepting → Started … → Finished`) that owns the task
//! list, the current round and every player's per-task score. Clients only send
//! intents (start, next question, answer); the session decides what counts.
//!
//! ### Player Management
//! The [`hub::Hub`] tracks which players are connected to which game:
//! - Registration, including duplicate-name and not-yet-open rejections
//! - Attaching players to the running session of their game
//! - Join/leave notifications and per-game broadcasts
//! - Dropping players whose outbound queue has filled up
//!
//! ### Real-Time Delivery
//! Each connection gets a reader task that turns frames into session calls and
//! a writer task that drains the player's queue and sends keepalive pings.
//!
//! ## Architecture Design
//!
//! ### Hub Actor
//! A single task owns the registry of players and receives every change as a
//! message. Sessions are shared between the hub, the connection readers and
//! their own countdown task, so they keep their state behind one async lock
//! that is never held across a sleep.
//!
//! ### Bounded Fan-Out
//! Outbound queues are bounded and written without waiting. A player that does
//! not keep up is disconnected instead of slowing the whole game down.
//!
//! ## Module Organization
//!
//! - `config`: listener address, queue sizes and keepalive timings
//! - `store`: the read-only source of games and tasks
//! - `token`: public game tokens used in connection URLs
//! - `session`: rounds, scoring and leaderboards
//! - `hub`: the player registry actor
//! - `network`: WebSocket handshake, reader and writer tasks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::store::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let store = MemoryStore::load("data/games.json")?;
//!     let server = Server::new(ServerConfig::default(), Arc::new(store)).await?;
//!
//!     // Serves connections until the listener fails
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod hub;
pub mod network;
pub mod session;
pub mod store;
pub mod token;
