//! # Quiz Client Library
//!
//! A terminal client for the live quiz server. It joins one game over
//! WebSocket, prints everything the server announces (roster changes, tasks,
//! the countdown, round results and leaderboards) and turns typed lines into
//! protocol messages.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Parses typed lines into commands. Answers are typed as 1-based option
//! numbers and sent zero-based; `start`, `next` and `finish` drive the game
//! and only have an effect when typed by the game's author.
//!
//! ### Network Module (`network`)
//! Builds the connection URL, connects and runs the select loop between the
//! socket and standard input.
//!
//! ### Rendering Module (`rendering`)
//! Turns each server message into a few lines of text.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let client = Client::connect("127.0.0.1:8080", "aB3", "bob").await?;
//!     client.run().await
//! }
//! ```

pub mod input;
pub mod network;
pub mod rendering;
