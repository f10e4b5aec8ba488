//! Terminal commands typed by the player

use shared::ClientMessage;

pub const HELP: &str = "\
Commands:
  <number>  answer the current task with that option
  start     start the game (author only)
  next      open the next task (author only)
  finish    end the game and show the final leaderboard (author only)
  help      show this text
  quit      leave the game";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Send(ClientMessage),
    Help,
    Quit,
}

/// Parses one line of input. Options are numbered from 1 for humans and sent
/// zero-based. Returns `None` for blank or unrecognised lines.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let command = match line.to_ascii_lowercase().as_str() {
        "start" => Command::Send(ClientMessage::GameStarted),
        "next" => Command::Send(ClientMessage::NextQuestion),
        "finish" => Command::Send(ClientMessage::GameFinished),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => {
            let option: usize = other.parse().ok()?;
            Command::Send(ClientMessage::Answer(option.checked_sub(1)?))
        }
    };
    Some(command)
}
