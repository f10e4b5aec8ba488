//! Human-readable text for server messages

use shared::{LeaderboardEntry, PlayerInfo, ServerMessage, SessionState};

fn player_label(player: &PlayerInfo) -> String {
    if player.is_author {
        format!("{} (author)", player.name)
    } else {
        player.name.clone()
    }
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Ready => "waiting to start",
        SessionState::Started => "between tasks",
        SessionState::Accepting => "accepting answers",
        SessionState::Finished => "finished",
    }
}

fn write_leaderboard(out: &mut String, leaderboard: &[LeaderboardEntry]) {
    for (rank, entry) in leaderboard.iter().enumerate() {
        out.push_str(&format!("\n  {}. {} {}", rank + 1, entry.player, entry.score));
    }
}

pub fn render_message(message: &ServerMessage) -> String {
    let mut out = String::new();
    match message {
        ServerMessage::Ready {
            name,
            players,
            state,
            num_tasks,
        } => {
            let roster: Vec<String> = players.iter().map(player_label).collect();
            out.push_str(&format!(
                "Joined as {}. The game has {} tasks and is {}.\nPlayers: {}",
                name,
                num_tasks,
                state_label(*state),
                roster.join(", ")
            ));
        }
        ServerMessage::PlayerRegistered(player) => {
            out.push_str(&format!("{} joined", player_label(player)));
        }
        ServerMessage::PlayerUnregistered(player) => {
            out.push_str(&format!("{} left", player_label(player)));
        }
        ServerMessage::GameStarted { num_tasks } => {
            out.push_str(&format!("Game started with {} tasks", num_tasks));
        }
        ServerMessage::Task {
            index,
            question,
            options,
            time_limit,
        } => {
            out.push_str(&format!("Task {}: {} ({}s)", index + 1, question, time_limit));
            for (number, option) in options.iter().enumerate() {
                out.push_str(&format!("\n  {}) {}", number + 1, option));
            }
        }
        ServerMessage::Timer(remaining) => {
            out.push_str(&format!("{}s left", remaining));
        }
        ServerMessage::TaskFinished {
            index,
            correct_option,
            stats,
            leaderboard,
        } => {
            out.push_str(&format!(
                "Task {} is over, the correct answer was {}",
                index + 1,
                correct_option + 1
            ));
            if stats.is_empty() {
                out.push_str("\nNobody answered");
            }
            for (option, count) in stats {
                out.push_str(&format!("\n  option {}: {} answered", option + 1, count));
            }
            out.push_str("\nLeaderboard:");
            write_leaderboard(&mut out, leaderboard);
        }
        ServerMessage::GameFinished(leaderboard) => {
            out.push_str("Game over! Final leaderboard:");
            write_leaderboard(&mut out, leaderboard);
        }
        ServerMessage::NotReady => {
            out.push_str("The author has not opened this game yet");
        }
        ServerMessage::PlayerExists => {
            out.push_str("That name is already taken in this game");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn entry(player: &str, score: u64) -> LeaderboardEntry {
        LeaderboardEntry {
            player: player.to_string(),
            score,
        }
    }

    #[test]
    fn test_render_ready() {
        let message = ServerMessage::Ready {
            name: "bob".to_string(),
            players: vec![
                PlayerInfo {
                    name: "alice".to_string(),
                    is_author: true,
                },
                PlayerInfo {
                    name: "bob".to_string(),
                    is_author: false,
                },
            ],
            state: SessionState::Ready,
            num_tasks: 3,
        };
        assert_eq!(
            render_message(&message),
            "Joined as bob. The game has 3 tasks and is waiting to start.\nPlayers: alice (author), bob"
        );
    }

    #[test]
    fn test_render_task_numbers_options_from_one() {
        let message = ServerMessage::Task {
            index: 0,
            question: "2 + 2?".to_string(),
            options: vec!["3".to_string(), "4".to_string()],
            time_limit: 10,
        };
        assert_eq!(render_message(&message), "Task 1: 2 + 2? (10s)\n  1) 3\n  2) 4");
    }

    #[test]
    fn test_render_task_finished() {
        let message = ServerMessage::TaskFinished {
            index: 1,
            correct_option: 0,
            stats: BTreeMap::from([(0, 2), (2, 1)]),
            leaderboard: vec![entry("carol", 9000), entry("bob", 0)],
        };
        assert_eq!(
            render_message(&message),
            "Task 2 is over, the correct answer was 1\n  option 1: 2 answered\n  option 3: 1 answered\nLeaderboard:\n  1. carol 9000\n  2. bob 0"
        );

        let silent = ServerMessage::TaskFinished {
            index: 0,
            correct_option: 1,
            stats: BTreeMap::new(),
            leaderboard: Vec::new(),
        };
        assert!(render_message(&silent).contains("Nobody answered"));
    }

    #[test]
    fn test_render_short_messages() {
        assert_eq!(render_message(&ServerMessage::Timer(7)), "7s left");
        assert_eq!(
            render_message(&ServerMessage::GameFinished(vec![entry("amy", 12)])),
            "Game over! Final leaderboard:\n  1. amy 12"
        );
        assert!(render_message(&ServerMessage::PlayerExists).contains("taken"));
        assert!(render_message(&ServerMessage::NotReady).contains("not opened"));
    }
}
