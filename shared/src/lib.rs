use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Largest inbound text frame the server accepts, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 512;
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const PONG_TIMEOUT: Duration = Duration::from_secs(60);
/// Pings go out at 9/10 of the pong timeout so a healthy peer always answers in time.
pub const PING_PERIOD: Duration = Duration::from_secs(54);

/// Close codes sent when a connection is refused after the handshake.
pub const CLOSE_BAD_REQUEST: u16 = 4000;
pub const CLOSE_GAME_NOT_FOUND: u16 = 4004;

/// Progress of a game session as reported to clients.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Ready,
    Started,
    Accepting,
    Finished,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub name: String,
    pub is_author: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub player: String,
    pub score: u64,
}

/// Messages pushed from the server to every connected player.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Ready {
        name: String,
        players: Vec<PlayerInfo>,
        state: SessionState,
        num_tasks: usize,
    },
    PlayerRegistered(PlayerInfo),
    PlayerUnregistered(PlayerInfo),
    GameStarted {
        num_tasks: usize,
    },
    Task {
        index: usize,
        question: String,
        options: Vec<String>,
        time_limit: u32,
    },
    Timer(u32),
    TaskFinished {
        index: usize,
        correct_option: usize,
        #[serde(with = "option_counts")]
        stats: BTreeMap<usize, usize>,
        leaderboard: Vec<LeaderboardEntry>,
    },
    GameFinished(Vec<LeaderboardEntry>),
    NotReady,
    PlayerExists,
}

impl ServerMessage {
    /// Rejections are the last message a connection ever receives.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ServerMessage::NotReady | ServerMessage::PlayerExists)
    }
}

/// Messages sent by players. The first three are honoured only from the author.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    GameStarted,
    NextQuestion,
    GameFinished,
    Answer(usize),
}

impl ClientMessage {
    pub fn is_author_command(&self) -> bool {
        !matches!(self, ClientMessage::Answer(_))
    }
}

/// Answer histogram keyed by option index. Keys travel as strings and are
/// parsed back here so the payload decodes whatever order `type` and `data` arrive in.
mod option_counts {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        counts: &BTreeMap<usize, usize>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(counts.iter().map(|(option, count)| (option.to_string(), count)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<usize, usize>, D::Error> {
        BTreeMap::<String, usize>::deserialize(deserializer)?
            .into_iter()
            .map(|(option, count)| {
                option
                    .parse()
                    .map(|option| (option, count))
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}

/// Path of the WebSocket endpoint for a game token.
pub fn wire_path(token: &str) -> String {
    format!("/play/{}/wire", token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_client_messages_have_no_payload() {
        let json = serde_json::to_string(&ClientMessage::NextQuestion).unwrap();
        assert_eq!(json, r#"{"type":"next_question"}"#);

        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"game_started"}"#).unwrap();
        assert_eq!(parsed, ClientMessage::GameStarted);
    }

    #[test]
    fn test_answer_carries_option_index() {
        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"answer","data":2}"#).unwrap();
        assert_eq!(parsed, ClientMessage::Answer(2));
        assert!(!parsed.is_author_command());
        assert!(ClientMessage::GameFinished.is_author_command());
    }

    #[test]
    fn test_malformed_client_messages_are_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"answer"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"answer","data":-1}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shutdown"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn test_ready_message_shape() {
        let message = ServerMessage::Ready {
            name: "bob".to_string(),
            players: vec![PlayerInfo {
                name: "alice".to_string(),
                is_author: true,
            }],
            state: SessionState::Accepting,
            num_tasks: 3,
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "ready");
        assert_eq!(value["data"]["name"], "bob");
        assert_eq!(value["data"]["players"][0]["is_author"], true);
        assert_eq!(value["data"]["state"], "accepting");
        assert_eq!(value["data"]["num_tasks"], 3);
    }

    #[test]
    fn test_task_finished_stats_use_option_keys() {
        let mut stats = BTreeMap::new();
        stats.insert(1, 2);

        let message = ServerMessage::TaskFinished {
            index: 0,
            correct_option: 1,
            stats,
            leaderboard: vec![LeaderboardEntry {
                player: "bob".to_string(),
                score: 7000,
            }],
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["data"]["stats"]["1"], 2);
        assert_eq!(value["data"]["leaderboard"][0]["score"], 7000);

        let back: ServerMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn test_task_finished_parses_with_data_first() {
        let json = r#"{"data":{"index":0,"correct_option":1,"stats":{"1":2,"3":1},"leaderboard":[]},"type":"task_finished"}"#;
        let parsed: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed,
            ServerMessage::TaskFinished {
                index: 0,
                correct_option: 1,
                stats: BTreeMap::from([(1, 2), (3, 1)]),
                leaderboard: Vec::new(),
            }
        );

        let bad_key = r#"{"type":"task_finished","data":{"index":0,"correct_option":1,"stats":{"one":2},"leaderboard":[]}}"#;
        assert!(serde_json::from_str::<ServerMessage>(bad_key).is_err());
    }

    #[test]
    fn test_rejections() {
        assert!(ServerMessage::NotReady.is_rejection());
        assert!(ServerMessage::PlayerExists.is_rejection());
        assert!(!ServerMessage::Timer(3).is_rejection());
        assert_eq!(
            serde_json::to_string(&ServerMessage::PlayerExists).unwrap(),
            r#"{"type":"player_exists"}"#
        );
    }

    #[test]
    fn test_keepalive_timings() {
        assert!(PING_PERIOD < PONG_TIMEOUT);
        assert_eq!(PING_PERIOD, PONG_TIMEOUT * 9 / 10);
        assert_eq!(wire_path("abc"), "/play/abc/wire");
    }
}
