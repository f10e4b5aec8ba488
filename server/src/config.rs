use shared::{MAX_MESSAGE_SIZE, PING_PERIOD, PONG_TIMEOUT, WRITE_TIMEOUT};
use std::time::Duration;

/// Runtime settings for the quiz server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Secret used to derive public game tokens
    pub secret_key: String,
    /// Messages a player's outbound queue holds before the player is dropped
    pub outbound_capacity: usize,
    pub max_message_size: usize,
    pub write_timeout: Duration,
    /// Silence on a connection for longer than this is fatal
    pub pong_timeout: Duration,
    pub ping_period: Duration,
    /// How long a rejected connection stays open so the rejection can flush
    pub close_grace: Duration,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            secret_key: String::new(),
            outbound_capacity: 32,
            max_message_size: MAX_MESSAGE_SIZE,
            write_timeout: WRITE_TIMEOUT,
            pong_timeout: PONG_TIMEOUT,
            ping_period: PING_PERIOD,
            close_grace: WRITE_TIMEOUT,
        }
    }
}
