use crate::input::{parse_command, Command, HELP};
use crate::rendering::render_message;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::{wire_path, ServerMessage};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Builds the connection URL for a game token and player name.
///
/// `server` may be given with or without the `ws://` scheme.
pub fn wire_url(server: &str, token: &str, name: &str) -> String {
    let host = server.trim_start_matches("ws://").trim_end_matches('/');
    format!(
        "ws://{}{}?player={}",
        host,
        wire_path(token),
        urlencoding::encode(name)
    )
}

pub struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    name: String,
}

impl Client {
    pub async fn connect(server: &str, token: &str, name: &str) -> Result<Self, BoxError> {
        let url = wire_url(server, token, name);
        info!("Connecting to {}", url);

        let (ws, _response) = connect_async(url.as_str()).await?;
        Ok(Client {
            ws,
            name: name.to_string(),
        })
    }

    /// Prints server messages and forwards typed commands until either side closes.
    pub async fn run(self) -> Result<(), BoxError> {
        let (mut ws_tx, mut ws_rx) = self.ws.split();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        println!("Playing as {}. Type 'help' for commands.", self.name);

        loop {
            tokio::select! {
                frame = ws_rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => {
                                println!("{}", render_message(&message));
                                if message.is_rejection() {
                                    info!("Rejected by the server, waiting for it to close");
                                }
                            }
                            Err(e) => warn!("Unreadable message from server: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        match frame {
                            Some(frame) => println!(
                                "Server closed the connection ({}): {}",
                                u16::from(frame.code),
                                frame.reason
                            ),
                            None => println!("Server closed the connection"),
                        }
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                },

                line = lines.next_line(), if stdin_open => match line? {
                    Some(line) => match parse_command(&line) {
                        Some(Command::Send(message)) => {
                            debug!("Sending {:?}", message);
                            let text = serde_json::to_string(&message)?;
                            ws_tx.send(Message::text(text)).await?;
                        }
                        Some(Command::Help) => println!("{}", HELP),
                        Some(Command::Quit) => {
                            ws_tx.send(Message::Close(None)).await?;
                            break;
                        }
                        None if line.trim().is_empty() => {}
                        None => println!("Unknown command {:?}, type 'help'", line.trim()),
                    },
                    None => {
                        info!("Input closed, still listening to the game");
                        stdin_open = false;
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_url() {
        assert_eq!(
            wire_url("127.0.0.1:8080", "aB3", "bob"),
            "ws://127.0.0.1:8080/play/aB3/wire?player=bob"
        );
        assert_eq!(
            wire_url("ws://quiz.local:9000/", "x9", "Big Bob"),
            "ws://quiz.local:9000/play/x9/wire?player=Big%20Bob"
        );
    }
}
