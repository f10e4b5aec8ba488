use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::{BoxError, Server};
use server::store::{MemoryStore, TaskSource};
use shared::wire_path;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// JSON file with the playable games and their tasks
    #[arg(short, long, env = "GAMES_FILE", default_value = "data/games.json")]
    games: String,

    /// Secret mixed into public game tokens
    #[arg(long, env = "SECRET_KEY", default_value = "", hide_env_values = true)]
    secret_key: String,

    /// Messages buffered per player before a slow player is dropped
    #[arg(long, default_value = "32")]
    outbound_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let store: Arc<dyn TaskSource> = Arc::new(MemoryStore::load(&args.games)?);
    info!("Loaded {} games from {}", store.games().len(), args.games);

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        secret_key: args.secret_key,
        outbound_capacity: args.outbound_capacity,
        ..ServerConfig::default()
    };
    let address = config.address();

    let server = Server::new(config, Arc::clone(&store)).await?;

    for game in store.games() {
        info!(
            "Game {} {:?} by {}: ws://{}{}?player=<name>",
            game.id,
            game.title,
            game.author,
            address,
            wire_path(&server.codec().encode(game.id))
        );
    }

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
