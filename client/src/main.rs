use clap::Parser;
use client::network::{BoxError, Client};
use log::info;
use rand::Rng;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Public token of the game to join
    #[arg(short = 'g', long)]
    game: String,

    /// Player name, random when omitted
    #[arg(short = 'n', long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let name = args
        .name
        .unwrap_or_else(|| format!("player-{:04}", rand::thread_rng().gen_range(0..10_000)));

    info!("Starting client...");
    info!("Joining game {} on {} as {}", args.game, args.server, name);

    let client = Client::connect(&args.server, &args.game, &name).await?;
    client.run().await?;

    Ok(())
}
