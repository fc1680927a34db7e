use clap::Parser;
use client::client::NetworkingClient;
use client::net::ClientConnection;
use log::info;
use shared::prefab::PrefabRegistry;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,
}

// The mirror core holds non-Send delegate subscribers, so everything
// but the socket tasks stays on one thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("connecting to {}", args.server);
    info!("commands: 'down <code>', 'up <code>', 'quit' (arrows are 37-40)");

    let mut registry = PrefabRegistry::new();
    shared::game::register_prefabs(&mut registry);

    let connection = ClientConnection::connect(&args.server).await?;
    let client = NetworkingClient::new(registry, Box::new(connection.transport()));

    connection.run(client).await
}
