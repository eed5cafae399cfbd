use clap::Parser;
use log::info;
use server::network::Server;
use server::world::GridWorld;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind both server channels to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Control port (per-client request/response)
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Update port (out-of-band snapshot broadcasts)
    #[arg(short, long, default_value = "8081")]
    update_port: u16,

    /// Authoritative ticks per second
    #[arg(short, long, default_value = "2")]
    tick_rate: u32,

    /// Maximum concurrent clients
    #[arg(short, long, default_value = "16")]
    max_clients: usize,

    /// Seconds of client silence before eviction
    #[arg(short, long, default_value = "30")]
    deadline_secs: u64,

    /// Demo grid width
    #[arg(long, default_value = "16")]
    width: usize,

    /// Demo grid height
    #[arg(long, default_value = "8")]
    height: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let world = Arc::new(GridWorld::new(args.width, args.height));
    let server = Server::new(
        &format!("{}:{}", args.host, args.port),
        &format!("{}:{}", args.host, args.update_port),
        world,
        Duration::from_secs_f64(1.0 / args.tick_rate as f64),
        args.max_clients,
        Duration::from_secs(args.deadline_secs),
    )
    .await?;

    info!(
        "server ready: {} ticks/s, up to {} clients",
        args.tick_rate, args.max_clients
    );

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
