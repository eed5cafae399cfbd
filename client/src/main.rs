use clap::Parser;
use client::network::{ActionSource, Client};
use client::updates::UpdateFeed;
use log::{error, info};
use shared::Action;
use std::io::{BufRead, Write};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server control address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Local port for snapshot updates (0 picks an ephemeral port)
    #[arg(short = 'u', long, default_value = "0")]
    update_port: u16,
}

/// Minimal terminal binding: w/a/s/d move, q quits. Anything richer is a
/// different program's job.
struct StdinSource;

impl ActionSource for StdinSource {
    fn next_action(&mut self, frame: &str, batch: &[(u32, Action)]) -> Action {
        println!("{}", frame);
        if !batch.is_empty() {
            println!("last turn: {:?}", batch);
        }

        loop {
            print!("move [w/a/s/d, q to quit]: ");
            let _ = std::io::stdout().flush();

            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => return Action::Quit,
                Ok(_) => {}
            }

            match line.trim().chars().next() {
                Some('w') | Some('W') => return Action::Up,
                Some('a') | Some('A') => return Action::Left,
                Some('s') | Some('S') => return Action::Down,
                Some('d') | Some('D') => return Action::Right,
                Some('q') | Some('Q') => return Action::Quit,
                _ => println!("unknown key"),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let feed = UpdateFeed::bind(args.update_port).await?;
    let update_port = feed.local_port()?;
    info!("listening for snapshot updates on port {}", update_port);

    // Print out-of-band snapshots as they arrive between turns.
    tokio::spawn(async move {
        loop {
            match feed.poll_latest() {
                Ok(Some(frame)) => println!("\n[update]\n{}", frame),
                Ok(None) => {}
                Err(e) => {
                    error!("update feed failed: {}", e);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    });

    info!("connecting to {}", args.server);
    let server_addr = args.server.parse()?;
    let mut client = Client::new(server_addr, update_port).await?;

    if let Err(e) = client.run(&mut StdinSource).await {
        error!("connection lost: {}", e);
    }

    Ok(())
}
