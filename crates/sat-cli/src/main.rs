mod common;
mod discover;
mod events;
mod output;
mod run;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sat-peer", about = "Tracker-signaled peer connection manager")]
struct Cli {
    /// Local peer identity announced to trackers (default: sat-<pid>).
    #[arg(short, long)]
    identity: Option<String>,

    /// Announce URLs (comma-separated ws:// or wss://). Overrides SAT_ANNOUNCE_URLS.
    #[arg(long, value_delimiter = ',')]
    announce: Vec<String>,

    /// Swarm key sent as info_hash.
    #[arg(long)]
    swarm: Option<String>,

    /// Per-request tracker timeout in ms.
    #[arg(long, default_value = "10000")]
    timeout: u64,

    /// Minimum delay between announce cycles in ms.
    #[arg(long, default_value = "30000")]
    interval: u64,

    /// Also append JSONL events to a file in this directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a peer manager until Ctrl+C.
    Run {
        /// Peers to connect to right away (comma-separated ids).
        #[arg(long, value_delimiter = ',')]
        connect: Vec<String>,
        /// Do not connect to discovered peers.
        #[arg(long)]
        no_auto_connect: bool,
        /// Signaling retries per connect.
        #[arg(long, default_value = "3")]
        max_retries: u32,
        /// Status line interval in seconds (0 = off).
        #[arg(long, default_value = "30")]
        status_interval: u64,
    },

    /// Announce only and print discovered peers.
    Discover {
        /// Stop after this many distinct peers.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let start = Instant::now();

    let identity = cli
        .identity
        .clone()
        .unwrap_or_else(|| format!("sat-{}", std::process::id()));
    let identity = sat_signal::PeerId::new(identity)?;
    let signaling = common::signaling_config(&cli)?;

    let mode = match cli.command {
        Command::Run { .. } => "run",
        Command::Discover { .. } => "discover",
    };
    if let Some(dir) = &cli.output_dir {
        let path = output::resolve_output_path(dir, identity.as_str(), mode)?;
        output::init_jsonl_writer(&path)?;
        eprintln!("JSONL: {}", path.display());
    }

    eprintln!("sat-peer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Identity: {identity}");
    for endpoint in signaling.endpoint_list() {
        eprintln!("Tracker:  {endpoint}");
    }
    eprintln!();

    match cli.command {
        Command::Run {
            connect,
            no_auto_connect,
            max_retries,
            status_interval,
        } => {
            let connect = connect
                .iter()
                .map(|p| sat_signal::PeerId::new(p.as_str()))
                .collect::<Result<Vec<_>, _>>()?;

            run::run(
                run::RunConfig {
                    identity,
                    signaling,
                    connect,
                    auto_connect: !no_auto_connect,
                    max_retries,
                    status_interval_s: status_interval,
                },
                start,
            )
            .await?;
        }

        Command::Discover { limit } => {
            discover::run(identity, signaling, limit, start).await?;
        }
    }

    Ok(())
}
