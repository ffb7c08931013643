use anyhow::Result;
use clap::Parser;
use tracing::info;
use uuid::Uuid;

use stratus_core::config;

use crate::daemon;
use crate::logging::{self, LogFormat};

#[derive(Parser)]
#[command(name = "stratus", about = "stratus private-cloud node agent", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the node agent daemon.
    Run {
        /// Seconds between reconcile ticks.
        #[arg(long, default_value_t = 3)]
        interval: u64,
        /// Log as JSON instead of human-readable output.
        #[arg(long)]
        json: bool,
    },
    /// Set the document database URI in the node config.
    Mongo { uri: String },
    /// Generate a fresh node ID in the node config.
    ResetId,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { interval, json } => {
            logging::init(if json { LogFormat::Json } else { LogFormat::Human });

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(daemon::run(interval, None))
        }
        Command::Mongo { uri } => {
            logging::init(LogFormat::Human);
            set_mongo(&uri)
        }
        Command::ResetId => {
            logging::init(LogFormat::Human);
            reset_id()
        }
    }
}

fn set_mongo(uri: &str) -> Result<()> {
    let mut cfg = config::load()?;
    cfg.mongo_uri = uri.to_string();
    config::save(&cfg)?;

    info!(mongo_uri = %cfg.mongo_uri, "cli: Set database URI");
    Ok(())
}

fn reset_id() -> Result<()> {
    let mut cfg = config::load()?;
    cfg.node_id = Uuid::new_v4().simple().to_string();
    config::save(&cfg)?;

    info!(node_id = %cfg.node_id, "cli: Reset node ID");
    Ok(())
}
