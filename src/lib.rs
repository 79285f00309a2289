pub mod backend;
pub mod capture;
mod cli;
pub mod db;
pub mod detection;
pub mod error;
pub mod matching;
pub mod models;
pub mod polling;
pub mod protocols;
pub mod session;
pub mod settings;
mod utils;

use anyhow::Context;
use clap::Parser;

use cli::Cli;

pub use error::RoundError;
pub use matching::{evaluate, ChecklistEntry, ChecklistReport, ItemStatus};
pub use models::{DetectedItem, Priority, RequiredItem};
pub use session::{Collaborators, SessionController, SessionSnapshot, SessionStatus};
pub use settings::{DetectionMode, MergePolicy, Settings};

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging (reads RUST_LOG env var)
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    log::info!("cartcheck starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(cli::execute(cli))
}
