#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo
    )
)]

//! # pdctl
//!
//! The admin CLI for the placement driver (spec.md §6), executed against a
//! running `pd-server` node's HTTP admin surface.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod util;

use commands::{config, namespace, operator, region, scheduler, store};

#[derive(Parser, Debug)]
#[clap(name = "pdctl", version, about = "Admin CLI for the placement driver")]
struct Cli {
    /// Address of the pd-server admin HTTP surface.
    #[clap(long, global = true, default_value = "127.0.0.1:2379")]
    addr: String,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect stores.
    Store(store::StoreArgs),
    /// Inspect regions.
    Region(region::RegionArgs),
    /// Read or patch the runtime-tunable scheduling config.
    Config(config::ConfigArgs),
    /// Manage schedulers.
    Scheduler(scheduler::SchedulerArgs),
    /// Inspect or cancel operators.
    Operator(operator::OperatorArgs),
    /// Register namespace-to-table mappings.
    Namespace(namespace::NamespaceArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Store(args) => store::run(&cli.addr, args).await,
        Commands::Region(args) => region::run(&cli.addr, args).await,
        Commands::Config(args) => config::run(&cli.addr, args).await,
        Commands::Scheduler(args) => scheduler::run(&cli.addr, args).await,
        Commands::Operator(args) => operator::run(&cli.addr, args).await,
        Commands::Namespace(args) => namespace::run(&cli.addr, args).await,
    }
}
