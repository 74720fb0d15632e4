// scheduler sub-command (spec.md §6): list, add, or remove schedulers.

use crate::util::{delete_json, get_json, post_json};
use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Parser, Debug)]
pub struct SchedulerArgs {
    #[clap(subcommand)]
    pub command: SchedulerCommands,
}

#[derive(Subcommand, Debug)]
pub enum SchedulerCommands {
    /// List enabled schedulers.
    List,
    /// Add an evict-leader scheduler for one store.
    AddEvictLeader { store_id: u64 },
    /// Add a shuffle-leader scheduler.
    AddShuffleLeader {
        #[clap(long, default_value_t = 1)]
        seed: u64,
    },
    /// Add a random-merge scheduler.
    AddRandomMerge {
        #[clap(long, default_value_t = 1)]
        seed: u64,
    },
    /// Remove a scheduler by name.
    Remove { name: String },
}

pub async fn run(addr: &str, args: SchedulerArgs) -> Result<()> {
    match args.command {
        SchedulerCommands::List => {
            let names: Vec<String> = get_json(addr, "/v1/schedulers").await?;
            for name in names {
                println!("{name}");
            }
        }
        SchedulerCommands::AddEvictLeader { store_id } => {
            let body = json!({ "kind": "evict-leader", "store_id": store_id });
            let _: serde_json::Value = post_json(addr, "/v1/schedulers", &body).await?;
            println!("added evict-leader-scheduler for store {store_id}");
        }
        SchedulerCommands::AddShuffleLeader { seed } => {
            let body = json!({ "kind": "shuffle-leader", "seed": seed });
            let _: serde_json::Value = post_json(addr, "/v1/schedulers", &body).await?;
            println!("added shuffle-leader-scheduler");
        }
        SchedulerCommands::AddRandomMerge { seed } => {
            let body = json!({ "kind": "random-merge", "seed": seed });
            let _: serde_json::Value = post_json(addr, "/v1/schedulers", &body).await?;
            println!("added random-merge-scheduler");
        }
        SchedulerCommands::Remove { name } => {
            let resp: serde_json::Value = delete_json(addr, &format!("/v1/schedulers/{name}")).await?;
            let removed = resp["removed"].as_bool().unwrap_or(false);
            println!("removed: {removed}");
        }
    }
    Ok(())
}
