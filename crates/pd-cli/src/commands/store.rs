// store sub-command (spec.md §6): list or inspect stores.

use crate::util::get_json;
use anyhow::Result;
use clap::{Parser, Subcommand};
use pd_types::store::StoreState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Parser, Debug)]
pub struct StoreArgs {
    #[clap(subcommand)]
    pub command: StoreCommands,
}

#[derive(Subcommand, Debug)]
pub enum StoreCommands {
    /// List every store known to the cluster.
    List,
    /// Show one store by id.
    Show { id: u64 },
}

/// Mirrors the `StoreView` wire shape served by `pd-server`'s admin surface;
/// the underlying `Store` type doesn't derive `Deserialize`.
#[derive(Debug, Serialize, Deserialize)]
struct StoreView {
    id: u64,
    address: String,
    labels: BTreeMap<String, String>,
    state: StoreState,
    available_bytes: u64,
    capacity_bytes: u64,
    used_bytes: u64,
    region_count: u32,
    leader_count: u32,
    pending_peer_count: u32,
    learner_count: u32,
    region_size: u64,
    leader_size: u64,
    sending_snap_count: u32,
    receiving_snap_count: u32,
    applying_snap_count: u32,
    is_busy: bool,
    seconds_since_heartbeat: u64,
}

pub async fn run(addr: &str, args: StoreArgs) -> Result<()> {
    match args.command {
        StoreCommands::List => {
            let stores: Vec<StoreView> = get_json(addr, "/v1/stores").await?;
            for store in stores {
                println!(
                    "{:>6}  {:<22} {:?}  regions={:<6} leaders={:<6} available={}",
                    store.id, store.address, store.state, store.region_count, store.leader_count, store.available_bytes,
                );
            }
        }
        StoreCommands::Show { id } => {
            let store: StoreView = get_json(addr, &format!("/v1/stores/{id}")).await?;
            println!("{}", serde_json::to_string_pretty(&store)?);
        }
    }
    Ok(())
}
