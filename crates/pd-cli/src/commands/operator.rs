// operator sub-command (spec.md §6): inspect or cancel in-flight operators.

use crate::util::{delete_json, get_json};
use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
pub struct OperatorArgs {
    #[clap(subcommand)]
    pub command: OperatorCommands,
}

#[derive(Subcommand, Debug)]
pub enum OperatorCommands {
    /// List every operator currently running.
    List,
    /// Show the operator running on one region, if any.
    Show { region_id: u64 },
    /// Cancel the operator running on one region.
    Cancel { region_id: u64 },
}

pub async fn run(addr: &str, args: OperatorArgs) -> Result<()> {
    match args.command {
        OperatorCommands::List => {
            let ops: serde_json::Value = get_json(addr, "/v1/operators").await?;
            println!("{}", serde_json::to_string_pretty(&ops)?);
        }
        OperatorCommands::Show { region_id } => {
            let op: serde_json::Value = get_json(addr, &format!("/v1/operators/{region_id}")).await?;
            println!("{}", serde_json::to_string_pretty(&op)?);
        }
        OperatorCommands::Cancel { region_id } => {
            let _: serde_json::Value = delete_json(addr, &format!("/v1/operators/{region_id}")).await?;
            println!("cancelled operator on region {region_id}");
        }
    }
    Ok(())
}
