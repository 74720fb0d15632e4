// namespace sub-command (spec.md §6 "namespace create <ns> <table_id>").

use crate::util::post_json;
use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Parser, Debug)]
pub struct NamespaceArgs {
    #[clap(subcommand)]
    pub command: NamespaceCommands,
}

#[derive(Subcommand, Debug)]
pub enum NamespaceCommands {
    /// Register a namespace-to-table mapping.
    Create { namespace: String, table_id: u64 },
}

pub async fn run(addr: &str, args: NamespaceArgs) -> Result<()> {
    match args.command {
        NamespaceCommands::Create { namespace, table_id } => {
            let body = json!({ "namespace": namespace, "table_id": table_id });
            let _: serde_json::Value = post_json(addr, "/v1/namespaces", &body).await?;
            println!("created namespace '{namespace}' -> table {table_id}");
        }
    }
    Ok(())
}
