// config sub-command (spec.md §6): read or patch the runtime-tunable
// scheduling config.

use crate::util::{get_json, put_json};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use pd_types::config::PdConfig;
use std::collections::HashMap;

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[clap(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the full current config.
    Show,
    /// Set one option, e.g. `pdctl config set max-replicas 5`.
    Set { key: String, value: String },
}

pub async fn run(addr: &str, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => {
            let config: PdConfig = get_json(addr, "/v1/config").await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommands::Set { key, value } => {
            let parsed: serde_json::Value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value.clone()));
            let mut patch = HashMap::new();
            patch.insert(key.clone(), parsed);
            let updated: PdConfig = put_json(addr, "/v1/config", &patch).await?;
            let as_value = serde_json::to_value(&updated)?;
            match as_value.get(&key) {
                Some(v) => println!("{key} = {v}"),
                None => return Err(anyhow!("unknown config option '{key}'")),
            }
        }
    }
    Ok(())
}
