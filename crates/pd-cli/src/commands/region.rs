// region sub-command (spec.md §6): list, inspect, or look up regions by key.

use crate::util::{format_key_arg, get_json};
use anyhow::Result;
use clap::{Parser, Subcommand};
use pd_types::region::Region;

#[derive(Parser, Debug)]
pub struct RegionArgs {
    #[clap(subcommand)]
    pub command: RegionCommands,
}

#[derive(Subcommand, Debug)]
pub enum RegionCommands {
    /// List regions, optionally capped at `--limit`.
    List {
        #[clap(long, default_value_t = 0)]
        limit: usize,
    },
    /// Show one region by id.
    Show { id: u64 },
    /// Look up the region covering a key.
    Key {
        key: String,
        #[clap(long, default_value = "raw")]
        format: String,
    },
}

fn print_region(region: &Region) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(region)?);
    Ok(())
}

pub async fn run(addr: &str, args: RegionArgs) -> Result<()> {
    match args.command {
        RegionCommands::List { limit } => {
            let regions: Vec<Region> = get_json(addr, &format!("/v1/regions?limit={limit}")).await?;
            for region in &regions {
                println!(
                    "{:>6}  [{}, {})  peers={:<2} epoch={}/{}",
                    region.id.get(),
                    hex::encode(&region.start_key),
                    hex::encode(&region.end_key),
                    region.peers.len(),
                    region.epoch.conf_ver,
                    region.epoch.version,
                );
            }
        }
        RegionCommands::Show { id } => {
            let region: Region = get_json(addr, &format!("/v1/regions/{id}")).await?;
            print_region(&region)?;
        }
        RegionCommands::Key { key, format } => {
            let raw = format_key_arg(&key, &format)?;
            let encoded = urlencoding_simple(&raw);
            let region: Region = get_json(addr, &format!("/v1/regions/by-key?key={encoded}")).await?;
            print_region(&region)?;
        }
    }
    Ok(())
}

/// Percent-encodes every byte outside the URI-unreserved set, operating
/// byte-wise rather than char-wise so multi-byte UTF-8 sequences in the key
/// survive intact instead of being reinterpreted one byte at a time.
fn urlencoding_simple(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_unreserved_bytes_untouched() {
        assert_eq!(urlencoding_simple("abc-XYZ_0.9~"), "abc-XYZ_0.9~");
    }

    #[test]
    fn encodes_special_ascii_bytes() {
        assert_eq!(urlencoding_simple("a b&c"), "a%20b%26c");
    }

    #[test]
    fn encodes_multi_byte_utf8_key_byte_wise() {
        // "é" is 0xC3 0xA9 in UTF-8; a char-wise fallback would corrupt this.
        assert_eq!(urlencoding_simple("é"), "%C3%A9");
    }
}
