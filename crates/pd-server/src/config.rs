//! Startup configuration (SPEC_FULL.md §1.3): a TOML file merged with
//! command-line flags, in the shape the teacher's `guardian` binary loads
//! its own config before composing the rest of the process.

use pd_types::config::PdConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Where this node's own KV data file lives.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Address the admin/client RPC surface binds to.
    pub listen_addr: SocketAddr,

    /// Address advertised to peers and clients as this node's own endpoint.
    pub advertise_addr: SocketAddr,

    /// Address the `pd-telemetry` HTTP server (`/metrics`, `/healthz`,
    /// `/readyz`) binds to.
    pub telemetry_addr: SocketAddr,

    /// A stable identifier for this node, used as the lease holder token in
    /// leader election (spec.md §4.J).
    pub node_id: String,

    /// Tunable scheduling options (spec.md §6); falls back to
    /// [`PdConfig::default`] for anything the file omits.
    #[serde(default)]
    pub scheduling: PdConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl ServerConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
        let config: ServerConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;
        Ok(config)
    }

    pub fn kv_path(&self) -> PathBuf {
        self.data_dir.join("pd.redb")
    }
}
