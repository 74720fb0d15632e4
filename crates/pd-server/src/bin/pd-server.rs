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

use anyhow::Result;
use clap::Parser;
use parking_lot::RwLock;
use pd_api::ids::SyncIdSource;
use pd_cluster::cluster_model::ClusterModel;
use pd_schedule::checkers::{JointStateChecker, LearnerChecker, MergeChecker, ReplicaChecker};
use pd_schedule::hot_stat::HotRegionStats;
use pd_schedule::schedulers::{HotRegionScheduler, LeaderBalanceScheduler, RegionBalanceScheduler};
use pd_server::config::ServerConfig;
use pd_server::leader::{LeaderContext, LeaderLifecycle};
use pd_server::patrol::SchedulerRegistry;
use pd_server::sync_id::BackgroundIdSource;
use pd_storage::{RedbKvGateway, StorageIdAllocator};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Parser, Debug)]
struct ServerOpts {
    #[clap(long, env = "PD_CONFIG")]
    config: String,

    #[clap(long, env = "PD_LISTEN_ADDR", help = "Overrides listen_addr from the config file")]
    listen_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    pd_telemetry::init::init_tracing()?;

    let opts = ServerOpts::parse();
    let mut config = ServerConfig::load(std::path::Path::new(&opts.config))?;
    if let Some(listen_addr) = opts.listen_addr {
        config.listen_addr = listen_addr.parse()?;
    }
    tracing::info!(target: "pd_server", node_id = %config.node_id, listen_addr = %config.listen_addr, "starting");

    std::fs::create_dir_all(&config.data_dir)?;
    let gateway = Arc::new(RedbKvGateway::open(config.kv_path()).map_err(|e| anyhow::anyhow!("opening kv gateway: {e}"))?);
    let cluster: Arc<dyn pd_api::cluster::ClusterView> = Arc::new(ClusterModel::new());
    let pd_config = Arc::new(RwLock::new(config.scheduling.clone()));

    let id_allocator = Arc::new(StorageIdAllocator::new(gateway.clone()));
    let id_source: Arc<dyn SyncIdSource> = Arc::new(BackgroundIdSource::spawn(id_allocator));
    let hot_stats = Arc::new(HotRegionStats::new());

    let checkers: Vec<Arc<dyn pd_api::scheduling::Checker>> = vec![
        Arc::new(JointStateChecker),
        Arc::new(LearnerChecker),
        Arc::new(ReplicaChecker::new(pd_config.clone(), id_source.clone())),
        Arc::new(MergeChecker::new(pd_config.clone(), id_source.clone(), hot_stats.clone())),
    ];

    let schedulers: Vec<Arc<dyn pd_api::scheduling::Scheduler>> = vec![
        Arc::new(LeaderBalanceScheduler::new(hot_stats.clone())),
        Arc::new(RegionBalanceScheduler::new(pd_config.clone(), id_source.clone(), hot_stats.clone())),
        Arc::new(HotRegionScheduler::new(pd_config.clone(), id_source.clone(), hot_stats.clone())),
    ];
    let schedulers = Arc::new(SchedulerRegistry::new(schedulers));

    let is_leader = Arc::new(AtomicBool::new(false));
    tokio::spawn(pd_telemetry::http::run_server(config.telemetry_addr, is_leader.clone()));

    let leader_ctx = LeaderContext { gateway, cluster, config: pd_config, checkers, schedulers };
    let lifecycle = Arc::new(LeaderLifecycle::new(leader_ctx, config.node_id.clone(), config.advertise_addr.to_string(), is_leader));

    let rpc_lifecycle = lifecycle.clone();
    let rpc_addr = config.listen_addr;
    tokio::spawn(async move { pd_server::rpc::serve(rpc_addr, rpc_lifecycle).await });

    eprintln!("PD_SERVER_LISTENING_ON_{}", config.listen_addr);

    lifecycle.run().await
}
