//! Leader lifecycle (spec.md §4.J): "On acquisition it runs §C-I; on loss it
//! tears those down and continues to serve read-only proxying... Watch loops
//! re-check leadership on every failed outgoing RPC." This owns the
//! lease campaign loop and, while holding the lease, the timestamp oracle,
//! operator controller, and patrol/dispatch loops.

use crate::heartbeat::HeartbeatIngest;
use crate::lease::LeaseManager;
use crate::patrol::{spawn_dispatch_poll_loop, spawn_patrol_loop, SchedulerRegistry};
use pd_api::cluster::ClusterView;
use pd_api::scheduling::Checker;
use pd_controller::OperatorControllerImpl;
use pd_storage::RedbKvGateway;
use pd_tso::TsoOracle;
use pd_types::config::PdConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How often this node re-campaigns for, or renews, the leadership lease.
pub const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(2);
/// The lease's own TTL; must stay well above the renew interval so a single
/// missed renewal doesn't cost the lease.
pub const LEASE_TTL: Duration = Duration::from_secs(10);

struct LeaderResources {
    controller: Arc<OperatorControllerImpl>,
    tso: Arc<TsoOracle>,
    patrol: JoinHandle<()>,
    dispatch_poll: JoinHandle<()>,
}

impl Drop for LeaderResources {
    fn drop(&mut self) {
        self.patrol.abort();
        self.dispatch_poll.abort();
    }
}

/// Everything the leader-only subsystems need to start, gathered so
/// `LeaderLifecycle::run` doesn't need a long parameter list.
pub struct LeaderContext {
    pub gateway: Arc<RedbKvGateway>,
    pub cluster: Arc<dyn ClusterView>,
    pub config: Arc<parking_lot::RwLock<PdConfig>>,
    pub checkers: Vec<Arc<dyn Checker>>,
    pub schedulers: Arc<SchedulerRegistry>,
}

/// Handles and shared state another component (e.g. the RPC surface) reads
/// while this node may or may not be leader.
pub struct LeaderLifecycle {
    ctx: LeaderContext,
    lease: LeaseManager<RedbKvGateway>,
    is_leader: Arc<AtomicBool>,
    tso: Arc<parking_lot::RwLock<Option<Arc<TsoOracle>>>>,
    heartbeat: Arc<parking_lot::RwLock<Option<Arc<HeartbeatIngest>>>>,
    controller: Arc<parking_lot::RwLock<Option<Arc<OperatorControllerImpl>>>>,
}

impl LeaderLifecycle {
    pub fn new(
        ctx: LeaderContext,
        node_id: impl Into<String>,
        advertise_addr: impl Into<String>,
        is_leader: Arc<AtomicBool>,
    ) -> Self {
        let lease = LeaseManager::new(ctx.gateway.clone(), node_id, advertise_addr, LEASE_TTL);
        Self {
            ctx,
            lease,
            is_leader,
            tso: Arc::new(parking_lot::RwLock::new(None)),
            heartbeat: Arc::new(parking_lot::RwLock::new(None)),
            controller: Arc::new(parking_lot::RwLock::new(None)),
        }
    }

    /// The currently-active timestamp oracle, if this node is leader.
    pub fn tso(&self) -> Option<Arc<TsoOracle>> {
        self.tso.read().clone()
    }

    /// Where a non-leader caller should retry, read from the lease record.
    pub async fn current_leader_addr(&self) -> Option<String> {
        self.lease.current_holder().await.ok().flatten().map(|r| r.advertise_addr)
    }

    /// The currently-active heartbeat ingest pipeline, if this node is leader.
    pub fn heartbeat_ingest(&self) -> Option<Arc<HeartbeatIngest>> {
        self.heartbeat.read().clone()
    }

    /// The currently-active operator controller, if this node is leader.
    pub fn operator_controller(&self) -> Option<Arc<OperatorControllerImpl>> {
        self.controller.read().clone()
    }

    /// The cluster model, available regardless of leadership: admin reads
    /// (store/region listing) don't need this node to be the leader.
    pub fn cluster(&self) -> Arc<dyn ClusterView> {
        self.ctx.cluster.clone()
    }

    /// The persistence gateway, available regardless of leadership.
    pub fn gateway(&self) -> Arc<RedbKvGateway> {
        self.ctx.gateway.clone()
    }

    /// The runtime-tunable scheduling config, available regardless of
    /// leadership.
    pub fn config(&self) -> Arc<parking_lot::RwLock<PdConfig>> {
        self.ctx.config.clone()
    }

    /// The registry of enabled schedulers, available regardless of
    /// leadership.
    pub fn schedulers(&self) -> Arc<SchedulerRegistry> {
        self.ctx.schedulers.clone()
    }

    /// Runs the campaign loop forever: acquires or renews the lease each
    /// tick, starting leader-only resources on acquisition and tearing them
    /// down on loss.
    pub async fn run(&self) -> ! {
        let mut resources: Option<LeaderResources> = None;
        loop {
            match self.lease.campaign().await {
                Ok(true) => {
                    if resources.is_none() {
                        tracing::info!(target: "pd_server", "acquired cluster leadership");
                        match self.start_leader_resources().await {
                            Ok(r) => {
                                resources = Some(r);
                                self.is_leader.store(true, Ordering::Relaxed);
                            }
                            Err(e) => {
                                tracing::error!(target: "pd_server", error = %e, "failed to start leader resources, resigning");
                                let _ = self.lease.resign().await;
                            }
                        }
                    }
                }
                Ok(false) => {
                    if resources.take().is_some() {
                        tracing::info!(target: "pd_server", "lost cluster leadership");
                        *self.tso.write() = None;
                        *self.heartbeat.write() = None;
                        *self.controller.write() = None;
                        self.is_leader.store(false, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    tracing::error!(target: "pd_server", error = %e, "lease campaign failed");
                }
            }
            tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
        }
    }

    async fn start_leader_resources(&self) -> anyhow::Result<LeaderResources> {
        let tso = Arc::new(TsoOracle::start(self.ctx.gateway.clone()).await.map_err(|e| anyhow::anyhow!("starting tso oracle: {e}"))?);
        let controller = Arc::new(OperatorControllerImpl::new(self.ctx.config.clone()));
        let ingest = Arc::new(HeartbeatIngest::new(
            self.ctx.cluster.clone(),
            self.ctx.gateway.clone(),
            controller.clone(),
            self.ctx.checkers.clone(),
        ));

        let patrol = spawn_patrol_loop(self.ctx.cluster.clone(), controller.clone(), self.ctx.checkers.clone(), self.ctx.schedulers.clone());
        let dispatch_poll = spawn_dispatch_poll_loop(self.ctx.cluster.clone(), controller.clone());

        *self.tso.write() = Some(tso.clone());
        *self.heartbeat.write() = Some(ingest);
        *self.controller.write() = Some(controller.clone());

        Ok(LeaderResources { controller, tso, patrol, dispatch_poll })
    }
}
