//! Galera cluster health evaluation
//!
//! A health check decides, within a caller supplied budget, whether a Galera
//! cluster is healthy enough to not need recovery. Each check uses two
//! deadlines:
//!
//! - every Kubernetes read gets its own short timeout. A slow API server makes
//!   the tick inconclusive and the next tick tries again. The reads of one
//!   tick together are still cut at the cluster deadline.
//! - the SQL quorum check runs against the overall cluster deadline, so a
//!   wedged member consumes the real budget.
//!
//! Once a cluster is marked not ready, recovery owns it. The monitor then
//! only watches for the quorum to come back and flips `GaleraReady` to True.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tokio::time::{Instant, sleep_until, timeout, timeout_at};
use tracing::{debug, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{Error, Errors, Result};
use crate::controller::pod::is_pod_ready;
use crate::controller::status::{StatusManager, update_conditions};
use crate::controller::store::{ClusterStore, RecordedEvent};
use crate::crd::{MariaDB, condition_reasons};
use crate::sql::SqlClientFactory;

/// Interval between two health ticks
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Deadlines threaded through one health tick
#[derive(Debug, Clone, Copy)]
pub struct CheckDeadlines {
    /// Timeout of each individual Kubernetes read
    pub kube_api: Duration,
    /// End of the whole health budget, bounds the SQL check
    pub cluster: Instant,
}

/// Result of a single health tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Healthy,
    Unhealthy,
    /// A Kubernetes read timed out, nothing can be concluded
    Inconclusive,
}

/// Recovery is this evaluator's concern only while all of these hold
pub fn is_recovery_applicable(mariadb: &MariaDB) -> bool {
    is_recovery_eligible(mariadb) && !mariadb.has_galera_not_ready_condition()
}

/// The cluster was handed over to recovery and may be healthy again
pub fn is_recovery_pending(mariadb: &MariaDB) -> bool {
    is_recovery_eligible(mariadb) && mariadb.has_galera_not_ready_condition()
}

fn is_recovery_eligible(mariadb: &MariaDB) -> bool {
    mariadb.is_galera_enabled()
        && mariadb.is_galera_recovery_enabled()
        && !mariadb.is_restoring_backup()
        && !mariadb.is_resizing_storage()
        && mariadb.has_configured_condition()
}

#[derive(Debug, Clone, Copy)]
enum CheckMode {
    /// Watching a healthy cluster for quorum loss
    Monitor,
    /// Waiting for a cluster marked not ready to regain quorum
    Recovery,
}

impl CheckMode {
    fn applies(self, mariadb: &MariaDB) -> bool {
        match self {
            CheckMode::Monitor => is_recovery_applicable(mariadb),
            CheckMode::Recovery => is_recovery_pending(mariadb),
        }
    }

    /// Outcome when the cluster is outside this mode's concern
    fn skipped(self) -> TickOutcome {
        match self {
            CheckMode::Monitor => TickOutcome::Healthy,
            CheckMode::Recovery => TickOutcome::Inconclusive,
        }
    }
}

enum Observation {
    Settled(TickOutcome),
    ReadyMember { mariadb: MariaDB, pod: String },
}

pub struct ClusterHealthEvaluator<'a> {
    store: &'a dyn ClusterStore,
    sql: &'a dyn SqlClientFactory,
    kube_api_timeout: Duration,
}

impl<'a> ClusterHealthEvaluator<'a> {
    pub fn new(
        store: &'a dyn ClusterStore,
        sql: &'a dyn SqlClientFactory,
        kube_api_timeout: Duration,
    ) -> Self {
        Self {
            store,
            sql,
            kube_api_timeout,
        }
    }

    pub fn from_context(ctx: &'a Context) -> Self {
        Self::new(
            ctx.store.as_ref(),
            ctx.sql.as_ref(),
            ctx.config.kube_api_timeout,
        )
    }

    /// Poll until the cluster is healthy or `budget` runs out
    ///
    /// Running out of budget is not an error: it yields `Ok(false)` when at
    /// least one tick saw an unhealthy cluster and `Ok(true)` when every tick
    /// was inconclusive. Any other failure aborts the poll.
    pub async fn poll_until_healthy_with_timeout(
        &self,
        namespace: &str,
        name: &str,
        budget: Duration,
    ) -> Result<bool> {
        let deadline = Instant::now() + budget;
        let mut saw_unhealthy = false;

        loop {
            let deadlines = CheckDeadlines {
                kube_api: self.kube_api_timeout,
                cluster: deadline,
            };
            match self.is_healthy(namespace, name, deadlines).await? {
                TickOutcome::Healthy => return Ok(true),
                TickOutcome::Unhealthy => saw_unhealthy = true,
                TickOutcome::Inconclusive => {
                    debug!("Health tick inconclusive, retrying");
                }
            }

            let next = Instant::now() + POLL_INTERVAL;
            if next >= deadline {
                break;
            }
            sleep_until(next).await;
        }

        debug!(saw_unhealthy, "Health budget exhausted");
        Ok(!saw_unhealthy)
    }

    /// One health tick of a cluster the monitor is responsible for
    pub async fn is_healthy(
        &self,
        namespace: &str,
        name: &str,
        deadlines: CheckDeadlines,
    ) -> Result<TickOutcome> {
        self.tick(namespace, name, deadlines, CheckMode::Monitor)
            .await
    }

    /// One health tick of a cluster handed over to recovery
    ///
    /// `Healthy` means the quorum is back. A cluster that is no longer
    /// waiting on recovery yields `Inconclusive`.
    pub async fn is_recovered(
        &self,
        namespace: &str,
        name: &str,
        deadlines: CheckDeadlines,
    ) -> Result<TickOutcome> {
        self.tick(namespace, name, deadlines, CheckMode::Recovery)
            .await
    }

    async fn tick(
        &self,
        namespace: &str,
        name: &str,
        deadlines: CheckDeadlines,
        mode: CheckMode,
    ) -> Result<TickOutcome> {
        // The reads together never outlast the cluster budget
        let observed = match timeout_at(
            deadlines.cluster,
            self.observe(namespace, name, deadlines.kube_api, mode),
        )
        .await
        {
            Ok(observed) => observed?,
            Err(_) => {
                debug!("Kubernetes reads exceeded the health budget");
                return Ok(TickOutcome::Inconclusive);
            }
        };
        let (mariadb, ready_pod) = match observed {
            Observation::Settled(outcome) => return Ok(outcome),
            Observation::ReadyMember { mariadb, pod } => (mariadb, pod),
        };

        let min_cluster_size = mariadb
            .galera_recovery()
            .map(|r| r.min_cluster_size(mariadb.spec.replicas))
            .transpose()
            .map_err(Error::ValidationError)?
            .unwrap_or(1);

        // SQL check, bounded by the caller's budget
        let sql_check = async {
            let client = self.sql.connect(&mariadb, &ready_pod).await?;
            if !client.is_system_variable_enabled("wsrep_on").await? {
                debug!(pod = %ready_pod, "wsrep_on is disabled");
                return Ok::<_, Error>(TickOutcome::Unhealthy);
            }
            let size = client.galera_cluster_size().await?;
            debug!(pod = %ready_pod, size, min_cluster_size, "Galera cluster size");
            Ok(if size >= min_cluster_size {
                TickOutcome::Healthy
            } else {
                TickOutcome::Unhealthy
            })
        };
        match timeout_at(deadlines.cluster, sql_check).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(pod = %ready_pod, "SQL check exceeded the health budget");
                Ok(TickOutcome::Unhealthy)
            }
        }
    }

    /// Kubernetes side of a tick, each read bounded by `kube_api`
    async fn observe(
        &self,
        namespace: &str,
        name: &str,
        kube_api: Duration,
        mode: CheckMode,
    ) -> Result<Observation> {
        let Some(mariadb) = kube_read(kube_api, self.store.get_mariadb(namespace, name)).await?
        else {
            return Ok(Observation::Settled(TickOutcome::Inconclusive));
        };
        if !mode.applies(&mariadb) {
            return Ok(Observation::Settled(mode.skipped()));
        }

        let Some(sts) = kube_read(kube_api, self.store.get_statefulset(namespace, name)).await?
        else {
            return Ok(Observation::Settled(TickOutcome::Inconclusive));
        };
        let sts = sts.ok_or_else(|| Error::NotFound(format!("StatefulSet {namespace}/{name}")))?;
        let ready_replicas = sts
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0);
        if ready_replicas == 0 {
            debug!("StatefulSet has no ready replicas");
            return Ok(Observation::Settled(TickOutcome::Unhealthy));
        }

        match self.first_ready_pod(&mariadb, kube_api).await? {
            None => Ok(Observation::Settled(TickOutcome::Inconclusive)),
            // StatefulSet status lags behind the pods, retried by the error policy
            Some(None) => Err(Error::TransientError(format!(
                "no ready pods in {namespace}/{name} ({ready_replicas} reported ready)"
            ))),
            Some(Some(pod)) => Ok(Observation::ReadyMember { mariadb, pod }),
        }
    }

    /// First Ready member in index order
    ///
    /// The outer `None` means a read timed out.
    async fn first_ready_pod(
        &self,
        mariadb: &MariaDB,
        kube_api: Duration,
    ) -> Result<Option<Option<String>>> {
        let ns = mariadb.namespace().unwrap_or_default();
        for index in 0..mariadb.spec.replicas {
            let pod_name = mariadb.pod_name(index);
            let Some(pod) = kube_read(kube_api, self.store.get_pod(&ns, &pod_name)).await? else {
                return Ok(None);
            };
            if pod.as_ref().is_some_and(is_pod_ready) {
                return Ok(Some(Some(pod_name)));
            }
        }
        Ok(Some(None))
    }

    /// Lowest index Ready member other than `exclude`
    pub async fn healthy_replica(&self, mariadb: &MariaDB, exclude: i32) -> Result<Option<i32>> {
        let ns = mariadb.namespace().unwrap_or_default();
        for index in (0..mariadb.spec.replicas).filter(|i| *i != exclude) {
            let pod = kube_read(
                self.kube_api_timeout,
                self.store.get_pod(&ns, &mariadb.pod_name(index)),
            )
            .await?
            .ok_or_else(|| {
                Error::Timeout(format!("reading pod {}", mariadb.pod_name(index)))
            })?;
            if pod.as_ref().is_some_and(is_pod_ready) {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}

/// Run a Kubernetes read under its own timeout; `None` when it timed out
async fn kube_read<T, F>(limit: Duration, read: F) -> Result<Option<T>>
where
    F: Future<Output = Result<T>>,
{
    match timeout(limit, read).await {
        Ok(result) => result.map(Some),
        Err(_) => {
            warn!(timeout = ?limit, "Kubernetes read timed out");
            Ok(None)
        }
    }
}

/// Galera health controller entry point
///
/// Requeues every monitor interval while recovery applies. When the cluster
/// stays unhealthy for the whole budget, the stale recovery progress is
/// cleared and the cluster is marked not ready, handing over to recovery.
/// While recovery owns the cluster, each pass checks once whether the quorum
/// is back.
#[instrument(skip(mariadb, ctx), fields(name = %mariadb.name_any(), namespace = mariadb.namespace().unwrap_or_default()))]
pub async fn reconcile_galera(mariadb: Arc<MariaDB>, ctx: Arc<Context>) -> Result<Action> {
    let Some(recovery) = mariadb.galera_recovery() else {
        return Ok(Action::await_change());
    };
    let monitor_interval = recovery.cluster_monitor_interval();
    let budget = recovery.cluster_healthy_timeout();

    if is_recovery_pending(&mariadb) {
        return check_recovered(&mariadb, &ctx, budget, monitor_interval).await;
    }
    if !is_recovery_applicable(&mariadb) {
        return Ok(Action::await_change());
    }

    let ns = mariadb.namespace().unwrap_or_default();
    let name = mariadb.name_any();

    let evaluator = ClusterHealthEvaluator::from_context(&ctx);
    let healthy = match evaluator
        .poll_until_healthy_with_timeout(&ns, &name, budget)
        .await
    {
        Ok(healthy) => healthy,
        Err(e) if e.is_not_found() => {
            debug!("MariaDB or its StatefulSet is gone: {}", e);
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e),
    };
    if healthy {
        debug!("Galera cluster healthy");
        return Ok(Action::requeue(monitor_interval));
    }

    info!("Galera cluster not healthy after {:?}", budget);
    if let Some(ref state) = ctx.health_state {
        state.metrics.record_galera_unhealthy(&ns, &name);
    }

    let fresh = ctx.store.get_mariadb(&ns, &name).await?;
    let message = "Galera cluster is not healthy";
    let mut errors = Errors::new();
    errors.collect(
        StatusManager::new(&fresh, ctx.store.as_ref())
            .patch(|status| {
                status.galera_recovery = None;
                update_conditions(status, fresh.metadata.generation, |c| {
                    c.galera_ready(false, condition_reasons::GALERA_NOT_READY, message)
                        .ready(false, condition_reasons::CLUSTER_NOT_HEALTHY, message)
                });
            })
            .await,
    );
    errors.collect(
        ctx.store
            .publish_event(
                &fresh,
                RecordedEvent::warning(
                    condition_reasons::CLUSTER_NOT_HEALTHY,
                    "HealthCheck",
                    message,
                ),
            )
            .await,
    );
    errors.into_result()?;

    Ok(Action::requeue(monitor_interval))
}

/// Mark a cluster held by recovery ready again once a tick finds it healthy
async fn check_recovered(
    mariadb: &MariaDB,
    ctx: &Context,
    budget: Duration,
    monitor_interval: Duration,
) -> Result<Action> {
    let ns = mariadb.namespace().unwrap_or_default();
    let name = mariadb.name_any();

    let deadlines = CheckDeadlines {
        kube_api: ctx.config.kube_api_timeout,
        cluster: Instant::now() + budget,
    };
    let outcome = match ClusterHealthEvaluator::from_context(ctx)
        .is_recovered(&ns, &name, deadlines)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) if e.is_not_found() => {
            debug!("MariaDB or its StatefulSet is gone: {}", e);
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e),
    };
    if outcome != TickOutcome::Healthy {
        debug!(?outcome, "Galera cluster still waiting on recovery");
        return Ok(Action::requeue(monitor_interval));
    }

    info!("Galera cluster healthy again");
    let fresh = ctx.store.get_mariadb(&ns, &name).await?;
    let message = "Galera cluster is healthy";
    let mut errors = Errors::new();
    errors.collect(
        StatusManager::new(&fresh, ctx.store.as_ref())
            .patch_conditions(|c| c.galera_ready(true, condition_reasons::GALERA_READY, message))
            .await,
    );
    errors.collect(
        ctx.store
            .publish_event(
                &fresh,
                RecordedEvent::normal(condition_reasons::GALERA_READY, "HealthCheck", message),
            )
            .await,
    );
    errors.into_result()?;

    Ok(Action::requeue(monitor_interval))
}
