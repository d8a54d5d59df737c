//! Reconciliation logic for MariaDB resources
//!
//! A pass runs a fixed list of named phases strictly in order, since later
//! phases rely on the objects created by earlier ones. The first failing phase
//! ends the pass. A not-found error means the resource went away mid-pass and
//! stops it quietly; any other error is written to the Ready condition.
//! Whatever happened, the pass ends by re-reading the resource and refreshing
//! the observed status from the StatefulSet.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{BackoffConfig, Error, Errors, Result};
use crate::controller::state_machine::{
    PrimaryEvent, PrimaryState, TransitionContext, TransitionResult,
};
use crate::controller::status::{StatusManager, update_conditions};
use crate::controller::store::{ChildObject, RecordedEvent};
use crate::controller::validation::validate_spec;
use crate::crd::{MariaDB, condition_reasons, condition_status, condition_types};
use crate::resources::common::root_password_secret_name;
use crate::resources::{configmap, pdb, secret, service, statefulset};

/// Requeue period of a successful pass
const RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default backoff configuration for error handling
fn default_backoff() -> BackoffConfig {
    BackoffConfig::default()
}

/// One named step of a reconciliation pass
#[async_trait]
pub trait Phase: Send + Sync {
    fn name(&self) -> &'static str;

    async fn reconcile(&self, mariadb: &MariaDB, ctx: &Context) -> Result<()>;
}

struct SpecPhase;

#[async_trait]
impl Phase for SpecPhase {
    fn name(&self) -> &'static str {
        "Spec"
    }

    async fn reconcile(&self, mariadb: &MariaDB, _ctx: &Context) -> Result<()> {
        validate_spec(mariadb)
    }
}

/// Root credentials, created once, and the DSN derived from them
struct SecretPhase;

#[async_trait]
impl Phase for SecretPhase {
    fn name(&self) -> &'static str {
        "Secret"
    }

    async fn reconcile(&self, mariadb: &MariaDB, ctx: &Context) -> Result<()> {
        let ns = mariadb.namespace().unwrap_or_default();
        let root_name = root_password_secret_name(&mariadb.name_any());

        let root = match ctx.store.get_secret(&ns, &root_name).await? {
            Some(existing) => existing,
            None => {
                info!("Creating root credentials Secret {}", root_name);
                let generated = secret::generate_root_secret(mariadb);
                ctx.store
                    .apply(mariadb, ChildObject::Secret(generated.clone()))
                    .await?;
                generated
            }
        };

        let password = secret::root_password(&root).ok_or_else(|| {
            Error::InvalidConfig(format!("Secret {root_name} has no root password"))
        })?;
        let dsn = secret::generate_dsn_secret(mariadb, &password, &ctx.config.cluster_name);
        ctx.store.apply(mariadb, ChildObject::Secret(dsn)).await
    }
}

struct ConfigMapPhase;

#[async_trait]
impl Phase for ConfigMapPhase {
    fn name(&self) -> &'static str {
        "ConfigMap"
    }

    async fn reconcile(&self, mariadb: &MariaDB, ctx: &Context) -> Result<()> {
        let config_map = configmap::generate_config_map(mariadb, &ctx.config.cluster_name);
        ctx.store
            .apply(mariadb, ChildObject::ConfigMap(config_map))
            .await
    }
}

struct StatefulSetPhase;

#[async_trait]
impl Phase for StatefulSetPhase {
    fn name(&self) -> &'static str {
        "StatefulSet"
    }

    async fn reconcile(&self, mariadb: &MariaDB, ctx: &Context) -> Result<()> {
        let sts = statefulset::generate_statefulset(mariadb);
        ctx.store.apply(mariadb, ChildObject::StatefulSet(sts)).await
    }
}

struct PodDisruptionBudgetPhase;

#[async_trait]
impl Phase for PodDisruptionBudgetPhase {
    fn name(&self) -> &'static str {
        "PodDisruptionBudget"
    }

    async fn reconcile(&self, mariadb: &MariaDB, ctx: &Context) -> Result<()> {
        let pdb = pdb::generate_pdb(mariadb);
        ctx.store
            .apply(mariadb, ChildObject::PodDisruptionBudget(pdb))
            .await
    }
}

/// Services keep routing to the observed primary until the switch converges
struct ServicePhase;

#[async_trait]
impl Phase for ServicePhase {
    fn name(&self) -> &'static str {
        "Service"
    }

    async fn reconcile(&self, mariadb: &MariaDB, ctx: &Context) -> Result<()> {
        let store = ctx.store.as_ref();
        store
            .apply(
                mariadb,
                ChildObject::Service(service::generate_internal_service(mariadb)),
            )
            .await?;

        let primary = mariadb
            .current_primary_index()
            .unwrap_or_else(|| mariadb.desired_primary_index());
        store
            .apply(
                mariadb,
                ChildObject::Service(service::generate_primary_service(mariadb, primary)),
            )
            .await?;

        if mariadb.is_ha_enabled() {
            store
                .apply(
                    mariadb,
                    ChildObject::Service(service::generate_secondary_service(mariadb)),
                )
                .await?;
        }
        Ok(())
    }
}

/// Converges routing and status onto the desired primary
pub struct PrimaryRoutingPhase;

#[async_trait]
impl Phase for PrimaryRoutingPhase {
    fn name(&self) -> &'static str {
        "Primary"
    }

    async fn reconcile(&self, mariadb: &MariaDB, ctx: &Context) -> Result<()> {
        let state = PrimaryState::from_resource(mariadb);
        if let PrimaryState::Stable { .. } = state {
            return Ok(());
        }

        let result = ctx.primary_fsm.transition(
            state,
            PrimaryEvent::SwitchConverged,
            &TransitionContext::new(mariadb.spec.replicas, Some(mariadb.desired_primary_index())),
        );
        let index = match result {
            TransitionResult::Success {
                to: PrimaryState::Stable { index },
                ..
            } => index,
            other => {
                warn!(result = ?other, "Primary cannot converge");
                return Ok(());
            }
        };
        let pod_name = mariadb.pod_name(index);

        let PrimaryState::Switching { from, .. } = state else {
            info!("Initial primary is {}", pod_name);
            StatusManager::new(mariadb, ctx.store.as_ref())
                .patch(|status| {
                    status.current_primary = Some(pod_name.clone());
                    status.current_primary_pod_index = Some(index);
                })
                .await?;
            return Ok(());
        };

        ctx.store
            .apply(
                mariadb,
                ChildObject::Service(service::generate_primary_service(mariadb, index)),
            )
            .await?;

        let message = format!(
            "Primary switched from '{}' to '{}'",
            mariadb.pod_name(from),
            pod_name
        );
        info!("{}", message);
        StatusManager::new(mariadb, ctx.store.as_ref())
            .patch(|status| {
                status.current_primary = Some(pod_name.clone());
                status.current_primary_pod_index = Some(index);
                update_conditions(status, mariadb.metadata.generation, |c| {
                    c.primary_switched(true, condition_reasons::PRIMARY_SWITCHED, &message)
                });
            })
            .await?;
        ctx.store
            .publish_event(
                mariadb,
                RecordedEvent::normal(condition_reasons::PRIMARY_SWITCHED, "Failover", message),
            )
            .await
    }
}

/// The phases of a pass, in execution order
pub fn default_phases() -> Vec<Box<dyn Phase>> {
    vec![
        Box::new(SpecPhase),
        Box::new(SecretPhase),
        Box::new(ConfigMapPhase),
        Box::new(StatefulSetPhase),
        Box::new(PodDisruptionBudgetPhase),
        Box::new(ServicePhase),
        Box::new(PrimaryRoutingPhase),
    ]
}

/// Runs the phases of a pass and the final status refresh
pub struct Orchestrator {
    phases: Vec<Box<dyn Phase>>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(default_phases())
    }
}

impl Orchestrator {
    pub fn new(phases: Vec<Box<dyn Phase>>) -> Self {
        Self { phases }
    }

    pub fn phase_names(&self) -> Vec<&'static str> {
        self.phases.iter().map(|p| p.name()).collect()
    }

    pub async fn run(&self, mariadb: &MariaDB, ctx: &Context) -> Result<()> {
        let mut errors = Errors::new();
        let mut failure = None;

        for phase in &self.phases {
            match phase.reconcile(mariadb, ctx).await {
                Ok(()) => debug!(phase = phase.name(), "Phase reconciled"),
                Err(e) if e.is_not_found() => {
                    debug!(phase = phase.name(), "Stopping pass: {}", e);
                    break;
                }
                Err(e) => {
                    error!(phase = phase.name(), "Phase failed: {}", e);
                    failure = Some(format!("Error reconciling {}: {}", phase.name(), e));
                    errors.push(e);
                    break;
                }
            }
        }

        match self.refresh_status(mariadb, ctx, failure.as_deref()).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!("MariaDB is gone, skipping status refresh"),
            Err(e) => errors.push(e),
        }
        errors.into_result()
    }

    /// Re-read the resource and recompute its observed status
    ///
    /// With `failure` set, Ready carries the failure message instead of the
    /// StatefulSet verdict.
    async fn refresh_status(
        &self,
        mariadb: &MariaDB,
        ctx: &Context,
        failure: Option<&str>,
    ) -> Result<()> {
        let ns = mariadb.namespace().unwrap_or_default();
        let name = mariadb.name_any();
        let fresh = ctx.store.get_mariadb(&ns, &name).await?;

        let sts_status = ctx
            .store
            .get_statefulset(&ns, &name)
            .await?
            .and_then(|sts| sts.status);
        let replicas = sts_status.as_ref().map(|s| s.replicas).unwrap_or(0);
        let ready_replicas = sts_status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0);
        let all_ready = ready_replicas >= fresh.spec.replicas;

        if let Some(ref state) = ctx.health_state {
            state.metrics.set_cluster_replicas(
                &ns,
                &name,
                i64::from(fresh.spec.replicas),
                i64::from(ready_replicas),
            );
        }

        let generation = fresh.metadata.generation;
        let switching = fresh.is_switching_primary();
        let galera_not_ready = fresh.is_galera_enabled() && fresh.has_galera_not_ready_condition();
        let desired_primary = fresh.desired_primary_index();
        let desired_pod = fresh.pod_name(desired_primary);
        let configured_type = if fresh.is_galera_enabled() {
            Some(condition_types::GALERA_CONFIGURED)
        } else if fresh.is_replication_enabled() {
            Some(condition_types::REPLICATION_CONFIGURED)
        } else {
            None
        };
        let configured = fresh.has_configured_condition();

        StatusManager::new(&fresh, ctx.store.as_ref())
            .patch(|status| {
                status.replicas = replicas;
                status.ready_replicas = ready_replicas;
                status.observed_generation = generation;
                if status.current_primary_pod_index.is_none() {
                    status.current_primary_pod_index = Some(desired_primary);
                    status.current_primary = Some(desired_pod);
                }

                update_conditions(status, generation, |c| {
                    let c = match configured_type {
                        Some(type_) if all_ready && !configured => c.set_condition(
                            type_,
                            condition_status::TRUE,
                            condition_reasons::CONFIGURED,
                            "Topology configured",
                        ),
                        _ => c,
                    };
                    if let Some(message) = failure {
                        c.ready(false, condition_reasons::FAILED, message)
                    } else if switching || galera_not_ready {
                        // Owned by election and health checks until they settle
                        c
                    } else if all_ready {
                        c.ready(true, condition_reasons::STATEFULSET_READY, "Running")
                    } else {
                        c.ready(false, condition_reasons::STATEFULSET_NOT_READY, "Not ready")
                    }
                });
            })
            .await?;
        Ok(())
    }
}

/// Main reconciliation function
#[instrument(skip(mariadb, ctx), fields(name = %mariadb.name_any(), namespace = mariadb.namespace().unwrap_or_default()))]
pub async fn reconcile(mariadb: Arc<MariaDB>, ctx: Arc<Context>) -> Result<Action> {
    let ns = mariadb.namespace().unwrap_or_default();
    let name = mariadb.name_any();
    let start = Instant::now();

    info!("Reconciling MariaDB");
    let result = Orchestrator::default().run(&mariadb, &ctx).await;

    if let Some(ref state) = ctx.health_state {
        state
            .metrics
            .record_reconcile(&ns, &name, start.elapsed().as_secs_f64());
        if result.is_err() {
            state.metrics.record_error(&ns, &name);
        }
    }

    match result {
        Ok(()) => {
            info!("Reconciliation completed successfully");
            Ok(Action::requeue(RESYNC_INTERVAL))
        }
        Err(e) => {
            error!("Reconciliation failed: {}", e);
            Err(e)
        }
    }
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(mariadb: Arc<MariaDB>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = mariadb.name_any();
    let backoff = default_backoff();

    // The controller does not hand out attempt counts
    let delay = backoff.delay_for_error(error, 0);

    if error.is_retryable() {
        warn!(
            "Retryable error for {}: {:?}, requeuing in {:?}",
            name, error, delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {:?}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}
