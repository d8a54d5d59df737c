//! Primary election and failover
//!
//! Two entry points, called by the pod controller when a member becomes Ready
//! or NotReady. Both are idempotent: every path compares against the current
//! state before writing, so replaying the same pod event never patches the
//! resource or emits an event twice.

use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::cluster_health::ClusterHealthEvaluator;
use crate::controller::context::Context;
use crate::controller::error::{Error, Errors, Result};
use crate::controller::pod::{is_pod_ready, pod_index};
use crate::controller::state_machine::{
    PrimaryEvent, PrimaryState, TransitionContext, TransitionResult,
};
use crate::controller::status::StatusManager;
use crate::controller::store::RecordedEvent;
use crate::crd::{MariaDB, condition_reasons};

/// Whether the operator may move the primary of `mariadb` right now
///
/// The readiness gate is the topology one (`GaleraReady`), not the aggregate
/// Ready condition: Ready drops as soon as the primary pod does, which is
/// exactly when failover has to run.
pub fn is_election_applicable(mariadb: &MariaDB) -> bool {
    if !mariadb.is_ha_enabled() || !mariadb.is_automatic_failover_enabled() {
        return false;
    }
    if mariadb.is_restoring_backup() || mariadb.is_resizing_storage() {
        return false;
    }
    if !mariadb.has_configured_condition() {
        return false;
    }
    // A Galera cluster that lost quorum belongs to recovery, not to election
    !(mariadb.is_galera_enabled() && mariadb.has_galera_not_ready_condition())
}

fn switching_message(mariadb: &MariaDB, from: i32, to: i32) -> String {
    format!(
        "Switching primary from '{}' to '{}'",
        mariadb.pod_name(from),
        mariadb.pod_name(to)
    )
}

pub struct PrimaryElection<'a> {
    ctx: &'a Context,
}

impl<'a> PrimaryElection<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// A member became Ready: take over from a primary that is down
    pub async fn on_member_ready(&self, mariadb: &MariaDB, pod_name: &str) -> Result<()> {
        if !is_election_applicable(mariadb) {
            return Ok(());
        }
        let Some(current) = mariadb.current_primary_index() else {
            info!("Current primary not set, skipping election");
            return Ok(());
        };

        let ns = mariadb.namespace().unwrap_or_default();
        let primary_pod = self
            .ctx
            .store
            .get_pod(&ns, &mariadb.pod_name(current))
            .await?;
        if primary_pod.as_ref().is_some_and(is_pod_ready) {
            return Ok(());
        }

        let Some(index) = pod_index(pod_name) else {
            debug!(pod = pod_name, "Not a member pod");
            return Ok(());
        };
        if index == current {
            return Ok(());
        }

        let state = PrimaryState::from_resource(mariadb);
        let result = self.ctx.primary_fsm.transition(
            state,
            PrimaryEvent::SwitchRequested,
            &TransitionContext::new(mariadb.spec.replicas, Some(index)),
        );
        let (old, new) = match result {
            TransitionResult::Success {
                to: PrimaryState::Switching { from, to },
                ..
            } => (from, to),
            other => {
                debug!(result = ?other, "Primary switch not started");
                return Ok(());
            }
        };

        self.ctx.store.patch_primary_index(mariadb, new).await?;
        self.record_switch(mariadb);

        let message = switching_message(mariadb, old, new);
        info!("{}", message);
        self.ctx
            .store
            .publish_event(
                mariadb,
                RecordedEvent::normal(condition_reasons::SWITCH_PRIMARY, "Failover", message),
            )
            .await
    }

    /// A member became NotReady: fail over when it was the primary
    pub async fn on_member_not_ready(&self, mariadb: &MariaDB, pod_name: &str) -> Result<()> {
        if !is_election_applicable(mariadb) {
            return Ok(());
        }
        let Some(current) = mariadb.current_primary_index() else {
            info!("Current primary not set, skipping failover");
            return Ok(());
        };
        if pod_index(pod_name) != Some(current) {
            return Ok(());
        }

        let state = PrimaryState::from_resource(mariadb);
        if let PrimaryState::Switching { to, .. } = state {
            debug!(to, "Primary switch already in flight");
            return Ok(());
        }

        let evaluator = ClusterHealthEvaluator::from_context(self.ctx);
        let Some(candidate) = evaluator.healthy_replica(mariadb, current).await? else {
            return Err(Error::TransientError(format!(
                "no healthy replica to replace primary '{}'",
                mariadb.pod_name(current)
            )));
        };

        let result = self.ctx.primary_fsm.transition(
            state,
            PrimaryEvent::PrimaryFailed,
            &TransitionContext::new(mariadb.spec.replicas, Some(candidate)),
        );
        let (old, new) = match result {
            TransitionResult::Success {
                to: PrimaryState::Switching { from, to },
                ..
            } => (from, to),
            other => {
                debug!(result = ?other, "Failover not started");
                return Ok(());
            }
        };

        let message = switching_message(mariadb, old, new);
        info!("{}", message);

        // Spec and status are written independently, both failures are reported
        let mut errors = Errors::new();
        let patched = errors.collect(self.ctx.store.patch_primary_index(mariadb, new).await);
        let base = patched.as_ref().unwrap_or(mariadb);
        errors.collect(
            StatusManager::new(base, self.ctx.store.as_ref())
                .patch_conditions(|c| {
                    c.primary_switched(false, condition_reasons::SWITCH_PRIMARY, &message)
                        .ready(false, condition_reasons::SWITCH_PRIMARY, &message)
                })
                .await,
        );
        if patched.is_some() {
            self.record_switch(mariadb);
            errors.collect(
                self.ctx
                    .store
                    .publish_event(
                        base,
                        RecordedEvent::normal(
                            condition_reasons::SWITCH_PRIMARY,
                            "Failover",
                            message,
                        ),
                    )
                    .await,
            );
        }
        errors.into_result()
    }

    fn record_switch(&self, mariadb: &MariaDB) {
        if let Some(ref state) = self.ctx.health_state {
            state
                .metrics
                .record_primary_switch(&mariadb.namespace().unwrap_or_default(), &mariadb.name_any());
        }
    }
}
