//! Member pod helpers and the pod controller entry point
//!
//! Pod readiness changes drive the primary election: a pod turning Ready may
//! take over from a primary that is down, and the primary turning NotReady
//! triggers a failover.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{debug, instrument, warn};

use crate::controller::context::Context;
use crate::controller::error::{BackoffConfig, Error, Result};
use crate::controller::primary::PrimaryElection;
use crate::resources::common::INSTANCE_LABEL;

/// Requeue period for pods whose readiness is not yet known
const POD_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Pod has the Ready condition set to True
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// StatefulSet ordinal of a member pod (`<name>-<index>`)
pub fn pod_index(pod_name: &str) -> Option<i32> {
    let (_, ordinal) = pod_name.rsplit_once('-')?;
    if ordinal.is_empty() || !ordinal.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    ordinal.parse().ok()
}

/// Reconcile a member pod of a `MariaDB`
#[instrument(skip(pod, ctx), fields(pod = %pod.name_any(), namespace = pod.namespace().unwrap_or_default()))]
pub async fn reconcile_pod(pod: Arc<Pod>, ctx: Arc<Context>) -> Result<Action> {
    let Some(cluster) = pod.labels().get(INSTANCE_LABEL).cloned() else {
        return Ok(Action::await_change());
    };
    let ns = pod.namespace().unwrap_or_default();

    let mariadb = match ctx.store.get_mariadb(&ns, &cluster).await {
        Ok(mariadb) => mariadb,
        Err(e) if e.is_not_found() => {
            debug!("Owning MariaDB {} not found, ignoring pod", cluster);
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e),
    };

    let election = PrimaryElection::new(&ctx);
    if is_pod_ready(&pod) {
        election.on_member_ready(&mariadb, &pod.name_any()).await?;
    } else {
        election.on_member_not_ready(&mariadb, &pod.name_any()).await?;
    }

    Ok(Action::requeue(POD_RESYNC_INTERVAL))
}

/// Error policy for the pod controller
pub fn pod_error_policy(pod: Arc<Pod>, error: &Error, _ctx: Arc<Context>) -> Action {
    let delay = BackoffConfig::default().delay_for_error(error, 0);
    warn!(
        "Election for pod {} failed: {}, requeuing in {:?}",
        pod.name_any(),
        error,
        delay
    );
    Action::requeue(delay)
}
