pub mod backup;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;
pub mod sql;

pub use config::OperatorConfig;
pub use controller::{
    BackoffConfig, Context, Error, Result, error_policy, pod_error_policy, reconcile,
    reconcile_galera, reconcile_pod,
};
pub use crd::MariaDB;
pub use health::{HealthState, Metrics};

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::runtime::Controller;
use kube::runtime::controller::Error as ControllerError;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

use crate::resources::common::FIELD_MANAGER;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Log a controller result; not-found failures follow deletions and are expected
fn log_result<K, Q>(controller: &str, result: Result<K, ControllerError<Error, Q>>)
where
    K: std::fmt::Debug,
    Q: std::error::Error + 'static,
{
    match result {
        Ok(obj) => tracing::debug!("{} reconciled: {:?}", controller, obj),
        Err(e) => {
            let is_not_found = matches!(
                &e,
                ControllerError::ReconcilerFailed(err, _) if err.is_not_found()
            );
            if is_not_found {
                tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
            } else {
                tracing::error!("{} reconciliation error: {:?}", controller, e);
            }
        }
    }
}

/// Run the MariaDB controller.
///
/// Watches `MariaDB` resources and every owned child object, running the
/// phase orchestrator on each change. With `health_state`, metrics are
/// recorded for every pass.
pub async fn run_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    let namespace = config.watch_namespace.clone();
    let namespace = namespace.as_deref();
    tracing::info!(
        "Starting controller for MariaDB resources (scope: {})",
        namespace.unwrap_or("cluster-wide")
    );

    // Mark as ready once we start the controller
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let ctx = Arc::new(Context::new(client.clone(), config.clone(), health_state));

    let mariadbs: Api<MariaDB> = scoped_api(client.clone(), namespace);
    let statefulsets: Api<StatefulSet> = scoped_api(client.clone(), namespace);
    let services: Api<Service> = scoped_api(client.clone(), namespace);
    let configmaps: Api<ConfigMap> = scoped_api(client.clone(), namespace);
    let secrets: Api<Secret> = scoped_api(client.clone(), namespace);
    let pdbs: Api<PodDisruptionBudget> = scoped_api(client.clone(), namespace);

    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(mariadbs, watcher_config.clone())
        .owns(statefulsets, watcher_config.clone())
        .owns(services, watcher_config.clone())
        .owns(configmaps, watcher_config.clone())
        .owns(secrets, watcher_config.clone())
        .owns(pdbs, watcher_config)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move { log_result("MariaDB", result) })
        .await;

    // This should never complete in normal operation
    tracing::error!("Controller stream ended unexpectedly");
}

/// Run the Galera health controller.
///
/// Each `MariaDB` with Galera recovery enabled is re-checked every monitor
/// interval, independently of the main controller's passes.
pub async fn run_galera_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    let namespace = config.watch_namespace.clone();
    let namespace = namespace.as_deref();
    tracing::info!(
        "Starting Galera health controller (scope: {})",
        namespace.unwrap_or("cluster-wide")
    );

    let ctx = Arc::new(Context::new(client.clone(), config.clone(), health_state));
    let mariadbs: Api<MariaDB> = scoped_api(client, namespace);

    Controller::new(mariadbs, WatcherConfig::default().any_semantic())
        .run(reconcile_galera, error_policy, ctx)
        .for_each(|result| async move { log_result("Galera", result) })
        .await;

    tracing::error!("Galera controller stream ended unexpectedly");
}

/// Run the member pod controller.
///
/// Only pods carrying the operator's managed-by label are watched. Their
/// readiness changes drive primary election and failover.
pub async fn run_pod_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    let namespace = config.watch_namespace.clone();
    let namespace = namespace.as_deref();
    tracing::info!(
        "Starting pod controller (scope: {})",
        namespace.unwrap_or("cluster-wide")
    );

    let ctx = Arc::new(Context::new(client.clone(), config.clone(), health_state));
    let pods: Api<Pod> = scoped_api(client, namespace);
    let watcher_config = WatcherConfig::default()
        .labels(&format!("app.kubernetes.io/managed-by={FIELD_MANAGER}"))
        .any_semantic();

    Controller::new(pods, watcher_config)
        .run(reconcile_pod, pod_error_policy, ctx)
        .for_each(|result| async move { log_result("Pod", result) })
        .await;

    tracing::error!("Pod controller stream ended unexpectedly");
}
