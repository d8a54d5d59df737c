//! Health and metrics endpoints
//!
//! - `/healthz`: the process answers
//! - `/readyz`: the operator holds the lease and its controllers run
//! - `/metrics`: Prometheus text exposition

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

/// Identifies one `MariaDB` in every metric family
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ClusterLabels {
    pub namespace: String,
    pub name: String,
}

impl ClusterLabels {
    fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl EncodeLabelSet for ClusterLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

pub struct Metrics {
    pub reconciliations_total: Family<ClusterLabels, Counter>,
    pub reconciliation_errors_total: Family<ClusterLabels, Counter>,
    pub reconcile_duration_seconds: Family<ClusterLabels, Histogram>,
    pub cluster_replicas_desired: Family<ClusterLabels, Gauge>,
    pub cluster_replicas_ready: Family<ClusterLabels, Gauge>,
    /// Switches started by failover or takeover
    pub primary_switches_total: Family<ClusterLabels, Counter>,
    /// Health budgets that ended with an unhealthy Galera cluster
    pub galera_unhealthy_total: Family<ClusterLabels, Counter>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("mariadb_operator");

        let reconciliations_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "reconciliations",
            "Reconciliation passes",
            reconciliations_total.clone(),
        );

        let reconciliation_errors_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "reconciliation_errors",
            "Reconciliation passes that returned an error",
            reconciliation_errors_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<ClusterLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "reconcile_duration_seconds",
            "Duration of a reconciliation pass",
            reconcile_duration_seconds.clone(),
        );

        let cluster_replicas_desired = Family::<ClusterLabels, Gauge>::default();
        registry.register(
            "cluster_replicas_desired",
            "Members requested in the spec",
            cluster_replicas_desired.clone(),
        );

        let cluster_replicas_ready = Family::<ClusterLabels, Gauge>::default();
        registry.register(
            "cluster_replicas_ready",
            "Members the StatefulSet reports ready",
            cluster_replicas_ready.clone(),
        );

        let primary_switches_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "primary_switches",
            "Primary switches started by the operator",
            primary_switches_total.clone(),
        );

        let galera_unhealthy_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "galera_unhealthy",
            "Health budgets that ended with an unhealthy Galera cluster",
            galera_unhealthy_total.clone(),
        );

        Self {
            reconciliations_total,
            reconciliation_errors_total,
            reconcile_duration_seconds,
            cluster_replicas_desired,
            cluster_replicas_ready,
            primary_switches_total,
            galera_unhealthy_total,
            registry,
        }
    }

    pub fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64) {
        let labels = ClusterLabels::new(namespace, name);
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    pub fn record_error(&self, namespace: &str, name: &str) {
        self.reconciliation_errors_total
            .get_or_create(&ClusterLabels::new(namespace, name))
            .inc();
    }

    pub fn set_cluster_replicas(&self, namespace: &str, name: &str, desired: i64, ready: i64) {
        let labels = ClusterLabels::new(namespace, name);
        self.cluster_replicas_desired
            .get_or_create(&labels)
            .set(desired);
        self.cluster_replicas_ready.get_or_create(&labels).set(ready);
    }

    pub fn record_primary_switch(&self, namespace: &str, name: &str) {
        self.primary_switches_total
            .get_or_create(&ClusterLabels::new(namespace, name))
            .inc();
    }

    pub fn record_galera_unhealthy(&self, namespace: &str, name: &str) {
        self.galera_unhealthy_total
            .get_or_create(&ClusterLabels::new(namespace, name))
            .inc();
    }

    fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        buffer
    }
}

/// State shared between the controllers and the health server
pub struct HealthState {
    ready: RwLock<bool>,
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// 503 until the controllers started, and again during shutdown
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.encode(),
    )
}

fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the health and metrics endpoints on `0.0.0.0:<port>`
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Health server listening on {}", addr);

    axum::serve(listener, router(state)).await
}
