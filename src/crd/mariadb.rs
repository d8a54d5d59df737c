use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::conditions::{condition_status, condition_types};
use crate::controller::state_machine::is_switching;

/// MariaDB is the Schema for the mariadbs API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "k8s.mariadb.com",
    version = "v1alpha1",
    kind = "MariaDB",
    plural = "mariadbs",
    shortname = "mdb",
    namespaced,
    status = "MariaDBStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].message"}"#,
    printcolumn = r#"{"name":"Primary", "type":"string", "jsonPath":".status.currentPrimary"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MariaDBSpec {
    /// Container image (e.g., "mariadb:11.4")
    #[serde(default = "default_image")]
    pub image: String,

    /// Number of members in the StatefulSet
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// MariaDB port
    #[serde(default = "default_port")]
    pub port: i32,

    /// Storage configuration for the data volume
    pub storage: StorageSpec,

    /// Resource requirements for MariaDB pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Extra configuration appended to my.cnf
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub my_cnf: Option<String>,

    /// User-defined labels propagated to child resources
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Asynchronous primary/replica replication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication: Option<ReplicationSpec>,

    /// Multi-master synchronous Galera clustering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub galera: Option<GaleraSpec>,
}

impl MariaDBSpec {
    /// Primary settings of the enabled topology
    pub fn primary(&self) -> Option<&PrimarySpec> {
        if let Some(replication) = self.replication.as_ref().filter(|r| r.enabled) {
            return Some(&replication.primary);
        }
        self.galera
            .as_ref()
            .filter(|g| g.enabled)
            .map(|g| &g.primary)
    }
}

fn default_image() -> String {
    "mariadb:11.4".to_string()
}

fn default_replicas() -> i32 {
    1
}

fn default_port() -> i32 {
    3306
}

/// Storage configuration for MariaDB data volumes
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Storage class name (uses default if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Size of the persistent volume (e.g., "10Gi", "100Gi")
    pub size: String,
}

/// Resource requirements for MariaDB pods
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceList>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceList>,
}

/// Resource quantities for CPU and memory
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct ResourceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Which member is the primary and whether the operator may move it
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrimarySpec {
    /// Desired primary pod index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_index: Option<i32>,

    /// Elect a new primary when the current one becomes unavailable
    #[serde(default = "default_true")]
    pub automatic_failover: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PrimarySpec {
    fn default() -> Self {
        Self {
            pod_index: None,
            automatic_failover: true,
        }
    }
}

/// Asynchronous replication configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub primary: PrimarySpec,
}

/// Galera configuration
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct GaleraSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub primary: PrimarySpec,

    /// Automatic cluster recovery after quorum loss
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<GaleraRecoverySpec>,
}

/// Galera recovery policy
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GaleraRecoverySpec {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum members the cluster must report to be considered healthy.
    /// Either a count or a percentage of replicas (e.g., "50%").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cluster_size: Option<MinClusterSize>,

    /// Time the cluster may stay unhealthy before recovery is triggered, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_healthy_timeout_seconds: Option<u64>,

    /// Interval between health checks, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_monitor_interval_seconds: Option<u64>,
}

impl Default for GaleraRecoverySpec {
    fn default() -> Self {
        Self {
            enabled: true,
            min_cluster_size: None,
            cluster_healthy_timeout_seconds: None,
            cluster_monitor_interval_seconds: None,
        }
    }
}

pub const DEFAULT_CLUSTER_HEALTHY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CLUSTER_MONITOR_INTERVAL: Duration = Duration::from_secs(10);

impl GaleraRecoverySpec {
    pub fn cluster_healthy_timeout(&self) -> Duration {
        self.cluster_healthy_timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CLUSTER_HEALTHY_TIMEOUT)
    }

    pub fn cluster_monitor_interval(&self) -> Duration {
        self.cluster_monitor_interval_seconds
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CLUSTER_MONITOR_INTERVAL)
    }

    /// Resolve the minimum cluster size against the replica count
    pub fn min_cluster_size(&self, replicas: i32) -> Result<i32, String> {
        match &self.min_cluster_size {
            None => Ok(1),
            Some(size) => size.resolve(replicas),
        }
    }
}

/// Integer count or percentage string
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum MinClusterSize {
    Count(i32),
    Percent(String),
}

impl MinClusterSize {
    /// Percentages are rounded up so "50%" of 3 requires 2 members
    pub fn resolve(&self, replicas: i32) -> Result<i32, String> {
        match self {
            MinClusterSize::Count(n) => Ok(*n),
            MinClusterSize::Percent(raw) => {
                let pct: i32 = raw
                    .trim()
                    .strip_suffix('%')
                    .and_then(|n| n.trim().parse().ok())
                    .ok_or_else(|| format!("invalid minClusterSize percentage: {raw}"))?;
                if pct <= 0 || pct > 100 {
                    return Err(format!("minClusterSize percentage out of range: {raw}"));
                }
                Ok((replicas * pct + 99) / 100)
            }
        }
    }
}

/// Status of the MariaDB
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MariaDBStatus {
    /// Kubernetes-style conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Name of the pod currently acting as primary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_primary: Option<String>,

    /// Index of the pod currently acting as primary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_primary_pod_index: Option<i32>,

    /// Desired replicas observed in the StatefulSet
    #[serde(default)]
    pub replicas: i32,

    /// Ready replicas observed in the StatefulSet
    #[serde(default)]
    pub ready_replicas: i32,

    /// Progress of an in-flight Galera recovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub galera_recovery: Option<GaleraRecoveryStatus>,

    /// Observed generation of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Galera recovery progress, owned by the recovery procedure
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GaleraRecoveryStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,

    /// Pod chosen to bootstrap the new cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_pod: Option<String>,
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,

    /// Generation observed when condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Topology and condition predicates
impl MariaDB {
    pub fn is_replication_enabled(&self) -> bool {
        self.spec.replication.as_ref().is_some_and(|r| r.enabled)
    }

    pub fn is_galera_enabled(&self) -> bool {
        self.spec.galera.as_ref().is_some_and(|g| g.enabled)
    }

    /// Replication or Galera
    pub fn is_ha_enabled(&self) -> bool {
        self.is_replication_enabled() || self.is_galera_enabled()
    }

    /// Primary settings of the enabled topology
    pub fn primary_spec(&self) -> Option<&PrimarySpec> {
        self.spec.primary()
    }

    pub fn is_automatic_failover_enabled(&self) -> bool {
        self.primary_spec().is_some_and(|p| p.automatic_failover)
    }

    /// Desired primary index, defaulting to the first member
    pub fn desired_primary_index(&self) -> i32 {
        self.primary_spec().and_then(|p| p.pod_index).unwrap_or(0)
    }

    /// Observed primary index
    pub fn current_primary_index(&self) -> Option<i32> {
        self.status
            .as_ref()
            .and_then(|s| s.current_primary_pod_index)
    }

    pub fn galera_recovery(&self) -> Option<&GaleraRecoverySpec> {
        self.spec
            .galera
            .as_ref()
            .filter(|g| g.enabled)
            .and_then(|g| g.recovery.as_ref())
    }

    /// Desired primary differs from the observed one
    pub fn is_switching_primary(&self) -> bool {
        is_switching(&self.spec, self.status.as_ref())
    }

    pub fn is_galera_recovery_enabled(&self) -> bool {
        self.galera_recovery().is_some_and(|r| r.enabled)
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.type_ == type_))
    }

    fn condition_is(&self, type_: &str, status: &str) -> bool {
        self.condition(type_).is_some_and(|c| c.status == status)
    }

    pub fn is_ready(&self) -> bool {
        self.condition_is(condition_types::READY, condition_status::TRUE)
    }

    pub fn is_restoring_backup(&self) -> bool {
        self.condition_is(condition_types::BACKUP_RESTORED, condition_status::FALSE)
    }

    pub fn is_resizing_storage(&self) -> bool {
        self.condition_is(condition_types::STORAGE_RESIZED, condition_status::FALSE)
    }

    /// Topology configured at least once
    pub fn has_configured_condition(&self) -> bool {
        if self.is_galera_enabled() {
            self.condition_is(condition_types::GALERA_CONFIGURED, condition_status::TRUE)
        } else if self.is_replication_enabled() {
            self.condition_is(
                condition_types::REPLICATION_CONFIGURED,
                condition_status::TRUE,
            )
        } else {
            false
        }
    }

    pub fn has_galera_not_ready_condition(&self) -> bool {
        self.condition_is(condition_types::GALERA_READY, condition_status::FALSE)
    }

    /// Name of the member pod with the given index
    pub fn pod_name(&self, index: i32) -> String {
        format!("{}-{}", self.metadata.name.as_deref().unwrap_or_default(), index)
    }
}
