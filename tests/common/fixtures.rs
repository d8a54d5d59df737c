//! Test fixtures and builders for MariaDB resources
//!
//! ```rust,ignore
//! let mariadb = MariaDBBuilder::galera("mdb", "default")
//!     .with_replicas(3)
//!     .with_current_primary(0)
//!     .configured()
//!     .build();
//! ```

use std::collections::BTreeMap;

use chrono::Utc;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetStatus};
use k8s_openapi::api::core::v1::{Pod, PodCondition, PodStatus};
use kube::core::ObjectMeta;
use mariadb_operator::crd::{
    Condition, GaleraRecoverySpec, GaleraSpec, MariaDB, MariaDBSpec, MariaDBStatus,
    MinClusterSize, PrimarySpec, ReplicationSpec, StorageSpec, condition_status, condition_types,
};
use mariadb_operator::resources::common::{INSTANCE_LABEL, POD_NAME_LABEL, standard_labels};

/// Spec with every optional block unset
pub fn minimal_spec() -> MariaDBSpec {
    MariaDBSpec {
        image: "mariadb:11.4".to_string(),
        replicas: 1,
        port: 3306,
        storage: StorageSpec {
            storage_class: Some("standard".to_string()),
            size: "10Gi".to_string(),
        },
        resources: None,
        my_cnf: None,
        labels: BTreeMap::new(),
        replication: None,
        galera: None,
    }
}

/// Create a basic standalone MariaDB
pub fn create_test_mariadb(name: &str, namespace: &str, replicas: i32) -> MariaDB {
    MariaDBBuilder::new(name, namespace)
        .with_replicas(replicas)
        .build()
}

/// Builder for MariaDB test fixtures
pub struct MariaDBBuilder {
    name: String,
    namespace: String,
    spec: MariaDBSpec,
    status: Option<MariaDBStatus>,
    generation: i64,
    resource_version: String,
}

impl MariaDBBuilder {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            spec: minimal_spec(),
            status: None,
            generation: 1,
            resource_version: "1".to_string(),
        }
    }

    /// Three member asynchronous replication cluster
    pub fn replication(name: &str, namespace: &str) -> Self {
        let mut builder = Self::new(name, namespace).with_replicas(3);
        builder.spec.replication = Some(ReplicationSpec {
            enabled: true,
            primary: PrimarySpec::default(),
        });
        builder
    }

    /// Three member Galera cluster with recovery enabled
    pub fn galera(name: &str, namespace: &str) -> Self {
        let mut builder = Self::new(name, namespace).with_replicas(3);
        builder.spec.galera = Some(GaleraSpec {
            enabled: true,
            primary: PrimarySpec::default(),
            recovery: Some(GaleraRecoverySpec::default()),
        });
        builder
    }

    pub fn with_replicas(mut self, replicas: i32) -> Self {
        self.spec.replicas = replicas;
        self
    }

    pub fn with_storage(mut self, size: &str) -> Self {
        self.spec.storage.size = size.to_string();
        self
    }

    pub fn with_my_cnf(mut self, my_cnf: &str) -> Self {
        self.spec.my_cnf = Some(my_cnf.to_string());
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.spec.labels.insert(key.to_string(), value.to_string());
        self
    }

    fn primary_mut(&mut self) -> &mut PrimarySpec {
        if let Some(replication) = self.spec.replication.as_mut() {
            return &mut replication.primary;
        }
        &mut self
            .spec
            .galera
            .as_mut()
            .expect("primary settings need replication or galera")
            .primary
    }

    /// Desired primary pod index
    pub fn with_primary_index(mut self, index: i32) -> Self {
        self.primary_mut().pod_index = Some(index);
        self
    }

    pub fn with_automatic_failover(mut self, enabled: bool) -> Self {
        self.primary_mut().automatic_failover = enabled;
        self
    }

    pub fn with_min_cluster_size(mut self, size: MinClusterSize) -> Self {
        let galera = self.spec.galera.as_mut().expect("galera not enabled");
        galera
            .recovery
            .get_or_insert_with(GaleraRecoverySpec::default)
            .min_cluster_size = Some(size);
        self
    }

    pub fn with_healthy_timeout_secs(mut self, secs: u64) -> Self {
        let galera = self.spec.galera.as_mut().expect("galera not enabled");
        galera
            .recovery
            .get_or_insert_with(GaleraRecoverySpec::default)
            .cluster_healthy_timeout_seconds = Some(secs);
        self
    }

    /// Observed primary in the status
    pub fn with_current_primary(mut self, index: i32) -> Self {
        let status = self.status.get_or_insert_with(MariaDBStatus::default);
        status.current_primary = Some(format!("{}-{}", self.name, index));
        status.current_primary_pod_index = Some(index);
        self
    }

    pub fn with_condition(mut self, type_: &str, status: &str) -> Self {
        let current = self.status.get_or_insert_with(MariaDBStatus::default);
        current.conditions.retain(|c| c.type_ != type_);
        current.conditions.push(Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: "Test".to_string(),
            message: String::new(),
            last_transition_time: Utc::now().to_rfc3339(),
            observed_generation: Some(self.generation),
        });
        self
    }

    /// Mark the enabled topology as configured
    pub fn configured(self) -> Self {
        let type_ = if self.spec.galera.is_some() {
            condition_types::GALERA_CONFIGURED
        } else {
            condition_types::REPLICATION_CONFIGURED
        };
        self.with_condition(type_, condition_status::TRUE)
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = generation;
        self
    }

    pub fn build(self) -> MariaDB {
        let mut mariadb = MariaDB::new(&self.name, self.spec);
        mariadb.metadata = ObjectMeta {
            name: Some(self.name),
            namespace: Some(self.namespace),
            uid: Some("test-uid-12345".to_string()),
            generation: Some(self.generation),
            resource_version: Some(self.resource_version),
            ..Default::default()
        };
        mariadb.status = self.status;
        mariadb
    }
}

/// Member pod of `mariadb` with the given readiness
pub fn member_pod(mariadb: &MariaDB, index: i32, ready: bool) -> Pod {
    let name = mariadb.metadata.name.clone().unwrap_or_default();
    let pod_name = mariadb.pod_name(index);
    let mut labels = standard_labels(&name);
    labels.insert(POD_NAME_LABEL.to_string(), pod_name.clone());
    labels.insert(INSTANCE_LABEL.to_string(), name);

    Pod {
        metadata: ObjectMeta {
            name: Some(pod_name),
            namespace: mariadb.metadata.namespace.clone(),
            labels: Some(labels),
            ..Default::default()
        },
        status: Some(PodStatus {
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// StatefulSet of `mariadb` reporting `ready` ready replicas
pub fn member_statefulset(mariadb: &MariaDB, ready: i32) -> StatefulSet {
    StatefulSet {
        metadata: ObjectMeta {
            name: mariadb.metadata.name.clone(),
            namespace: mariadb.metadata.namespace.clone(),
            ..Default::default()
        },
        status: Some(StatefulSetStatus {
            replicas: mariadb.spec.replicas,
            ready_replicas: Some(ready),
            ..Default::default()
        }),
        ..Default::default()
    }
}
