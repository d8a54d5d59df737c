//! Common utilities for Kubernetes resource generation
//!
//! Shared names, labels and owner references used by every child object of a
//! `MariaDB`, so builders and controllers agree on how objects are found.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::MariaDB;

/// API version for the MariaDB CRD
pub const API_VERSION: &str = "k8s.mariadb.com/v1alpha1";

/// Kind for the MariaDB CRD
pub const KIND: &str = "MariaDB";

/// Operator field manager name for server-side apply
pub const FIELD_MANAGER: &str = "mariadb-operator";

/// Label the StatefulSet controller puts on every pod
pub const POD_NAME_LABEL: &str = "statefulset.kubernetes.io/pod-name";

/// Label carrying the owning cluster name
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Key holding the root password in the root Secret
pub const ROOT_PASSWORD_KEY: &str = "password";

/// Key holding the connection string in the DSN Secret
pub const DSN_KEY: &str = "dsn";

pub fn root_password_secret_name(name: &str) -> String {
    format!("{name}-root")
}

pub fn dsn_secret_name(name: &str) -> String {
    format!("{name}-dsn")
}

pub fn config_map_name(name: &str) -> String {
    format!("{name}-config")
}

/// Service routing to the current primary only
pub fn primary_service_name(name: &str) -> String {
    format!("{name}-primary")
}

/// Service spreading reads across every member
pub fn secondary_service_name(name: &str) -> String {
    format!("{name}-secondary")
}

/// Headless Service giving each member a stable DNS name
pub fn internal_service_name(name: &str) -> String {
    format!("{name}-internal")
}

pub fn pdb_name(name: &str) -> String {
    format!("{name}-pdb")
}

/// Stable DNS name of one member pod
pub fn member_host(mariadb: &MariaDB, pod_name: &str, cluster_name: &str) -> String {
    format!(
        "{}.{}.{}.svc.{}",
        pod_name,
        internal_service_name(&mariadb.name_any()),
        mariadb.namespace().unwrap_or_default(),
        cluster_name
    )
}

/// Generate an owner reference for a MariaDB
///
/// Child objects are garbage collected together with the cluster.
pub fn owner_reference(mariadb: &MariaDB) -> OwnerReference {
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        name: mariadb.name_any(),
        uid: mariadb.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Labels selecting every member pod of a cluster
pub fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), "mariadb".to_string()),
        (INSTANCE_LABEL.to_string(), name.to_string()),
    ])
}

/// Generate standard labels for all resources belonging to a MariaDB
pub fn standard_labels(name: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(name);
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        FIELD_MANAGER.to_string(),
    );
    labels
}

/// Standard labels merged with the user labels from the spec.
///
/// User labels may override anything except the selector labels, which the
/// Services and the PodDisruptionBudget rely on.
pub fn cluster_labels(mariadb: &MariaDB) -> BTreeMap<String, String> {
    let name = mariadb.name_any();
    let selector = selector_labels(&name);
    let mut labels = standard_labels(&name);

    for (key, value) in &mariadb.spec.labels {
        if !selector.contains_key(key) {
            labels.insert(key.clone(), value.clone());
        }
    }

    labels
}

/// Selector for a single member pod
pub fn pod_selector(name: &str, pod_name: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(name);
    labels.insert(POD_NAME_LABEL.to_string(), pod_name.to_string());
    labels
}
