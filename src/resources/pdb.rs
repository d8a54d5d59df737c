//! PodDisruptionBudget generation for MariaDB clusters

use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::MariaDB;
use crate::resources::common::{cluster_labels, owner_reference, pdb_name, selector_labels};

/// Minimum members that must stay up during voluntary disruptions
///
/// - 1 replica: 0 (allow disruption, will cause downtime)
/// - 2 replicas: 1
/// - 3+ replicas: replicas - 1 (one disruption at a time)
pub fn min_available(replicas: i32) -> i32 {
    match replicas {
        n if n <= 1 => 0,
        2 => 1,
        n => n - 1,
    }
}

/// Generate a PodDisruptionBudget for the cluster
pub fn generate_pdb(mariadb: &MariaDB) -> PodDisruptionBudget {
    let name = mariadb.name_any();

    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(pdb_name(&name)),
            namespace: mariadb.namespace(),
            labels: Some(cluster_labels(mariadb)),
            owner_references: Some(vec![owner_reference(mariadb)]),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::Int(min_available(mariadb.spec.replicas))),
            selector: Some(LabelSelector {
                match_labels: Some(selector_labels(&name)),
                ..Default::default()
            }),
            // Unhealthy members may always be evicted
            unhealthy_pod_eviction_policy: Some("IfHealthyBudget".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
