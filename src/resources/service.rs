//! Service generation for MariaDB clusters
//!
//! - `<name>-primary` selects exactly one pod by its StatefulSet pod name
//!   label. Moving the primary means re-pointing this selector.
//! - `<name>-secondary` spreads reads across all members (HA only).
//! - `<name>-internal` is headless and gives members stable DNS names, also
//!   while they are not ready so Galera members can find each other.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::MariaDB;
use crate::resources::common::{
    cluster_labels, internal_service_name, owner_reference, pod_selector, primary_service_name,
    secondary_service_name, selector_labels,
};

fn service_meta(mariadb: &MariaDB, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: mariadb.namespace(),
        labels: Some(cluster_labels(mariadb)),
        owner_references: Some(vec![owner_reference(mariadb)]),
        ..Default::default()
    }
}

fn mariadb_port(mariadb: &MariaDB) -> ServicePort {
    ServicePort {
        port: mariadb.spec.port,
        target_port: Some(IntOrString::Int(mariadb.spec.port)),
        name: Some("mariadb".to_string()),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn cluster_ip_service(
    mariadb: &MariaDB,
    name: String,
    selector: BTreeMap<String, String>,
) -> Service {
    Service {
        metadata: service_meta(mariadb, name),
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![mariadb_port(mariadb)]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the primary (read-write) service pointing at member `index`
pub fn generate_primary_service(mariadb: &MariaDB, index: i32) -> Service {
    let name = mariadb.name_any();
    cluster_ip_service(
        mariadb,
        primary_service_name(&name),
        pod_selector(&name, &mariadb.pod_name(index)),
    )
}

/// Generate the secondary (read-only) service
pub fn generate_secondary_service(mariadb: &MariaDB) -> Service {
    let name = mariadb.name_any();
    cluster_ip_service(
        mariadb,
        secondary_service_name(&name),
        selector_labels(&name),
    )
}

/// Generate the headless service backing the StatefulSet
pub fn generate_internal_service(mariadb: &MariaDB) -> Service {
    let name = mariadb.name_any();
    Service {
        metadata: service_meta(mariadb, internal_service_name(&name)),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(&name)),
            ports: Some(vec![mariadb_port(mariadb)]),
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Pod name the primary service currently selects, if any
pub fn selected_pod(service: &Service) -> Option<&str> {
    service
        .spec
        .as_ref()?
        .selector
        .as_ref()?
        .get(crate::resources::common::POD_NAME_LABEL)
        .map(String::as_str)
}
