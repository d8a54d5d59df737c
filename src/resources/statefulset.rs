//! StatefulSet generation for MariaDB clusters
//!
//! One StatefulSet holds every member. Members get stable names
//! (`<name>-<index>`) and DNS entries through the internal headless Service,
//! which is what the primary index in the spec refers to.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    RollingUpdateStatefulSetStrategy, StatefulSet, StatefulSetPersistentVolumeClaimRetentionPolicy,
    StatefulSetSpec, StatefulSetUpdateStrategy,
};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource,
    ExecAction, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodAffinityTerm,
    PodAntiAffinity, PodSecurityContext, PodSpec, PodTemplateSpec, Probe, ResourceRequirements,
    SeccompProfile, SecretKeySelector, TCPSocketAction, Volume, VolumeMount,
    VolumeResourceRequirements, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::{MariaDB, ResourceList};
use crate::resources::common::{
    ROOT_PASSWORD_KEY, cluster_labels, config_map_name, internal_service_name, owner_reference,
    root_password_secret_name, selector_labels,
};
use crate::resources::configmap::CONFIG_MOUNT_PATH;

/// Name of the data volume claim template
pub const STORAGE_VOLUME: &str = "storage";

const CONFIG_VOLUME: &str = "config";
const DATA_MOUNT_PATH: &str = "/var/lib/mysql";

/// mysql user and group in the official image
const MYSQL_UID: i64 = 999;

fn quantities(list: &ResourceList) -> BTreeMap<String, Quantity> {
    let mut map = BTreeMap::new();
    if let Some(cpu) = &list.cpu {
        map.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &list.memory {
        map.insert("memory".to_string(), Quantity(memory.clone()));
    }
    map
}

/// Spread members across nodes, preferring distinct zones
fn generate_anti_affinity(name: &str) -> Affinity {
    let term = |weight: i32, topology_key: &str| WeightedPodAffinityTerm {
        weight,
        pod_affinity_term: PodAffinityTerm {
            label_selector: Some(LabelSelector {
                match_labels: Some(selector_labels(name)),
                ..Default::default()
            }),
            topology_key: topology_key.to_string(),
            ..Default::default()
        },
    };

    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                term(100, "kubernetes.io/hostname"),
                term(50, "topology.kubernetes.io/zone"),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Shell command checking the server answers with the root credentials
fn ping_command() -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        "mariadb-admin ping -uroot -p\"${MARIADB_ROOT_PASSWORD}\" --protocol=tcp".to_string(),
    ]
}

fn generate_env(mariadb: &MariaDB) -> Vec<EnvVar> {
    let name = mariadb.name_any();
    vec![
        EnvVar {
            name: "MARIADB_ROOT_PASSWORD".to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: root_password_secret_name(&name),
                    key: ROOT_PASSWORD_KEY.to_string(),
                    optional: Some(false),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        EnvVar {
            name: "MYSQL_TCP_PORT".to_string(),
            value: Some(mariadb.spec.port.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "POD_NAME".to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(k8s_openapi::api::core::v1::ObjectFieldSelector {
                    field_path: "metadata.name".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    ]
}

/// Generate the StatefulSet running every member of the cluster
pub fn generate_statefulset(mariadb: &MariaDB) -> StatefulSet {
    let name = mariadb.name_any();
    let labels = cluster_labels(mariadb);
    let port = mariadb.spec.port;

    let startup_probe = Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(5),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        failure_threshold: Some(30), // 5 minutes to start
        ..Default::default()
    };

    let readiness_probe = Probe {
        exec: Some(ExecAction {
            command: Some(ping_command()),
        }),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..Default::default()
    };

    let liveness_probe = Probe {
        exec: Some(ExecAction {
            command: Some(ping_command()),
        }),
        initial_delay_seconds: Some(30),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        success_threshold: Some(1),
        failure_threshold: Some(6),
        ..Default::default()
    };

    let container = Container {
        name: "mariadb".to_string(),
        image: Some(mariadb.spec.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(vec![ContainerPort {
            container_port: port,
            name: Some("mariadb".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(generate_env(mariadb)),
        volume_mounts: Some(vec![
            VolumeMount {
                name: STORAGE_VOLUME.to_string(),
                mount_path: DATA_MOUNT_PATH.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
        ]),
        resources: mariadb
            .spec
            .resources
            .as_ref()
            .map(|r| ResourceRequirements {
                limits: r.limits.as_ref().map(quantities),
                requests: r.requests.as_ref().map(quantities),
                ..Default::default()
            }),
        startup_probe: Some(startup_probe),
        readiness_probe: Some(readiness_probe),
        liveness_probe: Some(liveness_probe),
        ..Default::default()
    };

    let volumes = vec![Volume {
        name: CONFIG_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name(&name),
            default_mode: Some(0o644),
            ..Default::default()
        }),
        ..Default::default()
    }];

    let pvc_template = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(STORAGE_VOLUME.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: mariadb.spec.storage.storage_class.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(mariadb.spec.storage.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    // Galera members must all start together to form a cluster
    let pod_management_policy = if mariadb.is_galera_enabled() {
        "Parallel"
    } else {
        "OrderedReady"
    };

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: mariadb.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(mariadb)]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            service_name: Some(internal_service_name(&name)),
            replicas: Some(mariadb.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&name)),
                ..Default::default()
            },
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateStatefulSetStrategy {
                    max_unavailable: Some(IntOrString::Int(1)),
                    partition: Some(0),
                }),
            }),
            pod_management_policy: Some(pod_management_policy.to_string()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(volumes),
                    termination_grace_period_seconds: Some(30),
                    affinity: Some(generate_anti_affinity(&name)),
                    security_context: Some(PodSecurityContext {
                        fs_group: Some(MYSQL_UID),
                        run_as_user: Some(MYSQL_UID),
                        run_as_group: Some(MYSQL_UID),
                        seccomp_profile: Some(SeccompProfile {
                            type_: "RuntimeDefault".to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![pvc_template]),
            persistent_volume_claim_retention_policy: Some(
                StatefulSetPersistentVolumeClaimRetentionPolicy {
                    when_deleted: Some("Retain".to_string()),
                    when_scaled: Some("Retain".to_string()),
                },
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}
