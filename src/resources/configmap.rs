//! `my.cnf` generation
//!
//! The base configuration is shared by every topology. Replication adds
//! binary logging, Galera adds the wsrep provider settings with the member
//! list addressed through the internal Service. User supplied `myCnf` is
//! appended last so it can override anything above.

use std::collections::BTreeMap;
use std::fmt::Write;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::MariaDB;
use crate::resources::common::{cluster_labels, config_map_name, member_host, owner_reference};

/// Key of the configuration file in the ConfigMap
pub const MY_CNF_KEY: &str = "my.cnf";

/// Where the ConfigMap is mounted in the container
pub const CONFIG_MOUNT_PATH: &str = "/etc/mysql/mariadb.conf.d";

const GALERA_PROVIDER: &str = "/usr/lib/galera/libgalera_smm.so";

/// Render the configuration file
pub fn generate_my_cnf(mariadb: &MariaDB, cluster_name: &str) -> String {
    let mut cnf = String::from("[mariadb]\n");
    cnf.push_str("bind-address=*\n");
    cnf.push_str("default_storage_engine=InnoDB\n");
    cnf.push_str("binlog_format=row\n");
    cnf.push_str("innodb_autoinc_lock_mode=2\n");
    let _ = writeln!(cnf, "port={}", mariadb.spec.port);

    if mariadb.is_replication_enabled() {
        cnf.push_str("\n# Replication\n");
        let _ = writeln!(cnf, "log_bin={}-bin", mariadb.name_any());
        cnf.push_str("log_slave_updates=ON\n");
        cnf.push_str("gtid_strict_mode=ON\n");
    }

    if mariadb.is_galera_enabled() {
        let members = (0..mariadb.spec.replicas)
            .map(|i| member_host(mariadb, &mariadb.pod_name(i), cluster_name))
            .collect::<Vec<_>>()
            .join(",");

        cnf.push_str("\n# Galera\n");
        cnf.push_str("wsrep_on=ON\n");
        let _ = writeln!(cnf, "wsrep_provider={GALERA_PROVIDER}");
        let _ = writeln!(cnf, "wsrep_cluster_address=gcomm://{members}");
        let _ = writeln!(cnf, "wsrep_cluster_name={}", mariadb.name_any());
        cnf.push_str("wsrep_sst_method=mariabackup\n");
    }

    if let Some(extra) = mariadb.spec.my_cnf.as_deref().filter(|s| !s.trim().is_empty()) {
        cnf.push_str("\n# User configuration\n");
        cnf.push_str(extra.trim_end());
        cnf.push('\n');
    }

    cnf
}

/// Generate the configuration ConfigMap
pub fn generate_config_map(mariadb: &MariaDB, cluster_name: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map_name(&mariadb.name_any())),
            namespace: mariadb.namespace(),
            labels: Some(cluster_labels(mariadb)),
            owner_references: Some(vec![owner_reference(mariadb)]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            MY_CNF_KEY.to_string(),
            generate_my_cnf(mariadb, cluster_name),
        )])),
        ..Default::default()
    }
}
