use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use kube::core::ObjectMeta;
use rand::Rng;

use crate::crd::MariaDB;
use crate::resources::common::{
    DSN_KEY, ROOT_PASSWORD_KEY, cluster_labels, dsn_secret_name, owner_reference,
    primary_service_name, root_password_secret_name,
};

/// Generate a secure random password
fn generate_password(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

fn secret_meta(mariadb: &MariaDB, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: mariadb.namespace(),
        labels: Some(cluster_labels(mariadb)),
        owner_references: Some(vec![owner_reference(mariadb)]),
        ..Default::default()
    }
}

/// Generate the root credentials Secret
///
/// Only created once; a fresh password is generated on every call.
pub fn generate_root_secret(mariadb: &MariaDB) -> Secret {
    let string_data = BTreeMap::from([(ROOT_PASSWORD_KEY.to_string(), generate_password(32))]);

    Secret {
        metadata: secret_meta(mariadb, root_password_secret_name(&mariadb.name_any())),
        type_: Some("Opaque".to_string()),
        string_data: Some(string_data),
        ..Default::default()
    }
}

/// Read the root password from the root Secret
pub fn root_password(secret: &Secret) -> Option<String> {
    if let Some(value) = secret
        .string_data
        .as_ref()
        .and_then(|d| d.get(ROOT_PASSWORD_KEY))
    {
        return Some(value.clone());
    }
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(ROOT_PASSWORD_KEY))
        .and_then(|b| String::from_utf8(b.0.clone()).ok())
}

/// Connection string pointing at the primary Service
pub fn primary_dsn(mariadb: &MariaDB, password: &str, cluster_name: &str) -> String {
    format!(
        "mysql://root:{}@{}.{}.svc.{}:{}/",
        password,
        primary_service_name(&mariadb.name_any()),
        mariadb.namespace().unwrap_or_default(),
        cluster_name,
        mariadb.spec.port
    )
}

/// Generate the DSN Secret clients use to reach the primary
pub fn generate_dsn_secret(mariadb: &MariaDB, password: &str, cluster_name: &str) -> Secret {
    let name = mariadb.name_any();
    let string_data = BTreeMap::from([
        (DSN_KEY.to_string(), primary_dsn(mariadb, password, cluster_name)),
        ("host".to_string(), primary_service_name(&name)),
        ("port".to_string(), mariadb.spec.port.to_string()),
        ("username".to_string(), "root".to_string()),
        ("password".to_string(), password.to_string()),
    ]);

    Secret {
        metadata: secret_meta(mariadb, dsn_secret_name(&name)),
        type_: Some("Opaque".to_string()),
        string_data: Some(string_data),
        ..Default::default()
    }
}
