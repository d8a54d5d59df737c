//! Validation of MariaDB specs
//!
//! Runs as the first phase of every reconciliation pass. A spec that fails
//! validation stops the pass before any child object is written.

use crate::controller::error::{Error, Result};
use crate::crd::{MariaDB, MinClusterSize};

/// Minimum number of replicas
pub const MIN_REPLICAS: i32 = 1;

/// Maximum number of replicas (arbitrary limit for safety)
pub const MAX_REPLICAS: i32 = 100;

/// Validate the cluster spec
pub fn validate_spec(mariadb: &MariaDB) -> Result<()> {
    validate_replicas(mariadb)?;
    validate_port(mariadb)?;
    validate_topology(mariadb)?;
    validate_primary(mariadb)?;
    validate_galera_recovery(mariadb)?;
    validate_storage(mariadb)?;
    Ok(())
}

/// Validate replica count
fn validate_replicas(mariadb: &MariaDB) -> Result<()> {
    let replicas = mariadb.spec.replicas;

    if replicas < MIN_REPLICAS {
        return Err(Error::ValidationError(format!(
            "replica count {} is below minimum {}",
            replicas, MIN_REPLICAS
        )));
    }

    if replicas > MAX_REPLICAS {
        return Err(Error::ValidationError(format!(
            "replica count {} exceeds maximum {}",
            replicas, MAX_REPLICAS
        )));
    }

    Ok(())
}

fn validate_port(mariadb: &MariaDB) -> Result<()> {
    let port = mariadb.spec.port;
    if !(1..=i32::from(u16::MAX)).contains(&port) {
        return Err(Error::ValidationError(format!(
            "port {} out of range [1, 65535]",
            port
        )));
    }
    Ok(())
}

fn validate_topology(mariadb: &MariaDB) -> Result<()> {
    if mariadb.is_replication_enabled() && mariadb.is_galera_enabled() {
        return Err(Error::ValidationError(
            "replication and galera cannot be enabled at the same time".to_string(),
        ));
    }
    Ok(())
}

/// The desired primary must name an existing member
fn validate_primary(mariadb: &MariaDB) -> Result<()> {
    let Some(index) = mariadb.primary_spec().and_then(|p| p.pod_index) else {
        return Ok(());
    };
    let replicas = mariadb.spec.replicas;
    if index < 0 || index >= replicas {
        return Err(Error::ValidationError(format!(
            "primary podIndex {} out of range [0, {})",
            index, replicas
        )));
    }
    Ok(())
}

fn validate_galera_recovery(mariadb: &MariaDB) -> Result<()> {
    let Some(recovery) = mariadb.galera_recovery() else {
        return Ok(());
    };
    let replicas = mariadb.spec.replicas;

    match &recovery.min_cluster_size {
        None => Ok(()),
        Some(MinClusterSize::Count(n)) if *n < 1 || *n > replicas => {
            Err(Error::ValidationError(format!(
                "minClusterSize {} out of range [1, {}]",
                n, replicas
            )))
        }
        Some(size) => size
            .resolve(replicas)
            .map(|_| ())
            .map_err(Error::ValidationError),
    }
}

/// Validate storage configuration
fn validate_storage(mariadb: &MariaDB) -> Result<()> {
    let size = &mariadb.spec.storage.size;

    // Validate size format (e.g., "10Gi", "100Gi")
    if !size.ends_with("Gi") && !size.ends_with("Mi") && !size.ends_with("Ti") {
        return Err(Error::ValidationError(format!(
            "storage size must end with Gi, Mi, or Ti: {}",
            size
        )));
    }

    let num_str = size.trim_end_matches(char::is_alphabetic);
    let _num: u64 = num_str
        .parse()
        .map_err(|_| Error::ValidationError(format!("invalid storage size number: {}", size)))?;

    Ok(())
}
