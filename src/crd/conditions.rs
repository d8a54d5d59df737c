//! Condition vocabulary shared by the CRD helpers and the controllers

/// Standard condition types following Kubernetes conventions
pub mod condition_types {
    /// Cluster is ready to accept connections
    pub const READY: &str = "Ready";
    /// The primary pointer converged (False while a switch is in flight)
    pub const PRIMARY_SWITCHED: &str = "PrimarySwitched";
    /// Galera cluster is healthy (False once recovery is required)
    pub const GALERA_READY: &str = "GaleraReady";
    /// Galera was bootstrapped at least once
    pub const GALERA_CONFIGURED: &str = "GaleraConfigured";
    /// Replication was configured at least once
    pub const REPLICATION_CONFIGURED: &str = "ReplicationConfigured";
    /// Initial data restore (False while restoring)
    pub const BACKUP_RESTORED: &str = "BackupRestored";
    /// Volume resize (False while resizing)
    pub const STORAGE_RESIZED: &str = "StorageResized";
}

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

/// Condition reasons set by this operator
pub mod condition_reasons {
    pub const STATEFULSET_READY: &str = "StatefulSetReady";
    pub const STATEFULSET_NOT_READY: &str = "StatefulSetNotReady";
    pub const FAILED: &str = "Failed";
    pub const SWITCH_PRIMARY: &str = "SwitchPrimary";
    pub const PRIMARY_SWITCHED: &str = "PrimarySwitched";
    pub const GALERA_NOT_READY: &str = "GaleraNotReady";
    pub const GALERA_READY: &str = "GaleraReady";
    pub const CLUSTER_NOT_HEALTHY: &str = "ClusterNotHealthy";
    pub const CONFIGURED: &str = "Configured";
}
