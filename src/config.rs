//! Operator configuration read from the environment

use std::time::Duration;

use tracing::warn;

use crate::controller::{Error, Result};

pub const DEFAULT_CLUSTER_NAME: &str = "cluster.local";
pub const DEFAULT_HEALTH_PORT: u16 = 8080;
pub const DEFAULT_KUBE_API_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Kubernetes cluster domain used in member DNS names
    pub cluster_name: String,
    /// Identity for leader election
    pub pod_name: String,
    /// Namespace holding the leader election lease
    pub pod_namespace: String,
    /// Restrict every controller to one namespace
    pub watch_namespace: Option<String>,
    pub health_port: u16,
    /// Budget for Kubernetes reads inside a health check
    pub kube_api_timeout: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            pod_name: "unknown".to_string(),
            pod_namespace: "default".to_string(),
            watch_namespace: None,
            health_port: DEFAULT_HEALTH_PORT,
            kube_api_timeout: DEFAULT_KUBE_API_TIMEOUT,
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let pod_name = non_empty("POD_NAME").unwrap_or_else(|| {
            warn!("POD_NAME not set, using hostname");
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or(defaults.pod_name.clone())
        });
        let pod_namespace = non_empty("POD_NAMESPACE").unwrap_or_else(|| {
            warn!("POD_NAMESPACE not set, using 'default'");
            defaults.pod_namespace.clone()
        });

        let health_port = match non_empty("HEALTH_PORT") {
            Some(v) => v
                .parse::<u16>()
                .map_err(|_| Error::InvalidConfig(format!("HEALTH_PORT: invalid port '{v}'")))?,
            None => defaults.health_port,
        };
        let kube_api_timeout = match non_empty("KUBE_API_TIMEOUT_SECS") {
            Some(v) => match v.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(Error::InvalidConfig(format!(
                        "KUBE_API_TIMEOUT_SECS: expected a positive number of seconds, got '{v}'"
                    )));
                }
            },
            None => defaults.kube_api_timeout,
        };

        Ok(Self {
            cluster_name: non_empty("CLUSTER_NAME").unwrap_or(defaults.cluster_name),
            pod_name,
            pod_namespace,
            watch_namespace: non_empty("WATCH_NAMESPACE"),
            health_port,
            kube_api_timeout,
        })
    }
}
