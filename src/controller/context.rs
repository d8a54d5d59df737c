use std::sync::Arc;

use kube::Client;

use crate::config::OperatorConfig;
use crate::controller::state_machine::PrimaryStateMachine;
use crate::controller::store::{ClusterStore, KubeStore};
use crate::health::HealthState;
use crate::sql::{MySqlClientFactory, SqlClientFactory};

/// Shared context for the controllers
#[derive(Clone)]
pub struct Context {
    /// Kubernetes access
    pub store: Arc<dyn ClusterStore>,
    /// Connections to cluster members
    pub sql: Arc<dyn SqlClientFactory>,
    pub config: OperatorConfig,
    /// Health state for metrics (optional)
    pub health_state: Option<Arc<HealthState>>,
    pub primary_fsm: Arc<PrimaryStateMachine>,
}

impl Context {
    pub fn new(
        client: Client,
        config: OperatorConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        let sql = MySqlClientFactory::new(client.clone(), config.cluster_name.clone())
            .with_connect_timeout(config.kube_api_timeout);
        Self::with_parts(
            Arc::new(KubeStore::new(client)),
            Arc::new(sql),
            config,
            health_state,
        )
    }

    /// Build a context from explicit collaborators
    pub fn with_parts(
        store: Arc<dyn ClusterStore>,
        sql: Arc<dyn SqlClientFactory>,
        config: OperatorConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            store,
            sql,
            config,
            health_state,
            primary_fsm: Arc::new(PrimaryStateMachine::new()),
        }
    }
}
