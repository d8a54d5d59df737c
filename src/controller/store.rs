//! Kubernetes access used by the controllers
//!
//! Reconcilers never hold a `kube::Api` directly; they go through
//! [`ClusterStore`] so the same logic runs against the API server and against
//! the in-memory store of the test suite.
//!
//! Writes to the `MariaDB` object are merge patches that carry
//! `metadata.resourceVersion`. The API server rejects them with a conflict
//! when the object changed since it was read, and the pass is retried.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::{Patch, PatchParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::crd::MariaDB;
use crate::resources::common::FIELD_MANAGER;

/// Child object owned by a `MariaDB`
#[derive(Clone, Debug)]
pub enum ChildObject {
    Secret(Secret),
    ConfigMap(ConfigMap),
    StatefulSet(StatefulSet),
    Service(Service),
    PodDisruptionBudget(PodDisruptionBudget),
}

impl ChildObject {
    pub fn kind(&self) -> &'static str {
        match self {
            ChildObject::Secret(_) => "Secret",
            ChildObject::ConfigMap(_) => "ConfigMap",
            ChildObject::StatefulSet(_) => "StatefulSet",
            ChildObject::Service(_) => "Service",
            ChildObject::PodDisruptionBudget(_) => "PodDisruptionBudget",
        }
    }

    pub fn name(&self) -> String {
        match self {
            ChildObject::Secret(o) => o.name_any(),
            ChildObject::ConfigMap(o) => o.name_any(),
            ChildObject::StatefulSet(o) => o.name_any(),
            ChildObject::Service(o) => o.name_any(),
            ChildObject::PodDisruptionBudget(o) => o.name_any(),
        }
    }
}

/// Event attached to a `MariaDB`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedEvent {
    pub warning: bool,
    pub reason: String,
    pub note: String,
    pub action: String,
}

impl RecordedEvent {
    pub fn normal(reason: &str, action: &str, note: impl Into<String>) -> Self {
        Self {
            warning: false,
            reason: reason.to_string(),
            note: note.into(),
            action: action.to_string(),
        }
    }

    pub fn warning(reason: &str, action: &str, note: impl Into<String>) -> Self {
        Self {
            warning: true,
            ..Self::normal(reason, action, note)
        }
    }
}

#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fresh copy of a `MariaDB`; a missing object is a not-found error
    async fn get_mariadb(&self, namespace: &str, name: &str) -> Result<MariaDB>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;

    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;

    /// Point the desired primary of the enabled topology at `index`
    ///
    /// Returns the patched object, whose resource version must be used by
    /// any follow-up write.
    async fn patch_primary_index(&self, mariadb: &MariaDB, index: i32) -> Result<MariaDB>;

    /// Merge `status_patch` into the status subresource
    async fn patch_status(&self, mariadb: &MariaDB, status_patch: Value) -> Result<()>;

    /// Server-side apply of a child object in the namespace of `mariadb`
    async fn apply(&self, mariadb: &MariaDB, object: ChildObject) -> Result<()>;

    async fn publish_event(&self, mariadb: &MariaDB, event: RecordedEvent) -> Result<()>;
}

/// Spec path of the primary settings of the enabled topology
pub fn primary_index_patch(mariadb: &MariaDB, index: i32) -> Result<Value> {
    let topology = if mariadb.is_replication_enabled() {
        "replication"
    } else if mariadb.is_galera_enabled() {
        "galera"
    } else {
        return Err(Error::InvalidConfig(
            "primary index requires replication or galera".to_string(),
        ));
    };

    Ok(json!({
        "metadata": { "resourceVersion": mariadb.resource_version() },
        "spec": { topology: { "primary": { "podIndex": index } } }
    }))
}

/// [`ClusterStore`] backed by the API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    recorder: Recorder,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn get_opt<K>(&self, namespace: &str, name: &str) -> Result<Option<K>>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply_resource<K>(&self, namespace: &str, resource: &K) -> Result<()>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Serialize
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let name = resource.name_any();

        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &params, &Patch::Apply(resource)).await?;
        debug!("Applied resource: {}", name);

        Ok(())
    }

    fn mariadb_api(&self, mariadb: &MariaDB) -> Api<MariaDB> {
        Api::namespaced(
            self.client.clone(),
            &mariadb.namespace().unwrap_or_default(),
        )
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_mariadb(&self, namespace: &str, name: &str) -> Result<MariaDB> {
        let api: Api<MariaDB> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        self.get_opt(namespace, name).await
    }

    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>> {
        self.get_opt(namespace, name).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        self.get_opt(namespace, name).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        self.get_opt(namespace, name).await
    }

    async fn patch_primary_index(&self, mariadb: &MariaDB, index: i32) -> Result<MariaDB> {
        let patch = primary_index_patch(mariadb, index)?;
        let patched = self
            .mariadb_api(mariadb)
            .patch(
                &mariadb.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(patched)
    }

    async fn patch_status(&self, mariadb: &MariaDB, status_patch: Value) -> Result<()> {
        let patch = json!({
            "metadata": { "resourceVersion": mariadb.resource_version() },
            "status": status_patch
        });
        self.mariadb_api(mariadb)
            .patch_status(
                &mariadb.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn apply(&self, mariadb: &MariaDB, object: ChildObject) -> Result<()> {
        let ns = mariadb.namespace().unwrap_or_default();
        match &object {
            ChildObject::Secret(o) => self.apply_resource(&ns, o).await,
            ChildObject::ConfigMap(o) => self.apply_resource(&ns, o).await,
            ChildObject::StatefulSet(o) => self.apply_resource(&ns, o).await,
            ChildObject::Service(o) => self.apply_resource(&ns, o).await,
            ChildObject::PodDisruptionBudget(o) => self.apply_resource(&ns, o).await,
        }
    }

    async fn publish_event(&self, mariadb: &MariaDB, event: RecordedEvent) -> Result<()> {
        let event = Event {
            type_: if event.warning {
                EventType::Warning
            } else {
                EventType::Normal
            },
            reason: event.reason,
            note: Some(event.note),
            action: event.action,
            secondary: None,
        };
        self.recorder
            .publish(&event, &mariadb.object_ref(&()))
            .await?;
        Ok(())
    }
}
