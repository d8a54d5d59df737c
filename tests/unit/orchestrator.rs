//! Unit tests for the reconcile orchestrator

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use mariadb_operator::controller::reconciler::default_phases;
use mariadb_operator::controller::{
    ChildObject, Context, Error, Orchestrator, Phase, Result, reconcile,
};
use mariadb_operator::crd::{MariaDB, condition_reasons, condition_status, condition_types};
use mariadb_operator::resources::service::selected_pod;

use crate::common::*;

/// Phase recording its execution and answering with a scripted result
struct ScriptedPhase {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
    fail: Option<fn() -> Error>,
}

#[async_trait]
impl Phase for ScriptedPhase {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn reconcile(&self, _mariadb: &MariaDB, _ctx: &Context) -> Result<()> {
        self.log.lock().unwrap().push(self.name);
        match self.fail {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

fn scripted(
    log: &Arc<Mutex<Vec<&'static str>>>,
    phases: &[(&'static str, Option<fn() -> Error>)],
) -> Orchestrator {
    Orchestrator::new(
        phases
            .iter()
            .map(|(name, fail)| {
                Box::new(ScriptedPhase {
                    name: *name,
                    log: log.clone(),
                    fail: *fail,
                }) as Box<dyn Phase>
            })
            .collect(),
    )
}

fn invalid_config() -> Error {
    Error::InvalidConfig("broken".to_string())
}

fn not_found() -> Error {
    Error::NotFound("gone".to_string())
}

const INVALID_CONFIG: Option<fn() -> Error> = Some(invalid_config);
const NOT_FOUND: Option<fn() -> Error> = Some(not_found);

fn ready_store(mariadb: &MariaDB) -> Arc<FakeStore> {
    Arc::new(
        FakeStore::new()
            .with_mariadb(mariadb.clone())
            .with_statefulset(member_statefulset(mariadb, mariadb.spec.replicas)),
    )
}

mod phase_order_tests {
    use super::*;

    #[test]
    fn test_default_phase_order() {
        let names: Vec<_> = default_phases().iter().map(|p| p.name()).collect();
        assert_eq!(
            names,
            vec![
                "Spec",
                "Secret",
                "ConfigMap",
                "StatefulSet",
                "PodDisruptionBudget",
                "Service",
                "Primary"
            ]
        );
        assert_eq!(Orchestrator::default().phase_names(), names);
    }

    #[tokio::test]
    async fn test_phases_run_in_order() {
        let mariadb = create_test_mariadb("mdb", "default", 1);
        let store = ready_store(&mariadb);
        let ctx = test_context(store, Arc::new(FakeSqlFactory::default()));
        let log = Arc::new(Mutex::new(Vec::new()));

        scripted(&log, &[("A", None), ("B", None), ("C", None)])
            .run(&mariadb, &ctx)
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_failing_phase_stops_pass_and_sets_ready() {
        let mariadb = create_test_mariadb("mdb", "default", 1);
        let store = ready_store(&mariadb);
        let ctx = test_context(store.clone(), Arc::new(FakeSqlFactory::default()));
        let log = Arc::new(Mutex::new(Vec::new()));

        let err = scripted(
            &log,
            &[
                ("A", None),
                ("B", INVALID_CONFIG),
                ("C", None),
            ],
        )
        .run(&mariadb, &ctx)
        .await
        .unwrap_err();

        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);

        let ready = store
            .mariadb("default", "mdb")
            .condition(condition_types::READY)
            .cloned()
            .unwrap();
        assert_eq!(ready.status, condition_status::FALSE);
        assert_eq!(ready.reason, condition_reasons::FAILED);
        assert_eq!(
            ready.message,
            "Error reconciling B: Invalid configuration: broken"
        );
    }

    #[tokio::test]
    async fn test_not_found_stops_pass_quietly() {
        let mariadb = create_test_mariadb("mdb", "default", 1);
        let store = ready_store(&mariadb);
        let ctx = test_context(store.clone(), Arc::new(FakeSqlFactory::default()));
        let log = Arc::new(Mutex::new(Vec::new()));

        scripted(
            &log,
            &[
                ("A", NOT_FOUND),
                ("B", None),
            ],
        )
        .run(&mariadb, &ctx)
        .await
        .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["A"]);
        // The refresh still reports the StatefulSet verdict
        assert!(store.mariadb("default", "mdb").is_ready());
    }

    #[tokio::test]
    async fn test_deleted_resource_skips_refresh() {
        let mariadb = create_test_mariadb("mdb", "default", 1);
        let store = Arc::new(FakeStore::new());
        let ctx = test_context(store.clone(), Arc::new(FakeSqlFactory::default()));
        let log = Arc::new(Mutex::new(Vec::new()));

        scripted(&log, &[("A", None)])
            .run(&mariadb, &ctx)
            .await
            .unwrap();

        assert_eq!(store.mutations(), 0);
    }
}

mod default_pass_tests {
    use super::*;

    fn applied_names(store: &FakeStore) -> Vec<(String, String)> {
        store
            .applied()
            .iter()
            .map(|o| (o.kind().to_string(), o.name()))
            .collect()
    }

    #[tokio::test]
    async fn test_invalid_spec_writes_no_children() {
        let mariadb = create_test_mariadb("mdb", "default", 0);
        let store = ready_store(&mariadb);
        let ctx = test_context(store.clone(), Arc::new(FakeSqlFactory::default()));

        let err = Orchestrator::default().run(&mariadb, &ctx).await.unwrap_err();

        assert!(matches!(err, Error::ValidationError(_)));
        assert!(store.applied().is_empty());
        let ready = store
            .mariadb("default", "mdb")
            .condition(condition_types::READY)
            .cloned()
            .unwrap();
        assert!(ready.message.starts_with("Error reconciling Spec: "));
    }

    #[tokio::test]
    async fn test_first_pass_creates_children_and_status() {
        let mariadb = MariaDBBuilder::replication("mdb", "default").build();
        let store = ready_store(&mariadb);
        let ctx = test_context(store.clone(), Arc::new(FakeSqlFactory::default()));

        Orchestrator::default().run(&mariadb, &ctx).await.unwrap();

        let applied = applied_names(&store);
        let expected = [
            ("Secret", "mdb-root"),
            ("Secret", "mdb-dsn"),
            ("ConfigMap", "mdb-config"),
            ("StatefulSet", "mdb"),
            ("PodDisruptionBudget", "mdb-pdb"),
            ("Service", "mdb-internal"),
            ("Service", "mdb-primary"),
            ("Service", "mdb-secondary"),
        ];
        assert_eq!(
            applied,
            expected
                .iter()
                .map(|(k, n)| (k.to_string(), n.to_string()))
                .collect::<Vec<_>>()
        );

        let stored = store.mariadb("default", "mdb");
        assert_eq!(stored.current_primary_index(), Some(0));
        assert!(stored.has_configured_condition());
        assert!(stored.is_ready());
        let status = stored.status.unwrap();
        assert_eq!(status.ready_replicas, 3);
        assert_eq!(status.observed_generation, Some(1));
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let mariadb = MariaDBBuilder::replication("mdb", "default").build();
        let store = ready_store(&mariadb);
        let ctx = test_context(store.clone(), Arc::new(FakeSqlFactory::default()));
        let orchestrator = Orchestrator::default();

        orchestrator.run(&mariadb, &ctx).await.unwrap();
        let writes = store.mutations();

        let fresh = store.mariadb("default", "mdb");
        orchestrator.run(&fresh, &ctx).await.unwrap();

        assert_eq!(store.mutations(), writes);
        // The root password is generated once
        let roots = store
            .applied()
            .iter()
            .filter(|o| matches!(o, ChildObject::Secret(_)) && o.name() == "mdb-root")
            .count();
        assert_eq!(roots, 1);
    }

    #[tokio::test]
    async fn test_not_ready_statefulset() {
        let mariadb = MariaDBBuilder::replication("mdb", "default").build();
        let store = Arc::new(
            FakeStore::new()
                .with_mariadb(mariadb.clone())
                .with_statefulset(member_statefulset(&mariadb, 1)),
        );
        let ctx = test_context(store.clone(), Arc::new(FakeSqlFactory::default()));

        Orchestrator::default().run(&mariadb, &ctx).await.unwrap();

        let stored = store.mariadb("default", "mdb");
        assert!(!stored.is_ready());
        assert!(!stored.has_configured_condition());
        let ready = stored.condition(condition_types::READY).unwrap();
        assert_eq!(ready.reason, condition_reasons::STATEFULSET_NOT_READY);
    }
}

mod primary_routing_tests {
    use super::*;

    #[tokio::test]
    async fn test_switch_converges_routing_and_status() {
        let mariadb = MariaDBBuilder::replication("mdb", "default")
            .with_primary_index(2)
            .with_current_primary(0)
            .configured()
            .build();
        let store = ready_store(&mariadb);
        let ctx = test_context(store.clone(), Arc::new(FakeSqlFactory::default()));

        Orchestrator::default().run(&mariadb, &ctx).await.unwrap();

        let svc = store.service("default", "mdb-primary").unwrap();
        assert_eq!(selected_pod(&svc), Some("mdb-2"));

        let stored = store.mariadb("default", "mdb");
        assert_eq!(stored.current_primary_index(), Some(2));
        assert_eq!(
            stored.status.as_ref().unwrap().current_primary.as_deref(),
            Some("mdb-2")
        );
        let switched = stored
            .condition(condition_types::PRIMARY_SWITCHED)
            .unwrap();
        assert_eq!(switched.status, condition_status::TRUE);
        assert_eq!(switched.message, "Primary switched from 'mdb-0' to 'mdb-2'");
        assert!(stored.is_ready());

        let events = store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, condition_reasons::PRIMARY_SWITCHED);

        let writes = store.mutations();
        Orchestrator::default().run(&stored, &ctx).await.unwrap();
        assert_eq!(store.mutations(), writes);
    }

    #[tokio::test]
    async fn test_services_keep_old_primary_until_routing_phase() {
        let mariadb = MariaDBBuilder::replication("mdb", "default")
            .with_primary_index(1)
            .with_current_primary(0)
            .configured()
            .build();
        let store = ready_store(&mariadb);
        let ctx = test_context(store.clone(), Arc::new(FakeSqlFactory::default()));

        Orchestrator::default().run(&mariadb, &ctx).await.unwrap();

        let primaries: Vec<_> = store
            .applied()
            .into_iter()
            .filter_map(|o| match o {
                ChildObject::Service(svc) if svc.metadata.name.as_deref() == Some("mdb-primary") => {
                    selected_pod(&svc).map(str::to_string)
                }
                _ => None,
            })
            .collect();
        assert_eq!(primaries, vec!["mdb-0".to_string(), "mdb-1".to_string()]);
    }
}

mod controller_tests {
    use super::*;

    #[tokio::test]
    async fn test_reconcile_requeues() {
        let mariadb = create_test_mariadb("mdb", "default", 1);
        let store = ready_store(&mariadb);
        let ctx = Arc::new(test_context(store, Arc::new(FakeSqlFactory::default())));

        let action = reconcile(Arc::new(mariadb), ctx).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(30)));
    }
}
