//! Unit tests for status management

use std::sync::Arc;

use mariadb_operator::controller::StatusManager;
use mariadb_operator::controller::status::{ConditionBuilder, status_diff, update_conditions};
use mariadb_operator::crd::{MariaDBStatus, condition_reasons, condition_status, condition_types};

use crate::common::*;

mod condition_builder_tests {
    use super::*;

    #[test]
    fn test_new_condition() {
        let conditions = ConditionBuilder::new(Some(4))
            .ready(true, condition_reasons::STATEFULSET_READY, "Running")
            .build();

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].type_, condition_types::READY);
        assert_eq!(conditions[0].status, condition_status::TRUE);
        assert_eq!(conditions[0].observed_generation, Some(4));
    }

    #[test]
    fn test_update_keeps_one_condition_per_type() {
        let conditions = ConditionBuilder::new(Some(1))
            .ready(false, condition_reasons::STATEFULSET_NOT_READY, "Not ready")
            .ready(true, condition_reasons::STATEFULSET_READY, "Running")
            .build();

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, condition_status::TRUE);
        assert_eq!(conditions[0].message, "Running");
    }

    #[test]
    fn test_transition_time_kept_without_flip() {
        let first = ConditionBuilder::new(Some(1))
            .galera_ready(false, condition_reasons::GALERA_NOT_READY, "down")
            .build();
        let time = first[0].last_transition_time.clone();

        let second = ConditionBuilder::from_existing(first, Some(2))
            .galera_ready(false, condition_reasons::GALERA_NOT_READY, "still down")
            .build();
        assert_eq!(second[0].last_transition_time, time);
        assert_eq!(second[0].message, "still down");
        assert_eq!(second[0].observed_generation, Some(2));
    }

    #[test]
    fn test_update_conditions_in_place() {
        let mut status = MariaDBStatus::default();
        update_conditions(&mut status, Some(1), |c| {
            c.primary_switched(true, condition_reasons::PRIMARY_SWITCHED, "done")
                .ready(true, condition_reasons::STATEFULSET_READY, "Running")
        });
        assert_eq!(status.conditions.len(), 2);
    }
}

mod diff_tests {
    use super::*;

    #[test]
    fn test_diff_carries_only_changes() {
        let old = MariaDBStatus {
            replicas: 3,
            ready_replicas: 1,
            ..Default::default()
        };
        let new = MariaDBStatus {
            ready_replicas: 3,
            ..old.clone()
        };
        let diff = status_diff(&old, &new).unwrap().unwrap();
        assert_eq!(diff, serde_json::json!({ "readyReplicas": 3 }));
    }
}

mod status_manager_tests {
    use super::*;

    #[tokio::test]
    async fn test_no_op_patch_does_not_write() {
        let mariadb = MariaDBBuilder::replication("mdb", "default")
            .with_current_primary(0)
            .build();
        let store = Arc::new(FakeStore::new().with_mariadb(mariadb.clone()));

        let wrote = StatusManager::new(&mariadb, store.as_ref())
            .patch(|status| status.current_primary_pod_index = Some(0))
            .await
            .unwrap();

        assert!(!wrote);
        assert_eq!(store.mutations(), 0);
    }

    #[tokio::test]
    async fn test_patch_writes_and_stores() {
        let mariadb = MariaDBBuilder::replication("mdb", "default")
            .with_current_primary(0)
            .build();
        let store = Arc::new(FakeStore::new().with_mariadb(mariadb.clone()));

        let wrote = StatusManager::new(&mariadb, store.as_ref())
            .patch_conditions(|c| c.ready(true, condition_reasons::STATEFULSET_READY, "Running"))
            .await
            .unwrap();

        assert!(wrote);
        assert_eq!(store.status_patches().len(), 1);
        assert!(store.mariadb("default", "mdb").is_ready());
        // Untouched fields are not part of the patch
        assert!(store.status_patches()[0].get("currentPrimary").is_none());
    }

    #[tokio::test]
    async fn test_stale_object_is_rejected() {
        let mariadb = MariaDBBuilder::replication("mdb", "default").build();
        let store = Arc::new(FakeStore::new().with_mariadb(mariadb.clone()));

        let manager = StatusManager::new(&mariadb, store.as_ref());
        manager.patch(|s| s.replicas = 3).await.unwrap();
        let err = manager.patch(|s| s.replicas = 4).await.unwrap_err();

        assert!(err.to_string().contains("conflict"));
        assert!(err.is_retryable());
    }
}
