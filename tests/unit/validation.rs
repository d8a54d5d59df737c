//! Unit tests for spec validation

use mariadb_operator::controller::Error;
use mariadb_operator::controller::validation::{MAX_REPLICAS, validate_spec};
use mariadb_operator::crd::{GaleraSpec, MinClusterSize, PrimarySpec};

use crate::common::*;

fn assert_invalid(mariadb: &mariadb_operator::crd::MariaDB, needle: &str) {
    match validate_spec(mariadb) {
        Err(Error::ValidationError(msg)) => {
            assert!(msg.contains(needle), "unexpected message: {msg}")
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}

mod replicas_tests {
    use super::*;

    #[test]
    fn test_valid_replica_counts() {
        for replicas in [1, 3, MAX_REPLICAS] {
            let mariadb = create_test_mariadb("mdb", "default", replicas);
            assert!(validate_spec(&mariadb).is_ok(), "replicas={replicas}");
        }
    }

    #[test]
    fn test_zero_replicas_rejected() {
        assert_invalid(&create_test_mariadb("mdb", "default", 0), "below minimum");
    }

    #[test]
    fn test_too_many_replicas_rejected() {
        assert_invalid(
            &create_test_mariadb("mdb", "default", MAX_REPLICAS + 1),
            "exceeds maximum",
        );
    }
}

mod port_tests {
    use super::*;

    #[test]
    fn test_port_range() {
        let mut mariadb = create_test_mariadb("mdb", "default", 1);
        for port in [1, 3306, 65535] {
            mariadb.spec.port = port;
            assert!(validate_spec(&mariadb).is_ok(), "port={port}");
        }
        for port in [0, -1, 65536, 70000] {
            mariadb.spec.port = port;
            assert_invalid(&mariadb, "out of range [1, 65535]");
        }
    }
}

mod topology_tests {
    use super::*;

    #[test]
    fn test_replication_and_galera_are_exclusive() {
        let mut mariadb = MariaDBBuilder::replication("mdb", "default").build();
        mariadb.spec.galera = Some(GaleraSpec {
            enabled: true,
            primary: PrimarySpec::default(),
            recovery: None,
        });
        assert_invalid(&mariadb, "cannot be enabled at the same time");
    }

    #[test]
    fn test_disabled_galera_block_is_ignored() {
        let mut mariadb = MariaDBBuilder::replication("mdb", "default").build();
        mariadb.spec.galera = Some(GaleraSpec {
            enabled: false,
            primary: PrimarySpec::default(),
            recovery: None,
        });
        assert!(validate_spec(&mariadb).is_ok());
    }

    #[test]
    fn test_primary_index_out_of_range() {
        let mariadb = MariaDBBuilder::replication("mdb", "default")
            .with_primary_index(3)
            .build();
        assert_invalid(&mariadb, "out of range");

        let mariadb = MariaDBBuilder::replication("mdb", "default")
            .with_primary_index(-1)
            .build();
        assert_invalid(&mariadb, "out of range");
    }

    #[test]
    fn test_primary_index_last_member() {
        let mariadb = MariaDBBuilder::replication("mdb", "default")
            .with_primary_index(2)
            .build();
        assert!(validate_spec(&mariadb).is_ok());
    }
}

mod galera_recovery_tests {
    use super::*;

    #[test]
    fn test_min_cluster_size_count() {
        let ok = MariaDBBuilder::galera("mdb", "default")
            .with_min_cluster_size(MinClusterSize::Count(2))
            .build();
        assert!(validate_spec(&ok).is_ok());

        let too_big = MariaDBBuilder::galera("mdb", "default")
            .with_min_cluster_size(MinClusterSize::Count(4))
            .build();
        assert_invalid(&too_big, "minClusterSize");

        let zero = MariaDBBuilder::galera("mdb", "default")
            .with_min_cluster_size(MinClusterSize::Count(0))
            .build();
        assert_invalid(&zero, "minClusterSize");
    }

    #[test]
    fn test_min_cluster_size_percent() {
        let ok = MariaDBBuilder::galera("mdb", "default")
            .with_min_cluster_size(MinClusterSize::Percent("50%".to_string()))
            .build();
        assert!(validate_spec(&ok).is_ok());

        let garbage = MariaDBBuilder::galera("mdb", "default")
            .with_min_cluster_size(MinClusterSize::Percent("half".to_string()))
            .build();
        assert_invalid(&garbage, "percentage");

        let over = MariaDBBuilder::galera("mdb", "default")
            .with_min_cluster_size(MinClusterSize::Percent("150%".to_string()))
            .build();
        assert_invalid(&over, "out of range");
    }

    #[test]
    fn test_percent_rounds_up() {
        assert_eq!(MinClusterSize::Percent("50%".into()).resolve(3), Ok(2));
        assert_eq!(MinClusterSize::Percent("100%".into()).resolve(5), Ok(5));
        assert_eq!(MinClusterSize::Percent("1%".into()).resolve(3), Ok(1));
    }
}

mod storage_tests {
    use super::*;

    #[test]
    fn test_valid_sizes() {
        for size in ["1Gi", "500Mi", "2Ti"] {
            let mariadb = MariaDBBuilder::new("mdb", "default").with_storage(size).build();
            assert!(validate_spec(&mariadb).is_ok(), "size={size}");
        }
    }

    #[test]
    fn test_invalid_suffix() {
        let mariadb = MariaDBBuilder::new("mdb", "default").with_storage("10GB").build();
        assert_invalid(&mariadb, "must end with");
    }

    #[test]
    fn test_invalid_number() {
        let mariadb = MariaDBBuilder::new("mdb", "default").with_storage("tenGi").build();
        assert_invalid(&mariadb, "invalid storage size");
    }
}
