//! Unit tests for the primary state machine

use mariadb_operator::controller::state_machine::{
    PrimaryEvent, PrimaryPhase, PrimaryState, PrimaryStateMachine, TransitionContext,
    TransitionResult, is_switching,
};

use crate::common::*;

mod derived_state_tests {
    use super::*;

    #[test]
    fn test_unknown_without_observed_primary() {
        let mariadb = MariaDBBuilder::replication("mdb", "default").build();
        assert_eq!(PrimaryState::from_resource(&mariadb), PrimaryState::Unknown);
        assert!(!mariadb.is_switching_primary());
    }

    #[test]
    fn test_stable_when_desired_matches_observed() {
        let mariadb = MariaDBBuilder::replication("mdb", "default")
            .with_primary_index(1)
            .with_current_primary(1)
            .build();
        assert_eq!(
            PrimaryState::from_resource(&mariadb),
            PrimaryState::Stable { index: 1 }
        );
    }

    #[test]
    fn test_switching_when_desired_differs() {
        let mariadb = MariaDBBuilder::replication("mdb", "default")
            .with_primary_index(2)
            .with_current_primary(0)
            .build();
        assert_eq!(
            PrimaryState::from_resource(&mariadb),
            PrimaryState::Switching { from: 0, to: 2 }
        );
        assert!(is_switching(&mariadb.spec, mariadb.status.as_ref()));
    }

    #[test]
    fn test_unset_pod_index_means_first_member() {
        let mariadb = MariaDBBuilder::galera("mdb", "default")
            .with_current_primary(0)
            .build();
        assert_eq!(
            PrimaryState::from_resource(&mariadb),
            PrimaryState::Stable { index: 0 }
        );
    }

    #[test]
    fn test_standalone_never_switches() {
        let mut mariadb = create_test_mariadb("mdb", "default", 1);
        mariadb.status = Some(mariadb_operator::crd::MariaDBStatus {
            current_primary_pod_index: Some(5),
            ..Default::default()
        });
        assert!(!is_switching(&mariadb.spec, mariadb.status.as_ref()));
    }
}

mod transition_tests {
    use super::*;

    #[test]
    fn test_unknown_converges_on_target() {
        let sm = PrimaryStateMachine::new();
        let result = sm.transition(
            PrimaryState::Unknown,
            PrimaryEvent::SwitchConverged,
            &TransitionContext::new(3, Some(0)),
        );
        assert!(matches!(
            result,
            TransitionResult::Success {
                to: PrimaryState::Stable { index: 0 },
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_rejects_failover() {
        let sm = PrimaryStateMachine::new();
        let result = sm.transition(
            PrimaryState::Unknown,
            PrimaryEvent::PrimaryFailed,
            &TransitionContext::new(3, Some(1)),
        );
        assert!(matches!(result, TransitionResult::InvalidTransition { .. }));
    }

    #[test]
    fn test_failover_without_candidate_fails_guard() {
        let sm = PrimaryStateMachine::new();
        let result = sm.transition(
            PrimaryState::Stable { index: 0 },
            PrimaryEvent::PrimaryFailed,
            &TransitionContext::new(3, None),
        );
        match result {
            TransitionResult::GuardFailed { reason, .. } => {
                assert!(reason.contains("no target"));
            }
            other => panic!("expected guard failure, got {other:?}"),
        }
    }

    #[test]
    fn test_stable_rejects_converge() {
        let sm = PrimaryStateMachine::new();
        assert!(!sm.can_transition(PrimaryPhase::Stable, PrimaryEvent::SwitchConverged));
    }

    #[test]
    fn test_valid_events() {
        let sm = PrimaryStateMachine::new();
        let stable = sm.valid_events(PrimaryPhase::Stable);
        assert!(stable.contains(&PrimaryEvent::PrimaryFailed));
        assert!(stable.contains(&PrimaryEvent::SwitchRequested));
        assert_eq!(
            sm.valid_events(PrimaryPhase::Unknown),
            vec![PrimaryEvent::SwitchConverged]
        );
    }

    #[test]
    fn test_full_failover_cycle() {
        let sm = PrimaryStateMachine::new();
        let ctx = TransitionContext::new(3, Some(2));

        let TransitionResult::Success { to: switching, .. } = sm.transition(
            PrimaryState::Stable { index: 0 },
            PrimaryEvent::PrimaryFailed,
            &ctx,
        ) else {
            panic!("failover refused");
        };
        assert_eq!(switching, PrimaryState::Switching { from: 0, to: 2 });

        let TransitionResult::Success { to: stable, .. } =
            sm.transition(switching, PrimaryEvent::SwitchConverged, &ctx)
        else {
            panic!("convergence refused");
        };
        assert_eq!(stable, PrimaryState::Stable { index: 2 });
    }

    #[test]
    fn test_display() {
        assert_eq!(PrimaryState::Unknown.to_string(), "Unknown");
        assert_eq!(
            PrimaryState::Switching { from: 0, to: 1 }.to_string(),
            "Switching(0 -> 1)"
        );
        assert_eq!(PrimaryEvent::PrimaryFailed.to_string(), "PrimaryFailed");
    }
}
