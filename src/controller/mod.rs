pub mod cluster_health;
pub mod context;
pub mod error;
pub mod pod;
pub mod primary;
pub mod reconciler;
pub mod state_machine;
pub mod status;
pub mod store;
pub mod validation;

pub use cluster_health::{ClusterHealthEvaluator, reconcile_galera};
pub use context::Context;
pub use error::{BackoffConfig, Error, Errors, Result};
pub use pod::{pod_error_policy, reconcile_pod};
pub use primary::PrimaryElection;
pub use reconciler::{Orchestrator, Phase, error_policy, reconcile};
pub use state_machine::{PrimaryEvent, PrimaryState, PrimaryStateMachine};
pub use status::{ConditionBuilder, StatusManager};
pub use store::{ChildObject, ClusterStore, KubeStore, RecordedEvent};
pub use validation::{MAX_REPLICAS, MIN_REPLICAS, validate_spec};
