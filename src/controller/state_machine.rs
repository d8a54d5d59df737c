//! Finite state machine for the primary role of a MariaDB cluster
//!
//! The primary is never persisted as an explicit state. It is derived from the
//! divergence between the desired index in the spec and the observed index in
//! the status:
//!
//! - no observed index: [`PrimaryState::Unknown`]
//! - desired == observed: [`PrimaryState::Stable`]
//! - desired != observed: [`PrimaryState::Switching`]
//!
//! Transitions are validated against a fixed table before anything is
//! written, so an election can never move the primary out of range or start a
//! second switch while one is in flight.

use std::fmt;

use crate::crd::{MariaDB, MariaDBSpec, MariaDBStatus};

/// Whether a primary switch is in flight
///
/// Every call site uses this predicate instead of comparing indexes itself.
pub fn is_switching(spec: &MariaDBSpec, status: Option<&MariaDBStatus>) -> bool {
    let Some(primary) = spec.primary() else {
        return false;
    };
    let Some(current) = status.and_then(|s| s.current_primary_pod_index) else {
        return false;
    };
    primary.pod_index.unwrap_or(0) != current
}

/// Primary role derived from a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryState {
    /// No primary observed yet
    Unknown,
    Stable { index: i32 },
    Switching { from: i32, to: i32 },
}

impl PrimaryState {
    pub fn from_resource(mariadb: &MariaDB) -> Self {
        let desired = mariadb.desired_primary_index();
        match mariadb.current_primary_index() {
            None => PrimaryState::Unknown,
            Some(current) if is_switching(&mariadb.spec, mariadb.status.as_ref()) => {
                PrimaryState::Switching {
                    from: current,
                    to: desired,
                }
            }
            Some(current) => PrimaryState::Stable { index: current },
        }
    }

    pub fn phase(&self) -> PrimaryPhase {
        match self {
            PrimaryState::Unknown => PrimaryPhase::Unknown,
            PrimaryState::Stable { .. } => PrimaryPhase::Stable,
            PrimaryState::Switching { .. } => PrimaryPhase::Switching,
        }
    }
}

impl fmt::Display for PrimaryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryState::Unknown => write!(f, "Unknown"),
            PrimaryState::Stable { index } => write!(f, "Stable({index})"),
            PrimaryState::Switching { from, to } => write!(f, "Switching({from} -> {to})"),
        }
    }
}

/// Data-less discriminant used by the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimaryPhase {
    Unknown,
    Stable,
    Switching,
}

/// Events that move the primary role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimaryEvent {
    /// The observed primary stopped being ready
    PrimaryFailed,
    /// The desired primary was changed (by a user or by the operator)
    SwitchRequested,
    /// Routing and status now point at the desired primary
    SwitchConverged,
}

impl fmt::Display for PrimaryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryEvent::PrimaryFailed => write!(f, "PrimaryFailed"),
            PrimaryEvent::SwitchRequested => write!(f, "SwitchRequested"),
            PrimaryEvent::SwitchConverged => write!(f, "SwitchConverged"),
        }
    }
}

/// Context information available during a transition
#[derive(Debug, Clone)]
pub struct TransitionContext {
    /// Members in the StatefulSet
    pub replicas: i32,
    /// Index the primary should move to, if any
    pub target: Option<i32>,
}

impl TransitionContext {
    pub fn new(replicas: i32, target: Option<i32>) -> Self {
        Self { replicas, target }
    }

    fn target_in_range(&self) -> Result<i32, String> {
        match self.target {
            None => Err("no target member".to_string()),
            Some(t) if t < 0 || t >= self.replicas => Err(format!(
                "target member {t} out of range for {} replicas",
                self.replicas
            )),
            Some(t) => Ok(t),
        }
    }
}

#[derive(Debug)]
struct Transition {
    from: PrimaryPhase,
    to: PrimaryPhase,
    event: PrimaryEvent,
    description: &'static str,
}

impl Transition {
    const fn new(
        from: PrimaryPhase,
        to: PrimaryPhase,
        event: PrimaryEvent,
        description: &'static str,
    ) -> Self {
        Self {
            from,
            to,
            event,
            description,
        }
    }
}

/// Result of attempting a transition
#[derive(Debug, PartialEq, Eq)]
pub enum TransitionResult {
    Success {
        from: PrimaryState,
        to: PrimaryState,
        event: PrimaryEvent,
        description: &'static str,
    },
    InvalidTransition {
        current: PrimaryState,
        event: PrimaryEvent,
    },
    GuardFailed {
        current: PrimaryState,
        event: PrimaryEvent,
        reason: String,
    },
}

impl TransitionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionResult::Success { .. })
    }
}

pub struct PrimaryStateMachine {
    transitions: Vec<Transition>,
}

impl Default for PrimaryStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimaryStateMachine {
    pub fn new() -> Self {
        Self {
            transitions: vec![
                // === Unknown ===
                Transition::new(
                    PrimaryPhase::Unknown,
                    PrimaryPhase::Stable,
                    PrimaryEvent::SwitchConverged,
                    "Initial primary observed",
                ),
                // === Stable ===
                Transition::new(
                    PrimaryPhase::Stable,
                    PrimaryPhase::Switching,
                    PrimaryEvent::PrimaryFailed,
                    "Primary failed, electing a replacement",
                ),
                Transition::new(
                    PrimaryPhase::Stable,
                    PrimaryPhase::Switching,
                    PrimaryEvent::SwitchRequested,
                    "Primary switch requested",
                ),
                // === Switching ===
                Transition::new(
                    PrimaryPhase::Switching,
                    PrimaryPhase::Stable,
                    PrimaryEvent::SwitchConverged,
                    "Primary switched",
                ),
            ],
        }
    }

    pub fn transition(
        &self,
        current: PrimaryState,
        event: PrimaryEvent,
        ctx: &TransitionContext,
    ) -> TransitionResult {
        let Some(t) = self
            .transitions
            .iter()
            .find(|t| t.from == current.phase() && t.event == event)
        else {
            return TransitionResult::InvalidTransition { current, event };
        };

        match self.apply(t, current, ctx) {
            Ok(to) => TransitionResult::Success {
                from: current,
                to,
                event,
                description: t.description,
            },
            Err(reason) => TransitionResult::GuardFailed {
                current,
                event,
                reason,
            },
        }
    }

    /// Check if a transition exists (ignoring guards)
    pub fn can_transition(&self, from: PrimaryPhase, event: PrimaryEvent) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == from && t.event == event)
    }

    pub fn valid_events(&self, state: PrimaryPhase) -> Vec<PrimaryEvent> {
        self.transitions
            .iter()
            .filter(|t| t.from == state)
            .map(|t| t.event)
            .collect()
    }

    /// Guard the transition and compute the target state
    fn apply(
        &self,
        transition: &Transition,
        current: PrimaryState,
        ctx: &TransitionContext,
    ) -> Result<PrimaryState, String> {
        match (current, transition.to) {
            (PrimaryState::Stable { index }, PrimaryPhase::Switching) => {
                let to = ctx.target_in_range()?;
                if to == index {
                    return Err(format!("member {to} is already the primary"));
                }
                Ok(PrimaryState::Switching { from: index, to })
            }
            (PrimaryState::Switching { to, .. }, PrimaryPhase::Stable) => {
                Ok(PrimaryState::Stable { index: to })
            }
            (PrimaryState::Unknown, PrimaryPhase::Stable) => {
                let index = ctx.target_in_range()?;
                Ok(PrimaryState::Stable { index })
            }
            _ => Err(format!(
                "unsupported transition {:?} -> {:?}",
                transition.from, transition.to
            )),
        }
    }
}
