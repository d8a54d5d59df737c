// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for the MariaDB operator
//!
//! Everything here runs against the in-memory fakes of `tests/common`:
//! - Resource generators (StatefulSet, Services, ConfigMap, Secrets, PDB)
//! - Validation logic
//! - Status management and the primary state machine
//! - Primary election, Galera health and the reconcile orchestrator
//! - Backup selection, storage and the backup commands

#[path = "../common/mod.rs"]
mod common;

mod orchestrator;
mod resources;
mod state_machine;
mod status;
mod validation;
