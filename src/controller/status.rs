//! Status and conditions management for MariaDB resources
//!
//! Status writes always start from the status of a freshly read object: the
//! caller mutates a copy and only the top level fields that changed are sent
//! as a merge patch. Nothing is written when the mutation is a no-op.

use chrono::Utc;
use serde_json::{Map, Value};

use crate::controller::error::Result;
use crate::controller::store::ClusterStore;
use crate::crd::{Condition, MariaDB, MariaDBStatus, condition_status, condition_types};

/// Builder for creating and updating status conditions
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
}

impl ConditionBuilder {
    pub fn new(generation: Option<i64>) -> Self {
        Self {
            conditions: Vec::new(),
            generation,
        }
    }

    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>) -> Self {
        Self {
            conditions: existing,
            generation,
        }
    }

    /// Set a condition, updating if it exists or adding if it doesn't
    pub fn set_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            // The transition time only moves when the status flips
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = Utc::now().to_rfc3339();
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = self.generation;
        } else {
            self.conditions.push(Condition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: Utc::now().to_rfc3339(),
                observed_generation: self.generation,
            });
        }
        self
    }

    fn set_bool(self, type_: &str, value: bool, reason: &str, message: &str) -> Self {
        let status = if value {
            condition_status::TRUE
        } else {
            condition_status::FALSE
        };
        self.set_condition(type_, status, reason, message)
    }

    pub fn ready(self, is_ready: bool, reason: &str, message: &str) -> Self {
        self.set_bool(condition_types::READY, is_ready, reason, message)
    }

    pub fn primary_switched(self, switched: bool, reason: &str, message: &str) -> Self {
        self.set_bool(condition_types::PRIMARY_SWITCHED, switched, reason, message)
    }

    pub fn galera_ready(self, is_ready: bool, reason: &str, message: &str) -> Self {
        self.set_bool(condition_types::GALERA_READY, is_ready, reason, message)
    }

    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

/// Apply condition updates to a status in place
pub fn update_conditions<F>(status: &mut MariaDBStatus, generation: Option<i64>, f: F)
where
    F: FnOnce(ConditionBuilder) -> ConditionBuilder,
{
    let existing = std::mem::take(&mut status.conditions);
    status.conditions = f(ConditionBuilder::from_existing(existing, generation)).build();
}

/// Top level JSON merge patch turning `old` into `new`
///
/// Removed fields are sent as `null`. Returns `None` when nothing changed.
pub fn status_diff(old: &MariaDBStatus, new: &MariaDBStatus) -> Result<Option<Value>> {
    let Value::Object(old) = serde_json::to_value(old)? else {
        return Ok(None);
    };
    let Value::Object(new) = serde_json::to_value(new)? else {
        return Ok(None);
    };

    let mut patch = Map::new();
    for (key, value) in &new {
        if old.get(key) != Some(value) {
            patch.insert(key.clone(), value.clone());
        }
    }
    for key in old.keys() {
        if !new.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }

    Ok((!patch.is_empty()).then_some(Value::Object(patch)))
}

/// Status manager for MariaDB resources
pub struct StatusManager<'a> {
    mariadb: &'a MariaDB,
    store: &'a dyn ClusterStore,
}

impl<'a> StatusManager<'a> {
    pub fn new(mariadb: &'a MariaDB, store: &'a dyn ClusterStore) -> Self {
        Self { mariadb, store }
    }

    /// Mutate a copy of the current status and send the difference
    ///
    /// Returns whether a write was issued.
    pub async fn patch<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&mut MariaDBStatus),
    {
        let current = self.mariadb.status.clone().unwrap_or_default();
        let mut desired = current.clone();
        f(&mut desired);

        if desired == current {
            return Ok(false);
        }
        let Some(diff) = status_diff(&current, &desired)? else {
            return Ok(false);
        };
        self.store.patch_status(self.mariadb, diff).await?;
        Ok(true)
    }

    /// Patch only the conditions
    pub async fn patch_conditions<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(ConditionBuilder) -> ConditionBuilder,
    {
        let generation = self.mariadb.metadata.generation;
        self.patch(|status| update_conditions(status, generation, f))
            .await
    }
}
