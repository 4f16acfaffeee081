//! Dependency admission
//!
//! Decides whether a task should run given its `run_on` policy and the
//! resolved statuses of its dependencies. Pure and lock-free.

use std::collections::HashMap;

use crate::domain::status::{RunOn, StatusValue};

/// Returns whether a task with policy `run_on` is admitted for `dep_status`.
///
/// An empty policy behaves like `[success]`. With no dependencies the
/// default policy admits vacuously.
pub fn should_run<K>(run_on: &[RunOn], dep_status: &HashMap<K, StatusValue>) -> bool {
    let on_success = run_on.is_empty() || run_on.contains(&RunOn::Success);
    let on_failure = run_on.contains(&RunOn::Failure);

    match (on_success, on_failure) {
        (true, true) => true,
        (true, false) => dep_status.values().all(|s| *s == StatusValue::Success),
        (false, true) => !dep_status.values().any(|s| *s == StatusValue::Success),
        (false, false) => {
            // Not derivable from a subset of {success, failure}.
            tracing::error!(?run_on, "run_on policy admits neither outcome");
            false
        }
    }
}
