//! Deduplication engine
//!
//! Decides, per task record, whether it should be reported this run. The
//! decision is keyed jointly on running-set membership (step A) and epoch
//! comparison (step B): a running record stops at step A, everything else
//! falls through to step B.
//!
//! Records must arrive in non-decreasing `start_time` order. The "epoch
//! advances monotonically" rule depends on it, and keeping the input sorted
//! is the poll driver's job, not this module's.

use tracing::debug;

use crate::model::TaskRecord;
use crate::state::PersistedState;

/// Outcome of classifying one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// New task in the current (or a newly opened) epoch; emit it.
    Report,
    /// Still running; tracked and re-evaluated on a future run.
    Deferred,
    /// Belongs to an epoch older than the current one.
    Stale,
    /// Already reported within the current epoch.
    AlreadyReported,
}

/// Classify one record against the state, mutating the state as needed.
pub fn classify(state: &mut PersistedState, record: &TaskRecord) -> Classification {
    // Step A: running-set transition. An in-flight task is tracked but
    // never reported; reporting waits until a later record (this batch or a
    // future run) shows it complete. A completion drops the id from the
    // running set and falls through to the epoch logic.
    if record.state.is_running() {
        state.running_task_ids.insert(record.id.clone());
        return Classification::Deferred;
    }
    state.running_task_ids.remove(&record.id);

    // Step B: epoch comparison. Equality must be exact; a record whose
    // start time lands on the epoch boundary stays in the open epoch.
    let epoch = record.epoch();
    if epoch < state.current_epoch {
        return Classification::Stale;
    }
    if epoch == state.current_epoch {
        if state.current_epoch_task_ids.contains(&record.id) {
            return Classification::AlreadyReported;
        }
        state.current_epoch_task_ids.insert(record.id.clone());
        return Classification::Report;
    }

    // A later epoch closes the previous one.
    state.current_epoch = epoch;
    state.current_epoch_task_ids.clear();
    state.current_epoch_task_ids.insert(record.id.clone());
    Classification::Report
}

/// Run a sorted batch through the engine, returning the records to report
/// in classification order.
pub fn process(state: &mut PersistedState, records: &[TaskRecord]) -> Vec<TaskRecord> {
    let mut reported = Vec::new();
    for record in records {
        let classification = classify(state, record);
        debug!(
            "Task {} ({}, epoch {}): {:?}",
            record.id,
            record.state,
            record.epoch(),
            classification
        );
        if classification == Classification::Report {
            reported.push(record.clone());
        }
    }
    reported
}
