//! Poll driver
//!
//! One run is one linear pass: fetch records for the window, sort them
//! ascending by start time, classify each against the persisted state, emit
//! the reported ones, and flush the state once at the end. A total
//! connection failure degrades to an empty batch, which leaves the
//! persisted state as it was.

use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::dedup;
use crate::emit::Emitter;
use crate::model::TaskRecord;
use crate::state::PersistedState;
use crate::vsphere::{TimeFilter, VsphereClient};

/// Sort a batch ascending by start time. The dedup engine's epoch
/// monotonicity depends on this ordering; the sort is stable so records
/// sharing a start time keep their server order (running before complete
/// for a task that did both inside the window).
fn sort_batch(records: &mut [TaskRecord]) {
    records.sort_by_key(|record| record.start_time);
}

/// Execute one poll run and return the number of tasks reported.
pub async fn run(
    client: &VsphereClient,
    emitter: &Emitter,
    filter: &TimeFilter,
    state_path: &Path,
) -> Result<usize> {
    let mut records = match client.fetch(filter).await {
        Ok(records) => records,
        Err(e) => {
            // Nothing fetched means nothing to report; the run still
            // completes and the state on disk stands.
            warn!("Fetch failed, treating as empty batch: {}", e);
            Vec::new()
        }
    };
    info!(
        "Fetched {} task record(s) for window {} .. {}",
        records.len(),
        filter.begin.to_rfc3339(),
        filter.end.to_rfc3339()
    );

    sort_batch(&mut records);

    let mut state = PersistedState::load(state_path);
    let reported = dedup::process(&mut state, &records);
    for record in &reported {
        if let Err(e) = emitter.emit(record).await {
            // Emit failures never block the final state flush.
            warn!("Emit failed for task {}: {:#}", record.id, e);
        }
    }

    state.save(state_path)?;
    info!("Reported {} task(s)", reported.len());
    Ok(reported.len())
}
