use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

static ARTIFACT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Collision-resistant id for scratch and output artifacts: epoch
/// milliseconds plus a process-wide monotonic counter. Two artifacts
/// created within the same millisecond still get distinct names.
pub fn unique_artifact_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let sequence = ARTIFACT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{millis}-{sequence:04}")
}
