use std::time::Instant;

use tracing::{debug, info, warn};

use crate::db::operations::profile;
use crate::db::DatabaseProxy;
use crate::services::decay::run_lazy_decay;
use crate::time::now_ms;

/// Runs lazy decay for every profile so ghosts appear even for students who
/// have not opened the app. A failing profile is logged and skipped.
pub async fn sweep_all_profiles(db: &DatabaseProxy) -> Result<usize, super::WorkerError> {
    let start = Instant::now();
    debug!("Starting decay sweep");

    let now = now_ms();
    let mut decayed = 0usize;
    for profile_id in profile::list_all_profile_ids(db).await? {
        match run_lazy_decay(db, &profile_id, now).await {
            Ok(topics) => decayed += topics.len(),
            Err(err) => {
                warn!(profile_id = %profile_id, error = %err, "decay sweep failed for profile")
            }
        }
    }

    info!(
        decayed,
        duration_secs = format!("{:.2}", start.elapsed().as_secs_f64()),
        "Decay sweep completed"
    );
    Ok(decayed)
}
