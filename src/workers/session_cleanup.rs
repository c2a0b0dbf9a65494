use std::time::Instant;

use tracing::{debug, info};

use crate::db::operations::user;
use crate::db::DatabaseProxy;
use crate::time::now_ms;

pub async fn cleanup_expired_sessions(db: &DatabaseProxy) -> Result<u64, super::WorkerError> {
    let start = Instant::now();
    debug!("Starting session cleanup cycle");

    let deleted = user::delete_expired_sessions(db, now_ms()).await?;

    info!(
        expired_sessions = deleted,
        duration_secs = format!("{:.2}", start.elapsed().as_secs_f64()),
        "Session cleanup completed"
    );
    Ok(deleted)
}
