//! Retention truncation of logged messages

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::metrics::LOGS_TRUNCATED_TOTAL;

use super::backend::{LogBackend, LogBackendError, LogResult};

/// Default number of days logged messages are kept
pub const DEFAULT_RETENTION_DAYS: i64 = 180;

/// Outcome of a truncation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TruncateReport {
    /// Records strictly older than this were selected
    pub cutoff: DateTime<Utc>,
    /// Records matching the cutoff
    pub matched: u64,
    /// Records deleted; always zero for a dry run
    pub deleted: u64,
    pub committed: bool,
}

/// Start of the day `retention_days` before `today`, in UTC.
///
/// `None` for a negative period or one reaching past the earliest date.
pub fn retention_cutoff(today: NaiveDate, retention_days: i64) -> Option<DateTime<Utc>> {
    let days = u64::try_from(retention_days).ok()?;
    let day = today.checked_sub_days(Days::new(days))?;
    Some(day.and_time(NaiveTime::MIN).and_utc())
}

/// Delete logged messages older than the retention period.
///
/// Without `commit` the matching records are only counted.
pub async fn truncate_logs(
    backend: &dyn LogBackend,
    retention_days: i64,
    commit: bool,
    today: NaiveDate,
) -> LogResult<TruncateReport> {
    let cutoff = retention_cutoff(today, retention_days).ok_or_else(|| {
        LogBackendError::InvalidArgument(format!(
            "Invalid retention period: {} days",
            retention_days
        ))
    })?;
    let matched = backend.count_before(cutoff).await?;

    let deleted = if commit {
        let deleted = backend.delete_before(cutoff).await?;
        LOGS_TRUNCATED_TOTAL.inc_by(deleted);
        deleted
    } else {
        0
    };

    tracing::info!(
        cutoff = %cutoff,
        retention_days = retention_days,
        matched = matched,
        deleted = deleted,
        commit = commit,
        "Logged message truncation finished"
    );

    Ok(TruncateReport {
        cutoff,
        matched,
        deleted,
        committed: commit,
    })
}
