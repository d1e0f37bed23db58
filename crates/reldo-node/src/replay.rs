use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reldo_escrow::{EventLog, EventRecord, JobProjection, JobStatus, Timestamp};
use std::fmt::Write;
use std::path::Path;
use tracing::info;

pub fn load_events(path: &Path) -> Result<Vec<EventRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read event log {}", path.display()))?;
    EventLog::parse_json(&content)
        .with_context(|| format!("Failed to parse event log {}", path.display()))
}

pub fn replay_file(path: &Path) -> Result<JobProjection> {
    let records = load_events(path)?;
    let projection = JobProjection::replay(&records)
        .with_context(|| format!("Event log {} is inconsistent", path.display()))?;

    info!(
        events = records.len(),
        jobs = projection.jobs.len(),
        "🔁 Event log replayed"
    );
    Ok(projection)
}

fn format_time(ts: Timestamp) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Plain-text job table for the `replay` command.
pub fn render_table(projection: &JobProjection) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>4}  {:<10} {:>12} {:>10} {:>10} {:>7} {:>12}  {}",
        "job", "status", "bounty", "approve", "reject", "voters", "in escrow", "deadline"
    );
    for job in projection.jobs.values() {
        let deadline = job
            .voting_deadline
            .map(format_time)
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:>4}  {:<10} {:>12} {:>10} {:>10} {:>7} {:>12}  {}",
            job.id,
            job.status.to_string(),
            job.bounty.to_string(),
            job.approve_weight,
            job.reject_weight,
            job.ballots.len(),
            job.escrow_remaining().to_string(),
            deadline
        );
    }

    let counts = projection.count_by_status();
    let _ = writeln!(out);
    for status in [
        JobStatus::Open,
        JobStatus::Submitted,
        JobStatus::Approved,
        JobStatus::Rejected,
        JobStatus::Cancelled,
    ] {
        let _ = write!(out, "{}={} ", status, counts.get(&status).copied().unwrap_or(0));
    }
    if let Some(weight) = projection.min_vote_weight {
        let _ = write!(out, "min_vote_weight={} ", weight);
    }
    if let Some(admin) = projection.admin {
        let _ = write!(out, "admin={}", admin);
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "1970-01-01 00:00:00");
        assert_eq!(format_time(u64::MAX), u64::MAX.to_string());
    }

    #[test]
    fn test_empty_table() {
        let table = render_table(&JobProjection::default());
        assert!(table.starts_with(" job"));
        assert!(table.contains("Open=0"));
    }
}
