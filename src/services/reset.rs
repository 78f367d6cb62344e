//! Reset service — daily archive-and-clear of every live room.
//!
//! DESIGN
//! ======
//! Once per calendar day, at local midnight, the sweep takes every room's
//! canvas out of the store under one write lock, tells each room's members,
//! and upserts a snapshot of every room with items into the archive.
//! Observers see every canvas either before the sweep or empty, never half
//! cleared. Members stay joined, so later events still reach them.
//!
//! The timer re-arms itself from the wall clock after each sweep rather than
//! ticking on a fixed interval, so DST shifts and mid-day restarts land on
//! the next real midnight. A process that is down across midnight skips that
//! day's sweep; there is no catch-up.
//!
//! ERROR HANDLING
//! ==============
//! Each room's upsert is independent. A failed upsert is logged with room
//! and date and that room's history for the day is lost; live state is
//! cleared regardless and the next midnight is always scheduled.

use std::time::Duration;

use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::frame::{Data, Frame};
use crate::services::history::{ArchiveRecord, format_day};
use crate::services::room::RoomState;
use crate::state::AppState;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetReport {
    /// Rooms removed from the store.
    pub cleared: usize,
    /// Rooms whose snapshot was written.
    pub archived: usize,
    /// Rooms whose snapshot write failed.
    pub failed: usize,
}

// =============================================================================
// SCHEDULING
// =============================================================================

/// First instant strictly after `now` that is local midnight in `now`'s zone.
///
/// When midnight falls into a DST gap the first valid local time after it is
/// used; when it is ambiguous the earlier instant wins.
pub fn next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    loop {
        let Some(next_day) = day.succ_opt() else {
            return now.clone() + chrono::Duration::days(1);
        };
        day = next_day;

        let midnight = day.and_time(NaiveTime::MIN);
        // Gaps are at most a few hours; step forward 15 minutes at a time.
        let resolved = (0..=24).find_map(|step| {
            let local = midnight + chrono::Duration::minutes(15 * step);
            match tz.from_local_datetime(&local) {
                LocalResult::Single(at) | LocalResult::Ambiguous(at, _) => Some(at),
                LocalResult::None => None,
            }
        });

        match resolved {
            Some(at) if at > *now => return at,
            Some(_) => {}
            None => return now.clone() + chrono::Duration::days(1),
        }
    }
}

/// Time left until the next local midnight.
#[must_use]
pub fn until_next_midnight(now: &DateTime<Local>) -> Duration {
    (next_midnight(now) - now.clone()).to_std().unwrap_or(Duration::ZERO)
}

/// Spawn the daily reset loop. Returns a handle for shutdown.
pub fn spawn_reset_scheduler(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Local::now();
            let target = next_midnight(&now);
            info!(next_reset = %target, wait_secs = until_next_midnight(&now).as_secs(), "daily reset scheduled");

            // The timer runs on the monotonic clock; re-check the wall clock
            // so a drifted wake-up never sweeps before midnight.
            loop {
                let now = Local::now();
                if now >= target {
                    break;
                }
                tokio::time::sleep((target - now).to_std().unwrap_or(Duration::ZERO)).await;
            }

            let today = Local::now().date_naive();
            let report = run_reset(&state, today).await;
            info!(
                day = %format_day(today),
                cleared = report.cleared,
                archived = report.archived,
                failed = report.failed,
                "daily reset complete"
            );
        }
    })
}

// =============================================================================
// SWEEP
// =============================================================================

/// Archive every non-empty room under `day` and clear the store.
pub async fn run_reset(state: &AppState, day: NaiveDate) -> ResetReport {
    // PHASE: DRAIN
    // WHY: one write lock makes the clear atomic for every connection;
    // membership carries over into the emptied rooms.
    let drained = state
        .rooms
        .reset(|room_id| {
            Frame::event("room-reset", Data::new())
                .with_room_id(room_id)
                .with_data("date", format_day(day))
        })
        .await;

    let archived_at = Utc::now();
    let records: Vec<ArchiveRecord> = drained
        .iter()
        .filter_map(|(room_id, room)| archive_record(room_id, day, room, archived_at))
        .collect();

    // PHASE: ARCHIVE
    // WHY: upserts are independent; one slow or failing room must not hold
    // back the others.
    let results = join_all(records.iter().map(|record| async move {
        let result = state.archive.upsert(record).await;
        (record, result)
    }))
    .await;

    let mut report = ResetReport { cleared: drained.len(), ..ResetReport::default() };
    for (record, result) in results {
        match result {
            Ok(()) => {
                report.archived += 1;
                info!(
                    room_id = %record.room_id,
                    day = %format_day(record.day),
                    items = record.items.len(),
                    "room archived"
                );
            }
            Err(e) => {
                report.failed += 1;
                error!(
                    error = %e,
                    room_id = %record.room_id,
                    day = %format_day(record.day),
                    "room archive failed; history for this day is lost"
                );
            }
        }
    }
    report
}

/// Snapshot a room for the archive. Rooms without items are not archived.
fn archive_record(room_id: &str, day: NaiveDate, room: &RoomState, archived_at: DateTime<Utc>) -> Option<ArchiveRecord> {
    if room.items.is_empty() {
        return None;
    }
    Some(ArchiveRecord {
        room_id: room_id.to_owned(),
        day,
        background: room.background.clone(),
        items: room.items.clone(),
        archived_at,
    })
}

#[cfg(test)]
#[path = "reset_test.rs"]
mod tests;
