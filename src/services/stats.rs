//! Stats service — periodic occupancy summary of the live rooms.
//!
//! DESIGN
//! ======
//! The reporter only reads the store, through `RoomStore::snapshot`, which
//! holds the read lock just long enough to copy counts. It runs as its own
//! task on a fixed interval; nothing in it can fail, and a slow tick never
//! delays websocket handling.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::services::room::{RoomStore, RoomSummary};
use crate::state::AppState;

/// Occupancy of a single room with items or users.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetail {
    pub room_id: String,
    pub item_count: usize,
    pub user_count: usize,
    pub hours_idle: f64,
}

/// Store-wide occupancy summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    pub total_rooms: usize,
    /// Rooms with at least one connected user.
    pub active_rooms: usize,
    pub total_users: usize,
    pub total_items: usize,
    /// Rooms with nonzero items or users, by room id.
    pub rooms: Vec<RoomDetail>,
}

impl RoomStats {
    /// Summarize room snapshots as of `now`.
    #[must_use]
    pub fn from_summaries(summaries: &[RoomSummary], now: DateTime<Utc>) -> Self {
        let mut stats = Self { total_rooms: summaries.len(), ..Self::default() };
        for room in summaries {
            stats.total_users += room.user_count;
            stats.total_items += room.item_count;
            if room.user_count > 0 {
                stats.active_rooms += 1;
            }
            if room.user_count > 0 || room.item_count > 0 {
                stats.rooms.push(RoomDetail {
                    room_id: room.room_id.clone(),
                    item_count: room.item_count,
                    user_count: room.user_count,
                    hours_idle: hours_between(room.last_active, now),
                });
            }
        }
        stats
    }
}

/// Current occupancy of `store`.
pub async fn collect(store: &RoomStore) -> RoomStats {
    RoomStats::from_summaries(&store.snapshot().await, Utc::now())
}

/// Whole hours plus one decimal. Clock skew never yields a negative value.
#[allow(clippy::cast_precision_loss)]
fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let secs = (to - from).num_seconds().max(0);
    (secs as f64 / 360.0).round() / 10.0
}

/// Spawn the periodic stats reporter. Returns a handle for shutdown.
pub fn spawn_stats_reporter(state: AppState) -> JoinHandle<()> {
    let period = state.config.stats_interval;
    info!(interval_secs = period.as_secs(), "stats reporter configured");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; report one full period in.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let stats = collect(&state.rooms).await;
            info!(
                total_rooms = stats.total_rooms,
                active_rooms = stats.active_rooms,
                total_users = stats.total_users,
                total_items = stats.total_items,
                "room stats"
            );
            for room in &stats.rooms {
                info!(
                    room_id = %room.room_id,
                    items = room.item_count,
                    users = room.user_count,
                    hours_idle = room.hours_idle,
                    "room detail"
                );
            }
        }
    })
}

#[cfg(test)]
#[path = "stats_test.rs"]
mod tests;
