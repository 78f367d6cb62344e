//! History service — per-day room snapshots and the queries over them.
//!
//! DESIGN
//! ======
//! The archive holds at most one record per `(room_id, day)`. Records are
//! written only by the reset sweep, through an insert-or-replace upsert, so
//! re-running a sweep on the same day overwrites instead of duplicating.
//!
//! `HistoryArchive` is the storage seam: Postgres in production, an
//! in-process map when no database is configured and in tests.
//!
//! ERROR HANDLING
//! ==============
//! Query helpers never fail outward. Unparseable dates and missing records
//! both produce the same `success: false` payload; storage failures produce
//! a distinct message and are logged with room/date context.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::warn;

use crate::frame::{Data, ErrorCode};
use crate::item::CanvasItem;
use crate::services::room::BackgroundSettings;

/// Calendar-day format used on the wire and in logs.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

const NOT_FOUND_MESSAGE: &str = "No history found for this date";
const DATES_FAILED_MESSAGE: &str = "Failed to load history dates";
const LOAD_FAILED_MESSAGE: &str = "Failed to load history";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("no history for room {room_id} on {day}")]
    NotFound { room_id: String, day: NaiveDate },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored snapshot is unreadable: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl ErrorCode for HistoryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidDate(_) => "E_INVALID_DATE",
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::Database(_) => "E_DATABASE",
            Self::Encoding(_) => "E_ENCODING",
        }
    }
}

/// Snapshot of one room on one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRecord {
    pub room_id: String,
    pub day: NaiveDate,
    pub background: BackgroundSettings,
    pub items: Vec<CanvasItem>,
    pub archived_at: DateTime<Utc>,
}

impl ArchiveRecord {
    /// Items plus background settings, as sent to clients.
    #[must_use]
    pub fn canvas_data(&self) -> Data {
        let mut data = self.background.to_data();
        data.insert("items".into(), serde_json::to_value(&self.items).unwrap_or_default());
        data
    }
}

/// Storage for daily room snapshots.
#[async_trait::async_trait]
pub trait HistoryArchive: Send + Sync {
    /// Insert the record, or replace the one with the same `(room_id, day)`.
    ///
    /// # Errors
    ///
    /// Returns a [`HistoryError`] if the write fails.
    async fn upsert(&self, record: &ArchiveRecord) -> Result<(), HistoryError>;

    /// Fetch the record for `(room_id, day)`, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`HistoryError`] if the read fails or the stored record
    /// cannot be decoded.
    async fn find(&self, room_id: &str, day: NaiveDate) -> Result<Option<ArchiveRecord>, HistoryError>;

    /// Every archived day for `room_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`HistoryError`] if the read fails.
    async fn list_dates(&self, room_id: &str) -> Result<Vec<NaiveDate>, HistoryError>;
}

// =============================================================================
// DATES
// =============================================================================

/// Parse a client-supplied date into a calendar day.
///
/// Accepts `YYYY-MM-DD`, or an RFC 3339 timestamp truncated to its day in
/// local time.
///
/// # Errors
///
/// Returns [`HistoryError::InvalidDate`] for anything else.
pub fn parse_day(input: &str) -> Result<NaiveDate, HistoryError> {
    let trimmed = input.trim();
    if let Ok(day) = NaiveDate::parse_from_str(trimmed, DAY_FORMAT) {
        return Ok(day);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|ts| ts.with_timezone(&Local).date_naive())
        .map_err(|_| HistoryError::InvalidDate(input.to_owned()))
}

#[must_use]
pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

// =============================================================================
// QUERIES
// =============================================================================

/// Look up one day of history and build the `moodboard-history-data` payload.
pub async fn moodboard_history(archive: &dyn HistoryArchive, room_id: &str, date: &str) -> Data {
    let mut data = Data::new();
    data.insert("date".into(), serde_json::json!(date));

    let result = match parse_day(date) {
        Ok(day) => archive
            .find(room_id, day)
            .await
            .and_then(|found| found.ok_or_else(|| HistoryError::NotFound { room_id: room_id.to_owned(), day })),
        Err(e) => Err(e),
    };

    match result {
        Ok(record) => {
            data.insert("success".into(), serde_json::json!(true));
            data.insert("data".into(), serde_json::json!(record.canvas_data()));
        }
        Err(e) => {
            let message = match &e {
                HistoryError::InvalidDate(_) | HistoryError::NotFound { .. } => NOT_FOUND_MESSAGE,
                HistoryError::Database(_) | HistoryError::Encoding(_) => {
                    warn!(error = %e, %room_id, date, "history lookup failed");
                    LOAD_FAILED_MESSAGE
                }
            };
            data.insert("success".into(), serde_json::json!(false));
            data.insert("error".into(), serde_json::json!(message));
        }
    }
    data
}

/// List archived days for a room and build the `history-dates` payload.
pub async fn history_dates(archive: &dyn HistoryArchive, room_id: &str) -> Data {
    let mut data = Data::new();
    data.insert("roomId".into(), serde_json::json!(room_id));

    match archive.list_dates(room_id).await {
        Ok(days) => {
            let mut dates: Vec<String> = days.into_iter().map(format_day).collect();
            dates.dedup();
            data.insert("success".into(), serde_json::json!(true));
            data.insert("dates".into(), serde_json::json!(dates));
        }
        Err(e) => {
            warn!(error = %e, %room_id, "history date listing failed");
            data.insert("success".into(), serde_json::json!(false));
            data.insert("error".into(), serde_json::json!(DATES_FAILED_MESSAGE));
        }
    }
    data
}

// =============================================================================
// IN-PROCESS ARCHIVE
// =============================================================================

/// Archive kept in process memory. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryHistoryArchive {
    records: Mutex<BTreeMap<(String, NaiveDate), ArchiveRecord>>,
}

impl MemoryHistoryArchive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored records across all rooms.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl HistoryArchive for MemoryHistoryArchive {
    async fn upsert(&self, record: &ArchiveRecord) -> Result<(), HistoryError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert((record.room_id.clone(), record.day), record.clone());
        Ok(())
    }

    async fn find(&self, room_id: &str, day: NaiveDate) -> Result<Option<ArchiveRecord>, HistoryError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(&(room_id.to_owned(), day)).cloned())
    }

    async fn list_dates(&self, room_id: &str) -> Result<Vec<NaiveDate>, HistoryError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .keys()
            .filter(|(id, _)| id == room_id)
            .map(|(_, day)| *day)
            .rev()
            .collect())
    }
}

// =============================================================================
// POSTGRES ARCHIVE
// =============================================================================

/// Archive backed by the `room_history` table.
#[derive(Clone)]
pub struct PgHistoryArchive {
    pool: PgPool,
}

impl PgHistoryArchive {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl HistoryArchive for PgHistoryArchive {
    async fn upsert(&self, record: &ArchiveRecord) -> Result<(), HistoryError> {
        let items = serde_json::to_value(&record.items)?;
        sqlx::query(
            "INSERT INTO room_history \
                 (room_id, day, background_image, background_color, show_grid, canvas_scrollable, canvas_scale, items, archived_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (room_id, day) DO UPDATE SET \
                 background_image = EXCLUDED.background_image, background_color = EXCLUDED.background_color, \
                 show_grid = EXCLUDED.show_grid, canvas_scrollable = EXCLUDED.canvas_scrollable, \
                 canvas_scale = EXCLUDED.canvas_scale, items = EXCLUDED.items, archived_at = EXCLUDED.archived_at",
        )
        .bind(&record.room_id)
        .bind(record.day)
        .bind(&record.background.background_image)
        .bind(&record.background.background_color)
        .bind(record.background.show_grid)
        .bind(record.background.canvas_scrollable)
        .bind(record.background.canvas_scale)
        .bind(&items)
        .bind(record.archived_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, room_id: &str, day: NaiveDate) -> Result<Option<ArchiveRecord>, HistoryError> {
        let row = sqlx::query_as::<
            _,
            (Option<String>, Option<String>, bool, bool, f64, serde_json::Value, DateTime<Utc>),
        >(
            "SELECT background_image, background_color, show_grid, canvas_scrollable, canvas_scale, items, archived_at \
             FROM room_history WHERE room_id = $1 AND day = $2",
        )
        .bind(room_id)
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;

        let Some((background_image, background_color, show_grid, canvas_scrollable, canvas_scale, items, archived_at)) =
            row
        else {
            return Ok(None);
        };

        Ok(Some(ArchiveRecord {
            room_id: room_id.to_owned(),
            day,
            background: BackgroundSettings {
                background_image,
                background_color,
                show_grid,
                canvas_scrollable,
                canvas_scale,
            },
            items: serde_json::from_value(items)?,
            archived_at,
        }))
    }

    async fn list_dates(&self, room_id: &str) -> Result<Vec<NaiveDate>, HistoryError> {
        let days = sqlx::query_scalar::<_, NaiveDate>("SELECT day FROM room_history WHERE room_id = $1 ORDER BY day DESC")
            .bind(room_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(days)
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
