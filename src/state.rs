//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! handed to the background schedulers. It holds the live room registry and
//! the history archive. Both are constructed once per process; tests build
//! an isolated instance each.

use std::sync::Arc;

use crate::config::Config;
use crate::services::history::HistoryArchive;
use crate::services::room::RoomStore;

/// Shared application state. Clone is required by Axum; clones share the
/// same rooms and archive.
#[derive(Clone)]
pub struct AppState {
    pub rooms: RoomStore,
    pub archive: Arc<dyn HistoryArchive>,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(archive: Arc<dyn HistoryArchive>, config: Config) -> Self {
        Self { rooms: RoomStore::new(), archive, config: Arc::new(config) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::collections::HashSet;

    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::item::{CanvasItem, ItemContent, NoteData, PhotoData, Position};
    use crate::services::history::{ArchiveRecord, HistoryError, MemoryHistoryArchive};
    use crate::services::room::BackgroundSettings;

    /// Create a test `AppState` backed by an in-process archive.
    #[must_use]
    pub fn test_app_state() -> AppState {
        AppState::new(Arc::new(MemoryHistoryArchive::new()), Config::default())
    }

    /// Create a test `AppState` around a specific archive.
    #[must_use]
    pub fn test_app_state_with_archive(archive: Arc<dyn HistoryArchive>) -> AppState {
        AppState::new(archive, Config::default())
    }

    /// A photo item with the given id.
    #[must_use]
    pub fn dummy_item(id: &str) -> CanvasItem {
        CanvasItem {
            id: id.into(),
            position: Position { x: 100.0, y: 200.0 },
            z_index: 1.0,
            rotation: 0.0,
            content: ItemContent::Photo(PhotoData {
                image_url: format!("https://img.example/{id}.jpg"),
                date_taken: Some("2024-01-01".into()),
                extra: serde_json::Map::new(),
            }),
        }
    }

    /// A note item with the given id and text.
    #[must_use]
    pub fn note_item(id: &str, text: &str) -> CanvasItem {
        CanvasItem {
            id: id.into(),
            position: Position { x: 10.0, y: 10.0 },
            z_index: 2.0,
            rotation: 5.0,
            content: ItemContent::Note(NoteData {
                color: "#FFEB3B".into(),
                text: text.into(),
                extra: serde_json::Map::new(),
            }),
        }
    }

    /// An archive record with default background settings.
    #[must_use]
    pub fn record_for(room_id: &str, day: NaiveDate, items: Vec<CanvasItem>) -> ArchiveRecord {
        ArchiveRecord {
            room_id: room_id.into(),
            day,
            background: BackgroundSettings::default(),
            items,
            archived_at: Utc::now(),
        }
    }

    /// Archive whose every operation fails for the listed rooms and delegates
    /// to an in-process archive for all others.
    pub struct FailingArchive {
        failing: HashSet<String>,
        pub inner: MemoryHistoryArchive,
    }

    impl FailingArchive {
        pub fn new<'a>(rooms: impl IntoIterator<Item = &'a str>) -> Self {
            Self { failing: rooms.into_iter().map(String::from).collect(), inner: MemoryHistoryArchive::new() }
        }

        fn check(&self, room_id: &str) -> Result<(), HistoryError> {
            if self.failing.contains(room_id) {
                return Err(HistoryError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl HistoryArchive for FailingArchive {
        async fn upsert(&self, record: &ArchiveRecord) -> Result<(), HistoryError> {
            self.check(&record.room_id)?;
            self.inner.upsert(record).await
        }

        async fn find(&self, room_id: &str, day: NaiveDate) -> Result<Option<ArchiveRecord>, HistoryError> {
            self.check(room_id)?;
            self.inner.find(room_id, day).await
        }

        async fn list_dates(&self, room_id: &str) -> Result<Vec<NaiveDate>, HistoryError> {
            self.check(room_id)?;
            self.inner.list_dates(room_id).await
        }
    }
}
