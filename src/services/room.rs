//! Room service — live room registry, membership, and canvas mutations.
//!
//! DESIGN
//! ======
//! `RoomStore` owns every live room behind one `RwLock`. Rooms are created
//! lazily on first reference and only removed by the daily reset sweep;
//! an empty member set never evicts a room. The sweep empties every canvas
//! but keeps each room's members, since connections stay subscribed to the
//! room they joined.
//!
//! Each mutation applies its change and fans the resulting event out to the
//! other members while still holding the write lock. Two events for the same
//! room are therefore applied and delivered in the order they acquired the
//! lock, and no peer can observe a state change without its event.
//!
//! Broadcasts are best effort: a member whose outbound queue is full or
//! closed misses the event. There is no replay.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::frame::{Data, Frame};
use crate::item::CanvasItem;

pub const DEFAULT_SHOW_GRID: bool = true;
pub const DEFAULT_CANVAS_SCROLLABLE: bool = false;
pub const DEFAULT_CANVAS_SCALE: f64 = 3.0;

// =============================================================================
// BACKGROUND SETTINGS
// =============================================================================

/// Canvas-wide settings of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundSettings {
    pub background_image: Option<String>,
    pub background_color: Option<String>,
    pub show_grid: bool,
    pub canvas_scrollable: bool,
    pub canvas_scale: f64,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            background_image: None,
            background_color: None,
            show_grid: DEFAULT_SHOW_GRID,
            canvas_scrollable: DEFAULT_CANVAS_SCROLLABLE,
            canvas_scale: DEFAULT_CANVAS_SCALE,
        }
    }
}

/// Partial settings update. Absent fields are left untouched; an explicit
/// `null` clears a string field and restores the default of a flag or scale.
/// Nulls are kept so the echo matches what the client sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundPatch {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub background_image: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub show_grid: Option<Option<bool>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub canvas_scrollable: Option<Option<bool>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub canvas_scale: Option<Option<f64>>,
}

/// Distinguish a present-but-null field from an absent one.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl BackgroundPatch {
    /// Decode a patch from a frame payload. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if a known key carries a value of the wrong type.
    pub fn from_data(data: &Data) -> Result<Self, serde_json::Error> {
        let object: serde_json::Map<String, serde_json::Value> =
            data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Self::from_value(serde_json::Value::Object(object))
    }

    /// Decode a patch from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the value is not an object or a known key has
    /// the wrong type.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let patch: Self = serde_json::from_value(value)?;
        if patch.canvas_scale.flatten().is_some_and(|s| !s.is_finite()) {
            return Err(serde::de::Error::custom("canvasScale must be a finite number"));
        }
        Ok(patch)
    }

    /// The patch as a flat payload, containing only the fields it carries.
    #[must_use]
    pub fn to_data(&self) -> Data {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => Data::new(),
        }
    }
}

impl BackgroundSettings {
    pub fn apply(&mut self, patch: &BackgroundPatch) {
        if let Some(image) = &patch.background_image {
            self.background_image.clone_from(image);
        }
        if let Some(color) = &patch.background_color {
            self.background_color.clone_from(color);
        }
        if let Some(show_grid) = patch.show_grid {
            self.show_grid = show_grid.unwrap_or(DEFAULT_SHOW_GRID);
        }
        if let Some(scrollable) = patch.canvas_scrollable {
            self.canvas_scrollable = scrollable.unwrap_or(DEFAULT_CANVAS_SCROLLABLE);
        }
        if let Some(scale) = patch.canvas_scale {
            self.canvas_scale = scale.unwrap_or(DEFAULT_CANVAS_SCALE);
        }
    }

    /// Settings as flat payload entries (`backgroundImage`, `showGrid`, ...).
    #[must_use]
    pub fn to_data(&self) -> Data {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => Data::new(),
        }
    }
}

// =============================================================================
// ROOM STATE
// =============================================================================

/// A connection currently joined to a room.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub username: String,
    pub tx: mpsc::Sender<Frame>,
}

/// Live state of one room. Held only in process memory.
#[derive(Debug)]
pub struct RoomState {
    /// Canvas items in insertion order. Ids are unique within the list.
    pub items: Vec<CanvasItem>,
    pub background: BackgroundSettings,
    /// Joined connections keyed by connection id.
    pub members: HashMap<Uuid, RoomMember>,
    /// Last join, leave, or mutation. Never moves backwards.
    pub last_active: DateTime<Utc>,
}

impl RoomState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            background: BackgroundSettings::default(),
            members: HashMap::new(),
            last_active: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active = self.last_active.max(Utc::now());
    }

    /// Replace the item with the same id in place, or append it.
    pub fn upsert_item(&mut self, item: CanvasItem) {
        match self.items.iter_mut().find(|existing| existing.id == item.id) {
            Some(slot) => *slot = item,
            None => self.items.push(item),
        }
    }

    /// Remove every item carrying `item_id`. Returns how many were removed.
    pub fn remove_item(&mut self, item_id: &str) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.id != item_id);
        before - self.items.len()
    }

    /// Replace the whole item list. Later duplicates of an id overwrite
    /// earlier ones in place.
    pub fn replace_items(&mut self, items: Vec<CanvasItem>) {
        self.items.clear();
        for item in items {
            self.upsert_item(item);
        }
    }

    /// Items plus background settings, the shape clients render from.
    #[must_use]
    pub fn canvas_data(&self) -> Data {
        let mut data = self.background.to_data();
        data.insert("items".into(), serde_json::to_value(&self.items).unwrap_or_default());
        data
    }

    /// Send `frame` to every member except `exclude`.
    pub fn broadcast(&self, frame: &Frame, exclude: Option<Uuid>) {
        for (client_id, member) in &self.members {
            if exclude == Some(*client_id) {
                continue;
            }
            // Best-effort: if a client's channel is full or closed, skip it.
            if member.tx.try_send(frame.clone()).is_err() {
                debug!(%client_id, event = %frame.event, "broadcast dropped");
            }
        }
    }
}

impl Default for RoomState {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ROOM STORE
// =============================================================================

/// Read-only summary of one room, safe to hand out while rooms keep changing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub item_count: usize,
    pub user_count: usize,
    pub last_active: DateTime<Utc>,
}

/// Process-local registry of live rooms. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct RoomStore {
    rooms: Arc<RwLock<HashMap<String, RoomState>>>,
}

impl RoomStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the room, creating it with default settings if absent.
    /// Always refreshes `last_active`. The write lock is held for the whole
    /// call, so `f` is atomic with respect to every other room operation.
    pub async fn get_or_create<R>(&self, room_id: &str, f: impl FnOnce(&mut RoomState) -> R) -> R {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(room_id.to_owned()).or_insert_with(|| {
            debug!(%room_id, "room created");
            RoomState::new()
        });
        room.touch();
        f(room)
    }

    /// Run `f` against the room only if it exists.
    pub async fn with_existing<R>(&self, room_id: &str, f: impl FnOnce(&mut RoomState) -> R) -> Option<R> {
        let mut rooms = self.rooms.write().await;
        rooms.get_mut(room_id).map(f)
    }

    /// Take every room's canvas out of the store under one write lock.
    ///
    /// Rooms without members are removed. Rooms with members are replaced by
    /// a fresh default room holding the same members, so broadcasts keep
    /// reaching connections that never re-join; those members are sent the
    /// frame built by `notice`. The returned rooms carry no members.
    pub async fn reset(&self, notice: impl Fn(&str) -> Frame) -> Vec<(String, RoomState)> {
        let mut rooms = self.rooms.write().await;
        let mut drained: Vec<(String, RoomState)> = rooms.drain().collect();
        for (room_id, room) in &mut drained {
            if room.members.is_empty() {
                continue;
            }
            let fresh = RoomState { members: std::mem::take(&mut room.members), ..RoomState::new() };
            fresh.broadcast(&notice(room_id.as_str()), None);
            rooms.insert(room_id.clone(), fresh);
        }
        drained
    }

    /// Summaries of all rooms, sorted by room id.
    pub async fn snapshot(&self) -> Vec<RoomSummary> {
        let rooms = self.rooms.read().await;
        let mut summaries: Vec<RoomSummary> = rooms
            .iter()
            .map(|(room_id, room)| RoomSummary {
                room_id: room_id.clone(),
                item_count: room.items.len(),
                user_count: room.members.len(),
                last_active: room.last_active,
            })
            .collect();
        summaries.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        summaries
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}

// =============================================================================
// JOIN / LEAVE
// =============================================================================

/// Add a connection to a room and announce it to the other members.
/// Returns the room's canvas plus the member count for the joiner.
pub async fn join_room(
    store: &RoomStore,
    room_id: &str,
    client_id: Uuid,
    username: &str,
    tx: mpsc::Sender<Frame>,
) -> Data {
    store
        .get_or_create(room_id, |room| {
            room.members
                .insert(client_id, RoomMember { username: username.to_owned(), tx });

            let joined = Frame::event("user-joined", Data::new())
                .with_room_id(room_id)
                .with_data("id", client_id.to_string())
                .with_data("username", username);
            room.broadcast(&joined, Some(client_id));

            info!(%room_id, %client_id, username, users = room.members.len(), "client joined room");

            let mut state = room.canvas_data();
            state.insert("users".into(), serde_json::json!(room.members.len()));
            state
        })
        .await
}

/// Remove a connection from a room and tell the remaining members. The room
/// itself stays in the store until the next reset, even when empty.
pub async fn leave_room(store: &RoomStore, room_id: &str, client_id: Uuid) {
    let left = store
        .with_existing(room_id, |room| {
            let member = room.members.remove(&client_id)?;
            room.touch();
            let frame = Frame::event("user-left", Data::new())
                .with_room_id(room_id)
                .with_data("connectionId", client_id.to_string());
            room.broadcast(&frame, None);
            Some((member.username, room.members.len()))
        })
        .await
        .flatten();

    if let Some((username, remaining)) = left {
        info!(%room_id, %client_id, %username, remaining, "client left room");
    }
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// Replace the item with the same id in place, or append it.
pub async fn update_item(store: &RoomStore, room_id: &str, sender: Uuid, item: CanvasItem) {
    store
        .get_or_create(room_id, |room| {
            let frame = item_frame("item-updated", room_id, &item);
            debug!(%room_id, item_id = %item.id, kind = %item.kind(), "item updated");
            room.upsert_item(item);
            room.broadcast(&frame, Some(sender));
        })
        .await;
}

/// Append a new item. An id that is already present is replaced in place so
/// ids stay unique within the room.
pub async fn add_item(store: &RoomStore, room_id: &str, sender: Uuid, item: CanvasItem) {
    store
        .get_or_create(room_id, |room| {
            let frame = item_frame("item-added", room_id, &item);
            if room.items.iter().any(|existing| existing.id == item.id) {
                debug!(%room_id, item_id = %item.id, "add-item for existing id; replacing in place");
            }
            room.upsert_item(item);
            room.broadcast(&frame, Some(sender));
        })
        .await;
}

/// Remove every item with `item_id`. Deleting an unknown id is a no-op that
/// is still announced.
pub async fn delete_item(store: &RoomStore, room_id: &str, sender: Uuid, item_id: &str) {
    store
        .get_or_create(room_id, |room| {
            let removed = room.remove_item(item_id);
            debug!(%room_id, item_id, removed, "items deleted");
            let frame = Frame::event("item-deleted", Data::new())
                .with_room_id(room_id)
                .with_data("itemId", item_id);
            room.broadcast(&frame, Some(sender));
        })
        .await;
}

/// Apply a partial settings update and echo exactly the received fields.
pub async fn update_background(store: &RoomStore, room_id: &str, sender: Uuid, patch: &BackgroundPatch) {
    store
        .get_or_create(room_id, |room| {
            room.background.apply(patch);
            let frame = Frame::event("background-updated", patch.to_data()).with_room_id(room_id);
            room.broadcast(&frame, Some(sender));
        })
        .await;
}

/// Replace the item list wholesale, optionally patch the settings, and send
/// peers the resulting merged canvas.
pub async fn sync_canvas(
    store: &RoomStore,
    room_id: &str,
    sender: Uuid,
    items: Vec<CanvasItem>,
    background: Option<&BackgroundPatch>,
) {
    store
        .get_or_create(room_id, |room| {
            room.replace_items(items);
            if let Some(patch) = background {
                room.background.apply(patch);
            }

            let mut data = Data::new();
            data.insert("items".into(), serde_json::to_value(&room.items).unwrap_or_default());
            data.insert("background".into(), serde_json::to_value(&room.background).unwrap_or_default());
            let frame = Frame::event("canvas-synced", data).with_room_id(room_id);
            room.broadcast(&frame, Some(sender));
        })
        .await;
}

fn item_frame(event: &str, room_id: &str, item: &CanvasItem) -> Frame {
    Frame::event(event, Data::new())
        .with_room_id(room_id)
        .with_data("item", serde_json::to_value(item).unwrap_or_default())
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
