//! Canvas items — the objects placed on a room's canvas.
//!
//! DESIGN
//! ======
//! On the wire an item is `{id, type, position, zIndex, rotation, data}` with
//! a `data` payload whose shape depends on `type`. Decoding goes through
//! `RawItem` and dispatches on `type`, so a malformed payload is rejected at
//! ingress instead of being stored and echoed to peers.

use serde::{Deserialize, Serialize};

use crate::frame::ErrorCode;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("item payload missing")]
    Missing,
    #[error("invalid item: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("item id must not be empty")]
    EmptyId,
    #[error("{kind} item requires a non-empty {field}")]
    EmptyField { kind: ItemKind, field: &'static str },
    #[error("item {field} must be a finite number")]
    NonFinite { field: &'static str },
}

impl ErrorCode for ItemError {
    fn error_code(&self) -> &'static str {
        "E_INVALID_ITEM"
    }
}

// =============================================================================
// KINDS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Photo,
    Note,
    Audio,
    #[serde(alias = "spotify")]
    Media,
    Doodle,
    Gif,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Photo => "photo",
            Self::Note => "note",
            Self::Audio => "audio",
            Self::Media => "media",
            Self::Doodle => "doodle",
            Self::Gif => "gif",
        };
        f.write_str(name)
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoData {
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_taken: Option<String>,
    /// Client keys beyond the typed ones, kept as received.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteData {
    pub color: String,
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioData {
    pub audio_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waveform_color: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaData {
    pub embed_url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoodleData {
    /// SVG path data for the strokes.
    pub path_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GifData {
    pub gif_url: String,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub is_sticker: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Typed item payload, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemContent {
    Photo(PhotoData),
    Note(NoteData),
    Audio(AudioData),
    Media(MediaData),
    Doodle(DoodleData),
    Gif(GifData),
}

impl ItemContent {
    #[must_use]
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Photo(_) => ItemKind::Photo,
            Self::Note(_) => ItemKind::Note,
            Self::Audio(_) => ItemKind::Audio,
            Self::Media(_) => ItemKind::Media,
            Self::Doodle(_) => ItemKind::Doodle,
            Self::Gif(_) => ItemKind::Gif,
        }
    }

    fn decode(kind: ItemKind, data: serde_json::Value) -> Result<Self, ItemError> {
        let content = match kind {
            ItemKind::Photo => Self::Photo(serde_json::from_value(data)?),
            ItemKind::Note => Self::Note(serde_json::from_value(data)?),
            ItemKind::Audio => Self::Audio(serde_json::from_value(data)?),
            ItemKind::Media => Self::Media(serde_json::from_value(data)?),
            ItemKind::Doodle => Self::Doodle(serde_json::from_value(data)?),
            ItemKind::Gif => Self::Gif(serde_json::from_value(data)?),
        };
        content.validate()?;
        Ok(content)
    }

    fn encode(&self) -> serde_json::Value {
        let value = match self {
            Self::Photo(d) => serde_json::to_value(d),
            Self::Note(d) => serde_json::to_value(d),
            Self::Audio(d) => serde_json::to_value(d),
            Self::Media(d) => serde_json::to_value(d),
            Self::Doodle(d) => serde_json::to_value(d),
            Self::Gif(d) => serde_json::to_value(d),
        };
        // Plain structs and JSON maps always serialize.
        value.unwrap_or_default()
    }

    fn validate(&self) -> Result<(), ItemError> {
        let kind = self.kind();
        let (field, value) = match self {
            Self::Photo(d) => ("imageUrl", d.image_url.as_str()),
            Self::Note(d) => ("color", d.color.as_str()),
            Self::Audio(d) => ("audioUrl", d.audio_url.as_str()),
            Self::Media(d) => ("embedUrl", d.embed_url.as_str()),
            Self::Doodle(d) => ("pathData", d.path_data.as_str()),
            Self::Gif(d) => ("gifUrl", d.gif_url.as_str()),
        };
        if value.trim().is_empty() {
            return Err(ItemError::EmptyField { kind, field });
        }
        match self {
            Self::Gif(d) if !d.scale.is_finite() => Err(ItemError::NonFinite { field: "scale" }),
            Self::Doodle(DoodleData { stroke_width: Some(w), .. }) if !w.is_finite() => {
                Err(ItemError::NonFinite { field: "strokeWidth" })
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// CANVAS ITEM
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One object on a room canvas. `id` is unique within its room only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawItem", into = "RawItem")]
pub struct CanvasItem {
    pub id: String,
    pub position: Position,
    /// Stacking order; ties are broken by position in the room's item list.
    pub z_index: f64,
    /// Degrees.
    pub rotation: f64,
    pub content: ItemContent,
}

impl CanvasItem {
    #[must_use]
    pub fn kind(&self) -> ItemKind {
        self.content.kind()
    }

    /// Decode and validate an item from a frame payload value.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError`] if the value is absent, has an unknown `type`, or
    /// its `data` does not match the shape required by its `type`.
    pub fn from_payload(value: Option<&serde_json::Value>) -> Result<Self, ItemError> {
        let value = value.ok_or(ItemError::Missing)?;
        let raw: RawItem = serde_json::from_value(value.clone())?;
        Self::try_from(raw)
    }

    /// Decode and validate a list of items (used by canvas sync).
    ///
    /// # Errors
    ///
    /// Returns the first item's [`ItemError`] if any entry is invalid.
    pub fn list_from_payload(value: Option<&serde_json::Value>) -> Result<Vec<Self>, ItemError> {
        let value = value.ok_or(ItemError::Missing)?;
        let raws: Vec<RawItem> = serde_json::from_value(value.clone())?;
        raws.into_iter().map(Self::try_from).collect()
    }
}

/// Wire shape of a canvas item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    id: String,
    #[serde(rename = "type")]
    kind: ItemKind,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    z_index: f64,
    #[serde(default)]
    rotation: f64,
    #[serde(default)]
    data: serde_json::Value,
}

impl TryFrom<RawItem> for CanvasItem {
    type Error = ItemError;

    fn try_from(raw: RawItem) -> Result<Self, Self::Error> {
        if raw.id.trim().is_empty() {
            return Err(ItemError::EmptyId);
        }
        for (field, value) in [
            ("position.x", raw.position.x),
            ("position.y", raw.position.y),
            ("zIndex", raw.z_index),
            ("rotation", raw.rotation),
        ] {
            if !value.is_finite() {
                return Err(ItemError::NonFinite { field });
            }
        }
        let content = ItemContent::decode(raw.kind, raw.data)?;
        Ok(Self { id: raw.id, position: raw.position, z_index: raw.z_index, rotation: raw.rotation, content })
    }
}

impl From<CanvasItem> for RawItem {
    fn from(item: CanvasItem) -> Self {
        Self {
            id: item.id,
            kind: item.content.kind(),
            position: item.position,
            z_index: item.z_index,
            rotation: item.rotation,
            data: item.content.encode(),
        }
    }
}

#[cfg(test)]
#[path = "item_test.rs"]
mod tests;
