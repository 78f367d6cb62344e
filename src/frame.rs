//! Frame — the envelope for every real-time room event.
//!
//! ARCHITECTURE
//! ============
//! Clients send request frames over WebSocket, the connection handler
//! dispatches on `event`, and the server answers with event frames. Replies
//! meant only for the requester carry `parent_id`; broadcasts to room peers
//! do not.
//!
//! DESIGN
//! ======
//! - Flat envelope, payload in `data` (`Map<String, Value>`).
//! - Event names are the public contract (`join-room`, `room-state`, ...).
//! - Clients may omit `id`, `ts`, `status` and `data`; defaults are filled on
//!   decode so hand-written client frames stay small.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Frame data key for error messages.
pub const FRAME_MESSAGE: &str = "message";

/// Frame data key for grepable error codes.
pub const FRAME_CODE: &str = "code";

/// Frame data key for a room identifier carried in the payload.
pub const FRAME_ROOM_ID: &str = "roomId";

/// Event name for protocol-level errors sent to a single connection.
pub const ERROR_EVENT: &str = "error";

// =============================================================================
// TYPES
// =============================================================================

/// Flat key-value payload. Alias to reduce noise in signatures.
pub type Data = HashMap<String, serde_json::Value>;

/// Direction/lifecycle of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Client to server.
    #[default]
    Request,
    /// Server to client: replies and broadcasts.
    Event,
    /// Server to client: the request could not be processed.
    Error,
}

/// The envelope for every real-time message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    #[serde(default = "now_ms")]
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    pub event: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub data: Data,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code for structured error frames.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Frame {
    /// Create a request frame, as a client would send it.
    pub fn request(event: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            ts: now_ms(),
            room_id: None,
            event: event.into(),
            status: Status::Request,
            data,
        }
    }

    /// Create a server-originated event frame (broadcasts, pushes).
    pub fn event(event: impl Into<String>, data: Data) -> Self {
        Self { status: Status::Event, ..Self::request(event, data) }
    }

    /// Create an event addressed back to the sender of `self`.
    #[must_use]
    pub fn reply(&self, event: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            ts: now_ms(),
            room_id: self.room_id.clone(),
            event: event.into(),
            status: Status::Event,
            data,
        }
    }

    /// Create an error frame that answers no particular request, such as a
    /// reply to input that could not be parsed as a frame at all.
    #[must_use]
    pub fn protocol_error(code: &str, message: impl Into<String>) -> Self {
        let mut data = Data::new();
        data.insert(FRAME_CODE.into(), serde_json::Value::String(code.to_owned()));
        data.insert(FRAME_MESSAGE.into(), serde_json::Value::String(message.into()));
        Self { status: Status::Error, ..Self::event(ERROR_EVENT, data) }
    }

    /// Create a structured error response from a typed error.
    #[must_use]
    pub fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        Self {
            parent_id: Some(self.id),
            room_id: self.room_id.clone(),
            ..Self::protocol_error(err.error_code(), err.to_string())
        }
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Frame {
    #[must_use]
    pub fn with_room_id(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// ACCESSORS
// =============================================================================

impl Frame {
    /// Room targeted by this frame: the envelope field, else `data.roomId`.
    #[must_use]
    pub fn target_room(&self) -> Option<&str> {
        self.room_id
            .as_deref()
            .or_else(|| self.data.get(FRAME_ROOM_ID).and_then(|v| v.as_str()))
            .filter(|id| !id.is_empty())
    }

    /// String field from `data`.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
