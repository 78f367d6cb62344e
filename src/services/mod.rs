//! Domain services used by the websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own room state, archival and the background schedulers,
//! so route handlers stay focused on protocol translation.

pub mod history;
pub mod reset;
pub mod room;
pub mod stats;
