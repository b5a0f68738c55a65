//! Types shared between the minefield server and its clients.
//!
//! `models` holds the plain data a client renders (positions, cell views,
//! modes, levels, record entries); `protocol` holds the WebSocket messages.

pub mod models;
pub mod protocol;
