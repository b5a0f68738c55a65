//! Single-player minesweeper with classic and challenge modes.
//!
//! The engine lives in [`data`], [`logic`] and [`records`] and is plain
//! synchronous code: [`logic::session::GameSession`] plays one board,
//! [`logic::challenge::ChallengeController`] escalates challenge runs,
//! [`logic::clock::Clock`] counts seconds and [`records::RecordBook`] keeps
//! the best scores. [`logic::Game`] and [`routes`] host sessions over
//! HTTP and WebSocket with a one-second tokio timer per round.

pub mod cleanup;
pub mod cors;
pub mod data;
pub mod error;
pub mod logic;
pub mod records;
pub mod routes;
