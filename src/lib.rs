//! toplog - typed player event log
//!
//! This library records discrete, typed events (player, type, payload,
//! origin server) into SQLite or MySQL without blocking the caller, and
//! answers time-windowed queries over them.

pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod event;
pub mod storage;
pub mod timefmt;
pub mod writer;

pub use config::Config;
pub use engine::EventLog;
pub use error::{Error, Result};
pub use event::{Event, NewEvent, TimeBasis};
