//! # Narrator Common Library
//!
//! Shared code for the narrator workspace including:
//! - Error type shared by all crates
//! - Event types (NarrationEvent enum) and the EventBus
//! - Configuration file discovery and TOML loading
//! - Report wire types consumed by the player
//! - Human-readable time formatting and SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod report;
pub mod sse;

pub use error::{Error, Result};
