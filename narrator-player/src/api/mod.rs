//! HTTP control API
//!
//! JSON endpoints that drive the playback controller, plus an SSE stream of
//! narration events.

pub mod handlers;
pub mod server;

pub use server::{build_router, run, AppContext};
