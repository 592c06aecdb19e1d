//! HTTP API module.
//!
//! Process endpoints, the upload validation endpoint and the SSE progress
//! stream.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server, AppState};
pub use types::*;
