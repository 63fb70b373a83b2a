//! Shared state and messaging between the control surface and the pipeline
//!
//! Commands arrive as text lines from the control surface; the coordinator
//! keeps a runtime snapshot the `status` command reports.

pub mod messages;
pub mod state;

pub use messages::ControlCommand;
pub use state::{RuntimeState, SharedAppState};
