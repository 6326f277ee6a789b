//! Session Orchestrator and Batch Coordinator
//!
//! Bridges persisted profiles to live browser engine sessions: launch and
//! supervise engine processes, track which profile runs where, drive the
//! profile status machine, and fan batch start/stop operations out with
//! bounded parallelism.

mod batch;
mod engine;
mod orchestrator;
mod process;

pub use batch::{BatchCoordinator, BatchEvent, BatchOp, BatchSummary, CancelHandle};
pub use engine::{BrowserEngine, EngineError, EngineSession, LaunchConfig};
pub use orchestrator::{SessionError, SessionOrchestrator};
pub use process::ProcessEngine;
