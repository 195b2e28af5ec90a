//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Logging/metrics → Subsystems → Listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Background tasks exit → Server drains
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Every long-running task owns a broadcast receiver

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{init_observability, run_backend, run_gateway, StartupError};
