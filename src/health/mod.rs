//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe the backend (ping reports the store too)
//!     → Update state.rs flags
//!     → All flags true: fire the queue drain signal
//!
//! Flags (state.rs):
//!     Available ←→ Unavailable per dependency
//!     With thresholds to prevent flapping
//! ```
//!
//! # Design Decisions
//! - The prober is the single writer of the flags
//! - State transitions require consecutive successes/failures
//! - Readers never block the prober; they read the latest published value

pub mod active;
pub mod state;

pub use active::{BackendProbe, HealthProber, Probe};
pub use state::{Availability, AvailabilityPublisher, Dependency};
