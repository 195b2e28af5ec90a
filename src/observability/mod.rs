//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for production)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the gateway's HTTP layers
//! - Metric updates are fire-and-forget; without an installed recorder they
//!   are no-ops, so tests need no setup

pub mod logging;
pub mod metrics;
