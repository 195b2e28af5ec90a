//! Dependency availability flags.
//!
//! # States
//! - Available: calls that need the dependency are attempted
//! - Unavailable: writes are queued, reads fail fast
//!
//! # State Transitions
//! ```text
//! Available → Unavailable: consecutive failed probes >= unhealthy_threshold
//! Unavailable → Available: consecutive successful probes >= healthy_threshold
//! ```
//!
//! # Design Decisions
//! - One `watch` channel per dependency; the prober owns the only publisher
//!   and everyone else holds cloneable readers
//! - Flags start available so a fresh gateway serves traffic before the
//!   first probe completes
//! - Hysteresis prevents flapping; counters reset on the opposite outcome

use serde::Serialize;
use tokio::sync::watch;

use crate::observability::metrics;

/// Something the gateway needs in order to serve a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    Backend,
    Store,
}

impl Dependency {
    pub const ALL: [Dependency; 2] = [Dependency::Backend, Dependency::Store];

    pub fn as_str(self) -> &'static str {
        match self {
            Dependency::Backend => "backend",
            Dependency::Store => "store",
        }
    }
}

/// Create the flag set. Both flags start `true`.
pub fn channel() -> (AvailabilityPublisher, Availability) {
    let (backend_tx, backend_rx) = watch::channel(true);
    let (store_tx, store_rx) = watch::channel(true);
    (
        AvailabilityPublisher {
            backend: backend_tx,
            store: store_tx,
        },
        Availability {
            backend: backend_rx,
            store: store_rx,
        },
    )
}

/// Write side of the flags. Deliberately not `Clone`.
#[derive(Debug)]
pub struct AvailabilityPublisher {
    backend: watch::Sender<bool>,
    store: watch::Sender<bool>,
}

impl AvailabilityPublisher {
    fn sender(&self, dependency: Dependency) -> &watch::Sender<bool> {
        match dependency {
            Dependency::Backend => &self.backend,
            Dependency::Store => &self.store,
        }
    }

    /// Set a flag. Returns whether the value changed.
    pub fn set(&self, dependency: Dependency, available: bool) -> bool {
        let changed = self.sender(dependency).send_if_modified(|current| {
            if *current != available {
                *current = available;
                true
            } else {
                false
            }
        });

        if changed {
            if available {
                tracing::info!(dependency = dependency.as_str(), "Dependency available");
            } else {
                tracing::warn!(dependency = dependency.as_str(), "Dependency unavailable");
            }
            metrics::record_dependency_available(dependency.as_str(), available);
        }
        changed
    }

    pub fn is_available(&self, dependency: Dependency) -> bool {
        *self.sender(dependency).borrow()
    }

    pub fn all_available(&self) -> bool {
        Dependency::ALL.iter().all(|d| self.is_available(*d))
    }
}

/// Read side of the flags.
#[derive(Debug, Clone)]
pub struct Availability {
    backend: watch::Receiver<bool>,
    store: watch::Receiver<bool>,
}

impl Availability {
    fn receiver(&self, dependency: Dependency) -> &watch::Receiver<bool> {
        match dependency {
            Dependency::Backend => &self.backend,
            Dependency::Store => &self.store,
        }
    }

    pub fn is_available(&self, dependency: Dependency) -> bool {
        *self.receiver(dependency).borrow()
    }

    pub fn all_available(&self) -> bool {
        self.first_unavailable().is_none()
    }

    /// The first dependency currently marked down, if any.
    pub fn first_unavailable(&self) -> Option<Dependency> {
        Dependency::ALL
            .into_iter()
            .find(|d| !self.is_available(*d))
    }

    /// A fresh receiver for one flag.
    pub fn subscribe(&self, dependency: Dependency) -> watch::Receiver<bool> {
        self.receiver(dependency).clone()
    }
}

/// Consecutive-outcome counter for one flag.
#[derive(Debug, Default, Clone)]
pub struct Hysteresis {
    consecutive_successes: u32,
    consecutive_failures: u32,
}

impl Hysteresis {
    /// Feed one probe outcome. Returns the value the flag should take, or
    /// `None` when it should stay as it is.
    pub fn observe(
        &mut self,
        currently_available: bool,
        success: bool,
        healthy_threshold: u32,
        unhealthy_threshold: u32,
    ) -> Option<bool> {
        if success {
            self.consecutive_failures = 0;
            if currently_available {
                return None;
            }
            self.consecutive_successes += 1;
            if self.consecutive_successes >= healthy_threshold.max(1) {
                self.consecutive_successes = 0;
                return Some(true);
            }
        } else {
            self.consecutive_successes = 0;
            if !currently_available {
                return None;
            }
            self.consecutive_failures += 1;
            if self.consecutive_failures >= unhealthy_threshold.max(1) {
                self.consecutive_failures = 0;
                return Some(false);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_start_available() {
        let (publisher, availability) = channel();
        assert!(publisher.all_available());
        assert!(availability.all_available());
        assert_eq!(availability.first_unavailable(), None);
    }

    #[test]
    fn test_readers_see_published_changes() {
        let (publisher, availability) = channel();
        let reader = availability.clone();

        assert!(publisher.set(Dependency::Store, false));
        assert!(!publisher.set(Dependency::Store, false));

        assert!(!reader.is_available(Dependency::Store));
        assert!(reader.is_available(Dependency::Backend));
        assert_eq!(reader.first_unavailable(), Some(Dependency::Store));
    }

    #[test]
    fn test_single_outcome_flips_with_default_thresholds() {
        let mut h = Hysteresis::default();
        assert_eq!(h.observe(true, false, 1, 1), Some(false));
        assert_eq!(h.observe(false, true, 1, 1), Some(true));
        assert_eq!(h.observe(true, true, 1, 1), None);
    }

    #[test]
    fn test_thresholds_require_consecutive_outcomes() {
        let mut h = Hysteresis::default();
        assert_eq!(h.observe(true, false, 2, 3), None);
        assert_eq!(h.observe(true, false, 2, 3), None);
        // A success in between resets the failure streak.
        assert_eq!(h.observe(true, true, 2, 3), None);
        assert_eq!(h.observe(true, false, 2, 3), None);
        assert_eq!(h.observe(true, false, 2, 3), None);
        assert_eq!(h.observe(true, false, 2, 3), Some(false));

        assert_eq!(h.observe(false, true, 2, 3), None);
        assert_eq!(h.observe(false, true, 2, 3), Some(true));
    }
}
