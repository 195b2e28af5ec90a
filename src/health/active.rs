//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe the backend (and, through it, the store)
//! - Update the availability flags based on results
//! - Fire the queue drain signal when every dependency is available

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::gateway::ItemBackend;
use crate::health::state::{AvailabilityPublisher, Dependency, Hysteresis};
use crate::resilience::with_timeout;

/// One reachability check.
#[async_trait]
pub trait Probe: Send + Sync {
    /// The dependency marked down when the probe itself times out.
    fn dependency(&self) -> Dependency;

    /// Run the check once, reporting an outcome per dependency observed.
    async fn check(&self) -> Vec<(Dependency, bool)>;
}

/// Pings the backend. A reply marks the backend up and carries the store's
/// reachability; no reply marks the backend down and leaves the store flag
/// alone, since nothing was learned about it.
pub struct BackendProbe {
    backend: Arc<dyn ItemBackend>,
}

impl BackendProbe {
    pub fn new(backend: Arc<dyn ItemBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Probe for BackendProbe {
    fn dependency(&self) -> Dependency {
        Dependency::Backend
    }

    async fn check(&self) -> Vec<(Dependency, bool)> {
        match self.backend.ping().await {
            Ok(health) => vec![
                (Dependency::Backend, true),
                (Dependency::Store, health.store_available),
            ],
            Err(e) => {
                tracing::warn!(error = %e, "Health check failed: backend ping");
                vec![(Dependency::Backend, false)]
            }
        }
    }
}

pub struct HealthProber {
    probes: Vec<Box<dyn Probe>>,
    publisher: AvailabilityPublisher,
    config: HealthCheckConfig,
    trackers: HashMap<Dependency, Hysteresis>,
    drain: Arc<Notify>,
}

impl HealthProber {
    pub fn new(
        probes: Vec<Box<dyn Probe>>,
        publisher: AvailabilityPublisher,
        config: HealthCheckConfig,
        drain: Arc<Notify>,
    ) -> Self {
        Self {
            probes,
            publisher,
            config,
            trackers: HashMap::new(),
            drain,
        }
    }

    /// Probe on every tick until shutdown. With checks disabled the flags
    /// stay as they are and the tick only fires the drain signal.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        if self.config.enabled {
            tracing::info!(
                interval = self.config.interval_secs,
                probes = self.probes.len(),
                "Health prober starting"
            );
        } else {
            tracing::info!("Active health checks disabled");
        }

        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.config.enabled {
                        self.probe_once().await;
                    }
                    if self.publisher.all_available() {
                        self.drain.notify_one();
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run every probe once and apply the outcomes to the flags.
    pub async fn probe_once(&mut self) {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut observations = Vec::new();

        for probe in &self.probes {
            match with_timeout(timeout, probe.check()).await {
                Ok(outcomes) => observations.extend(outcomes),
                Err(e) => {
                    tracing::warn!(
                        dependency = probe.dependency().as_str(),
                        error = %e,
                        "Health check failed: timeout"
                    );
                    observations.push((probe.dependency(), false));
                }
            }
        }

        for (dependency, success) in observations {
            self.observe(dependency, success);
        }
    }

    fn observe(&mut self, dependency: Dependency, success: bool) {
        let current = self.publisher.is_available(dependency);
        let next = self.trackers.entry(dependency).or_default().observe(
            current,
            success,
            self.config.healthy_threshold,
            self.config.unhealthy_threshold,
        );
        if let Some(available) = next {
            self.publisher.set(dependency, available);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::state;
    use crate::gateway::testing::FakeBackend;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Switch {
        dependency: Dependency,
        up: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Probe for Switch {
        fn dependency(&self) -> Dependency {
            self.dependency
        }

        async fn check(&self) -> Vec<(Dependency, bool)> {
            vec![(self.dependency, self.up.load(Ordering::SeqCst))]
        }
    }

    struct Hangs;

    #[async_trait]
    impl Probe for Hangs {
        fn dependency(&self) -> Dependency {
            Dependency::Backend
        }

        async fn check(&self) -> Vec<(Dependency, bool)> {
            std::future::pending().await
        }
    }

    fn config() -> HealthCheckConfig {
        HealthCheckConfig {
            interval_secs: 1,
            ..HealthCheckConfig::default()
        }
    }

    #[tokio::test]
    async fn test_probe_outcomes_drive_flags() {
        let (publisher, availability) = state::channel();
        let up = Arc::new(AtomicBool::new(false));
        let probe = Switch {
            dependency: Dependency::Store,
            up: up.clone(),
        };
        let mut prober = HealthProber::new(
            vec![Box::new(probe)],
            publisher,
            config(),
            Arc::new(Notify::new()),
        );

        prober.probe_once().await;
        assert!(!availability.is_available(Dependency::Store));
        assert!(availability.is_available(Dependency::Backend));

        up.store(true, Ordering::SeqCst);
        prober.probe_once().await;
        assert!(availability.all_available());
    }

    #[tokio::test]
    async fn test_backend_probe_reports_store_from_ping() {
        let (publisher, availability) = state::channel();
        let backend = Arc::new(FakeBackend::default());
        let mut prober = HealthProber::new(
            vec![Box::new(BackendProbe::new(backend.clone()))],
            publisher,
            config(),
            Arc::new(Notify::new()),
        );

        backend.set_store_available(false);
        prober.probe_once().await;
        assert!(availability.is_available(Dependency::Backend));
        assert!(!availability.is_available(Dependency::Store));

        backend.set_store_available(true);
        prober.probe_once().await;
        assert!(availability.all_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_times_out_as_failure() {
        let (publisher, availability) = state::channel();
        let mut prober =
            HealthProber::new(vec![Box::new(Hangs)], publisher, config(), Arc::new(Notify::new()));

        prober.probe_once().await;
        assert!(!availability.is_available(Dependency::Backend));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_signals_drain_once_dependencies_recover() {
        let (publisher, availability) = state::channel();
        let up = Arc::new(AtomicBool::new(false));
        let drain = Arc::new(Notify::new());
        let shutdown = crate::lifecycle::Shutdown::new();

        let prober = HealthProber::new(
            vec![Box::new(Switch {
                dependency: Dependency::Backend,
                up: up.clone(),
            })],
            publisher,
            config(),
            drain.clone(),
        );
        let handle = tokio::spawn(prober.run(shutdown.subscribe()));

        let mut backend_flag = availability.subscribe(Dependency::Backend);
        backend_flag.wait_for(|up| !*up).await.unwrap();

        up.store(true, Ordering::SeqCst);
        drain.notified().await;
        assert!(availability.all_available());

        shutdown.trigger();
        handle.await.unwrap();
    }
}
