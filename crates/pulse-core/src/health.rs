// Health probe pool
//
// Liveness checks against a fixed list of services. Each probe is bounded by a
// timeout and never fails outward: the outcome lands in the service's status
// record and as one line in the shared diagnostic log.
//
// Status writes for one service are atomic and ordered by completion, so when
// two probes for the same service overlap the one that finishes last decides
// `alive`. `checking` stays set until every in-flight probe has finished or
// been dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::ProbeConfig;
use crate::error::SourceError;
use crate::traits::HealthProbe;

/// A monitored backend service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub id: String,
    pub name: String,
    pub health_url: String,
    #[serde(default)]
    pub kind: String,
}

impl ServiceDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        health_url: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            health_url: health_url.into(),
            kind: kind.into(),
        }
    }
}

/// Observed state of one service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// `None` until the first probe completes
    pub alive: Option<bool>,
    pub checking: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub latency_ms: Option<u64>,
    pub last_error: Option<String>,
}

/// Counts of services by observed state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub alive: usize,
    pub down: usize,
    pub unknown: usize,
}

// ============================================================================
// DiagnosticLog - shared, append-only probe transcript
// ============================================================================

/// One line of the probe transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticEntry {
    pub service_id: String,
    pub service_name: String,
    pub healthy: bool,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl DiagnosticEntry {
    /// "<name>: Healthy" or "<name>: <error message>"
    pub fn line(&self) -> String {
        format!("{}: {}", self.service_name, self.message)
    }
}

/// Append-only transcript shared by single checks and bulk checks
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    entries: Mutex<Vec<DiagnosticEntry>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: DiagnosticEntry) {
        self.entries.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<DiagnosticEntry> {
        self.entries.lock().clone()
    }

    /// Transcript lines in append order
    pub fn render(&self) -> Vec<String> {
        self.entries.lock().iter().map(DiagnosticEntry::line).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

// ============================================================================
// HealthProbePool
// ============================================================================

#[derive(Debug, Default)]
struct StatusCell {
    status: ServiceStatus,
    in_flight: usize,
}

/// Runs liveness checks against the configured services
pub struct HealthProbePool {
    services: Vec<ServiceDescriptor>,
    cells: Mutex<HashMap<String, StatusCell>>,
    probe: Arc<dyn HealthProbe>,
    config: ProbeConfig,
    log: Arc<DiagnosticLog>,
}

impl HealthProbePool {
    /// Create a pool with its own diagnostic log
    pub fn new(
        services: Vec<ServiceDescriptor>,
        probe: Arc<dyn HealthProbe>,
        config: ProbeConfig,
    ) -> Self {
        Self::with_log(services, probe, config, Arc::new(DiagnosticLog::new()))
    }

    /// Create a pool appending to an existing diagnostic log
    pub fn with_log(
        services: Vec<ServiceDescriptor>,
        probe: Arc<dyn HealthProbe>,
        config: ProbeConfig,
        log: Arc<DiagnosticLog>,
    ) -> Self {
        let cells = services
            .iter()
            .map(|s| (s.id.clone(), StatusCell::default()))
            .collect();
        Self {
            services,
            cells: Mutex::new(cells),
            probe,
            config,
            log,
        }
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn log(&self) -> &Arc<DiagnosticLog> {
        &self.log
    }

    pub fn service(&self, id: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.id == id)
    }

    /// Probe one service and append its transcript line
    ///
    /// Returns `None` for an unknown service id.
    pub async fn check_one(&self, service_id: &str) -> Option<ServiceStatus> {
        let service = self.service(service_id)?;
        let (entry, status) = self.run_probe(service).await;
        self.log.append(entry);
        Some(status)
    }

    /// Probe every configured service
    ///
    /// Up to `concurrency` probes run at once; each status is written the
    /// moment its probe completes, while transcript lines are appended in
    /// configuration order.
    pub async fn check_all(&self) -> Vec<(ServiceDescriptor, ServiceStatus)> {
        info!(services = self.services.len(), "Checking all services");

        let mut probes = Vec::with_capacity(self.services.len());
        for service in &self.services {
            probes.push(async move {
                let (entry, status) = self.run_probe(service).await;
                (service, entry, status)
            });
        }
        let mut reports =
            futures::stream::iter(probes).buffered(self.config.concurrency.max(1));

        let mut results = Vec::with_capacity(self.services.len());
        while let Some((service, entry, status)) = reports.next().await {
            self.log.append(entry);
            results.push((service.clone(), status));
        }
        results
    }

    /// Current status of one service
    pub fn status(&self, service_id: &str) -> Option<ServiceStatus> {
        self.cells
            .lock()
            .get(service_id)
            .map(|cell| cell.status.clone())
    }

    /// All services with their current status, in configuration order
    pub fn statuses(&self) -> Vec<(ServiceDescriptor, ServiceStatus)> {
        let cells = self.cells.lock();
        self.services
            .iter()
            .map(|s| {
                let status = cells
                    .get(&s.id)
                    .map(|c| c.status.clone())
                    .unwrap_or_default();
                (s.clone(), status)
            })
            .collect()
    }

    pub fn summary(&self) -> HealthSummary {
        let cells = self.cells.lock();
        cells
            .values()
            .fold(HealthSummary::default(), |mut acc, cell| {
                match cell.status.alive {
                    Some(true) => acc.alive += 1,
                    Some(false) => acc.down += 1,
                    None => acc.unknown += 1,
                }
                acc
            })
    }

    /// Whether any probe is currently running
    pub fn is_checking(&self) -> bool {
        self.cells.lock().values().any(|c| c.status.checking)
    }

    #[instrument(skip(self, service), fields(service = %service.id))]
    async fn run_probe(&self, service: &ServiceDescriptor) -> (DiagnosticEntry, ServiceStatus) {
        let in_flight = self.begin(&service.id);

        let started = Instant::now();
        let timeout = self.config.timeout;
        let result = match tokio::time::timeout(
            timeout,
            self.probe.probe(&service.health_url, timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(timeout)),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let (healthy, message) = match &result {
            Ok(()) => {
                debug!(latency_ms, "Service healthy");
                (true, "Healthy".to_string())
            }
            Err(e) => {
                warn!(error = %e, latency_ms, "Service check failed");
                (false, e.to_string())
            }
        };

        let status = in_flight.finish(healthy, latency_ms, &result);
        let entry = DiagnosticEntry {
            service_id: service.id.clone(),
            service_name: service.name.clone(),
            healthy,
            message,
            at: Utc::now(),
        };
        (entry, status)
    }

    fn begin<'a>(&'a self, service_id: &'a str) -> InFlight<'a> {
        let mut cells = self.cells.lock();
        let cell = cells.entry(service_id.to_string()).or_default();
        cell.in_flight += 1;
        cell.status.checking = true;
        InFlight {
            cells: &self.cells,
            service_id,
            settled: false,
        }
    }
}

/// One running probe; dropping it unfinished still releases `checking`
struct InFlight<'a> {
    cells: &'a Mutex<HashMap<String, StatusCell>>,
    service_id: &'a str,
    settled: bool,
}

impl InFlight<'_> {
    fn finish(
        mut self,
        healthy: bool,
        latency_ms: u64,
        result: &Result<(), SourceError>,
    ) -> ServiceStatus {
        self.settled = true;
        let mut cells = self.cells.lock();
        let cell = cells.entry(self.service_id.to_string()).or_default();
        cell.in_flight = cell.in_flight.saturating_sub(1);
        cell.status.checking = cell.in_flight > 0;
        cell.status.alive = Some(healthy);
        cell.status.last_checked = Some(Utc::now());
        cell.status.latency_ms = Some(latency_ms);
        cell.status.last_error = result.as_ref().err().map(|e| e.to_string());
        cell.status.clone()
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut cells = self.cells.lock();
        if let Some(cell) = cells.get_mut(self.service_id) {
            cell.in_flight = cell.in_flight.saturating_sub(1);
            cell.status.checking = cell.in_flight > 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ProbeOutcome, ScriptedProbe};
    use std::time::Duration;

    fn services() -> Vec<ServiceDescriptor> {
        vec![
            ServiceDescriptor::new("main", "Main", "http://main/health", "api"),
            ServiceDescriptor::new("ml", "ML", "http://ml/health", "render"),
            ServiceDescriptor::new("portfolio", "Portfolio", "http://portfolio/health", "web"),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_all_with_timeout() {
        let probe = ScriptedProbe::new()
            .respond("http://main/health", Duration::from_millis(20), ProbeOutcome::Up)
            .respond("http://ml/health", Duration::from_secs(30), ProbeOutcome::Up)
            .respond("http://portfolio/health", Duration::from_millis(5), ProbeOutcome::Up);
        let pool = HealthProbePool::new(services(), Arc::new(probe), ProbeConfig::default());

        let results = pool.check_all().await;

        let alive: Vec<_> = results
            .iter()
            .map(|(s, st)| (s.id.as_str(), st.alive))
            .collect();
        assert_eq!(
            alive,
            vec![
                ("main", Some(true)),
                ("ml", Some(false)),
                ("portfolio", Some(true))
            ]
        );

        let lines = pool.log().render();
        assert_eq!(
            lines,
            vec![
                "Main: Healthy".to_string(),
                "ML: timed out after 5000ms".to_string(),
                "Portfolio: Healthy".to_string(),
            ]
        );
        assert!(!pool.is_checking());
        assert_eq!(
            pool.summary(),
            HealthSummary {
                alive: 2,
                down: 1,
                unknown: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_mode_keeps_order() {
        let probe = ScriptedProbe::new()
            .respond("http://main/health", Duration::from_millis(50), ProbeOutcome::Up)
            .respond("http://ml/health", Duration::from_millis(1), ProbeOutcome::status(503))
            .respond("http://portfolio/health", Duration::from_millis(1), ProbeOutcome::Up);
        let pool = HealthProbePool::new(
            services(),
            Arc::new(probe),
            ProbeConfig::default().sequential(),
        );

        pool.check_all().await;

        let lines = pool.log().render();
        assert_eq!(lines[0], "Main: Healthy");
        assert!(lines[1].starts_with("ML: API error (503)"));
        assert_eq!(lines[2], "Portfolio: Healthy");
    }

    #[tokio::test]
    async fn test_never_checked_status() {
        let pool = HealthProbePool::new(
            services(),
            Arc::new(ScriptedProbe::new()),
            ProbeConfig::default(),
        );

        let status = pool.status("ml").unwrap();
        assert_eq!(status.alive, None);
        assert!(!status.checking);
        assert_eq!(pool.summary().unknown, 3);
    }

    #[tokio::test]
    async fn test_unknown_service_is_ignored() {
        let pool = HealthProbePool::new(
            services(),
            Arc::new(ScriptedProbe::new()),
            ProbeConfig::default(),
        );

        assert!(pool.check_one("nope").await.is_none());
        assert!(pool.log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_checking_flag_during_probe() {
        let probe = ScriptedProbe::new().respond(
            "http://main/health",
            Duration::from_millis(100),
            ProbeOutcome::Up,
        );
        let pool = Arc::new(HealthProbePool::new(
            services(),
            Arc::new(probe),
            ProbeConfig::default(),
        ));

        let task = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { pool.check_one("main").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(pool.status("main").unwrap().checking);
        assert!(!pool.status("ml").unwrap().checking);

        let status = task.await.unwrap().unwrap();
        assert!(!status.checking);
        assert_eq!(status.alive, Some(true));
        assert_eq!(pool.log().render(), vec!["Main: Healthy".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_check_one_clears_checking() {
        let probe = ScriptedProbe::new().respond(
            "http://main/health",
            Duration::from_millis(100),
            ProbeOutcome::Up,
        );
        let pool = HealthProbePool::new(services(), Arc::new(probe), ProbeConfig::default());

        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), pool.check_one("main")).await;
        assert!(cancelled.is_err());

        let status = pool.status("main").unwrap();
        assert!(!status.checking);
        assert_eq!(status.alive, None);
        assert!(!pool.is_checking());
        assert!(pool.log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_check_all_clears_checking() {
        let probe = ScriptedProbe::new().default_delay(Duration::from_millis(100));
        let pool = HealthProbePool::new(services(), Arc::new(probe), ProbeConfig::default());

        let cancelled = tokio::time::timeout(Duration::from_millis(10), pool.check_all()).await;
        assert!(cancelled.is_err());
        assert!(!pool.is_checking());
    }

    #[tokio::test]
    async fn test_check_all_runs_on_spawned_task() {
        let pool = Arc::new(HealthProbePool::new(
            services(),
            Arc::new(ScriptedProbe::new()),
            ProbeConfig::default(),
        ));

        let results = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { pool.check_all().await }
        })
        .await
        .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(pool.summary().alive, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_probes_last_completion_wins() {
        // First probe is slow and fails, second is fast and succeeds
        let probe = ScriptedProbe::new()
            .respond(
                "http://main/health",
                Duration::from_millis(1000),
                ProbeOutcome::status(500),
            )
            .respond("http://main/health", Duration::from_millis(10), ProbeOutcome::Up);
        let pool = Arc::new(HealthProbePool::new(
            services(),
            Arc::new(probe),
            ProbeConfig::default(),
        ));

        let slow = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { pool.check_one("main").await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        let fast = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { pool.check_one("main").await }
        });

        let fast_status = fast.await.unwrap().unwrap();
        assert_eq!(fast_status.alive, Some(true));
        // Slow probe still in flight
        assert!(fast_status.checking);

        slow.await.unwrap();
        let status = pool.status("main").unwrap();
        assert_eq!(status.alive, Some(false));
        assert!(!status.checking);
        assert_eq!(pool.log().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_check_all_calls() {
        let probe = ScriptedProbe::new().default_delay(Duration::from_millis(100));
        let pool = HealthProbePool::new(services(), Arc::new(probe), ProbeConfig::default());

        let (a, b) = tokio::join!(pool.check_all(), pool.check_all());

        assert_eq!(a.len(), 3);
        assert_eq!(b.len(), 3);
        assert_eq!(pool.log().len(), 6);
        assert!(pool
            .statuses()
            .iter()
            .all(|(_, st)| st.alive == Some(true) && !st.checking));
    }

    #[test]
    fn test_diagnostic_log_clear() {
        let log = DiagnosticLog::new();
        log.append(DiagnosticEntry {
            service_id: "main".to_string(),
            service_name: "Main".to_string(),
            healthy: true,
            message: "Healthy".to_string(),
            at: Utc::now(),
        });
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
    }
}
