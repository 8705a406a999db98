//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Recolecta métricas del bridge en tiempo real: requests por status,
//! latencias, conexiones activas y los desenlaces anómalos de la
//! correlación (timeouts, respuestas para ids desconocidos).

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Máximo de latencias que se guardan para calcular percentiles
const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Collector de métricas thread-safe
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsData>>,
    start_time: Instant,
}

#[derive(Default)]
struct MetricsData {
    total_requests: u64,

    /// Requests por código de estado
    status_codes: BTreeMap<u16, u64>,

    /// Requests por método HTTP
    methods: BTreeMap<String, u64>,

    /// Últimas latencias (microsegundos)
    latencies: VecDeque<u64>,

    active_connections: u64,

    /// Requests que vencieron esperando al handler
    timeouts: u64,

    /// Bodies que no se pudieron parsear
    parse_failures: u64,

    /// `respond` para ids desconocidos o ya consumidos
    stale_fulfillments: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsData {
                latencies: VecDeque::with_capacity(MAX_LATENCY_SAMPLES),
                ..MetricsData::default()
            })),
            start_time: Instant::now(),
        }
    }

    fn data(&self) -> MutexGuard<'_, MetricsData> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registra un request terminado
    pub fn record_request(&self, method: &str, status_code: u16, latency: Duration) {
        let mut data = self.data();

        data.total_requests += 1;
        *data.status_codes.entry(status_code).or_insert(0) += 1;
        *data.methods.entry(method.to_string()).or_insert(0) += 1;

        if data.latencies.len() >= MAX_LATENCY_SAMPLES {
            data.latencies.pop_front();
        }
        data.latencies.push_back(latency.as_micros() as u64);
    }

    pub fn record_timeout(&self) {
        self.data().timeouts += 1;
    }

    pub fn record_parse_failure(&self) {
        self.data().parse_failures += 1;
    }

    pub fn record_stale_fulfillment(&self) {
        self.data().stale_fulfillments += 1;
    }

    pub fn increment_active_connections(&self) {
        self.data().active_connections += 1;
    }

    pub fn decrement_active_connections(&self) {
        let mut data = self.data();
        data.active_connections = data.active_connections.saturating_sub(1);
    }

    pub fn active_connections(&self) -> u64 {
        self.data().active_connections
    }

    /// Calcula percentiles de latencia: (p50, p95, p99, avg)
    fn calculate_percentiles(latencies: &VecDeque<u64>) -> (u64, u64, u64, u64) {
        if latencies.is_empty() {
            return (0, 0, 0, 0);
        }

        let mut sorted: Vec<u64> = latencies.iter().copied().collect();
        sorted.sort_unstable();

        let len = sorted.len();
        let p50 = sorted[len * 50 / 100];
        let p95 = sorted[len * 95 / 100];
        let p99 = sorted[len * 99 / 100];
        let avg = sorted.iter().sum::<u64>() / len as u64;

        (p50, p95, p99, avg)
    }

    /// Obtiene un snapshot de las métricas
    pub fn get_snapshot(&self) -> MetricsSnapshot {
        let data = self.data();
        let (p50, p95, p99, avg) = Self::calculate_percentiles(&data.latencies);

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            total_requests: data.total_requests,
            active_connections: data.active_connections,
            status_codes: data.status_codes.clone(),
            methods: data.methods.clone(),
            timeouts: data.timeouts,
            parse_failures: data.parse_failures,
            stale_fulfillments: data.stale_fulfillments,
            latency_p50_us: p50,
            latency_p95_us: p95,
            latency_p99_us: p99,
            latency_avg_us: avg,
            latency_samples: data.latencies.len(),
        }
    }

    /// Métricas actuales en JSON
    pub fn get_metrics_json(&self) -> String {
        serde_json::to_string_pretty(&self.get_snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot de métricas (para uso externo)
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub active_connections: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub methods: BTreeMap<String, u64>,
    pub timeouts: u64,
    pub parse_failures: u64,
    pub stale_fulfillments: u64,
    pub latency_p50_us: u64,
    pub latency_p95_us: u64,
    pub latency_p99_us: u64,
    pub latency_avg_us: u64,
    pub latency_samples: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector() {
        let collector = MetricsCollector::new();

        collector.record_request("GET", 200, Duration::from_millis(10));
        collector.record_request("GET", 200, Duration::from_millis(20));
        collector.record_request("POST", 504, Duration::from_millis(5));

        let snapshot = collector.get_snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.status_codes.get(&200), Some(&2));
        assert_eq!(snapshot.methods.get("POST"), Some(&1));
    }

    #[test]
    fn test_percentiles() {
        let collector = MetricsCollector::new();

        for i in 1..=100 {
            collector.record_request("GET", 200, Duration::from_micros(i));
        }

        let snapshot = collector.get_snapshot();
        assert!(snapshot.latency_p50_us > 0);
        assert!(snapshot.latency_p95_us > snapshot.latency_p50_us);
        assert!(snapshot.latency_p99_us > snapshot.latency_p95_us);
    }

    #[test]
    fn test_active_connections_no_negative() {
        let collector = MetricsCollector::new();

        collector.increment_active_connections();
        collector.decrement_active_connections();
        collector.decrement_active_connections();

        assert_eq!(collector.active_connections(), 0);
    }

    #[test]
    fn test_anomaly_counters() {
        let collector = MetricsCollector::new();

        collector.record_timeout();
        collector.record_parse_failure();
        collector.record_stale_fulfillment();
        collector.record_stale_fulfillment();

        let snapshot = collector.get_snapshot();
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.parse_failures, 1);
        assert_eq!(snapshot.stale_fulfillments, 2);
    }

    #[test]
    fn test_json_format() {
        let collector = MetricsCollector::new();
        collector.record_request("GET", 200, Duration::from_millis(50));

        let json: serde_json::Value = serde_json::from_str(&collector.get_metrics_json()).unwrap();
        assert_eq!(json["total_requests"], 1);
        assert_eq!(json["status_codes"]["200"], 1);
    }

    #[test]
    fn test_latency_window_management() {
        let collector = MetricsCollector::new();

        for i in 0..15_000 {
            collector.record_request("GET", 200, Duration::from_micros(i));
        }

        let snapshot = collector.get_snapshot();
        assert_eq!(snapshot.total_requests, 15_000);
        assert_eq!(snapshot.latency_samples, MAX_LATENCY_SAMPLES);
    }
}
