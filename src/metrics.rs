//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Snapshot of a pool's counters
///
/// # Examples
///
/// ```
/// use sphinx_pool::{FactoryError, Pool, PoolConfiguration, ResourceFactory};
///
/// struct Numbers;
///
/// impl ResourceFactory for Numbers {
///     type Resource = u32;
///
///     fn create(&self) -> Result<u32, FactoryError> {
///         Ok(7)
///     }
/// }
///
/// let pool = Pool::new(Numbers, PoolConfiguration::default());
/// let proxy = pool.acquire().unwrap();
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_borrowed, 1);
/// assert_eq!(metrics.active_resources, 1);
/// proxy.close().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Resources created by the factory
    pub total_created: usize,

    /// Resources destroyed by the pool
    pub total_destroyed: usize,

    /// Successful checkouts
    pub total_borrowed: usize,

    /// Resources returned to the idle set
    pub total_returned: usize,

    /// Validation or activation failures
    pub validation_failures: usize,

    /// Checkouts that gave up waiting
    pub wait_timeouts: usize,

    /// Idle resources removed by the evictor
    pub total_evicted: usize,

    /// Current active resources
    pub active_resources: usize,

    /// Current idle resources
    pub idle_resources: usize,

    /// Pool utilization ratio (0.0 to 1.0, zero when unbounded)
    pub utilization: f64,

    /// Configured total capacity (zero when unbounded)
    pub max_capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_destroyed".to_string(), self.total_destroyed.to_string());
        metrics.insert("total_borrowed".to_string(), self.total_borrowed.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("validation_failures".to_string(), self.validation_failures.to_string());
        metrics.insert("wait_timeouts".to_string(), self.wait_timeouts.to_string());
        metrics.insert("total_evicted".to_string(), self.total_evicted.to_string());
        metrics.insert("active_resources".to_string(), self.active_resources.to_string());
        metrics.insert("idle_resources".to_string(), self.idle_resources.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("max_capacity".to_string(), self.max_capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// Labels always carry `pool="<name>"` followed by the optional tags.
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let labels = Self::format_labels(pool_name, tags);
        let mut output = String::new();

        let gauges = [
            ("searchpool_resources_active", "Current active resources", metrics.active_resources as f64),
            ("searchpool_resources_idle", "Current idle resources", metrics.idle_resources as f64),
            ("searchpool_utilization", "Pool utilization ratio", metrics.utilization),
        ];
        for (name, help, value) in gauges {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} gauge");
            let _ = writeln!(output, "{name}{{{labels}}} {value}");
        }

        let counters = [
            ("searchpool_resources_created_total", "Resources created", metrics.total_created),
            ("searchpool_resources_destroyed_total", "Resources destroyed", metrics.total_destroyed),
            ("searchpool_resources_borrowed_total", "Resources borrowed", metrics.total_borrowed),
            ("searchpool_resources_returned_total", "Resources returned", metrics.total_returned),
            ("searchpool_validation_failures_total", "Validation failures", metrics.validation_failures),
            ("searchpool_wait_timeouts_total", "Checkouts that timed out", metrics.wait_timeouts),
            ("searchpool_resources_evicted_total", "Resources evicted", metrics.total_evicted),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} counter");
            let _ = writeln!(output, "{name}{{{labels}}} {value}");
        }

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut sorted: Vec<_> = tags.iter().collect();
            sorted.sort();
            for (key, value) in sorted {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub borrowed: AtomicUsize,
    pub returned: AtomicUsize,
    pub validation_failures: AtomicUsize,
    pub wait_timeouts: AtomicUsize,
    pub evicted: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, active: usize, idle: usize, capacity: Option<usize>) -> PoolMetrics {
        let utilization = match capacity {
            Some(capacity) if capacity > 0 => active as f64 / capacity as f64,
            _ => 0.0,
        };

        PoolMetrics {
            total_created: self.created.load(Ordering::Relaxed),
            total_destroyed: self.destroyed.load(Ordering::Relaxed),
            total_borrowed: self.borrowed.load(Ordering::Relaxed),
            total_returned: self.returned.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            wait_timeouts: self.wait_timeouts.load(Ordering::Relaxed),
            total_evicted: self.evicted.load(Ordering::Relaxed),
            active_resources: active,
            idle_resources: idle,
            utilization,
            max_capacity: capacity.unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization() {
        let tracker = MetricsTracker::new();
        MetricsTracker::incr(&tracker.created);
        MetricsTracker::incr(&tracker.borrowed);

        let metrics = tracker.get_metrics(1, 1, Some(4));
        assert_eq!(metrics.total_created, 1);
        assert_eq!(metrics.total_borrowed, 1);
        assert!((metrics.utilization - 0.25).abs() < f64::EPSILON);

        let unbounded = tracker.get_metrics(3, 0, None);
        assert_eq!(unbounded.utilization, 0.0);
        assert_eq!(unbounded.max_capacity, 0);
    }

    #[test]
    fn test_prometheus_labels() {
        let metrics = MetricsTracker::new().get_metrics(2, 1, Some(4));
        let mut tags = HashMap::new();
        tags.insert("service".to_string(), "search".to_string());

        let output = MetricsExporter::export_prometheus(&metrics, "main", Some(&tags));
        assert!(output.contains("# TYPE searchpool_resources_active gauge"));
        assert!(output.contains("searchpool_resources_active{pool=\"main\",service=\"search\"} 2"));
        assert!(output.contains("searchpool_resources_created_total{pool=\"main\",service=\"search\"} 0"));
    }

    #[test]
    fn test_export_map() {
        let exported = MetricsTracker::new().get_metrics(0, 3, Some(8)).export();
        assert_eq!(exported["idle_resources"], "3");
        assert_eq!(exported["utilization"], "0.00");
    }
}
