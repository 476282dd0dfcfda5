//! Metrics infrastructure for the MeshRF planning engine.
//!
//! This crate describes every metric the engine emits. It re-exports the `metrics`
//! crate for convenience and declares each metric as a structured [`Metric`]
//! constant so names stay consistent between the crates that record them.
//!
//! # Example
//!
//! ```rust,ignore
//! use meshrf_metrics::{metric_defs, describe_metrics};
//!
//! // Initialize metrics descriptions at startup
//! describe_metrics();
//!
//! metrics::counter!(metric_defs::TILE_CACHE_HITS.name).increment(1);
//! metrics::counter!(metric_defs::LINKS_ANALYZED.name, "status" => "viable").increment(1);
//! ```
//!
//! # Metric Type
//!
//! ```rust
//! use meshrf_metrics::{Metric, MetricKind};
//! use metrics::Unit;
//!
//! const MY_COUNTER: Metric = Metric::counter("my.counter")
//!     .with_description("A counter metric")
//!     .with_unit(Unit::Count)
//!     .with_labels(&["status"]);
//!
//! assert_eq!(MY_COUNTER.kind, MetricKind::Counter);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// Use the const constructors to declare metrics at compile time.
///
/// ```rust
/// use meshrf_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const TILES_FETCHED: Metric = Metric::counter("meshrf.terrain.tiles_fetched")
///     .with_description("Tiles fetched from the elevation source")
///     .with_unit(Unit::Count);
///
/// assert_eq!(TILES_FETCHED.name, "meshrf.terrain.tiles_fetched");
/// assert_eq!(TILES_FETCHED.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "meshrf.terrain.cache_hits").
    pub name: &'static str,
    /// The kind of metric (counter, gauge, histogram).
    pub kind: MetricKind,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the metrics recorder.
    ///
    /// This should be called once at startup for each metric.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }

    /// Returns the unit as a human-readable string.
    pub fn unit_str(&self) -> &'static str {
        match self.unit {
            Some(Unit::Count) => "count",
            Some(Unit::Percent) => "percent",
            Some(Unit::Seconds) => "seconds",
            Some(Unit::Milliseconds) => "milliseconds",
            Some(Unit::Microseconds) => "microseconds",
            Some(Unit::Nanoseconds) => "nanoseconds",
            Some(Unit::Tebibytes) => "tebibytes",
            Some(Unit::Gibibytes) => "gibibytes",
            Some(Unit::Mebibytes) => "mebibytes",
            Some(Unit::Kibibytes) => "kibibytes",
            Some(Unit::Bytes) => "bytes",
            Some(Unit::TerabitsPerSecond) => "terabits/second",
            Some(Unit::GigabitsPerSecond) => "gigabits/second",
            Some(Unit::MegabitsPerSecond) => "megabits/second",
            Some(Unit::KilobitsPerSecond) => "kilobits/second",
            Some(Unit::BitsPerSecond) => "bits/second",
            Some(Unit::CountPerSecond) => "count/second",
            None => "",
        }
    }
}

/// All metric definitions for the engine.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Terrain Cache
    // ========================================================================

    /// Tile lookups served from the in-memory layer or the cache store.
    pub const TILE_CACHE_HITS: Metric = Metric::counter("meshrf.terrain.cache_hits")
        .with_description("Tile lookups served without contacting the elevation source")
        .with_unit(Unit::Count);

    /// Tile lookups that required a fetch from the elevation source.
    pub const TILE_CACHE_MISSES: Metric = Metric::counter("meshrf.terrain.cache_misses")
        .with_description("Tile lookups that required an elevation source fetch")
        .with_unit(Unit::Count);

    /// Tiles assembled from the elevation source (fully or partially).
    pub const TILES_FETCHED: Metric = Metric::counter("meshrf.terrain.tiles_fetched")
        .with_description("Tiles assembled from the elevation source")
        .with_unit(Unit::Count);

    /// Tiles the elevation source could not supply at all.
    pub const TILES_UNAVAILABLE: Metric = Metric::counter("meshrf.terrain.tiles_unavailable")
        .with_description("Tiles for which every elevation batch failed")
        .with_unit(Unit::Count);

    /// Elevation batches whose samples were substituted with sea level.
    pub const DEGRADED_BATCHES: Metric = Metric::counter("meshrf.terrain.degraded_batches")
        .with_description("Elevation batches substituted with neutral elevation after a failure")
        .with_unit(Unit::Count);

    /// Round-trip latency of one elevation batch request.
    pub const BATCH_LATENCY: Metric = Metric::histogram("meshrf.terrain.batch_latency_ms")
        .with_description("Elevation source batch request latency in milliseconds")
        .with_unit(Unit::Milliseconds);

    // ========================================================================
    // Link Analysis
    // ========================================================================

    /// Links analyzed, by resulting status.
    ///
    /// Labels: status
    pub const LINKS_ANALYZED: Metric = Metric::counter("meshrf.link.analyzed")
        .with_description("Links analyzed, labelled by viability status")
        .with_unit(Unit::Count)
        .with_labels(&["status"]);

    /// Number of terrain samples per analyzed profile.
    pub const PROFILE_SAMPLES: Metric = Metric::histogram("meshrf.link.profile_samples")
        .with_description("Terrain samples taken per link profile")
        .with_unit(Unit::Count);

    // ========================================================================
    // Planner
    // ========================================================================

    /// Edges in the most recently built coverage graph.
    pub const COVERAGE_GRAPH_EDGES: Metric = Metric::gauge("meshrf.planner.coverage_edges")
        .with_description("Edges in the most recently built coverage graph")
        .with_unit(Unit::Count);

    /// Fraction of targets covered by the most recent site selection.
    pub const COVERAGE_FRACTION: Metric = Metric::gauge("meshrf.planner.coverage_fraction")
        .with_description("Fraction of targets covered by the most recent selection");

    /// Local-maximum candidates found by the sieve before ranking.
    pub const SIEVE_CANDIDATES: Metric = Metric::histogram("meshrf.sieve.candidates")
        .with_description("Local-maximum candidates found per sieve pass")
        .with_unit(Unit::Count);

    // ========================================================================
    // Runner
    // ========================================================================

    /// Operations answered from the result cache.
    ///
    /// Labels: operation
    pub const RESULT_CACHE_HITS: Metric = Metric::counter("meshrf.results.cache_hits")
        .with_description("Operations answered from the result cache")
        .with_unit(Unit::Count)
        .with_labels(&["operation"]);

    /// Wall-clock time of one top-level operation.
    ///
    /// Labels: operation
    pub const OPERATION_TIME: Metric = Metric::histogram("meshrf.runner.operation_time_ms")
        .with_description("Wall-clock time of one top-level operation in milliseconds")
        .with_unit(Unit::Milliseconds)
        .with_labels(&["operation"]);

    /// All metrics, for bulk description.
    pub const ALL: &[&Metric] = &[
        // Terrain
        &TILE_CACHE_HITS,
        &TILE_CACHE_MISSES,
        &TILES_FETCHED,
        &TILES_UNAVAILABLE,
        &DEGRADED_BATCHES,
        &BATCH_LATENCY,
        // Link
        &LINKS_ANALYZED,
        &PROFILE_SAMPLES,
        // Planner
        &COVERAGE_GRAPH_EDGES,
        &COVERAGE_FRACTION,
        &SIEVE_CANDIDATES,
        // Runner
        &RESULT_CACHE_HITS,
        &OPERATION_TIME,
    ];
}

/// Describes all metrics used by the engine.
///
/// Call once at startup, after a recorder has been installed, so exporters can
/// show descriptions and units.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::TILE_CACHE_HITS.name, "meshrf.terrain.cache_hits");
        assert_eq!(metric_defs::TILE_CACHE_HITS.kind, MetricKind::Counter);
        assert_eq!(metric_defs::BATCH_LATENCY.unit, Some(Unit::Milliseconds));
        assert_eq!(metric_defs::LINKS_ANALYZED.labels, &["status"]);
        assert_eq!(metric_defs::COVERAGE_FRACTION.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::SIEVE_CANDIDATES.kind, MetricKind::Histogram);
    }

    #[test]
    fn test_metric_names_unique() {
        let mut names: Vec<&str> = metric_defs::ALL.iter().map(|m| m.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_all_metrics_count() {
        assert_eq!(metric_defs::ALL.len(), 13);
    }

    #[test]
    fn test_metric_builder() {
        const TEST_HISTOGRAM: Metric = Metric::histogram("test.histogram")
            .with_description("A test histogram")
            .with_unit(Unit::Microseconds)
            .with_labels(&["operation"]);

        assert_eq!(TEST_HISTOGRAM.name, "test.histogram");
        assert_eq!(TEST_HISTOGRAM.kind, MetricKind::Histogram);
        assert_eq!(TEST_HISTOGRAM.description, "A test histogram");
        assert_eq!(TEST_HISTOGRAM.unit_str(), "microseconds");
        assert_eq!(TEST_HISTOGRAM.labels, &["operation"]);
    }

    #[test]
    fn test_metric_minimal() {
        const MINIMAL: Metric = Metric::counter("minimal");

        assert_eq!(MINIMAL.name, "minimal");
        assert_eq!(MINIMAL.description, "");
        assert_eq!(MINIMAL.unit, None);
        assert_eq!(MINIMAL.unit_str(), "");
        assert_eq!(MINIMAL.labels, &[] as &[&str]);
    }

    #[test]
    fn test_describe_without_recorder() {
        // No recorder installed: describing must be a harmless no-op.
        describe_metrics();
    }
}
