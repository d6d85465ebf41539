//! View configuration.
//!
//! A view rewrites how matching instruments aggregate: rename, boundary
//! overrides, aggregation switches, per-stream cardinality limits and
//! exemplar sampling.

/// Aggregation requested by a view.
#[derive(Debug, Clone)]
pub enum Aggregation {
    /// Keep the instrument kind's default aggregation.
    Default,
    /// Sum aggregation (monotonicity follows the instrument kind).
    Sum,
    /// Last-value aggregation.
    LastValue,
    /// Explicit-bucket histogram.
    ExplicitBucketHistogram {
        /// Sorted, strictly increasing finite boundaries.
        boundaries: Vec<f64>,
        /// Track min/max alongside the buckets.
        record_min_max: bool,
    },
    /// Base-2 exponential histogram.
    Base2ExponentialHistogram {
        /// Maximum active buckets per side.
        max_size: usize,
        /// Starting scale.
        max_scale: i32,
        /// Track min/max alongside the buckets.
        record_min_max: bool,
    },
}

/// Exemplar sampling requested by a view.
#[derive(Debug, Clone)]
pub enum ExemplarSampling {
    /// Uniform random retention of up to `size` raw measurements.
    SimpleFixedSize(usize),
    /// One retained measurement per histogram bucket.
    AlignedHistogram,
}

/// A single view: an instrument selector plus stream overrides.
#[derive(Debug, Clone)]
pub struct View {
    selector: String,
    rename: Option<String>,
    description: Option<String>,
    aggregation: Aggregation,
    cardinality_limit: Option<usize>,
    exemplars: Option<ExemplarSampling>,
}

impl View {
    /// Creates a view matching instruments by name. A trailing `*`
    /// matches any suffix.
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            rename: None,
            description: None,
            aggregation: Aggregation::Default,
            cardinality_limit: None,
            exemplars: None,
        }
    }

    /// Renames the resulting stream.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.rename = Some(name.into());
        self
    }

    /// Replaces the stream description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Switches the aggregation.
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Overrides the stream's cardinality limit.
    pub fn with_cardinality_limit(mut self, limit: usize) -> Self {
        self.cardinality_limit = Some(limit);
        self
    }

    /// Enables exemplar sampling on the stream.
    pub fn with_exemplars(mut self, sampling: ExemplarSampling) -> Self {
        self.exemplars = Some(sampling);
        self
    }

    /// True when this view applies to the named instrument.
    pub fn matches(&self, instrument_name: &str) -> bool {
        match self.selector.strip_suffix('*') {
            Some(prefix) => instrument_name.starts_with(prefix),
            None => self.selector == instrument_name,
        }
    }

    pub(crate) fn rename(&self) -> Option<&str> {
        self.rename.as_deref()
    }

    pub(crate) fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub(crate) fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    pub(crate) fn cardinality_limit(&self) -> Option<usize> {
        self.cardinality_limit
    }

    pub(crate) fn exemplars(&self) -> Option<&ExemplarSampling> {
        self.exemplars.as_ref()
    }
}
