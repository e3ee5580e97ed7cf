//! Rolling and expanding window helpers
//!
//! Every historical feature is computed over the strictly-prior slice of a
//! rider's partition (the caller shifts by one before windowing). Values are
//! nullable: a missing finishing place stays `None` and is skipped by the
//! aggregations, but still occupies a window slot.

/// Fixed-size trailing window over the tail of a prior-value series.
#[derive(Debug, Clone, Copy)]
pub struct Trailing {
    pub size: usize,
    /// Minimum count of non-null values required for a defined result.
    pub min_periods: usize,
}

impl Trailing {
    pub fn new(size: usize, min_periods: usize) -> Self {
        Self { size, min_periods }
    }

    /// Mean of the non-null values in the last `size` entries.
    pub fn mean(&self, prior: &[Option<f64>]) -> Option<f64> {
        let tail = self.tail(prior);
        let values: Vec<f64> = tail.iter().copied().flatten().collect();
        if values.len() < self.min_periods {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Minimum of the non-null values in the last `size` entries.
    pub fn min(&self, prior: &[Option<f64>]) -> Option<f64> {
        let tail = self.tail(prior);
        let values: Vec<f64> = tail.iter().copied().flatten().collect();
        if values.len() < self.min_periods {
            return None;
        }
        values.into_iter().reduce(f64::min)
    }

    fn tail<'a>(&self, prior: &'a [Option<f64>]) -> &'a [Option<f64>] {
        let start = prior.len().saturating_sub(self.size);
        &prior[start..]
    }
}

/// Unbounded expanding window over the whole prior-value series.
pub struct Expanding;

impl Expanding {
    /// Mean of all non-null prior values; `None` when there are none.
    pub fn mean(prior: &[Option<f64>]) -> Option<f64> {
        let values: Vec<f64> = prior.iter().copied().flatten().collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
