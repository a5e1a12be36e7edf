//! Combining mountain and river partial results
//!
//! Every node-scoped metric is answered by two independent sub-queries, one
//! per hardware class. This module reduces the two outcomes to a single
//! answer:
//!
//! - [`aggregate_errors`] decides whether the pair of outcomes is a failure.
//!   A class that found no rows is expected and is dropped when the other
//!   class answered. Any other failure is always reported.
//! - [`Merge`] combines two populated partials field by field.
//! - [`resolve_split`] applies both to a pair of sub-query results.
//!
//! # Statistics
//!
//! Averages and standard deviations are combined by weighting each side with
//! its node count. For the standard deviation this is an approximation, not
//! the pooled-variance formula.

use crate::error::{Error, Result};
use crate::types::{NodeEnergy, NodeEnergyCounters, NodeEnergyStats, TimeBoundRequest};
use tracing::debug;

/// Field-wise combination of two partial results of the same metric
pub trait Merge: Sized {
    /// Fold `other` into `self`
    fn merge(self, other: Self) -> Self;
}

impl Merge for NodeEnergy {
    fn merge(mut self, other: Self) -> Self {
        self.node_count += other.node_count;
        self.levels.extend(other.levels);
        self
    }
}

impl Merge for NodeEnergyCounters {
    fn merge(mut self, other: Self) -> Self {
        self.node_count += other.node_count;
        self.samples.extend(other.samples);
        self
    }
}

impl Merge for NodeEnergyStats {
    fn merge(mut self, other: Self) -> Self {
        self.total += other.total;

        // Weighted with the counts before they are summed below
        let n_self = self.node_count as f64;
        let n_other = other.node_count as f64;
        let n_total = n_self + n_other;
        if n_total > 0.0 {
            self.avg = (self.avg * n_self + other.avg * n_other) / n_total;
            self.stddev = (self.stddev * n_self + other.stddev * n_other) / n_total;
        }
        self.node_count += other.node_count;

        // Ties keep the existing side
        if other.max.energy > self.max.energy {
            self.max = other.max;
        }
        if other.min.energy < self.min.energy {
            self.min = other.min;
        }

        self
    }
}

/// Combine two optional partials
///
/// A single populated side is returned unchanged.
pub fn merge_partials<T: Merge>(mountain: Option<T>, river: Option<T>) -> Option<T> {
    match (mountain, river) {
        (Some(m), Some(r)) => Some(m.merge(r)),
        (Some(m), None) => Some(m),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    }
}

/// Reduce the two class outcomes to the single reported outcome
///
/// | mountain  | river     | result                    |
/// |-----------|-----------|---------------------------|
/// | ok        | ok        | ok                        |
/// | no data   | no data   | mountain no-data error    |
/// | no data   | ok        | ok                        |
/// | ok        | no data   | ok                        |
/// | failure   | ok        | the failure               |
/// | ok        | failure   | the failure               |
/// | any error | any error | combined error            |
///
/// The last row applies whenever at least one side is not "no data".
pub fn aggregate_errors(mountain: Option<Error>, river: Option<Error>) -> Option<Error> {
    match (mountain, river) {
        (None, None) => None,
        (Some(m), Some(r)) => {
            if m.is_no_data() && r.is_no_data() {
                Some(m)
            } else {
                Some(Error::Combined {
                    mountain: Box::new(m),
                    river: Box::new(r),
                })
            }
        },
        (Some(e), None) | (None, Some(e)) => {
            if e.is_no_data() {
                debug!(error = %e, "Suppressing no-data outcome, other class answered");
                None
            } else {
                Some(e)
            }
        },
    }
}

/// Resolve the mountain and river sub-query results into one answer
pub fn resolve_split<T: Merge>(
    window: TimeBoundRequest,
    mountain: Result<T>,
    river: Result<T>,
) -> Result<T> {
    let (m_val, m_err) = split(mountain);
    let (r_val, r_err) = split(river);

    if let Some(err) = aggregate_errors(m_err, r_err) {
        return Err(err);
    }

    merge_partials(m_val, r_val).ok_or_else(|| Error::no_data(window))
}

fn split<T>(result: Result<T>) -> (Option<T>, Option<Error>) {
    match result {
        Ok(v) => (Some(v), None),
        Err(e) => (None, Some(e)),
    }
}
