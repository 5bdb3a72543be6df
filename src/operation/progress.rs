//! Progress aggregation across the sub-steps of one operation.

use std::fmt;

/// Folds per-step fractions into one monotonic overall fraction.
///
/// `overall = (completed + current_fraction) / total`. Values lower than
/// the last emitted one are swallowed, so callers only ever see a
/// non-decreasing sequence.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    total: usize,
    last: Option<f64>,
}

impl ProgressAggregator {
    pub fn new(total: usize) -> Self {
        Self {
            total: total.max(1),
            last: None,
        }
    }

    /// Overall fraction for `completed` finished steps plus `fraction` of
    /// the current one. Returns `None` when nothing new should be emitted.
    pub fn update(&mut self, completed: usize, fraction: f64) -> Option<f64> {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let overall = ((completed as f64 + fraction) / self.total as f64).clamp(0.0, 1.0);

        match self.last {
            Some(last) if overall <= last => None,
            _ => {
                self.last = Some(overall);
                Some(overall)
            }
        }
    }

    /// Emit `1.0` unless it was already the last value.
    pub fn complete(&mut self) -> Option<f64> {
        self.update(self.total, 0.0)
    }

    pub fn last(&self) -> f64 {
        self.last.unwrap_or(0.0)
    }
}

/// Which kind of unit an operation steps through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationKind {
    #[default]
    Delete,
    Fill,
}

impl OperationKind {
    fn unit(self) -> &'static str {
        match self {
            OperationKind::Delete => "File",
            OperationKind::Fill => "Mount",
        }
    }
}

/// Where a running operation currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressStep {
    pub kind: OperationKind,
    /// 1-based index of the current target; 0 before the first starts.
    pub target: usize,
    pub targets: usize,
    /// 1-based index of the current pass; 0 while no pass is running.
    pub pass: u32,
    pub passes: u32,
}

impl fmt::Display for ProgressStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} out of {}",
            self.kind.unit(),
            self.target,
            self.targets
        )?;
        if self.pass > 0 {
            write!(f, ", pass {} out of {}", self.pass, self.passes)?;
        }
        Ok(())
    }
}
