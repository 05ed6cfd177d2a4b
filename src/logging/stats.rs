//! Online summary statistics

/// Online mean and variance calculation using Welford's Algorithm.
///
/// Also tracks the minimum and maximum of the accumulated values.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OnlineMeanVariance {
    mean: f64,
    squared_residual_sum: f64,
    min: f64,
    max: f64,
    count: u64,
}

impl Default for OnlineMeanVariance {
    fn default() -> Self {
        Self::new()
    }
}

impl OnlineMeanVariance {
    pub const fn new() -> Self {
        Self {
            mean: 0.0,
            squared_residual_sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            count: 0,
        }
    }

    /// Add a new value to the calculation.
    pub fn push(&mut self, value: f64) {
        let residual_pre = value - self.mean;
        self.count += 1;
        self.mean += residual_pre / self.count as f64;
        let residual_post = value - self.mean;
        self.squared_residual_sum += residual_pre * residual_post;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub const fn count(&self) -> u64 {
        self.count
    }

    /// The mean of all accumulated values. `None` if empty.
    pub fn mean(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.mean)
        } else {
            None
        }
    }

    /// The (population) variance of all accumulated values. `None` if empty.
    pub fn variance(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.squared_residual_sum / self.count as f64)
        } else {
            None
        }
    }

    pub fn stddev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    /// `(min, max)` of the accumulated values. `None` if empty.
    pub fn range(&self) -> Option<(f64, f64)> {
        if self.count > 0 {
            Some((self.min, self.max))
        } else {
            None
        }
    }
}

impl Extend<f64> for OnlineMeanVariance {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.push(value)
        }
    }
}

impl FromIterator<f64> for OnlineMeanVariance {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut s = Self::new();
        s.extend(iter);
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_f64() {
        let stats: OnlineMeanVariance = [1.0, 2.0, 3.0, 4.0].into_iter().collect();
        assert!((stats.mean().unwrap() - 2.5).abs() < 1e-8);
        assert!((stats.variance().unwrap() - 1.25).abs() < 1e-8);
        assert_eq!(stats.range(), Some((1.0, 4.0)));
        assert_eq!(stats.count(), 4);
    }

    #[test]
    fn empty_has_no_mean() {
        let stats = OnlineMeanVariance::new();
        assert!(stats.mean().is_none());
        assert!(stats.stddev().is_none());
    }
}
