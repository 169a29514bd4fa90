/// Running statistics for one numeric field of one series.
///
/// Mean and variance use Welford's online update, so folding is O(1) and
/// numerically stable over long aggregation periods.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldStats {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
    mean: f64,
    m2: f64,
    last: f64,
}

impl FieldStats {
    /// Creates statistics seeded with a first value.
    pub fn new(value: f64) -> Self {
        Self {
            count: 1,
            min: value,
            max: value,
            sum: value,
            mean: value,
            m2: 0.0,
            last: value,
        }
    }

    /// Folds one value.
    pub fn record(&mut self, value: f64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.last = value;

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    /// Sample variance. Undefined for fewer than two values.
    pub fn variance(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        Some(self.m2 / (self.count - 1) as f64)
    }

    /// Sample standard deviation. Undefined for fewer than two values.
    pub fn stdev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_single_value() {
        let s = FieldStats::new(5.0);
        assert_eq!(s.count(), 1);
        assert_eq!(s.min(), 5.0);
        assert_eq!(s.max(), 5.0);
        assert_eq!(s.sum(), 5.0);
        assert_eq!(s.mean(), 5.0);
        assert_eq!(s.last(), 5.0);
        assert_eq!(s.variance(), None);
        assert_eq!(s.stdev(), None);
    }

    #[test]
    fn test_multiple_values() {
        let mut s = FieldStats::new(2.0);
        for v in [4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            s.record(v);
        }

        assert_eq!(s.count(), 8);
        assert_eq!(s.min(), 2.0);
        assert_eq!(s.max(), 9.0);
        assert_eq!(s.sum(), 40.0);
        assert!(approx(s.mean(), 5.0));
        assert_eq!(s.last(), 9.0);
        // Sample variance of the classic 2,4,4,4,5,5,7,9 set is 32/7.
        assert!(approx(s.variance().expect("defined"), 32.0 / 7.0));
        assert!(approx(s.stdev().expect("defined"), (32.0f64 / 7.0).sqrt()));
    }

    #[test]
    fn test_negative_values() {
        let mut s = FieldStats::new(-10.0);
        s.record(20.0);
        s.record(-30.0);

        assert_eq!(s.sum(), -20.0);
        assert_eq!(s.min(), -30.0);
        assert_eq!(s.max(), 20.0);
    }
}
