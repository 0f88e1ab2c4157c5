//! # Rolling sample statistics

use anyhow::{ensure, Result};

/// Default number of samples kept by [`RollingStatistics`].
///
/// At 30 frames per second this is about 3 seconds worth of history.
pub const DEFAULT_CAPACITY: usize = 90;

/// Fixed capacity history of scalar samples.
///
/// Samples are kept in a circular buffer. Insertion is constant time, and windowed queries walk
/// back from the newest sample.
#[derive(Clone, Debug)]
pub struct RollingStatistics {
    samples: Box<[f32]>,
    /// Index of the newest sample. Meaningless while `count == 0`.
    cursor: usize,
    count: usize,
}

impl Default for RollingStatistics {
    fn default() -> Self {
        Self {
            samples: vec![0.0; DEFAULT_CAPACITY].into_boxed_slice(),
            cursor: 0,
            count: 0,
        }
    }
}

impl RollingStatistics {
    /// Create a new history.
    ///
    /// # Arguments
    ///
    /// * `capacity` - maximum number of samples to keep. Must be non-zero.
    pub fn new(capacity: usize) -> Result<Self> {
        ensure!(capacity > 0, "rolling statistics capacity must be non-zero");

        Ok(Self {
            samples: vec![0.0; capacity].into_boxed_slice(),
            cursor: 0,
            count: 0,
        })
    }

    /// Maximum number of samples kept.
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Number of valid samples, saturating at [`capacity`](Self::capacity).
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Clear all samples without reallocating.
    pub fn reset(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
        self.cursor = 0;
        self.count = 0;
    }

    /// Record a new sample, evicting the oldest one if the buffer is full.
    pub fn record_value(&mut self, value: f32) {
        if self.count > 0 {
            self.cursor = (self.cursor + 1) % self.samples.len();
        }

        self.count = std::cmp::min(self.count + 1, self.samples.len());
        self.samples[self.cursor] = value;
    }

    /// Get a sample recorded `frames_ago` steps before the newest one.
    ///
    /// `0` is the newest sample. Asking for a sample older than what has been recorded is an
    /// error.
    ///
    /// # Examples
    ///
    /// ```
    /// use depth_motion::stats::RollingStatistics;
    ///
    /// let mut stats = RollingStatistics::new(4).unwrap();
    ///
    /// for v in [1.0, 2.0, 3.0] {
    ///     stats.record_value(v);
    /// }
    ///
    /// assert_eq!(stats.value(0).unwrap(), 3.0);
    /// assert_eq!(stats.value(2).unwrap(), 1.0);
    /// assert!(stats.value(3).is_err());
    /// ```
    pub fn value(&self, frames_ago: usize) -> Result<f32> {
        ensure!(
            frames_ago < self.count,
            "requested sample {} frames ago, but only {} recorded",
            frames_ago,
            self.count
        );

        Ok(self.samples[self.index_of(frames_ago)])
    }

    /// Calculate the mean of the newest `window` samples.
    ///
    /// The window is clamped to the number of recorded samples. Returns 0 if it is empty.
    pub fn average(&self, window: usize) -> f32 {
        let window = std::cmp::min(window, self.count);

        if window == 0 {
            return 0.0;
        }

        self.window(window).sum::<f32>() / window as f32
    }

    /// Calculate the population standard deviation of the newest `window` samples.
    ///
    /// The window is clamped the same way as in [`average`](Self::average).
    pub fn standard_deviation(&self, window: usize) -> f32 {
        let window = std::cmp::min(window, self.count);

        if window == 0 {
            return 0.0;
        }

        let average = self.average(window);

        let total = self
            .window(window)
            .map(|v| (v - average) * (v - average))
            .sum::<f32>();

        (total / window as f32).sqrt()
    }

    fn index_of(&self, frames_ago: usize) -> usize {
        let cap = self.samples.len();
        (self.cursor + cap - frames_ago % cap) % cap
    }

    /// Iterate the newest `window` samples, newest first. `window` must be clamped by the caller.
    fn window(&self, window: usize) -> impl Iterator<Item = f32> + '_ {
        (0..window).map(move |i| self.samples[self.index_of(i)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn zero_capacity_fails() {
        assert!(RollingStatistics::new(0).is_err());
    }

    #[test]
    fn newest_and_oldest_ordering() {
        let mut stats = RollingStatistics::new(8).unwrap();

        for k in 1..=8 {
            stats.record_value(k as f32);
            assert_eq!(stats.value(0).unwrap(), k as f32);
            assert_eq!(stats.value(k - 1).unwrap(), 1.0);
            assert!(stats.value(k).is_err());
        }
    }

    #[test]
    fn wraps_around_capacity() {
        let mut stats = RollingStatistics::new(3).unwrap();

        for v in 0..10 {
            stats.record_value(v as f32);
        }

        assert_eq!(stats.len(), 3);
        assert_eq!(stats.value(0).unwrap(), 9.0);
        assert_eq!(stats.value(1).unwrap(), 8.0);
        assert_eq!(stats.value(2).unwrap(), 7.0);
        assert!(stats.value(3).is_err());
    }

    #[test]
    fn empty_queries() {
        let stats = RollingStatistics::default();

        assert_eq!(stats.capacity(), DEFAULT_CAPACITY);
        assert!(stats.value(0).is_err());
        assert_eq!(stats.average(30), 0.0);
        assert_eq!(stats.standard_deviation(30), 0.0);
        assert_eq!(stats.average(0), 0.0);
    }

    #[test]
    fn windowed_average() {
        let mut stats = RollingStatistics::default();

        for v in [2.0, 4.0, 6.0, 8.0] {
            stats.record_value(v);
        }

        assert_approx_eq!(stats.average(100), 5.0);
        assert_approx_eq!(stats.average(4), 5.0);
        assert_approx_eq!(stats.average(2), 7.0);
        assert_approx_eq!(stats.average(1), 8.0);
    }

    #[test]
    fn population_standard_deviation() {
        let mut stats = RollingStatistics::default();

        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.record_value(v);
        }

        assert_approx_eq!(stats.standard_deviation(8), 2.0);
        assert_approx_eq!(stats.standard_deviation(2), 1.0);
    }

    #[test]
    fn constant_sequence_has_no_deviation() {
        let mut stats = RollingStatistics::new(16).unwrap();

        for _ in 0..40 {
            stats.record_value(0.25);
        }

        for w in 0..20 {
            assert_approx_eq!(stats.standard_deviation(w), 0.0);
        }
    }

    #[test]
    fn reset_is_idempotent() {
        let mut stats = RollingStatistics::new(5).unwrap();

        for v in 0..7 {
            stats.record_value(v as f32 + 1.0);
        }

        stats.reset();
        stats.reset();

        assert!(stats.is_empty());
        assert_eq!(stats.average(5), 0.0);
        assert_eq!(stats.standard_deviation(5), 0.0);

        stats.record_value(3.0);

        assert_eq!(stats.len(), 1);
        assert_eq!(stats.value(0).unwrap(), 3.0);
        assert!(stats.value(1).is_err());
        assert_approx_eq!(stats.average(5), 3.0);
    }
}
