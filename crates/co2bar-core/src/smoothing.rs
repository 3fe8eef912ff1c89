//! Trend estimation and exponential smoothing
//!
//! The LED bar shows where CO2 is heading, not only where it is: a double
//! exponential filter estimates the per-sample rate of change and adds it to
//! the current reading. Temperature, humidity and the brightness target use a
//! plain exponential moving average.

use crate::config::TREND_ALPHA;

/// Output of one trend update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendEstimate {
    pub trend: f32,
    pub predicted: f32,
}

/// `trend' = α·(co2 − prev_co2) + (1 − α)·trend`, `predicted = co2 + trend'`.
pub fn update_trend(prev_co2: f32, co2: f32, trend: f32, alpha: f32) -> TrendEstimate {
    let trend = alpha * (co2 - prev_co2) + (1.0 - alpha) * trend;
    TrendEstimate {
        trend,
        predicted: co2 + trend,
    }
}

/// `prev + (raw − prev)·α`
pub fn smooth_exponential(prev: f32, raw: f32, alpha: f32) -> f32 {
    prev + (raw - prev) * alpha
}

/// Stateful CO2 trend filter, seeded by the first sample.
#[derive(Debug, Clone, Copy)]
pub struct TrendFilter {
    prev_co2: Option<f32>,
    trend: f32,
    alpha: f32,
}

impl Default for TrendFilter {
    fn default() -> Self {
        Self::new(TREND_ALPHA)
    }
}

impl TrendFilter {
    pub const fn new(alpha: f32) -> Self {
        Self {
            prev_co2: None,
            trend: 0.0,
            alpha,
        }
    }

    pub fn update(&mut self, co2: f32) -> TrendEstimate {
        // First sample: prev = co2 so the trend starts at zero instead of spiking.
        let prev = self.prev_co2.unwrap_or(co2);
        let estimate = update_trend(prev, co2, self.trend, self.alpha);
        self.prev_co2 = Some(co2);
        self.trend = estimate.trend;
        estimate
    }

    pub fn trend(&self) -> f32 {
        self.trend
    }
}

/// Filter state carried across sensor cycles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedState {
    pub predicted_co2: f32,
    pub trend_co2: f32,
    pub smoothed_temperature: f32,
    pub smoothed_humidity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_has_zero_trend() {
        let mut filter = TrendFilter::default();
        let estimate = filter.update(800.0);
        assert_eq!(estimate.trend, 0.0);
        assert_eq!(estimate.predicted, 800.0);
    }

    #[test]
    fn test_trend_follows_rising_co2() {
        let mut filter = TrendFilter::default();
        filter.update(600.0);
        let estimate = filter.update(700.0);
        assert_eq!(estimate.trend, 50.0);
        assert_eq!(estimate.predicted, 750.0);

        let estimate = filter.update(800.0);
        // 0.5 * 100 + 0.5 * 50
        assert_eq!(estimate.trend, 75.0);
        assert_eq!(estimate.predicted, 875.0);
    }

    #[test]
    fn test_constant_input_converges() {
        let mut filter = TrendFilter::default();
        filter.update(400.0);
        filter.update(1200.0);

        let mut estimate = filter.update(1200.0);
        for _ in 0..40 {
            estimate = filter.update(1200.0);
        }
        assert!(estimate.trend.abs() < 1e-3);
        assert!((estimate.predicted - 1200.0).abs() < 1e-3);
    }

    #[test]
    fn test_smooth_exponential_moves_by_alpha() {
        assert_eq!(smooth_exponential(20.0, 30.0, 0.2), 22.0);
        assert_eq!(smooth_exponential(20.0, 30.0, 1.0), 30.0);
        assert_eq!(smooth_exponential(20.0, 30.0, 0.0), 20.0);
    }
}
