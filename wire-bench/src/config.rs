//! Scan and search parameters with bench defaults.

use std::time::Duration;

use crate::error::ScanError;

/// Parameters of a single wire scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Total sweep length in mm, centered on the pair's current position.
    pub span_mm: f64,
    /// Sweep velocity in mm/s.
    pub speed_mm_s: f64,
    /// Stretched-wire length between the stage ends, in mm. Enters the
    /// second-integral scale factor.
    pub wire_length_mm: f64,
    /// Interval between position/voltage samples during the sweep.
    pub poll_interval: Duration,
    /// Pause between reaching the sweep start and starting the sweep, so the
    /// controller registers the stop.
    pub settle: Duration,
    /// Bounded wait on the initial offset move.
    pub motion_end_timeout: Duration,
    /// Slack added to the nominal sweep duration before the sweep is
    /// declared stuck.
    pub timeout_margin: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            span_mm: 10.0,
            speed_mm_s: 5.0,
            wire_length_mm: 2.0,
            poll_interval: Duration::from_millis(100),
            settle: Duration::from_millis(200),
            motion_end_timeout: Duration::from_secs(20),
            timeout_margin: Duration::from_secs(10),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ScanError> {
        if !(self.span_mm.is_finite() && self.span_mm > 0.0) {
            return Err(ScanError::InvalidConfig(format!(
                "span must be positive and finite, got {}",
                self.span_mm
            )));
        }
        if !(self.speed_mm_s.is_finite() && self.speed_mm_s > 0.0) {
            return Err(ScanError::InvalidConfig(format!(
                "speed must be positive and finite, got {}",
                self.speed_mm_s
            )));
        }
        if !(self.wire_length_mm.is_finite() && self.wire_length_mm > 0.0) {
            return Err(ScanError::InvalidConfig(format!(
                "wire length must be positive and finite, got {}",
                self.wire_length_mm
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(ScanError::InvalidConfig(
                "poll interval must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Wall-clock budget for the sweep: 1.5x the nominal duration plus the
    /// configured margin.
    pub fn sweep_budget(&self) -> Duration {
        Duration::from_secs_f64(1.5 * self.span_mm / self.speed_mm_s) + self.timeout_margin
    }
}

/// Parameters of the full magnetic-axis search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub scan: ScanConfig,
    /// An iteration converges when every axis moved less than this between
    /// its start and end snapshots, in mm.
    pub convergence_threshold_mm: f64,
    pub max_iterations: u32,
    /// Bounded wait on each centering move.
    pub centering_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            scan: ScanConfig::default(),
            convergence_threshold_mm: 0.005,
            max_iterations: 3,
            centering_timeout: Duration::from_secs(30),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ScanError> {
        self.scan.validate()?;
        if !(self.convergence_threshold_mm.is_finite() && self.convergence_threshold_mm > 0.0) {
            return Err(ScanError::InvalidConfig(format!(
                "convergence threshold must be positive and finite, got {}",
                self.convergence_threshold_mm
            )));
        }
        if self.max_iterations == 0 {
            return Err(ScanError::InvalidConfig(
                "max iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn default_values() {
        let config = ScanConfig::default();
        assert_abs_diff_eq!(config.span_mm, 10.0);
        assert_abs_diff_eq!(config.speed_mm_s, 5.0);
        assert_abs_diff_eq!(config.wire_length_mm, 2.0);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.settle, Duration::from_millis(200));
        assert_eq!(config.motion_end_timeout, Duration::from_secs(20));

        let search = SearchConfig::default();
        assert_abs_diff_eq!(search.convergence_threshold_mm, 0.005);
        assert_eq!(search.max_iterations, 3);
        assert_eq!(search.centering_timeout, Duration::from_secs(30));
    }

    #[test]
    fn sweep_budget_scales_with_span_and_speed() {
        let config = ScanConfig {
            span_mm: 10.0,
            speed_mm_s: 5.0,
            timeout_margin: Duration::from_secs(10),
            ..ScanConfig::default()
        };
        // 1.5 * 10 / 5 = 3 s nominal, plus the 10 s margin.
        assert_eq!(config.sweep_budget(), Duration::from_secs(13));
    }

    #[test]
    fn validation_rejects_degenerate_parameters() {
        let mut config = ScanConfig::default();
        config.speed_mm_s = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ScanError::InvalidConfig(_))
        ));

        let mut config = ScanConfig::default();
        config.span_mm = -1.0;
        assert!(config.validate().is_err());

        let mut search = SearchConfig::default();
        search.max_iterations = 0;
        assert!(search.validate().is_err());
    }
}
