//! Two-state Kalman filter used to smooth noisy telemetry and estimate
//! trend (the "velocity" state) for the decision engine's predictive
//! triggers — SINR/RSRP drift, obstruction acceleration, and the like.
//!
//! State vector: `[value, velocity]`. The velocity component lets a
//! trigger fire on a worsening trend before the reactive score alone
//! would cross its threshold.

/// A two-state Kalman filter: `[value, velocity]`.
#[derive(Debug, Clone)]
pub struct TrendFilter {
    x: f64,
    v: f64,

    p00: f64,
    p01: f64,
    p11: f64,

    q_value: f64,
    q_velocity: f64,
    r: f64,

    initialized: bool,
}

/// Tuning for a [`TrendFilter`] instance.
#[derive(Debug, Clone, Copy)]
pub struct TrendConfig {
    /// Process noise for the value state. Higher = more reactive to changes.
    pub q_value: f64,
    /// Process noise for the velocity state.
    pub q_velocity: f64,
    /// Measurement noise variance. Higher = smoother output, more lag.
    pub r: f64,
}

impl TrendConfig {
    /// Suitable for signal-strength metrics in dBm/dB (RSRP, RSRQ, SINR, SNR).
    pub fn for_signal() -> Self {
        TrendConfig {
            q_value: 1.0,
            q_velocity: 0.2,
            r: 5.0,
        }
    }

    /// Suitable for percentage metrics (obstruction %, loss %).
    pub fn for_percentage() -> Self {
        TrendConfig {
            q_value: 0.2,
            q_velocity: 0.05,
            r: 2.0,
        }
    }

    /// Suitable for latency/RTT-style values in milliseconds.
    pub fn for_latency() -> Self {
        TrendConfig {
            q_value: 0.5,
            q_velocity: 0.1,
            r: 10.0,
        }
    }
}

impl TrendFilter {
    pub fn new(config: &TrendConfig) -> Self {
        TrendFilter {
            x: 0.0,
            v: 0.0,
            p00: 1000.0,
            p01: 0.0,
            p11: 1000.0,
            q_value: config.q_value,
            q_velocity: config.q_velocity,
            r: config.r,
            initialized: false,
        }
    }

    pub fn value(&self) -> f64 {
        self.x
    }

    pub fn velocity(&self) -> f64 {
        self.v
    }

    pub fn is_increasing(&self) -> bool {
        self.v > 0.0
    }

    pub fn uncertainty(&self) -> f64 {
        self.p00.sqrt()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn predict(&mut self) {
        self.x += self.v;

        let new_p00 = self.p00 + 2.0 * self.p01 + self.p11 + self.q_value;
        let new_p01 = self.p01 + self.p11 + self.q_velocity;
        let new_p11 = self.p11 + self.q_velocity;

        self.p00 = new_p00;
        self.p01 = new_p01;
        self.p11 = new_p11;
    }

    /// Incorporate a new measurement.
    pub fn update(&mut self, measurement: f64) {
        if !self.initialized {
            self.x = measurement;
            self.v = 0.0;
            self.initialized = true;
            return;
        }

        self.predict();

        let y = measurement - self.x;
        let s = self.p00 + self.r;
        let k0 = self.p00 / s;
        let k1 = self.p01 / s;

        self.x += k0 * y;
        self.v += k1 * y;

        let new_p00 = self.p00 - k0 * self.p00;
        let new_p01 = self.p01 - k0 * self.p01;
        let new_p11 = self.p11 - k1 * self.p01;

        self.p00 = new_p00;
        self.p01 = new_p01;
        self.p11 = new_p11;
    }

    /// Predict the value `steps` ticks ahead without mutating state.
    pub fn predict_ahead(&self, steps: u32) -> f64 {
        self.x + self.v * steps as f64
    }

    pub fn reset(&mut self) {
        self.x = 0.0;
        self.v = 0.0;
        self.p00 = 1000.0;
        self.p01 = 0.0;
        self.p11 = 1000.0;
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_measurement_sets_value() {
        let mut f = TrendFilter::new(&TrendConfig::for_signal());
        assert!(!f.is_initialized());
        f.update(-90.0);
        assert!(f.is_initialized());
        assert!((f.value() - (-90.0)).abs() < 0.01);
    }

    #[test]
    fn detects_degrading_trend() {
        let mut f = TrendFilter::new(&TrendConfig::for_signal());
        for i in 0..20 {
            f.update(-70.0 - i as f64);
        }
        assert!(!f.is_increasing());
        assert!(f.velocity() < -0.5, "velocity = {}", f.velocity());
    }

    #[test]
    fn predict_ahead_extrapolates_trend() {
        let mut f = TrendFilter::new(&TrendConfig::for_percentage());
        for i in 0..15 {
            f.update(i as f64 * 1.5);
        }
        let current = f.value();
        let future = f.predict_ahead(5);
        assert!(future > current);
    }

    #[test]
    fn reset_clears_state() {
        let mut f = TrendFilter::new(&TrendConfig::for_latency());
        f.update(40.0);
        f.update(45.0);
        f.reset();
        assert!(!f.is_initialized());
        assert!((f.value() - 0.0).abs() < 0.01);
    }
}
