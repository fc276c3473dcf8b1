use crate::error::{Result, SpindleError};
use serde::{Deserialize, Serialize};

/// Band edges and ripple targets for the spindle bandpass (Hz / dB).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandpassSpec {
    /// Upper edge of the lower stopband.
    pub stop_low_hz: f64,
    /// Lower edge of the passband.
    pub pass_low_hz: f64,
    /// Upper edge of the passband.
    pub pass_high_hz: f64,
    /// Lower edge of the upper stopband.
    pub stop_high_hz: f64,
    /// Minimum attenuation in both stopbands.
    pub stop_atten_db: f64,
    /// Peak-to-peak passband ripple.
    pub pass_ripple_db: f64,
}

impl Default for BandpassSpec {
    fn default() -> Self {
        Self {
            stop_low_hz: 11.0,
            pass_low_hz: 12.0,
            pass_high_hz: 14.0,
            stop_high_hz: 15.0,
            stop_atten_db: 60.0,
            pass_ripple_db: 1.0,
        }
    }
}

impl BandpassSpec {
    /// Check edge ordering and ripple targets; these hold at any sample rate.
    pub fn validate_edges(&self) -> Result<()> {
        let edges = [
            self.stop_low_hz,
            self.pass_low_hz,
            self.pass_high_hz,
            self.stop_high_hz,
        ];
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(SpindleError::invalid("band edges must be finite"));
        }
        let ordered = edges[0] > 0.0 && edges.windows(2).all(|w| w[0] < w[1]);
        if !ordered {
            return Err(SpindleError::invalid(format!(
                "band edges must satisfy 0 < stop_low < pass_low < pass_high < stop_high, got {edges:?}"
            )));
        }
        let targets_ok = self.stop_atten_db.is_finite()
            && self.stop_atten_db > 0.0
            && self.pass_ripple_db.is_finite()
            && self.pass_ripple_db > 0.0;
        if !targets_ok {
            return Err(SpindleError::invalid(
                "stopband attenuation and passband ripple must be positive",
            ));
        }
        Ok(())
    }

    /// [`validate_edges`](Self::validate_edges) plus the Nyquist limit at `fs`.
    pub fn validate(&self, fs: f64) -> Result<()> {
        self.validate_edges()?;
        if self.stop_high_hz >= fs * 0.5 {
            return Err(SpindleError::invalid(format!(
                "upper stopband edge {} Hz is not below Nyquist ({} Hz)",
                self.stop_high_hz,
                fs * 0.5
            )));
        }
        Ok(())
    }

    /// Width of the narrower of the two transition bands.
    pub fn transition_width_hz(&self) -> f64 {
        (self.pass_low_hz - self.stop_low_hz).min(self.stop_high_hz - self.pass_high_hz)
    }
}

/// Configurable parameters for spindle detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpindleConfig {
    pub band: BandpassSpec,
    /// Detection threshold as a multiple of the median amplitude envelope.
    pub threshold_multiplier: f64,
    /// Minimum sustained duration for both detections and gaps (seconds).
    pub min_length_s: f64,
}

impl Default for SpindleConfig {
    fn default() -> Self {
        Self {
            band: BandpassSpec::default(),
            threshold_multiplier: 2.0,
            min_length_s: 0.5,
        }
    }
}

impl SpindleConfig {
    /// Parse a TOML table; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: SpindleConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks that do not depend on the sample rate.
    pub fn validate(&self) -> Result<()> {
        self.band.validate_edges()?;
        if !(self.threshold_multiplier.is_finite() && self.threshold_multiplier > 0.0) {
            return Err(SpindleError::invalid(format!(
                "threshold multiplier must be positive, got {}",
                self.threshold_multiplier
            )));
        }
        check_min_length(self.min_length_s)
    }
}

fn check_min_length(min_length_s: f64) -> Result<()> {
    if min_length_s.is_finite() && min_length_s >= 0.0 {
        Ok(())
    } else {
        Err(SpindleError::invalid(format!(
            "minimum length must be non-negative, got {min_length_s}"
        )))
    }
}
