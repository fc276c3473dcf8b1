use crate::error::{check_sample_rate, Result, SpindleError};
use serde::{Deserialize, Serialize};

/// Sampled waveform with explicit sample times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    /// Nominal sampling frequency in Hz
    pub fs: f64,
    /// Sample times (seconds)
    pub times: Vec<f64>,
    /// Samples
    pub values: Vec<f64>,
}

impl Waveform {
    pub fn new(fs: f64, times: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        check_sample_rate(fs)?;
        if times.len() != values.len() {
            return Err(SpindleError::invalid(format!(
                "waveform has {} times but {} values",
                times.len(),
                values.len()
            )));
        }
        Ok(Self { fs, times, values })
    }

    /// Uniformly sampled waveform starting at t = 0.
    pub fn from_values(fs: f64, values: Vec<f64>) -> Result<Self> {
        check_sample_rate(fs)?;
        let times = (0..values.len()).map(|i| i as f64 / fs).collect();
        Ok(Self { fs, times, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.values.len() as f64 / self.fs
    }
}
