use thiserror::Error;

pub type Result<T> = std::result::Result<T, SpindleError>;

/// Errors raised by the spindle pipeline.
///
/// Detections that find nothing are not errors; they return an empty event list.
#[derive(Error, Debug)]
pub enum SpindleError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cannot run-length encode an empty mask")]
    EmptyMask,

    #[error("signal of {len} samples is not longer than the filter delay of {delay} samples")]
    SignalTooShort { len: usize, delay: usize },

    /// The filter design only holds for the sample rate it was built for.
    #[error("filter designed for {expected} Hz, got a {actual} Hz waveform")]
    SampleRateMismatch { expected: f64, actual: f64 },

    #[error("fft failed: {0}")]
    Fft(#[from] realfft::FftError),

    #[error("no filter up to {max_taps} taps meets the band targets")]
    FilterDesign { max_taps: usize },

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),
}

impl SpindleError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SpindleError::InvalidArgument(msg.into())
    }
}

pub(crate) fn check_sample_rate(fs: f64) -> Result<()> {
    if fs.is_finite() && fs > 0.0 {
        Ok(())
    } else {
        Err(SpindleError::invalid(format!(
            "sample rate must be positive and finite, got {fs}"
        )))
    }
}
