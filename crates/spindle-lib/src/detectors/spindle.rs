use crate::{
    analytic::{phase_increments, Analytic},
    config::SpindleConfig,
    error::{Result, SpindleError},
    filter::BandpassFilter,
    runs::{self, RunLengths},
    signal::Waveform,
    stats::nan_median,
};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// One detected spindle, spanning samples `start_sample..=end_sample`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpindleEvent {
    /// 1-based position in temporal order; matches the label array.
    pub index: usize,
    pub start_sample: usize,
    pub end_sample: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub amp: Vec<f64>,
    pub phase: Vec<f64>,
    pub median_amp: f64,
    /// Unwrapped phase advance over the event (radians).
    pub sum_phase: f64,
    pub n_cycles: f64,
}

impl SpindleEvent {
    fn from_span(
        index: usize,
        start: usize,
        end: usize,
        fs: f64,
        analytic: &Analytic,
        phase_diff: &[f64],
    ) -> Self {
        let start_time = start as f64 / fs;
        let end_time = end as f64 / fs;
        let amp = analytic.amplitude[start..=end].to_vec();
        let median_amp = nan_median(&amp).unwrap_or(f64::NAN);
        let sum_phase: f64 = phase_diff[start..=end].iter().sum();
        Self {
            index,
            start_sample: start,
            end_sample: end,
            start_time,
            end_time,
            duration: end_time - start_time,
            phase: analytic.phase[start..=end].to_vec(),
            amp,
            median_amp,
            sum_phase,
            n_cycles: sum_phase / (2.0 * PI),
        }
    }
}

/// Everything the detector computed, aligned sample-for-sample with `times`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpindleResult {
    pub fs: f64,
    /// Input times trimmed by the filter delay.
    pub times: Vec<f64>,
    pub filtered: Vec<f64>,
    pub amplitude: Vec<f64>,
    pub phase: Vec<f64>,
    pub phase_diff: Vec<f64>,
    pub threshold: f64,
    pub min_samples: usize,
    /// Mask after minimum-duration enforcement.
    pub mask: Vec<bool>,
    pub runs: RunLengths,
    /// Event index per sample, 0 outside events.
    pub labels: Vec<usize>,
    pub events: Vec<SpindleEvent>,
}

impl SpindleResult {
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

/// Spindle detector bound to one sample rate; the filter design is reused
/// across calls.
#[derive(Debug, Clone)]
pub struct SpindleDetector {
    config: SpindleConfig,
    filter: BandpassFilter,
}

impl SpindleDetector {
    pub fn new(config: SpindleConfig, fs: f64) -> Result<Self> {
        config.validate()?;
        let filter = BandpassFilter::design(&config.band, fs)?;
        Ok(Self { config, filter })
    }

    /// Reuse an existing filter design; its band replaces `config.band`.
    pub fn with_filter(mut config: SpindleConfig, filter: BandpassFilter) -> Result<Self> {
        config.validate()?;
        config.band = *filter.spec();
        Ok(Self { config, filter })
    }

    pub fn fs(&self) -> f64 {
        self.filter.fs()
    }
    pub fn config(&self) -> &SpindleConfig {
        &self.config
    }
    pub fn filter(&self) -> &BandpassFilter {
        &self.filter
    }

    pub fn min_samples(&self) -> usize {
        min_duration_samples(self.fs(), self.config.min_length_s)
    }

    pub fn detect_waveform(&self, wf: &Waveform) -> Result<SpindleResult> {
        if (wf.fs - self.fs()).abs() > 1e-9 * self.fs() {
            return Err(SpindleError::SampleRateMismatch {
                expected: self.fs(),
                actual: wf.fs,
            });
        }
        self.detect(&wf.values, &wf.times)
    }

    /// Filter, threshold the envelope, enforce the minimum duration and
    /// segment the mask into complete events.
    pub fn detect(&self, values: &[f64], times: &[f64]) -> Result<SpindleResult> {
        if values.is_empty() {
            return Err(SpindleError::invalid("cannot detect spindles in an empty signal"));
        }
        let fs = self.fs();
        let (filtered, times) = self.filter.apply(values, times)?;
        let analytic = Analytic::from_signal(&filtered)?;
        let phase_diff = phase_increments(&analytic.phase);

        let threshold = match nan_median(&analytic.amplitude) {
            Some(median) => self.config.threshold_multiplier * median,
            None => {
                warn!("amplitude envelope has no defined median; no samples can cross threshold");
                f64::NAN
            }
        };
        let above: Vec<bool> = analytic.amplitude.iter().map(|&a| a > threshold).collect();

        let min_samples = self.min_samples();
        let mask = enforce_min_duration(&above, min_samples)?;
        let runs = runs::encode(&mask, false)?;

        let spans = segment_events(&mask);
        let mut labels = vec![0usize; mask.len()];
        let mut events = Vec::with_capacity(spans.len());
        for (k, &(start, end)) in spans.iter().enumerate() {
            let index = k + 1;
            labels[start..=end].fill(index);
            events.push(SpindleEvent::from_span(
                index,
                start,
                end,
                fs,
                &analytic,
                &phase_diff,
            ));
        }

        debug!(
            "spindle detection: {} samples, threshold {:.4}, min run {} samples, {} events",
            mask.len(),
            threshold,
            min_samples,
            events.len()
        );

        let Analytic { amplitude, phase } = analytic;
        Ok(SpindleResult {
            fs,
            times,
            filtered,
            amplitude,
            phase,
            phase_diff,
            threshold,
            min_samples,
            mask,
            runs,
            labels,
            events,
        })
    }
}

/// Run detection with the default band and threshold; designs the filter on
/// every call. Build a [`SpindleDetector`] to reuse the design.
pub fn detect_spindles(
    values: &[f64],
    times: &[f64],
    fs: f64,
    min_length_s: f64,
) -> Result<SpindleResult> {
    let cfg = SpindleConfig {
        min_length_s,
        ..SpindleConfig::default()
    };
    detect_spindles_with_config(values, times, fs, &cfg)
}

pub fn detect_spindles_with_config(
    values: &[f64],
    times: &[f64],
    fs: f64,
    cfg: &SpindleConfig,
) -> Result<SpindleResult> {
    SpindleDetector::new(*cfg, fs)?.detect(values, times)
}

pub fn min_duration_samples(fs: f64, min_length_s: f64) -> usize {
    (fs * min_length_s).round() as usize
}

/// Drop true runs shorter than `min_samples`, then fill false runs shorter
/// than `min_samples` in the result.
pub fn enforce_min_duration(mask: &[bool], min_samples: usize) -> Result<Vec<bool>> {
    let rl = runs::encode(mask, false)?;
    let short = rl.is_short(mask, true, min_samples);
    let pruned: Vec<bool> = mask.iter().zip(&short).map(|(&m, &s)| m && !s).collect();
    trace!(
        "min-duration pass 1: {} -> {} true samples",
        count_true(mask),
        count_true(&pruned)
    );

    let rl = runs::encode(&pruned, false)?;
    let gaps = rl.is_short(&pruned, false, min_samples);
    let filled: Vec<bool> = pruned.iter().zip(&gaps).map(|(&m, &g)| m || g).collect();
    trace!(
        "min-duration pass 2: {} -> {} true samples",
        count_true(&pruned),
        count_true(&filled)
    );
    Ok(filled)
}

fn count_true(mask: &[bool]) -> usize {
    mask.iter().filter(|&&m| m).count()
}

/// Inclusive `(first, last)` sample spans of the true runs that both start and
/// end inside the mask. Runs touching either end are truncated and skipped.
pub fn segment_events(mask: &[bool]) -> Vec<(usize, usize)> {
    let mut rising = Vec::new();
    let mut falling = Vec::new();
    for (i, w) in mask.windows(2).enumerate() {
        match (w[0], w[1]) {
            (false, true) => rising.push(i + 1),
            (true, false) => falling.push(i),
            _ => {}
        }
    }

    let mut rising = rising.as_slice();
    let mut falling = falling.as_slice();
    if let (Some(&fall), Some(&rise)) = (falling.first(), rising.first()) {
        if fall < rise {
            falling = &falling[1..];
        }
    }
    if let (Some(&fall), Some(&rise)) = (falling.last(), rising.last()) {
        if fall < rise {
            rising = &rising[..rising.len() - 1];
        }
    }
    rising.iter().copied().zip(falling.iter().copied()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_of(bits: &str) -> Vec<bool> {
        bits.chars().map(|c| c == '1').collect()
    }

    #[test]
    fn short_detection_is_suppressed() {
        let mask = mask_of("000001100000");
        let out = enforce_min_duration(&mask, 3).unwrap();
        assert!(out.iter().all(|&m| !m));
    }

    #[test]
    fn short_gap_is_filled_into_one_event() {
        let mask = mask_of("00000111100111100000");
        let out = enforce_min_duration(&mask, 3).unwrap();
        assert_eq!(out, mask_of("00000111111111100000"));
        assert_eq!(segment_events(&out), vec![(5, 14)]);
    }

    #[test]
    fn suppression_happens_before_gap_filling() {
        // The lone 1 disappears first, so the 5-sample gap it split stays open.
        let mask = mask_of("0000111100100111100000");
        let out = enforce_min_duration(&mask, 3).unwrap();
        assert_eq!(out, mask_of("0000111100000111100000"));
        assert_eq!(segment_events(&out), vec![(4, 7), (13, 16)]);
    }

    #[test]
    fn zero_min_duration_is_identity() {
        let mask = mask_of("0101100010");
        assert_eq!(enforce_min_duration(&mask, 0).unwrap(), mask);
    }

    #[test]
    fn leading_truncated_event_is_dropped() {
        let mask = mask_of("11111000001111100000");
        assert_eq!(segment_events(&mask), vec![(10, 14)]);
    }

    #[test]
    fn trailing_truncated_event_is_dropped() {
        let mask = mask_of("00000111110000011111");
        assert_eq!(segment_events(&mask), vec![(5, 9)]);
    }

    #[test]
    fn both_ends_truncated() {
        let mask = mask_of("1100111000111");
        assert_eq!(segment_events(&mask), vec![(4, 6)]);
        let mask = mask_of("1110000111");
        assert!(segment_events(&mask).is_empty());
    }

    #[test]
    fn constant_masks_have_no_events() {
        assert!(segment_events(&[true; 10]).is_empty());
        assert!(segment_events(&[false; 10]).is_empty());
        assert!(segment_events(&[true]).is_empty());
    }

    #[test]
    fn single_sample_event() {
        assert_eq!(segment_events(&mask_of("010")), vec![(1, 1)]);
    }

    #[test]
    fn min_samples_rounds() {
        assert_eq!(min_duration_samples(200.0, 0.5), 100);
        assert_eq!(min_duration_samples(256.0, 0.3), 77);
        assert_eq!(min_duration_samples(250.0, 0.0), 0);
    }

    #[test]
    fn silent_signal_has_no_events() {
        let fs = 200.0;
        let n = 2000;
        let times: Vec<f64> = (0..n).map(|i| i as f64 / fs).collect();
        let result = detect_spindles(&vec![0.0; n], &times, fs, 0.5).unwrap();
        assert_eq!(result.event_count(), 0);
        assert!(result.labels.iter().all(|&l| l == 0));
        assert_eq!(result.labels.len(), result.times.len());
        assert_eq!(result.runs.run_count(), 1);
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        let fs = 200.0;
        let values = vec![0.0; 1000];
        let times: Vec<f64> = (0..1000).map(|i| i as f64 / fs).collect();
        assert!(matches!(
            detect_spindles(&values, &times, fs, -0.1),
            Err(SpindleError::InvalidArgument(_))
        ));
        assert!(matches!(
            detect_spindles(&values, &times, 0.0, 0.5),
            Err(SpindleError::InvalidArgument(_))
        ));
        assert!(matches!(
            detect_spindles(&values, &times[..999], fs, 0.5),
            Err(SpindleError::InvalidArgument(_))
        ));
        assert!(matches!(
            detect_spindles(&[], &[], fs, 0.5),
            Err(SpindleError::InvalidArgument(_))
        ));
        assert!(matches!(
            detect_spindles(&values[..150], &times[..150], fs, 0.5),
            Err(SpindleError::SignalTooShort { .. })
        ));
    }

    #[test]
    fn detector_rejects_other_sample_rates() {
        let detector = SpindleDetector::new(SpindleConfig::default(), 200.0).unwrap();
        let wf = Waveform::from_values(250.0, vec![0.0; 2000]).unwrap();
        assert!(matches!(
            detector.detect_waveform(&wf),
            Err(SpindleError::SampleRateMismatch { .. })
        ));
    }

    #[test]
    fn shared_filter_keeps_its_band() {
        let spec = crate::config::BandpassSpec {
            stop_low_hz: 10.0,
            pass_low_hz: 11.0,
            pass_high_hz: 15.0,
            stop_high_hz: 16.0,
            ..Default::default()
        };
        let filter = BandpassFilter::design(&spec, 200.0).unwrap();
        let detector = SpindleDetector::with_filter(SpindleConfig::default(), filter).unwrap();
        assert_eq!(detector.config().band, spec);
        assert_eq!(detector.min_samples(), 100);
    }
}
