use super::remez::{estimate_order, Remez, RemezSpec};
use crate::{
    config::BandpassSpec,
    error::{check_sample_rate, Result, SpindleError},
    signal::Waveform,
};
use log::{debug, trace};
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Linear-phase FIR bandpass designed once for a fixed sample rate.
///
/// The taps come from a Parks-McClellan equiripple design whose order is the
/// smallest even order meeting the ripple and attenuation targets of the
/// [`BandpassSpec`]. Build it once per recording rate and reuse it; it is
/// immutable and can be shared freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandpassFilter {
    fs: f64,
    spec: BandpassSpec,
    response: BandResponse,
    taps: Vec<f64>,
}

/// Measured response of a design over its pass and stop bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandResponse {
    /// Peak-to-peak passband ripple (dB).
    pub pass_ripple_db: f64,
    /// Attenuation of the loudest stopband frequency (dB).
    pub stop_atten_db: f64,
}

impl BandResponse {
    /// Evaluate `taps` on a grid of 16 points per tap across each band.
    fn measure(taps: &[f64], spec: &BandpassSpec, fs: f64) -> Self {
        let step = 1.0 / (16 * taps.len()) as f64;
        let gains = |lo: f64, hi: f64| {
            let points = ((hi - lo) / step).ceil().max(1.0) as usize;
            (0..=points)
                .map(move |i| amplitude_at(taps, lo + (hi - lo) * i as f64 / points as f64).abs())
        };
        let (pass_min, pass_max) = gains(spec.pass_low_hz / fs, spec.pass_high_hz / fs)
            .fold((f64::INFINITY, 0.0f64), |(lo, hi), g| (lo.min(g), hi.max(g)));
        let stop_max = gains(0.0, spec.stop_low_hz / fs)
            .chain(gains(spec.stop_high_hz / fs, 0.5))
            .fold(0.0f64, f64::max);
        Self {
            pass_ripple_db: 20.0 * (pass_max / pass_min).log10(),
            stop_atten_db: -20.0 * stop_max.log10(),
        }
    }

    fn meets(&self, spec: &BandpassSpec) -> bool {
        self.pass_ripple_db <= spec.pass_ripple_db && self.stop_atten_db >= spec.stop_atten_db
    }
}

impl BandpassFilter {
    /// Design the minimum-order filter for `spec` at sample rate `fs`.
    ///
    /// Starts from the Kaiser estimate of the equiripple length and adds two
    /// taps at a time until the measured response meets the targets. Each
    /// design is seeded with the previous one's extremal frequencies.
    pub fn design(spec: &BandpassSpec, fs: f64) -> Result<Self> {
        check_sample_rate(fs)?;
        spec.validate(fs)?;

        let delta_stop = 10f64.powf(-spec.stop_atten_db / 20.0);
        let gain = 10f64.powf(spec.pass_ripple_db / 20.0);
        let delta_pass = (gain - 1.0) / (gain + 1.0);
        let remez = RemezSpec::bandpass(
            spec.stop_low_hz / fs,
            spec.pass_low_hz / fs,
            spec.pass_high_hz / fs,
            spec.stop_high_hz / fs,
        )
        .with_weights(1.0, delta_pass / delta_stop);

        let estimate = estimate_order(
            spec.pass_ripple_db,
            spec.stop_atten_db,
            spec.transition_width_hz() / fs,
        );
        let max_taps = 2 * estimate + 1;
        let mut num_taps = estimate;
        let mut previous: Option<Remez> = None;
        while num_taps <= max_taps {
            let trial = remez.with_num_taps(num_taps);
            let design = match &previous {
                Some(prev) => trial.design_from(prev),
                None => trial.design(),
            };
            let response = BandResponse::measure(&design.taps, spec, fs);
            if response.meets(spec) {
                let order = design.taps.len() - 1;
                debug!(
                    "designed bandpass {:.1}-{:.1} Hz at {} Hz: order {} (estimate {}), ripple {:.3} dB, attenuation {:.1} dB, delay {} samples",
                    spec.pass_low_hz,
                    spec.pass_high_hz,
                    fs,
                    order,
                    estimate - 1,
                    response.pass_ripple_db,
                    response.stop_atten_db,
                    order / 2
                );
                return Ok(Self {
                    fs,
                    spec: *spec,
                    response,
                    taps: design.taps,
                });
            }
            trace!(
                "{} taps: ripple {:.3} dB, attenuation {:.1} dB, converged {}",
                trial.num_taps(),
                response.pass_ripple_db,
                response.stop_atten_db,
                design.converged
            );
            if design.converged {
                previous = Some(design);
            }
            num_taps = trial.num_taps() + 2;
        }
        Err(SpindleError::FilterDesign { max_taps })
    }

    pub fn fs(&self) -> f64 {
        self.fs
    }
    pub fn spec(&self) -> &BandpassSpec {
        &self.spec
    }
    /// Achieved ripple and attenuation.
    pub fn response(&self) -> &BandResponse {
        &self.response
    }
    pub fn taps(&self) -> &[f64] {
        &self.taps
    }
    pub fn order(&self) -> usize {
        self.taps.len() - 1
    }

    /// Group delay in samples: half the number of delay-line elements.
    pub fn delay(&self) -> usize {
        self.order() / 2
    }

    /// Magnitude response at `freq_hz`.
    pub fn gain_at(&self, freq_hz: f64) -> f64 {
        response_at(&self.taps, freq_hz / self.fs)
    }

    /// Filter `values` causally and compensate for the group delay.
    ///
    /// Returns the filtered samples without their first `delay` entries and the
    /// times without their last `delay` entries; both have `len - delay` samples.
    pub fn apply(&self, values: &[f64], times: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        if values.len() != times.len() {
            return Err(SpindleError::invalid(format!(
                "signal has {} values but {} times",
                values.len(),
                times.len()
            )));
        }
        let delay = self.delay();
        if values.len() <= delay {
            return Err(SpindleError::SignalTooShort {
                len: values.len(),
                delay,
            });
        }
        let filtered = causal_convolve(values, &self.taps)?;
        let kept = values.len() - delay;
        Ok((filtered[delay..].to_vec(), times[..kept].to_vec()))
    }

    /// [`apply`](Self::apply) for a waveform recorded at the design rate.
    pub fn apply_waveform(&self, wf: &Waveform) -> Result<Waveform> {
        if (wf.fs - self.fs).abs() > 1e-9 * self.fs {
            return Err(SpindleError::SampleRateMismatch {
                expected: self.fs,
                actual: wf.fs,
            });
        }
        let (values, times) = self.apply(&wf.values, &wf.times)?;
        Ok(Waveform {
            fs: wf.fs,
            times,
            values,
        })
    }
}

/// Zero-phase amplitude of a symmetric odd-length filter at `freq` (cycles/sample).
fn amplitude_at(taps: &[f64], freq: f64) -> f64 {
    let half = taps.len() / 2;
    let tail: f64 = taps[half + 1..]
        .iter()
        .enumerate()
        .map(|(m, &h)| 2.0 * h * (2.0 * PI * freq * (m + 1) as f64).cos())
        .sum();
    taps[half] + tail
}

fn response_at(taps: &[f64], freq: f64) -> f64 {
    let (mut re, mut im) = (0.0, 0.0);
    for (n, &h) in taps.iter().enumerate() {
        let w = 2.0 * PI * freq * n as f64;
        re += h * w.cos();
        im -= h * w.sin();
    }
    (re * re + im * im).sqrt()
}

/// Same-length causal convolution with zero initial state, via zero-padded real FFTs.
fn causal_convolve(signal: &[f64], taps: &[f64]) -> Result<Vec<f64>> {
    let n = signal.len();
    let fft_len = (n + taps.len() - 1).next_power_of_two().max(2);
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(fft_len);
    let c2r = planner.plan_fft_inverse(fft_len);

    let mut signal_buf = r2c.make_input_vec();
    signal_buf[..n].copy_from_slice(signal);
    let mut taps_buf = r2c.make_input_vec();
    taps_buf[..taps.len()].copy_from_slice(taps);

    let mut spectrum = r2c.make_output_vec();
    let mut taps_spectrum = r2c.make_output_vec();
    r2c.process(&mut signal_buf, &mut spectrum)?;
    r2c.process(&mut taps_buf, &mut taps_spectrum)?;

    for (s, h) in spectrum.iter_mut().zip(taps_spectrum.iter()) {
        *s *= *h;
    }
    // DC and Nyquist bins of a real signal are real.
    spectrum[0].im = 0.0;
    if let Some(last) = spectrum.last_mut() {
        last.im = 0.0;
    }

    let mut out = c2r.make_output_vec();
    c2r.process(&mut spectrum, &mut out)?;
    let scale = 1.0 / fft_len as f64;
    Ok(out[..n].iter().map(|v| v * scale).collect())
}
