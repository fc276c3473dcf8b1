//! Analytic-signal helpers: Hilbert transform, envelope, phase and phase
//! unwrapping.
//!
//! The transform works on the whole record at once, so expect edge effects in
//! the first and last few cycles. Inputs should already be narrowband.

use crate::error::Result;
use realfft::{num_complex::Complex, RealFftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Instantaneous amplitude and wrapped phase of a real signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytic {
    pub amplitude: Vec<f64>,
    /// Wrapped phase in `[-π, π]`.
    pub phase: Vec<f64>,
}

impl Analytic {
    pub fn from_signal(signal: &[f64]) -> Result<Self> {
        let z = analytic_signal(signal)?;
        Ok(Self {
            amplitude: z.iter().map(|c| c.norm()).collect(),
            phase: z.iter().map(|c| c.arg()).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.amplitude.len()
    }
    pub fn is_empty(&self) -> bool {
        self.amplitude.is_empty()
    }
}

/// FFT-based analytic signal `x + j·H{x}`.
///
/// Equivalent to keeping DC (and Nyquist), doubling the positive frequencies
/// and zeroing the negative ones. The Hilbert transform is taken through a
/// real inverse FFT of `-j·sign(k)·X[k]`, so the real part is the input itself.
pub fn analytic_signal(signal: &[f64]) -> Result<Vec<Complex<f64>>> {
    let n = signal.len();
    if n < 2 {
        return Ok(signal.iter().map(|&x| Complex::new(x, 0.0)).collect());
    }
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n);
    let c2r = planner.plan_fft_inverse(n);

    let mut input = r2c.make_input_vec();
    input.copy_from_slice(signal);
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut input, &mut spectrum)?;

    // Odd lengths have no Nyquist bin, so the last bin is still a positive frequency.
    let positive_end = if n % 2 == 0 { n / 2 } else { n / 2 + 1 };
    for (k, bin) in spectrum.iter_mut().enumerate() {
        *bin = if k > 0 && k < positive_end {
            Complex::new(bin.im, -bin.re)
        } else {
            Complex::new(0.0, 0.0)
        };
    }

    let mut hilbert = c2r.make_output_vec();
    c2r.process(&mut spectrum, &mut hilbert)?;
    let scale = 1.0 / n as f64;
    Ok(signal
        .iter()
        .zip(&hilbert)
        .map(|(&x, &h)| Complex::new(x, h * scale))
        .collect())
}

/// Remove 2π jumps between consecutive phase samples.
pub fn unwrap_phase(phase: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(phase.len());
    let mut correction = 0.0;
    let mut prev: Option<f64> = None;
    for &p in phase {
        if let Some(last) = prev {
            let diff = p - last;
            if diff > PI {
                correction -= 2.0 * PI * ((diff + PI) / (2.0 * PI)).floor();
            } else if diff < -PI {
                correction += 2.0 * PI * ((-diff + PI) / (2.0 * PI)).floor();
            }
        }
        out.push(p + correction);
        prev = Some(p);
    }
    out
}

/// Sample-to-sample difference of the unwrapped phase, with a leading zero so
/// the output matches the input length.
pub fn phase_increments(phase: &[f64]) -> Vec<f64> {
    let unwrapped = unwrap_phase(phase);
    let mut out = Vec::with_capacity(unwrapped.len());
    if !unwrapped.is_empty() {
        out.push(0.0);
    }
    out.extend(unwrapped.windows(2).map(|w| w[1] - w[0]));
    out
}
