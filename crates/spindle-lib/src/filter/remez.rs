//! Parks-McClellan equiripple design for symmetric, odd-length bandpass filters.
//!
//! Frequencies are normalised to cycles per sample (0 to 0.5). The exchange runs
//! on a dense grid in `x = cos(2πf)`, where the amplitude response of a type I
//! filter is a polynomial, and fits that polynomial by barycentric Lagrange
//! interpolation through the current extremal set. Taps are recovered by
//! sampling the final amplitude response at `num_taps` equispaced frequencies
//! and taking the inverse DFT.
//!
//! Long narrowband designs are badly conditioned from a uniform starting
//! reference. [`RemezSpec::design_from`] seeds the exchange with the converged
//! reference of a shorter design instead, which is how the minimum-order search
//! in [`BandpassFilter`](super::BandpassFilter) steps through tap counts.

use log::trace;
use std::f64::consts::PI;

/// Maximum exchange iterations.
const MAX_ITERATIONS: usize = 40;

/// Relative gap between the peak grid error and |δ| at which the exchange stops.
const CONVERGENCE_THRESHOLD: f64 = 1e-5;

/// Grid points per cosine coefficient.
const GRID_DENSITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Band {
    lo: f64,
    hi: f64,
    desired: f64,
    weight: f64,
}

/// Specification for an equiripple bandpass design.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RemezSpec {
    num_taps: usize,
    bands: [Band; 3],
}

/// Result of one exchange run.
#[derive(Debug, Clone)]
pub(crate) struct Remez {
    pub taps: Vec<f64>,
    /// Peak weighted error of the final reference.
    pub delta: f64,
    /// Final reference frequencies (cycles/sample), ascending.
    pub extremals: Vec<f64>,
    pub converged: bool,
}

impl RemezSpec {
    /// Bandpass with stopbands `[0, stop1]`, `[stop2, 0.5]` and passband
    /// `[pass1, pass2]`. Edges must satisfy `0 < stop1 < pass1 < pass2 < stop2 < 0.5`.
    pub fn bandpass(stop1: f64, pass1: f64, pass2: f64, stop2: f64) -> Self {
        Self {
            num_taps: 63,
            bands: [
                Band {
                    lo: 0.0,
                    hi: stop1,
                    desired: 0.0,
                    weight: 1.0,
                },
                Band {
                    lo: pass1,
                    hi: pass2,
                    desired: 1.0,
                    weight: 1.0,
                },
                Band {
                    lo: stop2,
                    hi: 0.5,
                    desired: 0.0,
                    weight: 1.0,
                },
            ],
        }
    }

    /// Number of taps, rounded up to odd so the filter is type I.
    pub fn with_num_taps(mut self, num_taps: usize) -> Self {
        self.num_taps = if num_taps % 2 == 0 {
            num_taps + 1
        } else {
            num_taps
        }
        .max(3);
        self
    }

    /// Higher weight means smaller ripple in that band.
    pub fn with_weights(mut self, passband_weight: f64, stopband_weight: f64) -> Self {
        self.bands[0].weight = stopband_weight;
        self.bands[1].weight = passband_weight;
        self.bands[2].weight = stopband_weight;
        self
    }

    pub fn num_taps(&self) -> usize {
        self.num_taps
    }

    /// Design from a reference spread uniformly over the grid.
    pub fn design(&self) -> Remez {
        let grid = Grid::new(&self.bands, self.num_coeffs());
        let count = self.num_coeffs() + 1;
        let reference = (0..count)
            .map(|i| i * (grid.len() - 1) / (count - 1))
            .collect();
        self.exchange(&grid, reference)
    }

    /// Design starting from the reference of an earlier design of the same bands.
    pub fn design_from(&self, previous: &Remez) -> Remez {
        let grid = Grid::new(&self.bands, self.num_coeffs());
        let reference = seed_reference(&grid, &previous.extremals, self.num_coeffs() + 1);
        self.exchange(&grid, reference)
    }

    fn num_coeffs(&self) -> usize {
        self.num_taps / 2 + 1
    }

    fn exchange(&self, grid: &Grid, mut extremals: Vec<usize>) -> Remez {
        let count = self.num_coeffs() + 1;
        let mut fit = Fit::new(grid, &extremals);
        let mut converged = false;
        for iteration in 0..MAX_ITERATIONS {
            let error = compute_error(grid, &fit);
            let peak = error.iter().fold(0.0f64, |m, e| m.max(e.abs()));
            let delta = fit.delta.abs();
            trace!(
                "remez {} taps, iteration {iteration}: delta {delta:.4e}, peak {peak:.4e}",
                self.num_taps
            );
            if peak - delta <= CONVERGENCE_THRESHOLD * peak {
                converged = true;
                break;
            }
            let Some(next) = find_extremals(grid, &error, delta, count) else {
                break;
            };
            let next_fit = Fit::new(grid, &next);
            // |δ| never decreases across an exact exchange; a drop is round-off.
            if next_fit.delta.abs() < delta {
                break;
            }
            extremals = next;
            fit = next_fit;
        }
        Remez {
            taps: compute_coefficients(&fit, self.num_taps),
            delta: fit.delta.abs(),
            extremals: extremals.iter().map(|&i| grid.freq[i]).collect(),
            converged,
        }
    }
}

/// Dense frequency grid restricted to the bands, with the target response.
struct Grid {
    freq: Vec<f64>,
    x: Vec<f64>,
    desired: Vec<f64>,
    weight: Vec<f64>,
    band: Vec<usize>,
}

impl Grid {
    fn new(bands: &[Band], num_coeffs: usize) -> Self {
        let mut density = GRID_DENSITY;
        loop {
            let grid = Self::with_density(bands, num_coeffs, density);
            if grid.len() >= 2 * (num_coeffs + 1) {
                return grid;
            }
            density *= 2;
        }
    }

    fn with_density(bands: &[Band], num_coeffs: usize, density: usize) -> Self {
        let spacing = 0.5 / (density * num_coeffs) as f64;
        let mut grid = Grid {
            freq: Vec::new(),
            x: Vec::new(),
            desired: Vec::new(),
            weight: Vec::new(),
            band: Vec::new(),
        };
        for (index, band) in bands.iter().enumerate() {
            let steps = ((band.hi - band.lo) / spacing).ceil().max(1.0) as usize;
            for i in 0..=steps {
                let f = band.lo + (band.hi - band.lo) * i as f64 / steps as f64;
                grid.freq.push(f);
                grid.x.push((2.0 * PI * f).cos());
                grid.desired.push(band.desired);
                grid.weight.push(band.weight);
                grid.band.push(index);
            }
        }
        grid
    }

    fn len(&self) -> usize {
        self.x.len()
    }

    fn nearest(&self, f: f64) -> usize {
        let j = self.freq.partition_point(|&g| g < f).min(self.len() - 1);
        if j > 0 && (self.freq[j - 1] - f).abs() < (self.freq[j] - f).abs() {
            j - 1
        } else {
            j
        }
    }
}

/// Map an earlier reference onto `grid`, then split the widest in-band gaps
/// until there are `count` points.
fn seed_reference(grid: &Grid, previous: &[f64], count: usize) -> Vec<usize> {
    let mut reference: Vec<usize> = previous.iter().map(|&f| grid.nearest(f)).collect();
    reference.sort_unstable();
    reference.dedup();
    while reference.len() < count {
        let widest = reference
            .windows(2)
            .filter(|w| grid.band[w[0]] == grid.band[w[1]] && w[1] - w[0] > 1)
            .fold(None, |best: Option<(usize, usize)>, w| match best {
                Some((a, b)) if b - a >= w[1] - w[0] => best,
                _ => Some((w[0], w[1])),
            });
        let Some((a, b)) = widest else {
            break;
        };
        let mid = (a + b) / 2;
        let at = reference.partition_point(|&i| i < mid);
        reference.insert(at, mid);
    }
    if reference.len() < count {
        // Nothing left to split; fall back to a uniform reference.
        return (0..count)
            .map(|i| i * (grid.len() - 1) / (count - 1))
            .collect();
    }
    reference.truncate(count);
    reference
}

/// Polynomial through the reference with the alternating error `±δ`.
struct Fit {
    x: Vec<f64>,
    values: Vec<f64>,
    weights: Vec<f64>,
    delta: f64,
}

impl Fit {
    fn new(grid: &Grid, extremals: &[usize]) -> Self {
        let x: Vec<f64> = extremals.iter().map(|&i| grid.x[i]).collect();
        let bary = barycentric_weights(&x);

        let (mut num, mut den) = (0.0, 0.0);
        for (k, &i) in extremals.iter().enumerate() {
            num += bary[k] * grid.desired[i];
            den += alternate(k) * bary[k] / grid.weight[i];
        }
        let delta = num / den;

        // r coefficients need r points; the last reference point is implied by δ.
        let used = extremals.len() - 1;
        let values = extremals[..used]
            .iter()
            .enumerate()
            .map(|(k, &i)| grid.desired[i] - alternate(k) * delta / grid.weight[i])
            .collect();
        let x = x[..used].to_vec();
        let weights = barycentric_weights(&x);
        Self {
            x,
            values,
            weights,
            delta,
        }
    }

    /// Amplitude response at `x = cos(2πf)`.
    fn amplitude(&self, x: f64) -> f64 {
        let (mut num, mut den) = (0.0, 0.0);
        for ((&xk, &value), &weight) in self.x.iter().zip(&self.values).zip(&self.weights) {
            let diff = x - xk;
            if diff == 0.0 {
                return value;
            }
            let t = weight / diff;
            num += t * value;
            den += t;
        }
        num / den
    }
}

fn alternate(k: usize) -> f64 {
    if k % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

/// Barycentric weights `1 / Π(x_k - x_j)`, scaled by a common factor.
///
/// Products over a few hundred nodes leave the f64 range, so they are
/// accumulated as logarithms and rescaled by the largest one.
fn barycentric_weights(x: &[f64]) -> Vec<f64> {
    let logs: Vec<(f64, f64)> = x
        .iter()
        .enumerate()
        .map(|(k, &xk)| {
            let mut sign = 1.0;
            let mut log = 0.0;
            for (j, &xj) in x.iter().enumerate() {
                if j != k {
                    let diff = xk - xj;
                    if diff < 0.0 {
                        sign = -sign;
                    }
                    log -= diff.abs().ln();
                }
            }
            (sign, log)
        })
        .collect();
    let peak = logs
        .iter()
        .map(|&(_, log)| log)
        .fold(f64::NEG_INFINITY, f64::max);
    logs.into_iter()
        .map(|(sign, log)| sign * (log - peak).exp())
        .collect()
}

fn compute_error(grid: &Grid, fit: &Fit) -> Vec<f64> {
    (0..grid.len())
        .map(|i| grid.weight[i] * (grid.desired[i] - fit.amplitude(grid.x[i])))
        .collect()
}

/// Next reference: local extrema of the error, reduced to an alternating
/// sequence of exactly `count` points. `None` when too few alternations exist.
fn find_extremals(grid: &Grid, error: &[f64], delta: f64, count: usize) -> Option<Vec<usize>> {
    alternating_extrema(grid, error, delta * (1.0 - 1e-9), count)
        .or_else(|| alternating_extrema(grid, error, 0.0, count))
}

fn alternating_extrema(grid: &Grid, error: &[f64], floor: f64, count: usize) -> Option<Vec<usize>> {
    let n = error.len();
    let mut picked: Vec<usize> = Vec::with_capacity(count + 8);
    for i in 0..n {
        let e = error[i];
        if e == 0.0 || e.abs() < floor {
            continue;
        }
        // Band edges only compare against the neighbour inside the same band.
        let prev = (i > 0 && grid.band[i - 1] == grid.band[i]).then(|| error[i - 1]);
        let next = (i + 1 < n && grid.band[i + 1] == grid.band[i]).then(|| error[i + 1]);
        let is_extremum = if e > 0.0 {
            prev.map_or(true, |p| e >= p) && next.map_or(true, |q| e > q)
        } else {
            prev.map_or(true, |p| e <= p) && next.map_or(true, |q| e < q)
        };
        if !is_extremum {
            continue;
        }
        if let Some(last) = picked.last_mut() {
            if (error[*last] > 0.0) == (e > 0.0) {
                if e.abs() > error[*last].abs() {
                    *last = i;
                }
                continue;
            }
        }
        picked.push(i);
    }

    // Dropping adjacent pairs keeps the signs alternating without opening a
    // gap at either end of the spectrum.
    while picked.len() > count + 1 {
        let mut weakest = 0;
        let mut weakest_peak = f64::INFINITY;
        for k in 0..picked.len() - 1 {
            let pair_peak = error[picked[k]].abs().max(error[picked[k + 1]].abs());
            if pair_peak < weakest_peak {
                weakest = k;
                weakest_peak = pair_peak;
            }
        }
        picked.drain(weakest..weakest + 2);
    }
    if picked.len() > count {
        let first = error[picked[0]].abs();
        let last = error[picked[picked.len() - 1]].abs();
        if first < last {
            picked.remove(0);
        } else {
            picked.pop();
        }
    }
    (picked.len() == count).then_some(picked)
}

/// Inverse DFT of the amplitude response sampled at `k / num_taps`.
fn compute_coefficients(fit: &Fit, num_taps: usize) -> Vec<f64> {
    let half = num_taps / 2;
    let len = num_taps as f64;
    let samples: Vec<f64> = (0..=half)
        .map(|k| fit.amplitude((2.0 * PI * k as f64 / len).cos()))
        .collect();
    (0..num_taps)
        .map(|n| {
            let m = n as f64 - half as f64;
            let sum: f64 = samples
                .iter()
                .enumerate()
                .skip(1)
                .map(|(k, &a)| 2.0 * a * (2.0 * PI * k as f64 * m / len).cos())
                .sum();
            (samples[0] + sum) / len
        })
        .collect()
}

/// Estimate the number of taps an equiripple filter needs.
///
/// Kaiser's formula `N ≈ (-20·log10(√(δp·δs)) - 13) / (14.6·Δf)` with Δf the
/// normalised transition width, rounded up to an odd count. Narrow bandpass
/// designs usually need somewhat more.
pub(crate) fn estimate_order(
    passband_ripple_db: f64,
    stopband_atten_db: f64,
    transition_width: f64,
) -> usize {
    let gain = 10.0_f64.powf(passband_ripple_db / 20.0);
    let delta_p = (gain - 1.0) / (gain + 1.0);
    let delta_s = 10.0_f64.powf(-stopband_atten_db / 20.0);

    let d = -20.0 * (delta_p * delta_s).sqrt().log10();
    let n = ((d - 13.0) / (14.6 * transition_width)).ceil().max(3.0) as usize;
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amplitude(taps: &[f64], f: f64) -> f64 {
        let half = taps.len() / 2;
        taps.iter()
            .enumerate()
            .map(|(n, &h)| h * (2.0 * PI * f * (n as f64 - half as f64)).cos())
            .sum()
    }

    fn peak_deviation(taps: &[f64], lo: f64, hi: f64, desired: f64) -> f64 {
        (0..=400)
            .map(|i| lo + (hi - lo) * i as f64 / 400.0)
            .map(|f| (amplitude(taps, f) - desired).abs())
            .fold(0.0, f64::max)
    }

    fn test_spec() -> RemezSpec {
        RemezSpec::bandpass(0.1, 0.15, 0.25, 0.3)
    }

    #[test]
    fn estimate_for_one_hertz_transitions_at_200_hz() {
        assert_eq!(estimate_order(1.0, 60.0, 1.0 / 200.0), 403);
        assert_eq!(estimate_order(1.0, 60.0, 1.0 / 128.0), 259);
    }

    #[test]
    fn narrower_transition_needs_more_taps() {
        let wide = estimate_order(0.1, 60.0, 0.1);
        let narrow = estimate_order(0.1, 60.0, 0.05);
        assert!(narrow > wide);
        assert_eq!(wide % 2, 1);
    }

    #[test]
    fn even_tap_count_is_rounded_up_and_symmetric() {
        let spec = test_spec().with_num_taps(60);
        assert_eq!(spec.num_taps(), 61);
        let design = spec.design();
        assert!(design.converged);
        assert_eq!(design.taps.len(), 61);
        let taps = &design.taps;
        for i in 0..taps.len() / 2 {
            assert!((taps[i] - taps[taps.len() - 1 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn weighted_error_is_equiripple() {
        let design = test_spec().with_num_taps(61).with_weights(1.0, 10.0).design();
        let taps = &design.taps;
        let pass = peak_deviation(taps, 0.15, 0.25, 1.0);
        let stop = peak_deviation(taps, 0.0, 0.1, 0.0).max(peak_deviation(taps, 0.3, 0.5, 0.0));
        assert!(pass < 0.01, "passband deviation {pass}");
        assert!((pass - design.delta).abs() < 0.02 * design.delta);
        // Both bands reach the same weighted error.
        let ratio = pass / (10.0 * stop);
        assert!((ratio - 1.0).abs() < 0.05, "weighted ratio {ratio}");
    }

    #[test]
    fn more_taps_give_smaller_ripple() {
        let short = test_spec().with_num_taps(41).design();
        let long = test_spec().with_num_taps(81).design();
        assert!(long.delta < short.delta);
        assert!(
            peak_deviation(&long.taps, 0.15, 0.25, 1.0) < peak_deviation(&short.taps, 0.15, 0.25, 1.0)
        );
    }

    #[test]
    fn seeded_design_matches_cold_start() {
        let spec = test_spec().with_weights(1.0, 10.0);
        let shorter = spec.with_num_taps(59).design();
        let cold = spec.with_num_taps(61).design();
        let warm = spec.with_num_taps(61).design_from(&shorter);
        assert!(warm.converged);
        assert_eq!(warm.extremals.len(), 32);
        assert!((warm.delta - cold.delta).abs() < 1e-6 * cold.delta);
        for (a, b) in warm.taps.iter().zip(&cold.taps) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn grid_covers_each_band_in_order() {
        let grid = Grid::new(&test_spec().bands, 31);
        assert!(grid.len() >= 64);
        assert_eq!(grid.freq[0], 0.0);
        assert_eq!(grid.x[0], 1.0);
        assert_eq!(*grid.freq.last().unwrap(), 0.5);
        assert!(grid.band.windows(2).all(|w| w[0] <= w[1]));
        assert!(grid.freq.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(grid.nearest(grid.freq[10] + 1e-9), 10);
        assert_eq!(grid.nearest(0.11), grid.band.partition_point(|&b| b == 0) - 1);
    }
}
