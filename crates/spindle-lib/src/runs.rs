//! Run-length annotation of boolean masks.
//!
//! A run is a maximal stretch of identical mask values. [`encode`] annotates
//! every sample with the length of the run it sits in and lists the run lengths
//! in order; the value of every run follows from `first_value` by alternation.

use crate::error::{Result, SpindleError};
use serde::{Deserialize, Serialize};

/// One maximal run of identical mask values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub value: bool,
    pub start: usize,
    /// Inclusive.
    pub end: usize,
    pub len: usize,
}

/// Per-sample run annotation of a mask.
///
/// `None` marks a run whose true length is unknown because the mask was cut
/// mid-run; see [`encode`] with `ends_as_missing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLengths {
    pub first_value: bool,
    pub run_lengths: Vec<Option<usize>>,
    pub repeat_counts: Vec<Option<usize>>,
}

impl RunLengths {
    pub fn len(&self) -> usize {
        self.run_lengths.len()
    }
    pub fn is_empty(&self) -> bool {
        self.run_lengths.is_empty()
    }
    pub fn run_count(&self) -> usize {
        self.repeat_counts.len()
    }

    /// Runs reconstructed from the annotation, or `None` if any boundary run
    /// was marked missing.
    pub fn runs(&self) -> Option<Vec<Run>> {
        let mut out = Vec::with_capacity(self.repeat_counts.len());
        let mut value = self.first_value;
        let mut start = 0;
        for count in &self.repeat_counts {
            let len = (*count)?;
            out.push(Run {
                value,
                start,
                end: start + len - 1,
                len,
            });
            start += len;
            value = !value;
        }
        Some(out)
    }

    /// Samples whose value is `value` and whose run is shorter than `min_len`.
    /// Missing lengths never count as short.
    pub fn is_short(&self, mask: &[bool], value: bool, min_len: usize) -> Vec<bool> {
        mask.iter()
            .zip(&self.run_lengths)
            .map(|(&m, len)| m == value && len.map_or(false, |l| l < min_len))
            .collect()
    }
}

/// Maximal runs of `mask` in temporal order; empty for an empty mask.
pub fn runs(mask: &[bool]) -> Vec<Run> {
    let mut out = Vec::new();
    let Some(&first) = mask.first() else {
        return out;
    };
    let mut value = first;
    let mut start = 0;
    for (i, &m) in mask.iter().enumerate().skip(1) {
        if m != value {
            out.push(Run {
                value,
                start,
                end: i - 1,
                len: i - start,
            });
            value = m;
            start = i;
        }
    }
    out.push(Run {
        value,
        start,
        end: mask.len() - 1,
        len: mask.len() - start,
    });
    out
}

/// Annotate each sample of `mask` with the length of its run.
///
/// With `ends_as_missing`, the first and last runs (in both the per-sample
/// lengths and the run list) become `None`: a mask cut out of a longer
/// recording says nothing about how long its boundary runs really were.
pub fn encode(mask: &[bool], ends_as_missing: bool) -> Result<RunLengths> {
    if mask.is_empty() {
        return Err(SpindleError::EmptyMask);
    }
    let runs = runs(mask);
    let last = runs.len() - 1;
    let mut run_lengths = Vec::with_capacity(mask.len());
    let mut repeat_counts = Vec::with_capacity(runs.len());
    for (idx, run) in runs.iter().enumerate() {
        let len = if ends_as_missing && (idx == 0 || idx == last) {
            None
        } else {
            Some(run.len)
        };
        run_lengths.extend(std::iter::repeat(len).take(run.len));
        repeat_counts.push(len);
    }
    Ok(RunLengths {
        first_value: mask[0],
        run_lengths,
        repeat_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::{fs::File, path::PathBuf};

    #[derive(Deserialize)]
    struct Fixture {
        mask: Vec<u8>,
        first_value: bool,
        run_lengths: Vec<usize>,
        repeat_counts: Vec<usize>,
        run_lengths_missing_ends: Vec<Option<usize>>,
        repeat_counts_missing_ends: Vec<Option<usize>>,
    }

    fn fixture() -> Fixture {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let root = manifest_dir
            .parent()
            .and_then(|p| p.parent())
            .expect("workspace root")
            .to_path_buf();
        let path = root.join("test_data/run_lengths_example.json");
        serde_json::from_reader(File::open(&path).unwrap()).expect("read run-length fixture")
    }

    fn mask_of(bits: &[u8]) -> Vec<bool> {
        bits.iter().map(|&b| b != 0).collect()
    }

    fn some(values: &[usize]) -> Vec<Option<usize>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn documented_example() {
        let fx = fixture();
        let rl = encode(&mask_of(&fx.mask), false).unwrap();
        assert_eq!(rl.first_value, fx.first_value);
        assert_eq!(rl.run_lengths, some(&fx.run_lengths));
        assert_eq!(rl.repeat_counts, some(&fx.repeat_counts));
    }

    #[test]
    fn documented_example_with_missing_ends() {
        let fx = fixture();
        let rl = encode(&mask_of(&fx.mask), true).unwrap();
        assert!(!rl.first_value);
        assert_eq!(rl.run_lengths, fx.run_lengths_missing_ends);
        assert_eq!(rl.repeat_counts, fx.repeat_counts_missing_ends);
        assert!(rl.runs().is_none());
    }

    #[test]
    fn constant_mask_is_one_run() {
        let rl = encode(&[true; 7], false).unwrap();
        assert!(rl.first_value);
        assert_eq!(rl.repeat_counts, vec![Some(7)]);
        assert_eq!(rl.run_lengths, vec![Some(7); 7]);

        let rl = encode(&[false; 4], true).unwrap();
        assert_eq!(rl.repeat_counts, vec![None]);
        assert_eq!(rl.run_lengths, vec![None; 4]);
    }

    #[test]
    fn single_sample() {
        let rl = encode(&[true], false).unwrap();
        assert_eq!(rl.run_lengths, vec![Some(1)]);
        assert_eq!(rl.repeat_counts, vec![Some(1)]);
    }

    #[test]
    fn exactly_one_transition() {
        let rl = encode(&[true, true, false], false).unwrap();
        assert!(rl.first_value);
        assert_eq!(rl.run_lengths, some(&[2, 2, 1]));
        assert_eq!(rl.repeat_counts, some(&[2, 1]));

        let rl = encode(&[false, true, true, true], false).unwrap();
        assert_eq!(rl.run_lengths, some(&[1, 3, 3, 3]));
        assert_eq!(rl.repeat_counts, some(&[1, 3]));

        let rl = encode(&[false, true, true, true], true).unwrap();
        assert_eq!(rl.run_lengths, vec![None; 4]);
        assert_eq!(rl.repeat_counts, vec![None, None]);
    }

    #[test]
    fn interior_runs_survive_missing_ends() {
        let rl = encode(&mask_of(&[1, 0, 0, 1]), true).unwrap();
        assert_eq!(rl.run_lengths, vec![None, Some(2), Some(2), None]);
        assert_eq!(rl.repeat_counts, vec![None, Some(2), None]);
    }

    #[test]
    fn empty_mask_is_an_error() {
        assert!(matches!(encode(&[], false), Err(SpindleError::EmptyMask)));
        assert!(runs(&[]).is_empty());
    }

    #[test]
    fn runs_partition_and_alternate() {
        // Deterministic pseudo-random masks of varying length.
        let mut state = 0x2545_f491_u32;
        for n in 1..60 {
            let mask: Vec<bool> = (0..n)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    state % 3 == 0
                })
                .collect();
            let rl = encode(&mask, false).unwrap();
            let total: usize = rl.repeat_counts.iter().map(|c| c.unwrap()).sum();
            assert_eq!(total, n);

            let runs = rl.runs().unwrap();
            assert_eq!(runs[0].value, mask[0]);
            for w in runs.windows(2) {
                assert_ne!(w[0].value, w[1].value);
                assert_eq!(w[0].end + 1, w[1].start);
            }
            for run in &runs {
                for i in run.start..=run.end {
                    assert_eq!(mask[i], run.value);
                    assert_eq!(rl.run_lengths[i], Some(run.len));
                }
            }
        }
    }

    #[test]
    fn short_runs_respect_missing_lengths() {
        let mask = mask_of(&[1, 0, 1, 1, 1, 0, 1]);
        let rl = encode(&mask, true).unwrap();
        let short = rl.is_short(&mask, true, 2);
        assert_eq!(short, vec![false; 7]);
        let rl = encode(&mask, false).unwrap();
        let short = rl.is_short(&mask, true, 2);
        assert_eq!(short, vec![true, false, false, false, false, false, true]);
    }
}
