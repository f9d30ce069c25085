//! Adaptive length optimizer.
//!
//! Picks exactly `k` stories whose narration, plus a fixed gap between
//! neighbours, lands as close as possible to a target runtime. The pool is
//! small (a dozen or so stories), so every `k`-subset is scored and the exact
//! optimum is returned.

use crate::error::SelectionError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// A story whose narration has been synthesized and measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Sequence number of the story; also its logical ordering key.
    pub id: u32,
    pub title: String,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
}

impl Candidate {
    pub fn new(id: u32, title: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            id,
            title: title.into(),
            duration_seconds,
            audio_path: None,
        }
    }

    pub fn with_audio_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio_path = Some(path.into());
        self
    }
}

/// Everything the optimizer needs for one compilation. Kept as plain values so
/// independent requests never share state.
#[derive(Debug, Clone)]
pub struct CompilationRequest {
    pub candidates: Vec<Candidate>,
    pub target_seconds: f64,
    pub selection_size: usize,
    pub gap_seconds: f64,
}

impl CompilationRequest {
    pub fn select(&self) -> Result<SelectionResult, SelectionError> {
        select(
            &self.candidates,
            self.selection_size,
            self.target_seconds,
            self.gap_seconds,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Chosen candidates, sorted by `id`.
    pub selected: Vec<Candidate>,
    pub target_seconds: f64,
    pub gap_seconds: f64,
    /// Sum of selected durations plus `(k - 1) * gap`.
    pub achieved_seconds: f64,
    /// `achieved - target`; negative when the compilation runs short.
    pub difference_seconds: f64,
    pub subsets_evaluated: u64,
}

impl SelectionResult {
    pub fn score(&self) -> f64 {
        self.difference_seconds.abs()
    }

    pub fn total_story_seconds(&self) -> f64 {
        self.selected.iter().map(|c| c.duration_seconds).sum()
    }

    pub fn total_gap_seconds(&self) -> f64 {
        gap_total(self.selected.len(), self.gap_seconds)
    }
}

fn gap_total(k: usize, gap_seconds: f64) -> f64 {
    k.saturating_sub(1) as f64 * gap_seconds
}

fn validate(
    candidates: &[Candidate],
    k: usize,
    target_seconds: f64,
    gap_seconds: f64,
) -> Result<(), SelectionError> {
    if k < 1 {
        return Err(SelectionError::InvalidConfiguration(
            "selection size must be at least 1".to_string(),
        ));
    }
    if !target_seconds.is_finite() || target_seconds <= 0.0 {
        return Err(SelectionError::InvalidConfiguration(format!(
            "target duration must be positive, got {}",
            target_seconds
        )));
    }
    if !gap_seconds.is_finite() || gap_seconds < 0.0 {
        return Err(SelectionError::InvalidConfiguration(format!(
            "gap must be non-negative, got {}",
            gap_seconds
        )));
    }

    let mut seen = HashSet::with_capacity(candidates.len());
    for c in candidates {
        if !c.duration_seconds.is_finite() || c.duration_seconds <= 0.0 {
            return Err(SelectionError::InvalidConfiguration(format!(
                "candidate {} has invalid duration {}",
                c.id, c.duration_seconds
            )));
        }
        if !seen.insert(c.id) {
            return Err(SelectionError::InvalidConfiguration(format!(
                "duplicate candidate id {}",
                c.id
            )));
        }
    }

    if candidates.len() < k {
        return Err(SelectionError::InsufficientCandidates {
            available: candidates.len(),
            required: k,
        });
    }

    Ok(())
}

/// Advances `idx` to the next `k`-combination of `0..n` in lexicographic
/// order. Returns `false` once the last combination has been visited.
fn next_combination(idx: &mut [usize], n: usize) -> bool {
    let k = idx.len();
    let mut i = k;
    while i > 0 {
        i -= 1;
        if idx[i] < n - k + i {
            idx[i] += 1;
            for j in i + 1..k {
                idx[j] = idx[j - 1] + 1;
            }
            return true;
        }
    }
    false
}

/// Finds the `k` candidates whose total runtime (durations plus `k - 1` gaps)
/// is closest to `target_seconds`.
///
/// Subsets are visited in lexicographic index order and the best one is only
/// replaced by a strictly smaller deviation, so among equal deviations the
/// earliest subset wins.
pub fn select(
    candidates: &[Candidate],
    k: usize,
    target_seconds: f64,
    gap_seconds: f64,
) -> Result<SelectionResult, SelectionError> {
    validate(candidates, k, target_seconds, gap_seconds)?;

    let n = candidates.len();
    let gaps = gap_total(k, gap_seconds);

    let mut idx: Vec<usize> = (0..k).collect();
    let mut best_idx = idx.clone();
    let mut best_total = f64::NAN;
    let mut best_score = f64::INFINITY;
    let mut evaluated: u64 = 0;

    loop {
        let total = idx
            .iter()
            .map(|&i| candidates[i].duration_seconds)
            .sum::<f64>()
            + gaps;
        let score = (total - target_seconds).abs();
        evaluated += 1;

        if score < best_score {
            best_score = score;
            best_total = total;
            best_idx.copy_from_slice(&idx);
        }

        if !next_combination(&mut idx, n) {
            break;
        }
    }

    let mut selected: Vec<Candidate> = best_idx.iter().map(|&i| candidates[i].clone()).collect();
    selected.sort_by_key(|c| c.id);

    Ok(SelectionResult {
        selected,
        target_seconds,
        gap_seconds,
        achieved_seconds: best_total,
        difference_seconds: best_total - target_seconds,
        subsets_evaluated: evaluated,
    })
}
