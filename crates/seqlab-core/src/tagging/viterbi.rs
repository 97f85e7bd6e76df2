//! # Viterbi Decoding
//!
//! Finds the highest-scoring tag sequence given per-position emission scores,
//! a transition matrix and hard constraints on which transitions are allowed.

use crate::error::{Result, SeqlabError};

/// Allowed transitions, plus the tags a sequence may start and end with.
#[derive(Debug, Clone)]
pub struct Constraints {
    /// `valid[prev][curr]`.
    pub valid: Vec<Vec<bool>>,
    pub start: Vec<bool>,
    pub end: Vec<bool>,
}

impl Constraints {
    /// No constraints at all.
    pub fn unconstrained(num_tags: usize) -> Self {
        Self {
            valid: vec![vec![true; num_tags]; num_tags],
            start: vec![true; num_tags],
            end: vec![true; num_tags],
        }
    }
}

/// Viterbi decoder for tag sequences.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
}

impl ViterbiDecoder {
    /// Create a new Viterbi decoder.
    ///
    /// # Arguments
    /// * `num_tags` - Number of distinct tags
    pub fn new(num_tags: usize) -> Self {
        Self { num_tags }
    }

    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    /// Decode the optimal tag sequence.
    ///
    /// # Arguments
    /// * `emission_scores` - Matrix of shape [seq_len, num_tags]
    /// * `transition_matrix` - Matrix of shape [num_tags, num_tags], indexed `[prev][curr]`
    /// * `constraints` - Forbidden transitions are never taken
    ///
    /// # Returns
    /// The optimal tag sequence as indices. When no allowed tag is reachable
    /// at some position, that position is decoded without the constraints
    /// instead of failing.
    pub fn decode(
        &self,
        emission_scores: &[Vec<f32>],
        transition_matrix: &[Vec<f32>],
        constraints: &Constraints,
    ) -> Result<Vec<usize>> {
        let seq_len = emission_scores.len();
        if seq_len == 0 {
            return Ok(Vec::new());
        }

        self.check_shapes(emission_scores, transition_matrix, constraints)?;

        // DP table
        let mut dp: Vec<Vec<f32>> = vec![vec![f32::NEG_INFINITY; self.num_tags]; seq_len];
        let mut backptr: Vec<Vec<usize>> = vec![vec![0; self.num_tags]; seq_len];

        // Initialize
        for tag in 0..self.num_tags {
            if constraints.start[tag] {
                dp[0][tag] = emission_scores[0][tag];
            }
        }
        if dp[0].iter().all(|&s| s == f32::NEG_INFINITY) {
            dp[0].clone_from(&emission_scores[0]);
        }

        // Forward pass with constraints
        for pos in 1..seq_len {
            for constrained in [true, false] {
                for curr_tag in 0..self.num_tags {
                    let candidates = (0..self.num_tags)
                        .filter(|&prev| !constrained || constraints.valid[prev][curr_tag])
                        .map(|prev| {
                            (prev, dp[pos - 1][prev] + transition_matrix[prev][curr_tag])
                        });
                    let (best_prev, best_score) = best_of(candidates);
                    dp[pos][curr_tag] = best_score + emission_scores[pos][curr_tag];
                    backptr[pos][curr_tag] = best_prev;
                }
                // Dead end under the constraints: redo this position without them
                if dp[pos].iter().any(|&s| s > f32::NEG_INFINITY) {
                    break;
                }
            }
        }

        // Best final tag, preferring tags allowed at the end
        let last = &dp[seq_len - 1];
        let allowed_end = (0..self.num_tags)
            .filter(|&t| constraints.end[t])
            .map(|t| (t, last[t]));
        let best_final_tag = argmax(allowed_end)
            .filter(|&t| last[t] > f32::NEG_INFINITY)
            .or_else(|| argmax(last.iter().copied().enumerate()))
            .unwrap_or(0);

        let mut path = vec![best_final_tag];
        let mut curr_tag = best_final_tag;

        for pos in (1..seq_len).rev() {
            curr_tag = backptr[pos][curr_tag];
            path.push(curr_tag);
        }

        path.reverse();
        Ok(path)
    }

    fn check_shapes(
        &self,
        emission_scores: &[Vec<f32>],
        transition_matrix: &[Vec<f32>],
        constraints: &Constraints,
    ) -> Result<()> {
        if let Some(row) = emission_scores.iter().find(|row| row.len() != self.num_tags) {
            return Err(SeqlabError::Decode(format!(
                "emission score dimension mismatch: expected {}, got {}",
                self.num_tags,
                row.len()
            )));
        }
        let square =
            |m: &[Vec<f32>]| m.len() == self.num_tags && m.iter().all(|r| r.len() == self.num_tags);
        if !square(transition_matrix) {
            return Err(SeqlabError::Decode(format!(
                "transition matrix must be {0}x{0}",
                self.num_tags
            )));
        }
        if constraints.valid.len() != self.num_tags
            || constraints.valid.iter().any(|r| r.len() != self.num_tags)
            || constraints.start.len() != self.num_tags
            || constraints.end.len() != self.num_tags
        {
            return Err(SeqlabError::Decode(format!(
                "constraint masks must cover {} tags",
                self.num_tags
            )));
        }
        Ok(())
    }
}

/// Highest-scoring `(index, score)`, or `(0, -inf)` when nothing qualifies.
fn best_of(scores: impl Iterator<Item = (usize, f32)>) -> (usize, f32) {
    let mut best = (0, f32::NEG_INFINITY);
    for (idx, score) in scores {
        if score > best.1 {
            best = (idx, score);
        }
    }
    best
}

fn argmax(scores: impl Iterator<Item = (usize, f32)>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, score) in scores {
        if best.is_none_or(|(_, b)| score > b) {
            best = Some((idx, score));
        }
    }
    best.map(|(idx, _)| idx)
}
