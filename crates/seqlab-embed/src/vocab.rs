//! Vocabulary construction and the sampling tables word2vec needs.

use std::collections::HashMap;

use oorandom::Rand32;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Exponent applied to counts in the negative-sampling distribution.
const NOISE_POWER: f64 = 0.75;

/// Words kept for training, ordered by descending frequency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocab {
    words: Vec<String>,
    counts: Vec<u64>,
    #[serde(skip)]
    index: HashMap<String, u32>,
    total: u64,
}

impl Vocab {
    /// Count words and keep those seen at least `min_count` times.
    ///
    /// Ties in frequency are broken alphabetically so the ordering is stable.
    pub fn build<S: AsRef<str>>(
        sentences: &[Vec<S>],
        min_count: u64,
        max_size: Option<usize>,
    ) -> Self {
        let mut freq: HashMap<&str, u64> = HashMap::new();
        for word in sentences.iter().flatten() {
            *freq.entry(word.as_ref()).or_insert(0) += 1;
        }
        let seen = freq.len();

        let mut entries: Vec<(&str, u64)> = freq
            .into_iter()
            .filter(|&(_, c)| c >= min_count.max(1))
            .collect();
        entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        if let Some(max) = max_size {
            entries.truncate(max);
        }

        let vocab = Self::from_counts(
            entries
                .into_iter()
                .map(|(w, c)| (w.to_string(), c))
                .collect(),
        );
        debug!(seen, kept = vocab.len(), min_count, "vocabulary built");
        vocab
    }

    /// Build from (word, count) pairs, keeping their order.
    pub fn from_counts(entries: Vec<(String, u64)>) -> Self {
        let mut vocab = Self::default();
        for (word, count) in entries {
            vocab.index.insert(word.clone(), vocab.words.len() as u32);
            vocab.words.push(word);
            vocab.counts.push(count);
            vocab.total += count;
        }
        vocab
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn get(&self, word: &str) -> Option<u32> {
        self.index.get(word).copied()
    }

    pub fn word(&self, id: u32) -> Option<&str> {
        self.words.get(id as usize).map(String::as_str)
    }

    pub fn count(&self, id: u32) -> u64 {
        self.counts.get(id as usize).copied().unwrap_or(0)
    }

    /// Total number of in-vocabulary tokens.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Map a sentence to ids, skipping unknown words.
    pub fn encode<S: AsRef<str>>(&self, sentence: &[S]) -> Vec<u32> {
        sentence.iter().filter_map(|w| self.get(w.as_ref())).collect()
    }

    /// Probability of keeping an occurrence of `id` under frequent-word
    /// subsampling with threshold `sample`. `sample <= 0` disables it.
    pub fn keep_probability(&self, id: u32, sample: f64) -> f64 {
        if sample <= 0.0 || self.total == 0 {
            return 1.0;
        }
        let count = self.count(id) as f64;
        if count == 0.0 {
            return 1.0;
        }
        let threshold = sample * self.total as f64;
        ((count / threshold).sqrt() + 1.0) * threshold / count
    }

    /// The unigram^0.75 distribution used to draw negative samples.
    pub fn noise_distribution(&self) -> NoiseDistribution {
        let mut cumulative = Vec::with_capacity(self.counts.len());
        let mut acc = 0.0;
        for &c in &self.counts {
            acc += (c as f64).powf(NOISE_POWER);
            cumulative.push(acc);
        }
        NoiseDistribution { cumulative }
    }
}

/// Sampler over vocabulary ids.
#[derive(Debug, Clone)]
pub struct NoiseDistribution {
    cumulative: Vec<f64>,
}

impl NoiseDistribution {
    /// Draw one id. Panics never; an empty distribution yields 0.
    pub fn sample(&self, rng: &mut Rand32) -> u32 {
        let Some(&total) = self.cumulative.last() else {
            return 0;
        };
        let target = rng.rand_float() as f64 * total;
        let idx = self.cumulative.partition_point(|&c| c <= target);
        idx.min(self.cumulative.len() - 1) as u32
    }
}
