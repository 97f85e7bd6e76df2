//! Grid search over word2vec hyperparameters.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use seqlab_embed::{Analogy, EmbedError, KeyedVectors, Word2VecConfig, WordPair, train};
use tracing::{info, warn};

use crate::config::SweepConfig;

/// What each trained model is scored on.
#[derive(Debug, Clone)]
pub enum Benchmark {
    /// Spearman correlation with human similarity ratings.
    WordPairs(Vec<WordPair>),
    /// Top-1 analogy accuracy.
    Analogies(Vec<Analogy>),
}

impl Benchmark {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WordPairs(_) => "spearman",
            Self::Analogies(_) => "analogy_accuracy",
        }
    }

    fn score(&self, vectors: &KeyedVectors) -> Result<f64> {
        Ok(match self {
            Self::WordPairs(pairs) => vectors.evaluate_word_pairs(pairs)?.spearman,
            Self::Analogies(questions) => vectors.evaluate_analogies(questions)?.accuracy,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    pub config: Word2VecConfig,
    pub metric: String,
    pub score: f64,
    pub vocab_size: usize,
    pub seconds: f64,
}

/// Train one model per grid point and return results sorted best first.
///
/// Grid points whose vocabulary comes out empty are skipped with a warning.
pub fn run_sweep<S: AsRef<str>>(
    sentences: &[Vec<S>],
    sweep: &SweepConfig,
    benchmark: &Benchmark,
) -> Result<Vec<SweepResult>> {
    let grid = sweep.combinations();
    info!(runs = grid.len(), metric = benchmark.name(), "starting sweep");

    let mut results = Vec::with_capacity(grid.len());
    for (run, config) in grid.into_iter().enumerate() {
        let started = Instant::now();
        let vectors = match train(sentences, &config) {
            Ok(vectors) => vectors,
            Err(EmbedError::EmptyVocabulary) => {
                warn!(run, min_count = config.min_count, "empty vocabulary, skipping");
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("sweep run {run} failed"));
            }
        };
        let score = benchmark.score(&vectors)?;
        let seconds = started.elapsed().as_secs_f64();
        info!(
            run,
            dim = config.dim,
            window = config.window,
            negative = config.negative,
            min_count = config.min_count,
            epochs = config.epochs,
            score = format!("{score:.4}"),
            "sweep run finished"
        );
        results.push(SweepResult {
            config,
            metric: benchmark.name().to_string(),
            score,
            vocab_size: vectors.len(),
            seconds,
        });
    }

    if results.is_empty() {
        bail!("no sweep run produced a model");
    }
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(results)
}

pub fn save_report<P: AsRef<Path>>(results: &[SweepResult], path: P) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, serde_json::to_string_pretty(results)?)
        .with_context(|| format!("writing sweep report {}", path.display()))?;
    info!(path = %path.display(), runs = results.len(), "sweep report saved");
    Ok(())
}
