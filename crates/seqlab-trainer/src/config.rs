//! Training configuration, loadable from JSON and overridable from the CLI.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use seqlab_embed::Word2VecConfig;

/// Root for models and reports when no output directory is given.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("seqlab")
}

fn default_ner_output() -> PathBuf {
    default_data_dir().join("models").join("ner")
}

/// Read a JSON config file with path context on failure.
pub fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

/// Configuration for the NER training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NerTrainConfig {
    /// Maximum passes over the training data.
    pub n_iter: usize,
    /// Probability of dropping each feature during an update.
    pub dropout: f32,
    /// First minibatch size of the compounding schedule.
    pub batch_start: f64,
    /// Largest minibatch size.
    pub batch_stop: f64,
    /// Growth factor between consecutive minibatches.
    pub batch_rate: f64,
    /// Iterations without dev improvement before stopping. 0 disables.
    pub patience: usize,
    pub seed: u64,
    /// Share of the corpus held out for validation when no dev set is given.
    pub dev_fraction: f64,
    /// Where the best model is written.
    pub output_dir: PathBuf,
}

impl Default for NerTrainConfig {
    fn default() -> Self {
        Self {
            n_iter: 30,
            dropout: 0.2,
            batch_start: 4.0,
            batch_stop: 32.0,
            batch_rate: 1.001,
            patience: 5,
            seed: 0,
            dev_fraction: 0.2,
            output_dir: default_ner_output(),
        }
    }
}

impl NerTrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config file. Values go through the same clamps as the builders.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json::<Self>(path.as_ref()).map(Self::normalized)
    }

    /// Re-apply the builder clamps to every field.
    pub fn normalized(self) -> Self {
        let read = self.clone();
        let dropout = if read.dropout.is_nan() { 0.0 } else { read.dropout };
        let dev_fraction = if read.dev_fraction.is_nan() {
            Self::default().dev_fraction
        } else {
            read.dev_fraction
        };
        self.with_n_iter(read.n_iter)
            .with_dropout(dropout)
            .with_batch_sizes(read.batch_start, read.batch_stop, read.batch_rate)
            .with_dev_fraction(dev_fraction)
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter.max(1);
        self
    }

    /// Set the dropout rate, clamped to `[0, 0.9]`.
    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout.clamp(0.0, 0.9);
        self
    }

    /// Set the compounding batch schedule. Sizes are at least 1 and the rate
    /// never shrinks batches.
    pub fn with_batch_sizes(mut self, start: f64, stop: f64, rate: f64) -> Self {
        self.batch_start = start.max(1.0);
        self.batch_stop = stop.max(self.batch_start);
        self.batch_rate = rate.max(1.0);
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the held-out share, clamped to `[0.05, 0.5]`.
    pub fn with_dev_fraction(mut self, fraction: f64) -> Self {
        self.dev_fraction = fraction.clamp(0.05, 0.5);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

/// A grid of word2vec hyperparameters. Every combination is trained once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub dims: Vec<usize>,
    pub windows: Vec<usize>,
    pub negatives: Vec<usize>,
    pub min_counts: Vec<u64>,
    pub epochs: Vec<usize>,
    /// Settings shared by every run (learning rate, seed, ...).
    pub base: Word2VecConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            dims: vec![50, 100],
            windows: vec![2, 5],
            negatives: vec![5],
            min_counts: vec![5],
            epochs: vec![5],
            base: Word2VecConfig::default(),
        }
    }
}

impl SweepConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json::<Self>(path.as_ref()).map(Self::normalized)
    }

    /// Clamp the shared settings. Grid values are clamped when expanded.
    pub fn normalized(mut self) -> Self {
        self.base = self.base.normalized();
        self
    }

    /// Expand the grid. An empty axis falls back to the base value.
    pub fn combinations(&self) -> Vec<Word2VecConfig> {
        let axis = |values: &[usize], base: usize| {
            if values.is_empty() {
                vec![base]
            } else {
                values.to_vec()
            }
        };
        let dims = axis(&self.dims, self.base.dim);
        let windows = axis(&self.windows, self.base.window);
        let negatives = axis(&self.negatives, self.base.negative);
        let epochs = axis(&self.epochs, self.base.epochs);
        let min_counts = if self.min_counts.is_empty() {
            vec![self.base.min_count]
        } else {
            self.min_counts.clone()
        };

        let mut grid = Vec::new();
        for &dim in &dims {
            for &window in &windows {
                for &negative in &negatives {
                    for &min_count in &min_counts {
                        for &n_epochs in &epochs {
                            grid.push(
                                self.base
                                    .clone()
                                    .with_dim(dim)
                                    .with_window(window)
                                    .with_negative(negative)
                                    .with_min_count(min_count)
                                    .with_epochs(n_epochs),
                            );
                        }
                    }
                }
            }
        }
        grid
    }
}
