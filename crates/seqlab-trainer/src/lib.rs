//! # Seqlab Trainer
//!
//! Training workflows on top of `seqlab-core` and `seqlab-embed`: the NER loop
//! with dev-set checkpointing and early stopping, word2vec hyperparameter
//! sweeps, and the configuration both read.
pub mod batching;
pub mod config;
pub mod ner;
pub mod sweep;

pub use batching::{compounding, minibatches};
pub use config::{NerTrainConfig, SweepConfig, default_data_dir};
pub use ner::{IterationLog, NerTrainer, TrainSummary, holdout};
pub use sweep::{Benchmark, SweepResult, run_sweep, save_report};
