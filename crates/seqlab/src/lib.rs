//! # Seqlab
//!
//! Umbrella crate re-exporting the seqlab workspace:
//!
//! * [`ner`]: corpora, BIO/BILUO tags, the perceptron entity tagger and scoring
//! * [`embed`]: skip-gram word vectors, t-SNE projection and clustering
//! * [`trainer`]: NER training with early stopping and embedding sweeps
pub use seqlab_core as ner;
pub use seqlab_embed as embed;
pub use seqlab_trainer as trainer;

pub use seqlab_core::{Corpus, Report, Tagger, evaluate};
pub use seqlab_embed::{KeyedVectors, Word2VecConfig};
pub use seqlab_trainer::{NerTrainConfig, NerTrainer};
