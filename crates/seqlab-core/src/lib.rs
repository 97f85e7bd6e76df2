//! # Seqlab Core
//!
//! Sequence labeling building blocks for named entity recognition: a reader
//! for tab-separated token/tag corpora, BIO/BILUO tag handling, an averaged
//! perceptron tagger with constrained Viterbi decoding, and precision/recall
//! scoring.
//!
//! ## Quick Start
//!
//! ```rust
//! use seqlab_core::corpus::parse_corpus;
//! use seqlab_core::{evaluate, Tagger};
//!
//! let corpus = parse_corpus("Ada\tB-PER\nLovelace\tI-PER\nwrote\tO\n").unwrap();
//! let mut tagger = Tagger::new(corpus.labels());
//! let mut rng = oorandom::Rand32::new(0);
//! for _ in 0..5 {
//!     for sentence in &corpus {
//!         tagger.update(&sentence.tokens, &sentence.tags, 0.0, &mut rng).unwrap();
//!     }
//! }
//! tagger.finish_training();
//!
//! let report = evaluate(&tagger, &corpus).unwrap();
//! assert_eq!(report.f1(), 1.0);
//! ```
pub mod corpus;
pub mod error;
pub mod scoring;
pub mod tagging;

// Re-export primary API
pub use corpus::{Corpus, CorpusStats, Sentence};
pub use error::{Result, SeqlabError};
pub use scoring::{ClassMetrics, Report, Scorer, evaluate};
pub use tagging::{
    Entity, ModelMeta, Prefix, Scheme, Span, Tag, TagSet, Tagger, Tokenizer, ViterbiDecoder,
    biluo_to_bio, bio_to_biluo, spans,
};
