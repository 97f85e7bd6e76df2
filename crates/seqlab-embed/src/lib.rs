//! # Seqlab Embed
//!
//! Word embeddings from raw text: skip-gram training with negative sampling on
//! candle, similarity and analogy queries, intrinsic evaluation, t-SNE
//! projection for plotting, and agglomerative clustering.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use seqlab_embed::{TextReader, Word2VecConfig, train};
//!
//! let sentences = TextReader::default().read_path("corpus.txt.gz").unwrap();
//! let config = Word2VecConfig::default().with_dim(50).with_epochs(3);
//! let vectors = train(&sentences, &config).unwrap();
//!
//! for (word, score) in vectors.most_similar(&["king", "woman"], &["man"], 5).unwrap() {
//!     println!("{word}\t{score:.3}");
//! }
//! ```
pub mod cluster;
pub mod error;
pub mod eval;
pub mod plot;
pub mod text;
pub mod tsne;
pub mod vectors;
pub mod vocab;
pub mod word2vec;

// Re-export primary API
pub use cluster::{Linkage, Metric, agglomerative, cluster_words, save_clusters};
pub use error::{EmbedError, Result};
pub use eval::{
    Analogy, AnalogyEvaluation, PairEvaluation, WordPair, read_analogies, read_word_pairs,
    spearman,
};
pub use plot::{ProjectedWord, Projection};
pub use text::{TextOptions, TextReader};
pub use tsne::{TsneConfig, tsne};
pub use vectors::KeyedVectors;
pub use vocab::Vocab;
pub use word2vec::{Word2VecConfig, train};
