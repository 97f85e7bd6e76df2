pub mod features;
pub mod tagger;
pub mod tags;
pub mod tokenizer;
pub mod viterbi;

pub use tagger::{ModelMeta, Tagger};
pub use tags::{
    Entity, Prefix, Scheme, Span, Tag, TagSet, biluo_to_bio, bio_to_biluo, is_valid_transition,
    spans, spans_to_biluo, spans_to_bio,
};
pub use tokenizer::{Token, Tokenizer};
pub use viterbi::{Constraints, ViterbiDecoder};
