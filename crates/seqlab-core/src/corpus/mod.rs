//! # Labeled Corpora
//!
//! A corpus is a list of sentences, each a token sequence paired with a tag
//! sequence of the same length.

pub mod reader;

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Index;

use oorandom::Rand32;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqlabError};
use crate::tagging::tags::{Tag, biluo_to_bio, bio_to_biluo, labels_of, spans};

pub use reader::{parse_corpus, read_corpus, write_corpus};

/// A single training example: tokens with one tag each.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub tokens: Vec<String>,
    pub tags: Vec<Tag>,
}

impl Sentence {
    /// Build a sentence, checking that tokens and tags line up.
    pub fn new(tokens: Vec<String>, tags: Vec<Tag>) -> Result<Self> {
        if tokens.len() != tags.len() {
            return Err(SeqlabError::LengthMismatch {
                tokens: tokens.len(),
                tags: tags.len(),
            });
        }
        Ok(Self { tokens, tags })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Token, sentence and entity counts of a corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub sentences: usize,
    pub tokens: usize,
    pub entities: BTreeMap<String, usize>,
}

/// A list of tagged sentences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpus {
    sentences: Vec<Sentence>,
}

impl Corpus {
    pub fn new(sentences: Vec<Sentence>) -> Self {
        Self { sentences }
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sentence> {
        self.sentences.iter()
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn into_sentences(self) -> Vec<Sentence> {
        self.sentences
    }

    /// Entity labels used anywhere in the corpus, sorted.
    pub fn labels(&self) -> BTreeSet<String> {
        labels_of(self.sentences.iter().flat_map(|s| s.tags.iter()))
    }

    /// Convert every sentence to BILUO tags.
    pub fn to_biluo(&self) -> Corpus {
        self.map_tags(bio_to_biluo)
    }

    /// Convert every sentence to BIO tags.
    pub fn to_bio(&self) -> Corpus {
        self.map_tags(biluo_to_bio)
    }

    fn map_tags(&self, f: fn(&[Tag]) -> Vec<Tag>) -> Corpus {
        Corpus::new(
            self.sentences
                .iter()
                .map(|s| Sentence {
                    tokens: s.tokens.clone(),
                    tags: f(&s.tags),
                })
                .collect(),
        )
    }

    /// Shuffle with a fixed seed and split into (train, validation).
    ///
    /// # Arguments
    /// * `train_fraction` - Proportion for training, e.g. 0.8 = 80%
    /// * `seed` - RNG seed, so the split is reproducible
    pub fn split(&self, train_fraction: f64, seed: u64) -> Result<(Corpus, Corpus)> {
        if !(0.0..=1.0).contains(&train_fraction) {
            return Err(SeqlabError::InvalidArgument(format!(
                "train fraction must be within [0, 1], got {train_fraction}"
            )));
        }

        let mut sentences = self.sentences.clone();
        let mut rng = Rand32::new(seed);
        shuffle(&mut sentences, &mut rng);

        let split_at = ((sentences.len() as f64) * train_fraction).round() as usize;
        let dev = sentences.split_off(split_at.min(sentences.len()));
        Ok((Corpus::new(sentences), Corpus::new(dev)))
    }

    pub fn stats(&self) -> CorpusStats {
        let mut entities = BTreeMap::new();
        for span in self.sentences.iter().flat_map(|s| spans(&s.tags)) {
            *entities.entry(span.label).or_insert(0) += 1;
        }
        CorpusStats {
            sentences: self.sentences.len(),
            tokens: self.sentences.iter().map(Sentence::len).sum(),
            entities,
        }
    }
}

impl Index<usize> for Corpus {
    type Output = Sentence;

    fn index(&self, idx: usize) -> &Sentence {
        &self.sentences[idx]
    }
}

impl<'a> IntoIterator for &'a Corpus {
    type Item = &'a Sentence;
    type IntoIter = std::slice::Iter<'a, Sentence>;

    fn into_iter(self) -> Self::IntoIter {
        self.sentences.iter()
    }
}

impl FromIterator<Sentence> for Corpus {
    fn from_iter<I: IntoIterator<Item = Sentence>>(iter: I) -> Self {
        Corpus::new(iter.into_iter().collect())
    }
}

/// Fisher-Yates shuffle driven by `oorandom`.
pub fn shuffle<T>(items: &mut [T], rng: &mut Rand32) {
    for i in (1..items.len()).rev() {
        let j = rng.rand_range(0..(i as u32 + 1)) as usize;
        items.swap(i, j);
    }
}
