//! Plain-text corpus reading for embedding training.
//!
//! One sentence per line, optionally gzip-compressed. Lines are lowercased and
//! split into word tokens; punctuation is dropped.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::LazyLock;

use flate2::read::GzDecoder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:['’\-][\p{L}\p{N}]+)*").expect("static word pattern")
});

/// Common English function words.
pub const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "for", "from", "had", "has",
    "have", "he", "her", "his", "i", "in", "is", "it", "its", "of", "on", "or", "she", "that",
    "the", "their", "them", "they", "this", "to", "was", "we", "were", "which", "with", "you",
];

/// How raw lines become token sequences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextOptions {
    pub lowercase: bool,
    /// Drop words listed in [`ENGLISH_STOPWORDS`].
    pub remove_stopwords: bool,
    /// Sentences with fewer tokens are discarded.
    pub min_tokens: usize,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            lowercase: true,
            remove_stopwords: false,
            min_tokens: 2,
        }
    }
}

/// Turns lines into word tokens according to [`TextOptions`].
#[derive(Debug, Clone)]
pub struct TextReader {
    options: TextOptions,
    stopwords: HashSet<&'static str>,
}

impl TextReader {
    pub fn new(options: TextOptions) -> Self {
        let stopwords = if options.remove_stopwords {
            ENGLISH_STOPWORDS.iter().copied().collect()
        } else {
            HashSet::new()
        };
        Self { options, stopwords }
    }

    /// Split one line into word tokens.
    pub fn tokenize(&self, line: &str) -> Vec<String> {
        WORD_RE
            .find_iter(line)
            .map(|m| {
                if self.options.lowercase {
                    m.as_str().to_lowercase()
                } else {
                    m.as_str().to_string()
                }
            })
            .filter(|w| {
                self.stopwords.is_empty() || !self.stopwords.contains(w.to_lowercase().as_str())
            })
            .collect()
    }

    /// Read every sentence from a reader.
    pub fn read<R: BufRead>(&self, reader: R) -> Result<Vec<Vec<String>>> {
        let mut sentences = Vec::new();
        for line in reader.lines() {
            let tokens = self.tokenize(&line?);
            if tokens.len() >= self.options.min_tokens.max(1) {
                sentences.push(tokens);
            }
        }
        Ok(sentences)
    }

    /// Read a text file; files ending in `.gz` are decompressed on the fly.
    pub fn read_path<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Vec<String>>> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let raw: Box<dyn Read> = if path.extension().is_some_and(|e| e == "gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let sentences = self.read(BufReader::new(raw))?;
        info!(
            path = %path.display(),
            sentences = sentences.len(),
            tokens = sentences.iter().map(Vec::len).sum::<usize>(),
            "text corpus loaded"
        );
        Ok(sentences)
    }
}

impl Default for TextReader {
    fn default() -> Self {
        Self::new(TextOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_tokenize() {
        let reader = TextReader::default();
        assert_eq!(
            reader.tokenize("The King's well-known horse, aged 12!"),
            ["the", "king's", "well-known", "horse", "aged", "12"]
        );
    }

    #[test]
    fn test_stopwords_and_case() {
        let reader = TextReader::new(TextOptions {
            lowercase: false,
            remove_stopwords: true,
            min_tokens: 1,
        });
        assert_eq!(reader.tokenize("The Queen and A King"), ["Queen", "King"]);
    }

    #[test]
    fn test_read_drops_short_lines() {
        let reader = TextReader::default();
        let sentences = reader.read("one\n\nthe quick fox\n...\n".as_bytes()).unwrap();
        assert_eq!(sentences, vec![vec!["the", "quick", "fox"]]);
    }

    #[test]
    fn test_read_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.txt.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        writeln!(enc, "alpha beta gamma").unwrap();
        writeln!(enc, "delta epsilon").unwrap();
        enc.finish().unwrap();

        let sentences = TextReader::default().read_path(&path).unwrap();
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[1], ["delta", "epsilon"]);
    }
}
