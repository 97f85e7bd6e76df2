//! Trained word vectors and similarity queries.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::error::{EmbedError, Result};

/// Minimum Jaro-Winkler similarity for an out-of-vocabulary suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// A read-only table of word vectors.
#[derive(Debug, Clone)]
pub struct KeyedVectors {
    words: Vec<String>,
    index: HashMap<String, usize>,
    dim: usize,
    data: Vec<f32>,
    norms: Vec<f32>,
}

impl KeyedVectors {
    /// `data` holds `words.len()` rows of `dim` values, row-major.
    pub fn new(words: Vec<String>, dim: usize, data: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            return Err(EmbedError::InvalidArgument("dim must be positive".into()));
        }
        if data.len() != words.len() * dim {
            return Err(EmbedError::InvalidArgument(format!(
                "expected {} values for {} words of dim {dim}, got {}",
                words.len() * dim,
                words.len(),
                data.len()
            )));
        }

        let mut index = HashMap::with_capacity(words.len());
        for (i, word) in words.iter().enumerate() {
            if index.insert(word.clone(), i).is_some() {
                return Err(EmbedError::InvalidArgument(format!(
                    "duplicate word {word:?}"
                )));
            }
        }
        let norms = data.chunks_exact(dim).map(norm).collect();

        Ok(Self {
            words,
            index,
            dim,
            data,
            norms,
        })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn contains(&self, word: &str) -> bool {
        self.index.contains_key(word)
    }

    /// Row index of `word`, or an out-of-vocabulary error with a spelling hint.
    pub fn index_of(&self, word: &str) -> Result<usize> {
        self.index
            .get(word)
            .copied()
            .ok_or_else(|| EmbedError::OutOfVocabulary {
                word: word.to_string(),
                suggestion: self.suggest(word),
            })
    }

    /// Vector at row `i`, in the order of [`KeyedVectors::words`].
    pub fn vector(&self, i: usize) -> Option<&[f32]> {
        (i < self.len()).then(|| self.row(i))
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    pub fn get(&self, word: &str) -> Result<&[f32]> {
        Ok(self.row(self.index_of(word)?))
    }

    /// Cosine similarity between two words.
    pub fn similarity(&self, a: &str, b: &str) -> Result<f32> {
        let (i, j) = (self.index_of(a)?, self.index_of(b)?);
        Ok(self.cosine_rows(i, j))
    }

    /// Cosine distance, `1 - similarity`.
    pub fn distance(&self, a: &str, b: &str) -> Result<f32> {
        Ok(1.0 - self.similarity(a, b)?)
    }

    /// Words closest to the mean of the `positive` unit vectors minus the
    /// `negative` ones (3CosAdd). Query words never appear in the result.
    pub fn most_similar(
        &self,
        positive: &[&str],
        negative: &[&str],
        topn: usize,
    ) -> Result<Vec<(String, f32)>> {
        if positive.is_empty() && negative.is_empty() {
            return Err(EmbedError::InvalidArgument(
                "most_similar needs at least one word".into(),
            ));
        }

        let mut query = vec![0.0f32; self.dim];
        let mut exclude = HashSet::new();
        let terms = positive
            .iter()
            .map(|w| (w, 1.0f32))
            .chain(negative.iter().map(|w| (w, -1.0f32)));
        for (word, weight) in terms {
            let i = self.index_of(word)?;
            exclude.insert(i);
            let scale = weight / self.norms[i].max(f32::MIN_POSITIVE);
            for (q, x) in query.iter_mut().zip(self.row(i)) {
                *q += scale * x;
            }
        }

        Ok(self.nearest(&query, topn, &exclude))
    }

    /// Words closest to an arbitrary vector.
    pub fn similar_by_vector(&self, vector: &[f32], topn: usize) -> Result<Vec<(String, f32)>> {
        if vector.len() != self.dim {
            return Err(EmbedError::InvalidArgument(format!(
                "query has dim {}, vectors have dim {}",
                vector.len(),
                self.dim
            )));
        }
        Ok(self.nearest(vector, topn, &HashSet::new()))
    }

    /// The word least similar to the mean of the group.
    pub fn doesnt_match(&self, words: &[&str]) -> Result<String> {
        if words.len() < 2 {
            return Err(EmbedError::InvalidArgument(
                "doesnt_match needs at least two words".into(),
            ));
        }
        let rows = words
            .iter()
            .map(|w| self.index_of(w))
            .collect::<Result<Vec<_>>>()?;

        let mut mean = vec![0.0f32; self.dim];
        for &i in &rows {
            let scale = 1.0 / self.norms[i].max(f32::MIN_POSITIVE);
            for (m, x) in mean.iter_mut().zip(self.row(i)) {
                *m += scale * x;
            }
        }

        let odd = rows
            .iter()
            .map(|&i| (i, self.cosine_with(i, &mean)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| self.words[i].clone());
        odd.ok_or_else(|| EmbedError::InvalidArgument("no words given".into()))
    }

    fn nearest(&self, query: &[f32], topn: usize, exclude: &HashSet<usize>) -> Vec<(String, f32)> {
        let qnorm = norm(query).max(f32::MIN_POSITIVE);
        let mut scored: Vec<(usize, f32)> = (0..self.len())
            .filter(|i| !exclude.contains(i))
            .map(|i| {
                let denom = qnorm * self.norms[i].max(f32::MIN_POSITIVE);
                (i, dot(query, self.row(i)) / denom)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(topn);
        scored
            .into_iter()
            .map(|(i, s)| (self.words[i].clone(), s))
            .collect()
    }

    fn cosine_rows(&self, i: usize, j: usize) -> f32 {
        let denom = (self.norms[i] * self.norms[j]).max(f32::MIN_POSITIVE);
        dot(self.row(i), self.row(j)) / denom
    }

    fn cosine_with(&self, i: usize, v: &[f32]) -> f32 {
        let denom = (self.norms[i] * norm(v)).max(f32::MIN_POSITIVE);
        dot(self.row(i), v) / denom
    }

    fn suggest(&self, word: &str) -> Option<String> {
        self.words
            .iter()
            .map(|w| (w, strsim::jaro_winkler(word, w)))
            .filter(|&(_, score)| score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(w, _)| w.clone())
    }

    /// Write in the word2vec text format: an `n dim` header, then one
    /// `word v1 ... vdim` line per word.
    pub fn write_text<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "{} {}", self.len(), self.dim)?;
        for (i, word) in self.words.iter().enumerate() {
            write!(writer, "{word}")?;
            for x in self.row(i) {
                write!(writer, " {x}")?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save_text<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.write_text(BufWriter::new(File::create(path)?))?;
        info!(path = %path.display(), words = self.len(), "vectors saved");
        Ok(())
    }

    /// Parse the word2vec text format.
    pub fn read_text<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();
        let header = lines.next().ok_or(EmbedError::Format {
            line: 1,
            reason: "missing header".into(),
        })??;
        let (count, dim) = parse_header(&header)?;

        let mut words = Vec::with_capacity(count);
        let mut data = Vec::with_capacity(count * dim);
        for (n, line) in lines.enumerate() {
            let line = line?;
            let line_no = n + 2;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let word = fields.next().unwrap_or_default();
            let before = data.len();
            for field in fields {
                let x: f32 = field.parse().map_err(|_| EmbedError::Format {
                    line: line_no,
                    reason: format!("bad number {field:?}"),
                })?;
                data.push(x);
            }
            if data.len() - before != dim {
                return Err(EmbedError::Format {
                    line: line_no,
                    reason: format!("expected {dim} values, got {}", data.len() - before),
                });
            }
            words.push(word.to_string());
        }

        if words.len() != count {
            return Err(EmbedError::Format {
                line: 1,
                reason: format!("header declares {count} words, found {}", words.len()),
            });
        }
        Self::new(words, dim, data)
    }

    pub fn load_text<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let vectors = Self::read_text(BufReader::new(File::open(path)?))?;
        info!(path = %path.display(), words = vectors.len(), dim = vectors.dim, "vectors loaded");
        Ok(vectors)
    }
}

fn parse_header(header: &str) -> Result<(usize, usize)> {
    let bad = || EmbedError::Format {
        line: 1,
        reason: format!("expected \"<count> <dim>\" header, got {header:?}"),
    };
    let mut parts = header.split_whitespace();
    let count = parts.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
    let dim: usize = parts.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
    if parts.next().is_some() || dim == 0 {
        return Err(bad());
    }
    Ok((count, dim))
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Hand-built vectors with a clear gender/royalty geometry.
    pub(crate) fn royals() -> KeyedVectors {
        let rows: [(&str, [f32; 3]); 6] = [
            ("king", [1.0, 1.0, 0.0]),
            ("queen", [1.0, -1.0, 0.0]),
            ("man", [0.0, 1.0, 0.1]),
            ("woman", [0.0, -1.0, 0.1]),
            ("apple", [0.0, 0.0, 1.0]),
            ("prince", [0.9, 1.0, 0.05]),
        ];
        let words = rows.iter().map(|(w, _)| w.to_string()).collect();
        let data = rows.iter().flat_map(|(_, v)| *v).collect();
        KeyedVectors::new(words, 3, data).unwrap()
    }

    #[test]
    fn test_vector_by_index() {
        let kv = royals();
        assert_eq!(kv.vector(0), Some(kv.get(&kv.words()[0]).unwrap()));
        assert_eq!(kv.vector(kv.len()), None);
    }

    #[test]
    fn test_similarity_and_distance() {
        let kv = royals();
        assert!((kv.similarity("king", "king").unwrap() - 1.0).abs() < 1e-6);
        assert!(kv.similarity("king", "prince").unwrap() > 0.9);
        assert!(kv.similarity("king", "apple").unwrap().abs() < 1e-6);
        assert!((kv.distance("king", "apple").unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_most_similar_excludes_query() {
        let kv = royals();
        let result = kv.most_similar(&["king"], &[], 2).unwrap();
        assert_eq!(result[0].0, "prince");
        assert!(result.iter().all(|(w, _)| w != "king"));
    }

    #[test]
    fn test_analogy() {
        let kv = royals();
        let result = kv.most_similar(&["king", "woman"], &["man"], 1).unwrap();
        assert_eq!(result[0].0, "queen");
    }

    #[test]
    fn test_doesnt_match() {
        let kv = royals();
        assert_eq!(
            kv.doesnt_match(&["king", "prince", "man", "apple"]).unwrap(),
            "apple"
        );
        assert!(kv.doesnt_match(&["king"]).is_err());
    }

    #[test]
    fn test_oov_suggestion() {
        let kv = royals();
        match kv.get("kinng") {
            Err(EmbedError::OutOfVocabulary { word, suggestion }) => {
                assert_eq!(word, "kinng");
                assert_eq!(suggestion.as_deref(), Some("king"));
            }
            other => panic!("expected OOV error, got {other:?}"),
        }
        assert!(matches!(
            kv.similarity("king", "zzzzzz"),
            Err(EmbedError::OutOfVocabulary { suggestion: None, .. })
        ));
    }

    #[test]
    fn test_text_format_roundtrip() {
        let kv = royals();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/vectors.txt");
        kv.save_text(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("6 3\nking 1 1 0\n"));

        let loaded = KeyedVectors::load_text(&path).unwrap();
        assert_eq!(loaded.words(), kv.words());
        assert_eq!(loaded.get("queen").unwrap(), kv.get("queen").unwrap());
    }

    #[test]
    fn test_read_text_errors() {
        let err = KeyedVectors::read_text("2 3\na 1 2 3\nb 1 2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, EmbedError::Format { line: 3, .. }));

        let err = KeyedVectors::read_text("x y\n".as_bytes()).unwrap_err();
        assert!(matches!(err, EmbedError::Format { line: 1, .. }));

        let err = KeyedVectors::read_text("3 1\na 1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, EmbedError::Format { line: 1, .. }));
    }

    #[test]
    fn test_new_rejects_bad_shape() {
        assert!(KeyedVectors::new(vec!["a".into()], 2, vec![1.0]).is_err());
        assert!(KeyedVectors::new(vec!["a".into(), "a".into()], 1, vec![1.0, 2.0]).is_err());
    }
}
