//! Intrinsic evaluation: word-pair similarity and analogy benchmarks.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EmbedError, Result};
use crate::vectors::KeyedVectors;

/// A human-rated word pair, e.g. one line of WordSim-353.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordPair {
    pub a: String,
    pub b: String,
    pub score: f64,
}

/// One `a : b :: c : d` question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analogy {
    pub section: String,
    pub a: String,
    pub b: String,
    pub c: String,
    pub expected: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairEvaluation {
    /// Spearman rank correlation; 0 when fewer than two pairs were usable.
    pub spearman: f64,
    pub pairs_used: usize,
    /// Fraction of pairs skipped because a word was out of vocabulary.
    pub oov_ratio: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionScore {
    pub correct: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalogyEvaluation {
    pub accuracy: f64,
    pub correct: usize,
    /// Questions whose four words were all in vocabulary.
    pub total: usize,
    pub skipped: usize,
    pub sections: BTreeMap<String, SectionScore>,
}

/// Parse word pairs: `word1 word2 score` per line, tab or space separated.
/// Blank lines and lines starting with `#` are ignored.
pub fn parse_word_pairs(text: &str) -> Result<Vec<WordPair>> {
    let mut pairs = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [a, b, score] = fields[..] else {
            return Err(EmbedError::Format {
                line: n + 1,
                reason: format!("expected 3 fields, got {}", fields.len()),
            });
        };
        let score = score.parse().map_err(|_| EmbedError::Format {
            line: n + 1,
            reason: format!("bad score {score:?}"),
        })?;
        pairs.push(WordPair {
            a: a.to_lowercase(),
            b: b.to_lowercase(),
            score,
        });
    }
    Ok(pairs)
}

pub fn read_word_pairs<P: AsRef<Path>>(path: P) -> Result<Vec<WordPair>> {
    parse_word_pairs(&fs::read_to_string(path)?)
}

/// Parse analogies in the `questions-words.txt` layout: `: section` headers
/// followed by four words per line.
pub fn parse_analogies(text: &str) -> Result<Vec<Analogy>> {
    let mut section = String::from("default");
    let mut questions = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix(':') {
            section = name.trim().to_string();
            continue;
        }
        let words: Vec<String> = line.split_whitespace().map(str::to_lowercase).collect();
        let [a, b, c, expected] = <[String; 4]>::try_from(words).map_err(|w| EmbedError::Format {
            line: n + 1,
            reason: format!("expected 4 words, got {}", w.len()),
        })?;
        questions.push(Analogy {
            section: section.clone(),
            a,
            b,
            c,
            expected,
        });
    }
    Ok(questions)
}

pub fn read_analogies<P: AsRef<Path>>(path: P) -> Result<Vec<Analogy>> {
    parse_analogies(&fs::read_to_string(path)?)
}

impl KeyedVectors {
    /// Correlate cosine similarity with human judgements.
    pub fn evaluate_word_pairs(&self, pairs: &[WordPair]) -> Result<PairEvaluation> {
        let mut model = Vec::new();
        let mut human = Vec::new();
        for pair in pairs {
            if !self.contains(&pair.a) || !self.contains(&pair.b) {
                continue;
            }
            model.push(self.similarity(&pair.a, &pair.b)? as f64);
            human.push(pair.score);
        }

        let skipped = pairs.len() - model.len();
        let oov_ratio = if pairs.is_empty() {
            0.0
        } else {
            skipped as f64 / pairs.len() as f64
        };
        let evaluation = PairEvaluation {
            spearman: spearman(&model, &human),
            pairs_used: model.len(),
            oov_ratio,
        };
        debug!(
            spearman = evaluation.spearman,
            used = evaluation.pairs_used,
            skipped,
            "word pair evaluation"
        );
        Ok(evaluation)
    }

    /// Answer each analogy with the top 3CosAdd candidate and count hits.
    pub fn evaluate_analogies(&self, questions: &[Analogy]) -> Result<AnalogyEvaluation> {
        let mut sections: BTreeMap<String, SectionScore> = BTreeMap::new();
        let mut skipped = 0;

        for q in questions {
            let words = [&q.a, &q.b, &q.c, &q.expected];
            if words.iter().any(|w| !self.contains(w)) {
                skipped += 1;
                continue;
            }
            let answer = self.most_similar(&[q.b.as_str(), q.c.as_str()], &[q.a.as_str()], 1)?;
            let hit = answer.first().is_some_and(|(w, _)| *w == q.expected);

            let score = sections.entry(q.section.clone()).or_default();
            score.total += 1;
            score.correct += usize::from(hit);
        }

        let correct = sections.values().map(|s| s.correct).sum();
        let total = sections.values().map(|s| s.total).sum();
        let accuracy = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };
        debug!(accuracy, correct, total, skipped, "analogy evaluation");
        Ok(AnalogyEvaluation {
            accuracy,
            correct,
            total,
            skipped,
            sections,
        })
    }
}

/// Spearman's rho: Pearson correlation of average ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }
    pearson(&ranks(x), &ranks(y))
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return 0.0;
    }
    sxy / (sxx * syy).sqrt()
}

/// 1-based ranks; tied values share the mean of their positions.
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = rank;
        }
        i = j + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectors::tests::royals;

    #[test]
    fn test_ranks_with_ties() {
        assert_eq!(ranks(&[10.0, 20.0, 20.0, 5.0]), vec![2.0, 3.5, 3.5, 1.0]);
    }

    #[test]
    fn test_spearman() {
        assert!((spearman(&[1.0, 2.0, 3.0], &[10.0, 20.0, 30.0]) - 1.0).abs() < 1e-12);
        assert!((spearman(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
        // monotone but nonlinear
        assert!((spearman(&[1.0, 2.0, 3.0, 4.0], &[1.0, 4.0, 9.0, 100.0]) - 1.0).abs() < 1e-12);
        assert_eq!(spearman(&[1.0], &[1.0]), 0.0);
        assert_eq!(spearman(&[1.0, 1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_parse_word_pairs() {
        let pairs = parse_word_pairs("# comment\nKing\tqueen\t8.5\n\ncat dog 7\n").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].a, "king");
        assert_eq!(pairs[1].score, 7.0);

        let err = parse_word_pairs("a b\n").unwrap_err();
        assert!(matches!(err, EmbedError::Format { line: 1, .. }));
        assert!(parse_word_pairs("a b high\n").is_err());
    }

    #[test]
    fn test_parse_analogies() {
        let text = ": royalty\nking queen man woman\n: misc\nMan Woman King Queen\n";
        let questions = parse_analogies(text).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].section, "royalty");
        assert_eq!(questions[1].expected, "queen");
        assert!(parse_analogies("a b c\n").is_err());
    }

    #[test]
    fn test_evaluate_word_pairs() {
        let kv = royals();
        let pairs = parse_word_pairs(
            "king prince 9\nking man 6\nking apple 1\nking unicorn 5\n",
        )
        .unwrap();
        let eval = kv.evaluate_word_pairs(&pairs).unwrap();
        assert_eq!(eval.pairs_used, 3);
        assert!((eval.oov_ratio - 0.25).abs() < 1e-12);
        assert!((eval.spearman - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_analogies() {
        let kv = royals();
        let questions = parse_analogies(
            ": gender\nman woman king queen\nman king woman queen\n: oov\nman woman dragon queen\n",
        )
        .unwrap();
        let eval = kv.evaluate_analogies(&questions).unwrap();
        assert_eq!(eval.total, 2);
        assert_eq!(eval.skipped, 1);
        assert_eq!(eval.sections["gender"].correct, eval.correct);
        assert_eq!(eval.correct, 2);
        assert_eq!(eval.accuracy, 1.0);
    }
}
