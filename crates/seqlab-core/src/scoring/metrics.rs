//! Precision / recall / F1 accumulation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqlabError};
use crate::scoring::report::Report;
use crate::tagging::tags::{Span, Tag, bio_to_biluo, spans};

/// True positive, false positive and false negative counts for one class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub tp: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl Counts {
    /// Precision; 0.0 when nothing was predicted.
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Recall; 0.0 when there is nothing to find.
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }

    pub fn support(&self) -> usize {
        self.tp + self.fn_
    }

    fn add(&mut self, other: &Counts) {
        self.tp += other.tp;
        self.fp += other.fp;
        self.fn_ += other.fn_;
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 { 0.0 } else { num as f64 / denom as f64 }
}

/// Per-class scores as they appear in a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl From<&Counts> for ClassMetrics {
    fn from(c: &Counts) -> Self {
        Self {
            precision: c.precision(),
            recall: c.recall(),
            f1: c.f1(),
            support: c.support(),
        }
    }
}

/// Per-class metrics plus micro and macro averages.
pub(crate) fn summarize(
    counts: &BTreeMap<String, Counts>,
) -> (BTreeMap<String, ClassMetrics>, ClassMetrics, ClassMetrics) {
    let per_class: BTreeMap<String, ClassMetrics> = counts
        .iter()
        .map(|(label, c)| (label.clone(), ClassMetrics::from(c)))
        .collect();

    let mut total = Counts::default();
    for c in counts.values() {
        total.add(c);
    }
    let micro = ClassMetrics::from(&total);

    let n = per_class.len().max(1) as f64;
    let macro_avg = ClassMetrics {
        precision: per_class.values().map(|m| m.precision).sum::<f64>() / n,
        recall: per_class.values().map(|m| m.recall).sum::<f64>() / n,
        f1: per_class.values().map(|m| m.f1).sum::<f64>() / n,
        support: total.support(),
    };

    (per_class, micro, macro_avg)
}

/// Accumulates gold/predicted comparisons over many sentences.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    token: BTreeMap<String, Counts>,
    entity: BTreeMap<String, Counts>,
    correct_tags: usize,
    total_tags: usize,
    sentences: usize,
}

impl Scorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare one predicted sequence with its gold sequence.
    ///
    /// Both sides may use BIO or BILUO; they are normalised to BILUO first.
    pub fn score(&mut self, gold: &[Tag], pred: &[Tag]) -> Result<()> {
        if gold.len() != pred.len() {
            return Err(SeqlabError::LengthMismatch {
                tokens: gold.len(),
                tags: pred.len(),
            });
        }

        let gold = bio_to_biluo(gold);
        let pred = bio_to_biluo(pred);
        self.sentences += 1;

        // Position by position, by entity label
        for (g, p) in gold.iter().zip(&pred) {
            self.total_tags += 1;
            if g == p {
                self.correct_tags += 1;
            }

            match (g.label(), p.label()) {
                (Some(gl), Some(pl)) if gl == pl => self.token_counts(gl).tp += 1,
                (gl, pl) => {
                    if let Some(pl) = pl {
                        self.token_counts(pl).fp += 1;
                    }
                    if let Some(gl) = gl {
                        self.token_counts(gl).fn_ += 1;
                    }
                }
            }
        }

        // Exact entity spans
        let gold_spans: BTreeSet<Span> = spans(&gold).into_iter().collect();
        let pred_spans: BTreeSet<Span> = spans(&pred).into_iter().collect();
        for span in gold_spans.intersection(&pred_spans) {
            self.entity_counts(&span.label).tp += 1;
        }
        for span in pred_spans.difference(&gold_spans) {
            self.entity_counts(&span.label).fp += 1;
        }
        for span in gold_spans.difference(&pred_spans) {
            self.entity_counts(&span.label).fn_ += 1;
        }

        Ok(())
    }

    fn token_counts(&mut self, label: &str) -> &mut Counts {
        self.token.entry(label.to_string()).or_default()
    }

    fn entity_counts(&mut self, label: &str) -> &mut Counts {
        self.entity.entry(label.to_string()).or_default()
    }

    pub fn report(&self) -> Report {
        let (entity, entity_micro, entity_macro) = summarize(&self.entity);
        let (token, token_micro, token_macro) = summarize(&self.token);
        Report {
            entity,
            entity_micro,
            entity_macro,
            token,
            token_micro,
            token_macro,
            token_accuracy: ratio(self.correct_tags, self.total_tags),
            sentences: self.sentences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(s: &str) -> Vec<Tag> {
        s.split_whitespace().map(|t| Tag::parse(t).unwrap()).collect()
    }

    #[test]
    fn test_counts_zero_division() {
        let c = Counts::default();
        assert_eq!(c.precision(), 0.0);
        assert_eq!(c.recall(), 0.0);
        assert_eq!(c.f1(), 0.0);
    }

    #[test]
    fn test_perfect_prediction() {
        let mut scorer = Scorer::new();
        let gold = tags("B-PER I-PER O B-LOC");
        scorer.score(&gold, &gold).unwrap();
        let report = scorer.report();
        assert_eq!(report.entity_micro.f1, 1.0);
        assert_eq!(report.token_micro.f1, 1.0);
        assert_eq!(report.token_accuracy, 1.0);
        assert_eq!(report.entity["PER"].support, 1);
    }

    #[test]
    fn test_partial_entity_match() {
        let mut scorer = Scorer::new();
        // Predicted PER covers only the first token.
        scorer
            .score(&tags("B-PER I-PER O B-LOC"), &tags("B-PER O O B-LOC"))
            .unwrap();
        let report = scorer.report();

        // Entities: LOC right, PER wrong span.
        assert_eq!(report.entity["LOC"].f1, 1.0);
        assert_eq!(report.entity["PER"].precision, 0.0);
        assert_eq!(report.entity_micro.precision, 0.5);
        assert_eq!(report.entity_micro.recall, 0.5);

        // Tokens: PER 1 tp + 1 fn, LOC 1 tp.
        assert_eq!(report.token["PER"].precision, 1.0);
        assert_eq!(report.token["PER"].recall, 0.5);
        assert_eq!(report.token_accuracy, 0.5);
    }

    #[test]
    fn test_wrong_label_counts_both_sides() {
        let mut scorer = Scorer::new();
        scorer.score(&tags("B-ORG"), &tags("B-LOC")).unwrap();
        let report = scorer.report();
        assert_eq!(report.token["ORG"].recall, 0.0);
        assert_eq!(report.token["LOC"].precision, 0.0);
        assert_eq!(report.entity_micro.f1, 0.0);
    }

    #[test]
    fn test_macro_average() {
        let mut scorer = Scorer::new();
        scorer
            .score(&tags("B-PER O B-LOC"), &tags("B-PER O O"))
            .unwrap();
        let report = scorer.report();
        assert_eq!(report.entity_macro.recall, 0.5);
        assert_eq!(report.entity_macro.support, 2);
    }

    #[test]
    fn test_length_mismatch() {
        let mut scorer = Scorer::new();
        assert!(scorer.score(&tags("O O"), &tags("O")).is_err());
    }
}
