use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scoring::metrics::ClassMetrics;

/// Evaluation results over a corpus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Exact-span entity scores per label.
    pub entity: BTreeMap<String, ClassMetrics>,
    pub entity_micro: ClassMetrics,
    pub entity_macro: ClassMetrics,
    /// Position-by-position scores per entity label (`O` excluded).
    pub token: BTreeMap<String, ClassMetrics>,
    pub token_micro: ClassMetrics,
    pub token_macro: ClassMetrics,
    /// Share of positions whose full tag matched.
    pub token_accuracy: f64,
    pub sentences: usize,
}

impl Report {
    /// Micro-averaged entity F1, the metric used for model selection.
    pub fn f1(&self) -> f64 {
        self.entity_micro.f1
    }

    /// Flat score map stored in model metadata.
    pub fn to_scores(&self) -> BTreeMap<String, f64> {
        let mut scores = BTreeMap::new();
        scores.insert("ents_p".to_string(), self.entity_micro.precision);
        scores.insert("ents_r".to_string(), self.entity_micro.recall);
        scores.insert("ents_f".to_string(), self.entity_micro.f1);
        scores.insert("token_acc".to_string(), self.token_accuracy);
        for (label, m) in &self.entity {
            scores.insert(format!("ents_f/{label}"), m.f1);
        }
        scores
    }
}

fn write_table(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    rows: &BTreeMap<String, ClassMetrics>,
    micro: &ClassMetrics,
    macro_avg: &ClassMetrics,
) -> fmt::Result {
    let width = rows.keys().map(String::len).max().unwrap_or(0).max(11);
    writeln!(
        f,
        "{title:<width$}  {:>9}  {:>9}  {:>9}  {:>9}",
        "precision", "recall", "f1-score", "support"
    )?;
    let row = |f: &mut fmt::Formatter<'_>, name: &str, m: &ClassMetrics| {
        writeln!(
            f,
            "{name:<width$}  {:>9.4}  {:>9.4}  {:>9.4}  {:>9}",
            m.precision, m.recall, m.f1, m.support
        )
    };
    for (label, m) in rows {
        row(f, label, m)?;
    }
    writeln!(f)?;
    row(f, "micro avg", micro)?;
    row(f, "macro avg", macro_avg)
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_table(f, "entities", &self.entity, &self.entity_micro, &self.entity_macro)?;
        writeln!(f)?;
        write_table(f, "tokens", &self.token, &self.token_micro, &self.token_macro)?;
        writeln!(f)?;
        writeln!(
            f,
            "token accuracy {:.4} over {} sentences",
            self.token_accuracy, self.sentences
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::Scorer;
    use crate::tagging::tags::Tag;

    #[test]
    fn test_display_contains_rows() {
        let tags: Vec<Tag> = ["B-PER", "O", "B-LOC"]
            .iter()
            .map(|t| Tag::parse(t).unwrap())
            .collect();
        let mut scorer = Scorer::new();
        scorer.score(&tags, &tags).unwrap();
        let text = scorer.report().to_string();

        assert!(text.contains("PER"));
        assert!(text.contains("LOC"));
        assert!(text.contains("micro avg"));
        assert!(text.contains("1.0000"));
        assert!(text.contains("token accuracy 1.0000 over 1 sentences"));
    }

    #[test]
    fn test_scores_map() {
        let report = Report::default();
        let scores = report.to_scores();
        assert_eq!(scores["ents_f"], 0.0);
        assert!(scores.contains_key("token_acc"));
    }
}
