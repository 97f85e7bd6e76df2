pub mod metrics;
pub mod report;

pub use metrics::{ClassMetrics, Counts, Scorer};
pub use report::Report;

use tracing::debug;

use crate::corpus::Corpus;
use crate::error::Result;
use crate::tagging::Tagger;

/// Run the tagger over every sentence and score it against the gold tags.
pub fn evaluate(tagger: &Tagger, corpus: &Corpus) -> Result<Report> {
    let mut scorer = Scorer::new();
    for sentence in corpus {
        let pred = tagger.predict(&sentence.tokens)?;
        scorer.score(&sentence.tags, &pred)?;
    }
    let report = scorer.report();
    debug!(
        sentences = report.sentences,
        ents_f = report.f1(),
        "evaluation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::parse_corpus;

    #[test]
    fn test_evaluate_untrained() {
        let corpus = parse_corpus("Rome\tB-LOC\nfell\tO\n").unwrap();
        let tagger = Tagger::new(["LOC"]);
        let report = evaluate(&tagger, &corpus).unwrap();
        assert_eq!(report.sentences, 1);
        assert_eq!(report.f1(), 0.0);
        assert_eq!(report.entity["LOC"].support, 1);
        assert_eq!(report.token_accuracy, 0.5);
    }
}
