//! NER training loop with validation-driven checkpointing and early stopping.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use oorandom::Rand32;
use serde::{Deserialize, Serialize};
use seqlab_core::{Corpus, Sentence, Tagger, evaluate};
use tracing::{debug, info, warn};

use crate::batching::{compounding, minibatches, shuffle};
use crate::config::NerTrainConfig;

/// File written next to the model with the per-iteration history.
pub const SUMMARY_FILE: &str = "training.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationLog {
    pub iteration: usize,
    /// Mis-tagged training tokens during the pass.
    pub loss: f32,
    pub scores: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSummary {
    pub iterations: Vec<IterationLog>,
    /// 1-based iteration that produced the saved model.
    pub best_iteration: Option<usize>,
    /// Entity micro F1 of the saved model on the dev set.
    pub best_f1: f64,
    pub early_stopped: bool,
    pub output_dir: PathBuf,
}

pub struct NerTrainer {
    tagger: Tagger,
    config: NerTrainConfig,
}

impl NerTrainer {
    /// Start from a blank model over `labels`.
    pub fn from_scratch<I, S>(labels: I, config: NerTrainConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tagger: Tagger::new(labels),
            config,
        }
    }

    /// Continue training a saved model.
    pub fn fine_tune<P: AsRef<Path>>(model_dir: P, config: NerTrainConfig) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let tagger = Tagger::load(model_dir)
            .with_context(|| format!("loading model from {}", model_dir.display()))?;
        info!(
            path = %model_dir.display(),
            labels = ?tagger.labels(),
            epochs = tagger.meta().epochs,
            "fine-tuning existing model"
        );
        Ok(Self { tagger, config })
    }

    pub fn tagger(&self) -> &Tagger {
        &self.tagger
    }

    pub fn into_tagger(self) -> Tagger {
        self.tagger
    }

    pub fn config(&self) -> &NerTrainConfig {
        &self.config
    }

    /// Add every label in `corpus` the model does not know yet. Returns the
    /// labels that were added.
    pub fn add_labels_from(&mut self, corpus: &Corpus) -> Vec<String> {
        corpus
            .labels()
            .into_iter()
            .filter(|label| self.tagger.add_label(label.clone()))
            .collect()
    }

    /// Train on `train`, validating on `dev` after every pass.
    ///
    /// The model is written to `output_dir` each time dev entity F1 improves
    /// on the best seen so far. Training stops after `n_iter` passes, or once
    /// `patience` passes go by without improvement.
    pub fn train(&mut self, train: &Corpus, dev: &Corpus) -> Result<TrainSummary> {
        if train.is_empty() {
            bail!("training corpus is empty");
        }
        if dev.is_empty() {
            bail!("dev corpus is empty");
        }

        let added = self.add_labels_from(train);
        if !added.is_empty() {
            info!(?added, "new entity labels");
        }
        let unseen: Vec<String> = dev
            .labels()
            .into_iter()
            .filter(|l| !self.tagger.labels().contains(l))
            .collect();
        if !unseen.is_empty() {
            warn!(?unseen, "dev labels never seen in training");
        }

        let config = &self.config;
        info!(
            train = train.len(),
            dev = dev.len(),
            n_iter = config.n_iter,
            dropout = config.dropout,
            patience = config.patience,
            "starting NER training"
        );

        let mut rng = Rand32::new(config.seed);
        let mut order: Vec<&Sentence> = train.iter().collect();
        let mut sizes = compounding(config.batch_start, config.batch_stop, config.batch_rate);

        let mut summary = TrainSummary {
            iterations: Vec::new(),
            best_iteration: None,
            best_f1: 0.0,
            early_stopped: false,
            output_dir: config.output_dir.clone(),
        };

        for iteration in 1..=config.n_iter {
            shuffle(&mut order, &mut rng);

            let mut loss = 0.0;
            let mut batches = 0usize;
            for batch in minibatches(&order, sizes.by_ref()) {
                for sentence in batch {
                    loss += self.tagger.update(
                        &sentence.tokens,
                        &sentence.tags,
                        config.dropout,
                        &mut rng,
                    )?;
                }
                batches += 1;
            }
            self.tagger.finish_training();
            self.tagger.meta_mut().epochs += 1;

            let report = evaluate(&self.tagger, dev)?;
            let f1 = report.f1();
            let scores = report.to_scores();
            info!(
                iteration,
                loss,
                batches,
                ents_p = format!("{:.3}", report.entity_micro.precision),
                ents_r = format!("{:.3}", report.entity_micro.recall),
                ents_f = format!("{f1:.3}"),
                "iteration finished"
            );
            summary.iterations.push(IterationLog {
                iteration,
                loss,
                scores: scores.clone(),
            });

            match summary.best_iteration {
                Some(best) if f1 <= summary.best_f1 => {
                    if config.patience > 0 && iteration - best >= config.patience {
                        info!(iteration, best, "no improvement, stopping early");
                        summary.early_stopped = true;
                        break;
                    }
                }
                _ => {
                    summary.best_iteration = Some(iteration);
                    summary.best_f1 = f1;
                    self.tagger.meta_mut().scores = scores;
                    self.tagger.save(&config.output_dir).with_context(|| {
                        format!("saving model to {}", config.output_dir.display())
                    })?;
                    debug!(iteration, f1, "dev score improved");
                }
            }
        }

        fs::create_dir_all(&config.output_dir)
            .with_context(|| format!("creating {}", config.output_dir.display()))?;
        let path = config.output_dir.join(SUMMARY_FILE);
        fs::write(&path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(
            best_iteration = ?summary.best_iteration,
            best_f1 = summary.best_f1,
            path = %config.output_dir.display(),
            "training finished"
        );
        Ok(summary)
    }
}

/// Split a corpus into train and dev parts using the configured fraction.
pub fn holdout(corpus: &Corpus, config: &NerTrainConfig) -> Result<(Corpus, Corpus)> {
    let (train, dev) = corpus.split(1.0 - config.dev_fraction, config.seed)?;
    if train.is_empty() || dev.is_empty() {
        bail!(
            "corpus of {} sentences is too small for a {:.0}% dev split",
            corpus.len(),
            config.dev_fraction * 100.0
        );
    }
    Ok((train, dev))
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqlab_core::corpus::parse_corpus;

    const NAMES: [&str; 6] = ["Alice", "Bruno", "Chen", "Dmitri", "Elena", "Farah"];
    const CITIES: [&str; 6] = ["Paris", "Lagos", "Berlin", "Lima", "Osaka", "Quito"];

    fn synthetic(offset: usize, n: usize) -> Corpus {
        let mut text = String::new();
        for i in 0..n {
            let name = NAMES[(i + offset) % NAMES.len()];
            let city = CITIES[(i * 5 + offset) % CITIES.len()];
            if i % 2 == 0 {
                text.push_str(&format!(
                    "{name}\tB-PER\nvisited\tO\n{city}\tB-LOC\nyesterday\tO\n\n"
                ));
            } else {
                text.push_str(&format!(
                    "In\tO\n{city}\tB-LOC\n,\tO\n{name}\tB-PER\nsmiled\tO\n\n"
                ));
            }
        }
        parse_corpus(&text).unwrap()
    }

    fn config(dir: &Path) -> NerTrainConfig {
        NerTrainConfig::new()
            .with_n_iter(8)
            .with_dropout(0.1)
            .with_patience(3)
            .with_seed(1)
            .with_output_dir(dir.join("model"))
    }

    #[test]
    fn test_train_from_scratch_saves_best() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = NerTrainer::from_scratch(Vec::<String>::new(), config(dir.path()));
        let summary = trainer.train(&synthetic(0, 40), &synthetic(3, 12)).unwrap();

        assert!(summary.best_f1 > 0.9, "best f1 {}", summary.best_f1);
        assert!(summary.best_iteration.is_some());
        assert!(!summary.iterations.is_empty());
        assert_eq!(trainer.tagger().labels(), ["LOC", "PER"]);

        let saved = Tagger::load(dir.path().join("model")).unwrap();
        assert!(saved.meta().scores["ents_f"] > 0.9);
        assert!(dir.path().join("model").join(SUMMARY_FILE).exists());
    }

    #[test]
    fn test_early_stopping() {
        let dir = tempfile::tempdir().unwrap();
        let dev = parse_corpus("Zanzibar\tB-MISC\nrocks\tO\n").unwrap();
        let mut trainer = NerTrainer::from_scratch(["PER", "LOC"], config(dir.path()));
        let summary = trainer.train(&synthetic(0, 10), &dev).unwrap();

        assert!(summary.early_stopped);
        assert_eq!(summary.best_iteration, Some(1));
        assert_eq!(summary.iterations.len(), 4);
    }

    #[test]
    fn test_worse_passes_keep_saved_model() {
        let dir = tempfile::tempdir().unwrap();
        let dev = parse_corpus("Zanzibar\tB-MISC\nrocks\tO\n").unwrap();
        let mut trainer = NerTrainer::from_scratch(["PER", "LOC"], config(dir.path()));
        let summary = trainer.train(&synthetic(0, 10), &dev).unwrap();

        // later passes never beat the first, so the saved model is the first one
        assert_eq!(trainer.tagger().meta().epochs, summary.iterations.len());
        let saved = Tagger::load(dir.path().join("model")).unwrap();
        assert_eq!(Some(saved.meta().epochs), summary.best_iteration);
        let first = &summary.iterations[0].scores;
        assert!(saved.meta().scores.keys().eq(first.keys()));
        assert_eq!(saved.meta().scores["ents_f"], first["ents_f"]);
    }

    #[test]
    fn test_zero_patience_runs_every_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let dev = parse_corpus("Zanzibar\tB-MISC\nrocks\tO\n").unwrap();
        let config = config(dir.path()).with_n_iter(6).with_patience(0);
        let mut trainer = NerTrainer::from_scratch(["PER", "LOC"], config);
        let summary = trainer.train(&synthetic(0, 10), &dev).unwrap();

        assert!(!summary.early_stopped);
        assert_eq!(summary.iterations.len(), 6);
        assert_eq!(summary.best_iteration, Some(1));
    }

    #[test]
    fn test_config_file_with_zero_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ner.json");
        let out = dir.path().join("out");
        fs::write(
            &path,
            format!(r#"{{"n_iter": 0, "output_dir": {:?}}}"#, out.to_string_lossy()),
        )
        .unwrap();

        let config = NerTrainConfig::from_file(&path).unwrap();
        let mut trainer = NerTrainer::from_scratch(["PER", "LOC"], config);
        let summary = trainer.train(&synthetic(0, 6), &synthetic(1, 2)).unwrap();
        assert_eq!(summary.iterations.len(), 1);
        assert!(out.join(SUMMARY_FILE).exists());
        assert!(Tagger::load(&out).is_ok());
    }

    #[test]
    fn test_fine_tune_adds_labels() {
        let dir = tempfile::tempdir().unwrap();
        let mut base = NerTrainer::from_scratch(["PER"], config(dir.path()).with_n_iter(2));
        let per_only = parse_corpus("Alice\tB-PER\nslept\tO\n\nBruno\tB-PER\nate\tO\n").unwrap();
        base.train(&per_only, &per_only).unwrap();

        let tuned_config = config(dir.path()).with_output_dir(dir.path().join("tuned"));
        let mut tuned = NerTrainer::fine_tune(dir.path().join("model"), tuned_config).unwrap();
        let epochs_before = tuned.tagger().meta().epochs;
        tuned.train(&synthetic(0, 20), &synthetic(1, 6)).unwrap();

        let tagger = tuned.into_tagger();
        assert!(tagger.labels().contains(&"LOC".to_string()));
        assert!(tagger.meta().epochs > epochs_before);
    }

    #[test]
    fn test_fine_tune_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let err = NerTrainer::fine_tune(dir.path().join("nope"), NerTrainConfig::new())
            .err()
            .unwrap();
        assert!(err.to_string().contains("loading model"));
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = NerTrainer::from_scratch(["PER"], config(dir.path()));
        let empty = Corpus::default();
        assert!(trainer.train(&empty, &synthetic(0, 2)).is_err());
        assert!(trainer.train(&synthetic(0, 2), &empty).is_err());
    }

    #[test]
    fn test_holdout() {
        let corpus = synthetic(0, 10);
        let config = NerTrainConfig::new().with_dev_fraction(0.2);
        let (train, dev) = holdout(&corpus, &config).unwrap();
        assert_eq!((train.len(), dev.len()), (8, 2));

        let tiny = synthetic(0, 1);
        assert!(holdout(&tiny, &config).is_err());
    }
}
