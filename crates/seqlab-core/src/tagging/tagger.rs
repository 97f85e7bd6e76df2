//! # Averaged Perceptron Entity Tagger
//!
//! A structured perceptron over BILUO tags: sparse lexical features produce
//! emission scores, a learned transition matrix scores tag bigrams, and the
//! constrained Viterbi decoder picks the best valid sequence. Weights are
//! averaged over all updates, which is what gets saved.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use oorandom::Rand32;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SeqlabError};
use crate::tagging::features::sentence_features;
use crate::tagging::tags::{Entity, Tag, TagSet, biluo_to_bio, bio_to_biluo, spans};
use crate::tagging::tokenizer::Tokenizer;
use crate::tagging::viterbi::{Constraints, ViterbiDecoder};

/// File holding the weights inside a model directory.
pub const MODEL_FILE: &str = "model.json";
/// File holding the model metadata inside a model directory.
pub const META_FILE: &str = "meta.json";

/// One weight vector together with its averaging bookkeeping.
#[derive(Debug, Clone, Default)]
struct AveragedVec {
    weights: Vec<f32>,
    totals: Vec<f32>,
    stamps: Vec<u64>,
}

impl AveragedVec {
    fn from_weights(weights: Vec<f32>) -> Self {
        let n = weights.len();
        Self {
            weights,
            totals: vec![0.0; n],
            stamps: vec![0; n],
        }
    }

    fn zeros(n: usize) -> Self {
        Self::from_weights(vec![0.0; n])
    }

    fn get(&self, idx: usize) -> f32 {
        self.weights.get(idx).copied().unwrap_or(0.0)
    }

    fn resize(&mut self, n: usize) {
        if self.weights.len() < n {
            self.weights.resize(n, 0.0);
            self.totals.resize(n, 0.0);
            self.stamps.resize(n, 0);
        }
    }

    fn update(&mut self, idx: usize, delta: f32, now: u64) {
        self.resize(idx + 1);
        self.totals[idx] += (now - self.stamps[idx]) as f32 * self.weights[idx];
        self.stamps[idx] = now;
        self.weights[idx] += delta;
    }

    /// Replace the live weights with their average and reset the bookkeeping.
    fn average(&mut self, now: u64) {
        for idx in 0..self.weights.len() {
            let total = self.totals[idx] + (now - self.stamps[idx]) as f32 * self.weights[idx];
            self.weights[idx] = total / now as f32;
        }
        self.totals.iter_mut().for_each(|t| *t = 0.0);
        self.stamps.iter_mut().for_each(|s| *s = 0);
    }
}

/// Descriptive metadata saved next to the weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub name: String,
    pub version: String,
    pub labels: Vec<String>,
    /// Training iterations this model has seen, across fine-tuning runs.
    pub epochs: usize,
    /// Evaluation scores recorded when the model was saved.
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
}

/// On-disk representation of the weights.
#[derive(Serialize, Deserialize)]
struct ModelFile {
    tag_set: TagSet,
    transitions: Vec<Vec<f32>>,
    features: HashMap<String, Vec<f32>>,
}

/// Averaged perceptron BILUO tagger.
#[derive(Debug, Clone)]
pub struct Tagger {
    tag_set: TagSet,
    features: HashMap<String, AveragedVec>,
    /// Row per previous tag.
    transitions: Vec<AveragedVec>,
    constraints: Constraints,
    viterbi: ViterbiDecoder,
    tokenizer: Tokenizer,
    /// Number of training instances seen since the last averaging.
    instances: u64,
    meta: ModelMeta,
}

impl Tagger {
    /// Create a blank model for the given entity labels.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tag_set = TagSet::new(labels);
        let n = tag_set.len();
        let meta = ModelMeta {
            name: "ner".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            labels: tag_set.labels().to_vec(),
            ..ModelMeta::default()
        };

        Self {
            constraints: constraints_for(&tag_set),
            viterbi: ViterbiDecoder::new(n),
            transitions: (0..n).map(|_| AveragedVec::zeros(n)).collect(),
            features: HashMap::new(),
            tokenizer: Tokenizer::new(),
            instances: 0,
            tag_set,
            meta,
        }
    }

    pub fn labels(&self) -> &[String] {
        self.tag_set.labels()
    }

    pub fn tag_set(&self) -> &TagSet {
        &self.tag_set
    }

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut ModelMeta {
        &mut self.meta
    }

    /// Number of distinct features with weights.
    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Add an entity label. Existing weights are kept, so a trained model can
    /// be fine-tuned on a corpus with new entity types.
    pub fn add_label(&mut self, label: impl Into<String>) -> bool {
        let label = label.into();
        if !self.tag_set.add_label(label.clone()) {
            return false;
        }

        let n = self.tag_set.len();
        for row in &mut self.transitions {
            row.resize(n);
        }
        while self.transitions.len() < n {
            self.transitions.push(AveragedVec::zeros(n));
        }
        self.constraints = constraints_for(&self.tag_set);
        self.viterbi = ViterbiDecoder::new(n);
        self.meta.labels = self.tag_set.labels().to_vec();
        debug!(label = %label, num_tags = n, "added label");
        true
    }

    fn emissions(&self, feats: &[Vec<String>]) -> Vec<Vec<f32>> {
        let n = self.tag_set.len();
        feats
            .iter()
            .map(|token_feats| {
                let mut scores = vec![0.0f32; n];
                for f in token_feats {
                    if let Some(w) = self.features.get(f) {
                        for (tag, score) in scores.iter_mut().enumerate() {
                            *score += w.get(tag);
                        }
                    }
                }
                scores
            })
            .collect()
    }

    fn transition_matrix(&self) -> Vec<Vec<f32>> {
        let n = self.tag_set.len();
        self.transitions
            .iter()
            .map(|row| (0..n).map(|curr| row.get(curr)).collect())
            .collect()
    }

    fn decode(&self, feats: &[Vec<String>]) -> Result<Vec<usize>> {
        let emissions = self.emissions(feats);
        self.viterbi
            .decode(&emissions, &self.transition_matrix(), &self.constraints)
    }

    fn to_tags(&self, path: &[usize]) -> Vec<Tag> {
        path.iter()
            .map(|&idx| self.tag_set.tag(idx).cloned().unwrap_or_else(Tag::outside))
            .collect()
    }

    /// Predict BILUO tags for a tokenized sentence.
    pub fn predict(&self, tokens: &[String]) -> Result<Vec<Tag>> {
        let feats = sentence_features(tokens);
        let path = self.decode(&feats)?;
        Ok(self.to_tags(&path))
    }

    /// Predict BIO tags for a tokenized sentence.
    pub fn predict_bio(&self, tokens: &[String]) -> Result<Vec<Tag>> {
        Ok(biluo_to_bio(&self.predict(tokens)?))
    }

    /// Tokenize raw text and return the entities found in it.
    ///
    /// # Examples
    /// ```
    /// use seqlab_core::Tagger;
    ///
    /// let tagger = Tagger::new(["PER"]);
    /// // An untrained model tags nothing.
    /// assert!(tagger.tag_text("Ada Lovelace wrote notes").unwrap().is_empty());
    /// ```
    pub fn tag_text(&self, text: &str) -> Result<Vec<Entity>> {
        let tokens = self.tokenizer.tokenize(text);
        let words: Vec<String> = tokens.iter().map(|t| t.text.clone()).collect();
        let tags = self.predict(&words)?;

        Ok(spans(&tags)
            .into_iter()
            .filter_map(|span| {
                let (start, end) = self.tokenizer.get_spans(&tokens, span.start, span.end)?;
                Some(Entity {
                    label: span.label,
                    text: text[start..end].to_string(),
                    start,
                    end,
                })
            })
            .collect())
    }

    /// One perceptron update on a gold-annotated sentence.
    ///
    /// `gold` may be BIO or BILUO. Each feature is ignored with probability
    /// `dropout` for this update. Returns the number of mis-tagged tokens.
    pub fn update(
        &mut self,
        tokens: &[String],
        gold: &[Tag],
        dropout: f32,
        rng: &mut Rand32,
    ) -> Result<f32> {
        if tokens.len() != gold.len() {
            return Err(SeqlabError::LengthMismatch {
                tokens: tokens.len(),
                tags: gold.len(),
            });
        }
        if tokens.is_empty() {
            return Ok(0.0);
        }

        let gold_idx = bio_to_biluo(gold)
            .iter()
            .map(|tag| {
                self.tag_set.index(tag).ok_or_else(|| {
                    SeqlabError::UnknownLabel(tag.label().unwrap_or("O").to_string())
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut feats = sentence_features(tokens);
        if dropout > 0.0 {
            for token_feats in &mut feats {
                token_feats.retain(|_| rng.rand_float() >= dropout);
            }
        }

        self.instances += 1;
        let now = self.instances;
        let guess = self.decode(&feats)?;
        if guess == gold_idx {
            return Ok(0.0);
        }

        let n = self.tag_set.len();
        let mut loss = 0.0;
        for (i, token_feats) in feats.iter().enumerate() {
            let (truth, pred) = (gold_idx[i], guess[i]);
            if truth == pred {
                continue;
            }
            loss += 1.0;
            for f in token_feats {
                let w = self
                    .features
                    .entry(f.clone())
                    .or_insert_with(|| AveragedVec::zeros(n));
                w.update(truth, 1.0, now);
                w.update(pred, -1.0, now);
            }
        }

        for i in 1..guess.len() {
            let gold_pair = (gold_idx[i - 1], gold_idx[i]);
            let guess_pair = (guess[i - 1], guess[i]);
            if gold_pair != guess_pair {
                self.transitions[gold_pair.0].update(gold_pair.1, 1.0, now);
                self.transitions[guess_pair.0].update(guess_pair.1, -1.0, now);
            }
        }

        Ok(loss)
    }

    /// Fold the averaged weights into the live weights.
    ///
    /// Call after each training pass, before evaluating or saving. Training can
    /// continue afterwards: the averaged weights become the new starting point.
    pub fn finish_training(&mut self) {
        let now = self.instances;
        if now == 0 {
            return;
        }
        for w in self.features.values_mut() {
            w.average(now);
        }
        for row in &mut self.transitions {
            row.average(now);
        }
        self.features
            .retain(|_, w| w.weights.iter().any(|&x| x.abs() > f32::EPSILON));
        self.instances = 0;
        debug!(features = self.features.len(), "averaged weights");
    }

    /// Save the model to a directory (`model.json` and `meta.json`).
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let n = self.tag_set.len();
        let file = ModelFile {
            tag_set: self.tag_set.clone(),
            transitions: self.transition_matrix(),
            features: self
                .features
                .iter()
                .map(|(k, w)| {
                    let mut weights = w.weights.clone();
                    weights.resize(n, 0.0);
                    (k.clone(), weights)
                })
                .collect(),
        };

        fs::write(dir.join(MODEL_FILE), serde_json::to_string(&file)?)?;
        fs::write(dir.join(META_FILE), serde_json::to_string_pretty(&self.meta)?)?;
        info!(path = %dir.display(), "model saved");
        Ok(())
    }

    /// Load a model saved with [`Tagger::save`].
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let model_path = dir.join(MODEL_FILE);
        if !model_path.exists() {
            return Err(SeqlabError::ModelLoad(format!(
                "model not found at {}",
                model_path.display()
            )));
        }

        let file: ModelFile = serde_json::from_str(&fs::read_to_string(&model_path)?)?;
        let n = file.tag_set.len();
        if file.transitions.len() != n || file.transitions.iter().any(|r| r.len() != n) {
            return Err(SeqlabError::ModelLoad(format!(
                "transition matrix does not match {n} tags"
            )));
        }

        let mut tagger = Tagger::new(file.tag_set.labels().iter().cloned());
        tagger.transitions = file
            .transitions
            .into_iter()
            .map(AveragedVec::from_weights)
            .collect();
        tagger.features = file
            .features
            .into_iter()
            .map(|(k, w)| (k, AveragedVec::from_weights(w)))
            .collect();

        let meta_path = dir.join(META_FILE);
        if meta_path.exists() {
            tagger.meta = serde_json::from_str(&fs::read_to_string(&meta_path)?)?;
            tagger.meta.labels = tagger.tag_set.labels().to_vec();
        }

        info!(
            path = %dir.display(),
            labels = ?tagger.labels(),
            features = tagger.features.len(),
            "model loaded"
        );
        Ok(tagger)
    }
}

fn constraints_for(tag_set: &TagSet) -> Constraints {
    Constraints {
        valid: tag_set.transition_mask(),
        start: tag_set.start_mask(),
        end: tag_set.end_mask(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagging::tags::Span;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn tags(s: &str) -> Vec<Tag> {
        s.split_whitespace().map(|t| Tag::parse(t).unwrap()).collect()
    }

    fn training_data() -> Vec<(Vec<String>, Vec<Tag>)> {
        vec![
            (toks("Alice lives in Paris"), tags("B-PER O O B-LOC")),
            (toks("Bob Smith visited London"), tags("B-PER I-PER O B-LOC")),
            (toks("Carol moved to Berlin"), tags("B-PER O O B-LOC")),
            (toks("the weather in Paris is nice"), tags("O O O B-LOC O O")),
            (toks("Alice Jones likes London"), tags("B-PER I-PER O B-LOC")),
        ]
    }

    fn trained() -> Tagger {
        let mut tagger = Tagger::new(["PER", "LOC"]);
        let mut rng = Rand32::new(7);
        for _ in 0..20 {
            for (tokens, gold) in training_data() {
                tagger.update(&tokens, &gold, 0.0, &mut rng).unwrap();
            }
        }
        tagger.finish_training();
        tagger
    }

    #[test]
    fn test_untrained_predicts_outside() {
        let tagger = Tagger::new(["PER"]);
        let pred = tagger.predict(&toks("hello there")).unwrap();
        assert!(pred.iter().all(Tag::is_outside));
        assert!(tagger.predict(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_learns_training_data() {
        let tagger = trained();
        for (tokens, gold) in training_data() {
            assert_eq!(tagger.predict(&tokens).unwrap(), bio_to_biluo(&gold));
        }
    }

    #[test]
    fn test_predictions_are_valid_biluo() {
        let tagger = trained();
        let pred = tagger.predict(&toks("Bob visited Paris and London with Alice Smith")).unwrap();
        let bio = biluo_to_bio(&pred);
        assert_eq!(bio_to_biluo(&bio), pred);
    }

    #[test]
    fn test_update_errors() {
        let mut tagger = Tagger::new(["PER"]);
        let mut rng = Rand32::new(1);
        let err = tagger.update(&toks("a b"), &tags("O"), 0.0, &mut rng);
        assert!(matches!(err, Err(SeqlabError::LengthMismatch { .. })));

        let err = tagger.update(&toks("Paris"), &tags("B-LOC"), 0.0, &mut rng);
        assert!(matches!(err, Err(SeqlabError::UnknownLabel(l)) if l == "LOC"));
    }

    #[test]
    fn test_update_returns_loss() {
        let mut tagger = Tagger::new(["PER"]);
        let mut rng = Rand32::new(1);
        let loss = tagger
            .update(&toks("Alice sings"), &tags("B-PER O"), 0.0, &mut rng)
            .unwrap();
        assert_eq!(loss, 1.0);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut tagger = trained();
        tagger.meta_mut().epochs = 20;
        tagger.save(dir.path()).unwrap();

        let loaded = Tagger::load(dir.path()).unwrap();
        assert_eq!(loaded.labels(), tagger.labels());
        assert_eq!(loaded.meta().epochs, 20);
        let sentence = toks("Bob Smith lives in Berlin");
        assert_eq!(loaded.predict(&sentence).unwrap(), tagger.predict(&sentence).unwrap());
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Tagger::load(dir.path()),
            Err(SeqlabError::ModelLoad(_))
        ));
    }

    #[test]
    fn test_fine_tune_with_new_label() {
        let mut tagger = trained();
        assert!(tagger.add_label("ORG"));
        assert!(!tagger.add_label("PER"));

        let mut rng = Rand32::new(3);
        let extra = vec![
            (toks("Alice works at Google"), tags("B-PER O O B-ORG")),
            (toks("Bob joined Google in Paris"), tags("B-PER O B-ORG O B-LOC")),
        ];
        for _ in 0..20 {
            for (tokens, gold) in training_data().into_iter().chain(extra.clone()) {
                tagger.update(&tokens, &gold, 0.0, &mut rng).unwrap();
            }
        }
        tagger.finish_training();

        let pred = tagger.predict(&toks("Alice works at Google")).unwrap();
        assert_eq!(pred, tags("U-PER O O U-ORG"));
    }

    #[test]
    fn test_tag_text_offsets() {
        let tagger = trained();
        let text = "Bob Smith visited London";
        let entities = tagger.tag_text(text).unwrap();
        assert!(entities.iter().any(|e| e.label == "LOC" && e.text == "London"));
        for e in &entities {
            assert_eq!(&text[e.start..e.end], e.text);
        }
        let per: Vec<Span> = spans(&tagger.predict(&toks("Bob Smith visited London")).unwrap())
            .into_iter()
            .filter(|s| s.label == "PER")
            .collect();
        assert_eq!(per.len(), 1);
    }
}
