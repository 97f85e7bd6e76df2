//! Skip-gram with negative sampling, trained with candle.
//!
//! Each step scores a minibatch of (center, context, negatives) triples:
//!
//! ```text
//! loss = -log σ(u·v) - Σ_k log σ(-u·n_k)
//! ```
//!
//! where `u` is the center's input vector, `v` the context's output vector and
//! `n_k` the output vectors of the sampled noise words. Gradients come from
//! candle's autograd; parameters are updated with plain SGD whose learning rate
//! decays linearly with the number of words processed.

use candle_core::{DType, Device, Tensor};
use candle_nn::{Embedding, Init, Module, Optimizer, SGD, VarBuilder, VarMap};
use oorandom::Rand32;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EmbedError, Result};
use crate::vectors::KeyedVectors;
use crate::vocab::{NoiseDistribution, Vocab};

/// Hyperparameters for [`train`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Word2VecConfig {
    /// Vector dimensionality.
    pub dim: usize,
    /// Maximum distance between center and context word.
    pub window: usize,
    /// Words rarer than this are dropped from the vocabulary.
    pub min_count: u64,
    /// Noise words per positive pair.
    pub negative: usize,
    pub epochs: usize,
    /// Initial learning rate.
    pub learning_rate: f64,
    /// Floor for the linearly decayed learning rate.
    pub min_learning_rate: f64,
    /// Subsampling threshold for frequent words; 0 disables subsampling.
    pub sample: f64,
    /// Positive pairs per optimizer step.
    pub batch_size: usize,
    pub seed: u64,
    /// Keep only the most frequent words.
    pub max_vocab: Option<usize>,
}

impl Default for Word2VecConfig {
    fn default() -> Self {
        Self {
            dim: 100,
            window: 5,
            min_count: 5,
            negative: 5,
            epochs: 5,
            learning_rate: 0.025,
            min_learning_rate: 0.0001,
            sample: 1e-3,
            batch_size: 256,
            seed: 42,
            max_vocab: None,
        }
    }
}

impl Word2VecConfig {
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim.max(1);
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn with_min_count(mut self, min_count: u64) -> Self {
        self.min_count = min_count.max(1);
        self
    }

    pub fn with_negative(mut self, negative: usize) -> Self {
        self.negative = negative.max(1);
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs.max(1);
        self
    }

    /// Set the initial learning rate. The floor is lowered to match if needed.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate.max(f64::EPSILON);
        self.min_learning_rate = self.min_learning_rate.min(self.learning_rate);
        self
    }

    pub fn with_sample(mut self, sample: f64) -> Self {
        self.sample = sample.max(0.0);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_vocab(mut self, max_vocab: Option<usize>) -> Self {
        self.max_vocab = max_vocab;
        self
    }

    /// Re-apply the builder clamps, for configs read from files.
    pub fn normalized(mut self) -> Self {
        let read = self.clone();
        if read.learning_rate.is_nan() {
            self.learning_rate = Self::default().learning_rate;
        }
        self.min_learning_rate = read.min_learning_rate.max(0.0);
        let learning_rate = self.learning_rate;
        self.with_dim(read.dim)
            .with_window(read.window)
            .with_min_count(read.min_count)
            .with_negative(read.negative)
            .with_epochs(read.epochs)
            .with_learning_rate(learning_rate)
            .with_sample(read.sample)
            .with_batch_size(read.batch_size)
    }

    fn validate(&self) -> Result<()> {
        let positive = [
            ("dim", self.dim),
            ("window", self.window),
            ("negative", self.negative),
            ("epochs", self.epochs),
            ("batch_size", self.batch_size),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(EmbedError::InvalidArgument(format!("{name} must be positive")));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(EmbedError::InvalidArgument(
                "learning_rate must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// The two embedding tables and the optimizer over them.
struct SkipGram {
    input: Embedding,
    output: Embedding,
    input_weights: Tensor,
    optimizer: SGD,
    negative: usize,
    device: Device,
}

impl SkipGram {
    fn new(vocab_size: usize, config: &Word2VecConfig) -> Result<Self> {
        let device = Device::Cpu;
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let shape = (vocab_size, config.dim);
        let input_weights = vb.get_with_hints(shape, "input", Init::Const(0.0))?;
        let output_weights = vb.get_with_hints(shape, "output", Init::Const(0.0))?;

        // candle's own random init is not seedable; draw from our RNG instead
        let mut rng = Rand32::new(config.seed ^ 0x5eed);
        let bound = 0.5 / config.dim as f32;
        let init: Vec<f32> = (0..vocab_size * config.dim)
            .map(|_| (rng.rand_float() * 2.0 - 1.0) * bound)
            .collect();
        varmap.set_one("input", Tensor::from_vec(init, shape, &device)?)?;

        let optimizer = SGD::new(varmap.all_vars(), config.learning_rate)?;
        Ok(Self {
            input: Embedding::new(input_weights.clone(), config.dim),
            output: Embedding::new(output_weights, config.dim),
            input_weights,
            optimizer,
            negative: config.negative,
            device,
        })
    }

    /// One SGD step over a batch. Returns the summed loss.
    fn step(&mut self, batch: &Batch, learning_rate: f64) -> Result<f32> {
        let n = batch.centers.len();
        let centers = Tensor::from_slice(&batch.centers, n, &self.device)?;
        let contexts = Tensor::from_slice(&batch.contexts, n, &self.device)?;
        let negatives = Tensor::from_slice(&batch.negatives, n * self.negative, &self.device)?;

        let u = self.input.forward(&centers)?; // (n, dim)
        let v = self.output.forward(&contexts)?; // (n, dim)
        let noise = self
            .output
            .forward(&negatives)?
            .reshape((n, self.negative, ()))?; // (n, k, dim)

        let positive = (&u * &v)?.sum(1)?; // (n)
        let negative = noise.matmul(&u.unsqueeze(2)?)?.squeeze(2)?; // (n, k)

        // -log σ(x) = softplus(-x), -log σ(-x) = softplus(x)
        let loss = (softplus(&positive.neg()?)?.sum_all()? + softplus(&negative)?.sum_all()?)?;

        self.optimizer.set_learning_rate(learning_rate);
        self.optimizer.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()?)
    }

    fn into_vectors(self, vocab: &Vocab, dim: usize) -> Result<KeyedVectors> {
        let data = self.input_weights.flatten_all()?.to_vec1::<f32>()?;
        KeyedVectors::new(vocab.words().to_vec(), dim, data)
    }
}

/// Numerically stable `log(1 + exp(x))`.
fn softplus(x: &Tensor) -> candle_core::Result<Tensor> {
    let tail = x.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    x.relu()? + tail
}

#[derive(Default)]
struct Batch {
    centers: Vec<u32>,
    contexts: Vec<u32>,
    negatives: Vec<u32>,
}

impl Batch {
    fn len(&self) -> usize {
        self.centers.len()
    }

    fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    fn push(
        &mut self,
        center: u32,
        context: u32,
        noise: &NoiseDistribution,
        k: usize,
        rng: &mut Rand32,
    ) {
        self.centers.push(center);
        self.contexts.push(context);
        self.negatives.extend((0..k).map(|_| noise.sample(rng)));
    }

    fn clear(&mut self) {
        self.centers.clear();
        self.contexts.clear();
        self.negatives.clear();
    }
}

/// Linear decay from the initial rate to the floor over the whole run.
fn decayed_rate(config: &Word2VecConfig, processed: u64, planned: u64) -> f64 {
    let progress = if planned == 0 {
        1.0
    } else {
        processed as f64 / planned as f64
    };
    (config.learning_rate * (1.0 - progress)).max(config.min_learning_rate)
}

/// Train skip-gram vectors on tokenized sentences.
///
/// Returns [`EmbedError::EmptyVocabulary`] when no word reaches
/// `config.min_count`.
pub fn train<S: AsRef<str>>(
    sentences: &[Vec<S>],
    config: &Word2VecConfig,
) -> Result<KeyedVectors> {
    config.validate()?;

    let vocab = Vocab::build(sentences, config.min_count, config.max_vocab);
    if vocab.is_empty() {
        return Err(EmbedError::EmptyVocabulary);
    }
    let encoded: Vec<Vec<u32>> = sentences
        .iter()
        .map(|s| vocab.encode(s))
        .filter(|s| s.len() > 1)
        .collect();
    let words_per_epoch: u64 = encoded.iter().map(|s| s.len() as u64).sum();
    let planned = words_per_epoch * config.epochs as u64;

    info!(
        vocab = vocab.len(),
        sentences = encoded.len(),
        dim = config.dim,
        epochs = config.epochs,
        "training skip-gram"
    );

    let noise = vocab.noise_distribution();
    let keep: Vec<f64> = (0..vocab.len() as u32)
        .map(|id| vocab.keep_probability(id, config.sample))
        .collect();

    let mut model = SkipGram::new(vocab.len(), config)?;
    let mut rng = Rand32::new(config.seed);
    let mut batch = Batch::default();
    let mut processed = 0u64;

    for epoch in 1..=config.epochs {
        let mut epoch_loss = 0.0f64;
        let mut epoch_pairs = 0usize;

        for sentence in &encoded {
            let kept: Vec<u32> = sentence
                .iter()
                .copied()
                .filter(|&id| (rng.rand_float() as f64) < keep[id as usize])
                .collect();
            processed += sentence.len() as u64;

            for (pos, &center) in kept.iter().enumerate() {
                let reach = rng.rand_range(0..config.window as u32) as usize + 1;
                let lo = pos.saturating_sub(reach);
                let hi = (pos + reach + 1).min(kept.len());
                for (ctx_pos, &context) in kept.iter().enumerate().take(hi).skip(lo) {
                    if ctx_pos == pos {
                        continue;
                    }
                    batch.push(center, context, &noise, config.negative, &mut rng);
                    if batch.len() >= config.batch_size {
                        let lr = decayed_rate(config, processed, planned);
                        epoch_loss += model.step(&batch, lr)? as f64;
                        epoch_pairs += batch.len();
                        batch.clear();
                    }
                }
            }
        }

        if !batch.is_empty() {
            let lr = decayed_rate(config, processed, planned);
            epoch_loss += model.step(&batch, lr)? as f64;
            epoch_pairs += batch.len();
            batch.clear();
        }

        let mean_loss = if epoch_pairs == 0 {
            0.0
        } else {
            epoch_loss / epoch_pairs as f64
        };
        info!(
            epoch,
            pairs = epoch_pairs,
            loss = format!("{mean_loss:.4}"),
            lr = format!("{:.5}", decayed_rate(config, processed, planned)),
            "epoch finished"
        );
    }

    debug!(processed, "skip-gram training done");
    model.into_vectors(&vocab, config.dim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_corpus() -> Vec<Vec<String>> {
        let animals = ["cat", "dog", "mouse"];
        let fruits = ["apple", "pear", "plum"];
        let mut sentences = Vec::new();
        for i in 0..60 {
            let a = animals[i % 3];
            let b = animals[(i + 1) % 3];
            sentences.push(
                format!("the {a} chased the {b} around the barn")
                    .split(' ')
                    .map(String::from)
                    .collect(),
            );
            let f = fruits[i % 3];
            let g = fruits[(i + 2) % 3];
            sentences.push(
                format!("she ate a ripe {f} and a sweet {g}")
                    .split(' ')
                    .map(String::from)
                    .collect(),
            );
        }
        sentences
    }

    fn small_config() -> Word2VecConfig {
        Word2VecConfig::default()
            .with_dim(16)
            .with_window(2)
            .with_min_count(1)
            .with_negative(3)
            .with_epochs(3)
            .with_sample(0.0)
            .with_batch_size(64)
            .with_seed(7)
    }

    #[test]
    fn test_train_produces_vectors_for_vocab() {
        let kv = train(&toy_corpus(), &small_config()).unwrap();
        assert_eq!(kv.dim(), 16);
        assert!(kv.contains("barn"));
        assert!(kv.contains("plum"));
        assert!(kv.get("cat").unwrap().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_train_is_deterministic() {
        let a = train(&toy_corpus(), &small_config()).unwrap();
        let b = train(&toy_corpus(), &small_config()).unwrap();
        assert_eq!(a.get("dog").unwrap(), b.get("dog").unwrap());
    }

    #[test]
    fn test_empty_vocabulary() {
        let sentences = vec![vec!["lonely", "words"]];
        let config = small_config().with_min_count(5);
        assert!(matches!(
            train(&sentences, &config),
            Err(EmbedError::EmptyVocabulary)
        ));
    }

    #[test]
    fn test_builder_clamps() {
        let config = Word2VecConfig::default()
            .with_dim(0)
            .with_window(0)
            .with_learning_rate(0.00001)
            .with_sample(-1.0);
        assert_eq!(config.dim, 1);
        assert_eq!(config.window, 1);
        assert!(config.min_learning_rate <= config.learning_rate);
        assert_eq!(config.sample, 0.0);
    }

    #[test]
    fn test_normalized_file_config() {
        let json = r#"{"dim": 0, "epochs": 0, "sample": -1.0, "seed": 9}"#;
        let config = serde_json::from_str::<Word2VecConfig>(json)
            .unwrap()
            .normalized();
        assert_eq!(config.dim, 1);
        assert_eq!(config.epochs, 1);
        assert_eq!(config.sample, 0.0);
        assert_eq!(config.seed, 9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_softplus_is_stable() {
        let x = Tensor::new(&[-100f32, 0.0, 100.0], &Device::Cpu).unwrap();
        let y = softplus(&x).unwrap().to_vec1::<f32>().unwrap();
        assert!(y[0] >= 0.0 && y[0] < 1e-6);
        assert!((y[1] - std::f32::consts::LN_2).abs() < 1e-6);
        assert!((y[2] - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_decayed_rate() {
        let config = Word2VecConfig::default();
        assert_eq!(decayed_rate(&config, 0, 100), 0.025);
        assert!((decayed_rate(&config, 50, 100) - 0.0125).abs() < 1e-12);
        assert_eq!(decayed_rate(&config, 100, 100), config.min_learning_rate);
    }

    #[test]
    fn test_config_json_defaults() {
        let config: Word2VecConfig = serde_json::from_str(r#"{"dim": 32}"#).unwrap();
        assert_eq!(config.dim, 32);
        assert_eq!(config.window, 5);
    }
}
