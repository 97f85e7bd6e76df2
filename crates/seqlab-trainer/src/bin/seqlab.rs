//! Seqlab command line
//!
//! Train and evaluate NER models, convert corpora between tagging schemes,
//! and train, query, project, cluster and sweep word embeddings.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use seqlab_core::corpus::{read_corpus, write_corpus};
use seqlab_core::{Corpus, Scheme, Tagger, evaluate};
use seqlab_embed::{
    KeyedVectors, Linkage, Projection, TextOptions, TextReader, TsneConfig, Word2VecConfig,
    agglomerative, cluster_words, read_analogies, read_word_pairs, save_clusters, train,
};
use seqlab_trainer::config::read_json;
use seqlab_trainer::{
    Benchmark, NerTrainConfig, NerTrainer, SweepConfig, default_data_dir, holdout, run_sweep,
    save_report,
};
use tracing::{Level, info, warn};

#[derive(Parser)]
#[command(name = "seqlab")]
#[command(about = "Sequence labeling and word embedding toolkit")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum TagScheme {
    Bio,
    Biluo,
}

#[derive(Subcommand)]
enum Commands {
    /// Train an NER model, keeping the version that scores best on dev data
    NerTrain {
        /// Training corpus (token<TAB>tag per line, blank line between sentences)
        train: PathBuf,
        /// Dev corpus; a share of the training corpus is held out if omitted
        #[arg(long)]
        dev: Option<PathBuf>,
        /// JSON training config
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Existing model directory to fine-tune
        #[arg(long)]
        base_model: Option<PathBuf>,
        /// Model output directory
        #[arg(short, long, env = "SEQLAB_MODEL_DIR")]
        output: Option<PathBuf>,
        #[arg(long)]
        n_iter: Option<usize>,
        #[arg(long)]
        dropout: Option<f32>,
        #[arg(long)]
        patience: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Score a saved model against a gold corpus
    NerEval {
        #[arg(short, long, env = "SEQLAB_MODEL_DIR")]
        model: PathBuf,
        corpus: PathBuf,
        /// Print the flat score map as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rewrite a corpus in another tagging scheme
    NerConvert {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_enum, default_value = "biluo")]
        to: TagScheme,
    },
    /// Train skip-gram word vectors on a text file (.gz accepted)
    EmbedTrain {
        corpus: PathBuf,
        /// Output file in word2vec text format
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// JSON word2vec config
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        dim: Option<usize>,
        #[arg(long)]
        window: Option<usize>,
        #[arg(long)]
        min_count: Option<u64>,
        #[arg(long)]
        negative: Option<usize>,
        #[arg(long)]
        epochs: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Drop common English function words
        #[arg(long)]
        remove_stopwords: bool,
    },
    /// Nearest neighbours, analogies, odd-one-out and benchmark scores
    EmbedQuery {
        /// Vectors in word2vec text format
        #[arg(long)]
        vectors: PathBuf,
        /// Words to add to the query
        positive: Vec<String>,
        /// Words to subtract from the query
        #[arg(short, long)]
        negative: Vec<String>,
        #[arg(long, default_value_t = 10)]
        topn: usize,
        /// Report the word that does not belong with the others instead
        #[arg(long)]
        odd_one_out: bool,
        /// Word-pair similarity file to score
        #[arg(long)]
        pairs: Option<PathBuf>,
        /// Analogy file (questions-words layout) to score
        #[arg(long)]
        analogies: Option<PathBuf>,
    },
    /// Project vectors to 2-D with t-SNE and plot them
    EmbedProject {
        /// Vectors in word2vec text format
        #[arg(long)]
        vectors: PathBuf,
        /// File with one word per line; defaults to the most frequent words
        #[arg(long)]
        words: Option<PathBuf>,
        #[arg(long, default_value_t = 200)]
        top: usize,
        #[arg(long, default_value_t = 30.0)]
        perplexity: f64,
        #[arg(long, default_value_t = 1000)]
        iterations: usize,
        /// Colour points by this many agglomerative clusters
        #[arg(long)]
        clusters: Option<usize>,
        #[arg(long, default_value = "average")]
        linkage: Linkage,
        #[arg(long, default_value = "projection.svg")]
        svg: PathBuf,
        #[arg(long)]
        json: Option<PathBuf>,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Group words into clusters of similar vectors
    EmbedCluster {
        /// Vectors in word2vec text format
        #[arg(long)]
        vectors: PathBuf,
        #[arg(long)]
        words: Option<PathBuf>,
        #[arg(long, default_value_t = 200)]
        top: usize,
        #[arg(short = 'k', long, default_value_t = 10)]
        n_clusters: usize,
        #[arg(long, default_value = "average")]
        linkage: Linkage,
        /// Write the cluster mapping as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Train one model per hyperparameter combination and rank them
    EmbedSweep {
        corpus: PathBuf,
        /// JSON sweep grid
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long, conflicts_with = "analogies")]
        pairs: Option<PathBuf>,
        #[arg(long)]
        analogies: Option<PathBuf>,
        /// Write the ranked results as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::NerTrain {
            train,
            dev,
            config,
            base_model,
            output,
            n_iter,
            dropout,
            patience,
            seed,
        } => {
            let mut cfg = match config {
                Some(path) => NerTrainConfig::from_file(path)?,
                None => NerTrainConfig::default(),
            };
            if let Some(v) = n_iter {
                cfg = cfg.with_n_iter(v);
            }
            if let Some(v) = dropout {
                cfg = cfg.with_dropout(v);
            }
            if let Some(v) = patience {
                cfg = cfg.with_patience(v);
            }
            if let Some(v) = seed {
                cfg = cfg.with_seed(v);
            }
            if let Some(v) = output {
                cfg = cfg.with_output_dir(v);
            }

            let corpus = load_corpus(&train)?;
            let (train_set, dev_set) = match dev {
                Some(path) => (corpus, load_corpus(&path)?),
                None => holdout(&corpus, &cfg)?,
            };

            let mut trainer = match base_model {
                Some(dir) => NerTrainer::fine_tune(dir, cfg)?,
                None => NerTrainer::from_scratch(train_set.labels(), cfg),
            };
            let summary = trainer.train(&train_set, &dev_set)?;
            match summary.best_iteration {
                Some(best) => println!(
                    "best dev F1 {:.4} at iteration {best}; model in {}",
                    summary.best_f1,
                    summary.output_dir.display()
                ),
                None => println!("no model saved"),
            }
        }

        Commands::NerEval {
            model,
            corpus,
            json,
        } => {
            let tagger = Tagger::load(&model)
                .with_context(|| format!("loading model from {}", model.display()))?;
            let gold = load_corpus(&corpus)?;
            let report = evaluate(&tagger, &gold)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report.to_scores())?);
            } else {
                print!("{report}");
            }
        }

        Commands::NerConvert { input, output, to } => {
            let corpus = load_corpus(&input)?;
            let detected = Scheme::detect(
                &corpus
                    .iter()
                    .flat_map(|s| s.tags.iter().cloned())
                    .collect::<Vec<_>>(),
            );
            let converted = match to {
                TagScheme::Biluo => corpus.to_biluo(),
                TagScheme::Bio => corpus.to_bio(),
            };
            write_corpus(&output, &converted)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(
                from = ?detected,
                sentences = converted.len(),
                path = %output.display(),
                "corpus converted"
            );
        }

        Commands::EmbedTrain {
            corpus,
            output,
            config,
            dim,
            window,
            min_count,
            negative,
            epochs,
            seed,
            remove_stopwords,
        } => {
            let mut cfg = match config {
                Some(path) => read_json::<Word2VecConfig>(&path)?.normalized(),
                None => Word2VecConfig::default(),
            };
            if let Some(v) = dim {
                cfg = cfg.with_dim(v);
            }
            if let Some(v) = window {
                cfg = cfg.with_window(v);
            }
            if let Some(v) = min_count {
                cfg = cfg.with_min_count(v);
            }
            if let Some(v) = negative {
                cfg = cfg.with_negative(v);
            }
            if let Some(v) = epochs {
                cfg = cfg.with_epochs(v);
            }
            if let Some(v) = seed {
                cfg = cfg.with_seed(v);
            }

            let sentences = read_text(&corpus, remove_stopwords)?;
            let vectors = train(&sentences, &cfg)?;
            let output = output.unwrap_or_else(|| default_data_dir().join("vectors.txt"));
            vectors.save_text(&output)?;
            println!("{} vectors of dim {} in {}", vectors.len(), vectors.dim(), output.display());
        }

        Commands::EmbedQuery {
            vectors,
            positive,
            negative,
            topn,
            odd_one_out,
            pairs,
            analogies,
        } => {
            let kv = KeyedVectors::load_text(&vectors)?;

            if let Some(path) = pairs {
                let eval = kv.evaluate_word_pairs(&read_word_pairs(&path)?)?;
                println!(
                    "spearman {:.4} over {} pairs ({:.1}% out of vocabulary)",
                    eval.spearman,
                    eval.pairs_used,
                    eval.oov_ratio * 100.0
                );
            }
            if let Some(path) = analogies {
                let eval = kv.evaluate_analogies(&read_analogies(&path)?)?;
                for (section, score) in &eval.sections {
                    println!("{section:<30} {:>5}/{:<5}", score.correct, score.total);
                }
                println!(
                    "analogy accuracy {:.4} ({}/{}, {} skipped)",
                    eval.accuracy, eval.correct, eval.total, eval.skipped
                );
            }

            if positive.is_empty() && negative.is_empty() {
                return Ok(());
            }
            let pos: Vec<&str> = positive.iter().map(String::as_str).collect();
            let neg: Vec<&str> = negative.iter().map(String::as_str).collect();
            if odd_one_out {
                println!("{}", kv.doesnt_match(&pos)?);
            } else {
                for (word, score) in kv.most_similar(&pos, &neg, topn)? {
                    println!("{word}\t{score:.4}");
                }
            }
        }

        Commands::EmbedProject {
            vectors,
            words,
            top,
            perplexity,
            iterations,
            clusters,
            linkage,
            svg,
            json,
            seed,
        } => {
            let kv = KeyedVectors::load_text(&vectors)?;
            let selected = select_words(&kv, words.as_deref(), top)?;
            let config = TsneConfig::default()
                .with_perplexity(perplexity)
                .with_iterations(iterations)
                .with_seed(seed);

            let mut projection = Projection::from_vectors(&kv, &selected, &config)?;
            if let Some(k) = clusters {
                let rows = selected
                    .iter()
                    .map(|w| kv.get(w))
                    .collect::<seqlab_embed::Result<Vec<_>>>()?;
                let labels = agglomerative(&rows, k, linkage, linkage.default_metric())?;
                projection = projection.with_clusters(&labels)?;
            }

            projection.save_svg(&svg, 1200, 900)?;
            if let Some(path) = json {
                projection.save_json(path)?;
            }
            println!("projected {} words to {}", projection.len(), svg.display());
        }

        Commands::EmbedCluster {
            vectors,
            words,
            top,
            n_clusters,
            linkage,
            output,
        } => {
            let kv = KeyedVectors::load_text(&vectors)?;
            let selected = select_words(&kv, words.as_deref(), top)?;
            let clusters = cluster_words(&kv, &selected, n_clusters, linkage)?;
            for (id, members) in &clusters {
                println!("{id}\t{}", members.join(" "));
            }
            if let Some(path) = output {
                save_clusters(&clusters, path)?;
            }
        }

        Commands::EmbedSweep {
            corpus,
            config,
            pairs,
            analogies,
            output,
        } => {
            let sweep = match config {
                Some(path) => SweepConfig::from_file(path)?,
                None => SweepConfig::default(),
            };
            let benchmark = match (pairs, analogies) {
                (Some(path), _) => Benchmark::WordPairs(read_word_pairs(&path)?),
                (None, Some(path)) => Benchmark::Analogies(read_analogies(&path)?),
                (None, None) => bail!("a benchmark is required: pass --pairs or --analogies"),
            };

            let sentences = read_text(&corpus, false)?;
            let results = run_sweep(&sentences, &sweep, &benchmark)?;
            for r in &results {
                println!(
                    "{:.4}\tdim={} window={} negative={} min_count={} epochs={}\t{:.1}s",
                    r.score,
                    r.config.dim,
                    r.config.window,
                    r.config.negative,
                    r.config.min_count,
                    r.config.epochs,
                    r.seconds
                );
            }
            if let Some(path) = output {
                save_report(&results, path)?;
            }
        }
    }

    Ok(())
}

fn load_corpus(path: &Path) -> Result<Corpus> {
    let corpus =
        read_corpus(path).with_context(|| format!("reading corpus {}", path.display()))?;
    let stats = corpus.stats();
    info!(
        path = %path.display(),
        sentences = stats.sentences,
        tokens = stats.tokens,
        entities = ?stats.entities,
        "corpus loaded"
    );
    Ok(corpus)
}

fn read_text(path: &Path, remove_stopwords: bool) -> Result<Vec<Vec<String>>> {
    let reader = TextReader::new(TextOptions {
        remove_stopwords,
        ..TextOptions::default()
    });
    reader
        .read_path(path)
        .with_context(|| format!("reading text {}", path.display()))
}

/// Words listed in `file`, or the `top` most frequent words of the model.
fn select_words(kv: &KeyedVectors, file: Option<&Path>, top: usize) -> Result<Vec<String>> {
    let Some(file) = file else {
        return Ok(kv.words().iter().take(top).cloned().collect());
    };
    let text =
        fs::read_to_string(file).with_context(|| format!("reading word list {}", file.display()))?;
    let mut words = Vec::new();
    for word in text.lines().map(str::trim).filter(|w| !w.is_empty()) {
        if kv.contains(word) {
            words.push(word.to_string());
        } else {
            warn!(word, "not in vocabulary, skipped");
        }
    }
    Ok(words)
}
