//! Tag raw text lines from stdin with a saved NER model.
//!
//! Prints one JSON object per input line:
//! `{"input": ..., "entities": [...], "error": null}`.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use seqlab_core::{Entity, Tagger};
use tracing::info;

#[derive(Parser)]
#[command(name = "seqlab-tag")]
#[command(about = "Tag stdin lines with a seqlab NER model and print JSON")]
#[command(version)]
struct Cli {
    /// Model directory written by `seqlab ner-train`
    #[arg(short, long, env = "SEQLAB_MODEL_DIR")]
    model: PathBuf,

    /// Keep blank lines instead of skipping them
    #[arg(long)]
    keep_empty: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TagOutput {
    pub input: String,
    pub entities: Vec<Entity>,
    pub error: Option<String>,
}

fn tag_line(tagger: &Tagger, line: &str) -> TagOutput {
    match tagger.tag_text(line) {
        Ok(entities) => TagOutput {
            input: line.to_string(),
            entities,
            error: None,
        },
        Err(e) => TagOutput {
            input: line.to_string(),
            entities: Vec::new(),
            error: Some(e.to_string()),
        },
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();
    let cli = Cli::parse();

    let tagger = Tagger::load(&cli.model)
        .with_context(|| format!("loading model from {}", cli.model.display()))?;
    info!(labels = ?tagger.labels(), "model loaded");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() && !cli.keep_empty {
            continue;
        }
        let output = tag_line(&tagger, line);
        writeln!(out, "{}", serde_json::to_string(&output)?)?;
    }

    Ok(())
}
