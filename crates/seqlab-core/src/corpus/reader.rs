//! Reading and writing the column corpus format.
//!
//! One token per line, columns separated by tabs (or whitespace when a line
//! has no tab), token first and tag last. Blank lines separate sentences.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::corpus::{Corpus, Sentence};
use crate::error::{Result, SeqlabError};
use crate::tagging::tags::Tag;

/// Document separator line used by CoNLL-2003 style corpora.
const DOCSTART: &str = "-DOCSTART-";

/// Load a corpus from a file.
pub fn read_corpus<P: AsRef<Path>>(path: P) -> Result<Corpus> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let corpus = parse_reader(BufReader::new(file))?;
    debug!(
        path = %path.display(),
        sentences = corpus.len(),
        "corpus loaded"
    );
    Ok(corpus)
}

/// Parse a corpus held in memory.
pub fn parse_corpus(text: &str) -> Result<Corpus> {
    parse_reader(text.as_bytes())
}

fn parse_reader<R: BufRead>(reader: R) -> Result<Corpus> {
    let mut sentences = Vec::new();
    let mut current = Sentence::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        let line = line.trim_end_matches(['\r', '\n']);

        if line.trim().is_empty() {
            if !current.is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
            continue;
        }

        if line.starts_with(DOCSTART) {
            continue;
        }

        // `#` lines are comments unless they hold a token and a valid tag
        if line.starts_with('#') {
            let row = split_columns(line)
                .and_then(|(token, tag)| Some((token, Tag::parse(tag).ok()?)));
            match row {
                Some((token, tag)) => {
                    current.tokens.push(token.to_string());
                    current.tags.push(tag);
                }
                None => debug!(line = line_no, "skipping comment"),
            }
            continue;
        }

        let (token, tag) = split_columns(line).ok_or_else(|| SeqlabError::MalformedLine {
            line: line_no,
            reason: format!("expected token and tag columns, got {line:?}"),
        })?;
        let tag = Tag::parse(tag).map_err(|_| SeqlabError::MalformedLine {
            line: line_no,
            reason: format!("invalid tag {tag:?}"),
        })?;

        current.tokens.push(token.to_string());
        current.tags.push(tag);
    }

    // Don't forget the last sentence
    if !current.is_empty() {
        sentences.push(current);
    }

    Ok(Corpus::new(sentences))
}

fn split_columns(line: &str) -> Option<(&str, &str)> {
    let columns: Vec<&str> = if line.contains('\t') {
        line.split('\t').map(str::trim).collect()
    } else {
        line.split_whitespace().collect()
    };

    match columns.as_slice() {
        [token, .., tag] if !token.is_empty() && !tag.is_empty() => Some((*token, *tag)),
        _ => None,
    }
}

/// Write a corpus in the two-column `token\ttag` format.
pub fn write_corpus<P: AsRef<Path>>(path: P, corpus: &Corpus) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for sentence in corpus.iter() {
        for (token, tag) in sentence.tokens.iter().zip(&sentence.tags) {
            writeln!(out, "{token}\t{tag}")?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "-DOCSTART-\tO\n\
                          \n\
                          EU\tB-ORG\n\
                          rejects\tO\n\
                          German\tB-MISC\n\
                          call\tO\n\
                          \n\
                          \n\
                          Peter\tB-PER\n\
                          Blackburn\tI-PER";

    #[test]
    fn test_parse_sentences() {
        let corpus = parse_corpus(SAMPLE).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus[0].tokens, ["EU", "rejects", "German", "call"]);
        assert_eq!(corpus[0].tags[2].to_string(), "B-MISC");
        // last sentence has no trailing blank line
        assert_eq!(corpus[1].tokens, ["Peter", "Blackburn"]);
    }

    #[test]
    fn test_parse_multi_column() {
        let corpus = parse_corpus("EU NNP B-NP B-ORG\nrejects VBZ B-VP O\n").unwrap();
        assert_eq!(corpus[0].tokens, ["EU", "rejects"]);
        assert_eq!(corpus[0].tags[0].to_string(), "B-ORG");
    }

    #[test]
    fn test_parse_keeps_hash_tokens() {
        let corpus = parse_corpus("# sent_id = 7\n#\tO\n#Brexit\tB-MISC\nvote\tO\n").unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus[0].tokens, ["#", "#Brexit", "vote"]);
        assert_eq!(corpus[0].tags[1].to_string(), "B-MISC");
    }

    #[test]
    fn test_parse_skips_comments() {
        let corpus = parse_corpus("# sent_id = 1\nParis\tU-LOC\n").unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus[0].tags[0].to_string(), "U-LOC");
    }

    #[test]
    fn test_malformed_line_reports_number() {
        let err = parse_corpus("Paris\tB-LOC\nlonely\n").unwrap_err();
        assert!(matches!(err, SeqlabError::MalformedLine { line: 2, .. }));

        let err = parse_corpus("Paris\tX-LOC\n").unwrap_err();
        assert!(matches!(err, SeqlabError::MalformedLine { line: 1, .. }));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_corpus("").unwrap().is_empty());
        assert!(parse_corpus("\n\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");
        let corpus = parse_corpus(SAMPLE).unwrap();

        write_corpus(&path, &corpus).unwrap();
        let back = read_corpus(&path).unwrap();
        assert_eq!(back, corpus);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_corpus("/nonexistent/corpus.tsv"),
            Err(SeqlabError::Io(_))
        ));
    }
}
