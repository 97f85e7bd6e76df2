//! # BIO / BILUO Tags for Named Entity Recognition
//!
//! Defines the per-token tag representation, conversion between the BIO
//! (Begin-Inside-Outside) and BILUO (Begin-Inside-Last-Unit-Outside) schemes,
//! span extraction and the transition constraints used by the decoder.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqlabError};

/// Position of a token inside an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Prefix {
    /// First token of a multi-token entity.
    Begin,
    /// Token strictly inside an entity.
    Inside,
    /// Final token of a multi-token entity (BILUO only).
    Last,
    /// Single-token entity (BILUO only).
    Unit,
    /// Token outside any entity.
    Outside,
}

impl Prefix {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'B' => Some(Prefix::Begin),
            'I' => Some(Prefix::Inside),
            // IOBES spells Last/Unit as End/Single.
            'L' | 'E' => Some(Prefix::Last),
            'U' | 'S' => Some(Prefix::Unit),
            'O' => Some(Prefix::Outside),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Prefix::Begin => 'B',
            Prefix::Inside => 'I',
            Prefix::Last => 'L',
            Prefix::Unit => 'U',
            Prefix::Outside => 'O',
        }
    }
}

/// Tagging scheme of a tag sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    Bio,
    Biluo,
}

impl Scheme {
    /// Guess the scheme of a sequence: any `L`/`U` tag means BILUO.
    pub fn detect(tags: &[Tag]) -> Self {
        if tags
            .iter()
            .any(|t| matches!(t.prefix, Prefix::Last | Prefix::Unit))
        {
            Scheme::Biluo
        } else {
            Scheme::Bio
        }
    }
}

/// A single token tag such as `B-PER` or `O`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag {
    pub prefix: Prefix,
    pub label: Option<String>,
}

impl Tag {
    /// The outside tag `O`.
    pub fn outside() -> Self {
        Self {
            prefix: Prefix::Outside,
            label: None,
        }
    }

    /// Build a tag with an entity label.
    pub fn new(prefix: Prefix, label: impl Into<String>) -> Self {
        if prefix == Prefix::Outside {
            return Self::outside();
        }
        Self {
            prefix,
            label: Some(label.into()),
        }
    }

    /// Parse a tag string (`O`, `B-PER`, `I-LOC`, `L-ORG`, `U-MISC`, `E-X`, `S-X`).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "O" {
            return Ok(Self::outside());
        }

        let mut chars = s.chars();
        let prefix = chars
            .next()
            .and_then(Prefix::from_char)
            .ok_or_else(|| SeqlabError::InvalidTag(s.to_string()))?;
        let rest = chars.as_str();
        let label = rest
            .strip_prefix('-')
            .filter(|l| !l.is_empty())
            .ok_or_else(|| SeqlabError::InvalidTag(s.to_string()))?;

        if prefix == Prefix::Outside {
            return Err(SeqlabError::InvalidTag(s.to_string()));
        }

        Ok(Self::new(prefix, label))
    }

    /// Check whether this is the outside tag.
    pub fn is_outside(&self) -> bool {
        self.prefix == Prefix::Outside
    }

    /// Entity label, `None` for `O`.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn same_label(&self, label: &str) -> bool {
        self.label.as_deref() == Some(label)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{}-{}", self.prefix.as_char(), label),
            None => write!(f, "O"),
        }
    }
}

impl FromStr for Tag {
    type Err = SeqlabError;

    fn from_str(s: &str) -> Result<Self> {
        Tag::parse(s)
    }
}

impl TryFrom<String> for Tag {
    type Error = SeqlabError;

    fn try_from(value: String) -> Result<Self> {
        Tag::parse(&value)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_string()
    }
}

/// An entity span over token indices (`end` is exclusive).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub label: String,
    pub start: usize,
    pub end: usize,
}

/// An entity found in raw text, with byte offsets into the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub label: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Extract entity spans from a BIO or BILUO tag sequence.
///
/// Ill-formed sequences are read leniently: an `I-X` or `L-X` that does not
/// continue an open `X` entity starts a new one.
pub fn spans(tags: &[Tag]) -> Vec<Span> {
    let mut out = Vec::new();
    let mut open: Option<(String, usize)> = None;

    let close = |open: &mut Option<(String, usize)>, end: usize, out: &mut Vec<Span>| {
        if let Some((label, start)) = open.take() {
            out.push(Span { label, start, end });
        }
    };

    for (i, tag) in tags.iter().enumerate() {
        let Some(label) = tag.label() else {
            close(&mut open, i, &mut out);
            continue;
        };

        let continues = matches!(&open, Some((l, _)) if l == label);
        match tag.prefix {
            Prefix::Begin => {
                close(&mut open, i, &mut out);
                open = Some((label.to_string(), i));
            }
            Prefix::Unit => {
                close(&mut open, i, &mut out);
                out.push(Span {
                    label: label.to_string(),
                    start: i,
                    end: i + 1,
                });
            }
            Prefix::Inside => {
                if !continues {
                    close(&mut open, i, &mut out);
                    open = Some((label.to_string(), i));
                }
            }
            Prefix::Last => {
                if !continues {
                    close(&mut open, i, &mut out);
                    open = Some((label.to_string(), i));
                }
                close(&mut open, i + 1, &mut out);
            }
            Prefix::Outside => close(&mut open, i, &mut out),
        }
    }

    close(&mut open, tags.len(), &mut out);
    out
}

/// Render spans as a BILUO sequence of length `len`.
pub fn spans_to_biluo(len: usize, spans: &[Span]) -> Vec<Tag> {
    let mut tags = vec![Tag::outside(); len];
    for span in spans.iter().filter(|s| s.start < s.end && s.end <= len) {
        if span.end - span.start == 1 {
            tags[span.start] = Tag::new(Prefix::Unit, span.label.clone());
            continue;
        }
        tags[span.start] = Tag::new(Prefix::Begin, span.label.clone());
        for tag in &mut tags[span.start + 1..span.end - 1] {
            *tag = Tag::new(Prefix::Inside, span.label.clone());
        }
        tags[span.end - 1] = Tag::new(Prefix::Last, span.label.clone());
    }
    tags
}

/// Render spans as a BIO sequence of length `len`.
pub fn spans_to_bio(len: usize, spans: &[Span]) -> Vec<Tag> {
    let mut tags = vec![Tag::outside(); len];
    for span in spans.iter().filter(|s| s.start < s.end && s.end <= len) {
        tags[span.start] = Tag::new(Prefix::Begin, span.label.clone());
        for tag in &mut tags[span.start + 1..span.end] {
            *tag = Tag::new(Prefix::Inside, span.label.clone());
        }
    }
    tags
}

/// Convert BIO tags to BILUO.
pub fn bio_to_biluo(tags: &[Tag]) -> Vec<Tag> {
    spans_to_biluo(tags.len(), &spans(tags))
}

/// Convert BILUO tags back to BIO.
pub fn biluo_to_bio(tags: &[Tag]) -> Vec<Tag> {
    spans_to_bio(tags.len(), &spans(tags))
}

/// Check if transitioning from `from` tag to `to` tag is valid under BILUO.
pub fn is_valid_transition(from: &Tag, to: &Tag) -> bool {
    match (from.prefix, from.label()) {
        (Prefix::Begin | Prefix::Inside, Some(label)) => {
            matches!(to.prefix, Prefix::Inside | Prefix::Last) && to.same_label(label)
        }
        _ => matches!(to.prefix, Prefix::Outside | Prefix::Begin | Prefix::Unit),
    }
}

/// Tags a BILUO sequence may start with.
pub fn is_valid_start(tag: &Tag) -> bool {
    matches!(tag.prefix, Prefix::Outside | Prefix::Begin | Prefix::Unit)
}

/// Tags a BILUO sequence may end with.
pub fn is_valid_end(tag: &Tag) -> bool {
    matches!(tag.prefix, Prefix::Outside | Prefix::Last | Prefix::Unit)
}

/// The BILUO tag inventory for a set of entity labels.
///
/// Index 0 is always `O`; each label owns four consecutive indices
/// (`B`, `I`, `L`, `U`) in the order labels were added, so extending the set
/// never renumbers existing tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TagSet {
    labels: Vec<String>,
    tags: Vec<Tag>,
}

const LABEL_PREFIXES: [Prefix; 4] = [Prefix::Begin, Prefix::Inside, Prefix::Last, Prefix::Unit];

impl TagSet {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self {
            labels: Vec::new(),
            tags: vec![Tag::outside()],
        };
        for label in labels {
            set.add_label(label);
        }
        set
    }

    /// Add a label; returns `false` when it was already present.
    pub fn add_label(&mut self, label: impl Into<String>) -> bool {
        let label = label.into();
        if self.labels.contains(&label) {
            return false;
        }
        for prefix in LABEL_PREFIXES {
            self.tags.push(Tag::new(prefix, label.clone()));
        }
        self.labels.push(label);
        true
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn tag(&self, idx: usize) -> Option<&Tag> {
        self.tags.get(idx)
    }

    /// Get the tag index for weight lookups.
    pub fn index(&self, tag: &Tag) -> Option<usize> {
        let Some(label) = tag.label() else {
            return Some(0);
        };
        let pos = self.labels.iter().position(|l| l == label)?;
        let offset = match tag.prefix {
            Prefix::Begin => 0,
            Prefix::Inside => 1,
            Prefix::Last => 2,
            Prefix::Unit => 3,
            Prefix::Outside => return Some(0),
        };
        Some(1 + pos * 4 + offset)
    }

    /// `mask[prev][curr]` is true when `prev -> curr` is a valid BILUO transition.
    pub fn transition_mask(&self) -> Vec<Vec<bool>> {
        self.tags
            .iter()
            .map(|from| self.tags.iter().map(|to| is_valid_transition(from, to)).collect())
            .collect()
    }

    pub fn start_mask(&self) -> Vec<bool> {
        self.tags.iter().map(is_valid_start).collect()
    }

    pub fn end_mask(&self) -> Vec<bool> {
        self.tags.iter().map(is_valid_end).collect()
    }
}

impl From<Vec<String>> for TagSet {
    fn from(labels: Vec<String>) -> Self {
        TagSet::new(labels)
    }
}

impl From<TagSet> for Vec<String> {
    fn from(set: TagSet) -> Self {
        set.labels
    }
}

/// Distinct entity labels used in a tag sequence, sorted.
pub fn labels_of<'a, I>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a Tag>,
{
    tags.into_iter()
        .filter_map(|t| t.label().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(s: &str) -> Vec<Tag> {
        s.split_whitespace().map(|t| Tag::parse(t).unwrap()).collect()
    }

    fn render(tags: &[Tag]) -> String {
        tags.iter().map(Tag::to_string).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_parse_and_display() {
        let tag = Tag::parse("B-PER").unwrap();
        assert_eq!(tag.prefix, Prefix::Begin);
        assert_eq!(tag.label(), Some("PER"));
        assert_eq!(tag.to_string(), "B-PER");
        assert!(Tag::parse("O").unwrap().is_outside());
        assert_eq!(Tag::parse("S-LOC").unwrap().to_string(), "U-LOC");
        assert_eq!(Tag::parse("E-LOC").unwrap().to_string(), "L-LOC");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Tag::parse("X-PER").is_err());
        assert!(Tag::parse("B-").is_err());
        assert!(Tag::parse("BPER").is_err());
        assert!(Tag::parse("O-PER").is_err());
        assert!(Tag::parse("").is_err());
    }

    #[test]
    fn test_bio_to_biluo() {
        let bio = tags("B-PER I-PER I-PER O B-LOC O B-ORG I-ORG");
        assert_eq!(
            render(&bio_to_biluo(&bio)),
            "B-PER I-PER L-PER O U-LOC O B-ORG L-ORG"
        );
    }

    #[test]
    fn test_bio_to_biluo_adjacent_entities() {
        let bio = tags("B-PER B-PER I-PER");
        assert_eq!(render(&bio_to_biluo(&bio)), "U-PER B-PER L-PER");
    }

    #[test]
    fn test_bio_to_biluo_lenient_inside() {
        // I-X after O or after a different label opens a new entity.
        let bio = tags("O I-LOC I-LOC B-PER I-ORG");
        assert_eq!(render(&bio_to_biluo(&bio)), "O B-LOC L-LOC U-PER U-ORG");
    }

    #[test]
    fn test_biluo_to_bio() {
        let biluo = tags("U-PER O B-LOC I-LOC L-LOC");
        assert_eq!(render(&biluo_to_bio(&biluo)), "B-PER O B-LOC I-LOC I-LOC");
    }

    #[test]
    fn test_spans() {
        let spans = spans(&tags("B-PER L-PER O U-LOC"));
        assert_eq!(
            spans,
            vec![
                Span { label: "PER".into(), start: 0, end: 2 },
                Span { label: "LOC".into(), start: 3, end: 4 },
            ]
        );
    }

    #[test]
    fn test_scheme_detect() {
        assert_eq!(Scheme::detect(&tags("B-PER I-PER O")), Scheme::Bio);
        assert_eq!(Scheme::detect(&tags("U-PER O")), Scheme::Biluo);
    }

    #[test]
    fn test_valid_transitions() {
        let b_per = Tag::parse("B-PER").unwrap();
        let i_per = Tag::parse("I-PER").unwrap();
        let l_per = Tag::parse("L-PER").unwrap();
        let l_loc = Tag::parse("L-LOC").unwrap();
        let u_loc = Tag::parse("U-LOC").unwrap();
        let o = Tag::outside();

        assert!(is_valid_transition(&b_per, &i_per));
        assert!(is_valid_transition(&b_per, &l_per));
        assert!(is_valid_transition(&l_per, &u_loc));
        assert!(is_valid_transition(&o, &b_per));

        assert!(!is_valid_transition(&b_per, &o));
        assert!(!is_valid_transition(&b_per, &l_loc));
        assert!(!is_valid_transition(&o, &i_per));
        assert!(!is_valid_transition(&u_loc, &l_per));

        assert!(is_valid_start(&u_loc));
        assert!(!is_valid_start(&i_per));
        assert!(is_valid_end(&l_per));
        assert!(!is_valid_end(&b_per));
    }

    #[test]
    fn test_tagset_indices_are_stable() {
        let mut set = TagSet::new(["PER", "LOC"]);
        assert_eq!(set.len(), 9);
        let l_loc = Tag::parse("L-LOC").unwrap();
        let before = set.index(&l_loc).unwrap();

        assert!(set.add_label("ORG"));
        assert!(!set.add_label("PER"));
        assert_eq!(set.index(&l_loc), Some(before));
        assert_eq!(set.len(), 13);

        for (i, tag) in set.tags().iter().enumerate() {
            assert_eq!(set.index(tag), Some(i));
        }
        assert_eq!(set.index(&Tag::parse("B-MISC").unwrap()), None);
    }

    #[test]
    fn test_tagset_serde() {
        let set = TagSet::new(["PER", "LOC"]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["PER","LOC"]"#);
        let back: TagSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
