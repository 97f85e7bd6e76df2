//! # Tokenizer for the Entity Tagger
//!
//! Splits raw text into word and punctuation tokens while keeping byte
//! offsets, so tagged spans can be mapped back onto the input.

/// A token extracted from text with positional information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token text content
    pub text: String,
    /// Start position in the original string
    pub start: usize,
    /// End position in the original string
    pub end: usize,
    /// Token index in the sequence
    pub index: usize,
}

/// Characters kept inside a word when surrounded by alphanumerics.
const WORD_JOINERS: &[char] = &['-', '\'', '’'];

/// Characters kept inside a number when surrounded by digits.
const NUMBER_JOINERS: &[char] = &['.', ','];

/// Whitespace and punctuation tokenizer.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer;

impl Tokenizer {
    /// Create a new tokenizer instance.
    pub fn new() -> Self {
        Self
    }

    /// Tokenize text into a sequence of tokens.
    ///
    /// # Examples
    /// ```
    /// use seqlab_core::tagging::tokenizer::Tokenizer;
    ///
    /// let tokens = Tokenizer::new().tokenize("Angela Merkel visited Paris.");
    /// let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
    /// assert_eq!(texts, ["Angela", "Merkel", "visited", "Paris", "."]);
    /// ```
    pub fn tokenize(&self, input: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut current_start: Option<usize> = None;
        let chars: Vec<(usize, char)> = input.char_indices().collect();

        let push = |tokens: &mut Vec<Token>, start: usize, end: usize| {
            let index = tokens.len();
            tokens.push(Token {
                text: input[start..end].to_string(),
                start,
                end,
                index,
            });
        };

        for (pos, &(idx, c)) in chars.iter().enumerate() {
            if c.is_alphanumeric() {
                current_start.get_or_insert(idx);
                continue;
            }

            if current_start.is_some() && self.is_joiner(&chars, pos) {
                continue;
            }

            if let Some(start) = current_start.take() {
                push(&mut tokens, start, idx);
            }

            if !c.is_whitespace() {
                push(&mut tokens, idx, idx + c.len_utf8());
            }
        }

        if let Some(start) = current_start {
            push(&mut tokens, start, input.len());
        }

        tokens
    }

    /// Whether the punctuation at `pos` glues the surrounding characters.
    fn is_joiner(&self, chars: &[(usize, char)], pos: usize) -> bool {
        let c = chars[pos].1;
        let (Some(&(_, prev)), Some(&(_, next))) = (
            pos.checked_sub(1).and_then(|p| chars.get(p)),
            chars.get(pos + 1),
        ) else {
            return false;
        };

        if WORD_JOINERS.contains(&c) {
            return prev.is_alphanumeric() && next.is_alphanumeric();
        }
        NUMBER_JOINERS.contains(&c) && prev.is_ascii_digit() && next.is_ascii_digit()
    }

    /// Get the original text spans for a range of tokens.
    pub fn get_spans(
        &self,
        tokens: &[Token],
        start_idx: usize,
        end_idx: usize,
    ) -> Option<(usize, usize)> {
        if start_idx >= tokens.len() || end_idx > tokens.len() || start_idx >= end_idx {
            return None;
        }

        let start = tokens[start_idx].start;
        let end = tokens[end_idx - 1].end;
        Some((start, end))
    }
}
