//! Sparse lexical features for the perceptron tagger.

/// Marker used for the word before the first token.
pub const SENTENCE_START: &str = "<s>";
/// Marker used for the word after the last token.
pub const SENTENCE_END: &str = "</s>";

/// Longest run of one character class kept in a word shape.
const MAX_SHAPE_RUN: usize = 4;

/// Word shape: `Xxxx` for "London", `dddd` for "2024", `X.X.` for "U.S.".
pub fn word_shape(token: &str) -> String {
    let mut shape = String::with_capacity(token.len());
    let mut last = None;
    let mut run = 0;

    for c in token.chars() {
        let class = if c.is_uppercase() {
            'X'
        } else if c.is_lowercase() {
            'x'
        } else if c.is_numeric() {
            'd'
        } else {
            c
        };

        if Some(class) == last {
            run += 1;
        } else {
            last = Some(class);
            run = 1;
        }
        if run <= MAX_SHAPE_RUN {
            shape.push(class);
        }
    }

    shape
}

fn prefix(word: &str, n: usize) -> &str {
    match word.char_indices().nth(n) {
        Some((idx, _)) => &word[..idx],
        None => word,
    }
}

fn suffix(word: &str, n: usize) -> &str {
    let count = word.chars().count();
    if count <= n {
        return word;
    }
    match word.char_indices().nth(count - n) {
        Some((idx, _)) => &word[idx..],
        None => word,
    }
}

/// Extract the features of token `i` given its sentence context.
pub fn token_features(tokens: &[String], i: usize) -> Vec<String> {
    let token = tokens[i].as_str();
    let lower = token.to_lowercase();
    let shape = word_shape(token);

    let prev = i.checked_sub(1).map(|p| tokens[p].to_lowercase());
    let next = tokens.get(i + 1).map(|n| n.to_lowercase());
    let prev_word = prev.as_deref().unwrap_or(SENTENCE_START);
    let next_word = next.as_deref().unwrap_or(SENTENCE_END);

    let mut features = Vec::with_capacity(16);
    features.push("bias".to_string());
    features.push(format!("w={lower}"));
    features.push(format!("p3={}", prefix(&lower, 3)));
    features.push(format!("s3={}", suffix(&lower, 3)));
    features.push(format!("shape={shape}"));

    let mut chars = token.chars();
    if chars.next().is_some_and(char::is_uppercase) {
        features.push("is_title".to_string());
        if i == 0 {
            features.push("is_title_first".to_string());
        }
    }
    if token.chars().any(char::is_alphabetic) && !token.chars().any(char::is_lowercase) {
        features.push("is_upper".to_string());
    }
    if token.chars().any(|c| c.is_ascii_digit()) {
        features.push("has_digit".to_string());
    }
    if token.chars().all(|c| !c.is_alphanumeric()) {
        features.push("is_punct".to_string());
    }

    // Context features
    features.push(format!("w-1={prev_word}"));
    features.push(format!("w+1={next_word}"));
    features.push(format!("w-1|w={prev_word}|{lower}"));
    features.push(format!(
        "shape-1={}",
        i.checked_sub(1)
            .map(|p| word_shape(&tokens[p]))
            .unwrap_or_else(|| SENTENCE_START.to_string())
    ));
    features.push(format!(
        "shape+1={}",
        tokens
            .get(i + 1)
            .map(|n| word_shape(n))
            .unwrap_or_else(|| SENTENCE_END.to_string())
    ));

    features
}

/// Features for every token of a sentence.
pub fn sentence_features(tokens: &[String]) -> Vec<Vec<String>> {
    (0..tokens.len()).map(|i| token_features(tokens, i)).collect()
}
