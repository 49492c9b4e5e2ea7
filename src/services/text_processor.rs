// Text Processing Service
// Normalization, tokenization and windowing shared by forensics and the pipeline

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+(?:'\w+)*|[^\w\s]").expect("word regex"))
}

fn term_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("term regex"))
}

fn space_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\u{3000}\u{00A0}]").expect("space regex"))
}

fn horizontal_ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\x0C\x0B]+").expect("whitespace regex"))
}

/// Normalize extracted text: smart quotes, odd spaces, line endings, trailing blanks.
/// Leading indentation is kept so code submissions stay readable.
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut s = text
        .replace('\u{201c}', "\"")
        .replace('\u{201d}', "\"")
        .replace('\u{2018}', "'")
        .replace('\u{2019}', "'");

    s = space_re().replace_all(&s, " ").to_string();
    s = s.replace("\r\n", "\n").replace('\r', "\n");

    s.lines()
        .map(|ln| {
            let indent_len = ln.len() - ln.trim_start().len();
            let (indent, rest) = ln.split_at(indent_len);
            format!("{}{}", indent, horizontal_ws_re().replace_all(rest.trim_end(), " "))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

/// Case-folded word and punctuation tokens
pub fn word_tokens(text: &str) -> Vec<String> {
    word_re()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Lower-cased terms of two or more word characters; stopwords are kept
pub fn term_tokens(text: &str) -> Vec<String> {
    term_re()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Split text into overlapping windows of `window` chars, starting every `stride` chars.
/// Offsets are char-based so multi-byte text never splits inside a code point.
pub fn char_windows(text: &str, window: usize, stride: usize) -> Vec<&str> {
    if text.is_empty() || window == 0 {
        return vec![];
    }
    let stride = stride.max(1);

    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());
    let char_count = boundaries.len() - 1;

    let mut windows = Vec::new();
    let mut start = 0usize;
    while start < char_count {
        let end = (start + window).min(char_count);
        windows.push(&text[boundaries[start]..boundaries[end]]);
        start += stride;
    }
    windows
}

/// Truncate to `max_chars` chars and append a notice with the original length
pub fn truncate_with_notice(text: &str, max_chars: usize) -> Cow<'_, str> {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return Cow::Borrowed(text);
    }
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    Cow::Owned(format!(
        "{}{}",
        &text[..cut],
        truncation_notice(char_count)
    ))
}

pub fn truncation_notice(original_chars: usize) -> String {
    format!(
        "\n\n[Note: Answer truncated from {} characters due to length limits]",
        original_chars
    )
}

/// Short preview for log lines
pub fn preview(s: &str, max_chars: usize) -> String {
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push_str("...");
    }
    out.replace('\n', " ")
}
