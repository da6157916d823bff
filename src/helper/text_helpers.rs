use pulldown_cmark::{Event, Parser};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use crate::helper::sanitization_helpers::strip_all_html;

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}_]+").expect("static regex"))
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:https?|ftp)://[^\s<>()]+").expect("static regex"))
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF      // kana
        | 0x3400..=0x4DBF    // CJK extension A
        | 0x4E00..=0x9FFF    // CJK unified ideographs
        | 0xAC00..=0xD7AF    // hangul syllables
        | 0xF900..=0xFAFF)
}

/// Lowercase search tokens. Latin runs become one token each. A run that contains
/// CJK characters additionally yields one token per CJK character so that single
/// ideographs are searchable.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for m in word_regex().find_iter(text) {
        let word = m.as_str().to_lowercase();
        if word.chars().any(is_cjk) {
            for c in word.chars().filter(|c| is_cjk(*c)) {
                tokens.push(c.to_string());
            }
            let rest: String = word.chars().map(|c| if is_cjk(c) { ' ' } else { c }).collect();
            tokens.extend(rest.split_whitespace().map(str::to_string));
        } else {
            tokens.push(word);
        }
    }
    tokens
}

pub fn unique_tokens(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Token -> occurrence count.
pub fn term_frequencies(tokens: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for token in tokens.split_whitespace() {
        *counts.entry(token.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Plain text of a markdown document: only text, code and inline code events are kept.
pub fn markdown_plain_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => {
                out.push_str(&text);
                out.push(' ');
            }
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::End(_) => out.push(' '),
            _ => {}
        }
    }
    out
}

/// Space-joined search tokens of a markdown body.
pub fn markdown_search_words(markdown: &str) -> String {
    tokenize(&markdown_plain_text(markdown)).join(" ")
}

pub fn search_words(text: &str) -> String {
    tokenize(text).join(" ")
}

/// Length of an article body: words plus punctuation marks.
/// ASCII words count once each, every non-ASCII letter counts on its own.
/// HTML tags and links are ignored.
pub fn word_count(markdown: &str) -> i64 {
    let stripped = strip_all_html(markdown);
    let decoded = html_escape::decode_html_entities(&stripped);
    let without_links = url_regex().replace_all(&decoded, " ");

    let mut words = 0i64;
    let mut puncts = 0i64;
    for chunk in without_links.split_whitespace() {
        for part in chunk.split(|c: char| {
            let is_punct = c.is_ascii_punctuation() || (!c.is_alphanumeric() && !c.is_whitespace());
            if is_punct {
                puncts += 1;
            }
            is_punct
        }) {
            if part.is_empty() {
                continue;
            }
            if part.is_ascii() {
                words += 1;
            } else {
                words += part.chars().count() as i64;
            }
        }
    }
    words + puncts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_splits_cjk() {
        assert_eq!(tokenize("Rust, Actix & REDB!"), vec!["rust", "actix", "redb"]);
        assert_eq!(tokenize("图床abc"), vec!["图", "床", "abc"]);
    }

    #[test]
    fn markdown_words_skip_syntax() {
        let words = markdown_search_words("# Title\n\nSome *bold* text with `code` and [a link](http://x.y).");
        assert_eq!(words, "title some bold text with code and a link");
    }

    #[test]
    fn word_count_counts_words_and_punctuation() {
        assert_eq!(word_count("Hello, world."), 4);
        assert_eq!(word_count("<p>你好</p>"), 2);
        assert_eq!(word_count("see https://example.com/page now"), 2);
    }

    #[test]
    fn term_frequencies_count_repeats() {
        let tf = term_frequencies("a b a c a");
        assert_eq!(tf.get("a"), Some(&3));
        assert_eq!(tf.get("c"), Some(&1));
    }
}
