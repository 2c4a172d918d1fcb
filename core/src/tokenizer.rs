use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use std::collections::HashSet;

use crate::Position;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// How text is cut into `(term, position)` pairs before it reaches the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "n", rename_all = "lowercase")]
pub enum Analyzer {
    /// NFKC, diacritic folding, lowercase, stopword removal and English stemming.
    Words,
    /// Overlapping character windows of the given width.
    NGram(usize),
}

impl Default for Analyzer {
    fn default() -> Self { Analyzer::Words }
}

impl Analyzer {
    /// Terms of a document, positions strictly increasing.
    pub fn analyze(&self, text: &str) -> Vec<(String, Position)> {
        match *self {
            Analyzer::Words => tokenize(text),
            Analyzer::NGram(n) => ngrams(text, n, true),
        }
    }

    /// Terms of a query. N-gram windows cut short by the end of a run are dropped.
    pub fn analyze_query(&self, text: &str) -> Vec<(String, Position)> {
        match *self {
            Analyzer::Words => tokenize(text),
            Analyzer::NGram(n) => ngrams(text, n, false),
        }
    }
}

/// Tokenize text into (term, position) using NFKC normalization, diacritic folding, lowercase, stopword removal, and stemming.
///
/// Stopwords are dropped but still consume a position, so phrase offsets stay aligned with the text.
pub fn tokenize(text: &str) -> Vec<(String, Position)> {
    let normalized = fold_diacritics(text).to_lowercase();
    let mut tokens = Vec::new();
    for (pos, mat) in RE.find_iter(&normalized).enumerate() {
        let token = mat.as_str();
        if is_stopword(token) { continue; }
        let stem = STEMMER.stem(token).to_string();
        tokens.push((stem, pos as Position));
    }
    tokens
}

/// NFKC, then strips combining marks so `café` and `cafe` index the same.
fn fold_diacritics(text: &str) -> String {
    text.nfkc().nfd().filter(|c| !is_combining_mark(*c)).nfc().collect()
}

fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || c.is_ascii_punctuation()
        || matches!(c, '\u{3001}' | '\u{3002}' | '\u{FF08}' | '\u{FF09}' | '\u{FF01}' | '\u{FF0C}' | '\u{FF1A}' | '\u{FF1B}' | '\u{FF1F}')
}

/// One window per starting character, never crossing a separator.
fn ngrams(text: &str, n: usize, keep_short: bool) -> Vec<(String, Position)> {
    let n = n.max(1);
    let chars: Vec<char> = text.nfkc().flat_map(char::to_lowercase).collect();
    let mut tokens = Vec::new();
    let mut position: Position = 0;
    let mut i = 0;
    while i < chars.len() {
        if is_separator(chars[i]) {
            i += 1;
            continue;
        }
        let window: String = chars[i..].iter().take(n).take_while(|c| !is_separator(**c)).collect();
        if keep_short || window.chars().count() >= n {
            tokens.push((window, position));
        }
        position += 1;
        i += 1;
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        assert!(t.iter().any(|(w, _)| w == "run"));
    }

    #[test]
    fn stopwords_leave_position_gaps() {
        let t = tokenize("the quick fox");
        assert_eq!(t, vec![("quick".to_string(), 1), ("fox".to_string(), 2)]);
    }

    #[test]
    fn accents_are_folded() {
        assert_eq!(tokenize("Café"), vec![("cafe".to_string(), 0)]);
        assert_eq!(tokenize("CAFÉ cafe"), vec![("cafe".to_string(), 0), ("cafe".to_string(), 1)]);
        assert_eq!(fold_diacritics("naïve Zürich"), "naive Zurich");
        // Hangul decomposes under NFD but has no combining marks to drop
        assert_eq!(fold_diacritics("한국어"), "한국어");
    }

    #[test]
    fn bigrams_stop_at_separators() {
        let t = Analyzer::NGram(2).analyze("ab cd");
        let terms: Vec<(&str, Position)> = t.iter().map(|(s, p)| (s.as_str(), *p)).collect();
        assert_eq!(terms, vec![("ab", 0), ("b", 1), ("cd", 2), ("d", 3)]);
    }

    #[test]
    fn query_bigrams_drop_short_windows() {
        let t = Analyzer::NGram(2).analyze_query("ab cd");
        let terms: Vec<&str> = t.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(terms, vec!["ab", "cd"]);
    }
}
