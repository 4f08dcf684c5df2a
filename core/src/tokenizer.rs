use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{M}\p{N}_'’]*").expect("valid regex");
    static ref DEFAULT_STOPWORDS: Vec<&'static str> = vec![
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
}

/// Snowball algorithms a tokenizer may stem with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemmerChoice {
    English,
    French,
    German,
    Spanish,
    Italian,
    Portuguese,
    Dutch,
    Swedish,
    Russian,
}

impl StemmerChoice {
    fn algorithm(self) -> Algorithm {
        match self {
            StemmerChoice::English => Algorithm::English,
            StemmerChoice::French => Algorithm::French,
            StemmerChoice::German => Algorithm::German,
            StemmerChoice::Spanish => Algorithm::Spanish,
            StemmerChoice::Italian => Algorithm::Italian,
            StemmerChoice::Portuguese => Algorithm::Portuguese,
            StemmerChoice::Dutch => Algorithm::Dutch,
            StemmerChoice::Swedish => Algorithm::Swedish,
            StemmerChoice::Russian => Algorithm::Russian,
        }
    }
}

/// Analysis settings. Persisted in the index header so queries are analyzed
/// exactly like the documents were.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenizerConfig {
    /// Terms shorter than this many characters are dropped.
    pub min_term_length: usize,
    pub stopwords: BTreeSet<String>,
    pub stemmer: Option<StemmerChoice>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            min_term_length: 2,
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            stemmer: Some(StemmerChoice::English),
        }
    }
}

impl TokenizerConfig {
    /// No stopwords, no stemming, single-character terms dropped.
    pub fn plain() -> Self {
        Self { min_term_length: 2, stopwords: BTreeSet::new(), stemmer: None }
    }
}

/// A normalized term and the ordinal of the word it came from.
///
/// Positions count every word in the input, including the ones that were
/// dropped as stopwords or for being too short, so gaps are preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub position: usize,
}

pub struct Tokenizer {
    config: TokenizerConfig,
    stopwords: HashSet<String>,
    stemmer: Option<Stemmer>,
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer").field("config", &self.config).finish()
    }
}

impl Clone for Tokenizer {
    fn clone(&self) -> Self {
        Tokenizer::new(self.config.clone())
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Tokenizer::new(TokenizerConfig::default())
    }
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        let stopwords = config.stopwords.iter().map(|w| fold(w)).collect();
        let stemmer = config.stemmer.map(|s| Stemmer::create(s.algorithm()));
        Self { config, stopwords, stemmer }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Lazily tokenize `text`. The returned iterator is `Clone`, so the same
    /// input can be walked any number of times.
    pub fn tokenize<'a>(&'a self, text: &'a str) -> Tokens<'a> {
        Tokens { tokenizer: self, text, cursor: 0, position: 0 }
    }

    /// Tokenize eagerly, rejecting text that cannot be treated as prose.
    pub fn analyze(&self, text: &str) -> Result<Vec<Token>> {
        if text.contains('\0') {
            return Err(Error::InvalidInput("text contains a NUL byte".into()));
        }
        Ok(self.tokenize(text).collect())
    }

    /// Number of words in `text`, including those that produce no term.
    pub fn word_count(&self, text: &str) -> usize {
        RE.find_iter(text).count()
    }

    fn normalize(&self, word: &str) -> Option<String> {
        let mut folded = fold(word);
        // the stemmers handle possessives themselves
        if self.stemmer.is_none() {
            if let Some(len) = folded.strip_suffix("'s").map(str::len) {
                folded.truncate(len);
            }
        }
        if folded.chars().count() < self.config.min_term_length {
            return None;
        }
        if self.stopwords.contains(&folded) {
            return None;
        }
        let term = match &self.stemmer {
            Some(stemmer) => stemmer.stem(&folded).into_owned(),
            None => folded,
        };
        if term.is_empty() { None } else { Some(term) }
    }
}

/// Iterator returned by [`Tokenizer::tokenize`].
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    tokenizer: &'a Tokenizer,
    text: &'a str,
    cursor: usize,
    position: usize,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        while let Some(mat) = RE.find_at(self.text, self.cursor) {
            self.cursor = mat.end();
            let position = self.position;
            self.position += 1;
            if let Some(term) = self.tokenizer.normalize(mat.as_str()) {
                return Some(Token { term, position });
            }
        }
        self.cursor = self.text.len();
        None
    }
}

/// Compatibility-decompose, strip diacritics, lowercase, and trim apostrophes.
fn fold(word: &str) -> String {
    let stripped: String = word
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c == '’' { '\'' } else { c })
        .collect();
    stripped.to_lowercase().trim_matches('\'').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(t: &Tokenizer, text: &str) -> Vec<String> {
        t.tokenize(text).map(|tok| tok.term).collect()
    }

    #[test]
    fn possessive_stripped_without_stemmer() {
        let t = Tokenizer::new(TokenizerConfig::plain());
        assert_eq!(terms(&t, "MParT's maps x86"), vec!["mpart", "maps", "x86"]);
        assert_eq!(terms(&t, "MParT’s"), vec!["mpart"]);
    }

    #[test]
    fn basic_tokenize() {
        let t = Tokenizer::default();
        let words = terms(&t, "Running, runner's run!");
        assert!(words.iter().any(|w| w == "run"));
    }

    #[test]
    fn splits_on_punctuation() {
        let t = Tokenizer::new(TokenizerConfig::plain());
        assert_eq!(terms(&t, "MParT.MapOptions(opt)"), vec!["mpart", "mapoptions", "opt"]);
    }

    #[test]
    fn strips_diacritics() {
        let t = Tokenizer::new(TokenizerConfig::plain());
        assert_eq!(terms(&t, "Café Ångström naïve"), vec!["cafe", "angstrom", "naive"]);
    }

    #[test]
    fn drops_short_terms() {
        let mut config = TokenizerConfig::plain();
        config.min_term_length = 3;
        let t = Tokenizer::new(config);
        assert_eq!(terms(&t, "a an map of options"), vec!["map", "options"]);
    }

    #[test]
    fn positions_keep_gaps_for_dropped_words() {
        let t = Tokenizer::default();
        let toks: Vec<Token> = t.tokenize("quick and the brown").collect();
        assert_eq!(toks.len(), 2);
        assert_eq!(toks[0].position, 0);
        assert_eq!(toks[1].position, 3);
    }

    #[test]
    fn tokens_are_restartable() {
        let t = Tokenizer::default();
        let tokens = t.tokenize("keyword arguments for training");
        let first: Vec<Token> = tokens.clone().collect();
        let second: Vec<Token> = tokens.collect();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn custom_stopwords_are_folded() {
        let mut config = TokenizerConfig::plain();
        config.stopwords.insert("MParT".into());
        let t = Tokenizer::new(config);
        assert_eq!(terms(&t, "MParT maps"), vec!["maps"]);
    }

    #[test]
    fn analyze_rejects_nul() {
        let t = Tokenizer::default();
        let err = t.analyze("bad\0text").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
    }

    #[test]
    fn empty_text_yields_nothing() {
        let t = Tokenizer::default();
        assert_eq!(t.tokenize("").count(), 0);
        assert_eq!(t.tokenize("   ,,; 123 ").count(), 0);
    }
}
