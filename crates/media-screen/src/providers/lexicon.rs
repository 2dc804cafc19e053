//! Disallowed-term lexicon

use std::collections::HashSet;
use std::path::Path;

use crate::config::LexiconConfig;
use crate::error::{Error, Result};

/// Pure predicate deciding whether a raw transcript word is disallowed
pub trait TermMatcher: Send + Sync {
    fn is_match(&self, raw_word: &str) -> bool;
}

/// Built-in term list, single words plus hyphenated and multi-word variants.
///
/// This is a reduced list: ethnic, racial and homophobic slurs are left out
/// of the compiled-in defaults. Deployments that must flag them supply a
/// term file (`lexicon.path`) or `lexicon.extra_terms`.
const DEFAULT_TERMS: &[&str] = &[
    "fuck", "fucking", "fucker", "fucked", "motherfucker",
    "shit", "shitty", "shithead", "shitball", "shitballs", "bullshit",
    "ass", "asshole", "arse", "arsehole", "jackass",
    "ass-lick", "ass-licker", "ass lick", "ass licker",
    "bitch", "dumb bitch", "bastard", "dick", "prick", "cock",
    "pussy", "twat", "wanker", "douche", "douchebag",
    "crap", "bollocks", "bugger", "bloody", "damn", "piss",
    "slut", "whore", "titty", "titties",
    "idiot", "moron", "dumb", "screw", "screwed", "suck", "sucks",
    "cunt", "retard", "retarded", "sex", "nuts", "penis", "penises",
    "puzzie", "atto", "butthog",
];

/// Exact-match lexicon over normalized words
#[derive(Debug, Clone)]
pub struct Lexicon {
    terms: HashSet<String>,
}

impl Lexicon {
    /// Build from arbitrary terms; each term is normalized
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|t| normalize(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    /// Built-in term list
    pub fn builtin() -> Self {
        Self::new(DEFAULT_TERMS.iter().copied())
    }

    /// Build from configuration: term file (or built-ins) plus extra terms
    pub fn from_config(config: &LexiconConfig) -> Result<Self> {
        let mut lexicon = match &config.path {
            Some(path) => Self::from_file(path)?,
            None => Self::builtin(),
        };
        lexicon.extend(config.extra_terms.as_slice());
        Ok(lexicon)
    }

    /// Load a newline-delimited term file; blank lines and `#` comments are skipped
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read lexicon {}: {}", path.display(), e))
        })?;
        let lexicon = Self::new(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        );
        tracing::info!("Loaded {} lexicon terms from {}", lexicon.len(), path.display());
        Ok(lexicon)
    }

    pub fn extend<S: AsRef<str>>(&mut self, terms: &[S]) {
        self.terms.extend(
            terms
                .iter()
                .map(|t| normalize(t.as_ref()))
                .filter(|t| !t.is_empty()),
        );
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl TermMatcher for Lexicon {
    fn is_match(&self, raw_word: &str) -> bool {
        let word = normalize(raw_word);
        !word.is_empty() && self.terms.contains(&word)
    }
}

/// Case-fold and strip surrounding punctuation, keeping hyphens
pub fn normalize(raw: &str) -> String {
    raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Damn!"), "damn");
        assert_eq!(normalize("\"(Crap)\","), "crap");
        assert_eq!(normalize("Ass-Licker."), "ass-licker");
        assert_eq!(normalize("..."), "");
    }

    #[test]
    fn test_builtin_matches_variants() {
        let lexicon = Lexicon::builtin();
        assert!(lexicon.is_match(" Damn,"));
        assert!(lexicon.is_match("ass-lick"));
        assert!(lexicon.is_match("dumb bitch"));
        assert!(lexicon.is_match("Retarded."));
        assert!(lexicon.is_match("butthog"));
        assert!(lexicon.is_match("nuts!"));
        assert!(!lexicon.is_match("hello"));
        assert!(!lexicon.is_match("?!"));
    }

    #[test]
    fn test_extra_terms_extend_base() {
        let config = LexiconConfig {
            path: None,
            extra_terms: vec!["Frobnicate".to_string()],
        };
        let lexicon = Lexicon::from_config(&config).unwrap();
        assert!(lexicon.is_match("frobnicate!"));
        assert!(lexicon.is_match("damn"));
    }

    #[test]
    fn test_term_file_replaces_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.txt");
        std::fs::write(&path, "# house list\nzonk\n\n  Blarg  \n").unwrap();

        let lexicon = Lexicon::from_file(&path).unwrap();
        assert_eq!(lexicon.len(), 2);
        assert!(lexicon.is_match("BLARG."));
        assert!(!lexicon.is_match("damn"));
    }
}
