//! Response shaping - post-processing of raw model output

/// Strategy applied to every raw answer before it reaches the user
pub trait ResponseShaper: Send + Sync {
    fn shape(&self, raw: &str) -> String;
}

pub const DEFAULT_WORD_THRESHOLD: usize = 50;

/// Long answers are cut to their first sentences.
///
/// An answer with more than `max_words` whitespace-separated words keeps
/// its first `max_sentences` ". "-delimited sentences and ends with a
/// single period. Shorter answers pass through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentenceCapShaper {
    pub max_words: usize,
    pub max_sentences: usize,
}

impl SentenceCapShaper {
    pub fn new(max_words: usize, max_sentences: usize) -> Self {
        Self {
            max_words,
            max_sentences,
        }
    }
}

impl Default for SentenceCapShaper {
    fn default() -> Self {
        Self::new(DEFAULT_WORD_THRESHOLD, crate::demiurge::persona::DEFAULT_SENTENCE_CAP)
    }
}

impl ResponseShaper for SentenceCapShaper {
    fn shape(&self, raw: &str) -> String {
        if raw.split_whitespace().count() <= self.max_words {
            return raw.to_string();
        }

        let kept: Vec<&str> = raw.split(". ").take(self.max_sentences).collect();
        let joined = kept.join(". ");
        let joined = joined.trim_end();
        format!("{}.", joined.strip_suffix('.').unwrap_or(joined))
    }
}

/// Leaves the answer as generated
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl ResponseShaper for Verbatim {
    fn shape(&self, raw: &str) -> String {
        raw.to_string()
    }
}
