//! Turn analyzer - reply budget and sentiment/risk scoring for a prompt.
//!
//! The risk score is a deliberately coarse three-bucket policy driven only
//! by the sign of the prompt's polarity. It is not a calibrated model.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Risk assigned to prompts with negative polarity.
pub const RISK_NEGATIVE: f64 = 0.7;
/// Risk assigned to prompts with zero polarity.
pub const RISK_NEUTRAL: f64 = 0.5;
/// Risk assigned to prompts with positive polarity.
pub const RISK_POSITIVE: f64 = 0.3;

/// Reply token budget derived from the prompt's word count.
pub fn max_tokens_for(prompt: &str) -> u32 {
    match prompt.split_whitespace().count() {
        n if n < 20 => 50,
        n if n < 50 => 150,
        _ => 300,
    }
}

/// Map polarity to a risk bucket. Only the sign matters.
pub fn risk_for(polarity: f64) -> f64 {
    if polarity < 0.0 {
        RISK_NEGATIVE
    } else if polarity > 0.0 {
        RISK_POSITIVE
    } else {
        RISK_NEUTRAL
    }
}

/// Polarity in [-1, 1] and subjectivity in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Sentiment {
    pub polarity: f64,
    pub subjectivity: f64,
}

/// Per-turn score returned to the caller once and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TurnScore {
    pub sentiment: Sentiment,
    pub risk_score: f64,
}

/// Pluggable sentiment model.
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> Sentiment;
}

/// Scores prompts and sizes replies.
#[derive(Clone)]
pub struct TurnAnalyzer {
    scorer: Arc<dyn SentimentScorer>,
}

impl TurnAnalyzer {
    pub fn new(scorer: Arc<dyn SentimentScorer>) -> Self {
        Self { scorer }
    }

    pub fn max_tokens_for(&self, prompt: &str) -> u32 {
        max_tokens_for(prompt)
    }

    pub fn score(&self, prompt: &str) -> TurnScore {
        let sentiment = self.scorer.score(prompt);
        TurnScore {
            sentiment,
            risk_score: risk_for(sentiment.polarity),
        }
    }
}

impl Default for TurnAnalyzer {
    fn default() -> Self {
        Self::new(Arc::new(LexiconScorer::default()))
    }
}

// ============================================================================
// Lexicon Scorer
// ============================================================================

const NEGATION_FACTOR: f64 = -0.5;
const INTENSIFIER_FACTOR: f64 = 1.3;

/// (word, polarity, subjectivity)
const LEXICON: &[(&str, f64, f64)] = &[
    ("good", 0.7, 0.6),
    ("great", 0.8, 0.75),
    ("excellent", 1.0, 1.0),
    ("amazing", 0.6, 0.9),
    ("wonderful", 1.0, 1.0),
    ("awesome", 1.0, 1.0),
    ("fantastic", 0.4, 0.9),
    ("happy", 0.8, 1.0),
    ("glad", 0.5, 1.0),
    ("love", 0.5, 0.6),
    ("like", 0.2, 0.4),
    ("nice", 0.6, 1.0),
    ("calm", 0.3, 0.75),
    ("better", 0.5, 0.5),
    ("best", 1.0, 0.3),
    ("hope", 0.3, 0.5),
    ("hopeful", 0.5, 0.7),
    ("relaxed", 0.4, 0.6),
    ("thanks", 0.2, 0.2),
    ("thank", 0.2, 0.2),
    ("grateful", 0.6, 0.8),
    ("fine", 0.4, 0.5),
    ("okay", 0.5, 0.5),
    ("confident", 0.5, 0.8),
    ("proud", 0.8, 1.0),
    ("excited", 0.4, 0.8),
    ("peaceful", 0.5, 0.7),
    ("bad", -0.7, 0.67),
    ("terrible", -1.0, 1.0),
    ("awful", -1.0, 1.0),
    ("horrible", -1.0, 1.0),
    ("worst", -1.0, 1.0),
    ("worse", -0.4, 0.6),
    ("sad", -0.5, 1.0),
    ("unhappy", -0.6, 0.9),
    ("angry", -0.5, 1.0),
    ("hate", -0.8, 0.9),
    ("lonely", -0.5, 1.0),
    ("alone", -0.2, 0.5),
    ("anxious", -0.4, 0.8),
    ("worried", -0.4, 0.8),
    ("afraid", -0.6, 0.9),
    ("scared", -0.5, 0.9),
    ("stressed", -0.5, 0.8),
    ("tired", -0.4, 0.7),
    ("depressed", -0.8, 1.0),
    ("hopeless", -0.9, 1.0),
    ("hurt", -0.5, 0.7),
    ("pain", -0.6, 0.7),
    ("upset", -0.5, 0.8),
    ("miserable", -1.0, 1.0),
    ("stupid", -0.8, 1.0),
    ("useless", -0.5, 0.6),
    ("wrong", -0.5, 0.9),
    ("difficult", -0.5, 1.0),
    ("hard", -0.3, 0.5),
    ("problem", -0.2, 0.4),
];

const NEGATORS: &[&str] = &["not", "no", "never", "nothing", "nobody", "neither", "nor"];

const INTENSIFIERS: &[&str] = &[
    "very",
    "really",
    "extremely",
    "so",
    "too",
    "incredibly",
    "absolutely",
    "totally",
];

/// Word-lexicon sentiment scorer.
///
/// Averages polarity and subjectivity over recognised words. A negator
/// flips and damps the next sentiment word; an intensifier amplifies it.
pub struct LexiconScorer {
    lexicon: HashMap<&'static str, (f64, f64)>,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self {
            lexicon: LEXICON.iter().map(|(w, p, s)| (*w, (*p, *s))).collect(),
        }
    }
}

impl LexiconScorer {
    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> Sentiment {
        let mut polarity_sum = 0.0;
        let mut subjectivity_sum = 0.0;
        let mut matched = 0usize;

        let mut negate = false;
        let mut intensify = false;

        for token in Self::tokens(text) {
            if NEGATORS.contains(&token.as_str()) || token.ends_with("n't") {
                negate = true;
                continue;
            }
            if INTENSIFIERS.contains(&token.as_str()) {
                intensify = true;
                continue;
            }

            let Some(&(mut polarity, mut subjectivity)) = self.lexicon.get(token.as_str()) else {
                continue;
            };

            if intensify {
                polarity = (polarity * INTENSIFIER_FACTOR).clamp(-1.0, 1.0);
                subjectivity = (subjectivity * INTENSIFIER_FACTOR).min(1.0);
            }
            if negate {
                polarity *= NEGATION_FACTOR;
            }

            polarity_sum += polarity;
            subjectivity_sum += subjectivity;
            matched += 1;
            negate = false;
            intensify = false;
        }

        if matched == 0 {
            return Sentiment::default();
        }

        let n = matched as f64;
        Sentiment {
            polarity: (polarity_sum / n).clamp(-1.0, 1.0),
            subjectivity: (subjectivity_sum / n).clamp(0.0, 1.0),
        }
    }
}
