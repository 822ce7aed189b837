use crate::config::{ConfidenceThresholds, EngineConfig};
use crate::extractor::extract_action;
use crate::knowledge::KnowledgeBase;
use crate::schema::{Action, ConfidenceTier};
use std::collections::BTreeSet;

const BASE_CONFIDENCE: f64 = 0.80;
const FINANCIAL_FLOOR: f64 = 0.90;
const KEYWORD_BOOST: f64 = 0.05;
const MAX_KEYWORD_MATCHES: usize = 3;
const YEAR_BOOST: f64 = 0.05;
const ACTION_BOOST: f64 = 0.05;
const INDICATOR_BOOST: f64 = 0.05;
const FORMAL_BOOST: f64 = 0.02;

const FINANCIAL_INDICATORS: [&str; 7] = [
    "revenue",
    "expenses",
    "assets",
    "liabilities",
    "cash",
    "profit",
    "budget",
];

const FORMAL_TERMS: [&str; 5] = ["statement", "report", "financial", "fiscal", "budget"];

pub struct ConfidenceScorer<'a> {
    knowledge: &'a KnowledgeBase,
    config: &'a EngineConfig,
}

impl<'a> ConfidenceScorer<'a> {
    pub fn new(knowledge: &'a KnowledgeBase, config: &'a EngineConfig) -> Self {
        Self { knowledge, config }
    }

    /// Heuristic confidence for a financial (non-conversational) resolution.
    ///
    /// Depends only on the arguments, the knowledge base and the year allowlist.
    /// Boosts accumulate unclamped; the result is then floored at 0.90 and capped at 1.0.
    pub fn score(&self, entity: &str, years: &BTreeSet<String>, raw_text: &str) -> f64 {
        let query = raw_text.to_lowercase();
        let mut confidence = BASE_CONFIDENCE;

        if let Some(keywords) = self.knowledge.keywords(entity) {
            let matches = keywords
                .iter()
                .filter(|k| query.contains(k.as_str()))
                .count()
                .min(MAX_KEYWORD_MATCHES);
            confidence += matches as f64 * KEYWORD_BOOST;
        }

        let supported = years
            .iter()
            .filter(|year| self.config.is_supported_year(year))
            .count();
        confidence += supported as f64 * YEAR_BOOST;

        if matches!(extract_action(&query), Action::Get | Action::Compare) {
            confidence += ACTION_BOOST;
        }

        if FINANCIAL_INDICATORS.iter().any(|w| query.contains(w)) {
            confidence += INDICATOR_BOOST;
        }

        if FORMAL_TERMS.iter().any(|w| query.contains(w)) {
            confidence += FORMAL_BOOST;
        }

        confidence.max(FINANCIAL_FLOOR).min(1.0)
    }
}

impl ConfidenceTier {
    pub fn from_score(score: f64, thresholds: &ConfidenceThresholds) -> Self {
        if score >= thresholds.high {
            Self::High
        } else if score >= thresholds.medium {
            Self::Medium
        } else if score >= thresholds.low {
            Self::Low
        } else {
            Self::VeryLow
        }
    }
}
