use crate::config::EngineConfig;
use crate::knowledge::{word_count, KnowledgeBase};
use crate::schema::Action;
use crate::utils::normalize_fiscal_year;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

static YEAR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"20\d{2}-\d{2}",
        r"20\d{2}/\d{2}",
        r"(?i)fy\s*20\d{2}(?:-\d{2})?",
        r"(?i)fiscal\s+year\s+20\d{2}(?:-\d{2})?",
        r"(?i)financial\s+year\s+20\d{2}(?:-\d{2})?",
        r"\b20\d{2}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("year pattern is valid"))
    .collect()
});

static ACTION_PATTERNS: Lazy<Vec<(Action, Vec<Regex>)>> = Lazy::new(|| {
    let compile = |pattern: &str| Regex::new(pattern).expect("action pattern is valid");
    vec![
        (
            Action::Get,
            vec![
                compile(r"(?i)\b(what|show|get|tell|find)\b"),
                compile(r"(?i)\bis\b"),
                compile(r"(?i)\bare\b"),
            ],
        ),
        (
            Action::Compare,
            vec![compile(r"(?i)\b(compare|versus|vs|against|difference)\b")],
        ),
        (
            Action::Calculate,
            vec![compile(r"(?i)\b(calculate|compute|sum|total)\b")],
        ),
        (Action::List, vec![compile(r"(?i)\b(list|show all|display)\b")]),
    ]
});

/// Everything [`IntentExtractor::extract`] derives from one question.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedIntent {
    pub entity: String,
    pub years: BTreeSet<String>,
    pub action: Action,
    pub filters: BTreeMap<String, String>,
}

/// How the entity was settled on. Not part of [`crate::QueryIntent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitySource {
    Keywords,
    Synonym,
    GenericWords,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityScore<'a> {
    pub entity: &'a str,
    pub matches: usize,
    pub raw_score: usize,
    pub final_score: f64,
}

/// Pulls entity, fiscal years, action and filters out of free text.
///
/// For an entity with keyword set `K`, `matches` counts keywords found as
/// substrings of the lower-cased question and `raw` sums the squared word count
/// of each matched keyword. The entity scores `matches * raw / |K|`.
pub struct IntentExtractor<'a> {
    knowledge: &'a KnowledgeBase,
    config: &'a EngineConfig,
}

impl<'a> IntentExtractor<'a> {
    pub fn new(knowledge: &'a KnowledgeBase, config: &'a EngineConfig) -> Self {
        Self { knowledge, config }
    }

    pub fn extract(&self, text: &str) -> ExtractedIntent {
        let query = text.to_lowercase();
        let query = query.trim();

        let extracted = ExtractedIntent {
            entity: self.extract_entity(query),
            years: self.extract_fiscal_years(query),
            action: extract_action(query),
            filters: self.extract_filters(query),
        };
        debug!("Extracted {:?} from '{}'", extracted, text);
        extracted
    }

    pub fn extract_entity(&self, text: &str) -> String {
        self.resolve_entity(text).0
    }

    /// Entity plus how it was chosen; the second value lets strict callers reject fallbacks.
    pub fn resolve_entity(&self, text: &str) -> (String, EntitySource) {
        let query = text.to_lowercase();

        if let Some(best) = self.best_scoring_entity(&query) {
            return (best.entity.to_string(), EntitySource::Keywords);
        }

        if let Some(entity) = self.entity_from_synonyms(&query) {
            return (entity, EntitySource::Synonym);
        }

        if let Some(entity) = generic_word_entity(&query) {
            return (entity.to_string(), EntitySource::GenericWords);
        }

        (self.config.default_entity.clone(), EntitySource::Default)
    }

    /// Entities in evaluation order: most specific keyword first, then by key.
    pub fn evaluation_order(&self) -> Vec<(&'a String, &'a BTreeSet<String>)> {
        let mut ordered: Vec<_> = self.knowledge.metric_keywords().iter().collect();
        ordered.sort_by(|a, b| specificity(b.1).cmp(&specificity(a.1)));
        ordered
    }

    pub fn score_entities(&self, lowered_query: &str) -> Vec<EntityScore<'a>> {
        self.evaluation_order()
            .into_iter()
            .filter(|(_, keywords)| !keywords.is_empty())
            .map(|(entity, keywords)| {
                let mut matches = 0;
                let mut raw_score = 0;
                for keyword in keywords.iter().filter(|k| lowered_query.contains(k.as_str())) {
                    matches += 1;
                    let words = word_count(keyword);
                    raw_score += words * words;
                }

                EntityScore {
                    entity: entity.as_str(),
                    matches,
                    raw_score,
                    final_score: (matches * raw_score) as f64 / keywords.len() as f64,
                }
            })
            .collect()
    }

    fn best_scoring_entity(&self, lowered_query: &str) -> Option<EntityScore<'a>> {
        let mut best: Option<EntityScore<'a>> = None;
        for score in self.score_entities(lowered_query) {
            let current_best = best.map(|b| b.final_score).unwrap_or(0.0);
            if score.final_score > current_best {
                best = Some(score);
            }
        }
        best
    }

    fn entity_from_synonyms(&self, lowered_query: &str) -> Option<String> {
        self.knowledge
            .column_synonyms()
            .iter()
            .filter(|(canonical, _)| {
                self.knowledge
                    .is_known_entity(&canonical.replace(' ', "_"))
            })
            .find(|(_, phrases)| phrases.iter().any(|p| lowered_query.contains(p.as_str())))
            .map(|(canonical, _)| canonical.replace(' ', "_"))
    }

    /// Supported fiscal years mentioned in the text, normalized to `YYYY-YY`.
    pub fn extract_fiscal_years(&self, text: &str) -> BTreeSet<String> {
        YEAR_PATTERNS
            .iter()
            .flat_map(|pattern| pattern.find_iter(text))
            .filter_map(|m| normalize_fiscal_year(m.as_str()))
            .filter(|year| self.config.is_supported_year(year))
            .collect()
    }

    pub fn extract_filters(&self, text: &str) -> BTreeMap<String, String> {
        let query = text.to_lowercase();
        let mut filters = BTreeMap::new();
        for term in &self.config.filter_terms {
            if query.contains(&term.term.to_lowercase()) {
                filters.insert(term.key.clone(), term.value.clone());
            }
        }
        filters
    }

    /// Up to three hints on how to rephrase a question that resolved poorly.
    pub fn suggest_alternatives(&self, text: &str) -> Vec<String> {
        let mut suggestions = Vec::new();

        if self.extract_fiscal_years(&text.to_lowercase()).is_empty() {
            let example_year = self
                .config
                .supported_years
                .get(1)
                .or_else(|| self.config.supported_years.first())
                .cloned()
                .unwrap_or_default();
            suggestions.push(format!(
                "Try specifying a fiscal year like: '{} for {}'",
                text.trim().trim_end_matches('?'),
                example_year
            ));
            suggestions.push(format!(
                "Available years: {}",
                self.config.supported_years.join(", ")
            ));
        }

        let (_, source) = self.resolve_entity(text);
        if source == EntitySource::Default {
            suggestions.push("Try being more specific, for example:".to_string());
            suggestions.extend([
                "What are the employee benefits for 2024-25?".to_string(),
                "Show me total expenses for 2025-26".to_string(),
                "What are the assets in 2024-25?".to_string(),
            ]);
        }

        suggestions.push(
            "Try patterns like: 'What is [metric] for [year]?' or 'Show me [metric] in [year]'"
                .to_string(),
        );
        suggestions.truncate(3);
        suggestions
    }
}

fn specificity(keywords: &BTreeSet<String>) -> usize {
    keywords.iter().map(|k| word_count(k)).max().unwrap_or(0)
}

fn generic_word_entity(query: &str) -> Option<&'static str> {
    let any = |words: &[&str]| words.iter().any(|w| query.contains(w));

    if !any(&["total", "sum", "amount"]) {
        return None;
    }

    if any(&["spend", "cost", "expense"]) {
        Some("expenses")
    } else if any(&["earn", "income", "revenue"]) {
        Some("revenue")
    } else if any(&["asset", "holding"]) {
        Some("assets")
    } else {
        None
    }
}

/// First action category with a matching pattern, `Get` when none match.
pub fn extract_action(text: &str) -> Action {
    ACTION_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| p.is_match(text)))
        .map(|(action, _)| *action)
        .unwrap_or(Action::Get)
}
