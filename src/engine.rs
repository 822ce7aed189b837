use crate::confidence::ConfidenceScorer;
use crate::config::{EngineConfig, FollowUpConfig};
use crate::conversation;
use crate::error::{FinancialQueryError, Result};
use crate::extractor::{EntitySource, ExtractedIntent, IntentExtractor};
use crate::knowledge::{KnowledgeBase, KnowledgeHandle};
use crate::query::QuerySpec;
use crate::schema::{ConfidenceTier, ConversationKind, QueryIntent, TimeOfDay};
use crate::store::{DataStore, QueryResult, SchemaCatalog};
use crate::synthesizer::QuerySynthesizer;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

static DANGEROUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(drop|delete|truncate|alter)\s+table\b",
        r"(?i)\b(insert|update)\s+\w+\s+set\b",
        r"--\s*$",
        r"/\*.*\*/",
        r"(?i)\bunion\s+select\b",
        r"(?i)\bexec\s*\(",
        r"(?i)\beval\s*\(",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("validation pattern is valid"))
    .collect()
});

static FOLLOW_UP_PERIOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(20\d{2})[-/](20\d{2}|\d{2})\b").expect("follow-up pattern is valid")
});

const VALUE_REQUESTS: [&str; 4] = [
    "give me the value",
    "what is the value",
    "show me the value",
    "tell me the value",
];

const MAX_FOLLOW_UP_WORDS: usize = 3;

const FOLLOW_UP_FILLER: [&str; 7] = ["and", "what", "about", "how", "for", "in", "fy"];

/// Outcome of [`QueryEngine::answer`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
    Conversation {
        intent: QueryIntent,
        kind: ConversationKind,
        reply: String,
    },
    Data {
        intent: QueryIntent,
        query: QuerySpec,
        sql: String,
        result: QueryResult,
        /// Row label the question most likely refers to.
        row_hint: String,
    },
}

impl Answer {
    pub fn intent(&self) -> &QueryIntent {
        match self {
            Self::Conversation { intent, .. } | Self::Data { intent, .. } => intent,
        }
    }
}

/// Resolves questions into intents and answers them against a [`DataStore`].
///
/// The engine is `Sync`; every call works on one knowledge snapshot, so
/// [`QueryEngine::reload_knowledge`] may run while other threads answer.
pub struct QueryEngine {
    knowledge: KnowledgeHandle,
    config: EngineConfig,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(KnowledgeBase::builtin(), EngineConfig::default())
    }
}

impl QueryEngine {
    pub fn new(knowledge: KnowledgeBase, config: EngineConfig) -> Self {
        Self {
            knowledge: KnowledgeHandle::new(knowledge),
            config,
        }
    }

    /// Loads the knowledge artifacts named by `config.knowledge`.
    pub fn from_config(config: EngineConfig) -> Self {
        let knowledge = KnowledgeBase::load(&config.knowledge);
        Self::new(knowledge, config)
    }

    pub fn from_config_file(path: &Path) -> Result<Self> {
        Ok(Self::from_config(EngineConfig::from_json_file(path)?))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn knowledge(&self) -> Arc<KnowledgeBase> {
        self.knowledge.snapshot()
    }

    /// Rebuilds the knowledge base from its artifacts and swaps it in.
    pub fn reload_knowledge(&self) -> Arc<KnowledgeBase> {
        self.replace_knowledge(KnowledgeBase::load(&self.config.knowledge))
    }

    pub fn replace_knowledge(&self, knowledge: KnowledgeBase) -> Arc<KnowledgeBase> {
        self.knowledge.replace(knowledge);
        info!("Knowledge base replaced");
        self.knowledge.snapshot()
    }

    pub fn classify(&self, text: &str) -> Option<ConversationKind> {
        conversation::classify(text)
    }

    pub fn extract(&self, text: &str) -> ExtractedIntent {
        let knowledge = self.knowledge.snapshot();
        IntentExtractor::new(&knowledge, &self.config).extract(text)
    }

    pub fn score(&self, entity: &str, years: &BTreeSet<String>, raw_text: &str) -> f64 {
        let knowledge = self.knowledge.snapshot();
        ConfidenceScorer::new(&knowledge, &self.config).score(entity, years, raw_text)
    }

    pub fn synthesize(&self, intent: &QueryIntent, catalog: &SchemaCatalog) -> Result<QuerySpec> {
        let knowledge = self.knowledge.snapshot();
        QuerySynthesizer::new(&knowledge, &self.config).synthesize(intent, catalog)
    }

    /// Classifier, then extractor and scorer.
    pub fn resolve(&self, text: &str) -> QueryIntent {
        let knowledge = self.knowledge.snapshot();
        self.resolve_with(&knowledge, text)
    }

    pub fn confidence_tier(&self, intent: &QueryIntent) -> ConfidenceTier {
        ConfidenceTier::from_score(intent.confidence, &self.config.confidence)
    }

    pub fn suggest_alternatives(&self, text: &str) -> Vec<String> {
        let knowledge = self.knowledge.snapshot();
        IntentExtractor::new(&knowledge, &self.config).suggest_alternatives(text)
    }

    fn resolve_with(&self, knowledge: &KnowledgeBase, text: &str) -> QueryIntent {
        if let Some(kind) = conversation::classify(text) {
            debug!("'{}' is conversational ({})", text, kind.as_str());
            return QueryIntent::conversation(kind);
        }

        let extracted = IntentExtractor::new(knowledge, &self.config).extract(text);
        let confidence = ConfidenceScorer::new(knowledge, &self.config).score(
            &extracted.entity,
            &extracted.years,
            text,
        );

        QueryIntent {
            action: extracted.action,
            entity: extracted.entity,
            years: extracted.years,
            filters: extracted.filters,
            confidence,
        }
    }

    /// Validates, resolves and answers one question.
    pub fn answer(&self, text: &str, store: &dyn DataStore) -> Result<Answer> {
        let cleaned = validate_question(text, self.config.max_question_length)?;
        let question = match rewrite_follow_up(&cleaned, &self.config.follow_up) {
            Some(rewritten) => {
                info!("Follow-up '{}' rewritten as '{}'", cleaned, rewritten);
                rewritten
            }
            None => cleaned,
        };

        if let Some(kind) = conversation::classify(&question) {
            let reply = conversation::respond(kind, Some(TimeOfDay::now()));
            return Ok(Answer::Conversation {
                intent: QueryIntent::conversation(kind),
                kind,
                reply,
            });
        }

        let knowledge = self.knowledge.snapshot();
        let intent = self.resolve_with(&knowledge, &question);
        self.check_strictness(&knowledge, &intent, &question)?;

        let catalog = SchemaCatalog::discover(store);
        let query = QuerySynthesizer::new(&knowledge, &self.config).synthesize(&intent, &catalog)?;
        let sql = query.to_sql();
        info!(
            "Answering '{}' ({} {}, confidence {:.2}) with: {}",
            question, intent.action, intent.entity, intent.confidence, sql
        );

        let result = store.execute(&query).map_err(|e| match e {
            FinancialQueryError::ExecutionFailure(_) => e,
            other => FinancialQueryError::ExecutionFailure(other.to_string()),
        })?;

        if result.is_empty() {
            warn!("No rows for '{}' in {}", intent.entity, query.table);
            return Err(FinancialQueryError::EmptyResult {
                table: query.table.clone(),
            });
        }

        let year = intent.years.iter().next().map(String::as_str).unwrap_or("");
        let row_hint = knowledge.row_identifier(&intent.entity, year);

        Ok(Answer::Data {
            intent,
            query,
            sql,
            result,
            row_hint,
        })
    }

    fn check_strictness(
        &self,
        knowledge: &KnowledgeBase,
        intent: &QueryIntent,
        question: &str,
    ) -> Result<()> {
        let strict = &self.config.strict;

        if strict.require_fiscal_year && intent.years.is_empty() {
            return Err(FinancialQueryError::NoSupportedYear);
        }

        if strict.require_known_entity {
            let (_, source) = IntentExtractor::new(knowledge, &self.config).resolve_entity(question);
            if matches!(source, EntitySource::GenericWords | EntitySource::Default) {
                return Err(FinancialQueryError::UnknownEntity {
                    entity: intent.entity.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Rejects empty, oversized or injection-looking questions; returns the trimmed text.
pub fn validate_question(text: &str, max_length: usize) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FinancialQueryError::InvalidInput(
            "Query cannot be empty".to_string(),
        ));
    }

    if trimmed.chars().count() > max_length {
        return Err(FinancialQueryError::InvalidInput(format!(
            "Query too long (max {} characters)",
            max_length
        )));
    }

    if DANGEROUS_PATTERNS.iter().any(|p| p.is_match(text)) {
        return Err(FinancialQueryError::InvalidInput(
            "Invalid query format".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

/// Expands the fixed follow-up shortcuts into full questions about the configured subject.
pub fn rewrite_follow_up(question: &str, follow_up: &FollowUpConfig) -> Option<String> {
    let lowered = question.trim().to_lowercase();
    let bare = lowered.trim_end_matches('?').trim();

    if VALUE_REQUESTS.contains(&bare) {
        return Some(format!(
            "What is the {} for {}?",
            follow_up.subject, follow_up.default_period
        ));
    }

    if bare.split_whitespace().count() > MAX_FOLLOW_UP_WORDS {
        return None;
    }

    let caps = FOLLOW_UP_PERIOD.captures(bare)?;
    let remainder = FOLLOW_UP_PERIOD.replace_all(bare, " ");
    let names_something = remainder
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .any(|w| !FOLLOW_UP_FILLER.contains(&w));
    if names_something {
        return None;
    }

    let start = caps.get(1)?.as_str();
    let end = caps.get(2)?.as_str();
    let end = &end[end.len() - 2..];

    Some(format!(
        "What is the {} for {}-{}?",
        follow_up.subject, start, end
    ))
}
