use crate::config::KnowledgeSources;
use crate::ingestion::{load_column_synonyms, load_file_mappings, load_training_rows};
use crate::schema::StatementType;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMappingEntry {
    pub file_name: String,
    pub statement_type: StatementType,
}

/// One training question for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMappingEntry {
    pub question: String,
    /// `None` applies to every fiscal year.
    pub fiscal_year: Option<String>,
    pub keywords: Vec<String>,
    pub row_identifier: Option<String>,
}

/// Vocabulary behind intent resolution, assembled once from the knowledge
/// artifacts or the built-in defaults and never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    file_mappings: BTreeMap<String, FileMappingEntry>,
    row_mappings: BTreeMap<String, Vec<RowMappingEntry>>,
    column_synonyms: BTreeMap<String, BTreeSet<String>>,
    metric_keywords: BTreeMap<String, BTreeSet<String>>,
}

const BASE_VOCABULARY: &[(&str, &[&str])] = &[
    (
        "revenue",
        &["revenue", "income", "earnings", "receipts", "own-source revenue", "sales", "turnover"],
    ),
    (
        "expenses",
        &["expenses", "costs", "expenditure", "spending", "outgoings"],
    ),
    (
        "employee_benefits",
        &["employee benefits", "staff benefits", "personnel costs", "employee benefit"],
    ),
    (
        "operating_expenses",
        &["operating expenses", "opex", "operational costs"],
    ),
    (
        "assets",
        &["assets", "holdings", "resources", "total assets", "financial assets", "non-financial assets"],
    ),
    ("current_assets", &["current assets", "short term assets"]),
    (
        "liabilities",
        &["liabilities", "debts", "obligations", "payables", "provisions", "total liabilities"],
    ),
    (
        "equity",
        &["equity", "net worth", "shareholders equity", "net assets", "contributed equity"],
    ),
    (
        "cash_flow",
        &["cash flow", "cashflow", "cash position", "net cash", "operating activities"],
    ),
    (
        "cash_and_cash_equivalents",
        &["cash and cash equivalents", "cash & cash equivalents", "cash equivalents", "cash at the end of", "cash at end of"],
    ),
    ("cash", &["cash", "liquid assets", "available cash"]),
    (
        "property",
        &["property", "plant", "equipment", "land", "buildings", "ppe"],
    ),
    (
        "net_income",
        &["net income", "profit", "net profit", "bottom line", "surplus", "deficit", "comprehensive income"],
    ),
    (
        "investing_activities",
        &["investing activities", "investment activities"],
    ),
    (
        "financing_activities",
        &["financing activities", "financing cash flow"],
    ),
];

const DEFAULT_FILE_MAPPINGS: &[(&str, &str, StatementType)] = &[
    ("revenue", "Income Statement", StatementType::IncomeStatement),
    ("expenses", "Income Statement", StatementType::IncomeStatement),
    ("employee_benefits", "Income Statement", StatementType::IncomeStatement),
    ("net_income", "Income Statement", StatementType::IncomeStatement),
    ("assets", "Balance Sheet", StatementType::BalanceSheet),
    ("liabilities", "Balance Sheet", StatementType::BalanceSheet),
    ("equity", "Balance Sheet", StatementType::BalanceSheet),
    ("cash", "Balance Sheet", StatementType::BalanceSheet),
    ("cash_flow", "Cash Flow", StatementType::CashFlow),
    ("investing_activities", "Cash Flow", StatementType::CashFlow),
    ("financing_activities", "Cash Flow", StatementType::CashFlow),
];

const STANDARD_ROW_LABELS: &[(StatementType, &str, &str)] = &[
    (StatementType::IncomeStatement, "revenue", "Own-source revenue"),
    (StatementType::IncomeStatement, "expenses", "Total expenses"),
    (StatementType::IncomeStatement, "employee_benefits", "Employee benefits"),
    (StatementType::IncomeStatement, "net_income", "Net cost of services"),
    (StatementType::BalanceSheet, "assets", "Total assets"),
    (StatementType::BalanceSheet, "liabilities", "Total liabilities"),
    (StatementType::BalanceSheet, "equity", "Total equity"),
    (StatementType::BalanceSheet, "cash", "Cash and cash equivalents"),
    (StatementType::CashFlow, "cash_flow", "Net cash from operating activities"),
    (StatementType::CashFlow, "investing_activities", "Net cash used in investing activities"),
    (StatementType::CashFlow, "financing_activities", "Net cash from financing activities"),
];

pub fn default_file_mappings() -> BTreeMap<String, FileMappingEntry> {
    DEFAULT_FILE_MAPPINGS
        .iter()
        .map(|(metric, file_name, statement_type)| {
            (
                metric.to_string(),
                FileMappingEntry {
                    file_name: file_name.to_string(),
                    statement_type: *statement_type,
                },
            )
        })
        .collect()
}

/// Number of whitespace-separated words in a keyword phrase.
pub fn word_count(phrase: &str) -> usize {
    phrase.split_whitespace().count()
}

impl KnowledgeBase {
    /// Merges the base vocabulary with every keyword derived from the training rows.
    pub fn new(
        file_mappings: BTreeMap<String, FileMappingEntry>,
        row_mappings: BTreeMap<String, Vec<RowMappingEntry>>,
        column_synonyms: BTreeMap<String, BTreeSet<String>>,
    ) -> Self {
        let mut metric_keywords: BTreeMap<String, BTreeSet<String>> = BASE_VOCABULARY
            .iter()
            .map(|(entity, keywords)| {
                (
                    entity.to_string(),
                    keywords.iter().map(|k| k.to_string()).collect(),
                )
            })
            .collect();

        for (entity, rows) in &row_mappings {
            let keywords = metric_keywords.entry(entity.clone()).or_default();
            for row in rows {
                keywords.extend(row.keywords.iter().cloned());
            }
        }

        Self {
            file_mappings,
            row_mappings,
            column_synonyms,
            metric_keywords,
        }
    }

    /// Base vocabulary and default file mappings only.
    pub fn builtin() -> Self {
        Self::new(default_file_mappings(), BTreeMap::new(), BTreeMap::new())
    }

    /// Loads whichever artifacts exist; anything missing or unreadable falls back to defaults.
    pub fn load(sources: &KnowledgeSources) -> Self {
        let file_mappings = match sources.file_mapping_path() {
            Some(path) => load_or_default(&path, "file mapping", load_file_mappings)
                .filter(|mappings| !mappings.is_empty())
                .unwrap_or_else(|| {
                    warn!("Using default file mappings");
                    default_file_mappings()
                }),
            None => default_file_mappings(),
        };

        let row_mappings = sources
            .training_rows_path()
            .and_then(|path| load_or_default(&path, "training rows", load_training_rows))
            .unwrap_or_default();

        let column_synonyms = sources
            .column_synonyms_path()
            .and_then(|path| load_or_default(&path, "column synonyms", load_column_synonyms))
            .unwrap_or_default();

        let knowledge = Self::new(file_mappings, row_mappings, column_synonyms);
        info!(
            "Knowledge base ready: {} file mappings, {} trained entities, {} synonym groups, {} keyword sets",
            knowledge.file_mappings.len(),
            knowledge.row_mappings.len(),
            knowledge.column_synonyms.len(),
            knowledge.metric_keywords.len()
        );
        knowledge
    }

    pub fn file_mapping(&self, entity: &str) -> Option<&FileMappingEntry> {
        self.file_mappings.get(entity)
    }

    pub fn file_mappings(&self) -> &BTreeMap<String, FileMappingEntry> {
        &self.file_mappings
    }

    pub fn row_mappings(&self, entity: &str) -> &[RowMappingEntry] {
        self.row_mappings
            .get(entity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn metric_keywords(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.metric_keywords
    }

    pub fn keywords(&self, entity: &str) -> Option<&BTreeSet<String>> {
        self.metric_keywords.get(entity)
    }

    pub fn is_known_entity(&self, entity: &str) -> bool {
        self.metric_keywords.contains_key(entity)
    }

    pub fn synonyms(&self, canonical: &str) -> Option<&BTreeSet<String>> {
        self.column_synonyms.get(canonical)
    }

    pub fn column_synonyms(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.column_synonyms
    }

    pub fn statement_type(&self, entity: &str) -> Option<StatementType> {
        self.file_mappings.get(entity).map(|m| m.statement_type)
    }

    /// Row label expected for `entity` in `fiscal_year`.
    ///
    /// The first training row whose year is unset or equal wins; its label
    /// (or the entity key when it carries none) is returned. Otherwise a
    /// standard label for the entity's statement type, otherwise the key.
    pub fn row_identifier(&self, entity: &str, fiscal_year: &str) -> String {
        if let Some(row) = self
            .row_mappings(entity)
            .iter()
            .find(|row| row.fiscal_year.as_deref().map_or(true, |y| y == fiscal_year))
        {
            return row
                .row_identifier
                .clone()
                .unwrap_or_else(|| entity.to_string());
        }

        if let Some(statement_type) = self.statement_type(entity) {
            if let Some((_, _, label)) = STANDARD_ROW_LABELS
                .iter()
                .find(|(st, key, _)| *st == statement_type && *key == entity)
            {
                return label.to_string();
            }
        }

        entity.to_string()
    }
}

fn load_or_default<T>(
    path: &Path,
    label: &str,
    loader: impl Fn(&Path) -> crate::error::Result<T>,
) -> Option<T> {
    if !path.exists() {
        warn!("{} artifact not found at {}", label, path.display());
        return None;
    }

    match loader(path) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Could not load {} from {}: {}", label, path.display(), e);
            None
        }
    }
}

/// Shared, swappable reference to the current knowledge base.
///
/// Readers take an `Arc` snapshot and keep using it for the whole request, so a
/// concurrent [`KnowledgeHandle::replace`] is never observed half-way.
#[derive(Debug)]
pub struct KnowledgeHandle {
    current: RwLock<Arc<KnowledgeBase>>,
}

impl KnowledgeHandle {
    pub fn new(knowledge: KnowledgeBase) -> Self {
        Self {
            current: RwLock::new(Arc::new(knowledge)),
        }
    }

    pub fn snapshot(&self) -> Arc<KnowledgeBase> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, knowledge: KnowledgeBase) -> Arc<KnowledgeBase> {
        let next = Arc::new(knowledge);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn training_row(question: &str, year: Option<&str>, label: Option<&str>) -> RowMappingEntry {
        RowMappingEntry {
            question: question.to_string(),
            fiscal_year: year.map(str::to_string),
            keywords: crate::ingestion::extract_keywords(question),
            row_identifier: label.map(str::to_string),
        }
    }

    #[test]
    fn test_builtin_defaults() {
        let kb = KnowledgeBase::builtin();
        assert_eq!(kb.file_mappings().len(), 11);
        assert_eq!(
            kb.statement_type("cash_flow"),
            Some(StatementType::CashFlow)
        );
        assert_eq!(kb.keywords("revenue").unwrap().len(), 7);
        assert!(kb.is_known_entity("cash_and_cash_equivalents"));
    }

    #[test]
    fn test_training_keywords_are_merged_and_deduplicated() {
        let mut rows = BTreeMap::new();
        rows.insert(
            "revenue".to_string(),
            vec![
                training_row("what is the revenue for", Some("2024-25"), None),
                training_row("show me total revenue", None, None),
            ],
        );
        rows.insert(
            "opening_balance".to_string(),
            vec![training_row("opening balance for", None, Some("Opening balance"))],
        );

        let kb = KnowledgeBase::new(default_file_mappings(), rows, BTreeMap::new());

        let revenue = kb.keywords("revenue").unwrap();
        // "revenue" was already present; "total" is new.
        assert_eq!(revenue.len(), 8);
        assert!(revenue.contains("total"));

        let opening = kb.keywords("opening_balance").unwrap();
        assert!(opening.contains("opening") && opening.contains("balance"));
    }

    #[test]
    fn test_row_identifier_resolution() {
        let mut rows = BTreeMap::new();
        rows.insert(
            "expenses".to_string(),
            vec![
                training_row("total expenditure for", Some("2025-26"), Some("Expenditure 25")),
                training_row("what are the total expenses", None, Some("Total expenses")),
            ],
        );
        let kb = KnowledgeBase::new(default_file_mappings(), rows, BTreeMap::new());

        assert_eq!(kb.row_identifier("expenses", "2025-26"), "Expenditure 25");
        assert_eq!(kb.row_identifier("expenses", "2024-25"), "Total expenses");
        assert_eq!(kb.row_identifier("assets", "2024-25"), "Total assets");
        assert_eq!(kb.row_identifier("goodwill", "2024-25"), "goodwill");
    }

    #[test]
    fn test_handle_swap_keeps_old_snapshot() {
        let handle = KnowledgeHandle::new(KnowledgeBase::builtin());
        let before = handle.snapshot();

        let mut rows = BTreeMap::new();
        rows.insert(
            "grants".to_string(),
            vec![training_row("grants paid", None, None)],
        );
        handle.replace(KnowledgeBase::new(default_file_mappings(), rows, BTreeMap::new()));

        assert!(!before.is_known_entity("grants"));
        assert!(handle.snapshot().is_known_entity("grants"));
    }
}
