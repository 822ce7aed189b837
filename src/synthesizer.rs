use crate::config::EngineConfig;
use crate::error::{FinancialQueryError, Result};
use crate::knowledge::KnowledgeBase;
use crate::query::{Predicate, Projection, QuerySpec};
use crate::schema::{Action, QueryIntent, StatementType};
use crate::store::{SchemaCatalog, TableSchema};
use crate::utils::{year_column_variants, year_in_column};
use log::debug;

const ITEM_COLUMN_NAMES: [&str; 4] = ["item", "unnamed_0", "description", "account"];
const ENTITY_COLUMN_NAMES: [&str; 4] = ["item", "description", "account", "line_item"];
const FINANCIAL_COLUMN_INDICATORS: [&str; 5] = ["budget", "estimate", "actual", "dollar", "000"];

/// Entity that disables item filtering.
const UNKNOWN_ENTITY: &str = "unknown";

const ENTITY_PATTERNS: &[(&str, &[&str])] = &[
    ("revenue", &["revenue", "income", "earnings"]),
    ("expenses", &["expenses", "costs", "expenditure"]),
    ("operating_expenses", &["operating expenses", "operational costs"]),
    ("assets", &["assets", "total assets"]),
    ("current_assets", &["current assets"]),
    ("liabilities", &["liabilities", "total liabilities"]),
    ("equity", &["equity", "net worth"]),
    ("cash_flow", &["cash flow", "net cash"]),
    ("net_income", &["net income", "profit", "net result"]),
    (
        "employee_benefits",
        &["employee benefits", "employee benefit", "staff benefits"],
    ),
    (
        "cash_and_cash_equivalents",
        &["cash and cash equivalents", "cash equivalents", "cash & cash equivalents"],
    ),
    ("cash", &["cash", "available cash", "liquid assets"]),
];

/// Matches an intent against the normalized table and column names of a [`SchemaCatalog`].
pub struct QuerySynthesizer<'a> {
    knowledge: &'a KnowledgeBase,
    config: &'a EngineConfig,
}

impl<'a> QuerySynthesizer<'a> {
    pub fn new(knowledge: &'a KnowledgeBase, config: &'a EngineConfig) -> Self {
        Self { knowledge, config }
    }

    pub fn synthesize(&self, intent: &QueryIntent, catalog: &SchemaCatalog) -> Result<QuerySpec> {
        if catalog.is_empty() {
            return Err(FinancialQueryError::NoDataAvailable);
        }

        let table = self
            .select_table(&intent.entity, catalog)
            .ok_or_else(|| FinancialQueryError::NoMatchingTable(intent.entity.clone()))?;

        let query = match intent.action {
            Action::Compare if intent.years.len() >= 2 => self
                .comparison_query(intent, table)
                .unwrap_or_else(|| self.basic_query(intent, table)),
            _ => self.basic_query(intent, table),
        };

        debug!("Synthesized for '{}': {}", intent.entity, query);
        Ok(query)
    }

    /// Statement type from the file mapping, or inferred from the entity key.
    pub fn statement_type(&self, entity: &str) -> Option<StatementType> {
        self.knowledge
            .statement_type(entity)
            .or_else(|| infer_statement_type(entity))
    }

    pub fn select_table<'c>(&self, entity: &str, catalog: &'c SchemaCatalog) -> Option<&'c TableSchema> {
        let tables = &catalog.tables;

        if let Some(statement_type) = self.statement_type(entity) {
            let token = statement_type.table_token();

            if statement_type == StatementType::CashFlow {
                let marker = self.config.synthesis.cash_flow_marker.to_lowercase();
                if let Some(table) = tables
                    .iter()
                    .find(|t| name_contains(t, token) && name_contains(t, &marker))
                {
                    return Some(table);
                }
            }

            if let Some(table) = tables.iter().find(|t| name_contains(t, token)) {
                return Some(table);
            }
        }

        let entity = entity.to_lowercase();
        tables
            .iter()
            .find(|t| name_contains(t, &entity))
            .or_else(|| tables.first())
    }

    fn basic_query(&self, intent: &QueryIntent, table: &TableSchema) -> QuerySpec {
        let columns = &table.columns;
        let item = item_column(columns);

        let mut projection = Vec::new();
        match item {
            Some(item) => projection.push(Projection::column(item)),
            None => projection.extend(entity_columns(columns).into_iter().map(Projection::column)),
        }
        projection.extend(
            self.year_columns(intent.years.iter(), columns)
                .into_iter()
                .map(Projection::column),
        );
        if projection.is_empty() {
            projection.push(Projection::All);
        }

        let mut predicates = Vec::new();
        if let Some(item) = item {
            predicates.extend(item_predicate(&intent.entity, item));
        }
        predicates.extend(filter_predicates(intent, columns));

        QuerySpec {
            table: table.name.clone(),
            projection,
            predicates,
            limit: Some(self.config.synthesis.row_limit),
        }
    }

    /// `None` when the table lacks an item column or fewer than two year columns resolve.
    fn comparison_query(&self, intent: &QueryIntent, table: &TableSchema) -> Option<QuerySpec> {
        let columns = &table.columns;
        let item = item_column(columns)?;

        let year_columns = self.year_columns(intent.years.iter().take(2), columns);
        let [first, second, ..] = year_columns.as_slice() else {
            return None;
        };

        let projection = vec![
            Projection::column(item),
            Projection::Aliased {
                column: first.clone(),
                alias: "Year_1".to_string(),
            },
            Projection::Aliased {
                column: second.clone(),
                alias: "Year_2".to_string(),
            },
            Projection::Difference {
                minuend: second.clone(),
                subtrahend: first.clone(),
                alias: "Difference".to_string(),
            },
            Projection::PercentChange {
                base: first.clone(),
                current: second.clone(),
                alias: "Percentage_Change".to_string(),
            },
        ];

        let mut predicates = vec![Predicate::NotNull {
            columns: vec![item.to_string(), first.clone(), second.clone()],
        }];
        predicates.extend(item_predicate(&intent.entity, item));
        predicates.extend(filter_predicates(intent, columns));

        Some(QuerySpec {
            table: table.name.clone(),
            projection,
            predicates,
            limit: None,
        })
    }

    /// Columns spelling any of `years`, in chronological order.
    ///
    /// When no column matches, falls back to columns that carry a digit and a
    /// financial indicator word (budget, estimate, actual, dollar, 000).
    pub fn year_columns<'y>(
        &self,
        years: impl Iterator<Item = &'y String>,
        columns: &[String],
    ) -> Vec<String> {
        let variants: Vec<String> = years.flat_map(|year| year_column_variants(year)).collect();

        let mut matched: Vec<String> = columns
            .iter()
            .filter(|col| {
                let lowered = col.to_lowercase();
                variants.iter().any(|v| lowered.contains(v.as_str()))
            })
            .cloned()
            .collect();

        if matched.is_empty() {
            matched = columns
                .iter()
                .filter(|col| {
                    let lowered = col.to_lowercase();
                    col.chars().any(|c| c.is_ascii_digit())
                        && FINANCIAL_COLUMN_INDICATORS
                            .iter()
                            .any(|w| lowered.contains(w))
                })
                .cloned()
                .collect();
        }

        let default_year = self.config.synthesis.default_sort_year;
        matched.sort_by_key(|col| year_in_column(col).unwrap_or(default_year));
        matched
    }
}

fn name_contains(table: &TableSchema, token: &str) -> bool {
    table.name.to_lowercase().contains(token)
}

/// Best-effort statement type for entities without a file mapping.
pub fn infer_statement_type(entity: &str) -> Option<StatementType> {
    let entity = entity.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| entity.contains(w));

    if entity.contains("cash") && has(&["flow", "activities"]) {
        Some(StatementType::CashFlow)
    } else if has(&["asset", "liabilit", "equity", "cash"]) {
        Some(StatementType::BalanceSheet)
    } else if has(&["revenue", "income", "expense", "benefit"]) {
        Some(StatementType::IncomeStatement)
    } else if entity.contains("balance") {
        Some(StatementType::EquityChanges)
    } else {
        None
    }
}

/// First descriptive column: `item`, `description`, `account` or a spreadsheet `Unnamed_N`.
pub fn item_column(columns: &[String]) -> Option<&str> {
    columns
        .iter()
        .find(|col| {
            let lowered = col.to_lowercase();
            ITEM_COLUMN_NAMES.contains(&lowered.as_str()) || lowered.contains("unnamed")
        })
        .map(String::as_str)
}

fn entity_columns(columns: &[String]) -> Vec<&str> {
    columns
        .iter()
        .filter(|col| ENTITY_COLUMN_NAMES.contains(&col.to_lowercase().as_str()))
        .map(String::as_str)
        .collect()
}

/// Item label substrings that identify `entity`, deduplicated.
pub fn entity_patterns(entity: &str) -> Vec<String> {
    let spaced = entity.replace('_', " ");
    let mut patterns: Vec<String> = ENTITY_PATTERNS
        .iter()
        .find(|(key, _)| *key == entity)
        .map(|(_, patterns)| patterns.iter().map(|p| p.to_string()).collect())
        .unwrap_or_else(|| vec![spaced.clone()]);

    if entity.contains('_') && !patterns.contains(&spaced) {
        patterns.push(spaced);
    }
    patterns
}

fn item_predicate(entity: &str, item_column: &str) -> Option<Predicate> {
    if entity == UNKNOWN_ENTITY {
        return None;
    }

    Some(Predicate::ContainsAny {
        column: item_column.to_string(),
        patterns: entity_patterns(entity),
    })
}

/// Intent filters whose key names a column of the table (case-insensitively).
fn filter_predicates(intent: &QueryIntent, columns: &[String]) -> Vec<Predicate> {
    intent
        .filters
        .iter()
        .filter_map(|(key, value)| {
            columns
                .iter()
                .find(|col| col.eq_ignore_ascii_case(key))
                .map(|col| Predicate::EqualsIgnoreCase {
                    column: col.clone(),
                    value: value.clone(),
                })
        })
        .collect()
}
