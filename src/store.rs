use crate::error::{FinancialQueryError, Result};
use crate::query::{Predicate, Projection, QuerySpec};
use crate::utils::round_to;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::Path;

static NON_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]+").expect("identifier pattern is valid"));
static REPEATED_UNDERSCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_{2,}").expect("underscore pattern is valid"));

/// Tabular backend the engine reads from.
///
/// Column and table names must already be normalized with [`normalize_identifier`]
/// (or an equivalent) before they are exposed here.
pub trait DataStore {
    fn list_tables(&self) -> Vec<String>;

    fn columns(&self, table: &str) -> Option<Vec<String>>;

    fn execute(&self, query: &QuerySpec) -> Result<QueryResult>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

/// Table name to ordered column list, as discovered from a [`DataStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaCatalog {
    pub tables: Vec<TableSchema>,
}

impl SchemaCatalog {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn discover(store: &dyn DataStore) -> Self {
        let tables: Vec<TableSchema> = store
            .list_tables()
            .into_iter()
            .map(|name| {
                let columns = store.columns(&name).unwrap_or_default();
                TableSchema { name, columns }
            })
            .collect();
        debug!("Discovered {} tables", tables.len());
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Turns a raw spreadsheet header into a safe identifier:
/// `"2024-25 Budget $'000"` becomes `2024_25_Budget_Dollar000`.
pub fn normalize_identifier(raw: &str) -> String {
    let replaced: String = raw
        .replace('$', "Dollar")
        .chars()
        .filter(|c| *c != '\'' && *c != '"')
        .collect();
    let underscored = NON_IDENTIFIER.replace_all(replaced.trim(), "_");
    let collapsed = REPEATED_UNDERSCORE.replace_all(&underscored, "_");
    collapsed.trim_matches('_').to_string()
}

pub fn normalize_table_name(raw: &str) -> String {
    normalize_identifier(raw)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Empty fields become `Null`; numbers may carry thousands separators or a `$`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "-" {
            return Self::Null;
        }

        let numeric: String = trimmed.chars().filter(|c| *c != ',' && *c != '$').collect();
        match numeric.parse::<f64>() {
            Ok(n) if n.is_finite() => Self::Number(n),
            _ => Self::Text(trimmed.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.replace(',', "").parse().ok(),
            Self::Null => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Number(n) => Some(n.to_string()),
            Self::Text(s) => Some(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one output column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&CellValue>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(idx)).collect())
    }
}

#[derive(Debug, Clone)]
struct MemoryTable {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl MemoryTable {
    fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(column))
            })
            .ok_or_else(|| {
                FinancialQueryError::ExecutionFailure(format!(
                    "no such column: {} in {}",
                    column, self.name
                ))
            })
    }
}

/// In-memory tables loaded from CSV, executing [`QuerySpec`]s directly.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Vec<MemoryTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads one CSV table. Headers and the table name are normalized; blank
    /// headers become `Unnamed_<index>`. Replaces any table with the same name.
    pub fn load_csv<R: Read>(&mut self, name: &str, reader: R) -> Result<()> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(idx, header)| match normalize_identifier(header) {
                normalized if normalized.is_empty() => format!("Unnamed_{}", idx),
                normalized => normalized,
            })
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let mut row: Vec<CellValue> = record.iter().map(CellValue::parse).collect();
            row.resize(columns.len(), CellValue::Null);
            if row.iter().all(CellValue::is_null) {
                continue;
            }
            rows.push(row);
        }

        let name = normalize_table_name(name);
        info!(
            "Loaded table {} ({} columns, {} rows)",
            name,
            columns.len(),
            rows.len()
        );

        let table = MemoryTable {
            name,
            columns,
            rows,
        };
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
        Ok(())
    }

    /// Loads a CSV file, naming the table after the file stem.
    pub fn load_csv_file(&mut self, path: &Path) -> Result<()> {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let file = fs::File::open(path)?;
        self.load_csv(&name, file)
    }

    /// Loads every `*.csv` file in a directory, in file-name order.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut store = Self::new();
        for path in paths {
            store.load_csv_file(&path)?;
        }
        Ok(store)
    }

    fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .or_else(|| self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name)))
    }
}

impl DataStore for MemoryStore {
    fn list_tables(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    fn columns(&self, table: &str) -> Option<Vec<String>> {
        self.table(table).map(|t| t.columns.clone())
    }

    fn execute(&self, query: &QuerySpec) -> Result<QueryResult> {
        let table = self.table(&query.table).ok_or_else(|| {
            FinancialQueryError::ExecutionFailure(format!("no such table: {}", query.table))
        })?;

        let filters = query
            .predicates
            .iter()
            .map(|p| RowFilter::compile(table, p))
            .collect::<Result<Vec<_>>>()?;
        let outputs = query
            .projection
            .iter()
            .map(|p| Output::compile(table, p))
            .collect::<Result<Vec<_>>>()?;

        let mut columns = Vec::new();
        for (output, projection) in outputs.iter().zip(&query.projection) {
            match output {
                Output::All => columns.extend(table.columns.iter().cloned()),
                _ => columns.push(projection.output_name().unwrap_or_default().to_string()),
            }
        }

        let rows: Vec<Vec<CellValue>> = table
            .rows
            .iter()
            .filter(|row| filters.iter().all(|f| f.accepts(row)))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|row| {
                let mut out = Vec::with_capacity(columns.len());
                for output in &outputs {
                    output.evaluate(row, &mut out);
                }
                out
            })
            .collect();

        debug!("{} -> {} rows", query, rows.len());
        Ok(QueryResult { columns, rows })
    }
}

enum RowFilter {
    ContainsAny(usize, Vec<String>),
    EqualsIgnoreCase(usize, String),
    NotNull(Vec<usize>),
}

impl RowFilter {
    fn compile(table: &MemoryTable, predicate: &Predicate) -> Result<Self> {
        Ok(match predicate {
            Predicate::ContainsAny { column, patterns } => Self::ContainsAny(
                table.column_index(column)?,
                patterns.iter().map(|p| p.to_lowercase()).collect(),
            ),
            Predicate::EqualsIgnoreCase { column, value } => {
                Self::EqualsIgnoreCase(table.column_index(column)?, value.to_uppercase())
            }
            Predicate::NotNull { columns } => Self::NotNull(
                columns
                    .iter()
                    .map(|c| table.column_index(c))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }

    fn accepts(&self, row: &[CellValue]) -> bool {
        match self {
            Self::ContainsAny(idx, patterns) => row[*idx]
                .as_text()
                .map(|text| {
                    let text = text.to_lowercase();
                    patterns.iter().any(|p| text.contains(p.as_str()))
                })
                .unwrap_or(false),
            Self::EqualsIgnoreCase(idx, value) => row[*idx]
                .as_text()
                .map(|text| text.to_uppercase() == *value)
                .unwrap_or(false),
            Self::NotNull(indices) => indices.iter().all(|idx| !row[*idx].is_null()),
        }
    }
}

enum Output {
    All,
    Value(usize),
    Difference(usize, usize),
    PercentChange { base: usize, current: usize },
}

impl Output {
    fn compile(table: &MemoryTable, projection: &Projection) -> Result<Self> {
        Ok(match projection {
            Projection::All => Self::All,
            Projection::Column { column } | Projection::Aliased { column, .. } => {
                Self::Value(table.column_index(column)?)
            }
            Projection::Difference {
                minuend,
                subtrahend,
                ..
            } => Self::Difference(table.column_index(minuend)?, table.column_index(subtrahend)?),
            Projection::PercentChange { base, current, .. } => Self::PercentChange {
                base: table.column_index(base)?,
                current: table.column_index(current)?,
            },
        })
    }

    fn evaluate(&self, row: &[CellValue], out: &mut Vec<CellValue>) {
        match self {
            Self::All => out.extend(row.iter().cloned()),
            Self::Value(idx) => out.push(row[*idx].clone()),
            Self::Difference(minuend, subtrahend) => {
                let value = match (row[*minuend].as_f64(), row[*subtrahend].as_f64()) {
                    (Some(a), Some(b)) => CellValue::Number(a - b),
                    _ => CellValue::Null,
                };
                out.push(value);
            }
            Self::PercentChange { base, current } => {
                let value = match (row[*base].as_f64(), row[*current].as_f64()) {
                    (Some(b), Some(c)) if b != 0.0 => {
                        CellValue::Number(round_to((c - b) * 100.0 / b, 2))
                    }
                    _ => CellValue::Null,
                };
                out.push(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INCOME_CSV: &str = "\
Item,2024-25 Budget $'000,2025-26 Forward Estimate $'000
Revenue from Government,\"1,000\",1100
Own-source revenue,200,0
Employee benefits,500,
Total expenses,900,950
";

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .load_csv("3.1 Income Statement", INCOME_CSV.as_bytes())
            .unwrap();
        store
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(
            normalize_identifier("2024-25 Budget $'000"),
            "2024_25_Budget_Dollar000"
        );
        assert_eq!(normalize_identifier("  Item  "), "Item");
        assert_eq!(normalize_identifier("a -- b"), "a_b");
        assert_eq!(normalize_table_name("3.1 Income Statement"), "3_1_Income_Statement");
    }

    #[test]
    fn test_cell_parsing() {
        assert_eq!(CellValue::parse("1,000"), CellValue::Number(1000.0));
        assert_eq!(CellValue::parse("$25"), CellValue::Number(25.0));
        assert_eq!(CellValue::parse(" "), CellValue::Null);
        assert_eq!(
            CellValue::parse("Total expenses"),
            CellValue::Text("Total expenses".to_string())
        );
    }

    #[test]
    fn test_discover_catalog() {
        let store = store();
        let catalog = SchemaCatalog::discover(&store);
        assert_eq!(catalog.table_names(), vec!["3_1_Income_Statement"]);
        assert_eq!(
            catalog.table("3_1_Income_Statement").unwrap().columns,
            vec![
                "Item",
                "2024_25_Budget_Dollar000",
                "2025_26_Forward_Estimate_Dollar000"
            ]
        );
    }

    #[test]
    fn test_execute_filters_and_limit() {
        let store = store();
        let query = QuerySpec {
            table: "3_1_Income_Statement".to_string(),
            projection: vec![
                Projection::column("Item"),
                Projection::column("2024_25_Budget_Dollar000"),
            ],
            predicates: vec![Predicate::ContainsAny {
                column: "Item".to_string(),
                patterns: vec!["REVENUE".to_string()],
            }],
            limit: Some(1),
        };

        let result = store.execute(&query).unwrap();
        assert_eq!(result.columns, vec!["Item", "2024_25_Budget_Dollar000"]);
        assert_eq!(result.len(), 1);
        assert_eq!(
            result.rows[0],
            vec![
                CellValue::Text("Revenue from Government".to_string()),
                CellValue::Number(1000.0)
            ]
        );
    }

    #[test]
    fn test_execute_comparison_guards_zero_base() {
        let store = store();
        let query = QuerySpec {
            table: "3_1_income_statement".to_string(),
            projection: vec![
                Projection::column("Item"),
                Projection::Difference {
                    minuend: "2024_25_Budget_Dollar000".to_string(),
                    subtrahend: "2025_26_Forward_Estimate_Dollar000".to_string(),
                    alias: "Difference".to_string(),
                },
                Projection::PercentChange {
                    base: "2025_26_Forward_Estimate_Dollar000".to_string(),
                    current: "2024_25_Budget_Dollar000".to_string(),
                    alias: "Percentage_Change".to_string(),
                },
            ],
            predicates: vec![Predicate::NotNull {
                columns: vec![
                    "Item".to_string(),
                    "2025_26_Forward_Estimate_Dollar000".to_string(),
                ],
            }],
            limit: None,
        };

        let result = store.execute(&query).unwrap();
        // Employee benefits has no 2025-26 value.
        assert_eq!(result.len(), 3);
        let pct = result.column_values("Percentage_Change").unwrap();
        assert_eq!(*pct[0], CellValue::Number(-9.09));
        assert_eq!(*pct[1], CellValue::Null);
    }

    #[test]
    fn test_unknown_column_is_execution_failure() {
        let store = store();
        let mut query = QuerySpec::select_all("3_1_Income_Statement");
        query.projection = vec![Projection::column("Nope")];
        assert!(matches!(
            store.execute(&query),
            Err(FinancialQueryError::ExecutionFailure(_))
        ));

        let missing = QuerySpec::select_all("Balance_Sheet");
        assert!(matches!(
            store.execute(&missing),
            Err(FinancialQueryError::ExecutionFailure(_))
        ));
    }
}
