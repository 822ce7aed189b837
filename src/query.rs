use crate::utils::{quote_identifier, quote_literal};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Projection {
    All,
    Column {
        column: String,
    },
    Aliased {
        column: String,
        alias: String,
    },
    /// `minuend - subtrahend`
    Difference {
        minuend: String,
        subtrahend: String,
        alias: String,
    },
    /// `(current - base) * 100 / base`, rounded to two decimals; null when `base` is zero.
    PercentChange {
        base: String,
        current: String,
        alias: String,
    },
}

impl Projection {
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column {
            column: name.into(),
        }
    }

    /// Name of the output column, `None` for `*`.
    pub fn output_name(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Column { column } => Some(column.as_str()),
            Self::Aliased { alias, .. }
            | Self::Difference { alias, .. }
            | Self::PercentChange { alias, .. } => Some(alias.as_str()),
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "*"),
            Self::Column { column } => write!(f, "{}", quote_identifier(column)),
            Self::Aliased { column, alias } => {
                write!(f, "{} AS {}", quote_identifier(column), alias)
            }
            Self::Difference {
                minuend,
                subtrahend,
                alias,
            } => write!(
                f,
                "({} - {}) AS {}",
                quote_identifier(minuend),
                quote_identifier(subtrahend),
                alias
            ),
            Self::PercentChange {
                base,
                current,
                alias,
            } => {
                let base = quote_identifier(base);
                write!(
                    f,
                    "ROUND((({} - {}) * 100.0 / NULLIF({}, 0)), 2) AS {}",
                    quote_identifier(current),
                    base,
                    base,
                    alias
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Case-insensitive substring match against any of the patterns.
    ContainsAny {
        column: String,
        patterns: Vec<String>,
    },
    EqualsIgnoreCase {
        column: String,
        value: String,
    },
    NotNull {
        columns: Vec<String>,
    },
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContainsAny { column, patterns } => {
                let column = quote_identifier(column);
                let alternatives: Vec<String> = patterns
                    .iter()
                    .map(|p| {
                        format!(
                            "LOWER({}) LIKE {}",
                            column,
                            quote_literal(&format!("%{}%", p.to_lowercase()))
                        )
                    })
                    .collect();
                write!(f, "({})", alternatives.join(" OR "))
            }
            Self::EqualsIgnoreCase { column, value } => write!(
                f,
                "UPPER({}) = {}",
                quote_identifier(column),
                quote_literal(&value.to_uppercase())
            ),
            Self::NotNull { columns } => {
                let checks: Vec<String> = columns
                    .iter()
                    .map(|c| format!("{} IS NOT NULL", quote_identifier(c)))
                    .collect();
                write!(f, "{}", checks.join(" AND "))
            }
        }
    }
}

/// A synthesized query. `Display` renders ANSI SQL with double-quoted identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QuerySpec {
    #[schemars(description = "Table the query reads from")]
    pub table: String,

    #[schemars(description = "Selected columns and computed values, in output order")]
    pub projection: Vec<Projection>,

    #[schemars(description = "Row filters, all of which must hold")]
    #[serde(default)]
    pub predicates: Vec<Predicate>,

    #[schemars(description = "Maximum number of rows, unlimited when absent")]
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QuerySpec {
    pub fn select_all(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            projection: vec![Projection::All],
            predicates: Vec::new(),
            limit: None,
        }
    }

    /// True when the query computes a period-over-period delta.
    pub fn is_comparison(&self) -> bool {
        self.projection
            .iter()
            .any(|p| matches!(p, Projection::Difference { .. } | Projection::PercentChange { .. }))
    }

    pub fn to_sql(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let projection: Vec<String> = if self.projection.is_empty() {
            vec![Projection::All.to_string()]
        } else {
            self.projection.iter().map(|p| p.to_string()).collect()
        };

        write!(
            f,
            "SELECT {} FROM {}",
            projection.join(", "),
            quote_identifier(&self.table)
        )?;

        if !self.predicates.is_empty() {
            let predicates: Vec<String> = self.predicates.iter().map(|p| p.to_string()).collect();
            write!(f, " WHERE {}", predicates.join(" AND "))?;
        }

        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }

        Ok(())
    }
}
