use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A literal term that, when present in a question, adds `key = value` to the intent filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterTerm {
    pub term: String,
    pub key: String,
    pub value: String,
}

/// Where the knowledge artifacts live. Missing files fall back to built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeSources {
    pub data_dir: Option<PathBuf>,
    pub file_mapping: String,
    pub training_rows: String,
    pub column_synonyms: String,
}

impl Default for KnowledgeSources {
    fn default() -> Self {
        Self {
            data_dir: None,
            file_mapping: "data_file_mapping.csv".to_string(),
            training_rows: "budget-chatbot-training-row.txt".to_string(),
            column_synonyms: "budget-chatbot-training-Column.txt".to_string(),
        }
    }
}

impl KnowledgeSources {
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(file_name))
    }

    pub fn file_mapping_path(&self) -> Option<PathBuf> {
        self.resolve(&self.file_mapping)
    }

    pub fn training_rows_path(&self) -> Option<PathBuf> {
        self.resolve(&self.training_rows)
    }

    pub fn column_synonyms_path(&self) -> Option<PathBuf> {
        self.resolve(&self.column_synonyms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Row cap for single-period queries. Comparison queries are not capped.
    pub row_limit: usize,
    /// Token preferred in the table name when several cash-flow tables exist.
    pub cash_flow_marker: String,
    /// Sort key for year columns whose name carries no parsable year.
    pub default_sort_year: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            row_limit: 10,
            cash_flow_marker: "dfsv".to_string(),
            default_sort_year: 2024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceThresholds {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 0.8,
            medium: 0.6,
            low: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowUpConfig {
    pub subject: String,
    pub default_period: String,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            subject: "cash and cash equivalents".to_string(),
            default_period: "2024-25".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrictnessConfig {
    pub require_fiscal_year: bool,
    pub require_known_entity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub supported_years: Vec<String>,
    pub default_entity: String,
    pub filter_terms: Vec<FilterTerm>,
    pub knowledge: KnowledgeSources,
    pub synthesis: SynthesisConfig,
    pub confidence: ConfidenceThresholds,
    pub follow_up: FollowUpConfig,
    pub strict: StrictnessConfig,
    pub max_question_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut filter_terms: Vec<FilterTerm> = ["dss", "ndia", "ndis", "saus", "afis", "dfsv"]
            .iter()
            .map(|code| FilterTerm {
                term: code.to_string(),
                key: "agency".to_string(),
                value: code.to_uppercase(),
            })
            .collect();
        filter_terms.push(FilterTerm {
            term: "social services".to_string(),
            key: "department".to_string(),
            value: "Social Services".to_string(),
        });

        Self {
            supported_years: ["2023-24", "2024-25", "2025-26", "2026-27", "2027-28"]
                .iter()
                .map(|y| y.to_string())
                .collect(),
            default_entity: "revenue".to_string(),
            filter_terms,
            knowledge: KnowledgeSources::default(),
            synthesis: SynthesisConfig::default(),
            confidence: ConfidenceThresholds::default(),
            follow_up: FollowUpConfig::default(),
            strict: StrictnessConfig::default(),
            max_question_length: 500,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn is_supported_year(&self, year: &str) -> bool {
        self.supported_years.iter().any(|y| y == year)
    }
}
