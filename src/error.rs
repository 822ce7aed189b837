use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinancialQueryError {
    #[error("No supported fiscal year found in question")]
    NoSupportedYear,

    #[error("Could not identify a financial metric (fell back to '{entity}')")]
    UnknownEntity { entity: String },

    #[error("No data available: the schema catalog is empty")]
    NoDataAvailable,

    #[error("Table not found: {0}")]
    NoMatchingTable(String),

    #[error("Query execution failed: {0}")]
    ExecutionFailure(String),

    #[error("Query against '{table}' returned no rows")]
    EmptyResult { table: String },

    #[error("Invalid question: {0}")]
    InvalidInput(String),

    #[error("Knowledge artifact {path} could not be used: {details}")]
    KnowledgeArtifact { path: String, details: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FinancialQueryError>;

/// User-facing rendering of a failure: a message plus a few phrasings to try instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    pub message: String,
    pub suggestions: Vec<String>,
}

const POPULAR_QUESTIONS: [&str; 3] = [
    "What is the revenue for 2024-25?",
    "Show me operating expenses for 2025-26",
    "Compare revenue between 2024-25 and 2025-26",
];

impl FinancialQueryError {
    /// Maps the error onto the message shown to the person asking.
    ///
    /// `supported_years` is only used to list the available periods when the
    /// question named none (or an unsupported one).
    pub fn guidance(&self, supported_years: &[String]) -> Guidance {
        let popular = || POPULAR_QUESTIONS.iter().map(|q| q.to_string()).collect();

        match self {
            Self::NoSupportedYear => Guidance {
                message: format!(
                    "The year you specified is not available in our dataset. Available years: {}.",
                    supported_years.join(", ")
                ),
                suggestions: supported_years
                    .iter()
                    .take(3)
                    .map(|year| format!("What is the revenue for {}?", year))
                    .collect(),
            },
            Self::UnknownEntity { .. } => Guidance {
                message: "I couldn't tell which financial metric you meant. Try naming it directly."
                    .to_string(),
                suggestions: vec![
                    "What are the employee benefits for 2024-25?".to_string(),
                    "Show me total expenses for 2025-26".to_string(),
                    "What are the assets in 2024-25?".to_string(),
                ],
            },
            Self::NoDataAvailable | Self::NoMatchingTable(_) => Guidance {
                message: "No financial statements are loaded yet. Please ensure the data files are available."
                    .to_string(),
                suggestions: popular(),
            },
            Self::EmptyResult { .. } => Guidance {
                message: "I couldn't find any data matching your request. Please try a different question."
                    .to_string(),
                suggestions: popular(),
            },
            Self::InvalidInput(reason) => Guidance {
                message: format!("Your query format is invalid: {}.", reason),
                suggestions: popular(),
            },
            Self::ExecutionFailure(_) | Self::Csv(_) => Guidance {
                message: "I couldn't process your query. Please try rephrasing your question."
                    .to_string(),
                suggestions: popular(),
            },
            Self::KnowledgeArtifact { .. } | Self::SerializationError(_) | Self::IoError(_) => {
                Guidance {
                    message: "There was an issue processing your request. Please try again."
                        .to_string(),
                    suggestions: popular(),
                }
            }
        }
    }
}
