use chrono::{Local, Timelike};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[schemars(description = "Look up a value for one or more periods")]
    Get,

    #[schemars(description = "Compare a metric between two periods")]
    Compare,

    #[schemars(description = "Aggregate or compute over values")]
    Calculate,

    #[schemars(description = "List matching line items")]
    List,

    #[schemars(description = "Small talk handled without touching the data store")]
    Conversation,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Compare => "compare",
            Self::Calculate => "calculate",
            Self::List => "list",
            Self::Conversation => "conversation",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Greeting,
    Goodbye,
    Help,
    Status,
}

impl ConversationKind {
    /// Classification order: the first kind whose patterns match wins.
    pub const ORDERED: [ConversationKind; 4] = [
        ConversationKind::Greeting,
        ConversationKind::Goodbye,
        ConversationKind::Help,
        ConversationKind::Status,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Goodbye => "goodbye",
            Self::Help => "help",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    #[schemars(description = "Revenue, expenses and net result for a period")]
    IncomeStatement,

    #[schemars(description = "Assets, liabilities and equity at period end")]
    BalanceSheet,

    #[schemars(description = "Operating, investing and financing cash movements")]
    CashFlow,

    #[schemars(description = "Opening to closing movements in equity")]
    EquityChanges,
}

impl StatementType {
    /// Substring expected in the name of a table holding this statement.
    pub fn table_token(&self) -> &'static str {
        match self {
            Self::IncomeStatement => "income",
            Self::BalanceSheet => "balance",
            Self::CashFlow => "cash",
            Self::EquityChanges => "equity",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IncomeStatement => "income_statement",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
            Self::EquityChanges => "equity_changes",
        }
    }
}

impl FromStr for StatementType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income_statement" => Ok(Self::IncomeStatement),
            "balance_sheet" => Ok(Self::BalanceSheet),
            "cash_flow" | "cashflow_statement" => Ok(Self::CashFlow),
            "equity_changes" => Ok(Self::EquityChanges),
            other => Err(format!("unknown statement type '{}'", other)),
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=21 => Self::Evening,
            _ => Self::Night,
        }
    }

    pub fn now() -> Self {
        Self::from_hour(Local::now().hour())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    VeryLow,
    Low,
    Medium,
    High,
}

/// The resolved meaning of one question. Created per request, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryIntent {
    #[schemars(description = "What to do with the metric")]
    pub action: Action,

    #[schemars(
        description = "Metric key such as 'revenue' or 'employee_benefits'; for conversation, the conversation kind. Never empty, may be a fallback."
    )]
    pub entity: String,

    #[schemars(description = "Normalized fiscal years such as '2024-25', deduplicated")]
    pub years: BTreeSet<String>,

    #[schemars(description = "Auxiliary constraints such as agency code")]
    pub filters: BTreeMap<String, String>,

    #[schemars(description = "Heuristic certainty between 0.0 and 1.0")]
    pub confidence: f64,
}

impl QueryIntent {
    pub fn conversation(kind: ConversationKind) -> Self {
        Self {
            action: Action::Conversation,
            entity: kind.as_str().to_string(),
            years: BTreeSet::new(),
            filters: BTreeMap::new(),
            confidence: 1.0,
        }
    }

    pub fn is_conversation(&self) -> bool {
        self.action == Action::Conversation
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(QueryIntent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_of_day_buckets() {
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(11), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(22), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(3), TimeOfDay::Night);
    }

    #[test]
    fn test_statement_type_parsing() {
        assert_eq!(
            "Balance_Sheet".parse::<StatementType>().unwrap(),
            StatementType::BalanceSheet
        );
        assert_eq!(
            "cash_flow".parse::<StatementType>().unwrap().table_token(),
            "cash"
        );
        assert!("ledger".parse::<StatementType>().is_err());
    }

    #[test]
    fn test_intent_serialization() {
        let intent = QueryIntent::conversation(ConversationKind::Help);
        let json = serde_json::to_string(&intent).unwrap();
        assert!(json.contains("\"action\":\"conversation\""));
        assert!(json.contains("\"entity\":\"help\""));

        let schema = serde_json::to_string(&QueryIntent::generate_json_schema()).unwrap();
        assert!(schema.contains("confidence"));
    }
}
