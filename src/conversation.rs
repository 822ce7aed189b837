use crate::schema::{ConversationKind, TimeOfDay};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;

static CONVERSATION_PATTERNS: Lazy<Vec<(ConversationKind, Vec<Regex>)>> = Lazy::new(|| {
    let compile = |pattern: &str| Regex::new(pattern).expect("conversation pattern is valid");
    vec![
        (
            ConversationKind::Greeting,
            vec![compile(
                r"(?i)\b(hi|hello|hey|good morning|good afternoon|good evening)\b",
            )],
        ),
        (
            ConversationKind::Goodbye,
            vec![compile(
                r"(?i)\b(bye|goodbye|see you|thanks|thank you|exit|quit)\b",
            )],
        ),
        (
            ConversationKind::Help,
            vec![compile(
                r"(?i)\b(help|what can you do|how does this work|guide|assist)\b",
            )],
        ),
        (
            ConversationKind::Status,
            vec![compile(r"(?i)\b(status|health|working|available)\b")],
        ),
    ]
});

/// Greeting bodies. The salutation is added separately so a time of day can replace it.
const GREETING_BODIES: [&str; 3] = [
    "I'm your financial data assistant. How may I help you today?",
    "I can help you analyze financial data from your statements. What would you like to know?",
    "I'm here to assist with your financial queries. Feel free to ask about revenue, expenses, assets, or any other financial metrics.",
];

const GOODBYE_RESPONSES: [&str; 3] = [
    "Thank you for using the financial assistant. Have a great day!",
    "Goodbye! Feel free to return anytime for financial data analysis.",
    "See you later! I'm always here to help with your financial questions.",
];

const HELP_RESPONSES: [&str; 2] = [
    "I can help you analyze financial data. Here are some things you can ask:\n• What are the employee benefits for 2024-25?\n• Compare revenue between 2024-25 and 2025-26\n• Show me total expenses for 2025-26\n• What are the assets for fiscal year 2024-25?",
    "I'm your financial data assistant! You can ask me about:\n✓ Revenue and income data\n✓ Expenses and costs\n✓ Assets and liabilities\n✓ Cash flow information\n✓ Year-over-year comparisons\n\nJust ask in natural language and I'll find the data for you!",
];

const STATUS_RESPONSES: [&str; 2] = [
    "I'm running and ready to help! I can answer questions for fiscal years 2023-24 through 2027-28.",
    "All systems operational! I can answer questions about income statements, balance sheets, cash flow and changes in equity.",
];

/// Returns the first conversation kind, in [`ConversationKind::ORDERED`] order, whose pattern matches.
pub fn classify(text: &str) -> Option<ConversationKind> {
    CONVERSATION_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| p.is_match(text)))
        .map(|(kind, _)| *kind)
}

fn salutation(time_of_day: Option<TimeOfDay>) -> &'static str {
    match time_of_day {
        Some(TimeOfDay::Morning) => "Good morning!",
        Some(TimeOfDay::Afternoon) => "Good afternoon!",
        Some(TimeOfDay::Evening) => "Good evening!",
        Some(TimeOfDay::Night) | None => "Hello!",
    }
}

/// Every reply [`respond`] can produce for `kind` under `time_of_day`.
pub fn response_templates(kind: ConversationKind, time_of_day: Option<TimeOfDay>) -> Vec<String> {
    match kind {
        ConversationKind::Greeting => GREETING_BODIES
            .iter()
            .map(|body| format!("{} {}", salutation(time_of_day), body))
            .collect(),
        ConversationKind::Goodbye => GOODBYE_RESPONSES.iter().map(|s| s.to_string()).collect(),
        ConversationKind::Help => HELP_RESPONSES.iter().map(|s| s.to_string()).collect(),
        ConversationKind::Status => STATUS_RESPONSES.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn respond_with<R: Rng + ?Sized>(
    kind: ConversationKind,
    time_of_day: Option<TimeOfDay>,
    rng: &mut R,
) -> String {
    response_templates(kind, time_of_day)
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| {
            "I'm here to help you with financial data analysis. What would you like to know?"
                .to_string()
        })
}

/// Picks one canned reply uniformly at random.
pub fn respond(kind: ConversationKind, time_of_day: Option<TimeOfDay>) -> String {
    respond_with(kind, time_of_day, &mut rand::thread_rng())
}
