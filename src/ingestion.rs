use crate::error::{FinancialQueryError, Result};
use crate::knowledge::{FileMappingEntry, RowMappingEntry};
use crate::schema::StatementType;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;
use std::path::Path;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("word pattern is valid"));

const STOP_WORDS: [&str; 12] = [
    "the", "is", "are", "for", "of", "in", "to", "and", "or", "what", "show", "me",
];

#[derive(Debug, Deserialize)]
struct FileMappingRecord {
    metric: String,
    file_name: String,
    statement_type: String,
}

/// Meaningful words of a training question: lower-cased, no stop words, longer than two characters.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD.find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|word| word.chars().count() > 2 && !STOP_WORDS.contains(word))
        .map(str::to_string)
        .collect()
}

/// Reads a `metric,file_name,statement_type` CSV.
pub fn parse_file_mappings<R: Read>(reader: R) -> Result<BTreeMap<String, FileMappingEntry>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut mappings = BTreeMap::new();

    for (idx, record) in csv_reader.deserialize::<FileMappingRecord>().enumerate() {
        let record = record?;
        let metric = record.metric.to_lowercase();
        if metric.is_empty() || record.file_name.is_empty() {
            continue;
        }

        let statement_type = match record.statement_type.parse::<StatementType>() {
            Ok(statement_type) => statement_type,
            Err(e) => {
                warn!("Skipping file mapping row {} ({}): {}", idx + 1, metric, e);
                continue;
            }
        };

        mappings.insert(
            metric,
            FileMappingEntry {
                file_name: record.file_name,
                statement_type,
            },
        );
    }

    Ok(mappings)
}

/// Parses `question|entity|year-or-all[|row label]` lines, preserving line order per entity.
pub fn parse_training_rows(text: &str) -> BTreeMap<String, Vec<RowMappingEntry>> {
    let mut rows: BTreeMap<String, Vec<RowMappingEntry>> = BTreeMap::new();

    for line in text.lines().map(str::trim) {
        if !line.contains('|') {
            continue;
        }

        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() < 3 {
            debug!("Ignoring short training line: {}", line);
            continue;
        }

        let question = parts[0].to_lowercase();
        let entity = parts[1].to_lowercase();
        if entity.is_empty() {
            continue;
        }

        let fiscal_year = match parts[2] {
            "all" | "" => None,
            year => Some(year.to_string()),
        };
        let row_identifier = parts
            .get(3)
            .filter(|label| !label.is_empty())
            .map(|label| label.to_string());

        rows.entry(entity).or_default().push(RowMappingEntry {
            keywords: extract_keywords(&question),
            question,
            fiscal_year,
            row_identifier,
        });
    }

    rows
}

/// Parses comma-separated synonym groups; the first term of each line is canonical.
pub fn parse_column_synonyms(text: &str) -> BTreeMap<String, BTreeSet<String>> {
    let mut synonyms = BTreeMap::new();

    for line in text.lines().map(str::trim) {
        if !line.contains(',') {
            continue;
        }

        let terms: Vec<String> = line
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        if let Some(canonical) = terms.first() {
            synonyms.insert(canonical.clone(), terms.iter().cloned().collect());
        }
    }

    synonyms
}

pub fn load_file_mappings(path: &Path) -> Result<BTreeMap<String, FileMappingEntry>> {
    let file = fs::File::open(path)?;
    parse_file_mappings(file).map_err(|e| FinancialQueryError::KnowledgeArtifact {
        path: path.display().to_string(),
        details: e.to_string(),
    })
}

pub fn load_training_rows(path: &Path) -> Result<BTreeMap<String, Vec<RowMappingEntry>>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_training_rows(&text))
}

pub fn load_column_synonyms(path: &Path) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_column_synonyms(&text))
}
