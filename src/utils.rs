use once_cell::sync::Lazy;
use regex::Regex;

static YEAR_IN_COLUMN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"20(\d{2})").expect("column year pattern is valid"));

/// Normalizes a raw period match ("FY 2024", "2024/25", "fiscal year 2024-25")
/// to the `YYYY-YY` form. Returns `None` when nothing period-like remains.
pub fn normalize_fiscal_year(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '/')
        .map(|c| if c == '/' { '-' } else { c })
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    if !cleaned.contains('-') && cleaned.len() == 4 {
        let year: u32 = cleaned.parse().ok()?;
        return Some(format!("{}-{:02}", year, (year + 1) % 100));
    }

    Some(cleaned)
}

/// Spellings under which a fiscal year may appear inside a normalized column name.
pub fn year_column_variants(year: &str) -> Vec<String> {
    let start: String = year.chars().take(4).collect();
    let end: String = {
        let chars: Vec<char> = year.chars().collect();
        chars[chars.len().saturating_sub(2)..].iter().collect()
    };

    vec![
        year.replace('-', "_"),
        year.replace('-', ""),
        start.clone(),
        end,
        format!("fy_{}", start),
        format!("budget_{}", start),
    ]
}

/// First `20YY` year embedded in a column name.
pub fn year_in_column(column: &str) -> Option<u32> {
    YEAR_IN_COLUMN
        .captures(column)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|yy| 2000 + yy)
}

pub fn needs_quoting(identifier: &str) -> bool {
    identifier
        .chars()
        .next()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false)
        || identifier
            .chars()
            .any(|c| matches!(c, '-' | ' ' | ':' | '.' | '$'))
}

pub fn quote_identifier(identifier: &str) -> String {
    if identifier == "*" || !needs_quoting(identifier) {
        identifier.to_string()
    } else {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Rounds half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
