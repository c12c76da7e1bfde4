use std::sync::LazyLock;

use regex::Regex;

use crate::{DataError, DataResult};

/// Statement verbs refused on the exploration path.
pub const BLOCKED_KEYWORDS: [&str; 7] = [
    "DROP", "DELETE", "UPDATE", "INSERT", "CREATE", "ALTER", "TRUNCATE",
];

static BLOCKED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", BLOCKED_KEYWORDS.join("|")))
        .expect("blocked keyword pattern is valid")
});

static LIMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\b").expect("limit pattern is valid"));

/// Checks free-form SQL before it is submitted on a read-only session.
///
/// Keywords are matched as whole words, so a column such as `last_updated`
/// passes. When the statement has no `LIMIT` and `limit` is non-zero, a
/// `LIMIT` clause is appended. Returns the statement to submit.
pub fn guard_read_query(sql: &str, limit: Option<u64>) -> DataResult<String> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(DataError::Rejected("query is empty".into()));
    }

    if let Some(found) = BLOCKED_RE.find(trimmed) {
        return Err(DataError::Rejected(format!(
            "query contains dangerous keyword: {}. Only SELECT queries are allowed for data exploration",
            found.as_str().to_ascii_uppercase()
        )));
    }

    match limit {
        Some(limit) if limit > 0 && !LIMIT_RE.is_match(trimmed) => {
            let body = trimmed.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
            Ok(format!("{body} LIMIT {limit}"))
        }
        _ => Ok(trimmed.to_string()),
    }
}
