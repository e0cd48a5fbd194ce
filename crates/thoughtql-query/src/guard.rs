//! Pre-parse scan for out-of-scope syntax.
//!
//! Runs on raw text so users get a targeted message ("use two queries")
//! instead of a generic syntax error deep inside the grammar.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ParseResult, QueryError};

/// Block-listed keywords and the hint shown when one is found.
const BLOCKED_KEYWORDS: &[(&str, &str)] = &[
    (
        "OPTIONAL",
        "Use a plain MATCH; unmatched patterns already return an empty list.",
    ),
    (
        "UNION",
        "Run each query separately and combine the results client-side.",
    ),
    (
        "COUNT",
        "Aggregation is not available; RETURN the variable and count the entries.",
    ),
    (
        "COLLECT",
        "Aggregation is not available; RETURN the variable, results are already lists.",
    ),
    (
        "WITH",
        "Multi-part queries are not available; split the query into separate MATCH queries.",
    ),
];

/// `*` directly before `]`, e.g. `-[:CHILD*]->`.
static BARE_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\s*\]").expect("valid regex"));

/// `*N..` without an upper bound, e.g. `-[:CHILD*2..]->`.
static OPEN_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\s*\d*\s*\.\.\s*\]").expect("valid regex"));

const PATH_SUGGESTION: &str =
    "Give an explicit bound such as -[:CHILD*1..3]-> (maximum depth 5).";

/// Reject empty input, block-listed keywords and unbounded path markers.
///
/// Returns the trimmed query text on success.
pub fn check(text: &str) -> ParseResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(QueryError::Empty);
    }

    let code = blank_literals(trimmed);
    let mut previous: Option<String> = None;
    for token in code.split_whitespace() {
        let word = leading_word(token);
        if let Some((keyword, suggestion)) = BLOCKED_KEYWORDS
            .iter()
            .find(|(keyword, _)| word == *keyword)
        {
            let legal_with = *keyword == "WITH"
                && matches!(previous.as_deref(), Some("STARTS") | Some("ENDS"));
            if !legal_with {
                return Err(QueryError::unsupported(*keyword, *suggestion));
            }
        }
        previous = Some(word);
    }

    if BARE_STAR.is_match(&code) {
        return Err(QueryError::unsupported(
            "Unbounded variable-length path (*)",
            PATH_SUGGESTION,
        ));
    }
    if OPEN_RANGE.is_match(&code) {
        return Err(QueryError::unsupported(
            "Open-ended variable-length path (*N..)",
            PATH_SUGGESTION,
        ));
    }

    Ok(trimmed)
}

/// Copy of `text` with quoted strings, backtick labels and `--` comments
/// replaced by spaces, so only query syntax is left to scan.
fn blank_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' | '`' => {
                out.push(' ');
                let mut escaped = false;
                for inner in chars.by_ref() {
                    out.push(if inner == '\n' { '\n' } else { ' ' });
                    if escaped {
                        escaped = false;
                    } else if inner == '\\' && c != '`' {
                        escaped = true;
                    } else if inner == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    out.push(' ');
                    chars.next();
                }
                out.push(' ');
            }
            other => out.push(other),
        }
    }
    out
}

/// Upper-cased leading alphanumeric run of a whitespace token
/// (`count(n)` → `COUNT`, `(n)` → ``).
fn leading_word(token: &str) -> String {
    token
        .chars()
        .skip_while(|c| !c.is_alphanumeric() && *c != '_')
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_ascii_uppercase()
}
