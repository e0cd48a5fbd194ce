/// Where to point users when a query does not parse.
pub const SYNTAX_HELP: &str = "See the ThoughtQL syntax reference: MATCH/CREATE/MERGE patterns such as \
`MATCH (n {name: \"X\"}) RETURN n`, `MATCH (p {name: \"P\"}) CREATE (p)-[:CHILD]->(c {name: \"C\"})`, \
`MERGE (n:Type {name: \"X\"}) ON CREATE SET n.label = \"new\" RETURN n`";

/// Errors raised before execution: empty input, out-of-scope syntax,
/// malformed text, or a semantically invalid query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Empty query")]
    Empty,

    #[error("{feature} is not supported. {suggestion}")]
    Unsupported {
        feature: String,
        suggestion: String,
    },

    #[error("Syntax error at line {line}, column {column}: {message}. {SYNTAX_HELP}")]
    Syntax {
        line: usize,
        column: usize,
        offset: usize,
        message: String,
    },

    #[error("{0}")]
    Validation(String),
}

impl QueryError {
    pub fn unsupported(feature: impl Into<String>, suggestion: impl Into<String>) -> Self {
        QueryError::Unsupported {
            feature: feature.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        QueryError::Validation(message.into())
    }
}

pub type ParseResult<T> = Result<T, QueryError>;
