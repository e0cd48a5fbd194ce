//! ThoughtQL
//!
//! A constrained, Cypher-like query language over a remote thought graph.
//! Text goes through three stages before anything touches the store:
//!
//! ```text
//!  text ── guard ── pest grammar ── transform ──> Query (IR)
//!                                                   │
//!                         GraphStore <── planner ───┘──> QueryResult
//! ```
//!
//! - [`guard`] rejects out-of-scope Cypher (OPTIONAL, UNION, aggregation,
//!   unbounded paths) with a suggestion instead of a syntax error.
//! - [`parser`] holds the pest grammar; [`transform`] turns its parse tree
//!   into the typed IR in [`ir`] and validates it.
//! - The planner resolves nodes name-first, fetches type information only
//!   when a label must be checked, and walks relationships with a bounded
//!   breadth-first search.
//!
//! ```no_run
//! # async fn demo(store: &dyn thoughtql_store::GraphStore) -> Result<(), thoughtql_query::QueryError> {
//! let query = thoughtql_query::parse(r#"MATCH (p {name: "Projects"})-[:CHILD]->(c) RETURN c"#)?;
//! let result = thoughtql_query::execute(store, "graph-1", &query).await;
//! println!("{}", result.to_json());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod guard;
pub mod ir;
pub mod parser;
pub mod result;
pub mod transform;

mod planner;

use thoughtql_store::GraphStore;

pub use config::{ConfigError, ExecutorConfig};
pub use error::{ParseResult, QueryError};
pub use ir::{Action, Query};
pub use result::{MergeOutcome, MutationRecord, QueryResult, ResolvedEntity, ResultRow};

/// Parse and validate query text into the IR.
pub fn parse(text: &str) -> ParseResult<Query> {
    let text = guard::check(text)?;
    let tree = parser::parse_tree(text)?;
    let query = transform::build(tree)?;
    tracing::debug!(action = %query.action, nodes = query.nodes.len(), "parsed query");
    Ok(query)
}

/// Execute `query` against `graph_id` with the default limits.
pub async fn execute(store: &dyn GraphStore, graph_id: &str, query: &Query) -> QueryResult {
    execute_with_config(store, graph_id, query, &ExecutorConfig::default()).await
}

/// Execute `query` with explicit limits. Failures are reported in the
/// result, never returned as `Err`; mutations already applied stay applied.
pub async fn execute_with_config(
    store: &dyn GraphStore,
    graph_id: &str,
    query: &Query,
    config: &ExecutorConfig,
) -> QueryResult {
    planner::Executor::new(store, graph_id, config)
        .run(query)
        .await
}
