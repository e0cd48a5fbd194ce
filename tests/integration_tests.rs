//! End-to-end tests across the ThoughtQL crates
//!
//! Query text → parse → execute against a `MemoryStore` → JSON result.
//!
//! Run with: cargo test --test integration_tests

use serde_json::json;
use tempfile::tempdir;
use thoughtql_query::ir::{Clause, MAX_HOP_DEPTH};
use thoughtql_query::{execute, parse, Action, QueryError, QueryResult};
use thoughtql_store::{MemoryStore, Relation, StoreOp};

const GRAPH: &str = "g";

async fn run(store: &MemoryStore, text: &str) -> QueryResult {
    let query = parse(text).unwrap_or_else(|e| panic!("`{text}` should parse: {e}"));
    execute(store, GRAPH, &query).await
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_simple_match_yields_literal_ir() {
    let q = parse(r#"MATCH (n {name: "X"}) RETURN n"#).unwrap();
    assert_eq!(q.action, Action::Match);
    assert_eq!(q.nodes.len(), 1);
    assert_eq!(q.nodes[0].variable, "n");
    assert_eq!(q.nodes[0].name.as_deref(), Some("X"));
    assert_eq!(q.return_fields.len(), 1);
    assert_eq!(q.return_fields[0].variable, "n");
    assert_eq!(q.return_fields[0].field, None);
}

#[test]
fn test_every_query_shape_parses() {
    let cases = [
        (r#"MATCH (n {name: "A"}) SET n.label = "x" RETURN n"#, Action::Match),
        (r#"CREATE (n {name: "A"})"#, Action::Create),
        (
            r#"MATCH (p {name: "P"}) CREATE (p)-[:CHILD]->(c {name: "C"})"#,
            Action::MatchCreate,
        ),
        (r#"MERGE (n {name: "A"}) ON CREATE SET n.label = "new" RETURN n"#, Action::Merge),
        (
            r#"MATCH (a {name: "A"}) MERGE (a)-[:JUMP]->(b {name: "B"})"#,
            Action::MatchMerge,
        ),
        (r#"MATCH (n {name: "A"}) DETACH DELETE n"#, Action::MatchDelete),
    ];
    for (text, action) in cases {
        let q = parse(text).unwrap_or_else(|e| panic!("`{text}`: {e}"));
        assert_eq!(q.action, action, "{text}");
    }
}

#[test]
fn test_reused_variable_appears_once() {
    let q = parse(r#"MATCH (p {name: "P"}) CREATE (p)-[:CHILD]->(c {name: "C"})"#).unwrap();
    let p: Vec<_> = q.nodes.iter().filter(|n| n.variable == "p").collect();
    assert_eq!(p.len(), 1);
    assert!(p[0].introduced_in.contains(&Clause::Match));
    assert!(p[0].introduced_in.contains(&Clause::Create));
}

#[test]
fn test_hop_bounds() {
    let range = parse(r#"MATCH (a {name: "A"})-[:CHILD*1..3]->(b) RETURN b"#).unwrap();
    assert_eq!(
        (range.relationships[0].min_hops, range.relationships[0].max_hops),
        (1, 3)
    );
    let fixed = parse(r#"MATCH (a {name: "A"})-[:CHILD*3]->(b) RETURN b"#).unwrap();
    assert_eq!(
        (fixed.relationships[0].min_hops, fixed.relationships[0].max_hops),
        (3, 3)
    );
    for bad in ["*0..3", "*1..10"] {
        let text = format!(r#"MATCH (a {{name: "A"}})-[:CHILD{bad}]->(b) RETURN b"#);
        assert!(matches!(parse(&text), Err(QueryError::Validation(_))), "{bad}");
    }
    assert_eq!(MAX_HOP_DEPTH, 5);
}

#[test]
fn test_cross_variable_or_is_rejected_before_execution() {
    let err = parse(
        r#"MATCH (a {name: "A"})-[:CHILD]->(b) WHERE a.name = "A" OR b.name = "B" RETURN a"#,
    )
    .unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));
}

#[test]
fn test_guard_and_syntax_errors() {
    assert_eq!(parse("  "), Err(QueryError::Empty));
    assert!(matches!(
        parse("MATCH (n) RETURN COUNT(n)"),
        Err(QueryError::Unsupported { .. })
    ));
    assert!(matches!(
        parse(r#"MATCH (n) WHERE n.name STARTS WITH "A" RETURN n"#),
        Ok(_)
    ));
    match parse("MATCH (n RETURN n") {
        Err(QueryError::Syntax { line, column, .. }) => {
            assert_eq!(line, 1);
            assert!(column > 1);
        }
        other => panic!("expected a syntax error, got {other:?}"),
    }
}

#[test]
fn test_empty_search_text_is_rejected_before_execution() {
    let err = parse(r#"MATCH (n) WHERE n.name CONTAINS "" RETURN n"#).unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)), "{err:?}");
}

// ============================================================================
// Execution scenarios
// ============================================================================

#[tokio::test]
async fn test_keyword_names_inside_strings_are_queryable() {
    let store = MemoryStore::new();
    store.add_thought("Union", None);
    store.add_thought("Headcount", None);

    let exact = run(&store, r#"MATCH (n {name: "Union"}) RETURN n"#).await;
    assert_eq!(exact.names("n"), vec!["Union"]);

    let contains = run(&store, r#"MATCH (n) WHERE n.name CONTAINS "count" RETURN n"#).await;
    assert_eq!(contains.names("n"), vec!["Headcount"]);

    let created = run(&store, r#"CREATE (n {name: "Optional"})"#).await;
    assert!(created.success, "{:?}", created.errors);
    assert_eq!(store.entities_named("Optional").len(), 1);
}

#[tokio::test]
async fn test_create_standalone_thought() {
    let store = MemoryStore::new();
    let result = run(&store, r#"CREATE (n {name: "New Idea"})"#).await;

    let id = store.entities_named("New Idea")[0].id.clone();
    assert_eq!(
        result.to_json(),
        json!({
            "success": true,
            "action": "create",
            "created": [{"type": "thought", "name": "New Idea", "thoughtId": id}],
        })
    );
}

#[tokio::test]
async fn test_create_child_of_existing_parent() {
    let store = MemoryStore::new();
    let projects = store.add_thought("Projects", None);

    let result = run(
        &store,
        r#"MATCH (p {name: "Projects"}) CREATE (p)-[:CHILD]->(n {name: "New Project"})"#,
    )
    .await;
    assert!(result.success, "{:?}", result.errors);

    let created = store.entities_named("New Project");
    assert_eq!(created.len(), 1);
    let snapshot = store.snapshot();
    assert!(snapshot
        .links
        .iter()
        .any(|l| l.a == projects && l.b == created[0].id && l.relation == Relation::Child));
}

#[tokio::test]
async fn test_create_edge_between_existing_thoughts() {
    let store = MemoryStore::new();
    store.add_thought("Alice", None);
    store.add_thought("Bob", None);

    let result = run(
        &store,
        r#"MATCH (a {name: "Alice"}), (b {name: "Bob"}) CREATE (a)-[:JUMP]->(b)"#,
    )
    .await;
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(store.link_count(), 1);
    assert_eq!(store.entity_count(), 2);
    assert_eq!(store.calls(StoreOp::CreateEntity), 0);
}

#[tokio::test]
async fn test_match_without_hits_is_an_empty_success() {
    let store = MemoryStore::new();
    let result = run(&store, r#"MATCH (n {name: "Nobody"}) RETURN n"#).await;
    assert_eq!(
        result.to_json(),
        json!({"success": true, "action": "match", "results": {"n": []}})
    );
}

#[tokio::test]
async fn test_variable_length_path_with_cycle() {
    let store = MemoryStore::new();
    let root = store.add_thought("Root", None);
    let child = store.add_thought("Child", None);
    let grandchild = store.add_thought("Grandchild", None);
    store.add_link(&root, &child, Relation::Child);
    store.add_link(&child, &grandchild, Relation::Child);
    store.add_link(&grandchild, &root, Relation::Child);

    let result = run(
        &store,
        r#"MATCH (n {name: "Root"})-[:CHILD*1..2]->(m) RETURN m"#,
    )
    .await;
    assert_eq!(result.names("m"), vec!["Child", "Grandchild"]);
}

#[tokio::test]
async fn test_compound_where() {
    let store = MemoryStore::new();
    for name in ["Alice", "Bob", "Carol", "xavier", "xylophone"] {
        store.add_thought(name, None);
    }

    let union = run(
        &store,
        r#"MATCH (n) WHERE n.name = "Alice" OR n.name = "Bob" OR n.name = "Alice" RETURN n"#,
    )
    .await;
    assert_eq!(union.names("n"), vec!["Alice", "Bob"]);

    let minus = run(
        &store,
        r#"MATCH (a) WHERE a.name CONTAINS "x" AND NOT a.name CONTAINS "y" RETURN a"#,
    )
    .await;
    assert_eq!(minus.names("a"), vec!["xavier"]);
}

#[tokio::test]
async fn test_merge_is_idempotent() {
    let store = MemoryStore::new();
    let text = r#"MERGE (n {name: "X"}) ON CREATE SET n.label = "created" ON MATCH SET n.label = "matched" RETURN n"#;

    let first = run(&store, text).await;
    assert_eq!(first.to_json()["created"][0]["outcome"], "created");

    let second = run(&store, text).await;
    assert_eq!(second.to_json()["created"][0]["outcome"], "matched");

    let x = store.entities_named("X");
    assert_eq!(x.len(), 1);
    assert_eq!(x[0].label.as_deref(), Some("matched"));
}

#[tokio::test]
async fn test_set_batch_ceiling() {
    let store = MemoryStore::new();
    let hub = store.add_thought("Hub", None);
    for i in 0..11 {
        let spoke = store.add_thought(&format!("spoke-{i}"), None);
        store.add_link(&hub, &spoke, Relation::Child);
    }

    let result = run(
        &store,
        r#"MATCH (h {name: "Hub"})-[:CHILD]->(s) SET s.label = "bulk""#,
    )
    .await;
    assert!(!result.success);
    assert_eq!(store.calls(StoreOp::UpdateEntity), 0);
}

#[tokio::test]
async fn test_snapshot_round_trip_preserves_query_results() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.json");

    let store = MemoryStore::new();
    let person = store.add_type("Person");
    let team = store.add_thought("Team", None);
    let ada = store.add_thought("Ada", Some(&person));
    store.add_link(&team, &ada, Relation::Child);
    store.save(&path).unwrap();

    let reloaded = MemoryStore::load(&path).unwrap();
    let result = run(
        &reloaded,
        r#"MATCH (t {name: "Team"})-[:CHILD]->(m:Person) RETURN m.name"#,
    )
    .await;
    assert_eq!(result.to_json()["results"], json!({"m": [{"name": "Ada"}]}));
}
