use thoughtql_query::{
    execute, execute_with_config, parse, ExecutorConfig, MergeOutcome, MutationRecord,
    QueryResult, ResultRow,
};
use thoughtql_store::{MemoryStore, Relation, StoreOp};

const GRAPH: &str = "graph-1";

/// ```text
/// Projects ─CHILD─> Alpha (Project) ─CHILD─> Alpha Design (Project)
///          ├CHILD─> Beta (Project)   └JUMP──> Alice (Person)
///          └CHILD─> Gamma Notes
/// ```
struct Fixture {
    store: MemoryStore,
    project: String,
    alpha: String,
}

fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let project = store.add_type("Project");
    let person = store.add_type("Person");

    let root = store.add_thought("Projects", None);
    let alpha = store.add_thought("Alpha", Some(&project));
    let beta = store.add_thought("Beta", Some(&project));
    let gamma = store.add_thought("Gamma Notes", None);
    let design = store.add_thought("Alpha Design", Some(&project));
    let alice = store.add_thought("Alice", Some(&person));

    store.add_link(&root, &alpha, Relation::Child);
    store.add_link(&root, &beta, Relation::Child);
    store.add_link(&root, &gamma, Relation::Child);
    store.add_link(&alpha, &design, Relation::Child);
    store.add_link(&alpha, &alice, Relation::Jump);

    Fixture {
        store,
        project,
        alpha,
    }
}

async fn run(store: &MemoryStore, text: &str) -> QueryResult {
    let query = parse(text).unwrap_or_else(|e| panic!("`{text}` should parse: {e}"));
    execute(store, GRAPH, &query).await
}

fn sorted(mut names: Vec<&str>) -> Vec<&str> {
    names.sort_unstable();
    names
}

// ============================================================================
// Resolution
// ============================================================================

#[tokio::test]
async fn exact_name_skips_search_and_type_catalog() {
    let f = fixture();
    let result = run(&f.store, r#"MATCH (n {name: "Alpha"}) RETURN n"#).await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.names("n"), vec!["Alpha"]);
    assert_eq!(f.store.calls(StoreOp::FindExactByName), 1);
    assert_eq!(f.store.calls(StoreOp::Search), 0);
    assert_eq!(f.store.calls(StoreOp::GetTypes), 0);
}

#[tokio::test]
async fn type_catalog_is_not_fetched_without_candidates() {
    let f = fixture();
    let result = run(&f.store, r#"MATCH (n:Project {name: "Nope"}) RETURN n"#).await;

    assert!(result.success);
    assert!(result.names("n").is_empty());
    assert_eq!(f.store.calls(StoreOp::GetTypes), 0);
}

#[tokio::test]
async fn labelled_name_lookup_checks_the_type() {
    let f = fixture();
    let hit = run(&f.store, r#"MATCH (n:Project {name: "Alpha"}) RETURN n"#).await;
    assert_eq!(hit.names("n"), vec!["Alpha"]);

    let miss = run(&f.store, r#"MATCH (n:Person {name: "Alpha"}) RETURN n"#).await;
    assert!(miss.success);
    assert!(miss.names("n").is_empty());
}

#[tokio::test]
async fn unknown_label_warns_and_matches_nothing() {
    let f = fixture();
    let result = run(&f.store, r#"MATCH (n:Planet {name: "Alpha"}) RETURN n"#).await;

    assert!(result.success);
    assert!(result.names("n").is_empty());
    assert!(result.warnings.iter().any(|w| w.contains("Planet")));
}

#[tokio::test]
async fn label_only_pattern_matches_the_type_node() {
    let f = fixture();
    let result = run(&f.store, "MATCH (t:Project) RETURN t").await;

    assert!(result.success);
    assert_eq!(result.rows("t").len(), 1);
    assert_eq!(result.rows("t")[0].id(), Some(f.project.as_str()));
}

#[tokio::test]
async fn contains_uses_search_then_filters_case_insensitively() {
    let f = fixture();
    let result = run(&f.store, r#"MATCH (n) WHERE n.name CONTAINS "alpha" RETURN n"#).await;

    assert!(result.success);
    assert_eq!(sorted(result.names("n")), vec!["Alpha", "Alpha Design"]);
    assert_eq!(f.store.calls(StoreOp::Search), 1);
}

#[tokio::test]
async fn similarity_prefers_an_exact_hit() {
    let f = fixture();
    let exact = run(&f.store, r#"MATCH (n) WHERE n.name =~ "Beta" RETURN n"#).await;
    assert_eq!(exact.names("n"), vec!["Beta"]);
    assert_eq!(f.store.calls(StoreOp::Search), 0);

    let fuzzy = run(&f.store, r#"MATCH (n) WHERE n.name =~ "alp" RETURN n"#).await;
    assert_eq!(fuzzy.names("n").first(), Some(&"Alpha"));
    assert_eq!(fuzzy.names("n").len(), 2);
}

// ============================================================================
// Compound WHERE
// ============================================================================

#[tokio::test]
async fn or_unions_branches() {
    let f = fixture();
    let result = run(
        &f.store,
        r#"MATCH (n) WHERE n.name = "Alpha" OR n.name = "Beta" RETURN n"#,
    )
    .await;
    assert_eq!(result.names("n"), vec!["Alpha", "Beta"]);
}

#[tokio::test]
async fn xor_keeps_entities_in_exactly_one_branch() {
    let f = fixture();
    let result = run(
        &f.store,
        r#"MATCH (n) WHERE n.name CONTAINS "Alpha" XOR n.name STARTS WITH "Alpha D" RETURN n"#,
    )
    .await;
    assert_eq!(result.names("n"), vec!["Alpha"]);
}

#[tokio::test]
async fn and_not_subtracts() {
    let f = fixture();
    let result = run(
        &f.store,
        r#"MATCH (n) WHERE n.name CONTAINS "Alpha" AND NOT n.name = "Alpha Design" RETURN n"#,
    )
    .await;
    assert_eq!(result.names("n"), vec!["Alpha"]);
}

#[tokio::test]
async fn negation_alone_is_rejected() {
    let f = fixture();
    let result = run(&f.store, r#"MATCH (n) WHERE NOT n.name = "Alpha" RETURN n"#).await;

    assert!(!result.success);
    assert!(result.results.is_none());
    assert!(result.errors[0].contains("positive condition"));
    assert_eq!(f.store.total_calls(), 0);
}

#[tokio::test]
async fn is_null_filters_traversal_results() {
    let f = fixture();
    let result = run(
        &f.store,
        r#"MATCH (p {name: "Projects"})-[:CHILD]->(c) WHERE c.typeId IS NULL RETURN c"#,
    )
    .await;
    assert_eq!(result.names("c"), vec!["Gamma Notes"]);
}

// ============================================================================
// Traversal
// ============================================================================

#[tokio::test]
async fn single_hop_keeps_discovery_order() {
    let f = fixture();
    let result = run(
        &f.store,
        r#"MATCH (p {name: "Projects"})-[:CHILD]->(c) RETURN c"#,
    )
    .await;
    assert_eq!(result.names("c"), vec!["Alpha", "Beta", "Gamma Notes"]);
}

#[tokio::test]
async fn traversal_target_label_is_filtered_lazily() {
    let f = fixture();
    let result = run(
        &f.store,
        r#"MATCH (p {name: "Projects"})-[:CHILD]->(c:Project) RETURN c"#,
    )
    .await;

    assert_eq!(result.names("c"), vec!["Alpha", "Beta"]);
    assert_eq!(f.store.calls(StoreOp::GetTypes), 1);
    // Only the untyped neighbour needs its detail fetched.
    assert_eq!(f.store.calls(StoreOp::GetEntity), 1);
}

#[tokio::test]
async fn resolved_target_is_walked_backwards() {
    let f = fixture();
    let result = run(
        &f.store,
        r#"MATCH (p)-[:CHILD]->(c {name: "Alpha"}) RETURN p"#,
    )
    .await;
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.names("p"), vec!["Projects"]);
}

#[tokio::test]
async fn left_arrow_reverses_direction() {
    let f = fixture();
    let result = run(
        &f.store,
        r#"MATCH (c {name: "Alpha"})<-[:CHILD]-(p) RETURN p"#,
    )
    .await;
    assert_eq!(result.names("p"), vec!["Projects"]);
}

#[tokio::test]
async fn variable_length_path_terminates_on_cycles() {
    let store = MemoryStore::new();
    let a = store.add_thought("A", None);
    let b = store.add_thought("B", None);
    let c = store.add_thought("C", None);
    store.add_link(&a, &b, Relation::Child);
    store.add_link(&b, &c, Relation::Child);
    store.add_link(&c, &a, Relation::Child);

    let all = run(&store, r#"MATCH (a {name: "A"})-[:CHILD*1..5]->(x) RETURN x"#).await;
    assert_eq!(all.names("x"), vec!["B", "C"]);

    let deep = run(&store, r#"MATCH (a {name: "A"})-[:CHILD*2..3]->(x) RETURN x"#).await;
    assert_eq!(deep.names("x"), vec!["C"]);
}

#[tokio::test]
async fn variable_length_path_skips_failing_nodes() {
    let store = MemoryStore::new();
    let r = store.add_thought("R", None);
    let x = store.add_thought("X", None);
    let y = store.add_thought("Y", None);
    let z = store.add_thought("Z", None);
    let w = store.add_thought("W", None);
    store.add_link(&r, &x, Relation::Child);
    store.add_link(&x, &y, Relation::Child);
    store.add_link(&r, &z, Relation::Child);
    store.add_link(&z, &w, Relation::Child);
    store.fail_adjacency_for(&x);

    let result = run(&store, r#"MATCH (r {name: "R"})-[:CHILD*1..3]->(n) RETURN n"#).await;
    assert!(result.success);
    assert_eq!(result.names("n"), vec!["X", "Z", "W"]);
}

#[tokio::test]
async fn single_hop_remote_failure_fails_the_query() {
    let f = fixture();
    f.store.fail_adjacency_for(&f.alpha);
    let result = run(&f.store, r#"MATCH (a {name: "Alpha"})-[:CHILD]->(c) RETURN c"#).await;

    assert!(!result.success);
    assert!(result.errors[0].contains("unavailable"));
}

#[tokio::test]
async fn empty_graph_id_is_reported() {
    let f = fixture();
    let query = parse(r#"MATCH (n {name: "Alpha"}) RETURN n"#).unwrap();
    let result = execute(&f.store, "", &query).await;
    assert!(!result.success);
    assert!(!result.errors.is_empty());
}

// ============================================================================
// Projection
// ============================================================================

#[tokio::test]
async fn property_projection_returns_fields() {
    let f = fixture();
    let result = run(&f.store, r#"MATCH (n {name: "Alpha"}) RETURN n.name, n.id"#).await;

    match &result.rows("n")[0] {
        ResultRow::Fields(fields) => {
            assert_eq!(fields["name"], "Alpha");
            assert_eq!(fields["id"], f.alpha);
        }
        other => panic!("expected projected fields, got {other:?}"),
    }
}

#[tokio::test]
async fn bare_variable_wins_over_projection() {
    let f = fixture();
    let result = run(&f.store, r#"MATCH (n {name: "Alpha"}) RETURN n.name, n"#).await;
    assert!(matches!(result.rows("n")[0], ResultRow::Entity(_)));
}

#[tokio::test]
async fn without_return_every_named_variable_is_reported() {
    let f = fixture();
    let result = run(&f.store, r#"MATCH (p {name: "Projects"})-[:CHILD]->(c)"#).await;
    let results = result.results.as_ref().unwrap();
    assert!(results.contains_key("p"));
    assert!(results.contains_key("c"));
}

// ============================================================================
// CREATE
// ============================================================================

#[tokio::test]
async fn create_child_under_matched_parent() {
    let f = fixture();
    let result = run(
        &f.store,
        r#"MATCH (p {name: "Projects"}) CREATE (p)-[:CHILD]->(c:Project {name: "Delta"}) RETURN c"#,
    )
    .await;

    assert!(result.success, "{:?}", result.errors);
    let delta = f.store.entities_named("Delta");
    assert_eq!(delta.len(), 1);
    assert_eq!(delta[0].type_id.as_deref(), Some(f.project.as_str()));
    assert_eq!(result.names("c"), vec!["Delta"]);
    assert!(matches!(
        &result.created[0],
        MutationRecord::Thought { source_id: Some(_), .. }
    ));
    assert!(matches!(
        &result.created[1],
        MutationRecord::Link { relation: Relation::Child, .. }
    ));
}

#[tokio::test]
async fn create_link_between_matched_nodes() {
    let f = fixture();
    let links = f.store.link_count();
    let result = run(
        &f.store,
        r#"MATCH (a {name: "Beta"}), (b {name: "Alice"}) CREATE (a)-[:JUMP]->(b)"#,
    )
    .await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(f.store.link_count(), links + 1);
    assert_eq!(f.store.calls(StoreOp::CreateEntity), 0);
}

#[tokio::test]
async fn standalone_create_returns_no_results() {
    let f = fixture();
    let result = run(&f.store, r#"CREATE (n:Project {name: "Solo"})"#).await;

    assert!(result.success);
    assert!(result.results.is_none());
    assert_eq!(f.store.entities_named("Solo").len(), 1);
    assert_eq!(result.created.len(), 1);
}

#[tokio::test]
async fn create_with_unknown_type_fails() {
    let f = fixture();
    let result = run(&f.store, r#"CREATE (n:Planet {name: "Mars"})"#).await;

    assert!(!result.success);
    assert!(result.errors[0].contains("Planet"));
    assert!(f.store.entities_named("Mars").is_empty());
}

#[tokio::test]
async fn create_from_unmatched_source_is_skipped_with_a_warning() {
    let f = fixture();
    let result = run(
        &f.store,
        r#"MATCH (p {name: "Missing"}) CREATE (p)-[:CHILD]->(c {name: "Orphan"})"#,
    )
    .await;

    assert!(result.success);
    assert!(!result.warnings.is_empty());
    assert!(f.store.entities_named("Orphan").is_empty());
}

#[tokio::test]
async fn create_target_needs_a_name() {
    let f = fixture();
    let result = run(
        &f.store,
        r#"MATCH (p {name: "Projects"}) CREATE (p)-[:CHILD]->(x)"#,
    )
    .await;

    assert!(!result.success);
    assert!(result.errors[0].contains("CREATE requires a name for `x`"), "{:?}", result.errors);
    assert_eq!(f.store.calls(StoreOp::CreateEntity), 0);
    assert_eq!(f.store.calls(StoreOp::CreateEdge), 0);
}

#[tokio::test]
async fn create_cannot_invent_a_relationship_source() {
    let f = fixture();
    let result = run(&f.store, r#"CREATE (a {name: "A"})-[:CHILD]->(b {name: "B"})"#).await;

    assert!(!result.success);
    assert!(
        result.errors[0].contains("CREATE cannot create `a` as the source"),
        "{:?}",
        result.errors
    );
    assert_eq!(f.store.calls(StoreOp::CreateEntity), 0);
    assert!(f.store.entities_named("B").is_empty());
}

// ============================================================================
// SET
// ============================================================================

#[tokio::test]
async fn set_updates_store_and_result() {
    let f = fixture();
    let result = run(
        &f.store,
        r#"MATCH (n {name: "Beta"}) SET n.label = "second", n:Person RETURN n"#,
    )
    .await;

    assert!(result.success, "{:?}", result.errors);
    let beta = &f.store.entities_named("Beta")[0];
    assert_eq!(beta.label.as_deref(), Some("second"));
    assert_ne!(beta.type_id.as_deref(), Some(f.project.as_str()));
    assert!(matches!(
        &result.created[0],
        MutationRecord::Update { fields, .. } if fields == &vec!["label", "typeId"]
    ));
    match &result.rows("n")[0] {
        ResultRow::Entity(e) => assert_eq!(e.label.as_deref(), Some("second")),
        other => panic!("expected entity, got {other:?}"),
    }
}

#[tokio::test]
async fn set_over_the_batch_ceiling_touches_nothing() {
    let store = MemoryStore::new();
    let bulk = store.add_thought("Bulk", None);
    for i in 0..11 {
        let child = store.add_thought(&format!("item {i}"), None);
        store.add_link(&bulk, &child, Relation::Child);
    }

    let result = run(
        &store,
        r#"MATCH (b {name: "Bulk"})-[:CHILD]->(c) SET c.label = "x" RETURN c"#,
    )
    .await;

    assert!(!result.success);
    assert!(result.errors[0].contains("limit is 10"));
    assert_eq!(store.calls(StoreOp::UpdateEntity), 0);
}

#[tokio::test]
async fn batch_ceiling_is_configurable() {
    let f = fixture();
    let query = parse(r#"MATCH (p {name: "Projects"})-[:CHILD]->(c) SET c.label = "x""#).unwrap();

    let tight = ExecutorConfig::default().with_max_set_batch(2);
    let result = execute_with_config(&f.store, GRAPH, &query, &tight).await;
    assert!(!result.success);

    let result = execute(&f.store, GRAPH, &query).await;
    assert!(result.success);
    assert_eq!(f.store.calls(StoreOp::UpdateEntity), 3);
}

#[tokio::test]
async fn set_null_clears_a_field() {
    let f = fixture();
    run(&f.store, r#"MATCH (n {name: "Beta"}) SET n.label = "tmp""#).await;
    let result = run(&f.store, r#"MATCH (n {name: "Beta"}) SET n.label = null"#).await;

    assert!(result.success);
    assert_eq!(f.store.entities_named("Beta")[0].label, None);
}

#[tokio::test]
async fn set_unknown_type_touches_nothing() {
    let f = fixture();
    let result = run(&f.store, r#"MATCH (p {name: "Alpha"}) SET p:Nope"#).await;

    assert!(!result.success);
    assert!(result.errors[0].contains("Unknown type `Nope`"), "{:?}", result.errors);
    assert_eq!(f.store.calls(StoreOp::UpdateEntity), 0);
    assert_eq!(
        f.store.entities_named("Alpha")[0].type_id.as_deref(),
        Some(f.project.as_str())
    );
}

// ============================================================================
// MERGE
// ============================================================================

#[tokio::test]
async fn merge_is_idempotent_and_runs_the_matching_actions() {
    let f = fixture();
    let text = r#"MERGE (n:Project {name: "Epsilon"})
                  ON CREATE SET n.label = "new"
                  ON MATCH SET n.label = "seen"
                  RETURN n"#;

    let first = run(&f.store, text).await;
    assert!(first.success, "{:?}", first.errors);
    assert!(matches!(
        &first.created[0],
        MutationRecord::Merge { outcome: MergeOutcome::Created, .. }
    ));
    assert_eq!(f.store.entities_named("Epsilon")[0].label.as_deref(), Some("new"));

    let second = run(&f.store, text).await;
    assert!(matches!(
        &second.created[0],
        MutationRecord::Merge { outcome: MergeOutcome::Matched, .. }
    ));
    let epsilon = f.store.entities_named("Epsilon");
    assert_eq!(epsilon.len(), 1);
    assert_eq!(epsilon[0].label.as_deref(), Some("seen"));
}

#[tokio::test]
async fn merge_link_reuses_existing_edges() {
    let f = fixture();
    let links = f.store.link_count();

    let existing = run(
        &f.store,
        r#"MATCH (a {name: "Alpha"}), (b {name: "Alice"}) MERGE (a)-[:JUMP]->(b)"#,
    )
    .await;
    assert!(existing.success, "{:?}", existing.errors);
    assert!(matches!(
        &existing.created[0],
        MutationRecord::LinkMerge { outcome: MergeOutcome::Matched, link_id: None, .. }
    ));
    assert_eq!(f.store.link_count(), links);

    let fresh = run(
        &f.store,
        r#"MATCH (a {name: "Beta"}), (b {name: "Alice"}) MERGE (a)-[:JUMP]->(b)"#,
    )
    .await;
    assert!(matches!(
        &fresh.created[0],
        MutationRecord::LinkMerge { outcome: MergeOutcome::Created, link_id: Some(_), .. }
    ));
    assert_eq!(f.store.link_count(), links + 1);
}

#[tokio::test]
async fn merge_node_needs_a_name() {
    let f = fixture();
    let result = run(&f.store, r#"MERGE (n:Project) RETURN n"#).await;

    assert!(!result.success);
    assert!(result.errors[0].contains("MERGE requires a name for `n`"), "{:?}", result.errors);
    assert_eq!(f.store.calls(StoreOp::CreateEntity), 0);
    assert_eq!(f.store.calls(StoreOp::UpdateEntity), 0);
}

#[tokio::test]
async fn merge_path_twice_keeps_one_link() {
    let f = fixture();
    let links = f.store.link_count();
    let text = r#"MERGE (a {name: "Delta"})-[:CHILD]->(b {name: "Delta Notes"})"#;

    let first = run(&f.store, text).await;
    assert!(first.success, "{:?}", first.errors);
    assert_eq!(f.store.link_count(), links + 1);

    let second = run(&f.store, text).await;
    assert!(second.success, "{:?}", second.errors);
    assert_eq!(f.store.link_count(), links + 1);
    assert_eq!(f.store.entities_named("Delta").len(), 1);
    assert_eq!(f.store.entities_named("Delta Notes").len(), 1);
    assert!(second.created.iter().any(|r| matches!(
        r,
        MutationRecord::LinkMerge { outcome: MergeOutcome::Matched, link_id: None, .. }
    )));

    let json = second.to_json();
    let link_merge = json["created"]
        .as_array()
        .and_then(|records| records.iter().find(|r| r["type"] == "link_merge"))
        .cloned()
        .unwrap_or_default();
    assert_eq!(link_merge["outcome"], "matched");
}

// ============================================================================
// DELETE
// ============================================================================

#[tokio::test]
async fn delete_is_refused_without_touching_the_store() {
    let f = fixture();
    let result = run(&f.store, r#"MATCH (n {name: "Alpha"}) DETACH DELETE n"#).await;

    assert!(!result.success);
    assert!(result.errors[0].contains("DELETE is not supported"));
    assert_eq!(f.store.total_calls(), 0);
    assert_eq!(f.store.entities_named("Alpha").len(), 1);
}
