//! Planner & executor.
//!
//! Turns a [`Query`] into an ordered sequence of [`GraphStore`] calls:
//!
//! ```text
//!  MATCH   ── name-first resolution ─┬─ exact lookup (`=`, inline name)
//!                                    ├─ search + in-memory filter (CONTAINS / STARTS / ENDS)
//!                                    ├─ exact, then ranked search (`=~`)
//!                                    └─ type anchor (label only)
//!          ── lazy type filter (catalog fetched only when there are candidates)
//!          ── traversal (single hop / bounded BFS) for unconstrained targets
//!  CREATE  ── edges between resolved nodes, new nodes per source
//!  SET     ── per-variable batch ceiling, one patch per entity
//!  MERGE   ── exact lookup or create; edges checked against adjacency first
//! ```
//!
//! All state lives in one [`Executor`] per call and is dropped afterwards.

mod filter;
mod mutate;
mod resolve;
mod traverse;
mod types;

use std::collections::{BTreeMap, HashMap, HashSet};
use thoughtql_store::{GraphStore, StoreError};

use crate::config::ExecutorConfig;
use crate::ir::{Action, Clause, NodePattern, Property, Query, WhereExpr};
use crate::result::{MutationRecord, QueryResult, ResolvedEntity, ResultRow};
use types::TypeCache;

/// Failure inside one execution; folded into [`QueryResult::errors`].
#[derive(Debug, thiserror::Error)]
pub(crate) enum ExecError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ExecError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ExecError::Validation(message.into())
    }
}

pub(crate) type ExecResult<T> = Result<T, ExecError>;

pub(crate) struct Executor<'a> {
    store: &'a dyn GraphStore,
    graph_id: &'a str,
    config: &'a ExecutorConfig,
    resolved: HashMap<String, Vec<ResolvedEntity>>,
    types: TypeCache,
    created: Vec<MutationRecord>,
    warnings: Vec<String>,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(
        store: &'a dyn GraphStore,
        graph_id: &'a str,
        config: &'a ExecutorConfig,
    ) -> Self {
        Self {
            store,
            graph_id,
            config,
            resolved: HashMap::new(),
            types: TypeCache::default(),
            created: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self, query: &Query) -> QueryResult {
        tracing::debug!(action = %query.action, graph_id = self.graph_id, "executing query");
        match self.dispatch(query).await {
            Ok(()) => {
                let results = self.shape_results(query);
                QueryResult {
                    success: true,
                    action: query.action,
                    results,
                    created: self.created,
                    warnings: self.warnings,
                    errors: Vec::new(),
                }
            }
            Err(err) => {
                tracing::warn!(action = %query.action, error = %err, "query failed");
                QueryResult {
                    success: false,
                    action: query.action,
                    results: None,
                    created: self.created,
                    warnings: self.warnings,
                    errors: vec![err.to_string()],
                }
            }
        }
    }

    async fn dispatch(&mut self, query: &Query) -> ExecResult<()> {
        if query.action == Action::MatchDelete {
            return Err(ExecError::validation(
                "DELETE is not supported. Thoughts can only be removed from the graph application itself",
            ));
        }
        if query.action.has_match_phase() {
            self.match_phase(query).await?;
        }
        match query.action {
            Action::Match => {
                if let Some(set) = &query.set_clause {
                    self.apply_set(set).await?;
                }
            }
            Action::Create | Action::MatchCreate => self.create_phase(query).await?,
            Action::Merge | Action::MatchMerge => self.merge_phase(query).await?,
            Action::MatchDelete => {}
        }
        Ok(())
    }

    // ========================================================================
    // MATCH
    // ========================================================================

    async fn match_phase(&mut self, query: &Query) -> ExecResult<()> {
        let plan = MatchPlan::new(query);

        // Variables with their own positive criteria resolve independently.
        for node in &plan.nodes {
            if plan.is_direct(node) {
                let bucket = plan.bucket(&node.variable);
                let entities = self.resolve_direct(node, &bucket).await?;
                tracing::debug!(variable = %node.variable, count = entities.len(), "resolved directly");
                self.resolved.insert(node.variable.clone(), entities);
            }
        }

        // The rest are reached by traversal. When that stalls, the first
        // label-only variable anchors on its type node and traversal resumes.
        loop {
            while self.traverse_pending(query, &plan).await? {}

            let Some(node) = plan
                .nodes
                .iter()
                .find(|n| n.label.is_some() && !self.resolved.contains_key(&n.variable))
            else {
                break;
            };
            let bucket = plan.bucket(&node.variable);
            let entities = self.resolve_direct(node, &bucket).await?;
            self.resolved.insert(node.variable.clone(), entities);
        }

        if let Some(node) = plan
            .nodes
            .iter()
            .find(|n| !self.resolved.contains_key(&n.variable))
        {
            let variable = display_variable(node);
            if plan.buckets.contains_key(node.variable.as_str()) {
                return Err(ExecError::validation(format!(
                    "NOT and IS NULL conditions on `{variable}` need a positive condition \
                     (a name comparison) to filter; negation alone cannot originate a search"
                )));
            }
            return Err(ExecError::validation(format!(
                "Cannot resolve `{variable}`: give it a name, a label, a WHERE condition on its name, \
                 or connect it to a resolvable node"
            )));
        }

        for (expr, variables) in &plan.cross {
            filter::cross_filter(expr, variables, &mut self.resolved);
        }
        Ok(())
    }

    /// One pass over MATCH relationships; returns whether anything resolved.
    async fn traverse_pending(&mut self, query: &Query, plan: &MatchPlan<'_>) -> ExecResult<bool> {
        let mut progressed = false;
        for rel in query.relationships_in(Clause::Match) {
            let source_known = self.resolved.contains_key(&rel.source);
            let target_known = self.resolved.contains_key(&rel.target);
            let (from, to, relation) = match (source_known, target_known) {
                (true, false) => (&rel.source, &rel.target, rel.rel_type),
                (false, true) => (&rel.target, &rel.source, rel.rel_type.inverse()),
                _ => continue,
            };
            let Some(node) = query.node(to) else { continue };

            let sources = self.resolved.get(from).cloned().unwrap_or_default();
            let mut found = self
                .traverse(&sources, relation, rel.min_hops, rel.max_hops)
                .await?;
            tracing::debug!(
                from = %from,
                to = %to,
                relation = %relation,
                count = found.len(),
                "traversed"
            );

            if let Some(label) = &node.label {
                found = self.filter_by_type(label, found).await?;
            }
            let bucket = plan.bucket(to);
            filter::retain_matching(&mut found, &bucket);
            self.resolved.insert(to.clone(), found);
            progressed = true;
        }
        Ok(progressed)
    }

    // ========================================================================
    // Results
    // ========================================================================

    fn shape_results(&self, query: &Query) -> Option<BTreeMap<String, Vec<ResultRow>>> {
        if query.action == Action::Create && query.return_fields.is_empty() {
            return None;
        }
        let mut out = BTreeMap::new();
        if query.return_fields.is_empty() {
            for variable in query.named_variables() {
                let rows = self
                    .entities(variable)
                    .iter()
                    .cloned()
                    .map(ResultRow::Entity)
                    .collect();
                out.insert(variable.to_string(), rows);
            }
            return Some(out);
        }

        // Projections per variable; a bare `RETURN n` wins over `n.name`.
        let mut wanted: Vec<(&str, Option<Vec<Property>>)> = Vec::new();
        for field in &query.return_fields {
            let index = match wanted.iter().position(|(v, _)| *v == field.variable) {
                Some(i) => i,
                None => {
                    wanted.push((field.variable.as_str(), Some(Vec::new())));
                    wanted.len() - 1
                }
            };
            let slot = &mut wanted[index].1;
            match (field.field, slot.as_mut()) {
                (None, _) => *slot = None,
                (Some(p), Some(props)) if !props.contains(&p) => props.push(p),
                _ => {}
            }
        }

        for (variable, projection) in wanted {
            let rows = self
                .entities(variable)
                .iter()
                .map(|e| match &projection {
                    None => ResultRow::Entity(e.clone()),
                    Some(props) => ResultRow::Fields(
                        props
                            .iter()
                            .map(|p| {
                                let value = match p {
                                    Property::Id => e.id.clone(),
                                    _ => e.name.clone(),
                                };
                                (p.as_str(), value)
                            })
                            .collect(),
                    ),
                })
                .collect();
            out.insert(variable.to_string(), rows);
        }
        Some(out)
    }

    fn entities(&self, variable: &str) -> &[ResolvedEntity] {
        self.resolved
            .get(variable)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn warn(&mut self, message: String) {
        tracing::warn!(%message, "query warning");
        self.warnings.push(message);
    }
}

fn display_variable(node: &NodePattern) -> String {
    if node.anonymous {
        match &node.label {
            Some(label) => format!("(:{label})"),
            None => "()".to_string(),
        }
    } else {
        node.variable.clone()
    }
}

// ============================================================================
// WHERE decomposition
// ============================================================================

/// MATCH variables and the WHERE conjuncts attached to each of them.
struct MatchPlan<'q> {
    nodes: Vec<&'q NodePattern>,
    buckets: HashMap<&'q str, Vec<&'q WhereExpr>>,
    cross: Vec<(&'q WhereExpr, Vec<&'q str>)>,
}

impl<'q> MatchPlan<'q> {
    fn new(query: &'q Query) -> Self {
        let nodes = query
            .nodes
            .iter()
            .filter(|n| query.is_match_variable(&n.variable))
            .collect();
        let mut buckets: HashMap<&str, Vec<&WhereExpr>> = HashMap::new();
        let mut cross = Vec::new();
        if let Some(expr) = &query.where_clause {
            for conjunct in expr.conjuncts() {
                let variables: Vec<&str> = conjunct.variables().into_iter().collect();
                match variables.as_slice() {
                    [single] => buckets.entry(*single).or_default().push(conjunct),
                    _ => cross.push((conjunct, variables)),
                }
            }
        }
        Self {
            nodes,
            buckets,
            cross,
        }
    }

    fn bucket(&self, variable: &str) -> Vec<&'q WhereExpr> {
        self.buckets.get(variable).cloned().unwrap_or_default()
    }

    /// Name or positive WHERE criteria of its own.
    fn is_direct(&self, node: &NodePattern) -> bool {
        node.name.is_some() || self.bucket(&node.variable).iter().any(|e| e.is_positive())
    }
}

/// Entities of `set` whose ids are not in `seen`, recording them.
pub(crate) fn fresh(set: Vec<ResolvedEntity>, seen: &mut HashSet<String>) -> Vec<ResolvedEntity> {
    set.into_iter().filter(|e| seen.insert(e.id.clone())).collect()
}
