//! Name-first node resolution and compound WHERE evaluation.

use std::future::Future;
use std::pin::Pin;

use super::{filter, ExecError, ExecResult, Executor};
use crate::ir::{CompareOp, Comparison, NodePattern, Property, WhereExpr};
use crate::result::ResolvedEntity;

type BoxFuture<'f, T> = Pin<Box<dyn Future<Output = T> + Send + 'f>>;

impl<'a> Executor<'a> {
    /// Resolve a MATCH variable from its own criteria: inline name, WHERE
    /// conjuncts on it, and its label.
    pub(super) async fn resolve_direct(
        &mut self,
        node: &NodePattern,
        bucket: &[&WhereExpr],
    ) -> ExecResult<Vec<ResolvedEntity>> {
        let inline = node.name.as_ref().map(|name| {
            WhereExpr::Comparison(Comparison {
                variable: node.variable.clone(),
                field: Property::Name,
                op: CompareOp::Eq,
                value: name.clone(),
            })
        });
        let mut operands: Vec<&WhereExpr> = inline.iter().collect();
        operands.extend(bucket.iter().copied());

        if operands.iter().any(|e| e.is_positive()) {
            let candidates = self.evaluate_and(&operands).await?;
            return match &node.label {
                Some(label) => self.filter_by_type(label, candidates).await,
                None => Ok(candidates),
            };
        }

        let Some(label) = &node.label else {
            return Err(negation_only(&node.variable));
        };
        // A type-only pattern matches the type node itself.
        let mut anchor = match self.types.lookup(self.store, self.graph_id, label).await? {
            Some(type_entity) => vec![ResolvedEntity::from(type_entity)],
            None => {
                self.warn(format!(
                    "Unknown type `{label}`; `{}` matched nothing",
                    node.variable
                ));
                Vec::new()
            }
        };
        filter::retain_matching(&mut anchor, &operands);
        Ok(anchor)
    }

    fn evaluate<'s>(&'s self, expr: &'s WhereExpr) -> BoxFuture<'s, ExecResult<Vec<ResolvedEntity>>> {
        Box::pin(async move {
            match expr {
                WhereExpr::Comparison(c) => self.lookup(c).await,
                WhereExpr::And(xs) => {
                    let operands: Vec<&WhereExpr> = xs.iter().collect();
                    self.evaluate_and(&operands).await
                }
                WhereExpr::Or(xs) => {
                    let mut sets = Vec::with_capacity(xs.len());
                    for x in xs {
                        sets.push(self.evaluate(x).await?);
                    }
                    Ok(filter::union(sets))
                }
                WhereExpr::Xor(xs) => {
                    let mut sets = Vec::with_capacity(xs.len());
                    for x in xs {
                        sets.push(self.evaluate(x).await?);
                    }
                    Ok(filter::exclusive(sets))
                }
                WhereExpr::Not(_) | WhereExpr::Existence(_) => {
                    let variable = expr.variables().into_iter().next().unwrap_or("?");
                    Err(negation_only(variable))
                }
            }
        })
    }

    /// Positive operands drive lookups and are intersected; the rest filter
    /// the intersection in memory.
    async fn evaluate_and(&self, operands: &[&WhereExpr]) -> ExecResult<Vec<ResolvedEntity>> {
        let (positive, negative): (Vec<&WhereExpr>, Vec<&WhereExpr>) =
            operands.iter().copied().partition(|e| e.is_positive());
        if positive.is_empty() {
            let variable = operands
                .iter()
                .flat_map(|e| e.variables())
                .next()
                .unwrap_or("?");
            return Err(negation_only(variable));
        }

        let mut sets = Vec::with_capacity(positive.len());
        for expr in positive {
            let set = self.evaluate(expr).await?;
            let exhausted = set.is_empty();
            sets.push(set);
            if exhausted {
                break;
            }
        }
        let mut sets = sets.into_iter();
        let first = sets.next().unwrap_or_default();
        let rest: Vec<Vec<ResolvedEntity>> = sets.collect();
        let mut result = filter::intersect(first, &rest);
        filter::retain_matching(&mut result, &negative);
        Ok(result)
    }

    async fn lookup(&self, c: &Comparison) -> ExecResult<Vec<ResolvedEntity>> {
        match c.op {
            CompareOp::Eq => self.exact(&c.value).await,
            CompareOp::Contains | CompareOp::StartsWith | CompareOp::EndsWith => {
                let mut found = self.search(&c.value, self.config.search_limit).await?;
                found.retain(|e| filter::text_matches(c.op, &e.name, &c.value));
                tracing::debug!(op = %c.op, value = %c.value, count = found.len(), "search lookup");
                Ok(found)
            }
            CompareOp::Similar => {
                let exact = self.exact(&c.value).await?;
                if !exact.is_empty() {
                    return Ok(exact);
                }
                let mut found = self
                    .search(&c.value, self.config.similar_search_limit)
                    .await?;
                filter::rank_similar(&mut found, &c.value);
                Ok(found)
            }
        }
    }

    /// Strict exact-name lookup; not-found is an empty result.
    pub(super) async fn exact(&self, name: &str) -> ExecResult<Vec<ResolvedEntity>> {
        match self.store.find_exact_by_name(self.graph_id, name).await {
            Ok(found) => Ok(found.into_iter().map(ResolvedEntity::from).collect()),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn search(&self, text: &str, limit: usize) -> ExecResult<Vec<ResolvedEntity>> {
        let hits = match self.store.search(self.graph_id, text, limit, true).await {
            Ok(hits) => hits,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(filter::dedupe(
            hits.into_iter()
                .filter_map(|hit| hit.source_entity)
                .map(ResolvedEntity::from)
                .collect(),
        ))
    }

    /// Lazy type filter. The catalog is only consulted when there is
    /// something to filter.
    pub(super) async fn filter_by_type(
        &mut self,
        label: &str,
        candidates: Vec<ResolvedEntity>,
    ) -> ExecResult<Vec<ResolvedEntity>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }
        let Some(type_id) = self.types.type_id(self.store, self.graph_id, label).await? else {
            self.warn(format!("Unknown type `{label}`; no thoughts matched it"));
            return Ok(Vec::new());
        };

        let mut kept = Vec::with_capacity(candidates.len());
        for mut candidate in candidates {
            if candidate.type_id.is_none() {
                match self.store.get_entity(self.graph_id, &candidate.id).await {
                    Ok(detail) => candidate = ResolvedEntity::from(detail),
                    Err(err) if err.is_not_found() => continue,
                    Err(err) => return Err(err.into()),
                }
            }
            if candidate.type_id.as_deref() == Some(type_id.as_str()) {
                kept.push(candidate);
            }
        }
        tracing::debug!(label, kept = kept.len(), "type filter applied");
        Ok(kept)
    }
}

fn negation_only(variable: &str) -> ExecError {
    ExecError::validation(format!(
        "NOT and IS NULL conditions on `{variable}` need a positive condition \
         (a name comparison) alongside them; negation alone cannot originate a search"
    ))
}
