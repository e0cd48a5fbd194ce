//! Relationship traversal from a resolved source set.

use std::collections::HashSet;
use thoughtql_store::{Adjacency, Relation};

use super::{fresh, ExecResult, Executor};
use crate::result::ResolvedEntity;

impl<'a> Executor<'a> {
    /// Entities reachable from `sources` over `relation` at a depth within
    /// `[min_hops, max_hops]`, in first-discovered order.
    pub(super) async fn traverse(
        &self,
        sources: &[ResolvedEntity],
        relation: Relation,
        min_hops: u32,
        max_hops: u32,
    ) -> ExecResult<Vec<ResolvedEntity>> {
        if max_hops <= 1 {
            self.single_hop(sources, relation).await
        } else {
            Ok(self.breadth_first(sources, relation, min_hops, max_hops).await)
        }
    }

    async fn single_hop(
        &self,
        sources: &[ResolvedEntity],
        relation: Relation,
    ) -> ExecResult<Vec<ResolvedEntity>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for source in sources {
            let adjacency = match self.store.get_adjacency(self.graph_id, &source.id).await {
                Ok(adjacency) => adjacency,
                Err(err) if err.is_not_found() => {
                    tracing::debug!(id = %source.id, "source has no adjacency");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            out.extend(fresh(neighbors(&adjacency, relation), &mut seen));
        }
        Ok(out)
    }

    /// Level-by-level expansion. A node whose adjacency cannot be fetched
    /// is skipped; the rest of the frontier still expands.
    async fn breadth_first(
        &self,
        sources: &[ResolvedEntity],
        relation: Relation,
        min_hops: u32,
        max_hops: u32,
    ) -> Vec<ResolvedEntity> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = fresh(sources.to_vec(), &mut visited)
            .into_iter()
            .map(|e| e.id)
            .collect();
        let mut out = Vec::new();

        for depth in 1..=max_hops {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for id in &frontier {
                let adjacency = match self.store.get_adjacency(self.graph_id, id).await {
                    Ok(adjacency) => adjacency,
                    Err(err) => {
                        tracing::warn!(id = %id, depth, error = %err, "skipping node during traversal");
                        continue;
                    }
                };
                for entity in fresh(neighbors(&adjacency, relation), &mut visited) {
                    next.push(entity.id.clone());
                    if depth >= min_hops {
                        out.push(entity);
                    }
                }
            }
            tracing::debug!(
                depth,
                frontier = frontier.len(),
                discovered = next.len(),
                "traversal level"
            );
            frontier = next;
        }
        out
    }
}

fn neighbors(adjacency: &Adjacency, relation: Relation) -> Vec<ResolvedEntity> {
    adjacency
        .neighbors(relation)
        .iter()
        .cloned()
        .map(ResolvedEntity::from)
        .collect()
}
