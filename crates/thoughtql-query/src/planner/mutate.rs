//! CREATE, SET and MERGE.
//!
//! The remote service has no transactions: each call below is applied as
//! soon as it succeeds, and a later failure does not undo earlier ones.

use thoughtql_store::{EntityPatch, NewEdge, NewEntity, PatchValue, Relation};

use super::{ExecError, ExecResult, Executor};
use crate::ir::{Clause, NodePattern, Property, Query, RelPattern, SetClause, SetItem};
use crate::result::{MergeOutcome, MutationRecord, ResolvedEntity};

impl<'a> Executor<'a> {
    // ========================================================================
    // CREATE
    // ========================================================================

    pub(super) async fn create_phase(&mut self, query: &Query) -> ExecResult<()> {
        for rel in query.relationships_in(Clause::Create) {
            let Some(sources) = self.resolved.get(&rel.source).cloned() else {
                return Err(ExecError::validation(format!(
                    "CREATE cannot create `{}` as the source of a relationship; \
                     MATCH it first or create it in a separate query",
                    rel.source
                )));
            };
            if sources.is_empty() {
                self.warn(format!(
                    "CREATE skipped for `{}`-[:{}]->`{}`: `{}` matched no thoughts",
                    rel.source, rel.rel_type, rel.target, rel.source
                ));
                continue;
            }

            if let Some(targets) = self.resolved.get(&rel.target).cloned() {
                for source in &sources {
                    for target in &targets {
                        self.link(source, target, rel.rel_type).await?;
                    }
                }
                continue;
            }

            let target = pattern(query, &rel.target)?;
            let name = required_name(target, "CREATE")?;
            let type_id = self.required_type(target.label.as_deref()).await?;
            let mut created = Vec::with_capacity(sources.len());
            for source in &sources {
                let entity = self
                    .create_thought(name, type_id.as_deref(), Some(&source.id))
                    .await?;
                self.link(source, &entity, rel.rel_type).await?;
                created.push(entity);
            }
            self.resolved.insert(rel.target.clone(), created);
        }

        let linked = |variable: &str| {
            query
                .relationships_in(Clause::Create)
                .any(|r| r.source == variable || r.target == variable)
        };
        for node in &query.nodes {
            if !node.introduced_in.contains(&Clause::Create)
                || self.resolved.contains_key(&node.variable)
                || linked(&node.variable)
            {
                continue;
            }
            let name = required_name(node, "CREATE")?;
            let type_id = self.required_type(node.label.as_deref()).await?;
            let entity = self.create_thought(name, type_id.as_deref(), None).await?;
            self.resolved.insert(node.variable.clone(), vec![entity]);
        }
        Ok(())
    }

    // ========================================================================
    // SET
    // ========================================================================

    /// Apply `set` group by group. Each group is checked against the batch
    /// ceiling before any of its entities is touched.
    pub(super) async fn apply_set(&mut self, set: &SetClause) -> ExecResult<()> {
        for (variable, items) in set.grouped() {
            let entities = self.resolved.get(variable).cloned().unwrap_or_default();
            if entities.len() > self.config.max_set_batch {
                return Err(ExecError::validation(format!(
                    "SET on `{variable}` would update {} thoughts; the limit is {}. \
                     Narrow the MATCH so fewer thoughts are affected",
                    entities.len(),
                    self.config.max_set_batch
                )));
            }
            let patch = self.build_patch(&items).await?;
            if patch.is_empty() || entities.is_empty() {
                continue;
            }

            let fields = patch.fields();
            let mut updated = Vec::with_capacity(entities.len());
            for mut entity in entities {
                self.store
                    .update_entity(self.graph_id, &entity.id, patch.clone())
                    .await?;
                patch.apply_to(&mut entity);
                tracing::info!(id = %entity.id, fields = ?fields, "updated thought");
                self.created.push(MutationRecord::Update {
                    thought_id: entity.id.clone(),
                    name: entity.name.clone(),
                    fields: fields.clone(),
                });
                updated.push(entity);
            }
            self.resolved.insert(variable.to_string(), updated);
        }
        Ok(())
    }

    async fn build_patch(&mut self, items: &[&SetItem]) -> ExecResult<EntityPatch> {
        let mut patch = EntityPatch::default();
        for item in items {
            match item {
                SetItem::Property {
                    property, value, ..
                } => {
                    let change = match value {
                        Some(v) => PatchValue::Set(v.clone()),
                        None => PatchValue::Clear,
                    };
                    match property {
                        Property::Name => patch.name = value.clone(),
                        Property::Label => patch.label = Some(change),
                        Property::ForegroundColor => patch.foreground_color = Some(change),
                        Property::BackgroundColor => patch.background_color = Some(change),
                        other => {
                            return Err(ExecError::validation(format!(
                                "Property `{other}` cannot be SET"
                            )))
                        }
                    }
                }
                SetItem::Type { type_name, .. } => {
                    let type_id = self
                        .types
                        .type_id(self.store, self.graph_id, type_name)
                        .await?
                        .ok_or_else(|| unknown_type(type_name))?;
                    patch.type_id = Some(PatchValue::Set(type_id));
                }
            }
        }
        Ok(patch)
    }

    // ========================================================================
    // MERGE
    // ========================================================================

    pub(super) async fn merge_phase(&mut self, query: &Query) -> ExecResult<()> {
        for node in &query.nodes {
            if !node.introduced_in.contains(&Clause::Merge)
                || self.resolved.contains_key(&node.variable)
            {
                continue;
            }
            self.merge_node(query, node).await?;
        }

        let merge_rels: Vec<&RelPattern> = query.relationships_in(Clause::Merge).collect();
        for rel in merge_rels {
            let (Some(sources), Some(targets)) = (
                self.resolved.get(&rel.source).cloned(),
                self.resolved.get(&rel.target).cloned(),
            ) else {
                continue;
            };
            if sources.is_empty() || targets.is_empty() {
                let empty = if sources.is_empty() { &rel.source } else { &rel.target };
                self.warn(format!(
                    "MERGE skipped for `{}`-[:{}]->`{}`: `{empty}` matched no thoughts",
                    rel.source, rel.rel_type, rel.target
                ));
                continue;
            }
            for source in &sources {
                for target in &targets {
                    self.merge_link(source, target, rel.rel_type).await?;
                }
            }
        }
        Ok(())
    }

    async fn merge_node(&mut self, query: &Query, node: &NodePattern) -> ExecResult<()> {
        let name = required_name(node, "MERGE")?;
        let mut found = self.exact(name).await?;
        if let Some(label) = &node.label {
            found = self.filter_by_type(label, found).await?;
        }

        let (entity, outcome) = if found.is_empty() {
            let type_id = self.required_type(node.label.as_deref()).await?;
            let entity = self.create_thought(name, type_id.as_deref(), None).await?;
            (entity, MergeOutcome::Created)
        } else {
            if found.len() > 1 {
                self.warn(format!(
                    "MERGE `{}` matched {} thoughts named \"{name}\"; using the first",
                    node.variable,
                    found.len()
                ));
            }
            let first = found.swap_remove(0);
            (first, MergeOutcome::Matched)
        };
        tracing::info!(variable = %node.variable, id = %entity.id, outcome = ?outcome, "merged thought");

        self.created.push(MutationRecord::Merge {
            variable: node.variable.clone(),
            outcome,
            name: entity.name.clone(),
            thought_id: entity.id.clone(),
        });
        self.resolved.insert(node.variable.clone(), vec![entity]);

        let actions = match outcome {
            MergeOutcome::Created => &query.on_create_set,
            MergeOutcome::Matched => &query.on_match_set,
        };
        if let Some(actions) = actions {
            let scoped = actions.for_variable(&node.variable);
            if !scoped.is_empty() {
                self.apply_set(&scoped).await?;
            }
        }
        Ok(())
    }

    async fn merge_link(
        &mut self,
        source: &ResolvedEntity,
        target: &ResolvedEntity,
        relation: Relation,
    ) -> ExecResult<()> {
        let exists = match self.store.get_adjacency(self.graph_id, &source.id).await {
            Ok(adjacency) => adjacency
                .neighbors(relation)
                .iter()
                .any(|n| n.id == target.id),
            Err(err) if err.is_not_found() => false,
            Err(err) => return Err(err.into()),
        };
        if exists {
            self.created.push(MutationRecord::LinkMerge {
                relation,
                source_id: source.id.clone(),
                target_id: target.id.clone(),
                outcome: MergeOutcome::Matched,
                link_id: None,
            });
            return Ok(());
        }

        let edge = NewEdge {
            a: source.id.clone(),
            b: target.id.clone(),
            relation,
        };
        let created = self.store.create_edge(self.graph_id, edge).await?;
        tracing::info!(source = %source.id, target = %target.id, %relation, "merged link");
        self.created.push(MutationRecord::LinkMerge {
            relation,
            source_id: source.id.clone(),
            target_id: target.id.clone(),
            outcome: MergeOutcome::Created,
            link_id: Some(created.id),
        });
        Ok(())
    }

    // ========================================================================
    // Shared
    // ========================================================================

    async fn create_thought(
        &mut self,
        name: &str,
        type_id: Option<&str>,
        source_id: Option<&str>,
    ) -> ExecResult<ResolvedEntity> {
        let data = NewEntity {
            name: name.to_string(),
            type_id: type_id.map(str::to_string),
            label: None,
        };
        let created = self.store.create_entity(self.graph_id, data).await?;
        tracing::info!(id = %created.id, name, "created thought");
        self.created.push(MutationRecord::Thought {
            name: name.to_string(),
            thought_id: created.id.clone(),
            type_id: type_id.map(str::to_string),
            source_id: source_id.map(str::to_string),
        });
        Ok(ResolvedEntity {
            id: created.id,
            name: name.to_string(),
            label: None,
            type_id: type_id.map(str::to_string),
            kind: Some(thoughtql_store::KIND_NORMAL),
            foreground_color: None,
            background_color: None,
        })
    }

    async fn link(
        &mut self,
        source: &ResolvedEntity,
        target: &ResolvedEntity,
        relation: Relation,
    ) -> ExecResult<()> {
        let edge = NewEdge {
            a: source.id.clone(),
            b: target.id.clone(),
            relation,
        };
        let created = self.store.create_edge(self.graph_id, edge).await?;
        tracing::info!(source = %source.id, target = %target.id, %relation, "created link");
        self.created.push(MutationRecord::Link {
            relation,
            source_id: source.id.clone(),
            target_id: target.id.clone(),
            link_id: created.id,
        });
        Ok(())
    }

    /// Type id for an optional label; an unknown label is an error.
    async fn required_type(&mut self, label: Option<&str>) -> ExecResult<Option<String>> {
        let Some(label) = label else {
            return Ok(None);
        };
        self.types
            .type_id(self.store, self.graph_id, label)
            .await?
            .map(Some)
            .ok_or_else(|| unknown_type(label))
    }
}

fn pattern<'q>(query: &'q Query, variable: &str) -> ExecResult<&'q NodePattern> {
    query
        .node(variable)
        .ok_or_else(|| ExecError::validation(format!("Unknown variable `{variable}`")))
}

fn required_name<'n>(node: &'n NodePattern, clause: &str) -> ExecResult<&'n str> {
    node.name.as_deref().ok_or_else(|| {
        ExecError::validation(format!(
            "{clause} requires a name for `{}`, e.g. ({} {{name: \"...\"}})",
            node.variable, node.variable
        ))
    })
}

fn unknown_type(name: &str) -> ExecError {
    ExecError::validation(format!("Unknown type `{name}`"))
}
