//! In-memory [`GraphStore`] implementation.
//!
//! Holds one graph (the `graph_id` argument is only checked for being
//! non-empty). Every trait call is counted per [`StoreOp`], which lets tests
//! assert on *how* the planner reached its answer, not just the answer.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::types::{
    Adjacency, Created, Entity, EntityPatch, NewEdge, NewEntity, Relation, SearchHit, KIND_NORMAL,
};
use crate::GraphStore;

/// One stored link: `a -relation-> b`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: String,
    pub a: String,
    pub b: String,
    pub relation: Relation,
}

/// Serializable contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreOp {
    FindExactByName,
    Search,
    GetTypes,
    GetEntity,
    GetAdjacency,
    CreateEntity,
    UpdateEntity,
    CreateEdge,
}

#[derive(Debug, Default)]
struct Graph {
    entities: Vec<Entity>,
    by_id: HashMap<String, usize>,
    links: Vec<LinkRecord>,
}

impl Graph {
    fn get(&self, id: &str) -> Option<&Entity> {
        self.by_id.get(id).map(|&i| &self.entities[i])
    }

    fn insert(&mut self, entity: Entity) {
        match self.by_id.get(&entity.id) {
            Some(&i) => self.entities[i] = entity,
            None => {
                self.by_id.insert(entity.id.clone(), self.entities.len());
                self.entities.push(entity);
            }
        }
    }

    fn adjacency(&self, id: &str) -> Adjacency {
        let mut adj = Adjacency::default();
        let mut seen: HashSet<(Relation, &str)> = HashSet::new();
        for link in &self.links {
            let (relation, other) = if link.a == id {
                (link.relation, link.b.as_str())
            } else if link.b == id {
                (link.relation.inverse(), link.a.as_str())
            } else {
                continue;
            };
            if !seen.insert((relation, other)) {
                continue;
            }
            if let Some(entity) = self.get(other) {
                adj.push(relation, entity.clone());
            }
        }
        adj
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: RwLock<Graph>,
    calls: Mutex<BTreeMap<StoreOp, usize>>,
    failing_adjacency: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let store = Self::new();
        {
            let mut graph = store.graph.write();
            for entity in snapshot.entities {
                graph.insert(entity);
            }
            graph.links = snapshot.links;
        }
        store
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let graph = self.graph.read();
        GraphSnapshot {
            entities: graph.entities.clone(),
            links: graph.links.clone(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let snapshot: GraphSnapshot = serde_json::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, text)
    }

    // ------------------------------------------------------------------
    // Direct (uncounted) construction helpers
    // ------------------------------------------------------------------

    pub fn insert(&self, entity: Entity) -> String {
        let id = entity.id.clone();
        self.graph.write().insert(entity);
        id
    }

    /// Add a type node and return its id.
    pub fn add_type(&self, name: &str) -> String {
        self.insert(Entity::new(new_id(), name).as_type())
    }

    /// Add a plain thought (optionally typed) and return its id.
    pub fn add_thought(&self, name: &str, type_id: Option<&str>) -> String {
        let mut entity = Entity::new(new_id(), name);
        entity.type_id = type_id.map(str::to_string);
        self.insert(entity)
    }

    pub fn add_link(&self, a: &str, b: &str, relation: Relation) -> String {
        let id = new_id();
        self.graph.write().links.push(LinkRecord {
            id: id.clone(),
            a: a.to_string(),
            b: b.to_string(),
            relation,
        });
        id
    }

    pub fn entity(&self, id: &str) -> Option<Entity> {
        self.graph.read().get(id).cloned()
    }

    pub fn entities_named(&self, name: &str) -> Vec<Entity> {
        self.graph
            .read()
            .entities
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.graph.read().entities.len()
    }

    pub fn link_count(&self) -> usize {
        self.graph.read().links.len()
    }

    /// Make every later `get_adjacency` for `id` fail with a remote error.
    pub fn fail_adjacency_for(&self, id: &str) {
        self.failing_adjacency.lock().insert(id.to_string());
    }

    // ------------------------------------------------------------------
    // Call accounting
    // ------------------------------------------------------------------

    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, op: StoreOp, graph_id: &str) -> StoreResult<()> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        if graph_id.trim().is_empty() {
            return Err(StoreError::Invalid("graph id must not be empty".to_string()));
        }
        Ok(())
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn search_score(candidate: &str, needle: &str) -> f32 {
    if candidate == needle {
        1.0
    } else if candidate.starts_with(needle) {
        0.8
    } else {
        0.5
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn find_exact_by_name(&self, graph_id: &str, name: &str) -> StoreResult<Option<Entity>> {
        self.record(StoreOp::FindExactByName, graph_id)?;
        let graph = self.graph.read();
        Ok(graph.entities.iter().find(|e| e.name == name).cloned())
    }

    async fn search(
        &self,
        graph_id: &str,
        text: &str,
        max_results: usize,
        names_only: bool,
    ) -> StoreResult<Vec<SearchHit>> {
        self.record(StoreOp::Search, graph_id)?;
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Err(StoreError::Invalid("search text must not be empty".to_string()));
        }
        let graph = self.graph.read();
        let hits = graph
            .entities
            .iter()
            .filter_map(|e| {
                let name = e.name.to_lowercase();
                if name.contains(&needle) {
                    return Some((search_score(&name, &needle), e));
                }
                if names_only {
                    return None;
                }
                e.label
                    .as_deref()
                    .map(str::to_lowercase)
                    .filter(|label| label.contains(&needle))
                    .map(|_| (0.3, e))
            })
            .take(max_results)
            .map(|(score, e)| SearchHit {
                source_entity: Some(e.clone()),
                score,
            })
            .collect();
        Ok(hits)
    }

    async fn get_types(&self, graph_id: &str) -> StoreResult<Vec<Entity>> {
        self.record(StoreOp::GetTypes, graph_id)?;
        let graph = self.graph.read();
        Ok(graph.entities.iter().filter(|e| e.is_type()).cloned().collect())
    }

    async fn get_entity(&self, graph_id: &str, id: &str) -> StoreResult<Entity> {
        self.record(StoreOp::GetEntity, graph_id)?;
        self.graph
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("thought {id}")))
    }

    async fn get_adjacency(&self, graph_id: &str, id: &str) -> StoreResult<Adjacency> {
        self.record(StoreOp::GetAdjacency, graph_id)?;
        if self.failing_adjacency.lock().contains(id) {
            return Err(StoreError::Remote(format!("adjacency for {id} unavailable")));
        }
        let graph = self.graph.read();
        if graph.get(id).is_none() {
            return Err(StoreError::not_found(format!("thought {id}")));
        }
        Ok(graph.adjacency(id))
    }

    async fn create_entity(&self, graph_id: &str, data: NewEntity) -> StoreResult<Created> {
        self.record(StoreOp::CreateEntity, graph_id)?;
        if data.name.trim().is_empty() {
            return Err(StoreError::Invalid("thought name must not be empty".to_string()));
        }
        let mut graph = self.graph.write();
        if let Some(type_id) = &data.type_id {
            if !graph.get(type_id).is_some_and(Entity::is_type) {
                return Err(StoreError::Invalid(format!("{type_id} is not a type")));
            }
        }
        let id = new_id();
        graph.insert(Entity {
            id: id.clone(),
            name: data.name,
            label: data.label,
            type_id: data.type_id,
            kind: Some(KIND_NORMAL),
            foreground_color: None,
            background_color: None,
        });
        tracing::debug!(id = %id, "memory store created thought");
        Ok(Created { id })
    }

    async fn update_entity(&self, graph_id: &str, id: &str, patch: EntityPatch) -> StoreResult<()> {
        self.record(StoreOp::UpdateEntity, graph_id)?;
        let mut graph = self.graph.write();
        let index = *graph
            .by_id
            .get(id)
            .ok_or_else(|| StoreError::not_found(format!("thought {id}")))?;
        patch.apply_to(&mut graph.entities[index]);
        Ok(())
    }

    async fn create_edge(&self, graph_id: &str, edge: NewEdge) -> StoreResult<Created> {
        self.record(StoreOp::CreateEdge, graph_id)?;
        let mut graph = self.graph.write();
        for endpoint in [&edge.a, &edge.b] {
            if graph.get(endpoint).is_none() {
                return Err(StoreError::not_found(format!("thought {endpoint}")));
            }
        }
        let id = new_id();
        graph.links.push(LinkRecord {
            id: id.clone(),
            a: edge.a,
            b: edge.b,
            relation: edge.relation,
        });
        Ok(Created { id })
    }
}
