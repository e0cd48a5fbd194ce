//! ThoughtQL graph-store boundary
//!
//! The query core never talks HTTP itself. It consumes the [`GraphStore`]
//! trait below, which mirrors the handful of remote operations the planner
//! needs:
//!
//! ```text
//!  find_exact_by_name ─┐
//!  search              ├─ node resolution (name-first, lazy type)
//!  get_types           │
//!  get_entity         ─┘
//!  get_adjacency      ─── relationship traversal / MERGE edge checks
//!  create_entity      ─┐
//!  update_entity       ├─ CREATE / SET / MERGE
//!  create_edge        ─┘
//! ```
//!
//! A "not found" outcome is reported as [`StoreError::NotFound`] so callers can
//! tell it apart from real failures. Retry/backoff is the implementor's job.
//!
//! [`MemoryStore`] is a complete in-process implementation, used by the CLI
//! (backed by a JSON snapshot) and as the test double for the planner.

pub mod error;
pub mod memory;
pub mod types;

use async_trait::async_trait;

pub use error::{StoreError, StoreResult};
pub use memory::{GraphSnapshot, LinkRecord, MemoryStore, StoreOp};
pub use types::{
    Adjacency, Created, Entity, EntityPatch, NewEdge, NewEntity, PatchSlots, PatchValue, Patchable,
    Relation, SearchHit, UnknownRelation, KIND_NORMAL, KIND_TYPE,
};

/// Operations the planner consumes from the remote knowledge-graph service.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Strict exact-name lookup. `Ok(None)` when nothing carries that name.
    async fn find_exact_by_name(&self, graph_id: &str, name: &str) -> StoreResult<Option<Entity>>;

    /// Full-text search, capped at `max_results` hits.
    async fn search(
        &self,
        graph_id: &str,
        text: &str,
        max_results: usize,
        names_only: bool,
    ) -> StoreResult<Vec<SearchHit>>;

    /// The type catalog (entities that other entities are classified under).
    async fn get_types(&self, graph_id: &str) -> StoreResult<Vec<Entity>>;

    async fn get_entity(&self, graph_id: &str, id: &str) -> StoreResult<Entity>;

    async fn get_adjacency(&self, graph_id: &str, id: &str) -> StoreResult<Adjacency>;

    async fn create_entity(&self, graph_id: &str, data: NewEntity) -> StoreResult<Created>;

    async fn update_entity(&self, graph_id: &str, id: &str, patch: EntityPatch) -> StoreResult<()>;

    async fn create_edge(&self, graph_id: &str, edge: NewEdge) -> StoreResult<Created>;
}
