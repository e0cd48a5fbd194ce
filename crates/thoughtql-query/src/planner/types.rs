//! Per-execution type catalog cache.
//!
//! The catalog is fetched at most once per `execute` call, and only when a
//! label actually has to be resolved.

use std::collections::HashMap;
use thoughtql_store::{Entity, GraphStore};

use super::ExecResult;

#[derive(Debug, Default)]
pub(crate) struct TypeCache {
    catalog: Option<Vec<Entity>>,
    by_name: HashMap<String, usize>,
}

impl TypeCache {
    async fn load(&mut self, store: &dyn GraphStore, graph_id: &str) -> ExecResult<()> {
        if self.catalog.is_none() {
            let types = store.get_types(graph_id).await?;
            tracing::debug!(count = types.len(), "fetched type catalog");
            self.by_name = types
                .iter()
                .enumerate()
                .map(|(i, t)| (t.name.clone(), i))
                .collect();
            self.catalog = Some(types);
        }
        Ok(())
    }

    /// Type entity for `name`: exact name first, then case-insensitive.
    pub(crate) async fn lookup(
        &mut self,
        store: &dyn GraphStore,
        graph_id: &str,
        name: &str,
    ) -> ExecResult<Option<Entity>> {
        self.load(store, graph_id).await?;
        let catalog = self.catalog.as_deref().unwrap_or_default();
        let found = self
            .by_name
            .get(name)
            .and_then(|&i| catalog.get(i))
            .or_else(|| catalog.iter().find(|t| t.name.eq_ignore_ascii_case(name)));
        Ok(found.cloned())
    }

    pub(crate) async fn type_id(
        &mut self,
        store: &dyn GraphStore,
        graph_id: &str,
        name: &str,
    ) -> ExecResult<Option<String>> {
        Ok(self.lookup(store, graph_id, name).await?.map(|t| t.id))
    }

    #[cfg(test)]
    pub(crate) fn is_loaded(&self) -> bool {
        self.catalog.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thoughtql_store::{MemoryStore, StoreOp};

    #[tokio::test]
    async fn catalog_is_fetched_once() {
        let store = MemoryStore::new();
        let project = store.add_type("Project");
        store.add_type("Person");

        let mut cache = TypeCache::default();
        assert!(!cache.is_loaded());
        assert_eq!(
            cache.type_id(&store, "g", "Project").await.unwrap(),
            Some(project.clone())
        );
        assert_eq!(
            cache.type_id(&store, "g", "project").await.unwrap(),
            Some(project)
        );
        assert_eq!(cache.type_id(&store, "g", "Place").await.unwrap(), None);
        assert!(cache.is_loaded());
        assert_eq!(store.calls(StoreOp::GetTypes), 1);
    }
}
