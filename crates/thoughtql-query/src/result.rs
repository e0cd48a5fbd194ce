//! Execution output: resolved entities, mutation records and the
//! JSON-serializable [`QueryResult`].

use serde::Serialize;
use std::collections::BTreeMap;
use thoughtql_store::{Entity, PatchSlots, Patchable, Relation};

use crate::ir::{Action, Property};

/// Planner-side view of a matched thought.
///
/// Only `id`, `name`, `label` and `typeId` reach the output; the remaining
/// fields are kept for `IS NULL` checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEntity {
    pub id: String,
    pub name: String,
    pub label: Option<String>,
    pub type_id: Option<String>,
    #[serde(skip)]
    pub kind: Option<i64>,
    #[serde(skip)]
    pub foreground_color: Option<String>,
    #[serde(skip)]
    pub background_color: Option<String>,
}

impl ResolvedEntity {
    pub fn has(&self, property: Property) -> bool {
        match property {
            Property::Name => !self.name.is_empty(),
            Property::Id => !self.id.is_empty(),
            Property::Label => self.label.is_some(),
            Property::TypeId => self.type_id.is_some(),
            Property::ForegroundColor => self.foreground_color.is_some(),
            Property::BackgroundColor => self.background_color.is_some(),
            Property::Kind => self.kind.is_some(),
        }
    }
}

impl From<Entity> for ResolvedEntity {
    fn from(e: Entity) -> Self {
        Self {
            id: e.id,
            name: e.name,
            label: e.label,
            type_id: e.type_id,
            kind: e.kind,
            foreground_color: e.foreground_color,
            background_color: e.background_color,
        }
    }
}

impl Patchable for ResolvedEntity {
    fn slots(&mut self) -> PatchSlots<'_> {
        PatchSlots {
            name: &mut self.name,
            label: &mut self.label,
            foreground_color: &mut self.foreground_color,
            background_color: &mut self.background_color,
            type_id: &mut self.type_id,
        }
    }
}

/// One entry in a result list: the whole entity, or only projected fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResultRow {
    Entity(ResolvedEntity),
    Fields(BTreeMap<&'static str, String>),
}

impl ResultRow {
    pub fn name(&self) -> Option<&str> {
        match self {
            ResultRow::Entity(e) => Some(&e.name),
            ResultRow::Fields(f) => f.get("name").map(String::as_str),
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            ResultRow::Entity(e) => Some(&e.id),
            ResultRow::Fields(f) => f.get("id").map(String::as_str),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Created,
    Matched,
}

/// Summary of one mutation, in the order it was performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationRecord {
    #[serde(rename_all = "camelCase")]
    Thought {
        name: String,
        thought_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        type_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        source_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Link {
        relation: Relation,
        source_id: String,
        target_id: String,
        link_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        thought_id: String,
        name: String,
        fields: Vec<&'static str>,
    },
    #[serde(rename_all = "camelCase")]
    Merge {
        variable: String,
        outcome: MergeOutcome,
        name: String,
        thought_id: String,
    },
    #[serde(rename_all = "camelCase")]
    LinkMerge {
        relation: Relation,
        source_id: String,
        target_id: String,
        outcome: MergeOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        link_id: Option<String>,
    },
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub success: bool,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<BTreeMap<String, Vec<ResultRow>>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub created: Vec<MutationRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl QueryResult {
    /// Rows returned for `variable` (empty when absent).
    pub fn rows(&self, variable: &str) -> &[ResultRow] {
        self.results
            .as_ref()
            .and_then(|r| r.get(variable))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Names returned for `variable`, in result order.
    pub fn names(&self, variable: &str) -> Vec<&str> {
        self.rows(variable).iter().filter_map(ResultRow::name).collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            serde_json::json!({ "success": false, "errors": [err.to_string()] })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thoughtql_store::{EntityPatch, PatchValue};

    fn entity() -> ResolvedEntity {
        ResolvedEntity::from(Entity::new("t1", "Alpha").with_type("type-1"))
    }

    #[test]
    fn patch_applies_like_it_does_on_the_store_entity() {
        let patch = EntityPatch {
            name: Some("Beta".into()),
            label: Some(PatchValue::Set("tag".into())),
            foreground_color: Some(PatchValue::Set("#fff".into())),
            type_id: Some(PatchValue::Clear),
            ..EntityPatch::default()
        };
        let mut stored = Entity::new("t1", "Alpha").with_type("type-1");
        let mut resolved = ResolvedEntity::from(stored.clone());
        patch.apply_to(&mut stored);
        patch.apply_to(&mut resolved);
        assert_eq!(resolved, ResolvedEntity::from(stored));
        assert_eq!(resolved.name, "Beta");
        assert_eq!(resolved.type_id, None);
        assert_eq!(resolved.foreground_color.as_deref(), Some("#fff"));
    }

    #[test]
    fn output_entity_has_four_keys() {
        let v = serde_json::to_value(ResultRow::Entity(entity())).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 4);
        assert_eq!(obj["typeId"], "type-1");
        assert!(obj["label"].is_null());
    }

    #[test]
    fn empty_sections_are_omitted() {
        let result = QueryResult {
            success: true,
            action: Action::Create,
            results: None,
            created: vec![MutationRecord::Thought {
                name: "New Idea".to_string(),
                thought_id: "t9".to_string(),
                type_id: None,
                source_id: None,
            }],
            warnings: vec![],
            errors: vec![],
        };
        let v = result.to_json();
        assert_eq!(v["action"], "create");
        assert!(v.get("results").is_none());
        assert!(v.get("errors").is_none());
        assert_eq!(
            v["created"][0],
            serde_json::json!({"type": "thought", "name": "New Idea", "thoughtId": "t9"})
        );
    }

    #[test]
    fn link_merge_records_use_snake_case_tag() {
        let record = MutationRecord::LinkMerge {
            relation: Relation::Jump,
            source_id: "a".to_string(),
            target_id: "b".to_string(),
            outcome: MergeOutcome::Matched,
            link_id: None,
        };
        let v = serde_json::to_value(record).unwrap();
        assert_eq!(v["type"], "link_merge");
        assert_eq!(v["relation"], "JUMP");
        assert_eq!(v["outcome"], "matched");
        assert!(v.get("linkId").is_none());
    }

    #[test]
    fn existence_reads_detail_fields() {
        let mut e = entity();
        assert!(e.has(Property::TypeId));
        assert!(!e.has(Property::BackgroundColor));
        e.background_color = Some("#000".to_string());
        assert!(e.has(Property::BackgroundColor));
    }
}
