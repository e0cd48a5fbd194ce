//! Wire representation of graph-store entities, links and requests.
//!
//! Field names follow the remote service's JSON (camelCase).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity kinds as reported by the remote service.
pub const KIND_NORMAL: i64 = 1;
pub const KIND_TYPE: i64 = 2;

/// A thought (vertex) as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            label: None,
            type_id: None,
            kind: Some(KIND_NORMAL),
            foreground_color: None,
            background_color: None,
        }
    }

    pub fn with_type(mut self, type_id: impl Into<String>) -> Self {
        self.type_id = Some(type_id.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Mark this entity as a type node.
    pub fn as_type(mut self) -> Self {
        self.kind = Some(KIND_TYPE);
        self
    }

    pub fn is_type(&self) -> bool {
        self.kind == Some(KIND_TYPE)
    }
}

/// Directed link relation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Relation {
    Child,
    Parent,
    Jump,
    Sibling,
}

impl Relation {
    pub const ALL: [Relation; 4] = [
        Relation::Child,
        Relation::Parent,
        Relation::Jump,
        Relation::Sibling,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Relation::Child => "CHILD",
            Relation::Parent => "PARENT",
            Relation::Jump => "JUMP",
            Relation::Sibling => "SIBLING",
        }
    }

    /// The relation seen from the other endpoint.
    pub fn inverse(self) -> Relation {
        match self {
            Relation::Child => Relation::Parent,
            Relation::Parent => Relation::Child,
            Relation::Jump => Relation::Jump,
            Relation::Sibling => Relation::Sibling,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRelation(pub String);

impl fmt::Display for UnknownRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown relation `{}` (expected one of CHILD, PARENT, JUMP, SIBLING)",
            self.0
        )
    }
}

impl std::error::Error for UnknownRelation {}

impl FromStr for Relation {
    type Err = UnknownRelation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Relation::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownRelation(s.to_string()))
    }
}

/// Neighbourhood of one entity, grouped by relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjacency {
    #[serde(default)]
    pub parents: Vec<Entity>,
    #[serde(default)]
    pub children: Vec<Entity>,
    #[serde(default)]
    pub jumps: Vec<Entity>,
    #[serde(default)]
    pub siblings: Vec<Entity>,
}

impl Adjacency {
    pub fn neighbors(&self, relation: Relation) -> &[Entity] {
        match relation {
            Relation::Child => &self.children,
            Relation::Parent => &self.parents,
            Relation::Jump => &self.jumps,
            Relation::Sibling => &self.siblings,
        }
    }

    fn neighbors_mut(&mut self, relation: Relation) -> &mut Vec<Entity> {
        match relation {
            Relation::Child => &mut self.children,
            Relation::Parent => &mut self.parents,
            Relation::Jump => &mut self.jumps,
            Relation::Sibling => &mut self.siblings,
        }
    }

    pub fn push(&mut self, relation: Relation, entity: Entity) {
        self.neighbors_mut(relation).push(entity);
    }
}

/// One full-text search hit. The hit may not carry an entity (e.g. a match
/// inside an attachment), in which case callers skip it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_entity: Option<Entity>,
    #[serde(default)]
    pub score: f32,
}

/// Request body for entity creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntity {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A single field update inside an [`EntityPatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum PatchValue {
    Set(String),
    Clear,
}

impl PatchValue {
    pub fn apply(&self, slot: &mut Option<String>) {
        match self {
            PatchValue::Set(v) => *slot = Some(v.clone()),
            PatchValue::Clear => *slot = None,
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<PatchValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_color: Option<PatchValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<PatchValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<PatchValue>,
}

impl EntityPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.label.is_none()
            && self.foreground_color.is_none()
            && self.background_color.is_none()
            && self.type_id.is_none()
    }

    /// Canonical names of the fields this patch touches.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.name.is_some() {
            out.push("name");
        }
        if self.label.is_some() {
            out.push("label");
        }
        if self.foreground_color.is_some() {
            out.push("foregroundColor");
        }
        if self.background_color.is_some() {
            out.push("backgroundColor");
        }
        if self.type_id.is_some() {
            out.push("typeId");
        }
        out
    }

    /// Write the touched fields into `target`.
    pub fn apply_to<T: Patchable + ?Sized>(&self, target: &mut T) {
        let slots = target.slots();
        if let Some(name) = &self.name {
            *slots.name = name.clone();
        }
        if let Some(v) = &self.label {
            v.apply(slots.label);
        }
        if let Some(v) = &self.foreground_color {
            v.apply(slots.foreground_color);
        }
        if let Some(v) = &self.background_color {
            v.apply(slots.background_color);
        }
        if let Some(v) = &self.type_id {
            v.apply(slots.type_id);
        }
    }
}

/// Mutable view of the fields an [`EntityPatch`] can change.
pub struct PatchSlots<'e> {
    pub name: &'e mut String,
    pub label: &'e mut Option<String>,
    pub foreground_color: &'e mut Option<String>,
    pub background_color: &'e mut Option<String>,
    pub type_id: &'e mut Option<String>,
}

/// Anything holding a copy of an entity's settable fields.
pub trait Patchable {
    fn slots(&mut self) -> PatchSlots<'_>;
}

impl Patchable for Entity {
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

/// Request body for link creation: `a -relation-> b`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEdge {
    pub a: String,
    pub b: String,
    pub relation: Relation,
}

/// Identifier returned by create operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Created {
    pub id: String,
}
