//! Typed query IR.
//!
//! Built once per query string by [`crate::transform`] and read-only
//! afterwards. Serializes to JSON (`thoughtql parse`) for inspection.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

pub use thoughtql_store::Relation;

/// Upper bound on `maxHops` for variable-length relationships.
pub const MAX_HOP_DEPTH: u32 = 5;

/// Canonical entity properties known to the query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Property {
    Name,
    Id,
    Label,
    TypeId,
    ForegroundColor,
    BackgroundColor,
    Kind,
}

impl Property {
    /// Properties usable in WHERE existence checks and projections.
    pub const QUERYABLE: [Property; 7] = [
        Property::Name,
        Property::Id,
        Property::Label,
        Property::TypeId,
        Property::ForegroundColor,
        Property::BackgroundColor,
        Property::Kind,
    ];

    /// Properties a SET clause may assign.
    pub const SETTABLE: [Property; 4] = [
        Property::Name,
        Property::Label,
        Property::ForegroundColor,
        Property::BackgroundColor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Property::Name => "name",
            Property::Id => "id",
            Property::Label => "label",
            Property::TypeId => "typeId",
            Property::ForegroundColor => "foregroundColor",
            Property::BackgroundColor => "backgroundColor",
            Property::Kind => "kind",
        }
    }

    /// Canonicalize a user-written key (`typeid`, `type_id`, `TypeId` → `typeId`).
    pub fn canonical(raw: &str) -> Option<Property> {
        let folded: String = raw
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Property::QUERYABLE
            .into_iter()
            .find(|p| p.as_str().to_ascii_lowercase() == folded)
    }

    pub fn is_settable(self) -> bool {
        Property::SETTABLE.contains(&self)
    }

    pub fn list(props: &[Property]) -> String {
        props
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "CONTAINS")]
    Contains,
    #[serde(rename = "STARTS WITH")]
    StartsWith,
    #[serde(rename = "ENDS WITH")]
    EndsWith,
    #[serde(rename = "=~")]
    Similar,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Contains => "CONTAINS",
            CompareOp::StartsWith => "STARTS WITH",
            CompareOp::EndsWith => "ENDS WITH",
            CompareOp::Similar => "=~",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which clause a pattern element came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    Match,
    Create,
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodePattern {
    pub variable: String,
    /// Type name (`(n:Project)`).
    pub label: Option<String>,
    /// Inline `{name: "..."}`; the only inline property supported.
    pub name: Option<String>,
    /// Clauses this variable appears in.
    pub introduced_in: BTreeSet<Clause>,
    /// Variable was synthesized for an anonymous `( ... )` pattern.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub anonymous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelPattern {
    pub variable: Option<String>,
    pub rel_type: Relation,
    pub source: String,
    pub target: String,
    pub min_hops: u32,
    pub max_hops: u32,
    pub clause: Clause,
}

impl RelPattern {
    pub fn is_variable_length(&self) -> bool {
        self.min_hops != 1 || self.max_hops != 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub variable: String,
    pub field: Property,
    pub op: CompareOp,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Existence {
    pub variable: String,
    pub property: Property,
    /// `true` for `IS NULL` (property absent), `false` for `IS NOT NULL`.
    pub negated: bool,
}

/// Compound WHERE filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WhereExpr {
    Comparison(Comparison),
    Existence(Existence),
    Not(Box<WhereExpr>),
    And(Vec<WhereExpr>),
    Or(Vec<WhereExpr>),
    Xor(Vec<WhereExpr>),
}

impl WhereExpr {
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            WhereExpr::Comparison(c) => {
                out.insert(c.variable.as_str());
            }
            WhereExpr::Existence(e) => {
                out.insert(e.variable.as_str());
            }
            WhereExpr::Not(inner) => inner.collect_variables(out),
            WhereExpr::And(xs) | WhereExpr::Or(xs) | WhereExpr::Xor(xs) => {
                for x in xs {
                    x.collect_variables(out);
                }
            }
        }
    }

    /// Whether this expression can drive a lookup on its own.
    pub fn is_positive(&self) -> bool {
        match self {
            WhereExpr::Comparison(_) => true,
            WhereExpr::Existence(_) | WhereExpr::Not(_) => false,
            WhereExpr::And(xs) | WhereExpr::Or(xs) | WhereExpr::Xor(xs) => {
                xs.iter().any(WhereExpr::is_positive)
            }
        }
    }

    /// Top-level conjuncts (a non-AND expression is its own single conjunct).
    pub fn conjuncts(&self) -> Vec<&WhereExpr> {
        match self {
            WhereExpr::And(xs) => xs.iter().collect(),
            other => vec![other],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetItem {
    /// `n.prop = value`; `value: None` clears the property.
    Property {
        variable: String,
        property: Property,
        value: Option<String>,
    },
    /// `n:TypeName`
    Type { variable: String, type_name: String },
}

impl SetItem {
    pub fn variable(&self) -> &str {
        match self {
            SetItem::Property { variable, .. } | SetItem::Type { variable, .. } => variable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetClause {
    pub items: Vec<SetItem>,
}

impl SetClause {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items grouped by variable, groups ordered by first appearance.
    pub fn grouped(&self) -> Vec<(&str, Vec<&SetItem>)> {
        let mut groups: Vec<(&str, Vec<&SetItem>)> = Vec::new();
        for item in &self.items {
            match groups.iter_mut().find(|(v, _)| *v == item.variable()) {
                Some((_, items)) => items.push(item),
                None => groups.push((item.variable(), vec![item])),
            }
        }
        groups
    }

    /// Sub-clause containing only the items for `variable`.
    pub fn for_variable(&self, variable: &str) -> SetClause {
        SetClause {
            items: self
                .items
                .iter()
                .filter(|i| i.variable() == variable)
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteClause {
    pub variables: Vec<String>,
    pub detach: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnField {
    pub variable: String,
    /// `None` returns the whole entity.
    pub field: Option<Property>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Match,
    Create,
    MatchCreate,
    Merge,
    MatchMerge,
    MatchDelete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Match => "match",
            Action::Create => "create",
            Action::MatchCreate => "match_create",
            Action::Merge => "merge",
            Action::MatchMerge => "match_merge",
            Action::MatchDelete => "match_delete",
        }
    }

    pub fn has_match_phase(self) -> bool {
        matches!(
            self,
            Action::Match | Action::MatchCreate | Action::MatchMerge | Action::MatchDelete
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IR root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    pub action: Action,
    pub nodes: Vec<NodePattern>,
    pub relationships: Vec<RelPattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereExpr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_clause: Option<SetClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_clause: Option<DeleteClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_create_set: Option<SetClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_match_set: Option<SetClause>,
    pub return_fields: Vec<ReturnField>,
    /// Variables bound by MATCH.
    pub match_variables: BTreeSet<String>,
    /// Variables first introduced by CREATE or MERGE.
    pub mutation_variables: BTreeSet<String>,
}

impl Query {
    pub fn node(&self, variable: &str) -> Option<&NodePattern> {
        self.nodes.iter().find(|n| n.variable == variable)
    }

    pub fn is_match_variable(&self, variable: &str) -> bool {
        self.match_variables.contains(variable)
    }

    pub fn relationships_in(&self, clause: Clause) -> impl Iterator<Item = &RelPattern> {
        self.relationships.iter().filter(move |r| r.clause == clause)
    }

    /// Variables named by the caller (excludes synthesized anonymous ones).
    pub fn named_variables(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|n| !n.anonymous)
            .map(|n| n.variable.as_str())
    }
}
