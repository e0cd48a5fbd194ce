//! In-memory predicates and id-set combinators.
//!
//! The store's full-text search is not trusted to honor substring
//! semantics, so every search-driven lookup passes through [`text_matches`].

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::ir::{CompareOp, WhereExpr};
use crate::result::ResolvedEntity;

/// Name test for a comparison operator.
///
/// `=` is case-sensitive; the substring operators and `=~` ignore case.
pub(crate) fn text_matches(op: CompareOp, name: &str, value: &str) -> bool {
    let folded = || (name.to_lowercase(), value.to_lowercase());
    match op {
        CompareOp::Eq => name == value,
        CompareOp::Contains | CompareOp::Similar => {
            let (name, value) = folded();
            name.contains(&value)
        }
        CompareOp::StartsWith => {
            let (name, value) = folded();
            name.starts_with(&value)
        }
        CompareOp::EndsWith => {
            let (name, value) = folded();
            name.ends_with(&value)
        }
    }
}

/// Evaluate `expr` against already-resolved entities. `bind` maps a
/// variable to the entity currently assigned to it.
pub(crate) fn holds<'e, F>(expr: &WhereExpr, bind: &F) -> bool
where
    F: Fn(&str) -> Option<&'e ResolvedEntity>,
{
    match expr {
        WhereExpr::Comparison(c) => {
            bind(&c.variable).is_some_and(|e| text_matches(c.op, &e.name, &c.value))
        }
        WhereExpr::Existence(x) => {
            bind(&x.variable).is_some_and(|e| e.has(x.property) != x.negated)
        }
        WhereExpr::Not(inner) => !holds(inner, bind),
        WhereExpr::And(xs) => xs.iter().all(|x| holds(x, bind)),
        WhereExpr::Or(xs) => xs.iter().any(|x| holds(x, bind)),
        WhereExpr::Xor(xs) => xs.iter().filter(|x| holds(x, bind)).count() == 1,
    }
}

/// Keep entities of a single variable for which every filter holds.
pub(crate) fn retain_matching(entities: &mut Vec<ResolvedEntity>, filters: &[&WhereExpr]) {
    entities.retain(|e| filters.iter().all(|f| holds(f, &|_: &str| Some(e))));
}

/// Deterministic ranking for `=~`: case-insensitive exact first, then
/// prefix matches, then lexical order.
pub(crate) fn rank_similar(candidates: &mut [ResolvedEntity], value: &str) {
    let needle = value.to_lowercase();
    let key = |e: &ResolvedEntity| {
        let lower = e.name.to_lowercase();
        (lower != needle, !lower.starts_with(&needle))
    };
    candidates.sort_by(|a, b| match key(a).cmp(&key(b)) {
        Ordering::Equal => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
        other => other,
    });
}

/// Drop repeated ids, keeping the first occurrence.
pub(crate) fn dedupe(entities: Vec<ResolvedEntity>) -> Vec<ResolvedEntity> {
    let mut seen = HashSet::new();
    entities
        .into_iter()
        .filter(|e| seen.insert(e.id.clone()))
        .collect()
}

/// Union by id; first-seen order wins.
pub(crate) fn union(sets: Vec<Vec<ResolvedEntity>>) -> Vec<ResolvedEntity> {
    dedupe(sets.into_iter().flatten().collect())
}

/// Entities present in every set, in the order of the first set.
pub(crate) fn intersect(first: Vec<ResolvedEntity>, rest: &[Vec<ResolvedEntity>]) -> Vec<ResolvedEntity> {
    let others: Vec<HashSet<&str>> = rest
        .iter()
        .map(|set| set.iter().map(|e| e.id.as_str()).collect())
        .collect();
    dedupe(first)
        .into_iter()
        .filter(|e| others.iter().all(|ids| ids.contains(e.id.as_str())))
        .collect()
}

/// Entities present in exactly one set, in first-seen order.
pub(crate) fn exclusive(sets: Vec<Vec<ResolvedEntity>>) -> Vec<ResolvedEntity> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let sets: Vec<Vec<ResolvedEntity>> = sets.into_iter().map(dedupe).collect();
    for set in &sets {
        for e in set {
            *counts.entry(e.id.clone()).or_insert(0) += 1;
        }
    }
    union(sets)
        .into_iter()
        .filter(|e| counts.get(&e.id) == Some(&1))
        .collect()
}

/// Existential post-filter for a condition spanning several variables: an
/// entity survives when some assignment of the other variables satisfies
/// `expr`.
pub(crate) fn cross_filter(
    expr: &WhereExpr,
    variables: &[&str],
    resolved: &mut HashMap<String, Vec<ResolvedEntity>>,
) {
    let sets: Vec<Vec<ResolvedEntity>> = variables
        .iter()
        .map(|v| resolved.get(*v).cloned().unwrap_or_default())
        .collect();
    if sets.iter().any(Vec::is_empty) {
        return;
    }

    let mut kept: Vec<HashSet<usize>> = vec![HashSet::new(); variables.len()];
    let mut cursor = vec![0usize; variables.len()];
    loop {
        let bind = |name: &str| {
            variables
                .iter()
                .position(|v| *v == name)
                .map(|i| &sets[i][cursor[i]])
        };
        if holds(expr, &bind) {
            for (i, idx) in cursor.iter().enumerate() {
                kept[i].insert(*idx);
            }
        }
        // Advance the odometer.
        let mut pos = 0;
        loop {
            if pos == cursor.len() {
                for (i, v) in variables.iter().enumerate() {
                    let survivors = sets[i]
                        .iter()
                        .enumerate()
                        .filter(|(idx, _)| kept[i].contains(idx))
                        .map(|(_, e)| e.clone())
                        .collect();
                    resolved.insert(v.to_string(), survivors);
                }
                return;
            }
            cursor[pos] += 1;
            if cursor[pos] < sets[pos].len() {
                break;
            }
            cursor[pos] = 0;
            pos += 1;
        }
    }
}
