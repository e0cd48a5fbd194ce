//! Semantic transformer: parse tree → validated [`Query`] IR.
//!
//! Canonicalizes property names, merges repeated node variables across
//! clauses, checks hop bounds and variable scoping. Everything rejected here
//! is rejected before a single store call is made.

use pest::iterators::Pair;
use std::collections::BTreeSet;

use crate::error::{ParseResult, QueryError};
use crate::ir::{
    Action, Clause, CompareOp, Comparison, DeleteClause, Existence, NodePattern, Property, Query,
    RelPattern, Relation, ReturnField, SetClause, SetItem, WhereExpr, MAX_HOP_DEPTH,
};
use crate::parser::{is_keyword, Rule};

/// Build the IR from the root `query` pair.
pub fn build(root: Pair<'_, Rule>) -> ParseResult<Query> {
    let statement = root
        .into_inner()
        .find(|p| p.as_rule() != Rule::EOI)
        .ok_or(QueryError::Empty)?;
    let action = match statement.as_rule() {
        Rule::match_query => Action::Match,
        Rule::create_query => Action::Create,
        Rule::match_create_query => Action::MatchCreate,
        Rule::merge_query => Action::Merge,
        Rule::match_merge_query => Action::MatchMerge,
        Rule::match_delete_query => Action::MatchDelete,
        other => return Err(unexpected(other, "statement")),
    };

    let mut builder = Builder::default();
    for clause in significant(statement) {
        match clause.as_rule() {
            Rule::match_clause => builder.patterns(clause, Clause::Match)?,
            Rule::create_clause => builder.patterns(clause, Clause::Create)?,
            Rule::merge_clause => builder.patterns(clause, Clause::Merge)?,
            Rule::where_clause => {
                let expr = first(clause, "WHERE")?;
                builder.where_parts.push(or_expr(expr)?);
            }
            Rule::set_clause => builder.set_items.extend(set_items(clause)?),
            Rule::on_create_set => builder.on_create.extend(set_items(clause)?),
            Rule::on_match_set => builder.on_match.extend(set_items(clause)?),
            Rule::delete_clause => builder.delete = Some(delete_clause(clause)),
            Rule::return_clause => builder.returns = return_clause(clause)?,
            other => return Err(unexpected(other, "query")),
        }
    }
    builder.finish(action)
}

// ============================================================================
// Pattern collection
// ============================================================================

#[derive(Default)]
struct Builder {
    nodes: Vec<NodePattern>,
    relationships: Vec<RelPattern>,
    where_parts: Vec<WhereExpr>,
    set_items: Vec<SetItem>,
    on_create: Vec<SetItem>,
    on_match: Vec<SetItem>,
    delete: Option<DeleteClause>,
    returns: Vec<ReturnField>,
    anonymous: usize,
}

impl Builder {
    fn patterns(&mut self, clause: Pair<'_, Rule>, origin: Clause) -> ParseResult<()> {
        for path in significant(clause) {
            let mut left: Option<String> = None;
            let mut pending: Option<Pair<'_, Rule>> = None;
            for element in path.into_inner() {
                match element.as_rule() {
                    Rule::node_pattern => {
                        let var = self.node(element, origin)?;
                        if let (Some(source), Some(rel)) = (left.as_deref(), pending.take()) {
                            self.relationship(rel, origin, source, &var)?;
                        }
                        left = Some(var);
                    }
                    Rule::rel_pattern => pending = Some(element),
                    other => return Err(unexpected(other, "pattern")),
                }
            }
        }
        Ok(())
    }

    fn node(&mut self, pair: Pair<'_, Rule>, origin: Clause) -> ParseResult<String> {
        let mut variable = None;
        let mut label = None;
        let mut name = None;
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::variable => variable = Some(part.as_str().to_string()),
                Rule::label => label = Some(label_text(part.as_str())),
                Rule::property_map => name = inline_name(part)?,
                other => return Err(unexpected(other, "node pattern")),
            }
        }

        let (variable, anonymous) = match variable {
            Some(v) => (v, false),
            None => {
                self.anonymous += 1;
                (format!("_anon{}", self.anonymous), true)
            }
        };

        if let Some(index) = self.nodes.iter().position(|n| n.variable == variable) {
            let existing = &mut self.nodes[index];
            merge_field(&variable, "label", &mut existing.label, label)?;
            merge_field(&variable, "name", &mut existing.name, name)?;
            existing.introduced_in.insert(origin);
        } else {
            if self.relationships.iter().any(|r| r.variable.as_deref() == Some(&variable)) {
                return Err(QueryError::validation(format!(
                    "Variable `{variable}` is already bound to a relationship"
                )));
            }
            self.nodes.push(NodePattern {
                variable: variable.clone(),
                label,
                name,
                introduced_in: BTreeSet::from([origin]),
                anonymous,
            });
        }
        Ok(variable)
    }

    fn relationship(
        &mut self,
        pair: Pair<'_, Rule>,
        origin: Clause,
        left: &str,
        right: &str,
    ) -> ParseResult<()> {
        let mut reversed = false;
        let mut variable = None;
        let mut rel_type = None;
        let mut hops = (1, 1);
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::left_arrow => reversed = true,
                Rule::right_arrow => {}
                Rule::variable => variable = Some(part.as_str().to_string()),
                Rule::rel_type => {
                    let relation: Relation = part
                        .as_str()
                        .parse()
                        .map_err(|e: thoughtql_store::UnknownRelation| {
                            QueryError::validation(e.to_string())
                        })?;
                    rel_type = Some(relation);
                }
                Rule::hop_spec => hops = hop_bounds(part)?,
                other => return Err(unexpected(other, "relationship")),
            }
        }
        let rel_type = rel_type
            .ok_or_else(|| QueryError::validation("Relationship is missing a relation type"))?;

        if let Some(v) = &variable {
            if self.nodes.iter().any(|n| &n.variable == v)
                || self.relationships.iter().any(|r| r.variable.as_ref() == Some(v))
            {
                return Err(QueryError::validation(format!(
                    "Relationship variable `{v}` is already in use"
                )));
            }
        }

        let (source, target) = if reversed { (right, left) } else { (left, right) };
        let (min_hops, max_hops) = hops;
        let rel = RelPattern {
            variable,
            rel_type,
            source: source.to_string(),
            target: target.to_string(),
            min_hops,
            max_hops,
            clause: origin,
        };
        if rel.is_variable_length() && origin != Clause::Match {
            return Err(QueryError::validation(format!(
                "Variable-length relationships are only supported in MATCH, not in {}",
                clause_name(origin)
            )));
        }
        self.relationships.push(rel);
        Ok(())
    }

    fn finish(self, action: Action) -> ParseResult<Query> {
        let match_variables: BTreeSet<String> = self
            .nodes
            .iter()
            .filter(|n| n.introduced_in.contains(&Clause::Match))
            .map(|n| n.variable.clone())
            .collect();
        let mutation_variables: BTreeSet<String> = self
            .nodes
            .iter()
            .filter(|n| !n.introduced_in.contains(&Clause::Match))
            .map(|n| n.variable.clone())
            .collect();

        let where_clause = match self.where_parts.len() {
            0 => None,
            1 => self.where_parts.into_iter().next(),
            _ => Some(and_of(self.where_parts)),
        };

        let non_empty = |items: Vec<SetItem>| (!items.is_empty()).then_some(SetClause { items });

        let query = Query {
            action,
            nodes: self.nodes,
            relationships: self.relationships,
            where_clause,
            set_clause: non_empty(self.set_items),
            delete_clause: self.delete,
            on_create_set: non_empty(self.on_create),
            on_match_set: non_empty(self.on_match),
            return_fields: self.returns,
            match_variables,
            mutation_variables,
        };
        validate(&query)?;
        Ok(query)
    }
}

fn merge_field(
    variable: &str,
    field: &str,
    slot: &mut Option<String>,
    incoming: Option<String>,
) -> ParseResult<()> {
    match (slot.as_deref(), incoming) {
        (Some(current), Some(new)) if current != new => Err(QueryError::validation(format!(
            "Variable `{variable}` is given conflicting {field}s: \"{current}\" and \"{new}\""
        ))),
        (None, Some(new)) => {
            *slot = Some(new);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn inline_name(map: Pair<'_, Rule>) -> ParseResult<Option<String>> {
    let mut name = None;
    for entry in map.into_inner() {
        let mut parts = entry.into_inner();
        let key = parts
            .next()
            .ok_or_else(|| QueryError::validation("Property entry is missing a key"))?;
        let value = parts
            .next()
            .ok_or_else(|| QueryError::validation("Property entry is missing a value"))?;
        if Property::canonical(key.as_str()) != Some(Property::Name) {
            return Err(QueryError::validation(format!(
                "Only `name` is supported in inline property maps (got `{}`); \
                 use WHERE for other conditions",
                key.as_str()
            )));
        }
        match literal(value)? {
            Some(v) => name = Some(v),
            None => return Err(QueryError::validation("Inline `name` cannot be null")),
        }
    }
    Ok(name)
}

fn hop_bounds(spec: Pair<'_, Rule>) -> ParseResult<(u32, u32)> {
    let text = spec.as_str().to_string();
    let mut min = None;
    let mut max = None;
    for part in spec.into_inner() {
        let value: u32 = part.as_str().parse().map_err(|_| {
            QueryError::validation(format!("Invalid hop count in `{text}`"))
        })?;
        match part.as_rule() {
            Rule::hop_min => min = Some(value),
            Rule::hop_max => max = Some(value),
            other => return Err(unexpected(other, "hop range")),
        }
    }
    let min = min.ok_or_else(|| QueryError::validation(format!("Invalid hop range `{text}`")))?;
    let max = max.unwrap_or(min);
    if min < 1 {
        return Err(QueryError::validation(format!(
            "Invalid hop range `{text}`: minimum hops must be at least 1"
        )));
    }
    if max > MAX_HOP_DEPTH {
        return Err(QueryError::validation(format!(
            "Invalid hop range `{text}`: maximum hops cannot exceed {MAX_HOP_DEPTH}"
        )));
    }
    if min > max {
        return Err(QueryError::validation(format!(
            "Invalid hop range `{text}`: minimum hops ({min}) exceeds maximum ({max})"
        )));
    }
    Ok((min, max))
}

// ============================================================================
// WHERE expressions
// ============================================================================

fn or_expr(pair: Pair<'_, Rule>) -> ParseResult<WhereExpr> {
    let mut operands = Vec::new();
    for child in significant(pair) {
        match xor_expr(child)? {
            WhereExpr::Or(inner) => operands.extend(inner),
            other => operands.push(other),
        }
    }
    Ok(collapse(operands, WhereExpr::Or))
}

fn xor_expr(pair: Pair<'_, Rule>) -> ParseResult<WhereExpr> {
    let operands = significant(pair)
        .map(and_expr)
        .collect::<ParseResult<Vec<_>>>()?;
    Ok(collapse(operands, WhereExpr::Xor))
}

fn and_expr(pair: Pair<'_, Rule>) -> ParseResult<WhereExpr> {
    let operands = significant(pair)
        .map(not_expr)
        .collect::<ParseResult<Vec<_>>>()?;
    Ok(and_of(operands))
}

fn not_expr(pair: Pair<'_, Rule>) -> ParseResult<WhereExpr> {
    let mut negate = false;
    let mut body = None;
    for child in pair.into_inner() {
        match child.as_rule() {
            Rule::kw_not => negate = true,
            Rule::not_expr => body = Some(not_expr(child)?),
            Rule::or_expr => body = Some(or_expr(child)?),
            Rule::existence => body = Some(existence(child)?),
            Rule::comparison => body = Some(comparison(child)?),
            other => return Err(unexpected(other, "condition")),
        }
    }
    let body = body.ok_or_else(|| QueryError::validation("Empty condition"))?;
    Ok(match (negate, body) {
        (true, WhereExpr::Not(inner)) => *inner,
        (true, other) => WhereExpr::Not(Box::new(other)),
        (false, other) => other,
    })
}

fn existence(pair: Pair<'_, Rule>) -> ParseResult<WhereExpr> {
    let mut variable = String::new();
    let mut property = None;
    let mut not_null = false;
    for child in pair.into_inner() {
        match child.as_rule() {
            Rule::variable => variable = child.as_str().to_string(),
            Rule::property_key => property = Some(queryable(child.as_str())?),
            Rule::kw_not => not_null = true,
            Rule::kw_is | Rule::kw_null => {}
            other => return Err(unexpected(other, "IS NULL check")),
        }
    }
    let property =
        property.ok_or_else(|| QueryError::validation("IS NULL check is missing a property"))?;
    Ok(WhereExpr::Existence(Existence {
        variable,
        property,
        negated: !not_null,
    }))
}

fn comparison(pair: Pair<'_, Rule>) -> ParseResult<WhereExpr> {
    let mut variable = String::new();
    let mut field = None;
    let mut op = None;
    let mut value = None;
    for child in pair.into_inner() {
        match child.as_rule() {
            Rule::variable => variable = child.as_str().to_string(),
            Rule::property_key => {
                let property = queryable(child.as_str())?;
                if property != Property::Name {
                    return Err(QueryError::validation(format!(
                        "Comparisons are only supported on `name` (got `{property}`); \
                         use IS NULL / IS NOT NULL for other properties"
                    )));
                }
                field = Some(property);
            }
            Rule::comp_op => op = Some(compare_op(child.as_str())?),
            Rule::string | Rule::number | Rule::null_lit => {
                value = Some(literal(child)?.ok_or_else(|| {
                    QueryError::validation(format!(
                        "Cannot compare `{variable}.name` with null; use IS NULL instead"
                    ))
                })?);
            }
            other => return Err(unexpected(other, "comparison")),
        }
    }
    match (field, op, value) {
        (Some(_), Some(op), Some(value)) if op != CompareOp::Eq && value.trim().is_empty() => {
            Err(QueryError::validation(format!(
                "`{variable}.name {op}` needs a non-empty string to search for"
            )))
        }
        (Some(field), Some(op), Some(value)) => Ok(WhereExpr::Comparison(Comparison {
            variable,
            field,
            op,
            value,
        })),
        _ => Err(QueryError::validation("Incomplete comparison")),
    }
}

fn compare_op(text: &str) -> ParseResult<CompareOp> {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();
    match normalized.as_str() {
        "=" => Ok(CompareOp::Eq),
        "=~" => Ok(CompareOp::Similar),
        "CONTAINS" => Ok(CompareOp::Contains),
        "STARTS WITH" => Ok(CompareOp::StartsWith),
        "ENDS WITH" => Ok(CompareOp::EndsWith),
        _ => Err(QueryError::validation(format!("Unknown operator `{text}`"))),
    }
}

fn and_of(operands: Vec<WhereExpr>) -> WhereExpr {
    let mut flat = Vec::with_capacity(operands.len());
    for operand in operands {
        match operand {
            WhereExpr::And(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    collapse(flat, WhereExpr::And)
}

fn collapse(mut operands: Vec<WhereExpr>, wrap: fn(Vec<WhereExpr>) -> WhereExpr) -> WhereExpr {
    if operands.len() == 1 {
        if let Some(only) = operands.pop() {
            return only;
        }
    }
    wrap(operands)
}

// ============================================================================
// SET / DELETE / RETURN
// ============================================================================

fn set_items(clause: Pair<'_, Rule>) -> ParseResult<Vec<SetItem>> {
    significant(clause).map(set_item).collect()
}

fn set_item(pair: Pair<'_, Rule>) -> ParseResult<SetItem> {
    let rule = pair.as_rule();
    let mut parts = pair.into_inner();
    let variable = parts
        .next()
        .map(|p| p.as_str().to_string())
        .ok_or_else(|| QueryError::validation("SET item is missing a variable"))?;
    match rule {
        Rule::set_type => {
            let type_name = parts
                .next()
                .map(|p| label_text(p.as_str()))
                .ok_or_else(|| QueryError::validation("SET is missing a type name"))?;
            Ok(SetItem::Type {
                variable,
                type_name,
            })
        }
        Rule::set_property => {
            let key = parts
                .next()
                .ok_or_else(|| QueryError::validation("SET is missing a property"))?;
            let property = settable(key.as_str())?;
            let value_pair = parts
                .next()
                .ok_or_else(|| QueryError::validation("SET is missing a value"))?;
            let value = literal(value_pair)?;
            if property == Property::Name && value.is_none() {
                return Err(QueryError::validation(format!(
                    "`{variable}.name` cannot be set to null"
                )));
            }
            Ok(SetItem::Property {
                variable,
                property,
                value,
            })
        }
        other => Err(unexpected(other, "SET")),
    }
}

fn delete_clause(clause: Pair<'_, Rule>) -> DeleteClause {
    let mut detach = false;
    let mut variables = Vec::new();
    for part in clause.into_inner() {
        match part.as_rule() {
            Rule::kw_detach => detach = true,
            Rule::variable => variables.push(part.as_str().to_string()),
            _ => {}
        }
    }
    DeleteClause { variables, detach }
}

fn return_clause(clause: Pair<'_, Rule>) -> ParseResult<Vec<ReturnField>> {
    significant(clause)
        .map(|item| {
            let mut parts = item.into_inner();
            let variable = parts
                .next()
                .map(|p| p.as_str().to_string())
                .ok_or_else(|| QueryError::validation("RETURN item is missing a variable"))?;
            let field = match parts.next() {
                None => None,
                Some(key) => {
                    let property = queryable(key.as_str())?;
                    if !matches!(property, Property::Name | Property::Id) {
                        return Err(QueryError::validation(format!(
                            "RETURN {variable}.{property} is not supported; \
                             project `name` or `id`, or return the whole entity"
                        )));
                    }
                    Some(property)
                }
            };
            Ok(ReturnField { variable, field })
        })
        .collect()
}

// ============================================================================
// Validation
// ============================================================================

fn validate(query: &Query) -> ParseResult<()> {
    let is_node = |v: &str| query.node(v).is_some();
    let is_merge_only = |v: &str| {
        query
            .node(v)
            .is_some_and(|n| n.introduced_in.contains(&Clause::Merge) && !query.is_match_variable(v))
    };

    if let Some(expr) = &query.where_clause {
        check_single_variable_disjunctions(expr)?;
        for v in expr.variables() {
            if !query.is_match_variable(v) {
                return Err(QueryError::validation(format!(
                    "WHERE references `{v}`, which is not bound by MATCH"
                )));
            }
        }
    }

    if let Some(set) = &query.set_clause {
        for item in &set.items {
            if !query.is_match_variable(item.variable()) {
                return Err(QueryError::validation(format!(
                    "SET references `{}`, which is not bound by MATCH",
                    item.variable()
                )));
            }
        }
    }

    for (clause, name) in [
        (&query.on_create_set, "ON CREATE SET"),
        (&query.on_match_set, "ON MATCH SET"),
    ] {
        for item in clause.iter().flat_map(|c| c.items.iter()) {
            if !is_merge_only(item.variable()) {
                return Err(QueryError::validation(format!(
                    "{name} references `{}`, which is not introduced by MERGE",
                    item.variable()
                )));
            }
        }
    }

    if let Some(delete) = &query.delete_clause {
        for v in &delete.variables {
            if !query.is_match_variable(v) {
                return Err(QueryError::validation(format!(
                    "DELETE references `{v}`, which is not bound by MATCH"
                )));
            }
        }
    }

    for field in &query.return_fields {
        if !is_node(&field.variable) {
            return Err(QueryError::validation(format!(
                "RETURN references `{}`, which is not a node variable in this query",
                field.variable
            )));
        }
    }

    Ok(())
}

fn check_single_variable_disjunctions(expr: &WhereExpr) -> ParseResult<()> {
    match expr {
        WhereExpr::Comparison(_) | WhereExpr::Existence(_) => Ok(()),
        WhereExpr::Not(inner) => check_single_variable_disjunctions(inner),
        WhereExpr::And(xs) => xs.iter().try_for_each(check_single_variable_disjunctions),
        WhereExpr::Or(xs) | WhereExpr::Xor(xs) => {
            let vars = expr.variables();
            if vars.len() > 1 {
                let op = if matches!(expr, WhereExpr::Or(_)) { "OR" } else { "XOR" };
                return Err(QueryError::validation(format!(
                    "{op} conditions must reference a single variable (found {})",
                    vars.into_iter().collect::<Vec<_>>().join(", ")
                )));
            }
            xs.iter().try_for_each(check_single_variable_disjunctions)
        }
    }
}

// ============================================================================
// Token helpers
// ============================================================================

fn significant<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn first<'i>(pair: Pair<'i, Rule>, context: &str) -> ParseResult<Pair<'i, Rule>> {
    significant(pair)
        .next()
        .ok_or_else(|| QueryError::validation(format!("Empty {context} clause")))
}

fn queryable(key: &str) -> ParseResult<Property> {
    Property::canonical(key).ok_or_else(|| {
        QueryError::validation(format!(
            "Unknown property `{key}`. Valid properties: {}",
            Property::list(&Property::QUERYABLE)
        ))
    })
}

fn settable(key: &str) -> ParseResult<Property> {
    match Property::canonical(key) {
        Some(p) if p.is_settable() => Ok(p),
        _ => Err(QueryError::validation(format!(
            "Property `{key}` cannot be SET. Settable properties: {}",
            Property::list(&Property::SETTABLE)
        ))),
    }
}

/// String/number literal as text; `None` for `null`.
fn literal(pair: Pair<'_, Rule>) -> ParseResult<Option<String>> {
    match pair.as_rule() {
        Rule::null_lit => Ok(None),
        Rule::number => Ok(Some(pair.as_str().to_string())),
        Rule::string => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Some(unescape(raw)))
        }
        other => Err(unexpected(other, "literal")),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn label_text(raw: &str) -> String {
    raw.trim_matches('`').to_string()
}

fn clause_name(clause: Clause) -> &'static str {
    match clause {
        Clause::Match => "MATCH",
        Clause::Create => "CREATE",
        Clause::Merge => "MERGE",
    }
}

fn unexpected(rule: Rule, context: &str) -> QueryError {
    QueryError::validation(format!("Unexpected {rule:?} in {context}"))
}
