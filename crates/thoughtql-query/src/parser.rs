//! pest-backed parser: query text → raw parse tree.
//!
//! The tree is consumed by [`crate::transform`]; nothing outside this crate
//! sees pest types.

use pest::error::{InputLocation, LineColLocation};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::error::{ParseResult, QueryError};

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct ThoughtQlParser;

/// Parse `text` into the root `query` pair.
pub fn parse_tree(text: &str) -> ParseResult<Pair<'_, Rule>> {
    let mut pairs = ThoughtQlParser::parse(Rule::query, text).map_err(syntax_error)?;
    pairs.next().ok_or(QueryError::Empty)
}

/// Keyword tokens carry no data once the tree shape is known.
pub(crate) fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_match
            | Rule::kw_create
            | Rule::kw_merge
            | Rule::kw_where
            | Rule::kw_set
            | Rule::kw_on
            | Rule::kw_detach
            | Rule::kw_delete
            | Rule::kw_return
            | Rule::kw_and
            | Rule::kw_or
            | Rule::kw_xor
            | Rule::kw_not
            | Rule::kw_is
            | Rule::kw_null
            | Rule::kw_contains
            | Rule::kw_starts_with
            | Rule::kw_ends_with
    )
}

fn syntax_error(err: pest::error::Error<Rule>) -> QueryError {
    let (line, column) = match err.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    let offset = match err.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };
    let renamed = err.renamed_rules(|rule| readable(*rule).to_string());
    QueryError::Syntax {
        line,
        column,
        offset,
        message: renamed.variant.message().into_owned(),
    }
}

fn readable(rule: Rule) -> &'static str {
    match rule {
        Rule::kw_match => "MATCH",
        Rule::kw_create => "CREATE",
        Rule::kw_merge => "MERGE",
        Rule::kw_where => "WHERE",
        Rule::kw_set => "SET",
        Rule::kw_on => "ON",
        Rule::kw_detach => "DETACH",
        Rule::kw_delete => "DELETE",
        Rule::kw_return => "RETURN",
        Rule::kw_and => "AND",
        Rule::kw_or => "OR",
        Rule::kw_xor => "XOR",
        Rule::kw_not => "NOT",
        Rule::kw_is => "IS",
        Rule::kw_null | Rule::null_lit => "NULL",
        Rule::kw_contains => "CONTAINS",
        Rule::kw_starts_with => "STARTS WITH",
        Rule::kw_ends_with => "ENDS WITH",
        Rule::comp_op => "a comparison operator",
        Rule::variable => "a variable",
        Rule::property_key => "a property name",
        Rule::label => "a type label",
        Rule::rel_type => "a relation type (CHILD, PARENT, JUMP, SIBLING)",
        Rule::rel_pattern => "a relationship",
        Rule::left_arrow => "<-",
        Rule::right_arrow => "->",
        Rule::hop_spec => "a hop range",
        Rule::hop_min | Rule::hop_max => "a hop count",
        Rule::node_pattern => "a node pattern",
        Rule::property_map => "a property map",
        Rule::property_entry => "a property entry",
        Rule::string => "a string literal",
        Rule::number => "a number",
        Rule::set_property | Rule::set_type => "a SET assignment",
        Rule::return_item => "a RETURN item",
        Rule::on_create_set => "ON CREATE SET",
        Rule::on_match_set => "ON MATCH SET",
        Rule::set_clause => "SET",
        Rule::return_clause => "RETURN",
        Rule::where_clause => "WHERE",
        Rule::delete_clause => "DELETE",
        Rule::match_clause => "MATCH",
        Rule::create_clause => "CREATE",
        Rule::merge_clause => "MERGE",
        Rule::existence | Rule::comparison => "a condition",
        Rule::EOI => "end of query",
        _ => "a token",
    }
}
