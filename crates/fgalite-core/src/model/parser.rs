use std::collections::HashSet;

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use super::types::{
    AuthorizationModel, RelationDef, RelationReference, RewriteRule, TypeDefinition,
};

#[derive(Parser)]
#[grammar = "model/grammar.pest"]
struct ModelParser;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("mixed operators in relation expression: group them with parentheses")]
    MixedOperators,
    #[error("'but not' supports exactly two operands: base but not subtract")]
    MultipleExclusions,
    #[error("duplicate type: {0}")]
    DuplicateType(String),
    #[error("duplicate relation '{relation}' in type '{type_name}'")]
    DuplicateRelation { type_name: String, relation: String },
}

/// Parses the model DSL into an [`AuthorizationModel`]. The result is not
/// validated; run [`super::validate_model`] before storing it.
pub fn parse_model(input: &str) -> Result<AuthorizationModel, ParseError> {
    let model = ModelParser::parse(Rule::model, input)
        .map_err(|e| ParseError::Syntax(e.to_string()))?
        .next()
        .ok_or_else(|| missing_token("model"))?;

    let mut schema_version = None;
    let mut type_definitions = Vec::new();
    let mut seen_types = HashSet::new();

    for inner in model.into_inner() {
        match inner.as_rule() {
            Rule::schema_version => schema_version = Some(inner.as_str().to_string()),
            Rule::type_def => {
                let type_def = parse_type_def(inner)?;
                if !seen_types.insert(type_def.name.clone()) {
                    return Err(ParseError::DuplicateType(type_def.name));
                }
                type_definitions.push(type_def);
            }
            _ => {}
        }
    }

    Ok(AuthorizationModel {
        schema_version: schema_version.ok_or_else(|| missing_token("schema version"))?,
        type_definitions,
    })
}

fn unexpected_rule(rule: Rule) -> ParseError {
    ParseError::Syntax(format!("unexpected rule: {rule:?}"))
}

fn missing_token(context: &str) -> ParseError {
    ParseError::Syntax(format!("missing token: {context}"))
}

fn parse_type_def(pair: Pair<'_, Rule>) -> Result<TypeDefinition, ParseError> {
    let mut name = None;
    let mut relations: Vec<RelationDef> = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::identifier => name = Some(inner.as_str().to_string()),
            Rule::relation_def => {
                let type_name = name.clone().ok_or_else(|| missing_token("type name"))?;
                let relation = parse_relation_def(inner)?;
                if relations.iter().any(|r| r.name == relation.name) {
                    return Err(ParseError::DuplicateRelation {
                        type_name,
                        relation: relation.name,
                    });
                }
                relations.push(relation);
            }
            _ => {}
        }
    }

    Ok(TypeDefinition {
        name: name.ok_or_else(|| missing_token("type name"))?,
        relations,
    })
}

fn parse_relation_def(pair: Pair<'_, Rule>) -> Result<RelationDef, ParseError> {
    let mut name = None;
    let mut rewrite = None;
    let mut directly_related_user_types = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::identifier => name = Some(inner.as_str().to_string()),
            Rule::expression => {
                rewrite = Some(parse_expression(inner, &mut directly_related_user_types)?)
            }
            _ => {}
        }
    }

    Ok(RelationDef {
        name: name.ok_or_else(|| missing_token("relation name"))?,
        rewrite: rewrite.ok_or_else(|| missing_token("relation expression"))?,
        directly_related_user_types,
    })
}

fn parse_expression(
    pair: Pair<'_, Rule>,
    direct_types: &mut Vec<RelationReference>,
) -> Result<RewriteRule, ParseError> {
    let mut operands = Vec::new();
    let mut operator: Option<Rule> = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::term => operands.push(parse_term(inner, direct_types)?),
            op @ (Rule::or_op | Rule::and_op | Rule::but_not_op) => match operator {
                None => operator = Some(op),
                Some(existing) if existing != op => return Err(ParseError::MixedOperators),
                Some(_) => {}
            },
            other => return Err(unexpected_rule(other)),
        }
    }

    match operator {
        None => operands.pop().ok_or_else(|| missing_token("relation term")),
        Some(Rule::or_op) => Ok(RewriteRule::Union(operands)),
        Some(Rule::and_op) => Ok(RewriteRule::Intersection(operands)),
        Some(Rule::but_not_op) => {
            if operands.len() != 2 {
                return Err(ParseError::MultipleExclusions);
            }
            let mut operands = operands.into_iter();
            let base = operands.next().ok_or_else(|| missing_token("exclusion base"))?;
            let subtract = operands
                .next()
                .ok_or_else(|| missing_token("exclusion subtract"))?;
            Ok(RewriteRule::Exclusion(Box::new(base), Box::new(subtract)))
        }
        Some(other) => Err(unexpected_rule(other)),
    }
}

fn parse_term(
    pair: Pair<'_, Rule>,
    direct_types: &mut Vec<RelationReference>,
) -> Result<RewriteRule, ParseError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| missing_token("relation term content"))?;

    match inner.as_rule() {
        Rule::direct => {
            for type_ref in inner.into_inner() {
                let reference = match type_ref.as_str().split_once('#') {
                    Some((type_name, relation)) => RelationReference::userset(type_name, relation),
                    None => RelationReference::direct(type_ref.as_str()),
                };
                if !direct_types.contains(&reference) {
                    direct_types.push(reference);
                }
            }
            Ok(RewriteRule::Direct)
        }
        Rule::tuple_to_userset => {
            let mut identifiers = inner
                .into_inner()
                .filter(|p| p.as_rule() == Rule::identifier);
            let computed_relation = identifiers
                .next()
                .ok_or_else(|| missing_token("computed relation"))?
                .as_str()
                .to_string();
            let tupleset = identifiers
                .next()
                .ok_or_else(|| missing_token("tupleset relation"))?
                .as_str()
                .to_string();
            Ok(RewriteRule::TupleToUserset {
                tupleset,
                computed_relation,
            })
        }
        Rule::computed => Ok(RewriteRule::ComputedUserset(inner.as_str().trim().to_string())),
        Rule::expression => parse_expression(inner, direct_types),
        other => Err(unexpected_rule(other)),
    }
}
