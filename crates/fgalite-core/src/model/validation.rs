use std::collections::{HashMap, HashSet};

use crate::tuple::Tuple;

use super::types::{AuthorizationModel, RewriteRule, SCHEMA_VERSION, TypeDefinition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLimits {
    pub max_types: usize,
    pub max_relations_per_type: usize,
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self {
            max_types: 50,
            max_relations_per_type: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("model declares no types")]
    EmptyModel,
    #[error("unsupported schema version '{0}'")]
    UnsupportedSchemaVersion(String),
    #[error("too many types: {count} exceeds limit of {limit}")]
    TooManyTypes { count: usize, limit: usize },
    #[error("too many relations in type '{type_name}': {count} exceeds limit of {limit}")]
    TooManyRelations {
        type_name: String,
        count: usize,
        limit: usize,
    },
    #[error("duplicate type: {0}")]
    DuplicateType(String),
    #[error("duplicate relation '{relation}' in type '{type_name}'")]
    DuplicateRelation { type_name: String, relation: String },
    #[error("relation '{type_name}#{relation}' references undefined relation '{referenced}'")]
    UndefinedRelation {
        type_name: String,
        relation: String,
        referenced: String,
    },
    #[error("relation '{type_name}#{relation}' allows undefined user type '{reference}'")]
    UndefinedUserType {
        type_name: String,
        relation: String,
        reference: String,
    },
    #[error("relation '{type_name}#{relation}' is directly assignable but declares no user types")]
    DirectWithoutUserTypes { type_name: String, relation: String },
    #[error("relation '{type_name}#{relation}' declares user types but is not directly assignable")]
    UserTypesWithoutDirect { type_name: String, relation: String },
    #[error(
        "relation '{type_name}#{relation}': '{computed_relation}' from '{tupleset}' is not defined on any type '{tupleset}' can hold"
    )]
    UndefinedTuplesetRelation {
        type_name: String,
        relation: String,
        tupleset: String,
        computed_relation: String,
    },
    #[error("relation '{type_name}#{relation}' has an empty union or intersection")]
    EmptyOperands { type_name: String, relation: String },
    #[error("cycle in type '{type_name}': {}", .path.join(" -> "))]
    CyclicRelation { type_name: String, path: Vec<String> },
}

/// Checks a model before it is stored. Every problem found is reported.
pub fn validate_model(
    model: &AuthorizationModel,
    limits: &ModelLimits,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if model.schema_version != SCHEMA_VERSION {
        errors.push(ValidationError::UnsupportedSchemaVersion(
            model.schema_version.clone(),
        ));
    }

    if model.type_definitions.is_empty() {
        errors.push(ValidationError::EmptyModel);
    }

    if model.type_definitions.len() > limits.max_types {
        errors.push(ValidationError::TooManyTypes {
            count: model.type_definitions.len(),
            limit: limits.max_types,
        });
    }

    let mut seen_types = HashSet::new();
    for type_def in &model.type_definitions {
        if !seen_types.insert(type_def.name.as_str()) {
            errors.push(ValidationError::DuplicateType(type_def.name.clone()));
        }

        if type_def.relations.len() > limits.max_relations_per_type {
            errors.push(ValidationError::TooManyRelations {
                type_name: type_def.name.clone(),
                count: type_def.relations.len(),
                limit: limits.max_relations_per_type,
            });
        }

        let mut seen_relations = HashSet::new();
        for relation in &type_def.relations {
            if !seen_relations.insert(relation.name.as_str()) {
                errors.push(ValidationError::DuplicateRelation {
                    type_name: type_def.name.clone(),
                    relation: relation.name.clone(),
                });
            }
        }

        validate_relations(model, type_def, &mut errors);

        if let Some(path) = find_cycle(type_def) {
            errors.push(ValidationError::CyclicRelation {
                type_name: type_def.name.clone(),
                path,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_relations(
    model: &AuthorizationModel,
    type_def: &TypeDefinition,
    errors: &mut Vec<ValidationError>,
) {
    for relation in &type_def.relations {
        let has_direct = relation.rewrite.has_direct();
        let has_types = !relation.directly_related_user_types.is_empty();
        if has_direct && !has_types {
            errors.push(ValidationError::DirectWithoutUserTypes {
                type_name: type_def.name.clone(),
                relation: relation.name.clone(),
            });
        }
        if has_types && !has_direct {
            errors.push(ValidationError::UserTypesWithoutDirect {
                type_name: type_def.name.clone(),
                relation: relation.name.clone(),
            });
        }

        for reference in &relation.directly_related_user_types {
            let defined = match reference.relation {
                Some(ref rel) => model.get_relation(&reference.type_name, rel).is_some(),
                None => model.get_type(&reference.type_name).is_some(),
            };
            if !defined {
                errors.push(ValidationError::UndefinedUserType {
                    type_name: type_def.name.clone(),
                    relation: relation.name.clone(),
                    reference: reference.to_string(),
                });
            }
        }

        let mut check = RuleCheck {
            model,
            type_def,
            relation: &relation.name,
            errors: &mut *errors,
        };
        check.visit(&relation.rewrite);
    }
}

struct RuleCheck<'a> {
    model: &'a AuthorizationModel,
    type_def: &'a TypeDefinition,
    relation: &'a str,
    errors: &'a mut Vec<ValidationError>,
}

impl RuleCheck<'_> {
    fn visit(&mut self, rule: &RewriteRule) {
        match rule {
            RewriteRule::Direct => {}
            RewriteRule::ComputedUserset(referenced) => self.require_local(referenced),
            RewriteRule::Union(children) | RewriteRule::Intersection(children) => {
                if children.is_empty() {
                    self.errors.push(ValidationError::EmptyOperands {
                        type_name: self.type_def.name.clone(),
                        relation: self.relation.to_string(),
                    });
                }
                for child in children {
                    self.visit(child);
                }
            }
            RewriteRule::Exclusion(base, subtract) => {
                self.visit(base);
                self.visit(subtract);
            }
            RewriteRule::TupleToUserset {
                tupleset,
                computed_relation,
            } => {
                let Some(tupleset_def) = self.type_def.get_relation(tupleset) else {
                    self.require_local(tupleset);
                    return;
                };
                let reachable = tupleset_def
                    .directly_related_user_types
                    .iter()
                    .filter(|r| r.relation.is_none())
                    .any(|r| {
                        self.model
                            .get_relation(&r.type_name, computed_relation)
                            .is_some()
                    });
                if !reachable {
                    self.errors
                        .push(ValidationError::UndefinedTuplesetRelation {
                            type_name: self.type_def.name.clone(),
                            relation: self.relation.to_string(),
                            tupleset: tupleset.clone(),
                            computed_relation: computed_relation.clone(),
                        });
                }
            }
        }
    }

    fn require_local(&mut self, referenced: &str) {
        if self.type_def.get_relation(referenced).is_none() {
            self.errors.push(ValidationError::UndefinedRelation {
                type_name: self.type_def.name.clone(),
                relation: self.relation.to_string(),
                referenced: referenced.to_string(),
            });
        }
    }
}

/// Relations on the same object that `rule` evaluates. Tuple-to-userset hops
/// to other objects and does not count.
fn local_references<'a>(rule: &'a RewriteRule, out: &mut Vec<&'a str>) {
    match rule {
        RewriteRule::Direct | RewriteRule::TupleToUserset { .. } => {}
        RewriteRule::ComputedUserset(name) => out.push(name),
        RewriteRule::Union(children) | RewriteRule::Intersection(children) => {
            for child in children {
                local_references(child, out);
            }
        }
        RewriteRule::Exclusion(base, subtract) => {
            local_references(base, out);
            local_references(subtract, out);
        }
    }
}

fn find_cycle(type_def: &TypeDefinition) -> Option<Vec<String>> {
    let graph: HashMap<&str, Vec<&str>> = type_def
        .relations
        .iter()
        .map(|r| {
            let mut refs = Vec::new();
            local_references(&r.rewrite, &mut refs);
            (r.name.as_str(), refs)
        })
        .collect();

    let mut finished = HashSet::new();
    for relation in &type_def.relations {
        let mut path = Vec::new();
        if let Some(cycle) = visit(&relation.name, &graph, &mut path, &mut finished) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    path: &mut Vec<&'a str>,
    finished: &mut HashSet<&'a str>,
) -> Option<Vec<String>> {
    if let Some(start) = path.iter().position(|n| *n == node) {
        let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
        cycle.push(node.to_string());
        return Some(cycle);
    }
    if finished.contains(node) {
        return None;
    }

    path.push(node);
    if let Some(neighbors) = graph.get(node) {
        for next in neighbors {
            if let Some(cycle) = visit(next, graph, path, finished) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    finished.insert(node);
    None
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TupleValidationError {
    #[error("type '{0}' is not defined in the authorization model")]
    UndefinedType(String),
    #[error("relation '{relation}' is not defined on type '{type_name}'")]
    UndefinedRelation { type_name: String, relation: String },
    #[error("user '{user}' is not allowed on relation '{type_name}#{relation}'")]
    DisallowedUserType {
        type_name: String,
        relation: String,
        user: String,
    },
}

/// Checks that a tuple to be written fits the model: the object type and
/// relation exist and the user's type is one the relation accepts.
pub fn validate_tuple(
    model: &AuthorizationModel,
    tuple: &Tuple,
) -> Result<(), TupleValidationError> {
    let type_def = model
        .get_type(&tuple.object.object_type)
        .ok_or_else(|| TupleValidationError::UndefinedType(tuple.object.object_type.clone()))?;
    let relation = type_def.get_relation(&tuple.relation).ok_or_else(|| {
        TupleValidationError::UndefinedRelation {
            type_name: type_def.name.clone(),
            relation: tuple.relation.clone(),
        }
    })?;
    if !relation.allows_user(&tuple.subject) {
        return Err(TupleValidationError::DisallowedUserType {
            type_name: type_def.name.clone(),
            relation: relation.name.clone(),
            user: tuple.subject.to_string(),
        });
    }
    Ok(())
}
