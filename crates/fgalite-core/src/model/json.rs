//! JSON wire form of an authorization model (OpenFGA schema 1.1).

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use super::types::{
    AuthorizationModel, RelationDef, RelationReference, RewriteRule, TypeDefinition,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsonModelError {
    #[error("malformed model JSON: {0}")]
    Malformed(String),
    #[error("relation '{type_name}#{relation}' must set exactly one rewrite operator")]
    InvalidUserset { type_name: String, relation: String },
    #[error("metadata for '{type_name}#{relation}' names a relation the type does not define")]
    UnknownMetadataRelation { type_name: String, relation: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelJson {
    pub schema_version: String,
    #[serde(default)]
    pub type_definitions: Vec<TypeDefinitionJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinitionJson {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "unique_keys"
    )]
    pub relations: BTreeMap<String, UsersetJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataJson>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataJson {
    #[serde(default, deserialize_with = "unique_keys")]
    pub relations: BTreeMap<String, RelationMetadataJson>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationMetadataJson {
    #[serde(default)]
    pub directly_related_user_types: Vec<RelationReferenceJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationReferenceJson {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsersetJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub this: Option<ThisJson>,
    #[serde(
        default,
        rename = "computedUserset",
        skip_serializing_if = "Option::is_none"
    )]
    pub computed_userset: Option<ObjectRelationJson>,
    #[serde(
        default,
        rename = "tupleToUserset",
        skip_serializing_if = "Option::is_none"
    )]
    pub tuple_to_userset: Option<TupleToUsersetJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub union: Option<UsersetsJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intersection: Option<UsersetsJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difference: Option<DifferenceJson>,
}

/// Serialized as `{}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThisJson {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRelationJson {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub object: String,
    #[serde(default)]
    pub relation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleToUsersetJson {
    pub tupleset: ObjectRelationJson,
    #[serde(rename = "computedUserset")]
    pub computed_userset: ObjectRelationJson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersetsJson {
    #[serde(default)]
    pub child: Vec<UsersetJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifferenceJson {
    pub base: Box<UsersetJson>,
    pub subtract: Box<UsersetJson>,
}

/// Deserializes a JSON object into a map, failing on a repeated key instead
/// of keeping the last value.
fn unique_keys<'de, D, V>(deserializer: D) -> Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct UniqueKeys<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for UniqueKeys<V> {
        type Value = BTreeMap<String, V>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of relation names")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut map = BTreeMap::new();
            while let Some((key, value)) = access.next_entry::<String, V>()? {
                if map.contains_key(&key) {
                    return Err(de::Error::custom(format!("duplicate relation '{key}'")));
                }
                map.insert(key, value);
            }
            Ok(map)
        }
    }

    deserializer.deserialize_map(UniqueKeys(PhantomData))
}

pub fn model_from_json(input: &str) -> Result<AuthorizationModel, JsonModelError> {
    let wire: ModelJson =
        serde_json::from_str(input).map_err(|e| JsonModelError::Malformed(e.to_string()))?;
    AuthorizationModel::try_from(wire)
}

pub fn model_from_value(value: serde_json::Value) -> Result<AuthorizationModel, JsonModelError> {
    let wire: ModelJson =
        serde_json::from_value(value).map_err(|e| JsonModelError::Malformed(e.to_string()))?;
    AuthorizationModel::try_from(wire)
}

impl TryFrom<ModelJson> for AuthorizationModel {
    type Error = JsonModelError;

    fn try_from(wire: ModelJson) -> Result<Self, Self::Error> {
        let type_definitions = wire
            .type_definitions
            .into_iter()
            .map(type_from_json)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AuthorizationModel {
            schema_version: wire.schema_version,
            type_definitions,
        })
    }
}

fn type_from_json(wire: TypeDefinitionJson) -> Result<TypeDefinition, JsonModelError> {
    let mut metadata = wire.metadata.unwrap_or_default().relations;
    let mut relations = Vec::with_capacity(wire.relations.len());

    for (name, userset) in wire.relations {
        let invalid = || JsonModelError::InvalidUserset {
            type_name: wire.type_name.clone(),
            relation: name.clone(),
        };
        let rewrite = rule_from_json(userset).ok_or_else(invalid)?;
        let directly_related_user_types = metadata
            .remove(&name)
            .map(|m| {
                m.directly_related_user_types
                    .into_iter()
                    .map(|r| RelationReference {
                        type_name: r.type_name,
                        relation: r.relation.filter(|rel| !rel.is_empty()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        relations.push(RelationDef {
            name,
            rewrite,
            directly_related_user_types,
        });
    }

    if let Some(relation) = metadata.into_keys().next() {
        return Err(JsonModelError::UnknownMetadataRelation {
            type_name: wire.type_name,
            relation,
        });
    }

    Ok(TypeDefinition {
        name: wire.type_name,
        relations,
    })
}

/// `None` when the userset sets zero or several operators, or names an
/// empty relation.
fn rule_from_json(userset: UsersetJson) -> Option<RewriteRule> {
    let UsersetJson {
        this,
        computed_userset,
        tuple_to_userset,
        union,
        intersection,
        difference,
    } = userset;

    let set = [
        this.is_some(),
        computed_userset.is_some(),
        tuple_to_userset.is_some(),
        union.is_some(),
        intersection.is_some(),
        difference.is_some(),
    ];
    if set.iter().filter(|s| **s).count() != 1 {
        return None;
    }

    if this.is_some() {
        return Some(RewriteRule::Direct);
    }
    if let Some(computed) = computed_userset {
        return non_empty(computed.relation).map(RewriteRule::ComputedUserset);
    }
    if let Some(ttu) = tuple_to_userset {
        return Some(RewriteRule::TupleToUserset {
            tupleset: non_empty(ttu.tupleset.relation)?,
            computed_relation: non_empty(ttu.computed_userset.relation)?,
        });
    }
    if let Some(union) = union {
        return children_from_json(union).map(RewriteRule::Union);
    }
    if let Some(intersection) = intersection {
        return children_from_json(intersection).map(RewriteRule::Intersection);
    }
    let difference = difference?;
    Some(RewriteRule::Exclusion(
        Box::new(rule_from_json(*difference.base)?),
        Box::new(rule_from_json(*difference.subtract)?),
    ))
}

fn children_from_json(usersets: UsersetsJson) -> Option<Vec<RewriteRule>> {
    usersets.child.into_iter().map(rule_from_json).collect()
}

fn non_empty(relation: String) -> Option<String> {
    (!relation.is_empty()).then_some(relation)
}

impl From<&AuthorizationModel> for ModelJson {
    fn from(model: &AuthorizationModel) -> Self {
        ModelJson {
            schema_version: model.schema_version.clone(),
            type_definitions: model.type_definitions.iter().map(type_to_json).collect(),
        }
    }
}

pub fn model_to_value(model: &AuthorizationModel) -> serde_json::Value {
    serde_json::to_value(ModelJson::from(model)).unwrap_or(serde_json::Value::Null)
}

fn type_to_json(type_def: &TypeDefinition) -> TypeDefinitionJson {
    let relations = type_def
        .relations
        .iter()
        .map(|r| (r.name.clone(), rule_to_json(&r.rewrite)))
        .collect();
    let metadata_relations: BTreeMap<_, _> = type_def
        .relations
        .iter()
        .filter(|r| !r.directly_related_user_types.is_empty())
        .map(|r| {
            let types = r
                .directly_related_user_types
                .iter()
                .map(|t| RelationReferenceJson {
                    type_name: t.type_name.clone(),
                    relation: t.relation.clone(),
                })
                .collect();
            (
                r.name.clone(),
                RelationMetadataJson {
                    directly_related_user_types: types,
                },
            )
        })
        .collect();

    TypeDefinitionJson {
        type_name: type_def.name.clone(),
        relations,
        metadata: (!metadata_relations.is_empty()).then_some(MetadataJson {
            relations: metadata_relations,
        }),
    }
}

fn object_relation(relation: &str) -> ObjectRelationJson {
    ObjectRelationJson {
        object: String::new(),
        relation: relation.to_string(),
    }
}

fn rule_to_json(rule: &RewriteRule) -> UsersetJson {
    match rule {
        RewriteRule::Direct => UsersetJson {
            this: Some(ThisJson {}),
            ..Default::default()
        },
        RewriteRule::ComputedUserset(relation) => UsersetJson {
            computed_userset: Some(object_relation(relation)),
            ..Default::default()
        },
        RewriteRule::TupleToUserset {
            tupleset,
            computed_relation,
        } => UsersetJson {
            tuple_to_userset: Some(TupleToUsersetJson {
                tupleset: object_relation(tupleset),
                computed_userset: object_relation(computed_relation),
            }),
            ..Default::default()
        },
        RewriteRule::Union(children) => UsersetJson {
            union: Some(UsersetsJson {
                child: children.iter().map(rule_to_json).collect(),
            }),
            ..Default::default()
        },
        RewriteRule::Intersection(children) => UsersetJson {
            intersection: Some(UsersetsJson {
                child: children.iter().map(rule_to_json).collect(),
            }),
            ..Default::default()
        },
        RewriteRule::Exclusion(base, subtract) => UsersetJson {
            difference: Some(DifferenceJson {
                base: Box::new(rule_to_json(base)),
                subtract: Box::new(rule_to_json(subtract)),
            }),
            ..Default::default()
        },
    }
}
