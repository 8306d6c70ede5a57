use std::fmt;

use crate::tuple::SubjectRef;

pub const SCHEMA_VERSION: &str = "1.1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationModel {
    pub schema_version: String,
    pub type_definitions: Vec<TypeDefinition>,
}

impl AuthorizationModel {
    pub fn new(type_definitions: Vec<TypeDefinition>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            type_definitions,
        }
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.type_definitions.iter().find(|t| t.name == name)
    }

    pub fn get_relation(&self, type_name: &str, relation: &str) -> Option<&RelationDef> {
        self.get_type(type_name)?.get_relation(relation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    pub name: String,
    pub relations: Vec<RelationDef>,
}

impl TypeDefinition {
    pub fn get_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub name: String,
    pub rewrite: RewriteRule,
    /// User types a tuple may name for this relation. Only meaningful when the
    /// rewrite contains [`RewriteRule::Direct`].
    pub directly_related_user_types: Vec<RelationReference>,
}

impl RelationDef {
    pub fn allows_user(&self, user: &SubjectRef) -> bool {
        self.directly_related_user_types
            .iter()
            .any(|r| r.matches(user))
    }
}

/// `type` or `type#relation` in a relation's directly related user types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationReference {
    pub type_name: String,
    pub relation: Option<String>,
}

impl RelationReference {
    pub fn direct(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            relation: None,
        }
    }

    pub fn userset(type_name: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            relation: Some(relation.into()),
        }
    }

    pub fn matches(&self, user: &SubjectRef) -> bool {
        self.type_name == user.subject_type && self.relation == user.subject_relation
    }
}

impl fmt::Display for RelationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name)?;
        if let Some(ref rel) = self.relation {
            write!(f, "#{rel}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteRule {
    /// Tuples stored for this relation on the object.
    Direct,
    /// Another relation on the same object.
    ComputedUserset(String),
    Union(Vec<RewriteRule>),
    Intersection(Vec<RewriteRule>),
    /// `base but not subtract`.
    Exclusion(Box<RewriteRule>, Box<RewriteRule>),
    /// Follow the objects named by `tupleset` on this object and evaluate
    /// `computed_relation` on each of them.
    TupleToUserset {
        tupleset: String,
        computed_relation: String,
    },
}

impl RewriteRule {
    pub fn has_direct(&self) -> bool {
        match self {
            RewriteRule::Direct => true,
            RewriteRule::Union(children) | RewriteRule::Intersection(children) => {
                children.iter().any(RewriteRule::has_direct)
            }
            RewriteRule::Exclusion(base, subtract) => base.has_direct() || subtract.has_direct(),
            RewriteRule::ComputedUserset(_) | RewriteRule::TupleToUserset { .. } => false,
        }
    }
}
