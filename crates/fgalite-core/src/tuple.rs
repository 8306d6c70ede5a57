use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TupleParseError {
    #[error("invalid object '{0}': expected 'type:id'")]
    InvalidObject(String),

    #[error("invalid user '{0}': expected 'type:id' or 'type:id#relation'")]
    InvalidUser(String),

    #[error("relation must not be empty")]
    EmptyRelation,

    #[error("invalid identifier '{0}': expected a UUID")]
    InvalidId(String),
}

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = TupleParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| TupleParseError::InvalidId(s.to_string()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(StoreId);
uuid_id!(ModelId);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub object_type: String,
    pub object_id: String,
}

impl ObjectRef {
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

impl FromStr for ObjectRef {
    type Err = TupleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TupleParseError::InvalidObject(s.to_string());
        let (object_type, object_id) = s.split_once(':').ok_or_else(invalid)?;
        if object_type.is_empty() || object_id.is_empty() || s.contains('#') {
            return Err(invalid());
        }
        Ok(Self::new(object_type, object_id))
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

/// The user side of a tuple: a concrete object (`user:alice`) or a userset
/// (`group:eng#member`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectRef {
    pub subject_type: String,
    pub subject_id: String,
    pub subject_relation: Option<String>,
}

impl SubjectRef {
    pub fn direct(subject_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            subject_relation: None,
        }
    }

    pub fn userset(
        subject_type: impl Into<String>,
        subject_id: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            subject_relation: Some(relation.into()),
        }
    }

    pub fn is_userset(&self) -> bool {
        self.subject_relation.is_some()
    }

    /// The object half of the subject, without any relation.
    pub fn as_object(&self) -> ObjectRef {
        ObjectRef::new(&self.subject_type, &self.subject_id)
    }
}

impl FromStr for SubjectRef {
    type Err = TupleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TupleParseError::InvalidUser(s.to_string());
        let (object_part, relation) = match s.split_once('#') {
            Some((object_part, relation)) => {
                if relation.is_empty() || relation.contains('#') {
                    return Err(invalid());
                }
                (object_part, Some(relation))
            }
            None => (s, None),
        };
        let object: ObjectRef = object_part.parse().map_err(|_| invalid())?;
        Ok(Self {
            subject_type: object.object_type,
            subject_id: object.object_id,
            subject_relation: relation.map(str::to_string),
        })
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.subject_id)?;
        if let Some(ref rel) = self.subject_relation {
            write!(f, "#{rel}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tuple {
    pub object: ObjectRef,
    pub relation: String,
    pub subject: SubjectRef,
}

impl Tuple {
    pub fn new(object: ObjectRef, relation: impl Into<String>, subject: SubjectRef) -> Self {
        Self {
            object,
            relation: relation.into(),
            subject,
        }
    }

    /// Builds a tuple from its wire form `(user, relation, object)`.
    pub fn parse(user: &str, relation: &str, object: &str) -> Result<Self, TupleParseError> {
        if relation.is_empty() {
            return Err(TupleParseError::EmptyRelation);
        }
        Ok(Self::new(object.parse()?, relation, user.parse()?))
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.object, self.relation, self.subject)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TupleFilter {
    pub object_type: Option<String>,
    pub object_id: Option<String>,
    pub relation: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub subject_relation: Option<Option<String>>,
}

impl TupleFilter {
    pub fn for_relation(object: &ObjectRef, relation: &str) -> Self {
        Self {
            object_type: Some(object.object_type.clone()),
            object_id: Some(object.object_id.clone()),
            relation: Some(relation.to_string()),
            ..Default::default()
        }
    }

    /// Tuples whose subject is a plain user (not a userset) of `user_type`.
    pub fn for_user_type(user_type: &str) -> Self {
        Self {
            subject_type: Some(user_type.to_string()),
            subject_relation: Some(None),
            ..Default::default()
        }
    }

    pub fn matches(&self, tuple: &Tuple) -> bool {
        if let Some(ref ot) = self.object_type
            && ot != &tuple.object.object_type
        {
            return false;
        }
        if let Some(ref oi) = self.object_id
            && oi != &tuple.object.object_id
        {
            return false;
        }
        if let Some(ref r) = self.relation
            && r != &tuple.relation
        {
            return false;
        }
        if let Some(ref st) = self.subject_type
            && st != &tuple.subject.subject_type
        {
            return false;
        }
        if let Some(ref si) = self.subject_id
            && si != &tuple.subject.subject_id
        {
            return false;
        }
        if let Some(ref sr) = self.subject_relation
            && sr != &tuple.subject.subject_relation
        {
            return false;
        }
        true
    }
}

/// Transaction id of the tuple store. Reads pinned to a token see exactly the
/// tuples live at that transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotToken(u64);

impl SnapshotToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SnapshotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
