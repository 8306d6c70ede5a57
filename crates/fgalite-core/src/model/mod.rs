pub mod json;
mod parser;
pub mod types;
mod validation;

pub use json::{JsonModelError, ModelJson, model_from_json, model_from_value, model_to_value};
pub use parser::{ParseError, parse_model};
pub use types::{
    AuthorizationModel, RelationDef, RelationReference, RewriteRule, SCHEMA_VERSION,
    TypeDefinition,
};
pub use validation::{
    ModelLimits, TupleValidationError, ValidationError, validate_model, validate_tuple,
};
