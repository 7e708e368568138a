//! Error types for the custom API schema core

use std::fmt;

use thiserror::Error;

/// Result type for schema and data set operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Kind of document an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Schema,
    DataSet,
    Item,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Schema => "Schema",
            Resource::DataSet => "Data set",
            Resource::Item => "Item",
        };
        f.write_str(name)
    }
}

/// Custom API schema errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema code already exists: {code}")]
    DuplicateCode { code: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: Resource, id: String },

    #[error("Access denied: {actor} does not own data set {set_id}")]
    Forbidden { set_id: String, actor: String },

    #[error("Item '{item_id}' already exists in data set {set_id}")]
    DuplicateItem { set_id: String, item_id: String },

    #[error("{}", .errors.join(", "))]
    Validation { errors: Vec<String> },

    #[error("Schema {code} is still referenced by {count} data set(s)")]
    InUse { code: String, count: usize },

    #[error("Invalid schema format: {0}")]
    InvalidFormat(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchemaError {
    pub fn not_found(resource: Resource, id: impl Into<String>) -> Self {
        SchemaError::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn validation(errors: Vec<String>) -> Self {
        SchemaError::Validation { errors }
    }

    /// HTTP status code the REST layer answers with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            SchemaError::DuplicateCode { .. }
            | SchemaError::DuplicateItem { .. }
            | SchemaError::Validation { .. }
            | SchemaError::InvalidFormat(_)
            | SchemaError::InvalidVersion(_) => 400,
            SchemaError::Forbidden { .. } => 403,
            SchemaError::NotFound { .. } => 404,
            SchemaError::InUse { .. } => 409,
            SchemaError::Storage(_) | SchemaError::Io(_) | SchemaError::Json(_) => 500,
        }
    }
}
