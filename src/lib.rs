//! Custom API Schemas
//!
//! Schema registry and item validation for the custom APIs of the vehicle
//! prototyping playground. A custom API is described by a schema definition
//! (`tree`, `list` or `graph`); its data lives in data sets whose items are
//! validated against that definition before they are stored.
//!
//! ## Features
//!
//! - **Unique Codes**: Schema codes are lower-cased and unique, enforced by the store
//! - **Structural Validation**: Tree parent paths and graph relationship targets must resolve
//! - **Strict Mode**: Opt-in attribute, duplicate-id, cycle and relationship-name checks
//! - **Ownership**: User-scoped data sets are private to their owner
//! - **Pluggable Storage**: In-memory or JSON-file stores behind one trait
//!
//! ## Flow
//!
//! ```text
//! SchemaRegistry ──get schema──▶ ItemValidator ──report──▶ SetService ──write──▶ Store
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod registry;
pub mod schema;
pub mod sets;
pub mod store;
pub mod validator;

pub use config::ApiSchemaConfig;
pub use dataset::{DataSet, Item, NewDataSet, Scope, SetData};
pub use error::{Resource, Result, SchemaError};
pub use registry::SchemaRegistry;
pub use schema::{
    AttributeDef, DataType, NewSchema, RelationshipDef, SchemaDefinition, SchemaPatch, SchemaType,
    TreeConfig,
};
pub use sets::SetService;
pub use store::{open_store, FileStore, MemoryStore, SharedStore, Store};
pub use validator::{validate, ItemValidator, ValidationOptions, ValidationReport};
