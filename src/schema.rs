//! Schema definition types

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// Structural type of a custom API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    /// Items form a hierarchy through `path` / `parent_id`
    Tree,
    /// Flat items, no structure beyond `id`
    List,
    /// Items linked through `relationships[].target_item_id`
    Graph,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Tree => "tree",
            SchemaType::List => "list",
            SchemaType::Graph => "graph",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SchemaType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tree" => Ok(SchemaType::Tree),
            "list" => Ok(SchemaType::List),
            "graph" => Ok(SchemaType::Graph),
            other => Err(SchemaError::InvalidFormat(format!(
                "unknown schema type '{}' (expected tree, list or graph)",
                other
            ))),
        }
    }
}

/// Declared data type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    /// Dates travel as strings
    Date,
}

impl DataType {
    /// JSON Schema `type` keyword for this data type
    pub fn json_type(&self) -> &'static str {
        match self {
            DataType::String | DataType::Date => "string",
            DataType::Number => "number",
            DataType::Integer => "integer",
            DataType::Boolean => "boolean",
            DataType::Object => "object",
            DataType::Array => "array",
        }
    }
}

/// A declared item attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A declared relationship type (graph schemas)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    pub target_api: String,
    /// e.g. "one-to-many", "many-to-many"; informational
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<String>,
}

/// Tree layout hints (tree schemas)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            max_depth: None,
        }
    }
}

fn default_separator() -> String {
    ".".to_string()
}

fn default_version() -> Version {
    Version::new(1, 0, 0)
}

fn default_true() -> bool {
    true
}

/// A stored schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub id: String,
    /// Unique, lower-cased identity key
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<RelationshipDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_config: Option<TreeConfig>,
    #[serde(default = "default_version")]
    pub version: Version,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SchemaDefinition {
    /// Build a definition from a create request, normalising the code
    pub fn from_new(new: NewSchema, id: impl Into<String>, actor: &str) -> Result<Self> {
        let code = normalize_code(&new.code)?;
        let version = match new.version.as_deref() {
            Some(v) => parse_version(v)?,
            None => default_version(),
        };
        let now = Utc::now();

        Ok(Self {
            id: id.into(),
            code,
            name: new.name,
            description: new.description,
            schema_type: new.schema_type,
            attributes: new.attributes,
            relationships: new.relationships,
            tree_config: new.tree_config,
            version,
            is_active: true,
            created_by: actor.to_string(),
            updated_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Separator used to split item paths (tree schemas)
    pub fn separator(&self) -> &str {
        self.tree_config
            .as_ref()
            .map(|c| c.separator.as_str())
            .unwrap_or(".")
    }

    /// Whether a relationship name is declared on this schema
    pub fn declares_relationship(&self, name: &str) -> bool {
        self.relationships.iter().any(|r| r.name == name)
    }
}

/// Payload for creating a schema definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSchema {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
    #[serde(default)]
    pub tree_config: Option<TreeConfig>,
    #[serde(default)]
    pub version: Option<String>,
}

impl NewSchema {
    pub fn new(code: impl Into<String>, schema_type: SchemaType) -> Self {
        Self {
            code: code.into(),
            name: None,
            description: None,
            schema_type,
            attributes: Vec::new(),
            relationships: Vec::new(),
            tree_config: None,
            version: None,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, data_type: DataType, required: bool) -> Self {
        self.attributes.push(AttributeDef {
            name: name.into(),
            data_type,
            required,
            description: None,
        });
        self
    }

    pub fn with_relationship(mut self, name: impl Into<String>, target_api: impl Into<String>) -> Self {
        self.relationships.push(RelationshipDef {
            name: name.into(),
            target_api: target_api.into(),
            cardinality: None,
        });
        self
    }
}

/// Partial update of a schema definition; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaPatch {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub schema_type: Option<SchemaType>,
    #[serde(default)]
    pub attributes: Option<Vec<AttributeDef>>,
    #[serde(default)]
    pub relationships: Option<Vec<RelationshipDef>>,
    #[serde(default)]
    pub tree_config: Option<TreeConfig>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl SchemaPatch {
    /// Apply this patch to a definition. `code` must already be normalised.
    pub(crate) fn apply(&self, def: &mut SchemaDefinition, version: Option<&Version>) {
        if let Some(code) = &self.code {
            def.code = code.clone();
        }
        if let Some(name) = &self.name {
            def.name = Some(name.clone());
        }
        if let Some(description) = &self.description {
            def.description = Some(description.clone());
        }
        if let Some(schema_type) = self.schema_type {
            def.schema_type = schema_type;
        }
        if let Some(attributes) = &self.attributes {
            def.attributes = attributes.clone();
        }
        if let Some(relationships) = &self.relationships {
            def.relationships = relationships.clone();
        }
        if let Some(tree_config) = &self.tree_config {
            def.tree_config = Some(tree_config.clone());
        }
        if let Some(version) = version {
            def.version = version.clone();
        }
        if let Some(is_active) = self.is_active {
            def.is_active = is_active;
        }
    }
}

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_.\-]*$").unwrap())
}

/// Lower-case and check a schema code
pub fn normalize_code(code: &str) -> Result<String> {
    let code = code.trim().to_lowercase();
    if !code_pattern().is_match(&code) {
        return Err(SchemaError::InvalidFormat(format!(
            "schema code '{}' must start with a letter or digit and contain only letters, digits, '_', '-' or '.'",
            code
        )));
    }
    Ok(code)
}

/// Parse a semantic version, accepting a leading 'v'
pub fn parse_version(version: &str) -> Result<Version> {
    let trimmed = version.strip_prefix('v').unwrap_or(version);
    Version::parse(trimmed).map_err(|e| SchemaError::InvalidVersion(format!("{}: {}", version, e)))
}
