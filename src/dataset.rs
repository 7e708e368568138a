//! Data sets: concrete collections of items conforming to one schema

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};
use crate::validator::item_key;

/// A single item record. Loosely typed; always carries an `id`.
pub type Item = Map<String, Value>;

/// Visibility of a data set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Shared with everyone
    #[default]
    System,
    /// Private to `owner`
    User,
}

/// Item payload of a data set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SetData {
    #[serde(default)]
    pub items: Vec<Value>,
}

/// A stored data set (instance of a custom API)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema_id: String,
    /// Denormalized from the schema, kept in sync on code changes
    pub schema_code: String,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub data: SetData,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataSet {
    /// Whether `actor` may read and write this set
    pub fn is_accessible_by(&self, actor: &str) -> bool {
        match self.scope {
            Scope::System => true,
            Scope::User => self.owner.as_deref() == Some(actor),
        }
    }

    /// Fail with `Forbidden` unless `actor` may access this set
    pub fn ensure_access(&self, actor: &str) -> Result<()> {
        if self.is_accessible_by(actor) {
            Ok(())
        } else {
            Err(SchemaError::Forbidden {
                set_id: self.id.clone(),
                actor: actor.to_string(),
            })
        }
    }

    /// Position of the item with the given id
    pub fn item_index(&self, item_id: &str) -> Option<usize> {
        self.data
            .items
            .iter()
            .position(|item| item_key(item.get("id")).as_deref() == Some(item_id))
    }

    pub fn find_item(&self, item_id: &str) -> Option<&Value> {
        self.item_index(item_id).map(|i| &self.data.items[i])
    }

    pub fn item_count(&self) -> usize {
        self.data.items.len()
    }

    /// Record who changed the set and when
    pub fn touch(&mut self, actor: &str) {
        self.updated_by = Some(actor.to_string());
        self.updated_at = Utc::now();
    }
}

/// Payload for creating a data set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDataSet {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub schema_id: String,
    #[serde(default)]
    pub scope: Scope,
    /// Raw `{ "items": [...] }` payload, validated before it is stored
    #[serde(default = "empty_data")]
    pub data: Value,
}

impl NewDataSet {
    pub fn new(name: impl Into<String>, schema_id: impl Into<String>, scope: Scope, data: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            schema_id: schema_id.into(),
            scope,
            data,
        }
    }
}

fn empty_data() -> Value {
    serde_json::json!({ "items": [] })
}
