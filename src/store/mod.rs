//! Document storage for schema definitions and data sets
//!
//! The store is the single source of truth for uniqueness and referential
//! rules. Every constraint is checked under the same lock acquisition as the
//! write it guards:
//!
//! - schema `code` is unique across active and inactive definitions
//! - a data set can only be stored against an existing schema
//! - a schema cannot be removed while data sets reference it
//!
//! Updates take a closure that runs against a copy of the stored document;
//! the copy is committed only if the closure returns `Ok`.

pub mod file;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::dataset::DataSet;
use crate::error::{Resource, Result, SchemaError};
use crate::schema::SchemaDefinition;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Shared handle to a store
pub type SharedStore = Arc<dyn Store>;

/// Closure applied to a schema definition inside an update
pub type SchemaUpdate<'a> = &'a mut dyn FnMut(&mut SchemaDefinition) -> Result<()>;

/// Closure applied to a data set inside an update
pub type SetUpdate<'a> = &'a mut dyn FnMut(&mut DataSet) -> Result<()>;

/// Persistence for schema definitions and data sets
pub trait Store: Send + Sync {
    /// Insert a new definition. Fails with `DuplicateCode` if the code is taken.
    fn insert_schema(&self, schema: SchemaDefinition) -> Result<()>;

    fn get_schema(&self, id: &str) -> Result<Option<SchemaDefinition>>;

    /// Look up by code, regardless of `is_active`
    fn find_schema_by_code(&self, code: &str) -> Result<Option<SchemaDefinition>>;

    /// Read-modify-write a definition. A code change is checked against the
    /// unique index and propagated to referencing data sets.
    fn update_schema(&self, id: &str, apply: SchemaUpdate<'_>) -> Result<SchemaDefinition>;

    /// Remove a definition. Fails with `InUse` while data sets reference it.
    fn delete_schema(&self, id: &str) -> Result<SchemaDefinition>;

    fn list_schemas(&self) -> Result<Vec<SchemaDefinition>>;

    /// Insert a new data set. Fails with `NotFound` if its schema is missing.
    fn insert_set(&self, set: DataSet) -> Result<()>;

    fn get_set(&self, id: &str) -> Result<Option<DataSet>>;

    /// Read-modify-write a data set
    fn update_set(&self, id: &str, apply: SetUpdate<'_>) -> Result<DataSet>;

    fn delete_set(&self, id: &str) -> Result<DataSet>;

    fn list_sets(&self) -> Result<Vec<DataSet>>;
}

/// Open the store selected by configuration
pub fn open_store(config: &StoreConfig) -> Result<SharedStore> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::File => Ok(Arc::new(FileStore::open(&config.path)?)),
    }
}

/// Documents plus the code index. Backends wrap this in a lock.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    schemas: HashMap<String, SchemaDefinition>,
    /// code -> schema id
    codes: HashMap<String, String>,
    sets: HashMap<String, DataSet>,
}

/// Result of a schema update: the new definition and ids of data sets whose
/// denormalized code changed
#[derive(Debug)]
pub(crate) struct SchemaChange {
    pub schema: SchemaDefinition,
    pub touched_sets: Vec<String>,
}

impl Tables {
    pub fn insert_schema(&mut self, schema: SchemaDefinition) -> Result<()> {
        if self.codes.contains_key(&schema.code) {
            return Err(SchemaError::DuplicateCode { code: schema.code });
        }
        if self.schemas.contains_key(&schema.id) {
            return Err(SchemaError::Storage(format!("schema id {} already stored", schema.id)));
        }
        self.codes.insert(schema.code.clone(), schema.id.clone());
        self.schemas.insert(schema.id.clone(), schema);
        Ok(())
    }

    pub fn get_schema(&self, id: &str) -> Option<SchemaDefinition> {
        self.schemas.get(id).cloned()
    }

    pub fn find_schema_by_code(&self, code: &str) -> Option<SchemaDefinition> {
        self.codes.get(code).and_then(|id| self.schemas.get(id)).cloned()
    }

    pub fn update_schema(&mut self, id: &str, apply: SchemaUpdate<'_>) -> Result<SchemaChange> {
        let current = self
            .schemas
            .get(id)
            .cloned()
            .ok_or_else(|| SchemaError::not_found(Resource::Schema, id))?;

        let mut updated = current.clone();
        apply(&mut updated)?;
        updated.id = current.id.clone();

        let mut touched_sets = Vec::new();
        if updated.code != current.code {
            if let Some(owner) = self.codes.get(&updated.code) {
                if owner != id {
                    return Err(SchemaError::DuplicateCode { code: updated.code });
                }
            }
            self.codes.remove(&current.code);
            self.codes.insert(updated.code.clone(), id.to_string());

            for set in self.sets.values_mut().filter(|s| s.schema_id == id) {
                set.schema_code = updated.code.clone();
                touched_sets.push(set.id.clone());
            }
        }

        self.schemas.insert(id.to_string(), updated.clone());
        Ok(SchemaChange {
            schema: updated,
            touched_sets,
        })
    }

    pub fn delete_schema(&mut self, id: &str) -> Result<SchemaDefinition> {
        let schema = self
            .schemas
            .get(id)
            .ok_or_else(|| SchemaError::not_found(Resource::Schema, id))?;

        let count = self.sets.values().filter(|s| s.schema_id == id).count();
        if count > 0 {
            return Err(SchemaError::InUse {
                code: schema.code.clone(),
                count,
            });
        }

        let schema = self
            .schemas
            .remove(id)
            .ok_or_else(|| SchemaError::not_found(Resource::Schema, id))?;
        self.codes.remove(&schema.code);
        Ok(schema)
    }

    /// Put a schema back to `previous`, or drop it when there was none. The
    /// code index and the denormalized code on its sets follow.
    pub fn revert_schema(&mut self, id: &str, previous: Option<SchemaDefinition>) {
        if let Some(current) = self.schemas.remove(id) {
            self.codes.remove(&current.code);
        }
        if let Some(previous) = previous {
            for set in self.sets.values_mut().filter(|s| s.schema_id == id) {
                set.schema_code = previous.code.clone();
            }
            self.codes.insert(previous.code.clone(), id.to_string());
            self.schemas.insert(id.to_string(), previous);
        }
    }

    pub fn list_schemas(&self) -> Vec<SchemaDefinition> {
        let mut schemas: Vec<_> = self.schemas.values().cloned().collect();
        schemas.sort_by(|a, b| a.code.cmp(&b.code));
        schemas
    }

    pub fn insert_set(&mut self, set: DataSet) -> Result<()> {
        if !self.schemas.contains_key(&set.schema_id) {
            return Err(SchemaError::not_found(Resource::Schema, set.schema_id));
        }
        if self.sets.contains_key(&set.id) {
            return Err(SchemaError::Storage(format!("data set id {} already stored", set.id)));
        }
        self.sets.insert(set.id.clone(), set);
        Ok(())
    }

    /// Load a persisted set without referential checks
    pub fn restore_set(&mut self, set: DataSet) {
        self.sets.insert(set.id.clone(), set);
    }

    pub fn get_set(&self, id: &str) -> Option<DataSet> {
        self.sets.get(id).cloned()
    }

    pub fn update_set(&mut self, id: &str, apply: SetUpdate<'_>) -> Result<DataSet> {
        let current = self
            .sets
            .get(id)
            .ok_or_else(|| SchemaError::not_found(Resource::DataSet, id))?;

        let mut updated = current.clone();
        apply(&mut updated)?;
        updated.id = id.to_string();

        self.sets.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    pub fn delete_set(&mut self, id: &str) -> Result<DataSet> {
        self.sets
            .remove(id)
            .ok_or_else(|| SchemaError::not_found(Resource::DataSet, id))
    }

    pub fn revert_set(&mut self, id: &str, previous: Option<DataSet>) {
        match previous {
            Some(set) => self.restore_set(set),
            None => {
                self.sets.remove(id);
            }
        }
    }

    pub fn list_sets(&self) -> Vec<DataSet> {
        let mut sets: Vec<_> = self.sets.values().cloned().collect();
        sets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sets
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use serde_json::Value;

    use crate::dataset::{DataSet, Scope, SetData};
    use crate::schema::{NewSchema, SchemaDefinition, SchemaType};

    pub fn schema(id: &str, code: &str) -> SchemaDefinition {
        SchemaDefinition::from_new(NewSchema::new(code, SchemaType::List), id, "admin").unwrap()
    }

    pub fn set(id: &str, schema: &SchemaDefinition, items: Vec<Value>) -> DataSet {
        let now = Utc::now();
        DataSet {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            schema_id: schema.id.clone(),
            schema_code: schema.code.clone(),
            scope: Scope::System,
            owner: None,
            data: SetData { items },
            created_by: "admin".into(),
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{schema, set};
    use super::*;

    #[test]
    fn test_code_index_is_unique() {
        let mut tables = Tables::default();
        tables.insert_schema(schema("1", "signals")).unwrap();
        let err = tables.insert_schema(schema("2", "signals")).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateCode { .. }));
    }

    #[test]
    fn test_failed_update_is_not_committed() {
        let mut tables = Tables::default();
        tables.insert_schema(schema("1", "signals")).unwrap();

        let result = tables.update_schema("1", &mut |def| {
            def.description = Some("changed".into());
            Err(SchemaError::InvalidFormat("rejected".into()))
        });
        assert!(result.is_err());
        assert!(tables.get_schema("1").unwrap().description.is_none());
    }

    #[test]
    fn test_code_rename_updates_index_and_sets() {
        let mut tables = Tables::default();
        let def = schema("1", "signals");
        tables.insert_schema(def.clone()).unwrap();
        tables.insert_set(set("s1", &def, vec![])).unwrap();

        let change = tables
            .update_schema("1", &mut |def| {
                def.code = "signals-v2".into();
                Ok(())
            })
            .unwrap();

        assert_eq!(change.touched_sets, vec!["s1".to_string()]);
        assert!(tables.find_schema_by_code("signals").is_none());
        assert!(tables.find_schema_by_code("signals-v2").is_some());
        assert_eq!(tables.get_set("s1").unwrap().schema_code, "signals-v2");

        // the old code is free again
        tables.insert_schema(schema("2", "signals")).unwrap();
    }

    #[test]
    fn test_rename_onto_taken_code_fails() {
        let mut tables = Tables::default();
        tables.insert_schema(schema("1", "a")).unwrap();
        tables.insert_schema(schema("2", "b")).unwrap();

        let err = tables
            .update_schema("2", &mut |def| {
                def.code = "a".into();
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateCode { .. }));
        assert_eq!(tables.find_schema_by_code("b").unwrap().id, "2");
    }

    #[test]
    fn test_revert_schema_restores_code_and_sets() {
        let mut tables = Tables::default();
        let def = schema("1", "old");
        tables.insert_schema(def.clone()).unwrap();
        tables.insert_set(set("s1", &def, vec![])).unwrap();
        tables
            .update_schema("1", &mut |d| {
                d.code = "new".into();
                Ok(())
            })
            .unwrap();

        tables.revert_schema("1", Some(def));
        assert!(tables.find_schema_by_code("new").is_none());
        assert_eq!(tables.find_schema_by_code("old").unwrap().id, "1");
        assert_eq!(tables.get_set("s1").unwrap().schema_code, "old");

        tables.insert_schema(schema("2", "fresh")).unwrap();
        tables.revert_schema("2", None);
        assert!(tables.get_schema("2").is_none());
        tables.insert_schema(schema("3", "fresh")).unwrap();
    }

    #[test]
    fn test_delete_restricted_while_referenced() {
        let mut tables = Tables::default();
        let def = schema("1", "signals");
        tables.insert_schema(def.clone()).unwrap();
        tables.insert_set(set("s1", &def, vec![])).unwrap();

        let err = tables.delete_schema("1").unwrap_err();
        assert!(matches!(err, SchemaError::InUse { count: 1, .. }));

        tables.delete_set("s1").unwrap();
        tables.delete_schema("1").unwrap();
        assert!(tables.find_schema_by_code("signals").is_none());
    }

    #[test]
    fn test_set_requires_schema() {
        let mut tables = Tables::default();
        let def = schema("1", "signals");
        let err = tables.insert_set(set("s1", &def, vec![])).unwrap_err();
        assert!(matches!(err, SchemaError::NotFound { resource: Resource::Schema, .. }));
    }
}
