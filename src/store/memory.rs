//! In-memory store

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::{SchemaUpdate, SetUpdate, Store, Tables};
use crate::dataset::DataSet;
use crate::error::{Result, SchemaError};
use crate::schema::SchemaDefinition;

/// Store backed by process memory. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| SchemaError::Storage("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| SchemaError::Storage("memory store lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    fn insert_schema(&self, schema: SchemaDefinition) -> Result<()> {
        debug!(schema_id = %schema.id, code = %schema.code, "insert schema");
        self.write()?.insert_schema(schema)
    }

    fn get_schema(&self, id: &str) -> Result<Option<SchemaDefinition>> {
        Ok(self.read()?.get_schema(id))
    }

    fn find_schema_by_code(&self, code: &str) -> Result<Option<SchemaDefinition>> {
        Ok(self.read()?.find_schema_by_code(code))
    }

    fn update_schema(&self, id: &str, apply: SchemaUpdate<'_>) -> Result<SchemaDefinition> {
        Ok(self.write()?.update_schema(id, apply)?.schema)
    }

    fn delete_schema(&self, id: &str) -> Result<SchemaDefinition> {
        self.write()?.delete_schema(id)
    }

    fn list_schemas(&self) -> Result<Vec<SchemaDefinition>> {
        Ok(self.read()?.list_schemas())
    }

    fn insert_set(&self, set: DataSet) -> Result<()> {
        debug!(set_id = %set.id, schema = %set.schema_code, "insert data set");
        self.write()?.insert_set(set)
    }

    fn get_set(&self, id: &str) -> Result<Option<DataSet>> {
        Ok(self.read()?.get_set(id))
    }

    fn update_set(&self, id: &str, apply: SetUpdate<'_>) -> Result<DataSet> {
        self.write()?.update_set(id, apply)
    }

    fn delete_set(&self, id: &str) -> Result<DataSet> {
        self.write()?.delete_set(id)
    }

    fn list_sets(&self) -> Result<Vec<DataSet>> {
        Ok(self.read()?.list_sets())
    }
}
