//! JSON file store
//!
//! Layout:
//!
//! ```text
//! <root>/
//! ├── schemas/
//! │   └── <schema-id>.json
//! └── sets/
//!     └── <set-id>.json
//! ```
//!
//! All documents are loaded on open and kept in memory. Every change is
//! flushed to its file before the lock is released, and a change whose file
//! cannot be written is reverted in memory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{SchemaUpdate, SetUpdate, Store, Tables};
use crate::dataset::DataSet;
use crate::error::{Result, SchemaError};
use crate::schema::SchemaDefinition;

const SCHEMAS_DIR: &str = "schemas";
const SETS_DIR: &str = "sets";

/// Store persisted as one JSON file per document
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    tables: Mutex<Tables>,
}

impl FileStore {
    /// Open an existing store directory or create a new one
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(root.join(SCHEMAS_DIR))?;
        fs::create_dir_all(root.join(SETS_DIR))?;

        let mut tables = Tables::default();

        for schema in read_documents::<SchemaDefinition>(&root.join(SCHEMAS_DIR))? {
            tables.insert_schema(schema)?;
        }

        for set in read_documents::<DataSet>(&root.join(SETS_DIR))? {
            if tables.get_schema(&set.schema_id).is_none() {
                warn!(set_id = %set.id, schema_id = %set.schema_id, "data set references a missing schema");
            }
            tables.restore_set(set);
        }

        info!(root = %root.display(), "opened file store");

        Ok(Self {
            root,
            tables: Mutex::new(tables),
        })
    }

    /// Get the root path of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| SchemaError::Storage("file store lock poisoned".to_string()))
    }

    fn schema_path(&self, id: &str) -> PathBuf {
        self.root.join(SCHEMAS_DIR).join(format!("{}.json", id))
    }

    fn set_path(&self, id: &str) -> PathBuf {
        self.root.join(SETS_DIR).join(format!("{}.json", id))
    }
}

/// Write through a temporary file so readers never see a partial document
fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(document)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "wrote document");
    Ok(())
}

fn remove_document(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn read_documents<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut documents = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let content = fs::read_to_string(&path)?;
        let document = serde_json::from_str(&content).map_err(|e| {
            SchemaError::Storage(format!("could not parse {}: {}", path.display(), e))
        })?;
        documents.push(document);
    }
    Ok(documents)
}

impl FileStore {
    /// Write a schema and the given sets as they currently stand in `tables`
    fn flush_schema(&self, tables: &Tables, id: &str, set_ids: &[String]) -> Result<()> {
        if let Some(schema) = tables.get_schema(id) {
            write_document(&self.schema_path(id), &schema)?;
        }
        for set_id in set_ids {
            if let Some(set) = tables.get_set(set_id) {
                write_document(&self.set_path(set_id), &set)?;
            }
        }
        Ok(())
    }
}

impl Store for FileStore {
    fn insert_schema(&self, schema: SchemaDefinition) -> Result<()> {
        let mut tables = self.lock()?;
        let id = schema.id.clone();
        tables.insert_schema(schema)?;
        if let Err(e) = self.flush_schema(&tables, &id, &[]) {
            tables.revert_schema(&id, None);
            return Err(e);
        }
        Ok(())
    }

    fn get_schema(&self, id: &str) -> Result<Option<SchemaDefinition>> {
        Ok(self.lock()?.get_schema(id))
    }

    fn find_schema_by_code(&self, code: &str) -> Result<Option<SchemaDefinition>> {
        Ok(self.lock()?.find_schema_by_code(code))
    }

    fn update_schema(&self, id: &str, apply: SchemaUpdate<'_>) -> Result<SchemaDefinition> {
        let mut tables = self.lock()?;
        let previous = tables.get_schema(id);
        let change = tables.update_schema(id, apply)?;

        if let Err(e) = self.flush_schema(&tables, id, &change.touched_sets) {
            tables.revert_schema(id, previous);
            // earlier documents of this change may already be on disk
            if let Err(restore) = self.flush_schema(&tables, id, &change.touched_sets) {
                warn!(schema_id = id, error = %restore, "could not restore schema documents");
            }
            return Err(e);
        }
        Ok(change.schema)
    }

    fn delete_schema(&self, id: &str) -> Result<SchemaDefinition> {
        let mut tables = self.lock()?;
        let removed = tables.delete_schema(id)?;
        if let Err(e) = remove_document(&self.schema_path(id)) {
            tables.revert_schema(id, Some(removed));
            return Err(e);
        }
        Ok(removed)
    }

    fn list_schemas(&self) -> Result<Vec<SchemaDefinition>> {
        Ok(self.lock()?.list_schemas())
    }

    fn insert_set(&self, set: DataSet) -> Result<()> {
        let mut tables = self.lock()?;
        let path = self.set_path(&set.id);
        let id = set.id.clone();
        tables.insert_set(set.clone())?;
        if let Err(e) = write_document(&path, &set) {
            tables.revert_set(&id, None);
            return Err(e);
        }
        Ok(())
    }

    fn get_set(&self, id: &str) -> Result<Option<DataSet>> {
        Ok(self.lock()?.get_set(id))
    }

    fn update_set(&self, id: &str, apply: SetUpdate<'_>) -> Result<DataSet> {
        let mut tables = self.lock()?;
        let previous = tables.get_set(id);
        let updated = tables.update_set(id, apply)?;
        if let Err(e) = write_document(&self.set_path(id), &updated) {
            tables.revert_set(id, previous);
            return Err(e);
        }
        Ok(updated)
    }

    fn delete_set(&self, id: &str) -> Result<DataSet> {
        let mut tables = self.lock()?;
        let removed = tables.delete_set(id)?;
        if let Err(e) = remove_document(&self.set_path(id)) {
            tables.revert_set(id, Some(removed));
            return Err(e);
        }
        Ok(removed)
    }

    fn list_sets(&self) -> Result<Vec<DataSet>> {
        Ok(self.lock()?.list_sets())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::store::test_support::{schema, set};

    #[test]
    fn test_create_store() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.list_schemas().unwrap().is_empty());
        assert!(dir.path().join("schemas").is_dir());
        assert!(dir.path().join("sets").is_dir());
    }

    #[test]
    fn test_documents_survive_reopen() {
        let dir = tempdir().unwrap();
        let def = schema("schema-1", "signals");
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.insert_schema(def.clone()).unwrap();
            store.insert_set(set("set-1", &def, vec![json!({ "id": "a" })])).unwrap();
            store
                .update_set("set-1", &mut |s| {
                    s.data.items.push(json!({ "id": "b" }));
                    Ok(())
                })
                .unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.find_schema_by_code("signals").unwrap().unwrap().id, "schema-1");
        assert_eq!(store.get_set("set-1").unwrap().unwrap().item_count(), 2);

        // unique index is rebuilt on open
        let err = store.insert_schema(schema("schema-2", "signals")).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateCode { .. }));
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.insert_schema(schema("schema-1", "signals")).unwrap();
        assert!(dir.path().join("schemas/schema-1.json").exists());

        store.delete_schema("schema-1").unwrap();
        assert!(!dir.path().join("schemas/schema-1.json").exists());
    }

    #[test]
    fn test_failed_set_write_is_reverted() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let def = schema("schema-1", "signals");
        store.insert_schema(def.clone()).unwrap();
        store.insert_set(set("set-1", &def, vec![json!({ "id": "a" })])).unwrap();

        fs::remove_dir_all(dir.path().join("sets")).unwrap();

        let err = store
            .update_set("set-1", &mut |s| {
                s.data.items.push(json!({ "id": "b" }));
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, SchemaError::Io(_)));
        assert_eq!(store.get_set("set-1").unwrap().unwrap().item_count(), 1);

        assert!(store.insert_set(set("set-2", &def, vec![])).is_err());
        assert!(store.get_set("set-2").unwrap().is_none());
    }

    #[test]
    fn test_failed_schema_write_frees_code() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::remove_dir_all(dir.path().join("schemas")).unwrap();

        assert!(store.insert_schema(schema("schema-1", "signals")).is_err());
        assert!(store.find_schema_by_code("signals").unwrap().is_none());

        fs::create_dir_all(dir.path().join("schemas")).unwrap();
        store.insert_schema(schema("schema-2", "signals")).unwrap();
        assert!(dir.path().join("schemas/schema-2.json").exists());
    }

    #[test]
    fn test_failed_rename_is_reverted() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let def = schema("schema-1", "signals");
        store.insert_schema(def.clone()).unwrap();
        store.insert_set(set("set-1", &def, vec![])).unwrap();

        // the schema file is written, the set file is not
        fs::remove_dir_all(dir.path().join("sets")).unwrap();
        let result = store.update_schema("schema-1", &mut |d| {
            d.code = "renamed".into();
            Ok(())
        });
        assert!(result.is_err());

        assert!(store.find_schema_by_code("renamed").unwrap().is_none());
        assert_eq!(store.find_schema_by_code("signals").unwrap().unwrap().id, "schema-1");
        assert_eq!(store.get_set("set-1").unwrap().unwrap().schema_code, "signals");

        let on_disk: SchemaDefinition =
            serde_json::from_str(&fs::read_to_string(dir.path().join("schemas/schema-1.json")).unwrap()).unwrap();
        assert_eq!(on_disk.code, "signals");
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("schemas")).unwrap();
        fs::write(dir.path().join("schemas/bad.json"), "{ not json").unwrap();

        let err = FileStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, SchemaError::Storage(_)));
    }
}
