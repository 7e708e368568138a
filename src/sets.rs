//! Data set service
//!
//! Set CRUD and single-item mutations. Ownership checks and the duplicate-id
//! check run inside the store's read-modify-write, so they see the same
//! document the write replaces.

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dataset::{DataSet, Item, NewDataSet, Scope, SetData};
use crate::error::{Resource, Result, SchemaError};
use crate::schema::SchemaDefinition;
use crate::store::SharedStore;
use crate::validator::{item_key, ItemValidator, ValidationOptions};

/// Operations on data sets and their items
#[derive(Clone)]
pub struct SetService {
    store: SharedStore,
    validator: ItemValidator,
}

impl SetService {
    pub fn new(store: SharedStore) -> Self {
        Self::with_options(store, ValidationOptions::default())
    }

    pub fn with_options(store: SharedStore, options: ValidationOptions) -> Self {
        Self {
            store,
            validator: ItemValidator::with_options(options),
        }
    }

    pub fn validator(&self) -> &ItemValidator {
        &self.validator
    }

    /// Validate the payload against its schema and store a new set.
    /// User-scoped sets are owned by `actor`.
    pub fn create_set(&self, new: NewDataSet, actor: &str) -> Result<DataSet> {
        let schema = self.active_schema(&new.schema_id)?;
        self.validator.validate(&schema, &new.data).into_result()?;

        let data: SetData = serde_json::from_value(new.data)?;
        let owner = match new.scope {
            Scope::User => Some(actor.to_string()),
            Scope::System => None,
        };
        let now = Utc::now();
        let set = DataSet {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            description: new.description,
            schema_id: schema.id.clone(),
            schema_code: schema.code.clone(),
            scope: new.scope,
            owner,
            data,
            created_by: actor.to_string(),
            updated_by: None,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_set(set.clone())?;
        info!(set_id = %set.id, schema = %set.schema_code, items = set.item_count(), actor, "created data set");
        Ok(set)
    }

    /// Fetch a set; user-scoped sets are only visible to their owner
    pub fn get_by_id(&self, set_id: &str, actor: &str) -> Result<DataSet> {
        let set = self.load(set_id)?;
        set.ensure_access(actor)?;
        Ok(set)
    }

    /// System sets plus the actor's own, optionally for one schema code
    pub fn list_sets(&self, actor: &str, schema_code: Option<&str>) -> Result<Vec<DataSet>> {
        let code = schema_code.map(|c| c.trim().to_lowercase());
        let sets = self
            .store
            .list_sets()?
            .into_iter()
            .filter(|s| s.is_accessible_by(actor))
            .filter(|s| code.as_deref().map_or(true, |c| s.schema_code == c))
            .collect();
        Ok(sets)
    }

    pub fn delete_set(&self, set_id: &str, actor: &str) -> Result<()> {
        self.get_by_id(set_id, actor)?;
        self.store.delete_set(set_id)?;
        info!(set_id, actor, "deleted data set");
        Ok(())
    }

    /// Replace the whole item list after validating it against the set's schema
    pub fn replace_all_items(&self, set_id: &str, items: Vec<Value>, actor: &str) -> Result<DataSet> {
        let current = self.get_by_id(set_id, actor)?;
        let schema = self.schema_of(&current)?;
        let report = self.validator.validate_items(&schema, &items);
        if !report.valid {
            warn!(set_id, errors = report.errors.len(), "rejected item replacement");
        }
        report.into_result()?;

        let count = items.len();
        let mut items = Some(items);
        let updated = self.store.update_set(set_id, &mut |set| {
            set.ensure_access(actor)?;
            set.data.items = items.take().unwrap_or_default();
            set.touch(actor);
            Ok(())
        })?;

        info!(set_id, items = count, actor, "replaced data set items");
        Ok(updated)
    }

    /// Append one item. Its id must be present and unused in the set.
    pub fn add_item(&self, set_id: &str, item: Item, actor: &str) -> Result<DataSet> {
        let key = item_key(item.get("id"));
        let schema = self.strict_schema(set_id)?;

        let updated = self.store.update_set(set_id, &mut |set| {
            set.ensure_access(actor)?;
            let item_id = key
                .as_deref()
                .ok_or_else(|| SchemaError::validation(vec!["Item is missing required field 'id'".to_string()]))?;
            if set.item_index(item_id).is_some() {
                return Err(SchemaError::DuplicateItem {
                    set_id: set.id.clone(),
                    item_id: item_id.to_string(),
                });
            }
            set.data.items.push(Value::Object(item.clone()));
            self.revalidate(schema.as_ref(), set)?;
            set.touch(actor);
            Ok(())
        })?;

        info!(set_id, item_id = key.as_deref().unwrap_or_default(), actor, "added item");
        Ok(updated)
    }

    /// Shallow-merge `patch` into an existing item. The item's id is never changed.
    pub fn update_item(&self, set_id: &str, item_id: &str, patch: Item, actor: &str) -> Result<DataSet> {
        let schema = self.strict_schema(set_id)?;

        let updated = self.store.update_set(set_id, &mut |set| {
            set.ensure_access(actor)?;
            let index = set
                .item_index(item_id)
                .ok_or_else(|| SchemaError::not_found(Resource::Item, item_id))?;
            if let Some(existing) = set.data.items[index].as_object_mut() {
                for (key, value) in &patch {
                    if key != "id" {
                        existing.insert(key.clone(), value.clone());
                    }
                }
            }
            self.revalidate(schema.as_ref(), set)?;
            set.touch(actor);
            Ok(())
        })?;

        info!(set_id, item_id, actor, "updated item");
        Ok(updated)
    }

    pub fn remove_item(&self, set_id: &str, item_id: &str, actor: &str) -> Result<DataSet> {
        let schema = self.strict_schema(set_id)?;

        let updated = self.store.update_set(set_id, &mut |set| {
            set.ensure_access(actor)?;
            let index = set
                .item_index(item_id)
                .ok_or_else(|| SchemaError::not_found(Resource::Item, item_id))?;
            set.data.items.remove(index);
            self.revalidate(schema.as_ref(), set)?;
            set.touch(actor);
            Ok(())
        })?;

        info!(set_id, item_id, actor, "removed item");
        Ok(updated)
    }

    fn load(&self, set_id: &str) -> Result<DataSet> {
        self.store
            .get_set(set_id)?
            .ok_or_else(|| SchemaError::not_found(Resource::DataSet, set_id))
    }

    fn active_schema(&self, schema_id: &str) -> Result<SchemaDefinition> {
        match self.store.get_schema(schema_id)? {
            Some(schema) if schema.is_active => Ok(schema),
            _ => Err(SchemaError::not_found(Resource::Schema, schema_id)),
        }
    }

    fn schema_of(&self, set: &DataSet) -> Result<SchemaDefinition> {
        self.store
            .get_schema(&set.schema_id)?
            .ok_or_else(|| SchemaError::not_found(Resource::Schema, set.schema_id.as_str()))
    }

    /// The set's schema, loaded only when item mutations are re-validated.
    /// It is read outside the set's update, so a concurrent schema update may
    /// leave the mutation checked against the previous definition.
    fn strict_schema(&self, set_id: &str) -> Result<Option<SchemaDefinition>> {
        if !self.validator.options().strict {
            return Ok(None);
        }
        let set = self.load(set_id)?;
        self.schema_of(&set).map(Some)
    }

    fn revalidate(&self, schema: Option<&SchemaDefinition>, set: &DataSet) -> Result<()> {
        match schema {
            Some(schema) => self.validator.validate_items(schema, &set.data.items).into_result(),
            None => Ok(()),
        }
    }
}
