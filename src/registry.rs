//! Schema Registry
//!
//! Creates, looks up and updates named schema definitions. Code uniqueness
//! is enforced by the store's unique index, so concurrent creates with the
//! same code cannot both succeed.

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Resource, Result, SchemaError};
use crate::schema::{normalize_code, parse_version, NewSchema, SchemaDefinition, SchemaPatch};
use crate::store::SharedStore;

/// Registry of custom API schema definitions
#[derive(Clone)]
pub struct SchemaRegistry {
    store: SharedStore,
}

impl SchemaRegistry {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Store a new definition. The code is lower-cased before the uniqueness check.
    pub fn create(&self, new: NewSchema, actor: &str) -> Result<SchemaDefinition> {
        let id = Uuid::new_v4().to_string();
        let definition = SchemaDefinition::from_new(new, id, actor)?;

        self.store.insert_schema(definition.clone())?;

        info!(
            schema_id = %definition.id,
            code = %definition.code,
            schema_type = %definition.schema_type,
            actor,
            "created schema definition"
        );
        Ok(definition)
    }

    /// Get a definition by id, active or not
    pub fn get_by_id(&self, id: &str) -> Result<SchemaDefinition> {
        self.store
            .get_schema(id)?
            .ok_or_else(|| SchemaError::not_found(Resource::Schema, id))
    }

    /// Get an active definition by code (case-insensitive)
    pub fn get_by_code(&self, code: &str) -> Result<SchemaDefinition> {
        let normalized = code.trim().to_lowercase();
        match self.store.find_schema_by_code(&normalized)? {
            Some(definition) if definition.is_active => Ok(definition),
            _ => Err(SchemaError::not_found(Resource::Schema, normalized)),
        }
    }

    /// All definitions sorted by code
    pub fn list(&self, include_inactive: bool) -> Result<Vec<SchemaDefinition>> {
        let mut definitions = self.store.list_schemas()?;
        if !include_inactive {
            definitions.retain(|d| d.is_active);
        }
        Ok(definitions)
    }

    /// Apply a partial update. A changed code must still be unique.
    pub fn update(&self, id: &str, patch: SchemaPatch, actor: &str) -> Result<SchemaDefinition> {
        let mut patch = patch;
        if let Some(code) = patch.code.take() {
            patch.code = Some(normalize_code(&code)?);
        }
        let version = patch.version.as_deref().map(parse_version).transpose()?;

        let updated = self.store.update_schema(id, &mut |definition| {
            patch.apply(definition, version.as_ref());
            definition.updated_by = Some(actor.to_string());
            definition.updated_at = chrono::Utc::now();
            Ok(())
        })?;

        info!(schema_id = %id, code = %updated.code, actor, "updated schema definition");
        Ok(updated)
    }

    /// Soft delete: the definition stays but is no longer found by code
    pub fn deactivate(&self, id: &str, actor: &str) -> Result<SchemaDefinition> {
        let patch = SchemaPatch {
            is_active: Some(false),
            ..Default::default()
        };
        let updated = self.update(id, patch, actor)?;
        debug!(schema_id = %id, "deactivated schema definition");
        Ok(updated)
    }

    /// Remove a definition. Rejected with `InUse` while data sets reference it.
    pub fn delete(&self, id: &str) -> Result<()> {
        let removed = self.store.delete_schema(id)?;
        info!(schema_id = %id, code = %removed.code, "deleted schema definition");
        Ok(())
    }
}
