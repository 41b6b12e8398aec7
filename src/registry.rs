use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::Application;

/// Schemas are stored per (company, application) pair; ambient global
/// registries are deliberately avoided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaScope {
    pub company_id: Uuid,
    pub application_id: Uuid,
}

impl SchemaScope {
    pub fn of(application: &Application) -> Self {
        Self {
            company_id: application.company_id,
            application_id: application.id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateLogic {
    Replace,
    Merge,
    Append,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub key: String,
    pub kind: FieldKind,
    pub is_protected: bool,
    pub is_encrypted: bool,
    pub enable_index: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, key: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            kind,
            is_protected: false,
            is_encrypted: false,
            enable_index: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub name: String,
    pub key: String,
    pub update_logic: UpdateLogic,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, key: impl Into<String>, update_logic: UpdateLogic) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            update_logic,
        }
    }
}

/// Compiled snapshot of one application's live schema. Record operations
/// resolve one of these per call and never observe a half-applied mutation.
#[derive(Debug)]
pub struct RecordTypeDescriptor {
    pub version: u64,
    fields: Vec<FieldSpec>,
    tables: Vec<TableSpec>,
    field_index: HashMap<String, usize>,
    table_index: HashMap<String, usize>,
}

impl RecordTypeDescriptor {
    fn build(version: u64, fields: Vec<FieldSpec>, tables: Vec<TableSpec>) -> Self {
        let field_index = fields
            .iter()
            .enumerate()
            .map(|(idx, spec)| (spec.key.clone(), idx))
            .collect();
        let table_index = tables
            .iter()
            .enumerate()
            .map(|(idx, spec)| (spec.key.clone(), idx))
            .collect();
        Self {
            version,
            fields,
            tables,
            field_index,
            table_index,
        }
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.field_index.get(key).map(|idx| &self.fields[*idx])
    }

    pub fn table(&self, key: &str) -> Option<&TableSpec> {
        self.table_index.get(key).map(|idx| &self.tables[*idx])
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables.iter()
    }
}

impl PartialEq for RecordTypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.fields == other.fields && self.tables == other.tables
    }
}

struct SchemaEntry {
    version: u64,
    fields: Vec<FieldSpec>,
    tables: Vec<TableSpec>,
    compiled: Arc<RecordTypeDescriptor>,
}

impl SchemaEntry {
    fn empty() -> Self {
        Self {
            version: 0,
            fields: Vec::new(),
            tables: Vec::new(),
            compiled: Arc::new(RecordTypeDescriptor::build(0, Vec::new(), Vec::new())),
        }
    }

    fn recompile(&mut self) {
        self.version += 1;
        self.compiled = Arc::new(RecordTypeDescriptor::build(
            self.version,
            self.fields.clone(),
            self.tables.clone(),
        ));
    }

    fn key_taken(&self, key: &str) -> bool {
        self.fields.iter().any(|f| f.key == key) || self.tables.iter().any(|t| t.key == key)
    }

    fn name_taken(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name) || self.tables.iter().any(|t| t.name == name)
    }
}

pub struct SchemaRegistry {
    inner: RwLock<HashMap<SchemaScope, SchemaEntry>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn define_field(
        &self,
        scope: SchemaScope,
        spec: FieldSpec,
    ) -> EngineResult<Arc<RecordTypeDescriptor>> {
        validate_name(&spec.name)?;
        validate_key(&spec.key)?;
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = guard.entry(scope).or_insert_with(SchemaEntry::empty);
        if entry.key_taken(&spec.key) {
            return Err(EngineError::Validation("Key has already been taken".to_string()));
        }
        if entry.name_taken(&spec.name) {
            return Err(EngineError::Validation("Name has already been taken".to_string()));
        }
        debug!(key = %spec.key, application_id = %scope.application_id, "defining field");
        entry.fields.push(spec);
        entry.recompile();
        Ok(entry.compiled.clone())
    }

    pub fn define_table(
        &self,
        scope: SchemaScope,
        spec: TableSpec,
    ) -> EngineResult<Arc<RecordTypeDescriptor>> {
        validate_name(&spec.name)?;
        validate_key(&spec.key)?;
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = guard.entry(scope).or_insert_with(SchemaEntry::empty);
        if entry.key_taken(&spec.key) {
            return Err(EngineError::Validation("Key has already been taken".to_string()));
        }
        if entry.name_taken(&spec.name) {
            return Err(EngineError::Validation("Name has already been taken".to_string()));
        }
        debug!(key = %spec.key, application_id = %scope.application_id, "defining table");
        entry.tables.push(spec);
        entry.recompile();
        Ok(entry.compiled.clone())
    }

    /// Removing a schema element only narrows the live descriptor; values
    /// already stored on records stay in place and become inaccessible.
    pub fn remove_field(&self, scope: SchemaScope, key: &str) -> EngineResult<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = guard
            .get_mut(&scope)
            .ok_or_else(|| EngineError::Validation("schema is empty".to_string()))?;
        let before = entry.fields.len();
        entry.fields.retain(|f| f.key != key);
        if entry.fields.len() == before {
            return Err(EngineError::Validation(format!("unknown field key {key}")));
        }
        entry.recompile();
        Ok(())
    }

    pub fn remove_table(&self, scope: SchemaScope, key: &str) -> EngineResult<()> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = guard
            .get_mut(&scope)
            .ok_or_else(|| EngineError::Validation("schema is empty".to_string()))?;
        let before = entry.tables.len();
        entry.tables.retain(|t| t.key != key);
        if entry.tables.len() == before {
            return Err(EngineError::Validation(format!("unknown table key {key}")));
        }
        entry.recompile();
        Ok(())
    }

    /// Returns the current compiled descriptor. Compilation happened under
    /// the registry write lock at mutation time, so this is a cheap clone
    /// and two calls without an intervening mutation return the same
    /// snapshot.
    pub fn compile(&self, scope: SchemaScope) -> Arc<RecordTypeDescriptor> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match guard.get(&scope) {
            Some(entry) => entry.compiled.clone(),
            None => Arc::new(RecordTypeDescriptor::build(0, Vec::new(), Vec::new())),
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Key rule shared by applications, fields, tables and schedules.
pub(crate) fn validate_key(key: &str) -> EngineResult<()> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(EngineError::Validation(
            "Key should contain alpha numeric and underscore characters only".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_name(name: &str) -> EngineResult<()> {
    if name.trim().is_empty() {
        return Err(EngineError::Validation("Name can't be blank".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> SchemaScope {
        SchemaScope {
            company_id: Uuid::new_v4(),
            application_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn rejects_malformed_keys() {
        let registry = SchemaRegistry::new();
        let err = registry
            .define_field(scope(), FieldSpec::new("Name", "bad key!", FieldKind::Text))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Key should contain alpha numeric and underscore characters only"
        );
    }

    #[test]
    fn rejects_blank_names() {
        let registry = SchemaRegistry::new();
        let err = registry
            .define_field(scope(), FieldSpec::new("  ", "name", FieldKind::Text))
            .unwrap_err();
        assert_eq!(err.to_string(), "Name can't be blank");
    }

    #[test]
    fn rejects_duplicate_keys_across_fields_and_tables() {
        let registry = SchemaRegistry::new();
        let scope = scope();
        registry
            .define_field(scope, FieldSpec::new("Name", "name", FieldKind::Text))
            .unwrap();
        let err = registry
            .define_table(scope, TableSpec::new("Rows", "name", UpdateLogic::Replace))
            .unwrap_err();
        assert_eq!(err.to_string(), "Key has already been taken");
    }

    #[test]
    fn compile_is_idempotent_between_mutations() {
        let registry = SchemaRegistry::new();
        let scope = scope();
        registry
            .define_field(scope, FieldSpec::new("Name", "name", FieldKind::Text))
            .unwrap();
        let first = registry.compile(scope);
        let second = registry.compile(scope);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.as_ref(), second.as_ref());

        registry
            .define_field(scope, FieldSpec::new("Age", "age", FieldKind::Number))
            .unwrap();
        let third = registry.compile(scope);
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(third.version > first.version);
    }

    #[test]
    fn removed_fields_leave_the_descriptor() {
        let registry = SchemaRegistry::new();
        let scope = scope();
        registry
            .define_field(scope, FieldSpec::new("Name", "name", FieldKind::Text))
            .unwrap();
        registry.remove_field(scope, "name").unwrap();
        assert!(registry.compile(scope).field("name").is_none());
    }
}
