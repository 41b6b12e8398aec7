use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::crypto::FieldCipher;
use crate::error::{EngineError, EngineResult};
use crate::models::{Application, Company, Record, SystemProvenance, User};
use crate::registry::{FieldKind, FieldSpec, RecordTypeDescriptor, SchemaRegistry, SchemaScope, UpdateLogic};

pub type JsonMap = serde_json::Map<String, Value>;

/// CRUD and partial-update engine over the live schema. Each record sits
/// behind its own mutex so concurrent patches serialize per record instead
/// of per store; the schema descriptor is resolved fresh on every operation.
pub struct RecordStore {
    registry: Arc<SchemaRegistry>,
    cipher: Arc<FieldCipher>,
    inner: RwLock<HashMap<Uuid, Arc<Mutex<Record>>>>,
}

impl RecordStore {
    pub fn new(registry: Arc<SchemaRegistry>, cipher: Arc<FieldCipher>) -> Self {
        Self {
            registry,
            cipher,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a record, routing `initial` through the same merge path as
    /// `update_with`, then stamps provenance exactly once.
    pub fn create(
        &self,
        company: &Company,
        application: &Application,
        initial: &JsonMap,
        actor: &User,
    ) -> EngineResult<Record> {
        if application.company_id != company.id {
            return Err(EngineError::Integrity(
                "application does not belong to company".to_string(),
            ));
        }
        let descriptor = self.registry.compile(SchemaScope::of(application));
        let mut record = Record {
            id: Uuid::new_v4(),
            company_id: company.id,
            application_id: application.id,
            fields: JsonMap::new(),
            tables: HashMap::new(),
            system: SystemProvenance {
                created_by: actor.email.clone(),
                application_key: application.key.clone(),
                company_key: company.key.clone(),
                created_at: Utc::now(),
            },
            version: 0,
            updated_at: Utc::now(),
        };
        merge_patch(&mut record, &descriptor, initial, true, &self.cipher)?;
        record.version = 1;

        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(record.id, Arc::new(Mutex::new(record.clone())));
        info!(record_id = %record.id, application = %application.key, "created record");
        Ok(record)
    }

    /// Merges `patch` into the record under its per-record lock. The
    /// descriptor is resolved after the lock is taken, so the write sees
    /// one consistent schema snapshot.
    pub fn update_with(
        &self,
        record_id: Uuid,
        patch: &JsonMap,
        apply_update_logic: bool,
    ) -> EngineResult<Record> {
        let slot = self.slot(record_id)?;
        let mut record = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let descriptor = self.registry.compile(SchemaScope {
            company_id: record.company_id,
            application_id: record.application_id,
        });
        merge_patch(&mut record, &descriptor, patch, apply_update_logic, &self.cipher)?;
        record.version += 1;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    pub fn get(&self, record_id: Uuid) -> EngineResult<Record> {
        let slot = self.slot(record_id)?;
        let record = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(record.clone())
    }

    /// The record as visible through the live schema: removed elements are
    /// hidden, added ones default to null/empty, encrypted values come back
    /// as plaintext.
    pub fn read_fields(&self, record_id: Uuid) -> EngineResult<JsonMap> {
        let record = self.get(record_id)?;
        let descriptor = self.registry.compile(SchemaScope {
            company_id: record.company_id,
            application_id: record.application_id,
        });

        let mut view = JsonMap::new();
        for field in descriptor.fields() {
            let value = match record.fields.get(&field.key) {
                Some(Value::String(sealed)) if field.is_encrypted => {
                    serde_json::from_str(&self.cipher.open_str(sealed)?).map_err(|_| {
                        EngineError::Integrity("sealed field does not decode".to_string())
                    })?
                }
                Some(value) => value.clone(),
                None => Value::Null,
            };
            view.insert(field.key.clone(), value);
        }
        for table in descriptor.tables() {
            let rows = record.tables.get(&table.key).cloned().unwrap_or_default();
            view.insert(table.key.clone(), Value::Array(rows));
        }
        Ok(view)
    }

    fn slot(&self, record_id: Uuid) -> EngineResult<Arc<Mutex<Record>>> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(&record_id)
            .cloned()
            .ok_or(EngineError::RecordNotFound)
    }
}

/// Applies one patch according to the per-field/per-table policies.
///
/// Protected fields are checked before anything else happens to the incoming
/// value, so a write rejected by write-once never reaches the cipher and the
/// plaintext is never processed. Keys that match nothing in the live schema
/// are skipped.
fn merge_patch(
    record: &mut Record,
    descriptor: &RecordTypeDescriptor,
    patch: &JsonMap,
    apply_update_logic: bool,
    cipher: &FieldCipher,
) -> EngineResult<()> {
    for (key, value) in patch {
        if let Some(field) = descriptor.field(key) {
            if field.is_protected && has_content(record.fields.get(key)) {
                debug!(key = %key, "protected field already set, ignoring write");
                continue;
            }
            let coerced = coerce_value(field, value)?;
            let stored = match (&coerced, field.is_encrypted) {
                (Value::Null, _) | (_, false) => coerced,
                (other, true) => Value::String(cipher.seal_str(&other.to_string())?),
            };
            record.fields.insert(key.clone(), stored);
        } else if let Some(table) = descriptor.table(key) {
            let rows = value
                .as_array()
                .cloned()
                .ok_or_else(|| EngineError::Validation(format!("{} must be a list of rows", table.name)))?;
            if !apply_update_logic {
                record.tables.insert(key.clone(), rows);
                continue;
            }
            match table.update_logic {
                UpdateLogic::Replace => {
                    record.tables.insert(key.clone(), rows);
                }
                UpdateLogic::Append => {
                    record.tables.entry(key.clone()).or_default().extend(rows);
                }
                UpdateLogic::Merge => {
                    let existing = record.tables.entry(key.clone()).or_default();
                    merge_rows(existing, rows);
                }
            }
        } else {
            debug!(key = %key, "patch key does not match the live schema, ignoring");
        }
    }
    Ok(())
}

/// Index-wise row merge: patch row keys win, missing trailing rows append.
fn merge_rows(existing: &mut Vec<Value>, incoming: Vec<Value>) {
    for (idx, row) in incoming.into_iter().enumerate() {
        if idx >= existing.len() {
            existing.push(row);
            continue;
        }
        match (&mut existing[idx], row) {
            (Value::Object(current), Value::Object(patch_row)) => {
                for (k, v) in patch_row {
                    current.insert(k, v);
                }
            }
            (slot, row) => *slot = row,
        }
    }
}

fn coerce_value(field: &FieldSpec, value: &Value) -> EngineResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match field.kind {
        FieldKind::Text => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            other => Err(type_error(field, "text", other)),
        },
        FieldKind::Number => match value {
            Value::Number(n) => Ok(Value::Number(n.clone())),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| type_error(field, "number", value)),
            other => Err(type_error(field, "number", other)),
        },
        FieldKind::Date => match value {
            Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|_| Value::String(s.clone()))
                .map_err(|_| type_error(field, "date (YYYY-MM-DD)", value)),
            other => Err(type_error(field, "date (YYYY-MM-DD)", other)),
        },
        FieldKind::Boolean => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            other => Err(type_error(field, "boolean", other)),
        },
    }
}

fn type_error(field: &FieldSpec, expected: &str, _got: &Value) -> EngineError {
    EngineError::Validation(format!("{} must be a valid {expected}", field.name))
}

fn has_content(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
