use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::crypto::DataKey;

/// Top-level tenant. Everything else belongs to exactly one company,
/// directly or through its application.
#[derive(Debug, Clone)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Application {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub key: String,
    pub description: Option<String>,
    pub default_queue: Option<String>,
    pub audit_trail: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewApplication {
    pub company_id: Uuid,
    pub name: String,
    pub key: String,
    pub description: Option<String>,
    pub default_queue: Option<String>,
    pub audit_trail: bool,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub name: String,
    pub authentication_token: String,
    pub is_admin: bool,
    pub is_root: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewUser {
    pub company_id: Uuid,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
    pub is_root: bool,
}

/// Named set of boolean abilities, scoped to one application.
#[derive(Debug, Clone)]
pub struct Role {
    pub id: Uuid,
    pub application_id: Uuid,
    pub name: String,
    pub api_attachment: bool,
    pub has_upload: bool,
    pub has_download: bool,
    pub has_delete_attachments: bool,
}

#[derive(Debug)]
pub struct NewRole {
    pub application_id: Uuid,
    pub name: String,
    pub api_attachment: bool,
    pub has_upload: bool,
    pub has_download: bool,
    pub has_delete_attachments: bool,
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub id: Uuid,
    pub application_id: Uuid,
    pub name: String,
    pub key: String,
    pub created_at: DateTime<Utc>,
}

/// Environments reference schedules by key; the per-key value is opaque
/// schedule-instance configuration owned by the caller.
#[derive(Debug, Clone)]
pub struct Environment {
    pub id: Uuid,
    pub application_id: Uuid,
    pub name: String,
    pub schedule_list: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Immutable provenance stamped once when a record is created. Keys, not
/// ids, so the stamp survives later entity renames untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemProvenance {
    pub created_by: String,
    pub application_key: String,
    pub company_key: String,
    pub created_at: DateTime<Utc>,
}

/// A dynamically typed instance of an application's live schema. Field and
/// table payloads are keyed by schema key; values for encrypted fields are
/// stored sealed.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: Uuid,
    pub company_id: Uuid,
    pub application_id: Uuid,
    pub fields: serde_json::Map<String, Value>,
    pub tables: HashMap<String, Vec<Value>>,
    pub system: SystemProvenance,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub id: Uuid,
    pub record_id: Uuid,
    pub company_id: Uuid,
    pub data_file_name: String,
    pub data_content_type: String,
    pub data_file_size: i64,
    pub checksum: String,
    pub user_email: String,
    pub aes_key: DataKey,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}
