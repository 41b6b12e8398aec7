use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::auth::Principal;
use crate::crypto::{open_bytes, seal_bytes, DataKey};
use crate::error::{EngineError, EngineResult};
use crate::models::Attachment;
use crate::records::RecordStore;
use crate::storage::ObjectStorage;

/// Uploads are gated on the file's content type; source-code and other
/// executable-ish types never make it to storage.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/zip",
    "application/json",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "text/plain",
    "text/csv",
];

pub fn content_type_allowed(content_type: &str) -> bool {
    ALLOWED_CONTENT_TYPES.contains(&content_type)
}

/// Binds uploaded binary objects to records. Metadata lives here; the bytes
/// live sealed in object storage under a per-attachment key that no read
/// path ever exposes.
pub struct AttachmentService {
    records: Arc<RecordStore>,
    storage: Arc<dyn ObjectStorage>,
    inner: RwLock<HashMap<Uuid, Attachment>>,
}

impl AttachmentService {
    pub fn new(records: Arc<RecordStore>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            records,
            storage,
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub async fn upload(
        &self,
        record_id: Uuid,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
        uploader: &Principal,
    ) -> EngineResult<Attachment> {
        let record = self.records.get(record_id)?;
        if !content_type_allowed(content_type) {
            warn!(content_type = %content_type, "rejected upload by content type");
            return Err(EngineError::UnsupportedType(content_type.to_string()));
        }

        let checksum = hex::encode(Sha256::digest(&bytes));
        let size = bytes.len() as i64;
        let id = Uuid::new_v4();
        let aes_key = DataKey::generate();
        let sealed = seal_bytes(&aes_key, &bytes)?;
        let storage_key = format!("attachments/{record_id}/{id}");

        self.storage
            .put_object(&storage_key, sealed, Some(content_type.to_string()))
            .await
            .map_err(|err| EngineError::Storage(err.to_string()))?;

        let attachment = Attachment {
            id,
            record_id,
            company_id: record.company_id,
            data_file_name: file_name.to_string(),
            data_content_type: content_type.to_string(),
            data_file_size: size,
            checksum,
            user_email: uploader.email.clone(),
            aes_key,
            storage_key,
            created_at: Utc::now(),
        };

        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(attachment.id, attachment.clone());
        info!(
            attachment_id = %attachment.id,
            record_id = %record_id,
            file_name = %attachment.data_file_name,
            size_bytes = size,
            "stored attachment"
        );
        Ok(attachment)
    }

    pub fn list(&self, record_id: Uuid) -> EngineResult<Vec<Attachment>> {
        self.records.get(record_id)?;
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut attachments: Vec<Attachment> = guard
            .values()
            .filter(|a| a.record_id == record_id)
            .cloned()
            .collect();
        attachments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(attachments)
    }

    /// An attachment id only resolves through its own record; reusing an id
    /// under another record must not leak the object.
    pub async fn download(
        &self,
        record_id: Uuid,
        attachment_id: Uuid,
    ) -> EngineResult<(Attachment, Vec<u8>)> {
        self.records.get(record_id)?;
        let attachment = self.metadata(record_id, attachment_id)?;
        let sealed = self
            .storage
            .get_object(&attachment.storage_key)
            .await
            .map_err(|err| EngineError::Storage(err.to_string()))?;
        let bytes = open_bytes(&attachment.aes_key, &sealed)?;
        if hex::encode(Sha256::digest(&bytes)) != attachment.checksum {
            return Err(EngineError::Integrity(format!(
                "checksum mismatch for attachment {attachment_id}"
            )));
        }
        Ok((attachment, bytes))
    }

    /// Bundles every attachment of the record into one transient archive.
    /// The metadata list is snapshotted first; if an object vanishes before
    /// it is fetched the whole request fails rather than producing a
    /// partial archive.
    pub async fn download_zip(&self, record_id: Uuid) -> EngineResult<Vec<u8>> {
        let attachments = self.list(record_id)?;

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default();
        let mut used_names: HashSet<String> = HashSet::new();

        for attachment in attachments {
            let sealed = self
                .storage
                .get_object(&attachment.storage_key)
                .await
                .map_err(|err| EngineError::Storage(err.to_string()))?;
            let bytes = open_bytes(&attachment.aes_key, &sealed)?;
            let entry_name = unique_entry_name(&mut used_names, &attachment.data_file_name);
            writer
                .start_file(entry_name, options)
                .map_err(|err| EngineError::Storage(err.to_string()))?;
            writer
                .write_all(&bytes)
                .map_err(|err| EngineError::Storage(err.to_string()))?;
        }

        let cursor = writer
            .finish()
            .map_err(|err| EngineError::Storage(err.to_string()))?;
        Ok(cursor.into_inner())
    }

    pub async fn delete(&self, record_id: Uuid, attachment_id: Uuid) -> EngineResult<()> {
        self.records.get(record_id)?;
        let attachment = {
            let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            let owned = guard
                .get(&attachment_id)
                .map(|found| found.record_id == record_id)
                .unwrap_or(false);
            if !owned {
                return Err(EngineError::AttachmentNotFound);
            }
            guard
                .remove(&attachment_id)
                .ok_or(EngineError::AttachmentNotFound)?
        };
        self.storage
            .delete_object(&attachment.storage_key)
            .await
            .map_err(|err| EngineError::Storage(err.to_string()))?;
        info!(attachment_id = %attachment_id, record_id = %record_id, "deleted attachment");
        Ok(())
    }

    fn metadata(&self, record_id: Uuid, attachment_id: Uuid) -> EngineResult<Attachment> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(&attachment_id)
            .filter(|a| a.record_id == record_id)
            .cloned()
            .ok_or(EngineError::AttachmentNotFound)
    }
}

/// Duplicate original file names get a ` (n)` suffix inside the archive so
/// entries never clobber each other.
fn unique_entry_name(used: &mut HashSet<String>, file_name: &str) -> String {
    if used.insert(file_name.to_string()) {
        return file_name.to_string();
    }
    let mut counter = 2usize;
    loop {
        let candidate = match file_name.rsplit_once('.') {
            Some((stem, extension)) => format!("{stem} ({counter}).{extension}"),
            None => format!("{file_name} ({counter})"),
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}
