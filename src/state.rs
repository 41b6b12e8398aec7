use std::sync::Arc;

use crate::{
    attachments::AttachmentService,
    auth::gateway::AuthGateway,
    config::AppConfig,
    crypto::FieldCipher,
    directory::Directory,
    records::RecordStore,
    registry::SchemaRegistry,
    resolver::KeyReferenceResolver,
    storage::ObjectStorage,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub directory: Arc<Directory>,
    pub registry: Arc<SchemaRegistry>,
    pub records: Arc<RecordStore>,
    pub attachments: Arc<AttachmentService>,
    pub resolver: Arc<KeyReferenceResolver>,
    pub gateway: Arc<AuthGateway>,
}

impl AppState {
    pub fn new(config: AppConfig, storage: Arc<dyn ObjectStorage>) -> Self {
        let cipher = Arc::new(FieldCipher::from_master_key(&config.master_key));
        let directory = Arc::new(Directory::new());
        let registry = Arc::new(SchemaRegistry::new());
        let records = Arc::new(RecordStore::new(registry.clone(), cipher));
        let attachments = Arc::new(AttachmentService::new(records.clone(), storage));
        let resolver = Arc::new(KeyReferenceResolver::new(directory.clone()));
        let gateway = Arc::new(AuthGateway::new(directory.clone()));

        Self {
            config: Arc::new(config),
            directory,
            registry,
            records,
            attachments,
            resolver,
            gateway,
        }
    }
}
