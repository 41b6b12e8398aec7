use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use formbase::auth::token;
use formbase::config::AppConfig;
use formbase::models::{Application, Company, NewApplication, NewRole, NewUser, Role, User};
use formbase::routes;
use formbase::state::AppState;
use formbase::storage::ObjectStorage;
use http_body_util::BodyExt;
use tokio::sync::Mutex;
use tower::util::ServiceExt;

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()> {
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let guard = self.objects.lock().await;
        guard
            .get(key)
            .map(|obj| obj.bytes.clone())
            .ok_or_else(|| anyhow!("object {key} missing"))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }

    #[allow(dead_code)]
    pub async fn remove(&self, key: &str) {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = AppConfig {
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            storage_root: PathBuf::from("unused-in-tests"),
            master_key: "test-master-key".to_string(),
            max_upload_bytes: 64 * 1024 * 1024,
            cors_allowed_origin: None,
        };

        let storage = Arc::new(FakeStorage::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let state = AppState::new(config, storage_for_state);
        let router = routes::create_router(state.clone());

        Self {
            state,
            router,
            storage,
        }
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub fn seed_company(&self, name: &str, key: &str) -> Company {
        self.state
            .directory
            .create_company(name, key)
            .expect("failed to seed company")
    }

    pub fn seed_application(&self, company: &Company, name: &str, key: &str) -> Application {
        self.state
            .directory
            .create_application(NewApplication {
                company_id: company.id,
                name: name.to_string(),
                key: key.to_string(),
                description: None,
                default_queue: None,
                audit_trail: false,
            })
            .expect("failed to seed application")
    }

    pub fn seed_user(&self, company: &Company, email: &str, is_admin: bool, is_root: bool) -> User {
        self.state
            .directory
            .create_user(NewUser {
                company_id: company.id,
                email: email.to_string(),
                name: email.to_string(),
                is_admin,
                is_root,
            })
            .expect("failed to seed user")
    }

    #[allow(dead_code)]
    pub fn seed_role(
        &self,
        application: &Application,
        name: &str,
        api_attachment: bool,
        has_upload: bool,
        has_download: bool,
        has_delete_attachments: bool,
    ) -> Role {
        self.state
            .directory
            .create_role(NewRole {
                application_id: application.id,
                name: name.to_string(),
                api_attachment,
                has_upload,
                has_download,
                has_delete_attachments,
            })
            .expect("failed to seed role")
    }

    #[allow(dead_code)]
    pub fn grant(&self, user: &User, role: &Role) {
        self.state
            .directory
            .grant_role(user.id, role.id)
            .expect("failed to grant role");
    }

    #[allow(dead_code)]
    pub fn api_token(&self, user: &User) -> String {
        token::compose(&user.email, &user.authentication_token)
    }

    #[allow(dead_code)]
    pub fn seed_record(
        &self,
        company: &Company,
        application: &Application,
        actor: &User,
    ) -> formbase::models::Record {
        self.state
            .records
            .create(company, application, &formbase::records::JsonMap::new(), actor)
            .expect("failed to seed record")
    }

    #[allow(dead_code)]
    pub async fn post(&self, path: &str, body: Vec<u8>) -> hyper::Response<Body> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/octet-stream")
            .body(Body::from(body))
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response")
    }

    #[allow(dead_code)]
    pub async fn get(&self, path: &str) -> hyper::Response<Body> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response")
    }
}

#[allow(dead_code)]
pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_to_json(body: Body) -> Result<serde_json::Value> {
    let bytes = body_to_vec(body).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[allow(dead_code)]
pub fn attachments_path(company: &Company, application: &Application, tail: &str) -> String {
    format!("/{}/{}/attachments_api/{tail}", company.key, application.key)
}

#[allow(dead_code)]
pub fn errors_of(value: &serde_json::Value) -> Vec<String> {
    value["errors"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

