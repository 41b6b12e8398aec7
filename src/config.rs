use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub storage_root: PathBuf,
    pub master_key: String,
    pub max_upload_bytes: usize,
    pub cors_allowed_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let storage_root = env::var("STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let master_key = env::var("MASTER_KEY").context("MASTER_KEY must be set")?;
        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();

        Ok(Self {
            server_host,
            server_port,
            storage_root,
            master_key,
            max_upload_bytes,
            cors_allowed_origin,
        })
    }

    pub fn redacted_master_key(&self) -> String {
        redact_secret(&self.master_key)
    }
}

fn redact_secret(raw: &str) -> String {
    if raw.is_empty() {
        return "***".to_string();
    }
    format!("***({} chars)", raw.chars().count())
}
