//! Object storage for generated PDFs, uploads and receipts.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Write the object, replacing any previous content.
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>>;

    /// Remove the object. A missing object is not an error.
    async fn remove(&self, bucket: &str, path: &str) -> Result<()>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

pub fn offer_path(customer_id: Uuid, offer_id: Uuid) -> String {
    format!("customers/{customer_id}/offers/{offer_id}.pdf")
}

pub fn order_path(year: i32, customer_id: Uuid, number: &str) -> String {
    format!("orders/{year}/{customer_id}/{number}.pdf")
}

pub fn invoice_path(year: i32, customer_id: Uuid, number: &str) -> String {
    format!("invoices/{year}/{customer_id}/{number}.pdf")
}

pub fn upload_path(customer_id: Uuid, doc_type: &str, filename: &str) -> String {
    format!(
        "customers/{customer_id}/{doc_type}s/{}-{}",
        Uuid::new_v4(),
        sanitize_filename(filename)
    )
}

pub fn receipt_path(customer_id: Option<Uuid>, extension: &str) -> String {
    let owner = customer_id.map_or_else(|| "unassigned".to_string(), |id| id.to_string());
    format!("receipts/{owner}/{}.{}", Uuid::new_v4(), sanitize_filename(extension))
}

/// Keep letters, digits, dots, dashes and underscores.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() { "file".to_string() } else { cleaned }
}

/// Files on the local disk under `root/<bucket>/<path>`.
pub struct LocalStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(path);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !safe || bucket.is_empty() || path.is_empty() {
            return Err(AppError::Storage(format!("invalid object path `{bucket}/{path}`")));
        }
        Ok(self.root.join(relative))
    }
}

fn storage_error(action: &str, err: std::io::Error) -> AppError {
    AppError::Storage(format!("{action}: {err}"))
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| storage_error("create directory", err))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|err| storage_error("write file", err))
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(bucket, path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound("file")),
            Err(err) => Err(storage_error("read file", err)),
        }
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<()> {
        let target = self.resolve(bucket, path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error("remove file", err)),
        }
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{bucket}/{path}", self.public_base_url)
    }
}

/// Supabase Storage over its REST API, authenticated with the service key.
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseStore {
    pub fn new(base_url: &str, service_key: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{bucket}/{path}", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.service_key)
            .header("apikey", self.service_key.as_str())
    }
}

async fn failure(action: &str, response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    AppError::Storage(format!("{action} failed with {status}: {body}"))
}

#[async_trait]
impl ObjectStore for SupabaseStore {
    fn kind(&self) -> &'static str {
        "supabase"
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let response = self
            .authorized(self.client.post(self.object_url(bucket, path)))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(failure("upload", response).await);
        }
        Ok(())
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let response = self
            .authorized(self.client.get(self.object_url(bucket, path)))
            .send()
            .await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
            return Err(AppError::NotFound("file"));
        }
        if !status.is_success() {
            return Err(failure("download", response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<()> {
        let url = format!("{}/storage/v1/object/{bucket}", self.base_url);
        let response = self
            .authorized(self.client.delete(url))
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(failure("remove", response).await);
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }
}

/// Objects kept in process memory.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), (Vec<u8>, String)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, bucket: &str, path: &str) -> bool {
        self.objects
            .read()
            .await
            .contains_key(&(bucket.to_string(), path.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.objects.write().await.insert(
            (bucket.to_string(), path.to_string()),
            (bytes, content_type.to_string()),
        );
        Ok(())
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), path.to_string()))
            .map(|(bytes, _)| bytes.clone())
            .ok_or(AppError::NotFound("file"))
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<()> {
        self.objects
            .write()
            .await
            .remove(&(bucket.to_string(), path.to_string()));
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }
}
