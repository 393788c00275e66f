//! Extractors whose rejections use the `{ ok: false, error }` envelope.

use std::collections::HashMap;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{FromRequest, FromRequestParts, Multipart};

use crate::error::{AppError, Result};

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug)]
pub struct FilePart {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A multipart body split into file parts and text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    files: HashMap<String, FilePart>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(multipart: Result<Multipart, MultipartRejection>) -> Result<Self> {
        let mut multipart = multipart?;
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field.bytes().await?.to_vec();
                    form.files.insert(
                        name,
                        FilePart {
                            filename,
                            content_type,
                            bytes,
                        },
                    );
                }
                None => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    pub fn take_file(&mut self, name: &str) -> Result<FilePart> {
        self.files
            .remove(name)
            .ok_or_else(|| AppError::bad_request(format!("multipart field `{name}` with a file is required")))
    }

    /// Trimmed text field, `None` when absent or blank.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}
