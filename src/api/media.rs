//! Uploads that go through an outside service: OCR and transcription.

use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::extract::{ApiJson, FilePart, UploadForm};
use crate::error::{AppError, Result};
use crate::lifecycle::receipts;
use crate::services::{AudioClip, ImageUpload};
use crate::state::AppState;

impl From<FilePart> for ImageUpload {
    fn from(file: FilePart) -> Self {
        Self {
            filename: file.filename,
            content_type: file.content_type,
            bytes: file.bytes,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Base64Image {
    #[serde(default)]
    image_base64: String,
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

/// Accepts a multipart `file` or a JSON body with `imageBase64`.
pub async fn ocr(State(state): State<AppState>, request: Request) -> Result<Json<Value>> {
    let client = state.ocr()?;

    let image = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &state).await;
        let mut form = UploadForm::read(multipart).await?;
        ImageUpload::from(form.take_file("file")?)
    } else {
        let ApiJson(body) = ApiJson::<Base64Image>::from_request(request, &state).await?;
        if body.image_base64.trim().is_empty() {
            return Err(AppError::bad_request("file or imageBase64 is required"));
        }
        ImageUpload::from_base64(&body.image_base64)?
    };
    image.check_size()?;

    let result = client.recognize(image).await?;
    Ok(Json(json!({ "ok": true, "text": result.text, "fields": result.fields })))
}

pub async fn upload_receipt(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file("file")?;
    let customer_id = form
        .field("customerId")
        .map(|value| value.parse::<Uuid>())
        .transpose()
        .map_err(|err| AppError::bad_request(format!("invalid customerId: {err}")))?;

    let outcome = receipts::store_receipt(&state, ImageUpload::from(file), customer_id).await?;
    let mut body = serde_json::to_value(outcome).map_err(anyhow::Error::from)?;
    body["ok"] = Value::Bool(true);
    Ok(Json(body))
}

pub async fn transcribe(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>> {
    let assistant = state.assistant()?;
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file("audio")?;
    if file.bytes.is_empty() {
        return Err(AppError::bad_request("the audio file is empty"));
    }

    let clip = AudioClip {
        filename: file.filename,
        content_type: file.content_type,
        bytes: file.bytes,
    };
    let text = assistant.transcribe(clip).await?;
    Ok(Json(json!({ "ok": true, "text": text })))
}
