use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "status": "ok" }))
}

/// Which collaborators this deployment talks to.
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "store": state.store.kind(),
        "storage": state.files.kind(),
        "mailer": state.mailer.kind(),
        "assistant": state.assistant.is_some(),
        "ocr": state.ocr.is_some(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
