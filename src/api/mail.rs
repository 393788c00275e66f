use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use super::extract::ApiJson;
use crate::error::Result;
use crate::lifecycle::inbox::{self, ForwardedMail};
use crate::services::OutgoingMail;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SendEmail {
    #[serde(default)]
    to: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    text: String,
}

pub async fn send_email(State(state): State<AppState>, ApiJson(body): ApiJson<SendEmail>) -> Result<Json<Value>> {
    let mail = OutgoingMail {
        to: body.to.trim().to_string(),
        subject: body.subject,
        text: body.text,
        attachment: None,
    };
    mail.validate()?;
    state.mailer.send(&mail).await?;
    Ok(Json(json!({ "ok": true, "mailer": state.mailer.kind() })))
}

/// Supplier invoice forwarded by mail. Nothing is stored; the caller
/// decides what to book.
pub async fn email_forward(
    State(state): State<AppState>,
    ApiJson(mail): ApiJson<ForwardedMail>,
) -> Result<Json<Value>> {
    let invoice = inbox::read_forwarded_invoice(&state, mail).await?;
    Ok(Json(json!({ "ok": true, "invoice": invoice })))
}
