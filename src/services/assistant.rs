//! Language model collaborator: offer drafts and speech-to-text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::Customer;

const TRANSCRIPTION_MODEL: &str = "whisper-1";
const TRANSCRIPTION_LANGUAGE: &str = "sv";

const OFFER_SYSTEM_PROMPT: &str = "Du skriver offerter för ett svenskt småföretag. \
Svara endast med ett JSON-objekt med fälten title (sträng), amount (nettosumma exkl. moms, tal), \
currency (t.ex. SEK), items (lista av {description, qty, price}) och text (offerttext på svenska).";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftItem {
    #[serde(alias = "name")]
    pub description: String,
    #[serde(default, alias = "quantity")]
    pub qty: f64,
    #[serde(default, alias = "unitPrice")]
    pub price: f64,
}

/// Offer draft proposed by the model.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OfferDraft {
    pub title: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub items: Vec<DraftItem>,
    #[serde(default)]
    pub text: String,
}

fn default_currency() -> String {
    "SEK".to_string()
}

impl OfferDraft {
    /// The stated amount, or the sum of the item lines.
    pub fn net_amount(&self) -> f64 {
        self.amount
            .unwrap_or_else(|| self.items.iter().map(|item| item.qty * item.price).sum())
    }
}

#[derive(Debug, Clone)]
pub struct AudioClip {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Assistant: Send + Sync {
    async fn draft_offer(&self, requirements: &str, customer: Option<&Customer>) -> Result<OfferDraft>;

    async fn transcribe(&self, audio: AudioClip) -> Result<String>;
}

/// OpenAI compatible chat completion and transcription endpoints.
pub struct OpenAiAssistant {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiAssistant {
    pub fn new(config: &Config, api_key: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.openai_model.clone(),
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

fn map_status_error(status: StatusCode, body: &str) -> AppError {
    tracing::warn!(%status, body = %body, "language model request failed");
    match status {
        StatusCode::UNAUTHORIZED => AppError::Upstream("language model rejected the API key".into()),
        StatusCode::PAYMENT_REQUIRED => AppError::Upstream("language model account has no credits".into()),
        StatusCode::TOO_MANY_REQUESTS => AppError::Upstream("language model rate limit reached".into()),
        other => AppError::Upstream(format!("language model answered {other}")),
    }
}

/// User message describing what the offer should cover.
fn offer_prompt(requirements: &str, customer: Option<&Customer>) -> String {
    let mut prompt = format!("Skapa en offert för: {}", requirements.trim());
    if let Some(customer) = customer {
        prompt.push_str(&format!("\nKund: {}", customer.company_name));
        if let Some(contact) = &customer.contact_person {
            prompt.push_str(&format!("\nKontaktperson: {contact}"));
        }
        if let Some(city) = &customer.city {
            prompt.push_str(&format!("\nOrt: {city}"));
        }
    }
    prompt
}

/// Models sometimes wrap JSON in a markdown fence.
fn parse_draft(content: &str) -> Result<OfferDraft> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(body.trim())
        .map_err(|err| AppError::Upstream(format!("language model returned an invalid offer draft: {err}")))
}

#[async_trait]
impl Assistant for OpenAiAssistant {
    async fn draft_offer(&self, requirements: &str, customer: Option<&Customer>) -> Result<OfferDraft> {
        let request: Value = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": OFFER_SYSTEM_PROMPT },
                { "role": "user", "content": offer_prompt(requirements, customer) },
            ],
            "temperature": 0.7,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }

        let completion: ChatResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Upstream("language model returned no answer".into()))?;

        let draft = parse_draft(&content)?;
        tracing::info!(model = %self.model, items = draft.items.len(), "offer draft generated");
        Ok(draft)
    }

    async fn transcribe(&self, audio: AudioClip) -> Result<String> {
        let size = audio.bytes.len();
        let part = Part::bytes(audio.bytes)
            .file_name(audio.filename)
            .mime_str(&audio.content_type)?;
        let form = Form::new()
            .part("file", part)
            .text("model", TRANSCRIPTION_MODEL)
            .text("language", TRANSCRIPTION_LANGUAGE);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }

        let transcription: TranscriptionResponse = response.json().await?;
        tracing::info!(bytes = size, chars = transcription.text.len(), "audio transcribed");
        Ok(transcription.text)
    }
}
