//! HTTP surface. Every JSON answer carries `ok`; failures go through
//! `AppError`.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::StorageBackend;
use crate::state::AppState;

mod bookkeeping;
mod customers;
mod documents;
mod extract;
mod health;
mod invoices;
mod mail;
mod media;
mod offers;
mod orders;
mod time;

/// Uploads (receipts, audio, PDFs) may be large.
const BODY_LIMIT: usize = 25 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(health::health))
        .route("/api/health", get(health::status))
        .route("/generate-offer", post(offers::generate_offer_pdf))
        .route("/api/send-email", post(mail::send_email))
        .route("/api/email-forward", post(mail::email_forward))
        .nest("/api/customers", customers::routes())
        .nest("/api/offers", offers::routes())
        .nest("/api/orders", orders::routes())
        .nest("/api/invoices", invoices::routes())
        .nest("/api/documents", documents::routes())
        .nest("/api/bookkeeping", bookkeeping::routes())
        .nest("/api/time-entries", time::routes())
        .route("/api/ocr", post(media::ocr))
        .route("/api/receipts", post(media::upload_receipt))
        .route("/api/transcribe", post(media::transcribe));

    if state.config.storage_backend == StorageBackend::Local {
        let files = ServeDir::new(&state.config.storage_root);
        app = app.nest_service("/files", files);
    }

    app.layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
