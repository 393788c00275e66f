use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rstest::rstest;
use serde_json::{Value, json};
use tower::ServiceExt;

use paperflow::config::Config;
use paperflow::error::Result;
use paperflow::extract::ReceiptFields;
use paperflow::models::Customer;
use paperflow::services::assistant::DraftItem;
use paperflow::services::{
    Assistant, AudioClip, ImageUpload, LogMailer, MemoryObjectStore, OcrClient, OcrResult, OfferDraft,
};
use paperflow::{AppState, api};

struct TestApp {
    router: Router,
    mailer: Arc<LogMailer>,
    files: Arc<MemoryObjectStore>,
}

/// OCR service stand-in that reads the same text from every file.
struct FixedOcr {
    text: &'static str,
    fields: ReceiptFields,
}

#[async_trait]
impl OcrClient for FixedOcr {
    async fn recognize(&self, _image: ImageUpload) -> Result<OcrResult> {
        Ok(OcrResult {
            text: self.text.to_string(),
            fields: self.fields.clone(),
        })
    }
}

struct ScriptedAssistant;

#[async_trait]
impl Assistant for ScriptedAssistant {
    async fn draft_offer(&self, requirements: &str, customer: Option<&Customer>) -> Result<OfferDraft> {
        Ok(OfferDraft {
            title: format!("Offert: {requirements}"),
            amount: None,
            currency: "SEK".into(),
            items: vec![DraftItem {
                description: format!("Arbete åt {}", customer.map_or("okänd", |c| c.company_name.as_str())),
                qty: 2.0,
                price: 500.0,
            }],
            text: "Hej!".into(),
        })
    }

    async fn transcribe(&self, _audio: AudioClip) -> Result<String> {
        Ok("tre timmar målning".into())
    }
}

fn app() -> TestApp {
    app_with(|state| state)
}

fn app_with(configure: impl FnOnce(AppState) -> AppState) -> TestApp {
    let config = Config::from_pairs(vec![
        ("STORAGE_BACKEND".to_string(), "memory".to_string()),
        ("COMPANY_NAME".to_string(), "Paperflow Test AB".to_string()),
    ])
    .unwrap();
    let mailer = Arc::new(LogMailer::new());
    let files = Arc::new(MemoryObjectStore::new());
    let state = AppState::in_memory(config)
        .with_mailer(mailer.clone())
        .with_files(files.clone());
    let state = configure(state);
    TestApp {
        router: api::router(state),
        mailer,
        files,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>, Option<String>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|value| value.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec(), content_type)
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let (status, bytes, _) = self.send(request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(body)).await
    }

    async fn create_customer(&self, name: &str, email: &str) -> String {
        let (status, body) = self
            .post("/api/customers", json!({ "companyName": name, "email": email, "city": "Malmö" }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["customer"]["id"].as_str().unwrap().to_string()
    }

    async fn create_offer(&self, customer_id: &str, amount: f64) -> String {
        let (status, body) = self
            .post("/api/offers", json!({ "customerId": customer_id, "title": "Arbete", "amount": amount }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["offer"]["id"].as_str().unwrap().to_string()
    }

    /// Customer, offer, order and invoice. Returns the invoice id.
    async fn create_invoice(&self) -> String {
        let customer_id = self.create_customer("Faktura AB", "ekonomi@faktura.se").await;
        let offer_id = self.create_offer(&customer_id, 4000.0).await;
        let (_, body) = self.post(&format!("/api/offers/{offer_id}/to-order"), json!({})).await;
        let order_id = body["order"]["id"].as_str().unwrap().to_string();
        let (status, body) = self.post(&format!("/api/orders/{order_id}/to-invoice"), json!({})).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["invoice"]["id"].as_str().unwrap().to_string()
    }
}

fn multipart(file_field: &str, filename: &str, content_type: &str, bytes: &[u8], fields: &[(&str, &str)]) -> Body {
    let boundary = "paperflow-test-boundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{file_field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Body::from(body)
}

fn multipart_request(uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=paperflow-test-boundary")
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn health_reports_in_memory_collaborators() {
    let app = app();

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, body) = app.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "memory");
    assert_eq!(body["storage"], "memory");
    assert_eq!(body["assistant"], false);
    assert_eq!(body["ocr"], false);
}

#[tokio::test]
async fn customers_get_numbers_and_can_be_searched() {
    let app = app();
    let id = app.create_customer("Acme Bygg AB", "info@acme.se").await;

    let (status, body) = app.get(&format!("/api/customers/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["customer"]["customerNumber"].as_str().unwrap().starts_with("K-"));
    assert_eq!(body["customer"]["country"], "Sverige");

    let (status, body) = app.post("/api/customers/search", json!({ "companyName": "acme" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["customers"].as_array().unwrap().len(), 1);

    let (status, body) = app.post("/api/customers/search", json!({ "email": "nobody@example.com" })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["customers"].as_array().unwrap().is_empty());

    let (status, body) = app.post("/api/customers/search", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn customer_requires_a_company_name() {
    let app = app();
    let (status, body) = app.post("/api/customers", json!({ "email": "x@y.se" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn malformed_json_uses_the_error_envelope() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/customers")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, bytes, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ok"], false);
    assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_path_id_is_a_bad_request() {
    let app = app();
    let (status, body) = app.get("/api/orders/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn unknown_records_are_not_found() {
    let app = app();
    let missing = "6f1c1d3e-8a55-4a7e-9a52-0d1f3b2c4e5a";

    let (status, body) = app.get(&format!("/api/invoices/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["ok"], false);

    let (status, _) = app
        .post("/api/offers", json!({ "customerId": missing, "title": "Test", "amount": 100 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn offer_to_order_to_invoice_to_bookkeeping() {
    let app = app();
    let customer_id = app.create_customer("Kund AB", "kund@example.se").await;

    let (status, body) = app
        .post(
            "/api/offers",
            json!({
                "customerId": customer_id,
                "title": "Ny webbplats",
                "amount": 10000,
                "data": { "items": [{ "name": "Design och utveckling", "qty": 1, "price": 10000 }] }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let offer = &body["offer"];
    assert_eq!(offer["status"], "draft");
    assert_eq!(offer["currency"], "SEK");
    assert!(offer["number"].as_str().unwrap().starts_with("OFF-"));
    let offer_id = offer["id"].as_str().unwrap().to_string();

    let (status, body) = app.post(&format!("/api/offers/{offer_id}/to-order"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let order = &body["order"];
    assert_eq!(order["total"].as_f64(), Some(10000.0));
    assert_eq!(order["data"]["rows"].as_array().unwrap().len(), 1);
    let order_id = order["id"].as_str().unwrap().to_string();

    let (_, body) = app.get(&format!("/api/offers/{offer_id}")).await;
    assert_eq!(body["offer"]["status"], "accepted");

    let (status, body) = app
        .post(
            &format!("/api/orders/{order_id}/add-item"),
            json!({ "description": "Extra sida", "quantity": 3, "unitPrice": 300 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["item"]["approved"], false);
    let item_id = body["item"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(
            &format!("/api/orders/{order_id}/approve-item"),
            json!({ "itemId": item_id, "approvedBy": "Anna" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app.post(&format!("/api/orders/{order_id}/to-invoice"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let invoice = &body["invoice"];
    assert_eq!(invoice["subtotal"].as_f64(), Some(10900.0));
    assert_eq!(invoice["vatTotal"].as_f64(), Some(2725.0));
    assert_eq!(invoice["total"].as_f64(), Some(13625.0));
    assert_eq!(invoice["status"], "created");
    let invoice_id = invoice["id"].as_str().unwrap().to_string();

    let (status, body) = app.post(&format!("/api/orders/{order_id}/to-invoice"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["ok"], false);

    let (status, _) = app
        .post(
            &format!("/api/orders/{order_id}/add-item"),
            json!({ "description": "För sent", "quantity": 1, "unitPrice": 100 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .post(&format!("/api/invoices/{invoice_id}/export-bookkeeping"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["invoice"]["status"], "exported");
    assert_eq!(body["entry"]["amountInclVat"].as_f64(), Some(13625.0));
    assert_eq!(body["entry"]["counterparty"], "Kund AB");

    let (status, _) = app
        .post(&format!("/api/invoices/{invoice_id}/export-bookkeeping"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app.get("/api/bookkeeping/entries").await;
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);

    let (_, body) = app.get(&format!("/api/customers/{customer_id}/flow")).await;
    assert_eq!(body["flow"]["orderCreated"], true);
    assert_eq!(body["flow"]["invoiceCreated"], true);

    let (_, body) = app.get(&format!("/api/customers/{customer_id}/related-docs")).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["documents"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn sending_an_invoice_mails_the_pdf() {
    let app = app();
    let customer_id = app.create_customer("Mottagare AB", "ekonomi@mottagare.se").await;
    let (_, body) = app
        .post("/api/offers", json!({ "customerId": customer_id, "title": "Support", "amount": 2000 }))
        .await;
    let offer_id = body["offer"]["id"].as_str().unwrap().to_string();
    let (_, body) = app.post(&format!("/api/offers/{offer_id}/to-order"), json!({})).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();
    let (_, body) = app.post(&format!("/api/orders/{order_id}/to-invoice"), json!({})).await;
    let invoice_id = body["invoice"]["id"].as_str().unwrap().to_string();
    let number = body["invoice"]["number"].as_str().unwrap().to_string();

    let (status, body) = app.post(&format!("/api/invoices/{invoice_id}/send"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["invoice"]["status"], "sent");
    assert!(body["invoice"]["sentAt"].is_string());

    let sent = app.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ekonomi@mottagare.se");
    assert_eq!(sent[0].subject, format!("Faktura {number} från Paperflow Test AB"));
    let attachment = sent[0].attachment.as_ref().unwrap();
    assert!(attachment.bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn send_email_validates_the_recipient() {
    let app = app();
    let (status, body) = app
        .post("/api/send-email", json!({ "to": "inte-en-adress", "subject": "Hej", "text": "Test" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert!(app.mailer.sent().await.is_empty());

    let (status, _) = app
        .post("/api/send-email", json!({ "to": "a@b.se", "subject": "Hej", "text": "Test" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.mailer.sent().await.len(), 1);
}

#[rstest]
#[case("/api/offers/generate", json!({ "requirements": "En hemsida med fem sidor" }))]
#[case("/api/ocr", json!({ "imageBase64": "aGVsbG8gd29ybGQgaGVsbG8=" }))]
#[tokio::test]
async fn unconfigured_collaborators_are_unavailable(#[case] uri: &str, #[case] body: Value) {
    let app = app();
    let (status, body) = app.post(uri, body).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn transcription_without_a_provider_is_unavailable() {
    let app = app();
    let request = multipart_request("/api/transcribe", multipart("audio", "memo.webm", "audio/webm", b"abcdefghijkl", &[]));
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn receipts_are_stored_without_ocr() {
    let app = app();
    let customer_id = app.create_customer("Kvitto AB", "k@kvitto.se").await;
    let image = vec![0xFF_u8; 64];
    let request = multipart_request(
        "/api/receipts",
        multipart("file", "kvitto.jpg", "image/jpeg", &image, &[("customerId", &customer_id)]),
    );

    let (status, bytes, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["document"]["docType"], "receipt");
    assert!(body["ocrError"].is_string());
    assert!(body["entry"].is_null());

    let path = body["document"]["storagePath"].as_str().unwrap();
    assert!(path.starts_with(&format!("receipts/{customer_id}/")));
    assert!(app.files.contains("paperflow-files", path).await);
}

#[tokio::test]
async fn uploaded_documents_can_be_viewed_and_deleted() {
    let app = app();
    let customer_id = app.create_customer("Dokument AB", "d@dokument.se").await;
    let request = multipart_request(
        &format!("/api/customers/{customer_id}/documents"),
        multipart("file", "avtal.pdf", "application/pdf", b"%PDF-1.4 test", &[("docType", "order")]),
    );
    let (status, bytes, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["document"]["docType"], "order");
    let document_id = body["document"]["id"].as_str().unwrap().to_string();

    let view = Request::builder()
        .uri(format!("/api/documents/{document_id}/view"))
        .body(Body::empty())
        .unwrap();
    let (status, bytes, content_type) = app.send(view).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/pdf"));
    assert_eq!(bytes, b"%PDF-1.4 test");

    let (status, _) = app.call(Method::DELETE, &format!("/api/documents/{document_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.files.is_empty().await);

    let (_, body) = app.get(&format!("/api/documents?customerId={customer_id}")).await;
    assert!(body["documents"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn manual_bookkeeping_entries_show_up_in_the_sie_export() {
    let app = app();
    let (status, body) = app
        .post(
            "/api/bookkeeping/entries",
            json!({
                "title": "Konsultarvode",
                "amount": 1250,
                "invoiceUrl": "https://files.example.se/fakturor/F-2025-0042.pdf"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["entry"]["vatAmount"].as_f64(), Some(250.0));
    assert_eq!(body["entry"]["reference"], "F-2025-0042.pdf");

    let request = Request::builder()
        .uri("/api/bookkeeping/export?format=sie")
        .body(Body::empty())
        .unwrap();
    let (status, bytes, content_type) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain"));
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("#FNAMN \"Paperflow Test AB\""));
    assert!(text.contains("#VER"));
}

#[tokio::test]
async fn time_entries_feed_the_statistics() {
    let app = app();
    let customer_id = app.create_customer("Tid AB", "t@tid.se").await;

    for (minutes, billable) in [(90, true), (30, false)] {
        let (status, body) = app
            .post(
                "/api/time-entries",
                json!({
                    "workDate": "2025-03-03",
                    "minutes": minutes,
                    "customerId": customer_id,
                    "project": "Webb",
                    "billable": billable
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["entry"]["customerName"], "Tid AB");
    }

    let (status, _) = app.post("/api/time-entries", json!({ "minutes": 0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.get("/api/time-entries/stats?from=2025-03-01&to=2025-03-31").await;
    assert_eq!(body["stats"]["totalMinutes"], 120);
    assert_eq!(body["stats"]["billableMinutes"], 90);
    assert_eq!(body["stats"]["nonBillableMinutes"], 30);

    let (_, body) = app.get("/api/time-entries?from=2025-04-01").await;
    assert!(body["entries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn parse_extracts_offer_fields() {
    let app = app();
    let (status, body) = app
        .post(
            "/api/offers/parse",
            json!({ "text": "Företag: Exempel AB\nE-post: hej@exempel.se\nOrg.nr: 556677-8899" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fields"]["email"], "hej@exempel.se");
}

#[tokio::test]
async fn paid_invoice_is_not_exported_twice() {
    let app = app();
    let invoice_id = app.create_invoice().await;

    let (status, body) = app
        .post(&format!("/api/invoices/{invoice_id}/export-bookkeeping"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["invoice"]["exportedAt"].is_string());

    let (status, body) = app.post(&format!("/api/invoices/{invoice_id}/mark-paid"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["invoice"]["status"], "paid");
    assert!(body["invoice"]["paidAt"].is_string());
    assert!(body["invoice"]["exportedAt"].is_string());

    let (status, body) = app
        .post(&format!("/api/invoices/{invoice_id}/export-bookkeeping"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (_, body) = app.get("/api/bookkeeping/entries").await;
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn offer_status_can_be_set_freely_but_only_to_known_values() {
    let app = app();
    let customer_id = app.create_customer("Status AB", "s@status.se").await;
    let offer_id = app.create_offer(&customer_id, 1000.0).await;

    for status in ["accepted", "draft"] {
        let (code, body) = app
            .post(
                "/api/offers/update-status",
                json!({ "offerId": offer_id, "customerId": customer_id, "status": status }),
            )
            .await;
        assert_eq!(code, StatusCode::OK, "{body}");
        assert_eq!(body["offer"]["status"], status);
    }

    let (code, body) = app
        .post(
            "/api/offers/update-status",
            json!({ "offerId": offer_id, "customerId": customer_id, "status": "archived" }),
        )
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);

    let other = app.create_customer("Annan AB", "a@annan.se").await;
    let (code, _) = app
        .post(
            "/api/offers/update-status",
            json!({ "offerId": offer_id, "customerId": other, "status": "sent" }),
        )
        .await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_an_offer_needs_the_owning_customer() {
    let app = app();
    let customer_id = app.create_customer("Radera AB", "r@radera.se").await;
    let other = app.create_customer("Annan AB", "a@annan.se").await;
    let offer_id = app.create_offer(&customer_id, 800.0).await;
    assert!(!app.files.is_empty().await);

    let (status, _) = app
        .post("/api/offers/delete", json!({ "offerId": offer_id, "customerId": other }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .post("/api/offers/delete", json!({ "offerId": offer_id, "customerId": customer_id }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = app.get(&format!("/api/offers/{offer_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.files.is_empty().await);
    let (_, body) = app.get(&format!("/api/documents?customerId={customer_id}")).await;
    assert!(body["documents"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn import_merges_creates_and_skips() {
    let app = app();
    let existing = app.create_customer("Acme Bygg AB", "info@acme.se").await;
    let (_, body) = app.get(&format!("/api/customers/{existing}")).await;
    let taken = body["customer"]["customerNumber"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(
            "/api/customers/import",
            json!({ "customers": [
                { "companyName": "Acme Bygg AB", "phone": "08-123 45 67" },
                { "namn": "Ny Kund AB", "epost": "ny@kund.se", "kundnummer": taken },
                { "email": "utan@namn.se" },
            ] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["updated"], 1);
    assert_eq!(body["created"], 1);
    assert_eq!(body["skipped"], 1);

    let customers = body["customers"].as_array().unwrap();
    assert_eq!(customers[0]["id"], existing.as_str());
    assert_eq!(customers[0]["phone"], "08-123 45 67");
    assert_eq!(customers[1]["companyName"], "Ny Kund AB");
    assert_ne!(customers[1]["customerNumber"], taken.as_str());

    let (_, body) = app.get("/api/customers").await;
    assert_eq!(body["customers"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn assistant_offer_creates_the_customer_and_keeps_the_text() {
    let app = app();
    let customer_id = "0b7a5f2e-3c4d-4e5f-8a9b-1c2d3e4f5a6b";

    let (status, body) = app
        .post(
            "/api/offers/create-from-gpt",
            json!({ "customerId": customer_id, "jsonData": { "titel": "Målning" }, "textData": "Offerttext" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = app
        .post(
            "/api/offers/create-from-gpt",
            json!({
                "customerId": customer_id,
                "jsonData": {
                    "kund": { "namn": "Måleri Nord AB", "epost": "info@malerinord.se" },
                    "titel": "Målning",
                    "summa": "5 000",
                },
                "textData": "Offerttext"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["customer"]["id"], customer_id);
    assert_eq!(body["customer"]["companyName"], "Måleri Nord AB");
    assert_eq!(body["offer"]["title"], "Målning");
    assert_eq!(body["offer"]["amount"].as_f64(), Some(5000.0));
    assert_eq!(body["offer"]["data"]["textData"], "Offerttext");

    let (status, body) = app
        .post(
            "/api/offers/create-from-gpt",
            json!({ "customerId": customer_id, "jsonData": {}, "textData": "Andra offerten" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["offer"]["title"], "Offert");
    let (_, body) = app.get(&format!("/api/offers?customerId={customer_id}")).await;
    assert_eq!(body["offers"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn deleting_a_customer_removes_records_and_files() {
    let app = app();
    let customer_id = app.create_customer("Borta AB", "b@borta.se").await;
    let keep = app.create_customer("Kvar AB", "k@kvar.se").await;
    let offer_id = app.create_offer(&customer_id, 1200.0).await;
    let (_, body) = app.post(&format!("/api/offers/{offer_id}/to-order"), json!({})).await;
    let order_id = body["order"]["id"].as_str().unwrap().to_string();
    let request = multipart_request(
        &format!("/api/customers/{customer_id}/documents"),
        multipart("file", "ritning.pdf", "application/pdf", b"%PDF-1.4 ritning", &[]),
    );
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.call(Method::DELETE, &format!("/api/customers/{customer_id}"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["filesRemoved"], 3);
    assert!(app.files.is_empty().await);

    for uri in [
        format!("/api/customers/{customer_id}"),
        format!("/api/offers/{offer_id}"),
        format!("/api/orders/{order_id}"),
    ] {
        let (status, _) = app.get(&uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
    let (status, _) = app.get(&format!("/api/customers/{keep}")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.call(Method::DELETE, &format!("/api/customers/{customer_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn receipt_ocr() -> Arc<FixedOcr> {
    Arc::new(FixedOcr {
        text: "Faktura från: Hyrverket AB\nFakturanummer: 7781\nAtt betala: 4 000,00 kr",
        fields: ReceiptFields {
            company: Some("Clas Ohlson".into()),
            total: Some(250.0),
            vat: Some(50.0),
        },
    })
}

#[tokio::test]
async fn recognized_receipt_is_booked() {
    let app = app_with(|state| state.with_ocr(receipt_ocr()));
    let image = vec![0xFF_u8; 64];
    let request = multipart_request("/api/receipts", multipart("file", "kvitto.png", "image/png", &image, &[]));

    let (status, bytes, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["ocrError"].is_null());
    assert_eq!(body["entry"]["kind"], "receipt");
    assert_eq!(body["entry"]["counterparty"], "Clas Ohlson");
    assert_eq!(body["entry"]["amountInclVat"].as_f64(), Some(250.0));
    assert_eq!(body["entry"]["vatAmount"].as_f64(), Some(50.0));
    assert!(body["document"]["storagePath"].as_str().unwrap().starts_with("receipts/unassigned/"));

    let (_, body) = app.get("/api/bookkeeping/entries").await;
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn generated_draft_reports_its_net_amount() {
    let app = app_with(|state| state.with_assistant(Arc::new(ScriptedAssistant)));
    let customer_id = app.create_customer("Utkast AB", "u@utkast.se").await;

    let (status, body) = app
        .post(
            "/api/offers/generate",
            json!({ "requirements": "Måla om kontoret", "customerId": customer_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["draft"]["title"], "Offert: Måla om kontoret");
    assert_eq!(body["draft"]["items"][0]["description"], "Arbete åt Utkast AB");
    assert_eq!(body["netAmount"].as_f64(), Some(1000.0));

    let (status, _) = app.post("/api/offers/generate", json!({ "requirements": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn transcription_returns_the_text() {
    let app = app_with(|state| state.with_assistant(Arc::new(ScriptedAssistant)));
    let request = multipart_request("/api/transcribe", multipart("audio", "memo.webm", "audio/webm", b"abcdefghijkl", &[]));
    let (status, bytes, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["text"], "tre timmar målning");
}

#[tokio::test]
async fn forwarded_invoice_is_read_from_the_body() {
    let app = app();
    let (status, body) = app
        .post(
            "/api/email-forward",
            json!({
                "from": "Ekonomi <faktura@el-bolaget.se>",
                "subject": "Faktura 2031",
                "body": "Fakturanummer: 2031\nAtt betala: 1 250,00 kr\nFörfallodatum: 2025-05-31"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let invoice = &body["invoice"];
    assert_eq!(invoice["source"], "email_body");
    assert_eq!(invoice["vendor"], "El Bolaget");
    assert_eq!(invoice["amount"].as_f64(), Some(1250.0));
    assert_eq!(invoice["invoiceNumber"], "2031");
    assert_eq!(invoice["dueDate"], "2025-05-31");

    let (status, body) = app.post("/api/email-forward", json!({ "body": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn forwarded_pdf_goes_through_ocr() {
    let app = app_with(|state| state.with_ocr(receipt_ocr()));
    let pdf = STANDARD.encode(b"%PDF-1.4 faktura");

    let (status, body) = app
        .post(
            "/api/email-forward",
            json!({
                "from": "noreply@hyrverket.se",
                "subject": "Din faktura",
                "body": "Se bilaga.",
                "attachments": [{ "filename": "faktura.pdf", "contentType": "application/pdf", "content": pdf }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["invoice"]["source"], "email_pdf");
    assert_eq!(body["invoice"]["vendor"], "Hyrverket AB");
    assert_eq!(body["invoice"]["amount"].as_f64(), Some(4000.0));
    assert_eq!(body["invoice"]["invoiceNumber"], "7781");

    let (status, _) = app
        .post(
            "/api/email-forward",
            json!({
                "from": "noreply@hyrverket.se",
                "attachments": [{ "filename": "trasig.pdf", "contentType": "application/pdf", "content": "%%%" }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn offer_pdf_is_rendered_without_storing_anything() {
    let app = app();
    let (status, body) = app
        .post(
            "/generate-offer",
            json!({ "offer": {
                "title": "Takbyte",
                "date": "2025-03-01",
                "customer": { "name": "Tak AB" },
                "items": [{ "name": "Plåt", "qty": 10, "price": "120" }]
            } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let pdf = STANDARD.decode(body["pdfBase64"].as_str().unwrap()).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
    assert!(app.files.is_empty().await);

    let (status, _) = app.post("/generate-offer", json!("bara text")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
