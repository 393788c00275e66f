use chrono::{DateTime, NaiveDate, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, StringFormat, dictionary};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::money::format_amount;

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN_X: i64 = 50;
const TOP_Y: i64 = 800;
const BOTTOM_Y: i64 = 60;
const SUMMARY_KEYS: usize = 12;
const SUMMARY_LINE_CHARS: usize = 110;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Offer,
    OrderConfirmation,
    Invoice,
}

impl DocumentKind {
    fn heading(self) -> &'static str {
        match self {
            DocumentKind::Offer => "OFFERT",
            DocumentKind::OrderConfirmation => "ORDERBEKRÄFTELSE",
            DocumentKind::Invoice => "FAKTURA",
        }
    }

    fn default_title(self) -> &'static str {
        match self {
            DocumentKind::Offer => "Offert",
            DocumentKind::OrderConfirmation => "Orderbekräftelse",
            DocumentKind::Invoice => "Faktura",
        }
    }
}

/// Customer block printed on order confirmations and invoices.
#[derive(Debug, Clone, Default)]
pub struct Party {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RowLine {
    pub description: String,
    pub qty: f64,
    pub price: f64,
}

#[derive(Debug, Clone)]
pub struct InvoiceTotals {
    pub due_date: NaiveDate,
    pub subtotal: f64,
    pub vat_percent: f64,
    pub vat_total: f64,
    pub total: f64,
}

/// Everything printed on one document.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub kind: DocumentKind,
    pub customer_id: String,
    pub title: Option<String>,
    pub amount: Option<f64>,
    pub currency: String,
    pub needs_print: bool,
    pub number: Option<String>,
    pub customer: Option<Party>,
    pub rows: Vec<RowLine>,
    pub invoice: Option<InvoiceTotals>,
    /// Free-form payload listed under the summary heading.
    pub data: Value,
    pub issued_at: DateTime<Utc>,
}

impl DocumentInput {
    pub fn new(kind: DocumentKind, customer_id: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            customer_id: customer_id.into(),
            title: None,
            amount: None,
            currency: "SEK".to_string(),
            needs_print: false,
            number: None,
            customer: None,
            rows: Vec::new(),
            invoice: None,
            data: Value::Null,
            issued_at,
        }
    }
}

/// Latin-1 bytes for the WinAnsi fonts; anything outside becomes `?`.
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7e | 0xa0..=0xff => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

/// Text lines laid out top to bottom on a single page.
struct PageWriter {
    operations: Vec<Operation>,
    y: i64,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            operations: Vec::new(),
            y: TOP_Y,
        }
    }

    fn draw(&mut self, text: &str, bold: bool, size: i64) {
        let text = text.trim();
        if !text.is_empty() && self.y >= BOTTOM_Y {
            let font = if bold { "F2" } else { "F1" };
            self.operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![font.into(), Object::Integer(size)]),
                Operation::new("Td", vec![Object::Integer(MARGIN_X), Object::Integer(self.y)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(encode_text(text), StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ]);
        }
        self.y -= size + 8;
    }

    fn gap(&mut self, points: i64) {
        self.y -= points;
    }

    fn has_room(&self) -> bool {
        self.y >= BOTTOM_Y
    }
}

fn summary_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Renders offers, order confirmations and invoices as one-page PDFs.
pub struct DocumentGenerator {
    company_name: String,
}

impl DocumentGenerator {
    pub fn new(company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
        }
    }

    pub fn render(&self, input: &DocumentInput) -> Result<Vec<u8>> {
        let page = self.layout(input);
        write_pdf(page.operations)
    }

    fn layout(&self, input: &DocumentInput) -> PageWriter {
        let mut page = PageWriter::new();

        page.draw(input.kind.heading(), true, 20);
        page.draw(&input.issued_at.format("%Y-%m-%d %H:%M").to_string(), false, 10);
        page.draw(&self.company_name, false, 10);
        page.gap(6);

        page.draw(&format!("Kundkort / Customer ID: {}", input.customer_id), false, 12);
        let title = input
            .title
            .as_deref()
            .unwrap_or_else(|| input.kind.default_title());
        page.draw(&format!("Titel: {title}"), false, 12);
        page.draw(
            &format!("Belopp: {}", format_amount(input.amount.unwrap_or(0.0), &input.currency)),
            false,
            12,
        );
        let print = if input.needs_print { "Ja" } else { "Nej" };
        page.draw(&format!("Markerad för papperskopia: {print}"), false, 12);

        if let Some(customer) = &input.customer {
            page.gap(10);
            page.draw("Kundinformation:", true, 12);
            let fields = [
                ("Företag", &customer.name),
                ("Adress", &customer.address),
                ("Telefon", &customer.phone),
                ("E-post", &customer.email),
            ];
            for (label, value) in fields {
                if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                    page.draw(&format!("{label}: {value}"), false, 12);
                }
            }
        }

        if let Some(number) = &input.number {
            page.gap(10);
            let label = match input.kind {
                DocumentKind::Offer => "Offertnummer",
                DocumentKind::OrderConfirmation => "Ordernummer",
                DocumentKind::Invoice => "Fakturanummer",
            };
            page.draw(&format!("{label}: {number}"), true, 12);
            page.draw(&format!("Datum: {}", input.issued_at.format("%Y-%m-%d")), false, 12);
        }

        if !input.rows.is_empty() {
            page.gap(10);
            page.draw("Rader:", true, 12);
            for row in &input.rows {
                let line = format!(
                    "{}: {} x {} = {}",
                    row.description,
                    row.qty,
                    format_amount(row.price, &input.currency),
                    format_amount(row.qty * row.price, &input.currency),
                );
                page.draw(&truncate(&line), false, 10);
            }
        }

        if let Some(totals) = &input.invoice {
            page.gap(10);
            page.draw(&format!("Förfallodatum: {}", totals.due_date.format("%Y-%m-%d")), true, 12);
            page.draw(
                &format!("Netto: {}", format_amount(totals.subtotal, &input.currency)),
                false,
                12,
            );
            page.draw(
                &format!(
                    "Moms {}%: {}",
                    totals.vat_percent,
                    format_amount(totals.vat_total, &input.currency)
                ),
                false,
                12,
            );
            page.draw(
                &format!("Att betala: {}", format_amount(totals.total, &input.currency)),
                true,
                12,
            );
        }

        page.gap(10);
        page.draw("Sammanfattning av data:", true, 12);
        if let Value::Object(map) = &input.data {
            for (key, value) in map.iter().take(SUMMARY_KEYS) {
                if !page.has_room() {
                    break;
                }
                if let Some(value) = summary_value(value) {
                    page.draw(&truncate(&format!("{key}: {value}")), false, 10);
                }
            }
        }

        page
    }
}

fn truncate(line: &str) -> String {
    line.chars().take(SUMMARY_LINE_CHARS).collect()
}

fn font(base: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn write_pdf(operations: Vec<Operation>) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(font("Helvetica"));
    let bold_id = doc.add_object(font("Helvetica-Bold"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => Object::Integer(1),
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(PAGE_WIDTH),
            Object::Integer(PAGE_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|err| AppError::Pdf(err.to_string()))?;
    Ok(bytes)
}
