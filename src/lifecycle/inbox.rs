//! Supplier invoices that arrive as forwarded mail.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::extract::{ForwardedInvoice, extract_forwarded_invoice, vendor_from_sender};
use crate::services::ocr::ImageUpload;
use crate::state::AppState;

const PDF: &str = "application/pdf";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct MailAttachmentIn {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub content_type: String,
    /// Base64 encoded file.
    #[serde(alias = "contentBase64")]
    pub content: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ForwardedMail {
    pub from: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<MailAttachmentIn>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceSource {
    EmailPdf,
    EmailBody,
    EmailSender,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InboxInvoice {
    #[serde(flatten)]
    pub fields: ForwardedInvoice,
    pub source: InvoiceSource,
}

/// OCR each PDF attachment until one yields a vendor or an amount.
async fn from_attachments(state: &AppState, mail: &ForwardedMail) -> Result<Option<ForwardedInvoice>> {
    let pdfs: Vec<&MailAttachmentIn> = mail
        .attachments
        .iter()
        .filter(|attachment| attachment.content_type.eq_ignore_ascii_case(PDF))
        .collect();
    if pdfs.is_empty() {
        return Ok(None);
    }
    let client = match state.ocr() {
        Ok(client) => client,
        Err(err) => {
            tracing::info!(error = %err, attachments = pdfs.len(), "skipping PDF attachments");
            return Ok(None);
        }
    };

    for attachment in pdfs {
        let bytes = STANDARD.decode(attachment.content.trim()).map_err(|err| {
            AppError::bad_request(format!("attachment `{}` is not valid base64: {err}", attachment.filename))
        })?;
        let upload = ImageUpload {
            filename: attachment.filename.clone(),
            content_type: PDF.to_string(),
            bytes,
        };
        let result = match client.recognize(upload).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(error = %err, filename = %attachment.filename, "attachment OCR failed");
                continue;
            }
        };

        let mut fields = extract_forwarded_invoice(&result.text);
        fields.vendor = fields.vendor.or(result.fields.company);
        fields.amount = fields.amount.or(result.fields.total);
        if fields.is_usable() {
            return Ok(Some(fields));
        }
    }
    Ok(None)
}

/// Read vendor, amount, invoice number and due date from a forwarded mail.
///
/// PDF attachments are tried first, then the body. When neither yields
/// anything the sender's domain names the vendor.
pub async fn read_forwarded_invoice(state: &AppState, mail: ForwardedMail) -> Result<InboxInvoice> {
    if let Some(fields) = from_attachments(state, &mail).await? {
        tracing::info!(from = %mail.from, vendor = ?fields.vendor, amount = ?fields.amount, "invoice read from attachment");
        return Ok(InboxInvoice {
            fields,
            source: InvoiceSource::EmailPdf,
        });
    }

    let sender = vendor_from_sender(&mail.from);
    let mut fields = extract_forwarded_invoice(&mail.body);
    let source = if fields.is_usable() {
        InvoiceSource::EmailBody
    } else {
        fields = ForwardedInvoice::default();
        InvoiceSource::EmailSender
    };
    if fields.vendor.is_none() && !sender.is_empty() {
        fields.vendor = Some(sender);
    }
    if !fields.is_usable() {
        return Err(AppError::bad_request("could not extract invoice data from the mail"));
    }

    tracing::info!(from = %mail.from, subject = %mail.subject, source = ?source, "forwarded invoice read");
    Ok(InboxInvoice { fields, source })
}
