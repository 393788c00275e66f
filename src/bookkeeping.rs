//! SIE 4 and CSV exports of the bookkeeping entries.

use std::fmt::Write as _;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::models::{BookkeepingEntry, EntryKind, EntryStatus};
use crate::money::{format_decimal, round2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Sie,
    Csv,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Sie => "text/plain; charset=utf-8",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn file_name(self, date: NaiveDate) -> String {
        match self {
            ExportFormat::Sie => format!("bokforing-{}.se", date.format("%Y%m%d")),
            ExportFormat::Csv => format!("bokforing-{}.csv", date.format("%Y%m%d")),
        }
    }
}

const ACCOUNTS: [(&str, &str); 6] = [
    ("1510", "Kundfordringar"),
    ("2440", "Leverantörsskulder"),
    ("2611", "Utgående moms 25%"),
    ("2641", "Ingående moms"),
    ("3001", "Försäljning inom Sverige, 25% moms"),
    ("6540", "Övriga externa kostnader"),
];

fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "'"))
}

fn sie_amount(amount: f64) -> String {
    format!("{:.2}", round2(amount))
}

/// Balanced transactions for one entry: `(account, amount)`, debit positive.
fn transactions(entry: &BookkeepingEntry) -> Vec<(&'static str, f64)> {
    let gross = round2(entry.amount_incl_vat);
    let vat = round2(entry.vat_amount);
    let net = round2(gross - vat);
    match entry.kind {
        EntryKind::Invoice => vec![("1510", gross), ("3001", -net), ("2611", -vat)],
        EntryKind::Receipt => vec![("6540", net), ("2641", vat), ("2440", -gross)],
    }
}

pub fn export_sie(entries: &[BookkeepingEntry], company_name: &str, generated: NaiveDate) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#FLAGGA 0");
    let _ = writeln!(out, "#PROGRAM \"PaperflowAI\" 1.0");
    let _ = writeln!(out, "#FORMAT PC8");
    let _ = writeln!(out, "#GEN {}", generated.format("%Y%m%d"));
    let _ = writeln!(out, "#SIETYP 4");
    let _ = writeln!(out, "#FNAMN {}", quoted(company_name));
    for (account, name) in ACCOUNTS {
        let _ = writeln!(out, "#KONTO {account} {}", quoted(name));
    }

    for (index, entry) in entries.iter().enumerate() {
        let date = entry.entry_date.format("%Y%m%d");
        let text = match entry.kind {
            EntryKind::Invoice => format!("Faktura {} {}", entry.reference, entry.counterparty),
            EntryKind::Receipt => format!("Kvitto {}", entry.counterparty),
        };
        let _ = writeln!(out, "#VER \"\" {} {date} {}", index + 1, quoted(text.trim()));
        let _ = writeln!(out, "{{");
        for (account, amount) in transactions(entry) {
            if amount == 0.0 {
                continue;
            }
            let _ = writeln!(out, "#TRANS {account} {{}} {} {date}", sie_amount(amount));
        }
        let _ = writeln!(out, "}}");
    }
    out
}

fn csv_field(text: &str) -> String {
    if text.contains([';', '"', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

pub fn export_csv(entries: &[BookkeepingEntry]) -> String {
    let mut out = String::from("Datum;Typ;Motpart;Referens;Belopp inkl moms;Moms;Valuta;Status\n");
    for entry in entries {
        let kind = match entry.kind {
            EntryKind::Invoice => "Faktura",
            EntryKind::Receipt => "Kvitto",
        };
        let status = match entry.status {
            EntryStatus::ToBook => "Att bokföra",
            EntryStatus::Booked => "Bokförd",
        };
        let fields = [
            entry.entry_date.format("%Y-%m-%d").to_string(),
            kind.to_string(),
            csv_field(&entry.counterparty),
            csv_field(&entry.reference),
            format_decimal(entry.amount_incl_vat).replace(' ', ""),
            format_decimal(entry.vat_amount).replace(' ', ""),
            entry.currency.clone(),
            status.to_string(),
        ];
        out.push_str(&fields.join(";"));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(kind: EntryKind, gross: f64, vat: f64) -> BookkeepingEntry {
        BookkeepingEntry {
            id: Uuid::new_v4(),
            kind,
            customer_id: None,
            invoice_id: None,
            counterparty: "Kalles Bygg AB".into(),
            reference: "F-2025-0001".into(),
            entry_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            amount_incl_vat: gross,
            vat_amount: vat,
            currency: "SEK".into(),
            file_url: None,
            status: EntryStatus::ToBook,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn every_verification_balances() {
        for entry in [entry(EntryKind::Invoice, 62500.0, 12500.0), entry(EntryKind::Receipt, 48.4, 5.19)] {
            let sum: f64 = transactions(&entry).iter().map(|(_, amount)| amount).sum();
            assert!(sum.abs() < 0.005, "unbalanced: {sum}");
        }
    }

    #[test]
    fn sie_has_header_and_sales_verification() {
        let sie = export_sie(
            &[entry(EntryKind::Invoice, 62500.0, 12500.0)],
            "Ditt Företag",
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
        );

        assert!(sie.starts_with("#FLAGGA 0\n"));
        assert!(sie.contains("#GEN 20250315\n"));
        assert!(sie.contains("#SIETYP 4\n"));
        assert!(sie.contains("#VER \"\" 1 20250314 \"Faktura F-2025-0001 Kalles Bygg AB\"\n{\n"));
        assert!(sie.contains("#TRANS 1510 {} 62500.00 20250314\n"));
        assert!(sie.contains("#TRANS 3001 {} -50000.00 20250314\n"));
        assert!(sie.contains("#TRANS 2611 {} -12500.00 20250314\n}\n"));
    }

    #[test]
    fn sie_books_receipts_as_purchases() {
        let sie = export_sie(
            &[entry(EntryKind::Receipt, 125.0, 25.0)],
            "Ditt Företag",
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
        );
        assert!(sie.contains("#TRANS 6540 {} 100.00 20250314\n"));
        assert!(sie.contains("#TRANS 2641 {} 25.00 20250314\n"));
        assert!(sie.contains("#TRANS 2440 {} -125.00 20250314\n"));
    }

    #[test]
    fn csv_uses_semicolons_and_comma_decimals() {
        let csv = export_csv(&[entry(EntryKind::Invoice, 62500.0, 12500.0)]);
        let mut lines = csv.lines();

        assert_eq!(
            lines.next(),
            Some("Datum;Typ;Motpart;Referens;Belopp inkl moms;Moms;Valuta;Status")
        );
        assert_eq!(
            lines.next(),
            Some("2025-03-14;Faktura;Kalles Bygg AB;F-2025-0001;62500,00;12500,00;SEK;Att bokföra")
        );
    }
}
