//! Heuristic field extraction from offer text, OCR'd receipts and
//! forwarded supplier invoices.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

macro_rules! regex {
    ($pattern:literal) => {{
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new($pattern)
                .unwrap_or_else(|error| panic!("pattern {} failed to compile: {error}", $pattern))
        })
    }};
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub name: String,
    pub hours: Option<String>,
    pub price_per_hour: Option<String>,
    pub total: Option<String>,
}

/// Customer and offer fields found in a piece of offer text. Missing fields
/// are empty strings.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OfferFields {
    pub company_name: String,
    pub org_nr: String,
    pub contact_person: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub zip: String,
    pub city: String,
    pub country: String,
    pub offer_number: String,
    pub date: String,
    pub validity: String,
    pub total: String,
    pub vat: String,
    pub vat_amount: String,
    pub items: Vec<LineItem>,
    pub notes: String,
}

fn normalize(text: &str) -> String {
    let text = text.replace(['\u{2011}', '\u{2013}', '\u{2014}'], "-").replace('\u{00A0}', " ");
    regex!(r"[^\S\r\n]+").replace_all(&text, " ").into_owned()
}

/// First capture group, trimmed; empty when the pattern does not match.
fn capture(text: &str, re: &Regex) -> String {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn or_else(first: String, fallback: impl FnOnce() -> String) -> String {
    if first.is_empty() { fallback() } else { first }
}

/// `12345` becomes `123 45`; anything else is only trimmed.
fn format_zip(zip: &str) -> String {
    let digits: String = zip.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 5 {
        format!("{} {}", &digits[..3], &digits[3..])
    } else {
        zip.trim().to_string()
    }
}

pub fn extract_offer_fields(raw: &str) -> OfferFields {
    let text = normalize(raw);
    let text = text.as_str();

    let company_name = or_else(
        capture(text, regex!(r"(?i)(?:Kund|Beställare|Företag|Kundnamn|Till)\s*:?\s*(.+)")),
        || guess_company_name(text),
    );

    let org_nr = or_else(
        capture(
            text,
            regex!(r"(?i)(?:Org(?:\.|\s)?(?:nr|nummer)|Organisations(?:nummer|nr))\s*:?\s*([0-9\- ]{6,})"),
        ),
        || capture(text, regex!(r"(?i)(?:VAT|Momsregnr|VAT(?:\s*nr)?)\s*:?\s*([A-Za-z0-9\- ]{6,})")),
    );

    let contact_person = capture(text, regex!(r"(?i)(?:Kontaktperson|Kontakt|Attn)\s*:?\s*([^\n]+)"));
    let phone = capture(text, regex!(r"(?i)(?:Telefon|Tel\.?|Tel|Mobil)\s*:?\s*([\d +\-()]{5,})"));
    let email = capture(
        text,
        regex!(r"(?i)(?:E-?post|E ?post|E-mail|Mail)\s*:?\s*([^\s,;<>]+@[^\s,;<>]+)"),
    );

    let address_raw = capture(
        text,
        regex!(r"(?i)(?:Adress|Gatuadress|Besöksadress|Postadress)\s*:?\s*(.+)"),
    );
    let (street, zip, city) = parse_address(&address_raw, &postal_line(text));

    let country = or_else(capture(text, regex!(r"(?i)(?:Land|Country)\s*:?\s*([^\n]+)")), || {
        "Sverige".to_string()
    });

    let offer_number = or_else(
        capture(
            text,
            regex!(r"(?i)(?:Offert(?:nummer|\s*nr\.?)?|Offert-Nr\.?|Offertnr)\s*:?\s*([A-Za-z0-9\-_/]+)"),
        ),
        || capture(text, regex!(r"(?i)(?:Ref(?:erens)?|Ref\.?)\s*:?\s*([A-Za-z0-9\-_/]+)")),
    );

    let date = capture(
        text,
        regex!(r"(?i)(?:Datum|Offertdatum|Date)\s*:?\s*([0-9]{4}-[0-9]{2}-[0-9]{2}|[0-9]{2}[-/.][0-9]{2}[-/.][0-9]{2,4})"),
    );

    let validity = or_else(
        capture(
            text,
            regex!(r"(?i)(?:Giltighet|Giltig(?:\s*till)?|Valid(?:ity)?)\s*:?\s*([^\n]+)"),
        ),
        || capture(text, regex!(r"(?i)([0-9]+)\s*(?:dagar|dagars)")),
    );

    let total = or_else(
        capture(
            text,
            regex!(r"(?i)(?:Totalt|Total|Summa|Netto|Subtotal)\s*:?\s*([0-9\s,\.]+(?:\s*kr)?)"),
        ),
        || capture(text, regex!(r"(?i)(?:Exkl\.?\s*moms|Utan\s*moms)\s*:?\s*([0-9\s,\.]+)")),
    );

    let vat = or_else(capture(text, regex!(r"(?i)(?:Moms|VAT|Tax)\s*:?\s*([0-9]+)\s*%")), || {
        or_else(capture(text, regex!(r"(?i)([0-9]+)\s*%\s*(?:moms|vat)")), || "25".to_string())
    });

    let vat_amount = or_else(
        capture(
            text,
            regex!(r"(?i)(?:Moms(?:belopp)?|VAT\s*(?:amount)?)\s*:?\s*([0-9\s,\.]+)"),
        ),
        || capture(text, regex!(r"(?i)(?:Inkl\.?\s*moms|Med\s*moms)\s*:?\s*([0-9\s,\.]+)")),
    );

    let notes = or_else(
        capture(
            text,
            regex!(r"(?i)(?:Anteckningar|Notes|Kommentarer|Övrigt)\s*:?\s*([^\n]+)"),
        ),
        || capture(text, regex!(r"(?i)(?:Betalningsvillkor|Payment\s*terms)\s*:?\s*([^\n]+)")),
    );

    OfferFields {
        company_name,
        org_nr,
        contact_person,
        phone,
        email,
        address: street,
        zip: if zip.is_empty() { zip } else { format_zip(&zip) },
        city,
        country,
        offer_number,
        date,
        validity,
        total,
        vat,
        vat_amount,
        items: line_items(text),
        notes,
    }
}

fn postal_line(text: &str) -> String {
    let explicit = regex!(r"(?i)(?:Postnr\.?|Postnummer|Postadress)\s*:?\s*([0-9]{3}\s?[0-9]{2}\s+[^\n]+)");
    if let Some(m) = explicit.captures(text).and_then(|c| c.get(1)) {
        return m.as_str().to_string();
    }
    regex!(r"([0-9]{3}\s?[0-9]{2})\s+([A-Za-zÅÄÖåäö\- ]{2,})")
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn split_zip_city(value: &str) -> Option<(String, String)> {
    let caps = regex!(r"(\d{3}\s?[0-9]{2})\s+(.+)").captures(value)?;
    Some((caps[1].to_string(), caps[2].trim().to_string()))
}

fn parse_address(address_raw: &str, postal_line: &str) -> (String, String, String) {
    let mut street = address_raw.to_string();
    let mut zip = String::new();
    let mut city = String::new();

    let parts: Vec<&str> = address_raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() >= 2 {
        street = parts[0].to_string();
        let tail = parts[1..].join(", ");
        match split_zip_city(&tail) {
            Some((z, c)) => {
                zip = z;
                city = c;
            }
            None => city = tail,
        }
    }

    if zip.is_empty() || city.is_empty() {
        if let Some((z, c)) = split_zip_city(postal_line) {
            zip = z;
            city = c;
        }
    }

    (street, zip, city)
}

/// Company name guessed from the first lines, above any document heading.
fn guess_company_name(text: &str) -> String {
    let first_lines: Vec<&str> = text
        .lines()
        .take(12)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let heading = regex!(r"(?i)offert|order|faktura|invoice");
    let scope = match first_lines.iter().position(|l| heading.is_match(l)) {
        Some(stop) if stop > 0 => &first_lines[..stop],
        _ => &first_lines[..],
    };

    scope
        .iter()
        .find(|l| {
            l.chars().any(char::is_alphabetic)
                && l.split(' ').count() >= 2
                && l.chars().count() <= 60
                && !l.chars().all(|c| c.is_ascii_digit())
        })
        .map(|l| regex!(r"(?i)^(AB|HB|KB)\s+").replace(l, "").trim().to_string())
        .unwrap_or_default()
}

/// Rows between a table header and the first totals line.
fn line_items(text: &str) -> Vec<LineItem> {
    let header = regex!(r"(?i)Beskrivning|Description|Tjänst|Service|Post");
    let footer = regex!(r"(?i)Summa|Total|Moms|VAT");
    let row = regex!(r"^(.+?)\s+([0-9,\.]+)\s+([0-9,\. ]+)\s+([0-9,\. ]+)");

    let mut items = Vec::new();
    let mut in_table = false;
    for line in text.lines() {
        if header.is_match(line) {
            in_table = true;
            continue;
        }
        if in_table && footer.is_match(line) {
            break;
        }
        if in_table {
            if let Some(caps) = row.captures(line) {
                items.push(LineItem {
                    name: caps[1].trim().to_string(),
                    hours: Some(caps[2].trim().to_string()),
                    price_per_hour: Some(caps[3].trim().to_string()),
                    total: Some(caps[4].trim().to_string()),
                });
            }
        }
    }
    items
}

/// Company, total and VAT read off a receipt.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptFields {
    pub company: Option<String>,
    pub total: Option<f64>,
    pub vat: Option<f64>,
}

impl ReceiptFields {
    /// Fill the gaps in `self` from `other`.
    pub fn or(self, other: ReceiptFields) -> ReceiptFields {
        ReceiptFields {
            company: self.company.filter(|c| !c.trim().is_empty()).or(other.company),
            total: self.total.or(other.total),
            vat: self.vat.or(other.vat),
        }
    }
}

const RECEIPT_SKIP: [&str; 9] = [
    "kvitto", "receipt", "total", "summa", "moms", "vat", "belopp", "inkl", "exkl",
];

fn receipt_amount(value: &str) -> Option<f64> {
    value.replace(',', ".").parse().ok()
}

pub fn extract_receipt_fields(text: &str) -> ReceiptFields {
    let amount = regex!(r"(\d{1,4}[.,]\d{2})");

    let company = text
        .lines()
        .map(str::trim)
        .filter(|l| {
            let lower = l.to_lowercase();
            !RECEIPT_SKIP.iter().any(|word| lower.contains(word))
        })
        .find(|l| l.chars().any(char::is_alphabetic))
        .map(str::to_string);

    let total = amount
        .find_iter(text)
        .filter_map(|m| receipt_amount(m.as_str()))
        .fold(None, |max: Option<f64>, value| Some(max.map_or(value, |m| m.max(value))));

    let vat = text
        .lines()
        .filter(|l| {
            let lower = l.to_lowercase();
            lower.contains("moms") || lower.contains("vat")
        })
        .find_map(|l| amount.find(l))
        .and_then(|m| receipt_amount(m.as_str()));

    ReceiptFields { company, total, vat }
}

/// Supplier invoice details found in a forwarded mail or its PDF.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForwardedInvoice {
    pub vendor: Option<String>,
    pub amount: Option<f64>,
    pub invoice_number: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl ForwardedInvoice {
    /// A vendor or an amount is enough to act on.
    pub fn is_usable(&self) -> bool {
        self.vendor.is_some() || self.amount.is_some()
    }
}

fn optional(value: String) -> Option<String> {
    Some(value).filter(|v| !v.is_empty())
}

/// `12 500,00` becomes `12500.0`.
fn kronor(value: &str) -> Option<f64> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    compact.replace(',', ".").parse().ok()
}

fn parse_due_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim_end_matches('.').replace(['/', '.'], "-");
    NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&value, "%d-%m-%Y"))
        .ok()
}

pub fn extract_forwarded_invoice(raw: &str) -> ForwardedInvoice {
    let text = normalize(raw);
    let text = text.as_str();

    let amount = regex!(r"(?i)(\d{1,3}(?: ?\d{3})*(?:[,.]\d{2})?)\s*kr\b")
        .captures(text)
        .and_then(|caps| kronor(&caps[1]));

    let vendor = optional(capture(
        text,
        regex!(r"(?i)(?:faktura från|från|leverantör|avsändare):[^\S\r\n]*([^\r\n]{1,50})"),
    ))
    .or_else(|| {
        optional(capture(
            text,
            regex!(r"([A-ZÅÄÖ]\w*(?: [A-ZÅÄÖ]\w*)* (?:AB|HB|KB|Aktiebolag|Handelsbolag))\b"),
        ))
    });

    let invoice_number = optional(capture(
        text,
        regex!(r"(?i)(?:fakturanummer|faktura|invoice|nummer|nr|#)[\s:.]*(\d+)"),
    ));

    let due_date = regex!(r"(?i)(?:förfaller|förfallodatum|due|betala senast|betalning)[\s:]*([\d\-/.]{8,10})")
        .captures(text)
        .and_then(|caps| parse_due_date(&caps[1]));

    ForwardedInvoice {
        vendor,
        amount,
        invoice_number,
        due_date,
    }
}

/// Readable company name from the sender's domain: `faktura@el-bolaget.se`
/// becomes `El Bolaget`. Falls back to the address itself.
pub fn vendor_from_sender(from: &str) -> String {
    let address = from
        .rsplit_once('<')
        .map_or(from, |(_, rest)| rest.trim_end_matches('>'))
        .trim();
    let Some((_, domain)) = address.split_once('@') else {
        return address.to_string();
    };

    let domain = regex!(r"\.(?:com|se|org|net|co\.uk)$").replace(domain, "");
    let name = domain
        .split(['.', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() { address.to_string() } else { name }
}
