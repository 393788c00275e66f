//! Year-scoped document numbers: `OFF-2025-0001`, `ORD-2025-0001`,
//! `F-2025-0001`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Series {
    Offer,
    Order,
    Invoice,
}

impl Series {
    pub fn prefix(self) -> &'static str {
        match self {
            Series::Offer => "OFF",
            Series::Order => "ORD",
            Series::Invoice => "F",
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A parsed document number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocNumber {
    pub year: i32,
    pub seq: u32,
}

pub fn format_number(series: Series, year: i32, seq: u32) -> String {
    format!("{}-{}-{:04}", series.prefix(), year, seq)
}

/// Parse `PREFIX-YEAR-SEQ`. Anything else, including another series'
/// prefix, yields `None`.
pub fn parse_number(series: Series, number: &str) -> Option<DocNumber> {
    let rest = number.strip_prefix(series.prefix())?.strip_prefix('-')?;
    let (year, seq) = rest.split_once('-')?;
    if year.len() != 4 || seq.is_empty() {
        return None;
    }
    if !year.bytes().all(|b| b.is_ascii_digit()) || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(DocNumber {
        year: year.parse().ok()?,
        seq: seq.parse().ok()?,
    })
}

/// Highest sequence used for `year` among `numbers`.
pub fn highest_seq<'a, I>(series: Series, year: i32, numbers: I) -> u32
where
    I: IntoIterator<Item = &'a str>,
{
    numbers
        .into_iter()
        .filter_map(|n| parse_number(series, n))
        .filter(|n| n.year == year)
        .map(|n| n.seq)
        .max()
        .unwrap_or(0)
}
