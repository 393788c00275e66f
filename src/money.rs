//! Amount helpers shared by the lifecycle, the PDF builder and the
//! bookkeeping export.

/// Round to two decimals (öre).
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// VAT on a net amount.
pub fn vat_on_net(net: f64, vat_percent: f64) -> f64 {
    round2(net * vat_percent / 100.0)
}

/// VAT contained in a gross amount.
pub fn vat_in_gross(gross: f64, vat_percent: f64) -> f64 {
    if vat_percent <= 0.0 {
        return 0.0;
    }
    round2(gross * vat_percent / (100.0 + vat_percent))
}

/// Swedish formatting: space as thousands separator, comma decimals.
///
/// `1234.5` becomes `1 234,50`.
pub fn format_decimal(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}{grouped},{fraction:02}")
}

/// Amount with its currency, `kr` for SEK.
pub fn format_amount(amount: f64, currency: &str) -> String {
    let unit = if currency.eq_ignore_ascii_case("SEK") { "kr" } else { currency };
    format!("{} {}", format_decimal(amount), unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, "0,00")]
    #[case(5.5, "5,50")]
    #[case(999.999, "1 000,00")]
    #[case(1234.5, "1 234,50")]
    #[case(1234567.89, "1 234 567,89")]
    #[case(-42.1, "-42,10")]
    fn formats_swedish_decimals(#[case] amount: f64, #[case] expected: &str) {
        assert_eq!(format_decimal(amount), expected);
    }

    #[test]
    fn sek_is_written_as_kr() {
        assert_eq!(format_amount(62500.0, "SEK"), "62 500,00 kr");
        assert_eq!(format_amount(10.0, "EUR"), "10,00 EUR");
    }

    #[test]
    fn vat_helpers() {
        assert_eq!(vat_on_net(50000.0, 25.0), 12500.0);
        assert_eq!(vat_in_gross(1250.0, 25.0), 250.0);
        assert_eq!(vat_in_gross(100.0, 0.0), 0.0);
        assert_eq!(round2(0.125 + 0.0001), 0.13);
    }
}
