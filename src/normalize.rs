//! Conversion of scraped pt-BR text into typed values.
//!
//! Sites print prices as `R$ 1.234,56` (`.` groups thousands, `,` separates
//! decimals) and quantities as `15.000 Km` or `36 meses`.

use chrono::{Local, NaiveDateTime, Timelike};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{Result, ScrapeError};

const CURRENCY_SYMBOL: &str = "R$";

/// Parse a locale price such as `"R$ 1.234,56"` into `1234.56`.
pub fn parse_price(text: &str) -> Result<Decimal> {
    let cleaned: String = text
        .replace(CURRENCY_SYMBOL, "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return Err(ScrapeError::format("price", text));
    }

    Decimal::from_str(&cleaned).map_err(|_| ScrapeError::format("price", text))
}

/// Parse a quantity such as `"15.000 Km"` (suffix `" Km"`) into `15000`.
///
/// The suffix is removed wherever it occurs, so labels that lack it still parse.
pub fn parse_integer_quantity(text: &str, suffix: &str) -> Result<u32> {
    let without_suffix = if suffix.is_empty() {
        text.to_string()
    } else {
        text.replace(suffix, "")
    };
    let residue = without_suffix.replace('.', "");

    residue
        .trim()
        .parse::<u32>()
        .map_err(|_| ScrapeError::format("quantity", text))
}

/// Current wall-clock time with minute precision, the resolution quotes are stamped with.
pub fn parse_timestamp() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

/// Serde adapter writing timestamps as `dd/mm/YYYY HH:MM`.
pub mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%d/%m/%Y %H:%M";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(text.trim(), FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal::Decimal;

    #[rstest]
    #[case("R$ 1.234,56", Decimal::new(123456, 2))]
    #[case("R$ 899,90", Decimal::new(89990, 2))]
    #[case("R$\u{a0}2.199,00", Decimal::new(219900, 2))]
    #[case("3.050", Decimal::new(3050, 0))]
    #[case("  R$ 12.345.678,9 ", Decimal::new(123456789, 1))]
    fn test_parse_price(#[case] input: &str, #[case] expected: Decimal) {
        assert_eq!(parse_price(input).unwrap(), expected);
    }

    #[rstest]
    #[case("R$ --")]
    #[case("")]
    #[case("R$")]
    #[case("Consulte")]
    fn test_parse_price_rejects_malformed(#[case] input: &str) {
        let err = parse_price(input).unwrap_err();
        assert!(matches!(err, ScrapeError::Format { field: "price", .. }));
    }

    #[rstest]
    #[case("15.000 Km", " Km", 15000)]
    #[case("1.500 Km", " Km", 1500)]
    #[case("36 meses", " meses", 36)]
    #[case("24Meses", "Meses", 24)]
    #[case("12 Meses", "Meses", 12)]
    #[case("48", "", 48)]
    fn test_parse_integer_quantity(
        #[case] input: &str,
        #[case] suffix: &str,
        #[case] expected: u32,
    ) {
        assert_eq!(parse_integer_quantity(input, suffix).unwrap(), expected);
    }

    #[test]
    fn test_parse_integer_quantity_rejects_residue() {
        let err = parse_integer_quantity("Ilimitado Km", " Km").unwrap_err();
        assert!(matches!(err, ScrapeError::Format { field: "quantity", .. }));
        assert!(parse_integer_quantity("36 months", " meses").is_err());
    }

    #[test]
    fn test_parse_timestamp_has_minute_precision() {
        let stamp = parse_timestamp();
        assert_eq!(stamp.second(), 0);
        assert_eq!(stamp.nanosecond(), 0);
    }

    #[test]
    fn test_timestamp_format_layout() {
        let stamp = chrono::NaiveDate::from_ymd_opt(2023, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        assert_eq!(stamp.format(timestamp_format::FORMAT).to_string(), "07/03/2023 09:05");
    }
}
