use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::normalize::timestamp_format;

/// Subscription site a quote was collected from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Source {
    Unidas,
    #[serde(rename = "Porto Seguro")]
    Porto,
    #[serde(rename = "Movida Zero Km")]
    Movida,
    Flua,
}

impl Source {
    pub const ALL: [Source; 4] = [Source::Unidas, Source::Porto, Source::Movida, Source::Flua];

    /// Name of the rental company as written in the output table
    pub fn display_name(&self) -> &'static str {
        match self {
            Source::Unidas => "Unidas",
            Source::Porto => "Porto Seguro",
            Source::Movida => "Movida Zero Km",
            Source::Flua => "Flua",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Source::Unidas => "unidas",
            Source::Porto => "porto",
            Source::Movida => "movida",
            Source::Flua => "flua",
        }
    }

    /// Per-site output file, e.g. `dados_unidas.csv`
    pub fn file_name(&self) -> String {
        format!("dados_{}.csv", self.slug())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One price quote for a (vehicle, mileage plan, term) combination.
///
/// Field order is the column order of the CSV files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub name: String,
    #[serde(with = "timestamp_format")]
    pub collected_at: NaiveDateTime,
    pub source: Source,
    pub mileage_km: u32,
    pub term_months: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub note: Option<String>,
    pub url: Option<String>,
}

impl ListingRecord {
    pub const COLUMNS: [&'static str; 8] = [
        "name",
        "collected_at",
        "source",
        "mileage_km",
        "term_months",
        "price",
        "note",
        "url",
    ];
}
