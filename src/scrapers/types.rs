use std::fmt;

use crate::error::{Result, ScrapeError};
use crate::models::Source;
use crate::sink::ResultSink;

/// A selection control of a vehicle page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Contract length in months
    Term,
    /// Monthly mileage allowance in km
    Mileage,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Term => f.write_str("term"),
            Axis::Mileage => f.write_str("mileage"),
        }
    }
}

/// One entry of a selection control as discovered on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOption {
    pub axis: Axis,
    /// Visible label, used to select the entry again
    pub label: String,
    /// Index of the entry within its control
    pub position: usize,
    /// Months for a term, km per month for a mileage plan
    pub value: u32,
}

impl PlanOption {
    pub fn new(axis: Axis, label: impl Into<String>, position: usize, value: u32) -> Self {
        Self {
            axis,
            label: label.into(),
            position,
            value,
        }
    }

    /// Build options from the labels of a control, skipping the first `skip`
    /// placeholder entries. Positions keep counting the skipped entries.
    pub fn parse_all<F>(axis: Axis, labels: Vec<String>, skip: usize, parse: F) -> Result<Vec<Self>>
    where
        F: Fn(&str) -> Result<u32>,
    {
        labels
            .into_iter()
            .enumerate()
            .skip(skip)
            .filter(|(_, label)| !label.trim().is_empty())
            .map(|(position, label)| {
                let label = label.trim().to_string();
                let value = parse(&label)?;
                Ok(Self::new(axis, label, position, value))
            })
            .collect()
    }
}

/// The vehicle page currently open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub name: String,
    pub url: Option<String>,
}

/// Text read from a vehicle page once a selection has settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawQuote {
    pub price_text: String,
    pub note: Option<String>,
}

/// What one per-site unit of work produced.
///
/// `error` is set when the unit aborted; `sink` still holds every record
/// collected before that.
#[derive(Debug)]
pub struct UnitOutcome {
    pub source: Source,
    pub sink: ResultSink,
    pub error: Option<ScrapeError>,
}

impl UnitOutcome {
    pub fn failed(source: Source, error: ScrapeError) -> Self {
        Self {
            source,
            sink: ResultSink::new(),
            error: Some(error),
        }
    }
}
