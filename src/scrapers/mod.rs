pub mod browser;
pub mod driver;
pub mod extractor;
pub mod flua;
pub mod movida;
pub mod porto;
pub mod traits;
pub mod types;
pub mod unidas;

#[cfg(test)]
pub(crate) mod testing;

pub use browser::ChromeScraper;
pub use traits::SiteScraper;
pub use types::UnitOutcome;

use crate::error::Result;
use crate::models::{ListingRecord, Source};
use crate::sink::ResultSink;
use driver::BrowserDriver;
use extractor::Extraction;

/// Lazy record sequence of `source`, driven through `driver`
pub fn extract_site<'a, D>(
    source: Source,
    driver: D,
) -> Box<dyn Iterator<Item = Result<ListingRecord>> + 'a>
where
    D: BrowserDriver + 'a,
{
    match source {
        Source::Unidas => Box::new(Extraction::new(unidas::UnidasFlow::new(driver))),
        Source::Porto => Box::new(Extraction::new(porto::PortoFlow::new(driver))),
        Source::Movida => Box::new(Extraction::new(movida::MovidaFlow::new(driver))),
        Source::Flua => Box::new(Extraction::new(flua::FluaFlow::new(driver))),
    }
}

/// Drain the extraction of `source` into a sink. Records read before an abort
/// are kept alongside the error.
pub fn collect_site<D: BrowserDriver>(source: Source, driver: D) -> UnitOutcome {
    let mut sink = ResultSink::new();

    for item in extract_site(source, driver) {
        match item {
            Ok(record) => sink.append(record),
            Err(error) => {
                return UnitOutcome {
                    source,
                    sink,
                    error: Some(error),
                }
            }
        }
    }

    UnitOutcome {
        source,
        sink,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use crate::scrapers::testing::FakeDriver;

    #[test]
    fn test_unreachable_site_ends_unit_with_error() {
        let driver = FakeDriver::new().unreachable(porto::COLLECTION_URL);
        let outcome = collect_site(Source::Porto, &driver);

        assert_eq!(outcome.source, Source::Porto);
        assert!(outcome.sink.is_empty());
        assert!(matches!(outcome.error, Some(ScrapeError::Navigation { .. })));
    }

    #[test]
    fn test_empty_site_is_a_clean_unit() {
        let driver = FakeDriver::new();
        let outcome = collect_site(Source::Flua, &driver);

        assert!(outcome.error.is_none());
        assert!(outcome.sink.is_empty());
        assert_eq!(driver.actions("navigate").len(), flua::BRAND_PAGES.len());
    }
}
