use crate::error::Result;
use crate::models::Source;
use crate::scrapers::types::{Axis, Listing, PlanOption, RawQuote, UnitOutcome};
use async_trait::async_trait;

/// Runs one site end to end with its own browser session.
/// The coordinator only talks to this, so units can be swapped out in tests.
#[async_trait]
pub trait SiteScraper: Send + Sync {
    /// Collect every quote of `source`
    async fn scrape(&self, source: Source) -> UnitOutcome;

    /// Get the name of the scraping backend
    fn backend_name(&self) -> &'static str;
}

/// Site-specific navigation, driven by [`crate::scrapers::extractor::Extraction`].
///
/// Implementations only move the page around and read raw text; retries,
/// normalisation and record assembly happen in the extractor.
pub trait SiteFlow {
    fn source(&self) -> Source;

    /// Outer axis first. The inner axis is re-read after every outer selection.
    fn axis_order(&self) -> [Axis; 2];

    /// Load the landing collection and return how many listings it holds
    fn open_collection(&mut self) -> Result<usize>;

    fn open_listing(&mut self, index: usize) -> Result<Listing>;

    fn options(&mut self, axis: Axis) -> Result<Vec<PlanOption>>;

    fn select(&mut self, option: &PlanOption) -> Result<()>;

    fn read_quote(&mut self) -> Result<RawQuote>;

    /// Leave a listing that was read to the end
    fn close_listing(&mut self) -> Result<()>;

    /// Get back to the collection after a listing failed half way
    fn return_to_collection(&mut self) -> Result<()>;
}
