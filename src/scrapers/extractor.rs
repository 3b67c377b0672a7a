use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::iter::FusedIterator;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ScrapeError};
use crate::models::{ListingRecord, Source};
use crate::normalize::{parse_price, parse_timestamp};
use crate::retry::{Attempt, RetryPolicy};
use crate::scrapers::traits::SiteFlow;
use crate::scrapers::types::{Axis, Listing, PlanOption};

/// A field read gets one more try after the page had time to settle
pub const FIELD_RETRY: RetryPolicy = RetryPolicy::fixed(2, Duration::from_secs(6));

/// A listing that broke half way is started over once
pub const LISTING_RETRY: RetryPolicy = RetryPolicy::fixed(2, Duration::from_secs(8));

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStats {
    pub listings: usize,
    pub quotes: usize,
    pub skipped_quotes: usize,
    pub skipped_listings: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Listings,
    Finished,
}

/// Position inside the listing currently open
struct Cursor {
    listing: Listing,
    outer: Vec<PlanOption>,
    outer_pos: usize,
    inner: Option<Vec<PlanOption>>,
    inner_pos: usize,
}

enum Step {
    Record(ListingRecord),
    Continue,
    Done,
    Failed(ScrapeError),
}

/// Lazy sequence of quotes scraped from one site.
///
/// Every item comes from live interaction with the flow's browser session, so
/// the sequence cannot be restarted. An `Err` item is always a navigation
/// error and is the last item produced.
pub struct Extraction<F> {
    flow: F,
    source: Source,
    field_retry: RetryPolicy,
    listing_retry: RetryPolicy,
    pause: fn(Duration),
    clock: fn() -> NaiveDateTime,
    phase: Phase,
    listing_count: usize,
    next_index: usize,
    listing_attempt: u32,
    // (term, mileage) pairs already emitted for the listing at `next_index`
    listing_done: HashSet<(u32, u32)>,
    cursor: Option<Cursor>,
    stats: ExtractionStats,
}

impl<F: SiteFlow> Extraction<F> {
    pub fn new(flow: F) -> Self {
        let source = flow.source();
        Self {
            flow,
            source,
            field_retry: FIELD_RETRY,
            listing_retry: LISTING_RETRY,
            pause: std::thread::sleep,
            clock: parse_timestamp,
            phase: Phase::Start,
            listing_count: 0,
            next_index: 0,
            listing_attempt: 1,
            listing_done: HashSet::new(),
            cursor: None,
            stats: ExtractionStats::default(),
        }
    }

    #[cfg(test)]
    pub fn with_retry(mut self, field_retry: RetryPolicy, listing_retry: RetryPolicy) -> Self {
        self.field_retry = field_retry;
        self.listing_retry = listing_retry;
        self
    }

    #[cfg(test)]
    pub fn with_pause(mut self, pause: fn(Duration)) -> Self {
        self.pause = pause;
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub fn stats(&self) -> ExtractionStats {
        self.stats
    }

    fn open_cursor(&mut self) -> Result<Cursor> {
        let index = self.next_index;
        let [outer_axis, _] = self.flow.axis_order();
        let flow = &mut self.flow;

        let listing = self
            .field_retry
            .run(|| flow.open_listing(index), self.pause)
            .into_result()?;
        debug!("Opened listing {}/{}: {}", index + 1, self.listing_count, listing.name);

        let outer = self
            .field_retry
            .run(|| flow.options(outer_axis), self.pause)
            .into_result()?;
        debug!("{} {} options for {}", outer.len(), outer_axis, listing.name);

        Ok(Cursor {
            listing,
            outer,
            outer_pos: 0,
            inner: None,
            inner_pos: 0,
        })
    }

    fn step(&mut self) -> Step {
        let [_, inner_axis] = self.flow.axis_order();
        let Some(cursor) = self.cursor.as_mut() else {
            return Step::Done;
        };
        let flow = &mut self.flow;
        let retry = self.field_retry;
        let pause = self.pause;

        let Some(outer) = cursor.outer.get(cursor.outer_pos).cloned() else {
            return Step::Done;
        };

        if cursor.inner.is_none() {
            // Selecting an outer entry can change which inner entries exist
            let inner = retry
                .run(
                    || {
                        flow.select(&outer)?;
                        flow.options(inner_axis)
                    },
                    pause,
                )
                .into_result();
            return match inner {
                Ok(inner) => {
                    cursor.inner = Some(inner);
                    cursor.inner_pos = 0;
                    Step::Continue
                }
                Err(error) => Step::Failed(error),
            };
        }

        let next_inner = cursor
            .inner
            .as_deref()
            .and_then(|inner| inner.get(cursor.inner_pos))
            .cloned();
        let Some(option) = next_inner else {
            cursor.outer_pos += 1;
            cursor.inner = None;
            return Step::Continue;
        };
        cursor.inner_pos += 1;

        let (term_months, mileage_km) = match outer.axis {
            Axis::Term => (outer.value, option.value),
            Axis::Mileage => (option.value, outer.value),
        };
        if self.listing_done.contains(&(term_months, mileage_km)) {
            return Step::Continue;
        }

        let attempt = retry.run(
            || {
                flow.select(&option)?;
                flow.read_quote()
            },
            pause,
        );
        let quote = match attempt {
            Attempt::Success { value, attempts } => {
                if attempts > 1 {
                    debug!("Quote read on attempt {}", attempts);
                }
                value
            }
            // The page is in an unknown state, start the listing over
            Attempt::Failure { error, .. }
                if error.is_navigation() || matches!(error, ScrapeError::Driver(_)) =>
            {
                return Step::Failed(error)
            }
            Attempt::Failure { error, attempts } => {
                warn!(
                    "Skipping {} {} months / {} km after {} attempts: {}",
                    cursor.listing.name, term_months, mileage_km, attempts, error
                );
                self.stats.skipped_quotes += 1;
                return Step::Continue;
            }
        };

        let price = match parse_price(&quote.price_text) {
            Ok(price) => price,
            Err(error) => {
                warn!(
                    "Skipping {} {} months / {} km: {}",
                    cursor.listing.name, term_months, mileage_km, error
                );
                self.stats.skipped_quotes += 1;
                return Step::Continue;
            }
        };

        self.listing_done.insert((term_months, mileage_km));
        self.stats.quotes += 1;

        Step::Record(ListingRecord {
            name: cursor.listing.name.clone(),
            collected_at: (self.clock)(),
            source: self.source,
            mileage_km,
            term_months,
            price,
            note: quote.note,
            url: cursor.listing.url.clone(),
        })
    }

    fn advance(&mut self) {
        self.cursor = None;
        self.next_index += 1;
        self.listing_attempt = 1;
        self.listing_done.clear();
    }

    /// Drop the current listing after a failure. Returns the error that ends the
    /// run when the collection cannot be reached again.
    fn fail_listing(&mut self, error: ScrapeError) -> Option<ScrapeError> {
        self.cursor = None;
        warn!(
            "Listing {}/{} of {} failed on attempt {}/{}: {}",
            self.next_index + 1,
            self.listing_count,
            self.source,
            self.listing_attempt,
            self.listing_retry.max_attempts,
            error
        );

        if let Err(error) = self.flow.return_to_collection() {
            return Some(self.abort(error));
        }

        if self.listing_attempt < self.listing_retry.max_attempts {
            self.listing_attempt += 1;
            (self.pause)(self.listing_retry.delay);
        } else {
            self.stats.skipped_listings += 1;
            self.advance();
        }
        None
    }

    fn abort(&mut self, error: ScrapeError) -> ScrapeError {
        self.phase = Phase::Finished;
        self.cursor = None;
        let error = if error.is_navigation() {
            error
        } else {
            ScrapeError::navigation(format!("{} collection unavailable: {}", self.source, error))
        };
        error!("Aborting {} after {} quotes: {}", self.source, self.stats.quotes, error);
        error
    }

    fn finish(&mut self) {
        self.phase = Phase::Finished;
        info!(
            "Extraction complete for {}: {} quotes from {} listings \
             ({} quotes and {} listings skipped)",
            self.source,
            self.stats.quotes,
            self.stats.listings,
            self.stats.skipped_quotes,
            self.stats.skipped_listings
        );
    }
}

impl<F: SiteFlow> Iterator for Extraction<F> {
    type Item = Result<ListingRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.phase {
                Phase::Finished => return None,
                Phase::Start => match self.flow.open_collection() {
                    Ok(count) => {
                        info!("Found {} listings on {}", count, self.source);
                        self.listing_count = count;
                        self.stats.listings = count;
                        self.phase = Phase::Listings;
                    }
                    Err(error) => return Some(Err(self.abort(error))),
                },
                Phase::Listings => {
                    if self.cursor.is_none() {
                        if self.next_index >= self.listing_count {
                            self.finish();
                            return None;
                        }
                        match self.open_cursor() {
                            Ok(cursor) => self.cursor = Some(cursor),
                            Err(error) => {
                                if let Some(fatal) = self.fail_listing(error) {
                                    return Some(Err(fatal));
                                }
                                continue;
                            }
                        }
                    }

                    match self.step() {
                        Step::Record(record) => return Some(Ok(record)),
                        Step::Continue => {}
                        Step::Done => {
                            self.advance();
                            if let Err(error) = self.flow.close_listing() {
                                warn!("Could not leave listing cleanly: {}", error);
                                if let Err(error) = self.flow.return_to_collection() {
                                    return Some(Err(self.abort(error)));
                                }
                            }
                        }
                        Step::Failed(error) => {
                            if let Some(fatal) = self.fail_listing(error) {
                                return Some(Err(fatal));
                            }
                        }
                    }
                }
            }
        }
    }
}

impl<F: SiteFlow> FusedIterator for Extraction<F> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::types::RawQuote;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::collections::HashMap;

    fn no_pause(_: Duration) {}

    fn fixed_clock() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 2, 1)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap()
    }

    /// Scripted site: every vehicle offers the same terms and mileages
    struct FakeFlow {
        vehicles: Vec<&'static str>,
        terms: Vec<u32>,
        mileages: Vec<u32>,
        order: [Axis; 2],
        collection_down: bool,
        recovery_down: bool,
        term: u32,
        mileage: u32,
        read_failures: HashMap<(u32, u32), u32>,
        open_failures: HashMap<usize, u32>,
        select_failures: HashMap<u32, u32>,
        bad_prices: HashSet<(u32, u32)>,
        returns: usize,
    }

    impl FakeFlow {
        fn new(vehicles: Vec<&'static str>, terms: Vec<u32>, mileages: Vec<u32>) -> Self {
            Self {
                vehicles,
                terms,
                mileages,
                order: [Axis::Term, Axis::Mileage],
                collection_down: false,
                recovery_down: false,
                term: 0,
                mileage: 0,
                read_failures: HashMap::new(),
                open_failures: HashMap::new(),
                select_failures: HashMap::new(),
                bad_prices: HashSet::new(),
                returns: 0,
            }
        }
    }

    fn take_failure<K: std::hash::Hash + Eq>(failures: &mut HashMap<K, u32>, key: &K) -> bool {
        match failures.get_mut(key) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    impl SiteFlow for FakeFlow {
        fn source(&self) -> Source {
            Source::Unidas
        }

        fn axis_order(&self) -> [Axis; 2] {
            self.order
        }

        fn open_collection(&mut self) -> Result<usize> {
            if self.collection_down {
                return Err(ScrapeError::navigation("site unreachable"));
            }
            Ok(self.vehicles.len())
        }

        fn open_listing(&mut self, index: usize) -> Result<Listing> {
            if take_failure(&mut self.open_failures, &index) {
                return Err(ScrapeError::Driver("card not clickable".to_string()));
            }
            Ok(Listing {
                name: self.vehicles[index].to_string(),
                url: Some(format!("https://example.test/{}", index)),
            })
        }

        fn options(&mut self, axis: Axis) -> Result<Vec<PlanOption>> {
            let values = match axis {
                Axis::Term => &self.terms,
                Axis::Mileage => &self.mileages,
            };
            Ok(values
                .iter()
                .enumerate()
                .map(|(i, v)| PlanOption::new(axis, v.to_string(), i, *v))
                .collect())
        }

        fn select(&mut self, option: &PlanOption) -> Result<()> {
            match option.axis {
                Axis::Term => {
                    if take_failure(&mut self.select_failures, &option.value) {
                        return Err(ScrapeError::Driver("dropdown closed".to_string()));
                    }
                    self.term = option.value;
                }
                Axis::Mileage => self.mileage = option.value,
            }
            Ok(())
        }

        fn read_quote(&mut self) -> Result<RawQuote> {
            let combo = (self.term, self.mileage);
            if take_failure(&mut self.read_failures, &combo) {
                return Err(ScrapeError::not_found("price"));
            }
            let price_text = if self.bad_prices.contains(&combo) {
                "R$ --".to_string()
            } else {
                format!("R$ {}.{:03},90", self.term, self.mileage % 1000)
            };
            Ok(RawQuote {
                price_text,
                note: Some("Pagamento no cartão".to_string()),
            })
        }

        fn close_listing(&mut self) -> Result<()> {
            Ok(())
        }

        fn return_to_collection(&mut self) -> Result<()> {
            self.returns += 1;
            if self.recovery_down {
                return Err(ScrapeError::navigation("collection page did not load"));
            }
            Ok(())
        }
    }

    fn run(flow: FakeFlow) -> (Vec<Result<ListingRecord>>, FakeFlow) {
        let mut extraction = Extraction::new(flow).with_pause(no_pause).with_clock(fixed_clock);
        let items: Vec<_> = extraction.by_ref().collect();
        (items, extraction.flow)
    }

    fn records(items: Vec<Result<ListingRecord>>) -> Vec<ListingRecord> {
        items.into_iter().map(|r| r.unwrap()).collect()
    }

    fn pairs(records: &[ListingRecord], name: &str) -> HashSet<(u32, u32)> {
        records
            .iter()
            .filter(|r| r.name == name)
            .map(|r| (r.term_months, r.mileage_km))
            .collect()
    }

    #[test]
    fn test_cross_product_per_vehicle() {
        let flow = FakeFlow::new(vec!["Compass", "Renegade"], vec![12, 24], vec![1000, 1500, 2000]);
        let (items, _) = run(flow);
        let records = records(items);

        assert_eq!(records.len(), 12);
        assert_eq!(pairs(&records, "Compass").len(), 6);
        assert_eq!(pairs(&records, "Renegade").len(), 6);
        assert!(records.iter().all(|r| r.source == Source::Unidas));
        assert_eq!(records[0].price, Decimal::new(1200090, 2));
        assert_eq!(records[0].url.as_deref(), Some("https://example.test/0"));
    }

    #[test]
    fn test_records_follow_selection_order() {
        let flow = FakeFlow::new(vec!["Argo"], vec![12, 24], vec![1000, 1500]);
        let (items, _) = run(flow);
        let order: Vec<_> = records(items)
            .iter()
            .map(|r| (r.term_months, r.mileage_km))
            .collect();

        assert_eq!(order, vec![(12, 1000), (12, 1500), (24, 1000), (24, 1500)]);
    }

    #[test]
    fn test_mileage_first_order_assigns_axes() {
        let mut flow = FakeFlow::new(vec!["Argo"], vec![12, 24], vec![1000, 1500]);
        flow.order = [Axis::Mileage, Axis::Term];
        let (items, _) = run(flow);
        let order: Vec<_> = records(items)
            .iter()
            .map(|r| (r.term_months, r.mileage_km))
            .collect();

        assert_eq!(order, vec![(12, 1000), (24, 1000), (12, 1500), (24, 1500)]);
    }

    #[test]
    fn test_single_read_failure_is_recovered() {
        let clean = FakeFlow::new(vec!["Compass"], vec![12, 24], vec![1000, 1500, 2000]);
        let (clean_items, _) = run(clean);

        let mut flaky = FakeFlow::new(vec!["Compass"], vec![12, 24], vec![1000, 1500, 2000]);
        flaky.read_failures.insert((24, 1500), 1);
        let (flaky_items, _) = run(flaky);

        assert_eq!(records(clean_items), records(flaky_items));
    }

    #[test]
    fn test_two_read_failures_skip_only_that_combination() {
        let mut flow =
            FakeFlow::new(vec!["Compass", "Renegade"], vec![12, 24], vec![1000, 1500, 2000]);
        flow.read_failures.insert((12, 1000), 2);
        let (items, _) = run(flow);
        let records = records(items);

        let compass = pairs(&records, "Compass");
        assert_eq!(compass.len(), 5);
        assert!(!compass.contains(&(12, 1000)));
        assert_eq!(pairs(&records, "Renegade").len(), 6);
    }

    #[test]
    fn test_unparseable_price_is_skipped() {
        let mut flow = FakeFlow::new(vec!["Pulse"], vec![12], vec![1000, 1500]);
        flow.bad_prices.insert((12, 1500));
        let mut extraction = Extraction::new(flow).with_pause(no_pause);
        let records: Vec<_> = extraction.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mileage_km, 1000);
        assert_eq!(extraction.stats().skipped_quotes, 1);
    }

    #[test]
    fn test_single_attempt_policy_skips_on_first_failure() {
        let mut flow = FakeFlow::new(vec!["Compass"], vec![12], vec![1000, 1500]);
        flow.read_failures.insert((12, 1500), 1);
        let mut extraction = Extraction::new(flow)
            .with_retry(RetryPolicy::once(), RetryPolicy::once())
            .with_pause(no_pause);
        let records: Vec<_> = extraction.by_ref().map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 1);
        assert_eq!(extraction.stats().skipped_quotes, 1);
    }

    #[test]
    fn test_failed_listing_is_started_over() {
        let mut flow = FakeFlow::new(vec!["Compass", "Renegade"], vec![12, 24], vec![1000]);
        flow.open_failures.insert(0, 1);
        let (items, flow) = run(flow);
        let records = records(items);

        assert_eq!(pairs(&records, "Compass").len(), 2);
        assert_eq!(pairs(&records, "Renegade").len(), 2);
        assert_eq!(flow.returns, 1);
    }

    #[test]
    fn test_listing_failing_twice_is_skipped() {
        let mut flow = FakeFlow::new(vec!["Compass", "Renegade"], vec![12, 24], vec![1000]);
        flow.open_failures.insert(0, 2);
        let mut extraction = Extraction::new(flow).with_pause(no_pause);
        let records: Vec<_> = extraction.by_ref().map(|r| r.unwrap()).collect();

        assert!(records.iter().all(|r| r.name == "Renegade"));
        assert_eq!(records.len(), 2);
        assert_eq!(extraction.stats().skipped_listings, 1);
    }

    #[test]
    fn test_restarted_listing_does_not_repeat_quotes() {
        let mut flow = FakeFlow::new(vec!["Compass"], vec![12, 24], vec![1000, 1500, 2000]);
        flow.select_failures.insert(24, 1);
        let (items, flow) = run(flow);
        let records = records(items);

        assert_eq!(records.len(), 6);
        assert_eq!(pairs(&records, "Compass").len(), 6);
        assert_eq!(flow.returns, 1);
    }

    #[test]
    fn test_unreachable_collection_aborts() {
        let mut flow = FakeFlow::new(vec!["Compass"], vec![12], vec![1000]);
        flow.collection_down = true;
        let mut extraction = Extraction::new(flow).with_pause(no_pause);

        let first = extraction.next().unwrap();
        assert!(matches!(first, Err(ScrapeError::Navigation { .. })));
        assert!(extraction.next().is_none());
        assert!(extraction.next().is_none());
    }

    #[test]
    fn test_lost_collection_keeps_earlier_records() {
        let mut flow = FakeFlow::new(vec!["Compass", "Renegade"], vec![12], vec![1000, 1500]);
        flow.open_failures.insert(1, 1);
        flow.recovery_down = true;
        let (items, _) = run(flow);

        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].is_ok());
        assert!(matches!(items[2], Err(ScrapeError::Navigation { .. })));
    }

    #[test]
    fn test_empty_collection_yields_nothing() {
        let flow = FakeFlow::new(vec![], vec![12], vec![1000]);
        let (items, _) = run(flow);
        assert!(items.is_empty());
    }
}
