use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::error::{Result, ScrapeError};
use crate::models::Source;
use crate::normalize::parse_integer_quantity;
use crate::scrapers::driver::{BrowserDriver, ElementHandle, Locator};
use crate::scrapers::traits::SiteFlow;
use crate::scrapers::types::{Axis, Listing, PlanOption, RawQuote};

pub const COLLECTION_URL: &str = "https://www.portosegurocarrofacil.com.br/veiculos";

fn link_locator() -> Locator {
    Locator::xpath("//*[@href]")
}

fn name_locator() -> Locator {
    Locator::xpath("/html/body/div[1]/main/div/section[1]/div/div[3]/div[2]/div[2]/p")
}

fn term_select() -> Locator {
    Locator::xpath("//*[@name=\"periods\"]")
}

fn bundle_select() -> Locator {
    Locator::xpath("//*[@name=\"bundles\"]")
}

fn price_locator() -> Locator {
    Locator::xpath("//p[contains(@class, \"styles__Price\")]")
}

/// portosegurocarrofacil.com.br: every vehicle has its own page. Bundles are
/// priced per contract, so the km on offer depend on the selected term.
pub struct PortoFlow<D> {
    driver: D,
    links: Vec<String>,
    selected_term: Option<u32>,
}

impl<D: BrowserDriver> PortoFlow<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            links: Vec::new(),
            selected_term: None,
        }
    }

    /// Vehicle page links in page order, without duplicates
    fn vehicle_links(&self) -> Result<Vec<String>> {
        let base = Url::parse(COLLECTION_URL).map_err(|e| ScrapeError::Driver(e.to_string()))?;
        let hrefs = self.driver.attributes(&link_locator(), "href")?;
        let mut links: Vec<String> = Vec::new();

        for href in hrefs.into_iter().flatten() {
            let Ok(link) = base.join(&href) else {
                continue;
            };
            let link = link.to_string();
            if link.contains("/veiculos/") && !links.contains(&link) {
                links.push(link);
            }
        }

        Ok(links)
    }

    fn control(&self, axis: Axis) -> Result<ElementHandle> {
        match axis {
            Axis::Term => self.driver.find(&term_select()),
            Axis::Mileage => self.driver.find(&bundle_select()),
        }
    }
}

/// Monthly allowance of a bundle label such as `"36000 km"` for a contract of
/// `term_months`
fn monthly_mileage(label: &str, term_months: u32) -> Result<u32> {
    let total = label
        .split_whitespace()
        .next()
        .ok_or_else(|| ScrapeError::format("quantity", label))
        .and_then(|km| parse_integer_quantity(km, ""))?;
    if term_months == 0 {
        return Err(ScrapeError::format("term", "0"));
    }
    Ok(total / term_months)
}

impl<D: BrowserDriver> SiteFlow for PortoFlow<D> {
    fn source(&self) -> Source {
        Source::Porto
    }

    fn axis_order(&self) -> [Axis; 2] {
        [Axis::Term, Axis::Mileage]
    }

    fn open_collection(&mut self) -> Result<usize> {
        self.driver.navigate(COLLECTION_URL)?;
        self.driver.wait(Duration::from_secs(10));

        // Cards load as the page is scrolled
        self.driver.scroll_to_bottom()?;
        self.driver.wait(Duration::from_secs(5));

        self.links = self.vehicle_links()?;
        info!("Found {} vehicle pages on {}", self.links.len(), COLLECTION_URL);
        Ok(self.links.len())
    }

    fn open_listing(&mut self, index: usize) -> Result<Listing> {
        let link = self
            .links
            .get(index)
            .cloned()
            .ok_or_else(|| ScrapeError::not_found(format!("vehicle link #{}", index)))?;

        self.driver.navigate(&link)?;
        self.driver.wait(Duration::from_secs(2));
        self.selected_term = None;

        let title = self.driver.find(&name_locator())?;
        let name = self.driver.text(&title)?.trim().to_string();
        debug!("Porto listing {}: {}", index, name);

        Ok(Listing { name, url: Some(link) })
    }

    fn options(&mut self, axis: Axis) -> Result<Vec<PlanOption>> {
        let control = self.control(axis)?;
        let labels = self.driver.options(&control)?;

        // First entry of both lists is a "Selecione" placeholder
        match axis {
            Axis::Term => {
                PlanOption::parse_all(axis, labels, 1, |l| parse_integer_quantity(l, " meses"))
            }
            Axis::Mileage => {
                let term = self.selected_term.ok_or_else(|| {
                    ScrapeError::Driver("bundles read before a term was selected".to_string())
                })?;
                PlanOption::parse_all(axis, labels, 1, |l| monthly_mileage(l, term))
            }
        }
    }

    fn select(&mut self, option: &PlanOption) -> Result<()> {
        let control = self.control(option.axis)?;
        self.driver.select_option(&control, &option.label)?;
        self.driver.wait(Duration::from_millis(500));
        if option.axis == Axis::Term {
            self.selected_term = Some(option.value);
        }
        Ok(())
    }

    fn read_quote(&mut self) -> Result<RawQuote> {
        let price = self.driver.find(&price_locator())?;
        let text = self.driver.text(&price)?;
        let price_text = text.split_whitespace().last().unwrap_or_default().to_string();

        Ok(RawQuote {
            price_text,
            note: None,
        })
    }

    fn close_listing(&mut self) -> Result<()> {
        Ok(())
    }

    fn return_to_collection(&mut self) -> Result<()> {
        self.driver.navigate(COLLECTION_URL)?;
        self.driver.wait(Duration::from_secs(2));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::extractor::Extraction;
    use crate::scrapers::testing::{FakeDriver, FakeElement};
    use rust_decimal::Decimal;
    use std::collections::HashSet;

    fn page() -> FakeDriver {
        FakeDriver::new()
            .with(
                link_locator(),
                vec![
                    FakeElement::link("/veiculos/jeep-compass"),
                    FakeElement::link("https://www.portosegurocarrofacil.com.br/sobre"),
                    FakeElement::link("/veiculos/jeep-compass"),
                    FakeElement::link("/veiculos/fiat-pulse"),
                ],
            )
            .with(name_locator(), vec![FakeElement::text("Compass Longitude")])
            .with(
                term_select(),
                vec![FakeElement::select(&["Selecione", "12 meses", "24 meses"])],
            )
            .with(
                bundle_select(),
                vec![FakeElement::select(&["Selecione", "12000 km", "24000 km", "36000 km"])],
            )
            .with(price_locator(), vec![FakeElement::text("R$ 3.289,90")])
    }

    #[test]
    fn test_monthly_mileage() {
        assert_eq!(monthly_mileage("36000 km", 36).unwrap(), 1000);
        assert_eq!(monthly_mileage("30000 km", 12).unwrap(), 2500);
        assert!(monthly_mileage("km", 12).is_err());
        assert!(monthly_mileage("12000 km", 0).is_err());
    }

    #[test]
    fn test_collects_unique_vehicle_links() {
        let driver = page();
        let mut flow = PortoFlow::new(&driver);

        assert_eq!(flow.open_collection().unwrap(), 2);
        assert_eq!(
            flow.links,
            vec![
                "https://www.portosegurocarrofacil.com.br/veiculos/jeep-compass".to_string(),
                "https://www.portosegurocarrofacil.com.br/veiculos/fiat-pulse".to_string(),
            ]
        );
        assert_eq!(driver.actions("scroll"), vec!["scroll bottom".to_string()]);
        // All hrefs are read in a single pass over the page
        assert_eq!(driver.lookups(&link_locator()), 1);
    }

    #[test]
    fn test_extracts_term_by_bundle_grid() {
        let driver = page();
        let records: Vec<_> = Extraction::new(PortoFlow::new(&driver))
            .with_pause(|_| {})
            .map(|r| r.unwrap())
            .collect();

        // 2 vehicles x 2 terms x 3 bundles
        assert_eq!(records.len(), 12);
        let pairs: HashSet<_> = records
            .iter()
            .filter(|r| r.url.as_deref().is_some_and(|u| u.ends_with("fiat-pulse")))
            .map(|r| (r.term_months, r.mileage_km))
            .collect();
        assert_eq!(
            pairs,
            HashSet::from([(12, 1000), (12, 2000), (12, 3000), (24, 500), (24, 1000), (24, 1500)])
        );
        assert!(records.iter().all(|r| r.price == Decimal::new(328_990, 2)));
        assert!(records.iter().all(|r| r.note.is_none() && r.source == Source::Porto));
    }
}
