use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

use crate::fetcher::PageFetcher;
use crate::utils::error::AppError;
use crate::Result;

/// Listing surfaces believed to contain product links. Each is scanned
/// independently; one broken surface never blocks the others.
const DISCOVERY_SURFACES: &[(&str, &str)] = &[
    ("brand_listing", "/hot-wheels/0/0/113"),
    ("search_results", "/search?searchstring=hot%20wheels"),
    (
        "toy_cars_category",
        "/hot-wheels/toy-cars,-trains-and-vehicles/5/94/113",
    ),
];

/// Product-detail link shape: a slug segment, a numeric id, then the
/// product-detail marker.
const PRODUCT_LINK_PATTERN: &str = r"/[^/]+/\d+/product-detail";

pub struct DiscoveryAggregator {
    fetcher: Arc<dyn PageFetcher>,
    base_url: Url,
    surfaces: Vec<(String, String)>,
    link_pattern: Regex,
    anchor_selector: Selector,
}

impl DiscoveryAggregator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, base_url: Url) -> Result<Self> {
        let surfaces = DISCOVERY_SURFACES
            .iter()
            .map(|(name, path)| (name.to_string(), path.to_string()))
            .collect();
        Self::with_surfaces(fetcher, base_url, surfaces)
    }

    pub fn with_surfaces(
        fetcher: Arc<dyn PageFetcher>,
        base_url: Url,
        surfaces: Vec<(String, String)>,
    ) -> Result<Self> {
        let link_pattern = Regex::new(PRODUCT_LINK_PATTERN)?;
        let anchor_selector = Selector::parse("a[href]").map_err(|e| AppError::Parse {
            message: format!("anchor selector: {e}"),
        })?;

        Ok(Self {
            fetcher,
            base_url,
            surfaces,
            link_pattern,
            anchor_selector,
        })
    }

    /// One discovery pass over every configured surface. Returns the union
    /// of product URLs found; may be empty, never an error.
    pub async fn discover(&self) -> HashSet<String> {
        let mut candidates = HashSet::new();

        for (surface, path) in &self.surfaces {
            info!(surface = %surface, "scanning discovery surface");

            let url = match self.base_url.join(path) {
                Ok(url) => url,
                Err(e) => {
                    warn!(surface = %surface, path = %path, error = %e, "skipping surface with bad path");
                    continue;
                }
            };

            let page = match self.fetcher.fetch(url.as_str()).await {
                Ok(page) if page.is_success() => page,
                Ok(page) => {
                    warn!(surface = %surface, status = page.status, "failed to fetch surface");
                    continue;
                }
                Err(e) => {
                    error!(surface = %surface, error = %e, "error scanning surface");
                    continue;
                }
            };

            let before = candidates.len();
            self.collect_product_links(&page.body, &mut candidates);
            info!(surface = %surface, found = candidates.len() - before, "surface scan complete");
        }

        info!(total = candidates.len(), "unique candidates discovered");
        candidates
    }

    fn collect_product_links(&self, body: &str, out: &mut HashSet<String>) {
        let document = Html::parse_document(body);

        for element in document.select(&self.anchor_selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if !self.link_pattern.is_match(href) {
                continue;
            }

            match self.base_url.join(href) {
                Ok(resolved) => {
                    out.insert(resolved.to_string());
                }
                Err(e) => {
                    warn!(href, error = %e, "skipping unresolvable product link");
                }
            }
        }
    }
}
