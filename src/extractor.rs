use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::fetcher::PageFetcher;
use crate::utils::error::AppError;
use crate::Result;

/// Everything the pipeline needs to know about one product page. Consumed
/// by reconciliation, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSignal {
    pub product_id: String,
    pub name: String,
    pub url: String,
    pub price: Option<Decimal>,
    pub is_buyable: bool,
    pub brand_verified: bool,
}

/// Normalized signal bundle pulled from one document. All markup fragility
/// lives in `SignalExtractor::read_signals`; the verdicts over this bundle
/// are pure functions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSignals {
    pub name: Option<String>,
    pub brand_text: Option<String>,
    pub price_text: Option<String>,
    pub has_add_to_cart: bool,
    pub has_out_of_stock_marker: bool,
    pub has_notify_me: bool,
}

/// Buyability is a majority vote over four independent signals, so a single
/// broken heuristic cannot flip the verdict:
/// add-to-cart present, no out-of-stock marker, price shown, no notify-me.
pub fn is_buyable(signals: &PageSignals) -> bool {
    let votes = [
        signals.has_add_to_cart,
        !signals.has_out_of_stock_marker,
        signals.price_text.is_some(),
        !signals.has_notify_me,
    ];

    votes.iter().filter(|v| **v).count() >= 3
}

/// Case-insensitive brand match against the product name or the page's
/// brand attribution text. Also accepts the brand with spaces collapsed
/// ("hotwheels" for "hot wheels").
pub fn brand_matches(brand: &str, signals: &PageSignals) -> bool {
    let needle = brand.to_lowercase();
    let compact = needle.replace(' ', "");
    let contains_brand = |text: &str| {
        let lower = text.to_lowercase();
        lower.contains(&needle) || lower.contains(&compact)
    };

    signals.name.as_deref().is_some_and(contains_brand)
        || signals.brand_text.as_deref().is_some_and(contains_brand)
}

/// Strip currency symbols and thousands separators, then parse. Anything
/// that still fails to parse means "no price", not an error.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '₹' | ',') && !c.is_whitespace())
        .collect();

    cleaned.parse().ok()
}

pub struct SignalExtractor {
    fetcher: Arc<dyn PageFetcher>,
    brand: String,
    id_pattern: Regex,
    name_selectors: Vec<Selector>,
    brand_selectors: Vec<Selector>,
    price_selectors: Vec<Selector>,
    button_selector: Selector,
    stock_marker_selector: Selector,
    cart_pattern: Regex,
    out_of_stock_pattern: Regex,
    notify_me_pattern: Regex,
}

impl SignalExtractor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, brand: &str) -> Result<Self> {
        let brand_slug = brand.to_lowercase().replace(' ', "-");

        Ok(Self {
            fetcher,
            brand: brand.to_string(),
            id_pattern: Regex::new(r"/(\d+)/product-detail")?,
            name_selectors: parse_selectors(&["h1.prod-name", r#"span[itemprop="name"]"#])?,
            brand_selectors: parse_selectors(&[
                r#"span[itemprop="brand"]"#,
                &format!(r#"a[href*="/{brand_slug}"]"#),
            ])?,
            price_selectors: parse_selectors(&["span.prod-price", r#"span[itemprop="price"]"#])?,
            button_selector: parse_selector("button")?,
            stock_marker_selector: parse_selector("span.out-of-stock")?,
            cart_pattern: Regex::new(r"(?i)add\s+to\s+cart")?,
            out_of_stock_pattern: Regex::new(r"(?i)out\s+of\s+stock")?,
            notify_me_pattern: Regex::new(r"(?i)notify\s+me")?,
        })
    }

    /// Fetch and validate one candidate URL. Returns None when the page is
    /// unavailable or a required field (id, name) cannot be extracted —
    /// a filter for the caller, not an error.
    pub async fn validate(&self, url: &str) -> Option<ValidatedSignal> {
        let product_id = self.product_id(url)?;

        let page = match self.fetcher.fetch(url).await {
            Ok(page) if page.is_success() => page,
            Ok(page) => {
                debug!(url, status = page.status, "product page unavailable");
                return None;
            }
            Err(e) => {
                warn!(url, error = %e, "error validating product");
                return None;
            }
        };

        let signals = self.read_signals(&page.body);
        let Some(name) = signals.name.clone() else {
            debug!(url, "product page has no extractable name");
            return None;
        };

        Some(ValidatedSignal {
            product_id,
            name,
            url: url.to_string(),
            price: signals.price_text.as_deref().and_then(parse_price),
            is_buyable: is_buyable(&signals),
            brand_verified: brand_matches(&self.brand, &signals),
        })
    }

    /// Numeric id segment preceding `/product-detail` in the URL.
    pub fn product_id(&self, url: &str) -> Option<String> {
        self.id_pattern
            .captures(url)
            .map(|captures| captures[1].to_string())
    }

    /// The single markup-facing adapter: everything below is heuristic
    /// matching against the page, everything above works on the bundle.
    pub fn read_signals(&self, body: &str) -> PageSignals {
        let document = Html::parse_document(body);

        let first_text = |selectors: &[Selector]| {
            selectors
                .iter()
                .find_map(|selector| {
                    document
                        .select(selector)
                        .next()
                        .map(|element| element_text(&element))
                })
                .filter(|text| !text.is_empty())
        };

        let page_text = element_text(&document.root_element());

        let has_add_to_cart = document
            .select(&self.button_selector)
            .any(|button| self.cart_pattern.is_match(&element_text(&button)));

        let has_out_of_stock_marker = self.out_of_stock_pattern.is_match(&page_text)
            || document.select(&self.stock_marker_selector).next().is_some();

        PageSignals {
            name: first_text(&self.name_selectors),
            brand_text: first_text(&self.brand_selectors),
            price_text: first_text(&self.price_selectors),
            has_add_to_cart,
            has_out_of_stock_marker,
            has_notify_me: self.notify_me_pattern.is_match(&page_text),
        }
    }
}

fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::Parse {
        message: format!("invalid selector '{selector}': {e:?}"),
    })
}

fn parse_selectors(selectors: &[&str]) -> Result<Vec<Selector>> {
    selectors.iter().map(|s| parse_selector(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchedPage;
    use async_trait::async_trait;
    use rstest::rstest;

    struct OnePageFetcher {
        status: u16,
        body: String,
    }

    #[async_trait]
    impl PageFetcher for OnePageFetcher {
        async fn fetch(&self, _url: &str) -> crate::Result<FetchedPage> {
            Ok(FetchedPage {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    fn extractor_for(status: u16, body: &str) -> SignalExtractor {
        SignalExtractor::new(
            Arc::new(OnePageFetcher {
                status,
                body: body.to_string(),
            }),
            "hot wheels",
        )
        .unwrap()
    }

    const BUYABLE_PAGE: &str = r#"<html><body>
        <h1 class="prod-name">Hot Wheels Track Set</h1>
        <span class="prod-price">₹1,299</span>
        <button>ADD TO CART</button>
    </body></html>"#;

    const OUT_OF_STOCK_PAGE: &str = r#"<html><body>
        <h1 class="prod-name">Hot Wheels Track Set</h1>
        <span class="out-of-stock">Out of Stock</span>
        <button>NOTIFY ME</button>
    </body></html>"#;

    #[rstest]
    // 3 of 4 true: buyable even though notify-me is present
    #[case(true, false, true, true, true)]
    // all 4 true
    #[case(true, false, true, false, true)]
    // 2 of 4: not buyable
    #[case(true, true, false, false, false)]
    // 0 of 4
    #[case(false, true, false, true, false)]
    fn test_majority_vote(
        #[case] cart: bool,
        #[case] stock_warning: bool,
        #[case] price_shown: bool,
        #[case] notify_me: bool,
        #[case] expected: bool,
    ) {
        let signals = PageSignals {
            name: Some("Hot Wheels Car".to_string()),
            brand_text: None,
            price_text: price_shown.then(|| "₹499".to_string()),
            has_add_to_cart: cart,
            has_out_of_stock_marker: stock_warning,
            has_notify_me: notify_me,
        };

        assert_eq!(is_buyable(&signals), expected);
    }

    #[test]
    fn test_brand_match_in_name() {
        let signals = PageSignals {
            name: Some("HOT WHEELS Monster Truck".to_string()),
            ..Default::default()
        };
        assert!(brand_matches("hot wheels", &signals));
    }

    #[test]
    fn test_brand_match_compact_form() {
        let signals = PageSignals {
            name: Some("Hotwheels 5-Car Pack".to_string()),
            ..Default::default()
        };
        assert!(brand_matches("hot wheels", &signals));
    }

    #[test]
    fn test_brand_match_via_attribution_element() {
        let signals = PageSignals {
            name: Some("Monster Truck".to_string()),
            brand_text: Some("Hot Wheels".to_string()),
            ..Default::default()
        };
        assert!(brand_matches("hot wheels", &signals));
    }

    #[test]
    fn test_brand_mismatch() {
        let signals = PageSignals {
            name: Some("Barbie Dream House".to_string()),
            brand_text: Some("Barbie".to_string()),
            ..Default::default()
        };
        assert!(!brand_matches("hot wheels", &signals));
    }

    #[rstest]
    #[case("₹1,299", Some("1299"))]
    #[case("₹1,299.50", Some("1299.50"))]
    #[case("499", Some("499"))]
    #[case(" ₹ 2,499 ", Some("2499"))]
    #[case("Rs.499", None)]
    #[case("", None)]
    fn test_parse_price(#[case] raw: &str, #[case] expected: Option<&str>) {
        let expected = expected.map(|s| s.parse::<Decimal>().unwrap());
        assert_eq!(parse_price(raw), expected);
    }

    #[test]
    fn test_product_id_extraction() {
        let extractor = extractor_for(200, "");
        assert_eq!(
            extractor.product_id("https://shop.example.com/track-set/12345/product-detail"),
            Some("12345".to_string())
        );
        assert_eq!(
            extractor.product_id("https://shop.example.com/track-set/overview"),
            None
        );
    }

    #[test]
    fn test_read_signals_buyable_page() {
        let extractor = extractor_for(200, BUYABLE_PAGE);
        let signals = extractor.read_signals(BUYABLE_PAGE);

        assert_eq!(signals.name.as_deref(), Some("Hot Wheels Track Set"));
        assert_eq!(signals.price_text.as_deref(), Some("₹1,299"));
        assert!(signals.has_add_to_cart);
        assert!(!signals.has_out_of_stock_marker);
        assert!(!signals.has_notify_me);
        assert!(is_buyable(&signals));
    }

    #[test]
    fn test_read_signals_out_of_stock_page() {
        let extractor = extractor_for(200, OUT_OF_STOCK_PAGE);
        let signals = extractor.read_signals(OUT_OF_STOCK_PAGE);

        assert!(!signals.has_add_to_cart);
        assert!(signals.has_out_of_stock_marker);
        assert!(signals.has_notify_me);
        assert!(signals.price_text.is_none());
        assert!(!is_buyable(&signals));
    }

    #[tokio::test]
    async fn test_validate_full_signal() {
        let extractor = extractor_for(200, BUYABLE_PAGE);
        let signal = extractor
            .validate("https://shop.example.com/track-set/12345/product-detail")
            .await
            .unwrap();

        assert_eq!(signal.product_id, "12345");
        assert_eq!(signal.name, "Hot Wheels Track Set");
        assert_eq!(signal.price, Some("1299".parse().unwrap()));
        assert!(signal.is_buyable);
        assert!(signal.brand_verified);
    }

    #[tokio::test]
    async fn test_validate_drops_page_without_name() {
        let body = r#"<html><body><span class="prod-price">₹99</span></body></html>"#;
        let extractor = extractor_for(200, body);
        let signal = extractor
            .validate("https://shop.example.com/mystery/42/product-detail")
            .await;
        assert!(signal.is_none());
    }

    #[tokio::test]
    async fn test_validate_drops_url_without_id() {
        let extractor = extractor_for(200, BUYABLE_PAGE);
        let signal = extractor
            .validate("https://shop.example.com/track-set/overview")
            .await;
        assert!(signal.is_none());
    }

    #[tokio::test]
    async fn test_validate_drops_non_success_status() {
        let extractor = extractor_for(404, BUYABLE_PAGE);
        let signal = extractor
            .validate("https://shop.example.com/track-set/12345/product-detail")
            .await;
        assert!(signal.is_none());
    }

    #[tokio::test]
    async fn test_validate_unverified_brand_is_flagged() {
        let body = r#"<html><body>
            <h1 class="prod-name">Generic Race Track</h1>
            <span class="prod-price">₹799</span>
            <button>ADD TO CART</button>
        </body></html>"#;
        let extractor = extractor_for(200, body);
        let signal = extractor
            .validate("https://shop.example.com/generic/77/product-detail")
            .await
            .unwrap();

        assert!(!signal.brand_verified);
    }
}
