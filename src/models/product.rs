use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

use crate::models::ProductState;

/// Last known truth about one product, keyed by the numeric id from its
/// canonical URL. `first_discovered` is immutable once set; `last_seen`
/// advances on every successful observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub product_id: String,
    pub name: String,
    pub url: String,
    pub price: Option<Decimal>,
    pub state: ProductState,
    pub last_seen: DateTime<Utc>,
    pub first_discovered: DateTime<Utc>,
    pub brand_verified: bool,
}

// Price and state are stored as TEXT (exact decimal, explicit state names);
// everything else maps directly through sqlx's sqlite support.
impl sqlx::FromRow<'_, SqliteRow> for ProductRecord {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let price = row
            .try_get::<Option<String>, _>("price")?
            .map(|raw| Decimal::from_str(&raw))
            .transpose()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "price".into(),
                source: Box::new(e),
            })?;

        let state = row
            .try_get::<String, _>("state")?
            .parse::<ProductState>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "state".into(),
                source: Box::new(e),
            })?;

        Ok(Self {
            product_id: row.try_get("product_id")?,
            name: row.try_get("name")?,
            url: row.try_get("url")?,
            price,
            state,
            last_seen: row.try_get("last_seen")?,
            first_discovered: row.try_get("first_discovered")?,
            brand_verified: row.try_get("brand_verified")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ProductRecord {
        ProductRecord {
            product_id: "12345".to_string(),
            name: "Hot Wheels Track Set".to_string(),
            url: "https://www.firstcry.com/hot-wheels-track-set/12345/product-detail"
                .to_string(),
            price: Some("1299.00".parse().unwrap()),
            state: ProductState::Buyable,
            last_seen: Utc::now(),
            first_discovered: Utc::now(),
            brand_verified: true,
        }
    }

    #[test]
    fn test_serialization_roundtrip() {
        let record = sample_record();
        let serialized = serde_json::to_string(&record).unwrap();
        let deserialized: ProductRecord = serde_json::from_str(&serialized).unwrap();
        assert_eq!(record, deserialized);
    }

    #[test]
    fn test_absent_price_serializes_as_null() {
        let mut record = sample_record();
        record.price = None;
        let value = serde_json::to_value(&record).unwrap();
        assert!(value["price"].is_null());
    }
}
