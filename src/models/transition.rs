use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::models::ProductState;

/// Append-only audit entry: one row per observed state change. Ordering by
/// id (or timestamp) reconstructs the full history of a product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionRecord {
    pub id: i64,
    pub product_id: String,
    /// None means the product did not exist before this observation.
    pub from_state: Option<ProductState>,
    pub to_state: ProductState,
    pub timestamp: DateTime<Utc>,
    /// Whether the engine decided to notify on this transition. Records the
    /// decision, not delivery success.
    pub notified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransition {
    pub product_id: String,
    pub from_state: Option<ProductState>,
    pub to_state: ProductState,
    pub timestamp: DateTime<Utc>,
    pub notified: bool,
}

impl FromRow<'_, SqliteRow> for TransitionRecord {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let decode_state = |column: &str, raw: String| {
            raw.parse::<ProductState>()
                .map_err(|e| sqlx::Error::ColumnDecode {
                    index: column.into(),
                    source: Box::new(e),
                })
        };

        let from_state = row
            .try_get::<Option<String>, _>("from_state")?
            .map(|raw| decode_state("from_state", raw))
            .transpose()?;
        let to_state = decode_state("to_state", row.try_get::<String, _>("to_state")?)?;

        Ok(Self {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            from_state,
            to_state,
            timestamp: row.try_get("timestamp")?,
            notified: row.try_get("notified")?,
        })
    }
}
