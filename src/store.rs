use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::models::{NewTransition, ProductRecord, TransitionRecord};
use crate::Result;

/// Durable per-product state: a `products` table keyed by product id with
/// upsert semantics, and an append-only `transitions` log.
pub struct ProductStore {
    pool: SqlitePool,
}

// first_discovered is deliberately missing from the update list: once a row
// exists, that column never changes.
const UPSERT_PRODUCT: &str = r#"
INSERT INTO products (product_id, name, url, price, state, last_seen, first_discovered, brand_verified)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(product_id) DO UPDATE SET
    name = excluded.name,
    url = excluded.url,
    price = excluded.price,
    state = excluded.state,
    last_seen = excluded.last_seen,
    brand_verified = excluded.brand_verified
"#;

impl ProductStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Throwaway in-memory store, mainly for tests and `--database` dry runs.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                product_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                price TEXT,
                state TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                first_discovered TEXT NOT NULL,
                brand_verified INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                product_id TEXT NOT NULL,
                from_state TEXT,
                to_state TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                notified INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("database schema ready");
        Ok(())
    }

    pub async fn get(&self, product_id: &str) -> Result<Option<ProductRecord>> {
        let record = sqlx::query_as::<_, ProductRecord>(
            "SELECT product_id, name, url, price, state, last_seen, first_discovered, brand_verified \
             FROM products WHERE product_id = ?",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn all_products(&self) -> Result<Vec<ProductRecord>> {
        let records = sqlx::query_as::<_, ProductRecord>(
            "SELECT product_id, name, url, price, state, last_seen, first_discovered, brand_verified \
             FROM products ORDER BY product_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Commit one observation atomically: upsert the record and, when the
    /// state changed, append its transition in the same transaction. No
    /// partial write is ever visible to a concurrent reader of the product.
    pub async fn commit_observation(
        &self,
        record: &ProductRecord,
        transition: Option<NewTransition>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(UPSERT_PRODUCT)
            .bind(&record.product_id)
            .bind(&record.name)
            .bind(&record.url)
            .bind(record.price.map(|p| p.to_string()))
            .bind(record.state.as_str())
            .bind(record.last_seen)
            .bind(record.first_discovered)
            .bind(record.brand_verified)
            .execute(&mut *tx)
            .await?;

        if let Some(transition) = transition {
            sqlx::query(
                "INSERT INTO transitions (product_id, from_state, to_state, timestamp, notified) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&transition.product_id)
            .bind(transition.from_state.map(|s| s.as_str()))
            .bind(transition.to_state.as_str())
            .bind(transition.timestamp)
            .bind(transition.notified)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Full transition history for one product, oldest first.
    pub async fn transitions_for(&self, product_id: &str) -> Result<Vec<TransitionRecord>> {
        let transitions = sqlx::query_as::<_, TransitionRecord>(
            "SELECT id, product_id, from_state, to_state, timestamp, notified \
             FROM transitions WHERE product_id = ? ORDER BY id",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductState;
    use chrono::{Duration, Utc};

    fn sample_record(product_id: &str) -> ProductRecord {
        ProductRecord {
            product_id: product_id.to_string(),
            name: "Hot Wheels Track Set".to_string(),
            url: format!("https://shop.example.com/track-set/{product_id}/product-detail"),
            price: Some("1299".parse().unwrap()),
            state: ProductState::Buyable,
            last_seen: Utc::now(),
            first_discovered: Utc::now(),
            brand_verified: true,
        }
    }

    #[tokio::test]
    async fn test_get_missing_product() {
        let store = ProductStore::in_memory().await.unwrap();
        assert!(store.get("12345").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_and_get_roundtrip() {
        let store = ProductStore::in_memory().await.unwrap();
        let record = sample_record("12345");

        store.commit_observation(&record, None).await.unwrap();

        let loaded = store.get("12345").await.unwrap().unwrap();
        assert_eq!(loaded.product_id, record.product_id);
        assert_eq!(loaded.name, record.name);
        assert_eq!(loaded.price, record.price);
        assert_eq!(loaded.state, ProductState::Buyable);
        assert!(loaded.brand_verified);
    }

    #[tokio::test]
    async fn test_absent_price_roundtrip() {
        let store = ProductStore::in_memory().await.unwrap();
        let mut record = sample_record("222");
        record.price = None;

        store.commit_observation(&record, None).await.unwrap();

        let loaded = store.get("222").await.unwrap().unwrap();
        assert!(loaded.price.is_none());
    }

    #[tokio::test]
    async fn test_first_discovered_survives_upsert() {
        let store = ProductStore::in_memory().await.unwrap();

        let original = sample_record("12345");
        store.commit_observation(&original, None).await.unwrap();

        let mut later = sample_record("12345");
        later.first_discovered = original.first_discovered + Duration::hours(6);
        later.last_seen = original.last_seen + Duration::hours(6);
        later.state = ProductState::OutOfStock;
        store.commit_observation(&later, None).await.unwrap();

        let loaded = store.get("12345").await.unwrap().unwrap();
        assert_eq!(
            loaded.first_discovered.timestamp(),
            original.first_discovered.timestamp()
        );
        assert_eq!(loaded.state, ProductState::OutOfStock);
    }

    #[tokio::test]
    async fn test_commit_with_transition() {
        let store = ProductStore::in_memory().await.unwrap();
        let record = sample_record("12345");

        let transition = NewTransition {
            product_id: record.product_id.clone(),
            from_state: None,
            to_state: ProductState::Buyable,
            timestamp: record.last_seen,
            notified: true,
        };
        store
            .commit_observation(&record, Some(transition))
            .await
            .unwrap();

        let history = store.transitions_for("12345").await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].from_state.is_none());
        assert_eq!(history[0].to_state, ProductState::Buyable);
        assert!(history[0].notified);
    }

    #[tokio::test]
    async fn test_transition_history_ordering() {
        let store = ProductStore::in_memory().await.unwrap();
        let record = sample_record("12345");

        let steps = [
            (None, ProductState::Buyable, true),
            (Some(ProductState::Buyable), ProductState::OutOfStock, false),
            (Some(ProductState::OutOfStock), ProductState::Buyable, true),
        ];
        for (from_state, to_state, notified) in steps {
            let transition = NewTransition {
                product_id: record.product_id.clone(),
                from_state,
                to_state,
                timestamp: Utc::now(),
                notified,
            };
            store
                .commit_observation(&record, Some(transition))
                .await
                .unwrap();
        }

        let history = store.transitions_for("12345").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].to_state, ProductState::Buyable);
        assert_eq!(history[1].to_state, ProductState::OutOfStock);
        assert_eq!(history[2].to_state, ProductState::Buyable);
        assert!(history[0].id < history[1].id && history[1].id < history[2].id);
    }

    #[tokio::test]
    async fn test_all_products() {
        let store = ProductStore::in_memory().await.unwrap();
        store
            .commit_observation(&sample_record("300"), None)
            .await
            .unwrap();
        store
            .commit_observation(&sample_record("100"), None)
            .await
            .unwrap();

        let all = store.all_products().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].product_id, "100");
        assert_eq!(all[1].product_id, "300");
    }
}
