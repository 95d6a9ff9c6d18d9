use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::extractor::ValidatedSignal;
use crate::models::{NewTransition, NotificationKind, ProductRecord, ProductState};
use crate::store::ProductStore;
use crate::Result;

/// What the state machine decided for one observation, before anything is
/// written or delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub new_state: ProductState,
    pub notification: Option<NotificationKind>,
}

/// The transition function. Buyable observations of previously-unbuyable
/// (or unknown) products notify; everything else is silent. Pure, so the
/// whole notification policy is testable as a table.
pub fn decide(old_state: Option<ProductState>, is_buyable: bool) -> Decision {
    let new_state = if is_buyable {
        ProductState::Buyable
    } else {
        ProductState::OutOfStock
    };

    let notification = if new_state != ProductState::Buyable {
        None
    } else {
        match old_state {
            None => Some(NotificationKind::New),
            Some(ProductState::OutOfStock) | Some(ProductState::Hidden) => {
                Some(NotificationKind::Restock)
            }
            // Still in stock, or an unresolved first sighting: no alert.
            Some(ProductState::Buyable) | Some(ProductState::New) => None,
        }
    };

    Decision {
        new_state,
        notification,
    }
}

/// Outcome of reconciling one signal: the committed record, whether a
/// transition was logged, and the notification the caller should deliver.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub record: ProductRecord,
    pub transitioned: bool,
    pub notification: Option<NotificationKind>,
}

pub struct ReconcileEngine {
    store: Arc<ProductStore>,
}

impl ReconcileEngine {
    pub fn new(store: Arc<ProductStore>) -> Self {
        Self { store }
    }

    /// Compare a fresh signal with persisted state, commit the new record
    /// (and transition, if the state changed) atomically, and report the
    /// notification decision. The transition row records the decision
    /// before any delivery attempt happens; delivery failure never rewrites
    /// it. Callers must only pass brand-verified signals.
    pub async fn reconcile(&self, signal: &ValidatedSignal) -> Result<ReconcileOutcome> {
        let existing = self.store.get(&signal.product_id).await?;
        let old_state = existing.as_ref().map(|record| record.state);
        let decision = decide(old_state, signal.is_buyable);

        let now = Utc::now();
        let record = ProductRecord {
            product_id: signal.product_id.clone(),
            name: signal.name.clone(),
            url: signal.url.clone(),
            price: signal.price,
            state: decision.new_state,
            last_seen: now,
            first_discovered: existing
                .as_ref()
                .map(|record| record.first_discovered)
                .unwrap_or(now),
            brand_verified: signal.brand_verified,
        };

        let transition = (old_state != Some(decision.new_state)).then(|| NewTransition {
            product_id: record.product_id.clone(),
            from_state: old_state,
            to_state: decision.new_state,
            timestamp: now,
            notified: decision.notification.is_some(),
        });
        let transitioned = transition.is_some();

        self.store.commit_observation(&record, transition).await?;

        if transitioned {
            info!(
                product = %record.name,
                from = old_state.map(|s| s.as_str()).unwrap_or("NEW"),
                to = %decision.new_state,
                "state transition"
            );
        }

        Ok(ReconcileOutcome {
            record,
            transitioned,
            notification: decision.notification,
        })
    }

    /// A known product that can no longer be validated anywhere goes
    /// hidden. Logs the transition exactly once; `last_seen` stays at the
    /// last successful observation. Returns whether a transition was
    /// written.
    pub async fn mark_hidden(&self, record: &ProductRecord) -> Result<bool> {
        if record.state == ProductState::Hidden {
            return Ok(false);
        }

        let mut hidden = record.clone();
        hidden.state = ProductState::Hidden;

        let transition = NewTransition {
            product_id: record.product_id.clone(),
            from_state: Some(record.state),
            to_state: ProductState::Hidden,
            timestamp: Utc::now(),
            notified: false,
        };

        self.store
            .commit_observation(&hidden, Some(transition))
            .await?;

        info!(
            product = %record.name,
            from = %record.state,
            "product no longer visible"
        );
        Ok(true)
    }
}
