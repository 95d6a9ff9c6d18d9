use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::discovery::DiscoveryAggregator;
use crate::extractor::{SignalExtractor, ValidatedSignal};
use crate::notifier::{Alert, Notifier};
use crate::reconcile::ReconcileEngine;
use crate::store::ProductStore;
use crate::Result;

/// Drives one discovery → validate → reconcile → notify cycle, and the
/// continuous loop around it. Owns all injected collaborators.
pub struct Monitor {
    discovery: DiscoveryAggregator,
    extractor: SignalExtractor,
    engine: ReconcileEngine,
    store: Arc<ProductStore>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(
        discovery: DiscoveryAggregator,
        extractor: SignalExtractor,
        engine: ReconcileEngine,
        store: Arc<ProductStore>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            discovery,
            extractor,
            engine,
            store,
            notifier,
            config,
        }
    }

    /// One complete scan cycle. Returns the number of notifications
    /// actually delivered. A single candidate's failure never aborts the
    /// remaining candidates.
    pub async fn run_scan(&self) -> Result<usize> {
        info!("starting scan cycle");

        let candidates = self.discovery.discover().await;

        let mut notifications_sent = 0;
        let mut delivery_failures = 0;
        let mut seen_ids: HashSet<String> = HashSet::new();

        for url in &candidates {
            match self.process_candidate(url).await {
                Ok(Some(processed)) => {
                    seen_ids.insert(processed.product_id);
                    match processed.delivery {
                        Some(true) => notifications_sent += 1,
                        Some(false) => delivery_failures += 1,
                        None => {}
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(url = %url, error = %e, "failed to process candidate");
                }
            }

            self.pace().await;
        }

        let (swept_sent, swept_failed) = self.sweep_missing(&seen_ids).await?;
        notifications_sent += swept_sent;
        delivery_failures += swept_failed;

        if delivery_failures > 0 {
            warn!(delivery_failures, "some notifications were not delivered");
        }
        info!(
            candidates = candidates.len(),
            notifications = notifications_sent,
            "scan cycle complete"
        );
        Ok(notifications_sent)
    }

    /// Continuous mode: repeat `run_scan` on a fixed interval. A failed
    /// cycle is logged and followed by a cooldown instead of the normal
    /// interval. Shutdown is honored between cycles, never mid-commit.
    pub async fn run_continuous(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            interval = self.config.scan_interval,
            "starting continuous monitoring"
        );

        loop {
            if *shutdown.borrow() {
                info!("shutdown requested, stopping before next cycle");
                return Ok(());
            }

            let delay = match self.run_scan().await {
                Ok(sent) => {
                    debug!(notifications = sent, "cycle finished");
                    Duration::from_secs(self.config.scan_interval)
                }
                Err(e) => {
                    error!(error = %e, "error in scan cycle");
                    Duration::from_secs(self.config.failure_cooldown)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    async fn process_candidate(&self, url: &str) -> Result<Option<ProcessedCandidate>> {
        let Some(signal) = self.extractor.validate(url).await else {
            return Ok(None);
        };

        if !signal.brand_verified {
            debug!(url, name = %signal.name, "brand mismatch, candidate excluded");
            return Ok(None);
        }

        let product_id = signal.product_id.clone();
        let delivery = self.reconcile_and_notify(&signal).await?;

        Ok(Some(ProcessedCandidate {
            product_id,
            delivery,
        }))
    }

    /// Commit first, deliver after: the state transition is durable before
    /// any delivery attempt, and a failed delivery is only logged.
    async fn reconcile_and_notify(&self, signal: &ValidatedSignal) -> Result<Option<bool>> {
        let outcome = self.engine.reconcile(signal).await?;

        let Some(kind) = outcome.notification else {
            return Ok(None);
        };

        let alert = Alert {
            kind,
            product_name: outcome.record.name.clone(),
            price: outcome.record.price,
            url: outcome.record.url.clone(),
            detected_at: Utc::now(),
        };

        match self.notifier.send(&alert).await {
            Ok(true) => Ok(Some(true)),
            Ok(false) => {
                warn!(product = %alert.product_name, "notification was rejected by the channel");
                Ok(Some(false))
            }
            Err(e) => {
                error!(product = %alert.product_name, error = %e, "notification delivery failed");
                Ok(Some(false))
            }
        }
    }

    /// Re-validate known products that this pass's candidates did not
    /// cover. Products that validate are reconciled normally (a hidden
    /// product seen buyable again alerts as a restock); products that no
    /// longer validate go hidden. Returns (delivered, failed) counts.
    async fn sweep_missing(&self, seen_ids: &HashSet<String>) -> Result<(usize, usize)> {
        let known = self.store.all_products().await?;
        let missing: Vec<_> = known
            .into_iter()
            .filter(|record| !seen_ids.contains(&record.product_id))
            .collect();

        if missing.is_empty() {
            return Ok((0, 0));
        }

        debug!(count = missing.len(), "re-validating products missing from discovery");

        let mut delivered = 0;
        let mut failed = 0;

        for record in missing {
            match self.extractor.validate(&record.url).await {
                Some(signal) if signal.brand_verified => {
                    match self.reconcile_and_notify(&signal).await {
                        Ok(Some(true)) => delivered += 1,
                        Ok(Some(false)) => failed += 1,
                        Ok(None) => {}
                        Err(e) => {
                            warn!(
                                product_id = %record.product_id,
                                error = %e,
                                "failed to reconcile re-validated product"
                            );
                        }
                    }
                }
                Some(signal) => {
                    // The page answers but no longer verifies as the brand;
                    // leave the record alone rather than guessing.
                    debug!(
                        product_id = %record.product_id,
                        name = %signal.name,
                        "re-validated product no longer brand-verified"
                    );
                }
                None => {
                    if let Err(e) = self.engine.mark_hidden(&record).await {
                        warn!(
                            product_id = %record.product_id,
                            error = %e,
                            "failed to mark product hidden"
                        );
                    }
                }
            }

            self.pace().await;
        }

        Ok((delivered, failed))
    }

    async fn pace(&self) {
        if self.config.request_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.request_delay_ms)).await;
        }
    }
}

struct ProcessedCandidate {
    product_id: String,
    /// None: nothing to deliver. Some(true/false): delivery attempted.
    delivery: Option<bool>,
}
