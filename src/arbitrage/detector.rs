use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::{
    arbitrage::{format_odds, ArbitrageCalculator},
    cache::QuoteCache,
    config::DetectorConfig,
    error::QuoteError,
    service::EngineMetrics,
    source::decode_quote,
    types::{ArbitrageOpportunity, QuoteUpdate},
};

/// Ingests quotes, keeps the cache current and hands every detected
/// opportunity to the outbound queue.
///
/// Ingestion and purge both run inside the cache's exclusive section, so a
/// scan never observes a half-applied sweep. Outbound delivery is `try_send`
/// on a bounded queue: when it is full the opportunity is dropped and counted
/// rather than stalling ingestion.
pub struct DetectionEngine {
    cache: QuoteCache,
    calculator: ArbitrageCalculator,
    outbound: mpsc::Sender<ArbitrageOpportunity>,
    metrics: Arc<EngineMetrics>,
}

impl DetectionEngine {
    pub fn new(
        config: &DetectorConfig,
        outbound: mpsc::Sender<ArbitrageOpportunity>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            cache: QuoteCache::new(config.freshness_window(), config.purge_window()),
            calculator: ArbitrageCalculator::from_config(config),
            outbound,
            metrics,
        }
    }

    /// Decodes a wire payload and ingests it. Malformed payloads are counted,
    /// logged and never reach the cache.
    pub async fn ingest_payload(
        &self,
        payload: &[u8],
    ) -> Result<Vec<ArbitrageOpportunity>, QuoteError> {
        match decode_quote(payload) {
            Ok(quote) => Ok(self.ingest(quote).await),
            Err(e) => {
                self.metrics.record_rejected();
                warn!("Dropping inbound quote: {}", e);
                Err(e)
            }
        }
    }

    /// Stores the quote, compares it with every other fresh source on the same
    /// event and emits each accepted opportunity. Returns what was detected,
    /// whether or not the outbound queue accepted it.
    pub async fn ingest(&self, quote: QuoteUpdate) -> Vec<ArbitrageOpportunity> {
        self.metrics.record_ingested();
        debug!(
            "Quote from {} for {}: home={} away={}",
            quote.source, quote.event_id, quote.home_odds, quote.away_odds
        );

        let opportunities = {
            let mut section = self.cache.lock().await;
            section.upsert(quote.clone());

            let others = section.snapshot(&quote.event_id, &quote.source);
            self.metrics.record_comparisons(others.len() as u64);

            others
                .iter()
                .filter_map(|other| self.calculator.detect(&quote, other))
                .collect::<Vec<_>>()
        };

        for opportunity in &opportunities {
            self.metrics.record_detected();
            info!(
                "Arbitrage found: {} vs {} - home {} @ {:.2} ({}), away {} @ {:.2} ({}), \
                 profit {:.2}%",
                opportunity.home_team,
                opportunity.away_team,
                opportunity.source_home,
                opportunity.home_odds,
                format_odds(opportunity.home_odds),
                opportunity.source_away,
                opportunity.away_odds,
                format_odds(opportunity.away_odds),
                opportunity.profit_percent
            );
            self.emit(opportunity.clone());
        }

        opportunities
    }

    fn emit(&self, opportunity: ArbitrageOpportunity) {
        match self.outbound.try_send(opportunity) {
            Ok(()) => {}
            Err(TrySendError::Full(opportunity)) => {
                self.metrics.record_dropped();
                warn!(
                    "Outbound queue full, dropping opportunity {} ({} dropped so far)",
                    opportunity.id,
                    self.metrics.opportunities_dropped()
                );
            }
            Err(TrySendError::Closed(opportunity)) => {
                self.metrics.record_dropped();
                warn!("Outbound queue closed, dropping opportunity {}", opportunity.id);
            }
        }
    }

    /// Removes quotes past the purge window. Shares the exclusive section
    /// with `ingest`.
    pub async fn purge(&self) -> usize {
        let removed = self.cache.purge().await;
        self.metrics.record_purged(removed as u64);
        if removed > 0 {
            debug!("Purged {} stale quotes from cache", removed);
        }
        removed
    }

    /// Latest cached quote from every source for the event.
    pub async fn latest_quotes(&self, event_id: &str) -> Vec<QuoteUpdate> {
        self.cache.latest_quotes(event_id).await
    }

    pub async fn cached_quotes(&self) -> usize {
        self.cache.len().await
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }
}
