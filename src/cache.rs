//! Rolling cache of the latest quote each sportsbook has published per event.
//!
//! All access goes through [`CacheSection`], a guard over the single mutex that
//! protects the map. Holding a section is the exclusive section shared by
//! ingestion and purge: the engine keeps one open across upsert and scan, and
//! the cleanup timer opens one for the sweep.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::types::QuoteUpdate;

type SourceMap = HashMap<String, CacheEntry>;

#[derive(Debug, Clone)]
struct CacheEntry {
    quote: QuoteUpdate,
    last_updated: DateTime<Utc>,
}

impl CacheEntry {
    /// Measured from the observation time, but never from later than the
    /// moment the entry was written, so a source clock running ahead cannot
    /// keep a price in play.
    fn age(&self, now: DateTime<Utc>) -> Duration {
        let since = self.quote.observed_at.min(self.last_updated);
        now.signed_duration_since(since)
    }
}

pub struct QuoteCache {
    events: Mutex<HashMap<String, SourceMap>>,
    freshness_window: Duration,
    purge_window: Duration,
}

pub struct CacheSection<'a> {
    events: MutexGuard<'a, HashMap<String, SourceMap>>,
    freshness_window: Duration,
    purge_window: Duration,
}

impl QuoteCache {
    pub fn new(freshness_window: Duration, purge_window: Duration) -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
            freshness_window,
            purge_window,
        }
    }

    /// Waits for the exclusive section.
    pub async fn lock(&self) -> CacheSection<'_> {
        CacheSection {
            events: self.events.lock().await,
            freshness_window: self.freshness_window,
            purge_window: self.purge_window,
        }
    }

    pub async fn upsert(&self, quote: QuoteUpdate) {
        self.lock().await.upsert(quote);
    }

    pub async fn snapshot(&self, event_id: &str, exclude_source: &str) -> Vec<QuoteUpdate> {
        self.lock().await.snapshot(event_id, exclude_source)
    }

    pub async fn purge(&self) -> usize {
        self.lock().await.purge()
    }

    pub async fn latest_quotes(&self, event_id: &str) -> Vec<QuoteUpdate> {
        self.lock().await.latest_quotes(event_id)
    }

    pub async fn len(&self) -> usize {
        self.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl CacheSection<'_> {
    /// Last write wins for `(event_id, source)`. Returns true when an older
    /// quote was replaced.
    pub fn upsert(&mut self, quote: QuoteUpdate) -> bool {
        let entry = CacheEntry {
            last_updated: Utc::now(),
            quote,
        };
        self.events
            .entry(entry.quote.event_id.clone())
            .or_default()
            .insert(entry.quote.source.clone(), entry)
            .is_some()
    }

    pub fn snapshot(&self, event_id: &str, exclude_source: &str) -> Vec<QuoteUpdate> {
        self.snapshot_at(event_id, exclude_source, Utc::now())
    }

    /// Fresh quotes for `event_id` from every source except `exclude_source`,
    /// ordered by source name.
    pub fn snapshot_at(
        &self,
        event_id: &str,
        exclude_source: &str,
        now: DateTime<Utc>,
    ) -> Vec<QuoteUpdate> {
        let Some(sources) = self.events.get(event_id) else {
            return Vec::new();
        };

        let mut fresh: Vec<QuoteUpdate> = sources
            .iter()
            .filter(|(source, _)| source.as_str() != exclude_source)
            .filter(|(_, entry)| entry.age(now) <= self.freshness_window)
            .map(|(_, entry)| entry.quote.clone())
            .collect();
        fresh.sort_by(|a, b| a.source.cmp(&b.source));
        fresh
    }

    pub fn purge(&mut self) -> usize {
        self.purge_at(Utc::now())
    }

    /// Drops entries older than the purge window and forgets events left
    /// without sources. Returns how many entries were removed.
    pub fn purge_at(&mut self, now: DateTime<Utc>) -> usize {
        let purge_window = self.purge_window;
        let mut removed = 0;

        self.events.retain(|event_id, sources| {
            let before = sources.len();
            sources.retain(|_, entry| entry.age(now) <= purge_window);
            let dropped = before - sources.len();
            if dropped > 0 {
                debug!("Purged {} stale quotes for event {}", dropped, event_id);
            }
            removed += dropped;
            !sources.is_empty()
        });

        removed
    }

    /// Every cached quote for the event regardless of age, ordered by source.
    pub fn latest_quotes(&self, event_id: &str) -> Vec<QuoteUpdate> {
        let mut quotes: Vec<QuoteUpdate> = self
            .events
            .get(event_id)
            .map(|sources| sources.values().map(|entry| entry.quote.clone()).collect())
            .unwrap_or_default();
        quotes.sort_by(|a, b| a.source.cmp(&b.source));
        quotes
    }

    /// When the engine last wrote the entry, as opposed to when the source
    /// observed the price.
    pub fn last_updated(&self, event_id: &str, source: &str) -> Option<DateTime<Utc>> {
        self.events
            .get(event_id)
            .and_then(|sources| sources.get(source))
            .map(|entry| entry.last_updated)
    }

    pub fn len(&self) -> usize {
        self.events.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}
