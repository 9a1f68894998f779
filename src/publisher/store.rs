use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::ArbitrageOpportunity;

/// Keyed storage for detected opportunities plus the shared index of ids that
/// are still active. Expiry on the store side may lag wall-clock expiry.
#[async_trait]
pub trait OpportunityStore: Send + Sync {
    /// Stores the record under its id and adds the id to the active index,
    /// both expiring after `ttl`.
    async fn save(&self, opportunity: &ArbitrageOpportunity, ttl: Duration) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<ArbitrageOpportunity>>;

    async fn active_ids(&self) -> Result<Vec<Uuid>>;

    /// Evicts records and index entries whose ttl has elapsed.
    async fn purge_expired(&self) -> Result<u64>;
}

struct StoredOpportunity {
    opportunity: ArbitrageOpportunity,
    evict_at: DateTime<Utc>,
}

/// Process-local store. Eviction only happens on `purge_expired`, so readers
/// see the same lag a TTL-based store would show.
#[derive(Default)]
pub struct MemoryOpportunityStore {
    records: RwLock<HashMap<Uuid, StoredOpportunity>>,
    active_index: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl MemoryOpportunityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OpportunityStore for MemoryOpportunityStore {
    async fn save(&self, opportunity: &ArbitrageOpportunity, ttl: Duration) -> Result<()> {
        let evict_at = Utc::now() + ttl;

        self.records.write().await.insert(
            opportunity.id,
            StoredOpportunity {
                opportunity: opportunity.clone(),
                evict_at,
            },
        );
        self.active_index.write().await.insert(opportunity.id, evict_at);

        debug!("Stored opportunity {} until {}", opportunity.id, evict_at);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ArbitrageOpportunity>> {
        Ok(self
            .records
            .read()
            .await
            .get(&id)
            .map(|stored| stored.opportunity.clone()))
    }

    async fn active_ids(&self) -> Result<Vec<Uuid>> {
        Ok(self.active_index.read().await.keys().copied().collect())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();

        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, stored| stored.evict_at > now);
        let removed = (before - records.len()) as u64;
        drop(records);

        self.active_index
            .write()
            .await
            .retain(|_, evict_at| *evict_at > now);

        Ok(removed)
    }
}

/// Active opportunities as a reader sees them at `now`: every id in the
/// active index whose record still exists and has not passed `expires_at`,
/// newest first. A failed lookup skips that id only.
pub async fn active_opportunities(
    store: &dyn OpportunityStore,
    now: DateTime<Utc>,
) -> Result<Vec<ArbitrageOpportunity>> {
    let mut opportunities = Vec::new();

    for id in store.active_ids().await? {
        match store.get(id).await {
            Ok(Some(opportunity)) if opportunity.is_active_at(now) => {
                opportunities.push(opportunity)
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to load opportunity {}: {}", id, e),
        }
    }

    opportunities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(opportunities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpportunityStatus;

    fn create_test_opportunity(
        created_ago_seconds: i64,
        horizon_seconds: i64,
    ) -> ArbitrageOpportunity {
        let created_at = Utc::now() - Duration::seconds(created_ago_seconds);
        ArbitrageOpportunity {
            id: Uuid::new_v4(),
            event_id: "suns-vs-nuggets".to_string(),
            sport: "NBA".to_string(),
            home_team: "Suns".to_string(),
            away_team: "Nuggets".to_string(),
            source_home: "betmgm".to_string(),
            source_away: "caesars".to_string(),
            home_odds: 2.3,
            away_odds: 2.0,
            profit_percent: 6.98,
            home_stake: 465.12,
            away_stake: 534.88,
            total_stake: 1000.0,
            expected_return: 1069.8,
            created_at,
            expires_at: created_at + Duration::seconds(horizon_seconds),
            status: OpportunityStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = MemoryOpportunityStore::new();
        let opportunity = create_test_opportunity(0, 300);

        store.save(&opportunity, Duration::minutes(5)).await.unwrap();

        assert_eq!(store.get(opportunity.id).await.unwrap(), Some(opportunity.clone()));
        assert_eq!(store.active_ids().await.unwrap(), vec![opportunity.id]);
        assert_eq!(store.get(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_revalidates_expiry_before_store_evicts() {
        let store = MemoryOpportunityStore::new();
        let live = create_test_opportunity(10, 300);
        let lapsed = create_test_opportunity(400, 300);

        // Saved with a long ttl so the store still holds the lapsed record.
        store.save(&live, Duration::minutes(5)).await.unwrap();
        store.save(&lapsed, Duration::minutes(5)).await.unwrap();

        let active = active_opportunities(&store, Utc::now()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, live.id);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_purge_expired_evicts_record_and_index() {
        let store = MemoryOpportunityStore::new();
        let stale = create_test_opportunity(0, 300);
        let fresh = create_test_opportunity(0, 300);

        store.save(&stale, Duration::seconds(-1)).await.unwrap();
        store.save(&fresh, Duration::minutes(5)).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.get(stale.id).await.unwrap(), None);
        assert_eq!(store.active_ids().await.unwrap(), vec![fresh.id]);
    }

    #[tokio::test]
    async fn test_active_sorted_newest_first() {
        let store = MemoryOpportunityStore::new();
        let older = create_test_opportunity(60, 300);
        let newer = create_test_opportunity(5, 300);
        store.save(&older, Duration::minutes(5)).await.unwrap();
        store.save(&newer, Duration::minutes(5)).await.unwrap();

        let active = active_opportunities(&store, Utc::now()).await.unwrap();
        let ids: Vec<Uuid> = active.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }
}
