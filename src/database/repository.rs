use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    database::models::OpportunityRow,
    publisher::OpportunityStore,
    types::ArbitrageOpportunity,
};

/// Postgres-backed store. Expired rows linger until `purge_expired` runs,
/// which readers tolerate by re-checking `expires_at`.
pub struct PgOpportunityStore {
    pool: PgPool,
}

impl PgOpportunityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OpportunityStore for PgOpportunityStore {
    async fn save(&self, opportunity: &ArbitrageOpportunity, ttl: Duration) -> Result<()> {
        let row = OpportunityRow::new(opportunity, Utc::now() + ttl);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| anyhow!("Failed to open transaction: {}", e))?;

        sqlx::query(
            r#"
            INSERT INTO arbitrage_opportunities (
                id, event_id, sport, home_team, away_team, source_home, source_away,
                home_odds, away_odds, profit_percent, home_stake, away_stake,
                total_stake, expected_return, created_at, expires_at, status, evict_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9,
                $10, $11, $12, $13, $14, $15, $16, $17, $18
            )
            ON CONFLICT (id) DO UPDATE SET evict_at = EXCLUDED.evict_at
            "#,
        )
        .bind(row.id)
        .bind(&row.event_id)
        .bind(&row.sport)
        .bind(&row.home_team)
        .bind(&row.away_team)
        .bind(&row.source_home)
        .bind(&row.source_away)
        .bind(row.home_odds)
        .bind(row.away_odds)
        .bind(row.profit_percent)
        .bind(row.home_stake)
        .bind(row.away_stake)
        .bind(row.total_stake)
        .bind(row.expected_return)
        .bind(row.created_at)
        .bind(row.expires_at)
        .bind(&row.status)
        .bind(row.evict_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow!("Failed to save arbitrage opportunity: {}", e))?;

        sqlx::query(
            r#"
            INSERT INTO active_opportunities (id, evict_at) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET evict_at = EXCLUDED.evict_at
            "#,
        )
        .bind(row.id)
        .bind(row.evict_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow!("Failed to index active opportunity: {}", e))?;

        tx.commit()
            .await
            .map_err(|e| anyhow!("Failed to commit opportunity {}: {}", row.id, e))?;

        debug!("Saved arbitrage opportunity: {}", opportunity.id);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ArbitrageOpportunity>> {
        let row = sqlx::query_as::<_, OpportunityRow>(
            "SELECT * FROM arbitrage_opportunities WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to fetch opportunity {}: {}", id, e))?;

        row.map(ArbitrageOpportunity::try_from).transpose()
    }

    async fn active_ids(&self) -> Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT id FROM active_opportunities")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!("Failed to scan active opportunities: {}", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<Uuid, _>("id")
                    .map_err(|e| anyhow!("Bad active index row: {}", e))
            })
            .collect()
    }

    async fn purge_expired(&self) -> Result<u64> {
        let opportunities_deleted =
            sqlx::query("DELETE FROM arbitrage_opportunities WHERE evict_at <= NOW()")
                .execute(&self.pool)
                .await
                .map_err(|e| anyhow!("Failed to purge expired opportunities: {}", e))?
                .rows_affected();

        let index_deleted = sqlx::query("DELETE FROM active_opportunities WHERE evict_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!("Failed to purge active index: {}", e))?
            .rows_affected();

        if opportunities_deleted > 0 || index_deleted > 0 {
            info!(
                "Purged {} expired opportunities and {} index entries",
                opportunities_deleted, index_deleted
            );
        }

        Ok(opportunities_deleted)
    }
}
