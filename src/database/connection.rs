use anyhow::{anyhow, Result};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database: {}", mask_database_url(&config.url));

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.url)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        let connection = Self { pool };
        connection.health_check().await?;

        info!("Successfully connected to database");
        Ok(connection)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let row = sqlx::query("SELECT 1 as test")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        let test_value: i32 = row.try_get("test")?;
        if test_value != 1 {
            return Err(anyhow!("Database health check returned unexpected value"));
        }

        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS arbitrage_opportunities (
                id UUID PRIMARY KEY,
                event_id VARCHAR(128) NOT NULL,
                sport VARCHAR(32) NOT NULL,
                home_team VARCHAR(128) NOT NULL,
                away_team VARCHAR(128) NOT NULL,
                source_home VARCHAR(64) NOT NULL,
                source_away VARCHAR(64) NOT NULL,
                home_odds DOUBLE PRECISION NOT NULL,
                away_odds DOUBLE PRECISION NOT NULL,
                profit_percent DOUBLE PRECISION NOT NULL,
                home_stake DOUBLE PRECISION NOT NULL,
                away_stake DOUBLE PRECISION NOT NULL,
                total_stake DOUBLE PRECISION NOT NULL,
                expected_return DOUBLE PRECISION NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                expires_at TIMESTAMP WITH TIME ZONE NOT NULL,
                status VARCHAR(16) NOT NULL,
                evict_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to create arbitrage_opportunities table: {}", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS active_opportunities (
                id UUID PRIMARY KEY,
                evict_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to create active_opportunities table: {}", e))?;

        let indexes = [
            (
                "idx_arbitrage_opportunities_evict_at",
                "CREATE INDEX IF NOT EXISTS idx_arbitrage_opportunities_evict_at \
                 ON arbitrage_opportunities(evict_at)",
            ),
            (
                "idx_arbitrage_opportunities_event",
                "CREATE INDEX IF NOT EXISTS idx_arbitrage_opportunities_event \
                 ON arbitrage_opportunities(event_id)",
            ),
            (
                "idx_active_opportunities_evict_at",
                "CREATE INDEX IF NOT EXISTS idx_active_opportunities_evict_at \
                 ON active_opportunities(evict_at)",
            ),
        ];
        for (name, statement) in indexes {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| anyhow!("Failed to create index {}: {}", name, e))?;
        }

        info!("Database migrations completed successfully");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }
}

fn mask_database_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "****");
            return masked;
        }
    }
    url.to_string()
}
