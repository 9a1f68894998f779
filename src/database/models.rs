use anyhow::{anyhow, Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::{ArbitrageOpportunity, OpportunityStatus};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OpportunityRow {
    pub id: Uuid,
    pub event_id: String,
    pub sport: String,
    pub home_team: String,
    pub away_team: String,
    pub source_home: String,
    pub source_away: String,
    pub home_odds: f64,
    pub away_odds: f64,
    pub profit_percent: f64,
    pub home_stake: f64,
    pub away_stake: f64,
    pub total_stake: f64,
    pub expected_return: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: String,
    pub evict_at: DateTime<Utc>,
}

impl OpportunityRow {
    pub fn new(opportunity: &ArbitrageOpportunity, evict_at: DateTime<Utc>) -> Self {
        Self {
            id: opportunity.id,
            event_id: opportunity.event_id.clone(),
            sport: opportunity.sport.clone(),
            home_team: opportunity.home_team.clone(),
            away_team: opportunity.away_team.clone(),
            source_home: opportunity.source_home.clone(),
            source_away: opportunity.source_away.clone(),
            home_odds: opportunity.home_odds,
            away_odds: opportunity.away_odds,
            profit_percent: opportunity.profit_percent,
            home_stake: opportunity.home_stake,
            away_stake: opportunity.away_stake,
            total_stake: opportunity.total_stake,
            expected_return: opportunity.expected_return,
            created_at: opportunity.created_at,
            expires_at: opportunity.expires_at,
            status: status_label(opportunity.status).to_string(),
            evict_at,
        }
    }
}

fn status_label(status: OpportunityStatus) -> &'static str {
    match status {
        OpportunityStatus::Active => "active",
        OpportunityStatus::Expired => "expired",
    }
}

impl TryFrom<OpportunityRow> for ArbitrageOpportunity {
    type Error = Error;

    fn try_from(row: OpportunityRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "active" => OpportunityStatus::Active,
            "expired" => OpportunityStatus::Expired,
            other => return Err(anyhow!("Unknown opportunity status '{}' for {}", other, row.id)),
        };

        Ok(Self {
            id: row.id,
            event_id: row.event_id,
            sport: row.sport,
            home_team: row.home_team,
            away_team: row.away_team,
            source_home: row.source_home,
            source_away: row.source_away,
            home_odds: row.home_odds,
            away_odds: row.away_odds,
            profit_percent: row.profit_percent,
            home_stake: row.home_stake,
            away_stake: row.away_stake,
            total_stake: row.total_stake,
            expected_return: row.expected_return,
            created_at: row.created_at,
            expires_at: row.expires_at,
            status,
        })
    }
}
