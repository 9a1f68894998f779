use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    #[default]
    Moneyline,
    Spread,
    Total,
}

/// Latest price a single sportsbook offers on a two-outcome event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteUpdate {
    #[serde(default)]
    pub id: String,
    pub event_id: String,
    #[serde(default)]
    pub sport: String,
    #[serde(default)]
    pub home_team: String,
    #[serde(default)]
    pub away_team: String,
    #[serde(rename = "bookmaker", alias = "source")]
    pub source: String,
    pub home_odds: f64,
    pub away_odds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_odds: Option<f64>,
    #[serde(default)]
    pub market_type: MarketType,
    #[serde(rename = "timestamp", alias = "observed_at")]
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    Active,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub id: Uuid,
    pub event_id: String,
    pub sport: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(rename = "bookmaker_home")]
    pub source_home: String,
    #[serde(rename = "bookmaker_away")]
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
    pub status: OpportunityStatus,
}

/// Stake split for an arbitrary bankroll on an existing opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StakePlan {
    pub bankroll: f64,
    pub home_stake: f64,
    pub away_stake: f64,
    pub expected_return: f64,
    pub profit: f64,
}

impl ArbitrageOpportunity {
    /// Status as seen by a reader at `now`. The stored status never changes.
    pub fn status_at(&self, now: DateTime<Utc>) -> OpportunityStatus {
        if now < self.expires_at {
            OpportunityStatus::Active
        } else {
            OpportunityStatus::Expired
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == OpportunityStatus::Active
    }

    pub fn stake_plan(&self, bankroll: f64) -> StakePlan {
        let implied_home = 1.0 / self.home_odds;
        let implied_away = 1.0 / self.away_odds;
        let total_implied = implied_home + implied_away;

        let home_stake = bankroll * implied_home / total_implied;
        let away_stake = bankroll * implied_away / total_implied;
        let expected_return = bankroll * (1.0 + self.profit_percent / 100.0);

        StakePlan {
            bankroll,
            home_stake,
            away_stake,
            expected_return,
            profit: expected_return - bankroll,
        }
    }
}

/// Envelope pushed to real-time subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: ArbitrageOpportunity,
    pub timestamp: DateTime<Utc>,
}

impl StreamMessage {
    pub fn arbitrage(opportunity: ArbitrageOpportunity) -> Self {
        Self {
            kind: "arbitrage",
            data: opportunity,
            timestamp: Utc::now(),
        }
    }
}
