use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{collections::VecDeque, time::Duration};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::debug;
use uuid::Uuid;

use super::QuoteSource;
use crate::{
    config::MAX_WINDOW_SECONDS,
    types::{MarketType, QuoteUpdate},
};

const SLATE: [(&str, &str, &str); 6] = [
    ("NBA", "Lakers", "Celtics"),
    ("NBA", "Warriors", "Nets"),
    ("NBA", "Heat", "Bucks"),
    ("NBA", "Suns", "Nuggets"),
    ("NFL", "Chiefs", "Bills"),
    ("NFL", "Eagles", "Cowboys"),
];

/// Simulated moneyline feed: every tick each sportsbook reprices the whole
/// slate around a random base with a book-specific skew.
pub struct SimulatedSource {
    sportsbooks: Vec<String>,
    ticker: Interval,
    pending: VecDeque<Vec<u8>>,
    rng: StdRng,
}

impl SimulatedSource {
    pub fn new(sportsbooks: Vec<String>, interval_seconds: u64) -> Self {
        Self::with_rng(sportsbooks, interval_seconds, StdRng::from_entropy())
    }

    pub fn with_seed(sportsbooks: Vec<String>, interval_seconds: u64, seed: u64) -> Self {
        Self::with_rng(sportsbooks, interval_seconds, StdRng::seed_from_u64(seed))
    }

    fn with_rng(sportsbooks: Vec<String>, interval_seconds: u64, rng: StdRng) -> Self {
        let period = Duration::from_secs(interval_seconds.clamp(1, MAX_WINDOW_SECONDS));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            sportsbooks,
            ticker,
            pending: VecDeque::new(),
            rng,
        }
    }

    fn book_variation(sportsbook: &str) -> f64 {
        match sportsbook {
            "draftkings" => 0.02,
            "fanduel" => -0.03,
            "betmgm" => 0.05,
            "caesars" => -0.02,
            "pointsbet" => 0.03,
            _ => 0.0,
        }
    }

    fn simulate_round(&mut self) -> Vec<QuoteUpdate> {
        let mut quotes = Vec::with_capacity(self.sportsbooks.len() * SLATE.len());

        for sportsbook in &self.sportsbooks {
            let variation = Self::book_variation(sportsbook);
            for (sport, home, away) in SLATE {
                let base_home = 1.8 + self.rng.gen::<f64>() * 0.6;
                let base_away = 1.8 + self.rng.gen::<f64>() * 0.6;

                quotes.push(QuoteUpdate {
                    id: Uuid::new_v4().to_string(),
                    event_id: format!("{}-vs-{}", home.to_lowercase(), away.to_lowercase()),
                    sport: sport.to_string(),
                    home_team: home.to_string(),
                    away_team: away.to_string(),
                    source: sportsbook.clone(),
                    home_odds: round_odds(base_home + variation),
                    away_odds: round_odds(base_away - variation),
                    draw_odds: None,
                    market_type: MarketType::Moneyline,
                    observed_at: Utc::now(),
                });
            }
        }

        quotes
    }
}

fn round_odds(odds: f64) -> f64 {
    (odds * 100.0).round() / 100.0
}

#[async_trait]
impl QuoteSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn next_payload(&mut self) -> Result<Option<Vec<u8>>> {
        if self.pending.is_empty() {
            self.ticker.tick().await;
            for quote in self.simulate_round() {
                let payload = serde_json::to_vec(&quote)
                    .map_err(|e| anyhow!("Failed to encode simulated quote: {}", e))?;
                self.pending.push_back(payload);
            }
            debug!(
                "Simulated {} quotes across {} sportsbooks",
                self.pending.len(),
                self.sportsbooks.len()
            );
        }

        Ok(self.pending.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::decode_quote;

    fn create_test_source() -> SimulatedSource {
        SimulatedSource::with_seed(vec!["draftkings".to_string(), "fanduel".to_string()], 1, 7)
    }

    #[tokio::test]
    async fn test_round_covers_every_book_and_game() {
        let mut source = create_test_source();

        let mut quotes = Vec::new();
        for _ in 0..(2 * SLATE.len()) {
            let payload = source.next_payload().await.unwrap().unwrap();
            quotes.push(decode_quote(&payload).unwrap());
        }

        assert!(source.pending.is_empty());
        assert_eq!(quotes.iter().filter(|q| q.source == "draftkings").count(), SLATE.len());
        assert!(quotes.iter().any(|q| q.event_id == "lakers-vs-celtics"));
        assert!(quotes.iter().any(|q| q.event_id == "eagles-vs-cowboys" && q.sport == "NFL"));
    }

    #[tokio::test]
    async fn test_odds_stay_in_simulated_band() {
        let mut source = SimulatedSource::with_seed(
            vec!["betmgm".to_string(), "fanduel".to_string(), "unknown".to_string()],
            1,
            42,
        );
        for quote in source.simulate_round() {
            assert!(quote.home_odds >= 1.75 && quote.home_odds <= 2.45, "{}", quote.home_odds);
            assert!(quote.away_odds >= 1.75 && quote.away_odds <= 2.45, "{}", quote.away_odds);
        }
    }
}
