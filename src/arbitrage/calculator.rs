use chrono::{Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::DetectorConfig,
    types::{ArbitrageOpportunity, OpportunityStatus, QuoteUpdate},
};

/// Pure two-way arbitrage check between two quotes on the same event.
#[derive(Debug, Clone)]
pub struct ArbitrageCalculator {
    min_profit_threshold: f64,
    total_stake: f64,
    horizon: Duration,
}

struct Leg<'a> {
    home_odds: f64,
    away_odds: f64,
    home_source: &'a str,
    away_source: &'a str,
}

impl ArbitrageCalculator {
    pub fn new(min_profit_threshold: f64, total_stake: f64, horizon: Duration) -> Self {
        Self {
            min_profit_threshold,
            total_stake,
            horizon,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(
            config.min_profit_threshold,
            config.total_stake,
            config.opportunity_horizon(),
        )
    }

    pub fn min_profit_threshold(&self) -> f64 {
        self.min_profit_threshold
    }

    /// Best home and away price across both books, including each book's own
    /// pair. Returns `None` for different events, degenerate odds, an
    /// efficiently priced market or a profit under the threshold.
    pub fn detect(&self, a: &QuoteUpdate, b: &QuoteUpdate) -> Option<ArbitrageOpportunity> {
        if a.event_id != b.event_id {
            return None;
        }

        let candidates = [
            Leg {
                home_odds: a.home_odds,
                away_odds: b.away_odds,
                home_source: &a.source,
                away_source: &b.source,
            },
            Leg {
                home_odds: b.home_odds,
                away_odds: a.away_odds,
                home_source: &b.source,
                away_source: &a.source,
            },
            Leg {
                home_odds: a.home_odds,
                away_odds: a.away_odds,
                home_source: &a.source,
                away_source: &a.source,
            },
            Leg {
                home_odds: b.home_odds,
                away_odds: b.away_odds,
                home_source: &b.source,
                away_source: &b.source,
            },
        ];

        // Strict comparison: on ties the earlier candidate keeps the leg.
        let mut best_home = (0.0_f64, "");
        let mut best_away = (0.0_f64, "");
        for leg in &candidates {
            if leg.home_odds > best_home.0 {
                best_home = (leg.home_odds, leg.home_source);
            }
            if leg.away_odds > best_away.0 {
                best_away = (leg.away_odds, leg.away_source);
            }
        }

        let (home_odds, source_home) = best_home;
        let (away_odds, source_away) = best_away;
        if !is_valid_odds(home_odds) || !is_valid_odds(away_odds) {
            debug!(
                "Skipping degenerate odds for {}: home={} away={}",
                a.event_id, home_odds, away_odds
            );
            return None;
        }

        let implied_home = 1.0 / home_odds;
        let implied_away = 1.0 / away_odds;
        let total_implied = implied_home + implied_away;
        if total_implied >= 1.0 {
            return None;
        }

        let profit_percent = (1.0 / total_implied - 1.0) * 100.0;
        if profit_percent < self.min_profit_threshold {
            debug!(
                "Arbitrage on {} below threshold: {:.3}% < {:.3}%",
                a.event_id, profit_percent, self.min_profit_threshold
            );
            return None;
        }

        let total_stake = self.total_stake;
        let home_stake = total_stake * implied_home / total_implied;
        let away_stake = total_stake * implied_away / total_implied;
        let expected_return = total_stake * (1.0 + profit_percent / 100.0);
        let created_at = Utc::now();

        Some(ArbitrageOpportunity {
            id: Uuid::new_v4(),
            event_id: a.event_id.clone(),
            sport: a.sport.clone(),
            home_team: a.home_team.clone(),
            away_team: a.away_team.clone(),
            source_home: source_home.to_string(),
            source_away: source_away.to_string(),
            home_odds,
            away_odds,
            profit_percent,
            home_stake,
            away_stake,
            total_stake,
            expected_return,
            created_at,
            expires_at: created_at + self.horizon,
            status: OpportunityStatus::Active,
        })
    }
}

/// Three-outcome check for markets with a draw. The caller has already picked
/// the best price per outcome. Returns whether arbitrage exists and its profit
/// in percent.
pub fn calculate_three_way(home_odds: f64, draw_odds: f64, away_odds: f64) -> (bool, f64) {
    if ![home_odds, draw_odds, away_odds].into_iter().all(is_valid_odds) {
        return (false, 0.0);
    }

    let total_implied = 1.0 / home_odds + 1.0 / draw_odds + 1.0 / away_odds;
    if total_implied < 1.0 {
        (true, (1.0 / total_implied - 1.0) * 100.0)
    } else {
        (false, 0.0)
    }
}

/// Decimal odds in American moneyline notation, e.g. 2.50 -> "+150",
/// 1.50 -> "-200".
pub fn format_odds(decimal: f64) -> String {
    if !is_valid_odds(decimal) {
        return "N/A".to_string();
    }

    if decimal >= 2.0 {
        format!("+{:.0}", (decimal - 1.0) * 100.0)
    } else {
        format!("{:.0}", -100.0 / (decimal - 1.0))
    }
}

fn is_valid_odds(odds: f64) -> bool {
    odds.is_finite() && odds > 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarketType;

    const TOLERANCE: f64 = 1e-9;

    fn create_test_calculator() -> ArbitrageCalculator {
        ArbitrageCalculator::from_config(&DetectorConfig::default())
    }

    fn create_test_quote(source: &str, home_odds: f64, away_odds: f64) -> QuoteUpdate {
        QuoteUpdate {
            id: format!("quote-{}", source),
            event_id: "lakers-vs-celtics".to_string(),
            sport: "NBA".to_string(),
            home_team: "Lakers".to_string(),
            away_team: "Celtics".to_string(),
            source: source.to_string(),
            home_odds,
            away_odds,
            draw_odds: None,
            market_type: MarketType::Moneyline,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_detect_cross_book_arbitrage() {
        let calculator = create_test_calculator();
        let x = create_test_quote("draftkings", 2.10, 2.05);
        let y = create_test_quote("fanduel", 1.95, 2.20);

        let opp = calculator.detect(&x, &y).expect("opportunity");

        assert_eq!(opp.home_odds, 2.10);
        assert_eq!(opp.source_home, "draftkings");
        assert_eq!(opp.away_odds, 2.20);
        assert_eq!(opp.source_away, "fanduel");

        let total_implied: f64 = 1.0 / 2.10 + 1.0 / 2.20;
        assert!((total_implied - 0.930736).abs() < 1e-6);
        assert!((opp.profit_percent - 7.4419).abs() < 1e-3);
        assert!((opp.home_stake - 511.63).abs() < 0.01);
        assert!((opp.away_stake - 488.37).abs() < 0.01);
        assert!((opp.home_stake + opp.away_stake - opp.total_stake).abs() < TOLERANCE);
        assert_eq!(opp.total_stake, 1000.0);
        assert!((opp.expected_return - 1074.42).abs() < 0.01);
        assert!(opp.expires_at > opp.created_at);
        assert_eq!(opp.expires_at - opp.created_at, Duration::minutes(5));
        assert_eq!(opp.status, OpportunityStatus::Active);
        assert_eq!(opp.home_team, "Lakers");
    }

    #[test]
    fn test_efficient_market_has_no_opportunity() {
        let calculator = create_test_calculator();
        let x = create_test_quote("draftkings", 1.90, 1.90);
        let y = create_test_quote("fanduel", 1.90, 1.90);

        assert!(calculator.detect(&x, &y).is_none());
    }

    #[test]
    fn test_swapping_inputs_keeps_prices_and_profit() {
        let calculator = create_test_calculator();
        let x = create_test_quote("draftkings", 2.10, 2.05);
        let y = create_test_quote("fanduel", 1.95, 2.20);

        let forward = calculator.detect(&x, &y).unwrap();
        let backward = calculator.detect(&y, &x).unwrap();

        assert_eq!(forward.home_odds, backward.home_odds);
        assert_eq!(forward.away_odds, backward.away_odds);
        assert_eq!(forward.profit_percent, backward.profit_percent);
        assert_eq!(forward.home_stake, backward.home_stake);
        assert_ne!(forward.id, backward.id);
    }

    #[test]
    fn test_different_events_never_combine() {
        let calculator = create_test_calculator();
        let x = create_test_quote("draftkings", 3.0, 1.5);
        let mut y = create_test_quote("fanduel", 1.5, 3.0);
        y.event_id = "heat-vs-bucks".to_string();

        assert!(calculator.detect(&x, &y).is_none());
    }

    #[test]
    fn test_threshold_filters_thin_margins() {
        // Total implied ~0.9976, profit ~0.24%.
        let x = create_test_quote("draftkings", 2.02, 1.90);
        let y = create_test_quote("fanduel", 1.90, 1.99);

        assert!(create_test_calculator().detect(&x, &y).is_none());

        let permissive = ArbitrageCalculator::new(0.1, 1000.0, Duration::minutes(5));
        let opp = permissive.detect(&x, &y).unwrap();
        assert!(opp.profit_percent >= 0.1 && opp.profit_percent < 0.5);
    }

    #[test]
    fn test_degenerate_odds_rejected() {
        let calculator = create_test_calculator();
        let x = create_test_quote("draftkings", 1.0, 0.5);
        let y = create_test_quote("fanduel", 0.9, 1.0);
        assert!(calculator.detect(&x, &y).is_none());

        let x = create_test_quote("draftkings", f64::NAN, 2.0);
        let y = create_test_quote("fanduel", f64::NAN, 2.0);
        assert!(calculator.detect(&x, &y).is_none());
    }

    #[test]
    fn test_single_book_pair_can_win_both_legs() {
        let calculator = create_test_calculator();
        let x = create_test_quote("draftkings", 2.20, 2.20);
        let y = create_test_quote("fanduel", 1.80, 1.80);

        let opp = calculator.detect(&x, &y).unwrap();
        assert_eq!(opp.source_home, "draftkings");
        assert_eq!(opp.source_away, "draftkings");
        assert!((opp.profit_percent - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_ties_keep_first_candidate() {
        let calculator = create_test_calculator();
        let x = create_test_quote("draftkings", 2.20, 2.20);
        let y = create_test_quote("fanduel", 2.20, 2.20);

        let opp = calculator.detect(&x, &y).unwrap();
        assert_eq!(opp.source_home, "draftkings");
        assert_eq!(opp.source_away, "fanduel");
    }

    #[test]
    fn test_calculate_three_way() {
        let (exists, profit) = calculate_three_way(3.2, 3.6, 3.4);
        assert!(exists);
        let total = 1.0 / 3.2 + 1.0 / 3.6 + 1.0 / 3.4;
        assert!((profit - (1.0 / total - 1.0) * 100.0).abs() < TOLERANCE);

        assert_eq!(calculate_three_way(2.5, 3.2, 2.8), (false, 0.0));
        assert_eq!(calculate_three_way(1.0, 5.0, 5.0), (false, 0.0));
    }

    #[test]
    fn test_format_odds() {
        assert_eq!(format_odds(2.50), "+150");
        assert_eq!(format_odds(1.50), "-200");
        assert_eq!(format_odds(2.0), "+100");
        assert_eq!(format_odds(1.25), "-400");
        assert_eq!(format_odds(1.0), "N/A");
    }
}
