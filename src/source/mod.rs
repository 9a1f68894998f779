pub mod simulated;
pub mod stream;

pub use simulated::SimulatedSource;
pub use stream::JsonLinesSource;

use anyhow::Result;
use async_trait::async_trait;

use crate::{error::QuoteError, types::QuoteUpdate};

/// Producer of raw quote payloads. Sources make no ordering promise across
/// sportsbooks.
#[async_trait]
pub trait QuoteSource: Send {
    fn name(&self) -> &str;

    /// Next JSON payload, or `None` once the stream is exhausted.
    async fn next_payload(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Decodes and validates one wire payload.
pub fn decode_quote(payload: &[u8]) -> Result<QuoteUpdate, QuoteError> {
    let mut quote: QuoteUpdate = serde_json::from_slice(payload)?;

    if quote.event_id.trim().is_empty() {
        return Err(QuoteError::MissingField("event_id"));
    }
    if quote.source.trim().is_empty() {
        return Err(QuoteError::MissingField("bookmaker"));
    }

    check_odds("home_odds", quote.home_odds)?;
    check_odds("away_odds", quote.away_odds)?;

    // Feeds without a draw market send 0 instead of omitting the field.
    if quote.draw_odds == Some(0.0) {
        quote.draw_odds = None;
    }
    if let Some(draw_odds) = quote.draw_odds {
        check_odds("draw_odds", draw_odds)?;
    }

    Ok(quote)
}

fn check_odds(field: &'static str, value: f64) -> Result<(), QuoteError> {
    if value.is_finite() && value > 1.0 {
        Ok(())
    } else {
        Err(QuoteError::InvalidOdds { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_payload(home_odds: f64, draw_odds: f64) -> Vec<u8> {
        serde_json::json!({
            "id": "q-1",
            "event_id": "chiefs-vs-bills",
            "sport": "NFL",
            "home_team": "Chiefs",
            "away_team": "Bills",
            "bookmaker": "caesars",
            "home_odds": home_odds,
            "away_odds": 2.05,
            "draw_odds": draw_odds,
            "market_type": "moneyline",
            "timestamp": "2024-03-01T19:00:00Z"
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_decode_valid_quote() {
        let quote = decode_quote(&create_test_payload(1.85, 0.0)).unwrap();
        assert_eq!(quote.event_id, "chiefs-vs-bills");
        assert_eq!(quote.source, "caesars");
        assert_eq!(quote.draw_odds, None);
    }

    #[test]
    fn test_decode_keeps_real_draw_odds() {
        let quote = decode_quote(&create_test_payload(1.85, 3.4)).unwrap();
        assert_eq!(quote.draw_odds, Some(3.4));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_quote(b"not json"), Err(QuoteError::Decode(_))));
        assert!(matches!(
            decode_quote(br#"{"event_id": "x", "bookmaker": "y"}"#),
            Err(QuoteError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_rejects_degenerate_odds() {
        match decode_quote(&create_test_payload(1.0, 0.0)) {
            Err(QuoteError::InvalidOdds { field, value }) => {
                assert_eq!(field, "home_odds");
                assert_eq!(value, 1.0);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            decode_quote(&create_test_payload(1.85, 0.5)),
            Err(QuoteError::InvalidOdds { field: "draw_odds", .. })
        ));
    }

    #[test]
    fn test_decode_rejects_blank_keys() {
        let payload = br#"{
            "event_id": " ",
            "bookmaker": "caesars",
            "home_odds": 1.9,
            "away_odds": 1.9,
            "timestamp": "2024-03-01T19:00:00Z"
        }"#;
        assert!(matches!(decode_quote(payload), Err(QuoteError::MissingField("event_id"))));
    }
}
