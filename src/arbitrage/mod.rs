pub mod calculator;
pub mod detector;

pub use calculator::{calculate_three_way, format_odds, ArbitrageCalculator};
pub use detector::DetectionEngine;
