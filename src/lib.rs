pub mod config;
pub mod types;
pub mod error;
pub mod cache;
pub mod arbitrage;
pub mod source;
pub mod publisher;
pub mod database;
pub mod service;

pub use config::Config;
pub use types::*;
