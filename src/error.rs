use thiserror::Error;

/// Why an inbound quote payload was refused before reaching the cache.
#[derive(Error, Debug)]
pub enum QuoteError {
    #[error("malformed quote payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("quote is missing {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {value} (decimal odds must be finite and above 1.0)")]
    InvalidOdds { field: &'static str, value: f64 },
}
