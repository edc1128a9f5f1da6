use chrono::{DateTime, Utc};

/// Failures raised by the signal/backtest core. Per-symbol context is always
/// attached so a multi-symbol run can name the series that broke it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("insufficient data for {symbol}: have {bars} bars, need {needed}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        needed: usize,
    },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("duplicate bar date for {symbol}: {date}")]
    DuplicateDate {
        symbol: String,
        date: DateTime<Utc>,
    },

    #[error("out-of-order bar date for {symbol}: {date}")]
    UnorderedDates {
        symbol: String,
        date: DateTime<Utc>,
    },
}

/// Failures surfaced by a broker transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    ConnRefused(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("symbol not found: {0}")]
    NotFound(String),

    #[error("order rejected for {symbol}: {reason}")]
    Rejected { symbol: String, reason: String },

    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl TransportError {
    /// A permanent failure excludes the symbol from future cycles instead of
    /// being retried next refresh.
    pub fn is_permanent(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}
