use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Series Store Trait
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),
    #[error("Observation not found: {0}")]
    ObservationNotFound(ObservationId),
    #[error("Bar for {symbol} at {timestamp} is not after the latest stored bar at {latest}")]
    OutOfOrder {
        symbol: String,
        timestamp: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
    #[error("Invalid series: {0}")]
    InvalidSeries(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Persistent storage for per-symbol observations and their indicator rows.
///
/// Implementations must keep observations and indicator rows in 1:1
/// correspondence: appending a bar creates its (empty) indicator row, and
/// deleting a symbol removes both.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Register a symbol. Returns `false` if it already existed.
    async fn register_symbol(&self, info: &SymbolInfo) -> Result<bool, StoreError>;

    /// Remove a symbol with all its observations and indicator rows.
    /// Returns `false` if it did not exist.
    async fn delete_symbol(&self, symbol: &str) -> Result<bool, StoreError>;

    /// All registered symbols, sorted.
    async fn symbols(&self) -> Result<Vec<String>, StoreError>;

    /// Append bars after the latest stored bar. Bars must be sorted by
    /// timestamp and strictly later than anything already stored.
    async fn append_bars(&self, symbol: &str, bars: &[Bar]) -> Result<u64, StoreError>;

    /// Bulk ordered read of a symbol's observations and indicator rows.
    async fn load_series(&self, symbol: &str) -> Result<SeriesTable, StoreError>;

    /// Apply point updates as one unit: either all are written or none.
    async fn apply_updates(&self, symbol: &str, updates: &[CellUpdate]) -> Result<u64, StoreError>;
}
