use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

use crate::traits::StoreError;

/// Name under which the reference value (adjusted close) is exposed as an input column.
pub const REFERENCE_COLUMN: &str = "price";

/// Stable identifier of an observation. Strictly increasing with timestamp per symbol.
pub type ObservationId = i64;

/// Symbols are stored and looked up in lower case.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Symbols
// ---------------------------------------------------------------------------

/// Registration metadata for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
}

impl SymbolInfo {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            name: None,
            exchange: None,
            sector: None,
            industry: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Price observations
// ---------------------------------------------------------------------------

/// A single daily OHLCV bar as received from a price source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Split/dividend adjusted close. This is the reference value indicators consume.
    pub adj_close: Decimal,
    pub volume: Decimal,
}

impl Bar {
    /// A flat bar where every price equals `close` and volume is zero.
    pub fn from_close(timestamp: DateTime<Utc>, close: Decimal) -> Self {
        Self {
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            adj_close: close,
            volume: Decimal::ZERO,
        }
    }
}

/// A stored bar with its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    pub bar: Bar,
}

impl Observation {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.bar.timestamp
    }

    /// The reference value used as the default computation input.
    pub fn reference(&self) -> Decimal {
        self.bar.adj_close
    }
}

// ---------------------------------------------------------------------------
// Indicator rows
// ---------------------------------------------------------------------------

/// Derived values for one observation. A missing key means "not yet computed".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub observation_id: ObservationId,
    values: BTreeMap<String, f64>,
}

impl IndicatorRow {
    pub fn new(observation_id: ObservationId) -> Self {
        Self {
            observation_id,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }

    pub fn set(&mut self, column: impl Into<String>, value: f64) {
        self.values.insert(column.into(), value);
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A staged point update: one named column of one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellUpdate {
    pub observation_id: ObservationId,
    pub column: String,
    pub value: f64,
}

// ---------------------------------------------------------------------------
// Series table
// ---------------------------------------------------------------------------

/// One symbol's observations and indicator rows, ordered by timestamp.
///
/// Observations and rows are kept in 1:1 correspondence and share ordering by
/// identifier. Positions (0-based indices into the ordered sequence) are the
/// unit the engine works in; identifiers are only used when writing back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesTable {
    symbol: String,
    observations: Vec<Observation>,
    rows: Vec<IndicatorRow>,
}

impl SeriesTable {
    /// Build a table, checking ordering and row correspondence.
    pub fn new(
        symbol: &str,
        observations: Vec<Observation>,
        rows: Vec<IndicatorRow>,
    ) -> Result<Self, StoreError> {
        if observations.len() != rows.len() {
            return Err(StoreError::InvalidSeries(format!(
                "{} observations but {} indicator rows",
                observations.len(),
                rows.len()
            )));
        }
        for pair in observations.windows(2) {
            if pair[1].id <= pair[0].id || pair[1].timestamp() <= pair[0].timestamp() {
                return Err(StoreError::InvalidSeries(format!(
                    "observation {} at {} does not follow {} at {}",
                    pair[1].id,
                    pair[1].timestamp(),
                    pair[0].id,
                    pair[0].timestamp()
                )));
            }
        }
        for (obs, row) in observations.iter().zip(&rows) {
            if obs.id != row.observation_id {
                return Err(StoreError::InvalidSeries(format!(
                    "indicator row {} is paired with observation {}",
                    row.observation_id, obs.id
                )));
            }
        }
        Ok(Self {
            symbol: normalize_symbol(symbol),
            observations,
            rows,
        })
    }

    /// Build a table whose indicator rows are all empty.
    pub fn from_observations(
        symbol: &str,
        observations: Vec<Observation>,
    ) -> Result<Self, StoreError> {
        let rows = observations.iter().map(|o| IndicatorRow::new(o.id)).collect();
        Self::new(symbol, observations, rows)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn rows(&self) -> &[IndicatorRow] {
        &self.rows
    }

    pub fn observation_id(&self, position: usize) -> Option<ObservationId> {
        self.observations.get(position).map(|o| o.id)
    }

    /// Resolve an identifier to its position. Identifiers are sorted, so this is a binary search.
    pub fn position_of(&self, id: ObservationId) -> Option<usize> {
        self.observations.binary_search_by_key(&id, |o| o.id).ok()
    }

    pub fn value(&self, position: usize, column: &str) -> Option<f64> {
        self.rows.get(position).and_then(|r| r.get(column))
    }

    /// Value of `column` in the most recent row.
    pub fn last_value(&self, column: &str) -> Option<f64> {
        self.rows.last().and_then(|r| r.get(column))
    }

    /// Reference values over `range`.
    pub fn reference_values(&self, range: Range<usize>) -> Vec<Decimal> {
        self.observations[range].iter().map(|o| o.reference()).collect()
    }

    /// Indicator column over `range`; `None` where absent.
    pub fn column(&self, column: &str, range: Range<usize>) -> Vec<Option<f64>> {
        self.rows[range].iter().map(|r| r.get(column)).collect()
    }

    pub fn set_value(&mut self, position: usize, column: &str, value: f64) {
        if let Some(row) = self.rows.get_mut(position) {
            row.set(column, value);
        }
    }

    /// Apply a staged update addressed by identifier.
    pub fn apply(&mut self, update: &CellUpdate) -> Result<(), StoreError> {
        let position = self
            .position_of(update.observation_id)
            .ok_or(StoreError::ObservationNotFound(update.observation_id))?;
        self.rows[position].set(update.column.clone(), update.value);
        Ok(())
    }

    /// Append an observation together with its empty indicator row.
    pub fn push(&mut self, observation: Observation) -> Result<(), StoreError> {
        if let Some(last) = self.observations.last() {
            if observation.timestamp() <= last.timestamp() {
                return Err(StoreError::OutOfOrder {
                    symbol: self.symbol.clone(),
                    timestamp: observation.timestamp(),
                    latest: last.timestamp(),
                });
            }
            if observation.id <= last.id {
                return Err(StoreError::InvalidSeries(format!(
                    "observation id {} does not follow {}",
                    observation.id, last.id
                )));
            }
        }
        self.rows.push(IndicatorRow::new(observation.id));
        self.observations.push(observation);
        Ok(())
    }
}
