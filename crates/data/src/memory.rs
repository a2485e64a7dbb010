use async_trait::async_trait;
use quotedb_core::{
    normalize_symbol, Bar, CellUpdate, Observation, ObservationId, SeriesStore, SeriesTable,
    StoreError, SymbolInfo,
};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    symbols: BTreeMap<String, SeriesTable>,
    next_id: ObservationId,
}

/// In-process [`SeriesStore`]. Used for offline computation and tests.
/// Symbol metadata beyond the name is not retained.
///
/// Identifiers come from one counter shared by all symbols, so they increase
/// with append order like a database sequence.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeriesStore for MemoryStore {
    async fn register_symbol(&self, info: &SymbolInfo) -> Result<bool, StoreError> {
        let symbol = normalize_symbol(&info.symbol);
        let mut inner = self.inner.write().await;
        if inner.symbols.contains_key(&symbol) {
            return Ok(false);
        }
        let table = SeriesTable::from_observations(&symbol, Vec::new())?;
        inner.symbols.insert(symbol, table);
        Ok(true)
    }

    async fn delete_symbol(&self, symbol: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.symbols.remove(&normalize_symbol(symbol)).is_some())
    }

    async fn symbols(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.symbols.keys().cloned().collect())
    }

    async fn append_bars(&self, symbol: &str, bars: &[Bar]) -> Result<u64, StoreError> {
        let symbol = normalize_symbol(symbol);
        let mut inner = self.inner.write().await;
        let Inner { symbols, next_id } = &mut *inner;
        let table = symbols
            .get_mut(&symbol)
            .ok_or_else(|| StoreError::SymbolNotFound(symbol.clone()))?;

        let mut latest = table.observations().last().map(|o| o.timestamp());
        for bar in bars {
            if let Some(latest) = latest {
                if bar.timestamp <= latest {
                    return Err(StoreError::OutOfOrder {
                        symbol: symbol.clone(),
                        timestamp: bar.timestamp,
                        latest,
                    });
                }
            }
            latest = Some(bar.timestamp);
        }

        for bar in bars {
            *next_id += 1;
            table.push(Observation {
                id: *next_id,
                bar: bar.clone(),
            })?;
        }
        Ok(bars.len() as u64)
    }

    async fn load_series(&self, symbol: &str) -> Result<SeriesTable, StoreError> {
        let symbol = normalize_symbol(symbol);
        let inner = self.inner.read().await;
        inner
            .symbols
            .get(&symbol)
            .cloned()
            .ok_or(StoreError::SymbolNotFound(symbol))
    }

    async fn apply_updates(&self, symbol: &str, updates: &[CellUpdate]) -> Result<u64, StoreError> {
        let symbol = normalize_symbol(symbol);
        let mut inner = self.inner.write().await;
        let table = inner
            .symbols
            .get_mut(&symbol)
            .ok_or_else(|| StoreError::SymbolNotFound(symbol.clone()))?;

        // Validate the whole batch first so a bad id writes nothing.
        if let Some(missing) = updates
            .iter()
            .find(|u| table.position_of(u.observation_id).is_none())
        {
            return Err(StoreError::ObservationNotFound(missing.observation_id));
        }
        for update in updates {
            table.apply(update)?;
        }
        Ok(updates.len() as u64)
    }
}
