//! Store-backed entry point: load a symbol, sweep it, write back.

use quotedb_core::{normalize_symbol, CellUpdate, SeriesStore, StoreError};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::registry::{IndicatorRegistry, RegistryError};
use crate::report::{IndicatorFailure, SweepReport};
use crate::sweep::{CommitMode, Sweep, SweepOptions};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Result of one symbol sweep.
#[derive(Debug, Clone)]
pub struct SymbolUpdate {
    pub report: SweepReport,
    /// Updates left staged under [`CommitMode::Deferred`]. Empty otherwise.
    pub pending: Vec<CellUpdate>,
}

/// Drives indicator sweeps against a [`SeriesStore`].
///
/// Symbols are processed one at a time and each sweep is synchronous over an
/// in-memory copy of the series. Two updaters must not sweep the same symbol
/// concurrently; the store offers no optimistic locking.
pub struct IndicatorUpdater<S> {
    store: S,
    registry: Arc<IndicatorRegistry>,
    selection: Vec<String>,
}

impl<S: SeriesStore> IndicatorUpdater<S> {
    pub fn new(store: S, registry: Arc<IndicatorRegistry>) -> Self {
        Self {
            store,
            registry,
            selection: Vec::new(),
        }
    }

    /// Restrict sweeps to `names` and their upstreams. Empty means the whole catalog.
    pub fn with_selection(mut self, names: Vec<String>) -> Result<Self, RegistryError> {
        self.registry.plan(&names)?;
        self.selection = names;
        Ok(self)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &IndicatorRegistry {
        &self.registry
    }

    /// Sweep every selected indicator for `symbol`.
    ///
    /// `check_all` forces the full history scan instead of the tail check.
    /// With `commit == false` nothing is written and the staged updates are
    /// returned in [`SymbolUpdate::pending`].
    pub async fn update_all(
        &self,
        symbol: &str,
        check_all: bool,
        commit: bool,
    ) -> Result<SymbolUpdate, EngineError> {
        self.update_with(symbol, SweepOptions::new(check_all, commit))
            .await
    }

    pub async fn update_with(
        &self,
        symbol: &str,
        options: SweepOptions,
    ) -> Result<SymbolUpdate, EngineError> {
        let symbol = normalize_symbol(symbol);
        let mut table = self.store.load_series(&symbol).await?;
        let plan = self.registry.plan(&self.selection)?;
        let sweep = Sweep::with_plan(&self.registry, plan, options);

        let commit = sweep.options().commit;
        let mut report = SweepReport::new(&symbol);
        let mut staged = Vec::new();
        for def in sweep.indicators() {
            let updates = sweep.step(def, &mut table, &mut report);
            if updates.is_empty() {
                continue;
            }
            if commit != CommitMode::PerIndicator {
                staged.extend(updates);
                continue;
            }
            // Earlier indicators are already committed, so a failed write is
            // reported against this indicator and its dependents are skipped.
            match self.store.apply_updates(&symbol, &updates).await {
                Ok(written) => report.rows_written += written,
                Err(e) => {
                    warn!(symbol = %symbol, indicator = %def.name(), error = %e, "Indicator write failed");
                    report.fail(
                        def.name(),
                        IndicatorFailure::Store {
                            indicator: def.name().to_string(),
                            message: e.to_string(),
                        },
                    );
                }
            }
        }

        let pending = match commit {
            CommitMode::PerSweep => {
                if !staged.is_empty() {
                    report.rows_written += self.store.apply_updates(&symbol, &staged).await?;
                }
                Vec::new()
            }
            CommitMode::PerIndicator => Vec::new(),
            CommitMode::Deferred => staged,
        };
        report.committed = commit != CommitMode::Deferred;

        info!(
            symbol = %symbol,
            rows = report.rows_filled(),
            written = report.rows_written,
            failed = report.failures().count(),
            skipped = report.skipped().count(),
            "Sweep complete"
        );

        Ok(SymbolUpdate { report, pending })
    }

    /// Write updates previously returned under [`CommitMode::Deferred`].
    pub async fn commit_pending(&self, update: &SymbolUpdate) -> Result<u64, EngineError> {
        if update.pending.is_empty() {
            return Ok(0);
        }
        Ok(self
            .store
            .apply_updates(&update.report.symbol, &update.pending)
            .await?)
    }

    /// Sweep every registered symbol in turn. A failing symbol is logged and
    /// reported; the remaining symbols still run.
    pub async fn sync_all(
        &self,
        options: SweepOptions,
    ) -> Result<Vec<(String, Result<SymbolUpdate, EngineError>)>, EngineError> {
        let symbols = self.store.symbols().await?;
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let result = self.update_with(&symbol, options).await;
            if let Err(e) = &result {
                error!(symbol = %symbol, error = %e, "Symbol sweep failed");
            }
            results.push((symbol, result));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::IndicatorDef;
    use crate::report::IndicatorOutcome;
    use crate::test_support::{assert_approx, bars, def_ma};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use quotedb_core::{Bar, SeriesTable, SymbolInfo};
    use quotedb_data::MemoryStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory store whose `apply_updates` fails on one chosen call (1-based).
    struct FailingWrites {
        inner: MemoryStore,
        fail_on: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SeriesStore for FailingWrites {
        async fn register_symbol(&self, info: &SymbolInfo) -> Result<bool, StoreError> {
            self.inner.register_symbol(info).await
        }

        async fn delete_symbol(&self, symbol: &str) -> Result<bool, StoreError> {
            self.inner.delete_symbol(symbol).await
        }

        async fn symbols(&self) -> Result<Vec<String>, StoreError> {
            self.inner.symbols().await
        }

        async fn append_bars(&self, symbol: &str, bars: &[Bar]) -> Result<u64, StoreError> {
            self.inner.append_bars(symbol, bars).await
        }

        async fn load_series(&self, symbol: &str) -> Result<SeriesTable, StoreError> {
            self.inner.load_series(symbol).await
        }

        async fn apply_updates(
            &self,
            symbol: &str,
            updates: &[CellUpdate],
        ) -> Result<u64, StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(StoreError::DatabaseError("connection reset".into()));
            }
            self.inner.apply_updates(symbol, updates).await
        }
    }

    async fn seeded(prices: &[i64]) -> IndicatorUpdater<MemoryStore> {
        let store = MemoryStore::new();
        store.register_symbol(&SymbolInfo::new("SPY")).await.unwrap();
        store.append_bars("spy", &bars(prices)).await.unwrap();
        let registry = IndicatorRegistry::new(vec![def_ma("ma_3", 3)]).unwrap();
        IndicatorUpdater::new(store, Arc::new(registry))
    }

    fn next_bar(day: i64, close: rust_decimal::Decimal) -> Bar {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Bar::from_close(start + Duration::days(day), close)
    }

    #[tokio::test]
    async fn test_append_then_tail_update() {
        let updater = seeded(&[10, 11, 12, 13, 14, 15, 16, 17, 18, 19]).await;
        let first = updater.update_all("SPY", true, true).await.unwrap();
        assert_eq!(first.report.rows_written, 8);

        updater.store().append_bars("spy", &[next_bar(10, dec!(20))]).await.unwrap();
        let second = updater.update_all("spy", false, true).await.unwrap();

        assert_eq!(
            second.report.outcome("ma_3"),
            Some(&IndicatorOutcome::Filled { rows: 1, start: 8, end: 11 })
        );
        assert_eq!(second.report.rows_written, 1);

        let table = updater.store().load_series("spy").await.unwrap();
        assert_approx(table.value(10, "ma_3").unwrap(), 19.0);
        assert_approx(table.value(9, "ma_3").unwrap(), 18.0);
        assert_eq!(table.value(1, "ma_3"), None);
    }

    #[tokio::test]
    async fn test_idempotent_full_sweep() {
        let updater = seeded(&[10, 11, 12, 13, 14, 15]).await;
        updater.update_all("spy", true, true).await.unwrap();
        let before = updater.store().load_series("spy").await.unwrap();

        let again = updater.update_all("spy", true, true).await.unwrap();
        assert_eq!(again.report.rows_written, 0);
        assert_eq!(again.report.outcome("ma_3"), Some(&IndicatorOutcome::UpToDate));
        assert_eq!(updater.store().load_series("spy").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_deferred_commit_leaves_store_untouched() {
        let updater = seeded(&[10, 11, 12, 13]).await;
        let update = updater.update_all("spy", true, false).await.unwrap();
        assert!(!update.report.committed);
        assert_eq!(update.pending.len(), 2);

        let table = updater.store().load_series("spy").await.unwrap();
        assert!(table.rows().iter().all(|r| r.is_empty()));

        assert_eq!(updater.commit_pending(&update).await.unwrap(), 2);
        let table = updater.store().load_series("spy").await.unwrap();
        assert_approx(table.value(3, "ma_3").unwrap(), 12.0);
    }

    #[tokio::test]
    async fn test_per_indicator_commit() {
        let updater = seeded(&[10, 11, 12, 13]).await;
        let options = SweepOptions {
            check_all: true,
            commit: CommitMode::PerIndicator,
            rebuild: false,
        };
        let update = updater.update_with("spy", options).await.unwrap();
        assert!(update.pending.is_empty());
        assert_eq!(update.report.rows_written, 2);
    }

    #[tokio::test]
    async fn test_unknown_symbol() {
        let updater = seeded(&[10]).await;
        let err = updater.update_all("qqq", true, true).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::SymbolNotFound(_))));
    }

    #[tokio::test]
    async fn test_sync_all_symbols() {
        let updater = seeded(&[10, 11, 12]).await;
        updater.store().register_symbol(&SymbolInfo::new("qqq")).await.unwrap();
        updater.store().append_bars("qqq", &bars(&[5, 6, 7, 8])).await.unwrap();

        let results = updater.sync_all(SweepOptions::new(false, true)).await.unwrap();
        let written: Vec<(String, u64)> = results
            .into_iter()
            .map(|(s, r)| (s, r.unwrap().report.rows_written))
            .collect();
        assert_eq!(written, vec![("qqq".to_string(), 2), ("spy".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_selection_limits_plan() {
        let store = MemoryStore::new();
        store.register_symbol(&SymbolInfo::new("spy")).await.unwrap();
        store.append_bars("spy", &bars(&[10, 11, 12, 13, 14, 15])).await.unwrap();

        let registry = Arc::new(IndicatorRegistry::standard().unwrap());
        let updater = IndicatorUpdater::new(store, registry)
            .with_selection(vec!["diff_ma_5_day".to_string()])
            .unwrap();
        let update = updater.update_all("spy", true, true).await.unwrap();

        let names: Vec<&str> = update
            .report
            .indicators
            .iter()
            .map(|r| r.indicator.as_str())
            .collect();
        assert_eq!(names, vec!["ma_5_day", "diff_ma_5_day"]);
        let table = updater.store().load_series("spy").await.unwrap();
        assert_approx(table.value(5, "diff_ma_5_day").unwrap(), 2.0);
    }

    #[tokio::test]
    async fn test_tail_update_fills_only_appended_rows() {
        let store = MemoryStore::new();
        store.register_symbol(&SymbolInfo::new("spy")).await.unwrap();
        store
            .append_bars("spy", &bars(&[10, 12, 11, 13, 15, 14, 16, 18, 17, 19]))
            .await
            .unwrap();
        let registry = IndicatorRegistry::new(vec![def_ma("ma_5", 5)]).unwrap();
        let updater = IndicatorUpdater::new(store, Arc::new(registry));
        updater.update_all("spy", true, true).await.unwrap();
        let before = updater.store().load_series("spy").await.unwrap();

        let appended: Vec<Bar> = [21, 20, 22]
            .iter()
            .enumerate()
            .map(|(i, &c)| next_bar(10 + i as i64, Decimal::from(c)))
            .collect();
        updater.store().append_bars("spy", &appended).await.unwrap();
        let update = updater.update_all("spy", false, true).await.unwrap();

        assert_eq!(
            update.report.outcome("ma_5"),
            Some(&IndicatorOutcome::Filled { rows: 3, start: 6, end: 13 })
        );
        assert_eq!(update.report.rows_written, 3);

        let after = updater.store().load_series("spy").await.unwrap();
        assert_eq!(&after.rows()[..10], before.rows());
        assert_approx(after.value(10, "ma_5").unwrap(), 18.2);
        assert_approx(after.value(11, "ma_5").unwrap(), 19.0);
        assert_approx(after.value(12, "ma_5").unwrap(), 19.8);
    }

    #[tokio::test]
    async fn test_daily_ewma_matches_rebuild() {
        let store = MemoryStore::new();
        store.register_symbol(&SymbolInfo::new("spy")).await.unwrap();
        let prices: Vec<i64> = (0..30).map(|i| 100 + (i % 6) * 4 - i / 3).collect();
        store.append_bars("spy", &bars(&prices)).await.unwrap();

        let registry = Arc::new(IndicatorRegistry::standard().unwrap());
        let updater = IndicatorUpdater::new(store, registry)
            .with_selection(vec!["ewma_5_day".to_string(), "ma_5_day".to_string()])
            .unwrap();
        updater.update_all("spy", true, true).await.unwrap();

        let appended = [dec!(111), dec!(107), dec!(101), dec!(104), dec!(99)];
        for (day, close) in (30..).zip(appended) {
            updater.store().append_bars("spy", &[next_bar(day, close)]).await.unwrap();
            updater.update_all("spy", false, true).await.unwrap();
        }
        let incremental = updater.store().load_series("spy").await.unwrap();

        let rebuild = SweepOptions {
            check_all: true,
            commit: CommitMode::Deferred,
            rebuild: true,
        };
        let rebuilt = updater.update_with("spy", rebuild).await.unwrap();
        let mut expected = incremental.clone();
        for update in &rebuilt.pending {
            expected.apply(update).unwrap();
        }

        for p in 30..35 {
            let ewma = incremental.value(p, "ewma_5_day").unwrap();
            let ma = incremental.value(p, "ma_5_day").unwrap();
            assert!((ewma - ma).abs() > 1e-6, "ewma equals ma at {p}");
            assert_approx(ewma, expected.value(p, "ewma_5_day").unwrap());
        }
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_per_indicator() {
        let store = FailingWrites {
            inner: MemoryStore::new(),
            fail_on: 2,
            calls: AtomicUsize::new(0),
        };
        store.register_symbol(&SymbolInfo::new("spy")).await.unwrap();
        store.append_bars("spy", &bars(&[10, 11, 12, 13, 14, 15])).await.unwrap();

        let registry = IndicatorRegistry::new(vec![
            def_ma("ma_3", 3),
            def_ma("ma_4", 4),
            IndicatorDef::new("spread", |_, inputs| {
                Ok(inputs[0].iter().zip(&inputs[1]).map(|(p, m)| p - m).collect())
            })
            .with_inputs(["ma_4"])
            .with_warmup(3),
        ])
        .unwrap();
        let updater = IndicatorUpdater::new(store, Arc::new(registry));
        let options = SweepOptions {
            check_all: true,
            commit: CommitMode::PerIndicator,
            rebuild: false,
        };
        let update = updater.update_with("spy", options).await.unwrap();
        let report = &update.report;

        assert_eq!(
            report.outcome("ma_3"),
            Some(&IndicatorOutcome::Filled { rows: 4, start: 0, end: 6 })
        );
        assert!(matches!(
            report.outcome("ma_4"),
            Some(IndicatorOutcome::Failed { error: IndicatorFailure::Store { .. } })
        ));
        assert_eq!(
            report.outcome("spread"),
            Some(&IndicatorOutcome::Skipped { blocked_by: "ma_4".into() })
        );
        assert_eq!(report.rows_written, 4);
        assert!(report.committed);

        let table = updater.store().load_series("spy").await.unwrap();
        assert_approx(table.value(5, "ma_3").unwrap(), 14.0);
        assert_eq!(table.value(5, "ma_4"), None);
    }
}
