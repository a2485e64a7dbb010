pub mod csv_loader;
pub mod db;
pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use quotedb_core::{Bar, CellUpdate, SeriesStore, SeriesTable, StoreError, SymbolInfo};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Postgres-backed [`SeriesStore`].
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        db::run_migrations(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))
    }
}

#[async_trait]
impl SeriesStore for PostgresStore {
    async fn register_symbol(&self, info: &SymbolInfo) -> Result<bool, StoreError> {
        db::insert_symbol(&self.pool, info).await
    }

    async fn delete_symbol(&self, symbol: &str) -> Result<bool, StoreError> {
        db::delete_symbol(&self.pool, symbol).await
    }

    async fn symbols(&self) -> Result<Vec<String>, StoreError> {
        db::list_symbols(&self.pool).await
    }

    async fn append_bars(&self, symbol: &str, bars: &[Bar]) -> Result<u64, StoreError> {
        db::append_bars(&self.pool, symbol, bars).await
    }

    async fn load_series(&self, symbol: &str) -> Result<SeriesTable, StoreError> {
        db::load_series(&self.pool, symbol).await
    }

    async fn apply_updates(&self, symbol: &str, updates: &[CellUpdate]) -> Result<u64, StoreError> {
        db::apply_updates(&self.pool, symbol, updates).await
    }
}
