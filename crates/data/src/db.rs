use quotedb_core::{
    normalize_symbol, Bar, CellUpdate, IndicatorRow, Observation, SeriesTable, StoreError,
    SymbolInfo,
};
use sqlx::{PgPool, Row};
use tracing::debug;

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

/// Run embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Insert a symbol. Returns `false` if it was already registered.
pub async fn insert_symbol(pool: &PgPool, info: &SymbolInfo) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT INTO symbols (symbol, name, exchange, sector, industry)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (symbol) DO NOTHING",
    )
    .bind(normalize_symbol(&info.symbol))
    .bind(&info.name)
    .bind(&info.exchange)
    .bind(&info.sector)
    .bind(&info.industry)
    .execute(pool)
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected() == 1)
}

/// Delete a symbol. Observations and indicator values cascade.
pub async fn delete_symbol(pool: &PgPool, symbol: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM symbols WHERE symbol = $1")
        .bind(normalize_symbol(symbol))
        .execute(pool)
        .await
        .map_err(db_err)?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_symbols(pool: &PgPool) -> Result<Vec<String>, StoreError> {
    let rows = sqlx::query("SELECT symbol FROM symbols ORDER BY symbol")
        .fetch_all(pool)
        .await
        .map_err(db_err)?;
    Ok(rows.iter().map(|r| r.get("symbol")).collect())
}

/// Append bars after the latest stored bar, in one transaction.
///
/// The symbol row is locked for the duration so concurrent appends to the
/// same symbol serialize and observation ids stay in timestamp order.
pub async fn append_bars(pool: &PgPool, symbol: &str, bars: &[Bar]) -> Result<u64, StoreError> {
    let symbol = normalize_symbol(symbol);
    let mut tx = pool.begin().await.map_err(db_err)?;

    let locked = sqlx::query("SELECT symbol FROM symbols WHERE symbol = $1 FOR UPDATE")
        .bind(&symbol)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
    if locked.is_none() {
        return Err(StoreError::SymbolNotFound(symbol));
    }

    let row = sqlx::query("SELECT MAX(timestamp) AS latest FROM observations WHERE symbol = $1")
        .bind(&symbol)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
    let mut latest: Option<chrono::DateTime<chrono::Utc>> = row.get("latest");

    let mut count = 0u64;
    for bar in bars {
        if let Some(latest) = latest {
            if bar.timestamp <= latest {
                return Err(StoreError::OutOfOrder {
                    symbol,
                    timestamp: bar.timestamp,
                    latest,
                });
            }
        }
        sqlx::query(
            "INSERT INTO observations (symbol, timestamp, open, high, low, close, adj_close, volume)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&symbol)
        .bind(bar.timestamp)
        .bind(bar.open)
        .bind(bar.high)
        .bind(bar.low)
        .bind(bar.close)
        .bind(bar.adj_close)
        .bind(bar.volume)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        latest = Some(bar.timestamp);
        count += 1;
    }

    tx.commit().await.map_err(db_err)?;
    debug!(symbol = %symbol, count, "Appended bars");
    Ok(count)
}

/// Load a symbol's observations and indicator rows, ordered by id.
pub async fn load_series(pool: &PgPool, symbol: &str) -> Result<SeriesTable, StoreError> {
    let symbol = normalize_symbol(symbol);

    let exists: bool = sqlx::query("SELECT EXISTS (SELECT 1 FROM symbols WHERE symbol = $1) AS found")
        .bind(&symbol)
        .fetch_one(pool)
        .await
        .map_err(db_err)?
        .get("found");
    if !exists {
        return Err(StoreError::SymbolNotFound(symbol));
    }

    let rows = sqlx::query(
        "SELECT id, timestamp, open, high, low, close, adj_close, volume
         FROM observations
         WHERE symbol = $1
         ORDER BY id ASC",
    )
    .bind(&symbol)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let observations: Vec<Observation> = rows
        .iter()
        .map(|r| Observation {
            id: r.get("id"),
            bar: Bar {
                timestamp: r.get("timestamp"),
                open: r.get("open"),
                high: r.get("high"),
                low: r.get("low"),
                close: r.get("close"),
                adj_close: r.get("adj_close"),
                volume: r.get("volume"),
            },
        })
        .collect();

    let values = sqlx::query(
        "SELECT v.observation_id, v.name, v.value
         FROM indicator_values v
         JOIN observations o ON o.id = v.observation_id
         WHERE o.symbol = $1
         ORDER BY v.observation_id ASC",
    )
    .bind(&symbol)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let mut indicator_rows: Vec<IndicatorRow> =
        observations.iter().map(|o| IndicatorRow::new(o.id)).collect();
    let mut position = 0;
    for r in &values {
        let id: i64 = r.get("observation_id");
        while position < observations.len() && observations[position].id < id {
            position += 1;
        }
        if let Some(row) = indicator_rows.get_mut(position) {
            if row.observation_id == id {
                row.set(r.get::<String, _>("name"), r.get::<f64, _>("value"));
            }
        }
    }

    SeriesTable::new(&symbol, observations, indicator_rows)
}

/// Upsert indicator values in one transaction.
///
/// Every update must address an observation of `symbol`; otherwise the
/// transaction is rolled back and nothing is written.
pub async fn apply_updates(
    pool: &PgPool,
    symbol: &str,
    updates: &[CellUpdate],
) -> Result<u64, StoreError> {
    let symbol = normalize_symbol(symbol);
    let mut tx = pool.begin().await.map_err(db_err)?;

    let mut count = 0u64;
    for update in updates {
        let result = sqlx::query(
            "INSERT INTO indicator_values (observation_id, name, value)
             SELECT $1::BIGINT, $2::TEXT, $3::DOUBLE PRECISION
             WHERE EXISTS (SELECT 1 FROM observations WHERE id = $1 AND symbol = $4)
             ON CONFLICT (observation_id, name) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(update.observation_id)
        .bind(&update.column)
        .bind(update.value)
        .bind(&symbol)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ObservationNotFound(update.observation_id));
        }
        count += 1;
    }

    tx.commit().await.map_err(db_err)?;
    debug!(symbol = %symbol, count, "Applied indicator updates");
    Ok(count)
}
