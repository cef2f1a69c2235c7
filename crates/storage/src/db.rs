use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{self, SqliteConnectOptions, SqlitePool};
use std::str::FromStr;
use std::time::Duration as StdDuration;
use tracing::info;

/// Opens (creating if needed) `<data_folder>/sqlitedata/signals.db`.
pub async fn open_pool(data_folder: &str) -> Result<SqlitePool, sqlx::Error> {
    let db_path = format!("{}/sqlitedata", data_folder);
    std::fs::create_dir_all(&db_path)?;

    connect(&format!("{}/signals.db", db_path)).await
}

pub async fn connect(db_filename: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_filename))?
        .create_if_missing(true)
        .journal_mode(sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlite::SqliteSynchronous::Normal)
        .busy_timeout(StdDuration::from_secs(30))
        .statement_cache_capacity(100)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;
    apply_schema(&pool).await?;

    info!("Opened signal database {}", db_filename);
    Ok(pool)
}

pub async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let schema = include_str!("../../../sql/schema.sql");
    sqlx::raw_sql(schema).execute(pool).await?;
    Ok(())
}

pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date_key(raw: &str) -> Result<NaiveDate, sqlx::Error> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
