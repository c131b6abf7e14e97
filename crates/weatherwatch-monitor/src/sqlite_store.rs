//! SQLite-based observation storage.
//!
//! Readings are keyed by (location, observed_at) as epoch seconds; summaries
//! by (location, date) as `YYYY-MM-DD`. Writes use `INSERT OR REPLACE`, so
//! recomputed summaries overwrite the previous row for the day.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Params};
use weatherwatch_core::{RusqliteErrorExt, StorageError};
use weatherwatch_weather::{
    Condition, DailySummary, ForecastSummary, NormalizedObservation, SummaryStats,
};

use crate::storage::{Storage, StorageResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed `Storage`.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn new<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let conn = Connection::open(path).map_err(RusqliteErrorExt::into_storage_error)?;
        Self::with_connection(conn)
    }

    /// A private database that disappears with the connection.
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().map_err(RusqliteErrorExt::into_storage_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS observations (
                    location TEXT NOT NULL,
                    observed_at INTEGER NOT NULL,
                    temperature REAL NOT NULL,
                    feels_like REAL NOT NULL,
                    humidity REAL NOT NULL,
                    wind_speed REAL NOT NULL,
                    condition TEXT NOT NULL,
                    PRIMARY KEY (location, observed_at)
                );

                CREATE TABLE IF NOT EXISTS daily_summaries (
                    location TEXT NOT NULL,
                    date TEXT NOT NULL,
                    avg_temperature REAL NOT NULL,
                    max_temperature REAL NOT NULL,
                    min_temperature REAL NOT NULL,
                    avg_humidity REAL NOT NULL,
                    avg_wind_speed REAL NOT NULL,
                    dominant_condition TEXT NOT NULL,
                    sample_count INTEGER NOT NULL,
                    PRIMARY KEY (location, date)
                );

                CREATE TABLE IF NOT EXISTS forecast_summaries (
                    location TEXT NOT NULL,
                    forecast_date TEXT NOT NULL,
                    avg_temperature REAL NOT NULL,
                    max_temperature REAL NOT NULL,
                    min_temperature REAL NOT NULL,
                    avg_humidity REAL NOT NULL,
                    avg_wind_speed REAL NOT NULL,
                    dominant_condition TEXT NOT NULL,
                    sample_count INTEGER NOT NULL,
                    PRIMARY KEY (location, forecast_date)
                );
                "#,
            )
            .map_err(RusqliteErrorExt::into_storage_error)
    }

    fn row_to_observation(row: &rusqlite::Row) -> rusqlite::Result<NormalizedObservation> {
        let epoch: i64 = row.get(1)?;
        let observed_at = DateTime::from_timestamp(epoch, 0)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(1, epoch))?;
        let condition: String = row.get(6)?;
        Ok(NormalizedObservation {
            location: row.get(0)?,
            observed_at,
            temperature: row.get(2)?,
            feels_like: row.get(3)?,
            humidity: row.get(4)?,
            wind_speed: row.get(5)?,
            condition: Condition::from_main(&condition),
        })
    }

    fn row_to_stats(row: &rusqlite::Row) -> rusqlite::Result<(String, String, SummaryStats)> {
        let condition: String = row.get(7)?;
        let sample_count: i64 = row.get(8)?;
        let stats = SummaryStats {
            avg_temperature: row.get(2)?,
            max_temperature: row.get(3)?,
            min_temperature: row.get(4)?,
            avg_humidity: row.get(5)?,
            avg_wind_speed: row.get(6)?,
            dominant_condition: Condition::from_main(&condition),
            sample_count: usize::try_from(sample_count).unwrap_or_default(),
        };
        Ok((row.get(0)?, row.get(1)?, stats))
    }

    fn load_stats<P: Params>(
        &self,
        sql: &str,
        args: P,
    ) -> StorageResult<Vec<(String, NaiveDate, SummaryStats)>> {
        let conn = self.conn.lock();
        let rows = conn
            .prepare(sql)
            .and_then(|mut stmt| {
                let rows = stmt
                    .query_map(args, Self::row_to_stats)?
                    .collect::<Result<Vec<_>, _>>();
                rows
            })
            .map_err(RusqliteErrorExt::into_storage_error)?;

        rows.into_iter()
            .map(|(location, date, stats)| Ok((location, parse_date(&date)?, stats)))
            .collect()
    }
}

fn parse_date(value: &str) -> StorageResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| StorageError::Corruption(format!("bad date {:?}: {}", value, e)))
}

impl Storage for SqliteStorage {
    fn store(&self, observations: &[NormalizedObservation]) -> StorageResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(RusqliteErrorExt::into_storage_error)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO observations
                     (location, observed_at, temperature, feels_like, humidity, wind_speed, condition)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(RusqliteErrorExt::into_storage_error)?;
            for obs in observations {
                stmt.execute(params![
                    obs.location,
                    obs.observed_at.timestamp(),
                    obs.temperature,
                    obs.feels_like,
                    obs.humidity,
                    obs.wind_speed,
                    obs.condition.as_str(),
                ])
                .map_err(RusqliteErrorExt::into_storage_error)?;
            }
        }
        tx.commit().map_err(RusqliteErrorExt::into_storage_error)
    }

    fn store_summaries(&self, summaries: &[DailySummary]) -> StorageResult<()> {
        let rows: Vec<(&str, NaiveDate, &SummaryStats)> = summaries
            .iter()
            .map(|s| (s.location.as_str(), s.date, &s.stats))
            .collect();
        self.upsert_stats(
            "INSERT OR REPLACE INTO daily_summaries
             (location, date, avg_temperature, max_temperature, min_temperature,
              avg_humidity, avg_wind_speed, dominant_condition, sample_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            &rows,
        )
    }

    fn store_forecast_summaries(&self, summaries: &[ForecastSummary]) -> StorageResult<()> {
        let rows: Vec<(&str, NaiveDate, &SummaryStats)> = summaries
            .iter()
            .map(|s| (s.location.as_str(), s.forecast_date, &s.stats))
            .collect();
        self.upsert_stats(
            "INSERT OR REPLACE INTO forecast_summaries
             (location, forecast_date, avg_temperature, max_temperature, min_temperature,
              avg_humidity, avg_wind_speed, dominant_condition, sample_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            &rows,
        )
    }

    fn recent_window(
        &self,
        location: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<NormalizedObservation>> {
        let conn = self.conn.lock();
        conn.prepare(
            "SELECT location, observed_at, temperature, feels_like, humidity, wind_speed, condition
                 FROM observations
                 WHERE location = ?1 AND observed_at >= ?2
                 ORDER BY observed_at ASC",
            )
            .and_then(|mut stmt| {
                let rows = stmt
                    .query_map(params![location, since.timestamp()], Self::row_to_observation)?
                    .collect::<Result<Vec<_>, _>>();
                rows
            })
            .map_err(RusqliteErrorExt::into_storage_error)
    }

    fn list_locations(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock();
        conn.prepare("SELECT DISTINCT location FROM observations ORDER BY location")
            .and_then(|mut stmt| {
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>();
                rows
            })
            .map_err(RusqliteErrorExt::into_storage_error)
    }

    fn daily_summaries(
        &self,
        location: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> StorageResult<Vec<DailySummary>> {
        let from = from.map(|d| d.format(DATE_FORMAT).to_string());
        let to = to.map(|d| d.format(DATE_FORMAT).to_string());
        let rows = self.load_stats(
            "SELECT location, date, avg_temperature, max_temperature, min_temperature,
                    avg_humidity, avg_wind_speed, dominant_condition, sample_count
             FROM daily_summaries
             WHERE location = ?1
               AND (?2 IS NULL OR date >= ?2)
               AND (?3 IS NULL OR date <= ?3)
             ORDER BY date ASC",
            params![location, from, to],
        )?;
        Ok(rows
            .into_iter()
            .map(|(location, date, stats)| DailySummary {
                location,
                date,
                stats,
            })
            .collect())
    }

    fn forecast_summaries(&self, location: &str) -> StorageResult<Vec<ForecastSummary>> {
        let rows = self.load_stats(
            "SELECT location, forecast_date, avg_temperature, max_temperature, min_temperature,
                    avg_humidity, avg_wind_speed, dominant_condition, sample_count
             FROM forecast_summaries WHERE location = ?1 ORDER BY forecast_date ASC",
            params![location],
        )?;
        Ok(rows
            .into_iter()
            .map(|(location, forecast_date, stats)| ForecastSummary {
                location,
                forecast_date,
                stats,
            })
            .collect())
    }
}

impl SqliteStorage {
    fn upsert_stats(&self, sql: &str, rows: &[(&str, NaiveDate, &SummaryStats)]) -> StorageResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(RusqliteErrorExt::into_storage_error)?;
        {
            let mut stmt = tx.prepare(sql).map_err(RusqliteErrorExt::into_storage_error)?;
            for (location, date, stats) in rows {
                stmt.execute(params![
                    location,
                    date.format(DATE_FORMAT).to_string(),
                    stats.avg_temperature,
                    stats.max_temperature,
                    stats.min_temperature,
                    stats.avg_humidity,
                    stats.avg_wind_speed,
                    stats.dominant_condition.as_str(),
                    i64::try_from(stats.sample_count).unwrap_or(i64::MAX),
                ])
                .map_err(RusqliteErrorExt::into_storage_error)?;
            }
        }
        tx.commit().map_err(RusqliteErrorExt::into_storage_error)
    }
}
