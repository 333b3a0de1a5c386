use std::{str::FromStr, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use thiserror::Error;

mod records;
mod venues;

pub use records::{
    BookingRepository, CommunicationRepository, NewBooking, NewCommunication, NewRating,
    RatingRepository, RecordError,
};
pub use venues::{VenueError, VenuePage, VenueRepository, RECENT_ACTIVITY_LIMIT};

pub const DEFAULT_POOL_SIZE: u32 = 5;

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens a pool with [`DEFAULT_POOL_SIZE`] connections.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        Self::connect_with_pool_size(database_url, DEFAULT_POOL_SIZE).await
    }

    /// Establishes a new SQLite connection pool for the provided connection string.
    ///
    /// Every pooled connection enforces foreign keys, so deleting a venue
    /// cascades to its child records.
    pub async fn connect_with_pool_size(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle for querying and mutating venues.
    pub fn venues(&self) -> VenueRepository {
        VenueRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for venue bookings.
    pub fn bookings(&self) -> BookingRepository {
        BookingRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for venue ratings.
    pub fn ratings(&self) -> RatingRepository {
        RatingRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for the communication log.
    pub fn communications(&self) -> CommunicationRepository {
        CommunicationRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub(crate) fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
