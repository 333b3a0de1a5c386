//! Records owned by a venue: row mappings and insert-side repositories.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use venue_desk_core::types::{Booking, Communication, VenueContact, VenueRating};

use crate::to_rfc3339;

/// SQLite result code for a failed foreign key constraint.
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ContactRow {
    id: i64,
    venue_id: i64,
    name: String,
    role: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    is_primary: bool,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ContactRow> for VenueContact {
    fn from(row: ContactRow) -> Self {
        Self {
            id: row.id,
            venue_id: row.venue_id,
            name: row.name,
            role: row.role,
            email: row.email,
            phone: row.phone,
            is_primary: row.is_primary,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RatingRow {
    id: i64,
    venue_id: i64,
    rating: i64,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<RatingRow> for VenueRating {
    fn from(row: RatingRow) -> Self {
        Self {
            id: row.id,
            venue_id: row.venue_id,
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BookingRow {
    id: i64,
    venue_id: i64,
    event_name: Option<String>,
    event_date: DateTime<Utc>,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Self {
            id: row.id,
            venue_id: row.venue_id,
            event_name: row.event_name,
            event_date: row.event_date,
            status: row.status,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CommunicationRow {
    id: i64,
    venue_id: i64,
    date: DateTime<Utc>,
    channel: String,
    summary: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CommunicationRow> for Communication {
    fn from(row: CommunicationRow) -> Self {
        Self {
            id: row.id,
            venue_id: row.venue_id,
            date: row.date,
            channel: row.channel,
            summary: row.summary,
            created_at: row.created_at,
        }
    }
}

/// Errors raised when inserting a record under a venue.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("venue does not exist")]
    MissingVenue,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RecordError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_FOREIGNKEY) =>
            {
                Self::MissingVenue
            }
            other => Self::Database(other),
        }
    }
}

/// Payload required to insert a booking.
pub struct NewBooking<'a> {
    pub venue_id: i64,
    pub event_name: Option<&'a str>,
    pub event_date: DateTime<Utc>,
    pub status: &'a str,
    pub notes: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Repository for bookings held at venues.
#[derive(Clone)]
pub struct BookingRepository {
    pub(crate) pool: SqlitePool,
}

impl BookingRepository {
    /// Inserts a booking and returns it as stored.
    pub async fn insert(&self, record: &NewBooking<'_>) -> Result<Booking, RecordError> {
        let created_at = to_rfc3339(record.created_at);
        let row = sqlx::query_as::<_, BookingRow>(
            "INSERT INTO bookings \
             (venue_id, event_name, event_date, status, notes, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING *",
        )
        .bind(record.venue_id)
        .bind(record.event_name)
        .bind(to_rfc3339(record.event_date))
        .bind(record.status)
        .bind(record.notes)
        .bind(&created_at)
        .bind(&created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }
}

/// Payload required to insert a rating.
pub struct NewRating<'a> {
    pub venue_id: i64,
    pub rating: i64,
    pub comment: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Repository for venue ratings.
#[derive(Clone)]
pub struct RatingRepository {
    pub(crate) pool: SqlitePool,
}

impl RatingRepository {
    /// Inserts a rating. Values outside `1..=5` are rejected by the schema.
    pub async fn insert(&self, record: &NewRating<'_>) -> Result<VenueRating, RecordError> {
        let row = sqlx::query_as::<_, RatingRow>(
            "INSERT INTO venue_ratings (venue_id, rating, comment, created_at) \
             VALUES (?, ?, ?, ?) \
             RETURNING *",
        )
        .bind(record.venue_id)
        .bind(record.rating)
        .bind(record.comment)
        .bind(to_rfc3339(record.created_at))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }
}

/// Payload required to log a communication.
pub struct NewCommunication<'a> {
    pub venue_id: i64,
    pub date: DateTime<Utc>,
    pub channel: &'a str,
    pub summary: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Repository for the communication log.
#[derive(Clone)]
pub struct CommunicationRepository {
    pub(crate) pool: SqlitePool,
}

impl CommunicationRepository {
    /// Logs a communication and advances the venue's `last_contacted_at`
    /// when the new entry is more recent.
    pub async fn insert(
        &self,
        record: &NewCommunication<'_>,
    ) -> Result<Communication, RecordError> {
        let mut tx = self.pool.begin().await?;
        let date = to_rfc3339(record.date);

        let row = sqlx::query_as::<_, CommunicationRow>(
            "INSERT INTO communications (venue_id, date, channel, summary, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING *",
        )
        .bind(record.venue_id)
        .bind(&date)
        .bind(record.channel)
        .bind(record.summary)
        .bind(to_rfc3339(record.created_at))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE venues \
             SET last_contacted_at = ? \
             WHERE id = ? \
               AND (last_contacted_at IS NULL OR last_contacted_at < ?)",
        )
        .bind(&date)
        .bind(record.venue_id)
        .bind(&date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }
}
