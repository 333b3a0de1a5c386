use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stats::round_to_tenth;

/// Booking status that counts towards the completed-bookings statistic.
pub const BOOKING_STATUS_COMPLETED: &str = "completed";

/// Category of a venue. Persisted as its lowercase name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueType {
    Club,
    Theater,
    Arena,
    Festival,
    Bar,
    Outdoor,
    #[default]
    Other,
}

impl VenueType {
    pub const ALL: [VenueType; 7] = [
        Self::Club,
        Self::Theater,
        Self::Arena,
        Self::Festival,
        Self::Bar,
        Self::Outdoor,
        Self::Other,
    ];

    /// Returns the canonical database representation for the type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Club => "club",
            Self::Theater => "theater",
            Self::Arena => "arena",
            Self::Festival => "festival",
            Self::Bar => "bar",
            Self::Outdoor => "outdoor",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for VenueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VenueType {
    type Err = UnknownVenueType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| UnknownVenueType(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown venue type '{0}' (expected one of club, theater, arena, festival, bar, outdoor, other)")]
pub struct UnknownVenueType(pub String);

/// WGS84 coordinates of a venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A venue together with whichever associations were loaded alongside it.
///
/// The association vectors reflect what the query loaded, not necessarily
/// every related row: list queries load at most one contact and one upcoming
/// booking per venue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Venue {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: Option<String>,
    pub capacity: Option<i64>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub technical_specs: Option<String>,
    pub load_in_notes: Option<String>,
    pub venue_type: VenueType,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub contacts: Vec<VenueContact>,
    pub ratings: Vec<VenueRating>,
    pub bookings: Vec<Booking>,
    pub communications: Vec<Communication>,
}

impl Venue {
    /// Mean of the loaded ratings rounded to one decimal, `None` without ratings.
    pub fn average_rating(&self) -> Option<f64> {
        if self.ratings.is_empty() {
            return None;
        }
        let sum: i64 = self.ratings.iter().map(|rating| rating.rating).sum();
        Some(round_to_tenth(sum as f64 / self.ratings.len() as f64))
    }

    /// Earliest loaded booking dated strictly after `now`.
    pub fn next_booking_date(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.bookings
            .iter()
            .map(|booking| booking.event_date)
            .filter(|event_date| *event_date > now)
            .min()
    }

    /// Produces the serializable form carrying the derived fields as of `now`.
    pub fn into_document(self, now: DateTime<Utc>) -> VenueDocument {
        VenueDocument {
            average_rating: self.average_rating(),
            next_booking_date: self.next_booking_date(now),
            venue: self,
        }
    }
}

/// Snapshot of a venue with its derived fields evaluated, as sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueDocument {
    #[serde(flatten)]
    venue: Venue,
    average_rating: Option<f64>,
    next_booking_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueContact {
    pub id: i64,
    pub venue_id: i64,
    pub name: String,
    pub role: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_primary: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueRating {
    pub id: i64,
    pub venue_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    pub id: i64,
    pub venue_id: i64,
    pub event_name: Option<String>,
    pub event_date: DateTime<Utc>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A logged interaction with a venue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Communication {
    pub id: i64,
    pub venue_id: i64,
    pub date: DateTime<Utc>,
    pub channel: String,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}
