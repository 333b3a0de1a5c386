use chrono::{DateTime, Utc};
use serde::Serialize;

/// Aggregated figures for one venue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueStatistics {
    pub bookings: BookingStats,
    pub rating: RatingStats,
    pub communications: CommunicationStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BookingStats {
    pub total: u64,
    pub completed: u64,
    pub upcoming: u64,
}

/// `average` is `None` when the venue has no ratings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RatingStats {
    pub average: Option<f64>,
    pub count: u64,
}

impl RatingStats {
    /// Builds the rating summary from a raw SQL average and row count.
    pub fn from_raw(average: Option<f64>, count: u64) -> Self {
        let average = if count == 0 {
            None
        } else {
            average.map(round_to_tenth)
        };
        Self { average, count }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationStats {
    pub total: u64,
    pub last_contact: Option<DateTime<Utc>>,
}

pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
