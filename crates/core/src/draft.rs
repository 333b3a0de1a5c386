use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::types::{GeoPoint, VenueType};

/// Field names of derived venue attributes; payloads may not assign them.
const READ_ONLY_FIELDS: [&str; 4] = [
    "average_rating",
    "averageRating",
    "next_booking_date",
    "nextBookingDate",
];

/// Editable attributes of a venue, as accepted on create and update.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VenueDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub technical_specs: Option<String>,
    #[serde(default)]
    pub load_in_notes: Option<String>,
    #[serde(default)]
    pub venue_type: VenueType,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

fn default_country() -> String {
    "USA".to_string()
}

impl VenueDraft {
    /// Trims text fields and turns blank optional values into `None`.
    pub fn normalize(&mut self) {
        trim_in_place(&mut self.name);
        trim_in_place(&mut self.city);
        trim_in_place(&mut self.state);
        trim_in_place(&mut self.country);
        if self.country.is_empty() {
            self.country = default_country();
        }
        for field in [
            &mut self.address,
            &mut self.postal_code,
            &mut self.website,
            &mut self.phone,
            &mut self.email,
        ] {
            clean_optional(field);
        }
        // Free-text notes keep their inner formatting.
        for field in [&mut self.technical_specs, &mut self.load_in_notes] {
            if field.as_deref().is_some_and(|value| value.trim().is_empty()) {
                *field = None;
            }
        }
    }

    pub fn validate(&self) -> Result<(), DraftError> {
        require("name", &self.name)?;
        require("city", &self.city)?;
        require("state", &self.state)?;

        if let Some(capacity) = self.capacity {
            if capacity < 0 {
                return Err(DraftError::NegativeCapacity(capacity));
            }
        }
        if let Some(website) = &self.website {
            validate_website(website)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(point) = self.location {
            let lat_ok = (-90.0..=90.0).contains(&point.latitude);
            let lng_ok = (-180.0..=180.0).contains(&point.longitude);
            if !lat_ok || !lng_ok {
                return Err(DraftError::InvalidLocation {
                    latitude: point.latitude,
                    longitude: point.longitude,
                });
            }
        }
        Ok(())
    }
}

/// A contact submitted together with a new venue.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContactDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ContactDraft {
    pub fn normalize(&mut self) {
        trim_in_place(&mut self.name);
        for field in [&mut self.role, &mut self.email, &mut self.phone] {
            clean_optional(field);
        }
    }

    pub fn validate(&self) -> Result<(), DraftError> {
        require("name", &self.name)?;
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        Ok(())
    }
}

/// Request body for venue create and update calls.
///
/// Unknown keys are tolerated and dropped, except the derived attribute names
/// which are rejected by [`VenuePayload::into_parts`].
#[derive(Debug, Clone, Deserialize)]
pub struct VenuePayload {
    #[serde(flatten)]
    pub venue: VenueDraft,
    #[serde(default)]
    pub contacts: Vec<ContactDraft>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl VenuePayload {
    /// Normalizes and validates the payload, returning the venue draft and contacts.
    pub fn into_parts(self) -> Result<(VenueDraft, Vec<ContactDraft>), DraftError> {
        if let Some(field) = READ_ONLY_FIELDS
            .into_iter()
            .find(|field| self.rest.contains_key(*field))
        {
            return Err(DraftError::ReadOnlyField(field));
        }

        let mut venue = self.venue;
        venue.normalize();
        venue.validate()?;

        let mut contacts = self.contacts;
        for (index, contact) in contacts.iter_mut().enumerate() {
            contact.normalize();
            contact.validate().map_err(|source| DraftError::Contact {
                index,
                source: Box::new(source),
            })?;
        }

        Ok((venue, contacts))
    }
}

/// Reasons a venue or contact draft is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DraftError {
    #[error("{0} must not be empty")]
    Blank(&'static str),
    #[error("capacity must not be negative (got {0})")]
    NegativeCapacity(i64),
    #[error("website must be an absolute http(s) URL (got {0})")]
    InvalidWebsite(String),
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("location out of range (latitude {latitude}, longitude {longitude})")]
    InvalidLocation { latitude: f64, longitude: f64 },
    #[error("{0} is derived from related records and cannot be assigned")]
    ReadOnlyField(&'static str),
    #[error("contact #{index}: {source}")]
    Contact {
        index: usize,
        source: Box<DraftError>,
    },
}

fn require(field: &'static str, value: &str) -> Result<(), DraftError> {
    if value.trim().is_empty() {
        Err(DraftError::Blank(field))
    } else {
        Ok(())
    }
}

fn validate_website(value: &str) -> Result<(), DraftError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(()),
        _ => Err(DraftError::InvalidWebsite(value.to_string())),
    }
}

fn validate_email(value: &str) -> Result<(), DraftError> {
    let valid = value
        .split_once('@')
        .filter(|(local, domain)| {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        })
        .is_some()
        && !value.chars().any(char::is_whitespace);
    if valid {
        Ok(())
    } else {
        Err(DraftError::InvalidEmail(value.to_string()))
    }
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn clean_optional(field: &mut Option<String>) {
    *field = field
        .take()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
}
