//! Venue list parameters: parsing, filter shape, sort whitelist and paging math.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{UnknownVenueType, VenueType};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Raw query-string parameters accepted by the venue list endpoint.
///
/// Everything is kept as text so that malformed values can be reported with
/// the parameter name instead of a generic extractor rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub venue_type: Option<String>,
    pub min_capacity: Option<String>,
    pub max_capacity: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Validated list request: which page, which rows, in what order.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueListQuery {
    pub page: Page,
    pub filter: VenueFilter,
    pub sort: Sort,
}

impl TryFrom<ListParams> for VenueListQuery {
    type Error = ListQueryError;

    fn try_from(params: ListParams) -> Result<Self, Self::Error> {
        let page = parse_positive("page", params.page.as_deref())?.unwrap_or(DEFAULT_PAGE);
        let limit = parse_positive("limit", params.limit.as_deref())?.unwrap_or(DEFAULT_LIMIT);
        if limit > MAX_LIMIT {
            return Err(ListQueryError::LimitTooLarge(limit));
        }

        let venue_type = non_blank(params.venue_type)
            .map(|value| value.parse::<VenueType>())
            .transpose()?;

        let filter = VenueFilter {
            search: non_blank(params.search),
            venue_type,
            min_capacity: parse_capacity("minCapacity", params.min_capacity.as_deref())?,
            max_capacity: parse_capacity("maxCapacity", params.max_capacity.as_deref())?,
            city: non_blank(params.city),
            state: non_blank(params.state),
            country: non_blank(params.country),
        };

        let field = non_blank(params.sort_by)
            .map(|value| value.parse::<SortField>())
            .transpose()?
            .unwrap_or_default();
        let order = non_blank(params.sort_order)
            .map(|value| value.parse::<SortOrder>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            page: Page { number: page, limit },
            filter,
            sort: Sort { field, order },
        })
    }
}

/// Active filters. `None` means the filter is not applied.
///
/// `search` matches name, city or address; the remaining filters are combined
/// with it using AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VenueFilter {
    pub search: Option<String>,
    pub venue_type: Option<VenueType>,
    pub min_capacity: Option<i64>,
    pub max_capacity: Option<i64>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub limit: u32,
}

impl Page {
    pub fn offset(self) -> i64 {
        i64::from(self.number.saturating_sub(1)) * i64::from(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Pagination metadata returned alongside a page of venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub total_pages: u64,
    pub current_page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn new(page: Page, total: u64) -> Self {
        Self {
            total,
            total_pages: total.div_ceil(u64::from(page.limit)),
            current_page: page.number,
            limit: page.limit,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub order: SortOrder,
}

/// Columns a venue list may be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Name,
    City,
    State,
    Country,
    Capacity,
    VenueType,
    CreatedAt,
    UpdatedAt,
    LastContactedAt,
}

impl SortField {
    pub fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::City => "city",
            Self::State => "state",
            Self::Country => "country",
            Self::Capacity => "capacity",
            Self::VenueType => "venue_type",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::LastContactedAt => "last_contacted_at",
        }
    }
}

impl FromStr for SortField {
    type Err = ListQueryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "name" => Ok(Self::Name),
            "city" => Ok(Self::City),
            "state" => Ok(Self::State),
            "country" => Ok(Self::Country),
            "capacity" => Ok(Self::Capacity),
            "venue_type" | "venueType" => Ok(Self::VenueType),
            "created_at" | "createdAt" => Ok(Self::CreatedAt),
            "updated_at" | "updatedAt" => Ok(Self::UpdatedAt),
            "last_contacted_at" | "lastContactedAt" | "lastContact" => Ok(Self::LastContactedAt),
            other => Err(ListQueryError::UnknownSortField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = ListQueryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("asc") {
            Ok(Self::Asc)
        } else if value.eq_ignore_ascii_case("desc") {
            Ok(Self::Desc)
        } else {
            Err(ListQueryError::UnknownSortOrder(value.to_string()))
        }
    }
}

/// Reasons a list request's parameters are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListQueryError {
    #[error("{param} must be a positive integer (got {value})")]
    NotPositive { param: &'static str, value: String },
    #[error("{param} must be a non-negative integer (got {value})")]
    InvalidCapacity { param: &'static str, value: String },
    #[error("limit must not exceed 100 (got {0})")]
    LimitTooLarge(u32),
    #[error("cannot sort by '{0}'")]
    UnknownSortField(String),
    #[error("sortOrder must be 'asc' or 'desc' (got {0})")]
    UnknownSortOrder(String),
    #[error(transparent)]
    VenueType(#[from] UnknownVenueType),
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_positive(param: &'static str, raw: Option<&str>) -> Result<Option<u32>, ListQueryError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<u32>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(ListQueryError::NotPositive {
            param,
            value: raw.to_string(),
        }),
    }
}

fn parse_capacity(param: &'static str, raw: Option<&str>) -> Result<Option<i64>, ListQueryError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<i64>() {
        Ok(value) if value >= 0 => Ok(Some(value)),
        _ => Err(ListQueryError::InvalidCapacity {
            param,
            value: raw.to_string(),
        }),
    }
}
