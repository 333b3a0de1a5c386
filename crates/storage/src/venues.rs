use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use thiserror::Error;

use venue_desk_core::draft::{ContactDraft, VenueDraft};
use venue_desk_core::query::{Pagination, VenueFilter, VenueListQuery};
use venue_desk_core::relations::{Relation, BOOKINGS, COMMUNICATIONS, CONTACTS, RATINGS};
use venue_desk_core::stats::{BookingStats, CommunicationStats, RatingStats, VenueStatistics};
use venue_desk_core::types::{
    Booking, GeoPoint, Venue, VenueContact, VenueRating, VenueType, BOOKING_STATUS_COMPLETED,
};

use crate::records::{BookingRow, CommunicationRow, ContactRow, RatingRow};
use crate::to_rfc3339;

/// Number of bookings and communications included when fetching one venue.
pub const RECENT_ACTIVITY_LIMIT: i64 = 10;

/// Errors produced by venue operations.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("venue not found")]
    NotFound,
    #[error("venue has {0} upcoming booking(s)")]
    UpcomingBookings(u64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One page of venues matching a list query.
#[derive(Debug)]
pub struct VenuePage {
    pub venues: Vec<Venue>,
    pub pagination: Pagination,
}

#[derive(Debug, sqlx::FromRow)]
struct VenueRow {
    id: i64,
    name: String,
    address: Option<String>,
    city: String,
    state: String,
    country: String,
    postal_code: Option<String>,
    capacity: Option<i64>,
    website: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    technical_specs: Option<String>,
    load_in_notes: Option<String>,
    venue_type: String,
    last_contacted_at: Option<DateTime<Utc>>,
    location_lat: Option<f64>,
    location_lng: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VenueRow {
    /// Converts the row into a venue with no associations loaded.
    fn into_domain(self) -> Result<Venue, sqlx::Error> {
        let venue_type = self
            .venue_type
            .parse::<VenueType>()
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        let location = match (self.location_lat, self.location_lng) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        };
        Ok(Venue {
            id: self.id,
            name: self.name,
            address: self.address,
            city: self.city,
            state: self.state,
            country: self.country,
            postal_code: self.postal_code,
            capacity: self.capacity,
            website: self.website,
            phone: self.phone,
            email: self.email,
            technical_specs: self.technical_specs,
            load_in_notes: self.load_in_notes,
            venue_type,
            last_contacted_at: self.last_contacted_at,
            location,
            created_at: self.created_at,
            updated_at: self.updated_at,
            contacts: Vec::new(),
            ratings: Vec::new(),
            bookings: Vec::new(),
            communications: Vec::new(),
        })
    }
}

/// Repository for venues and their aggregate views.
#[derive(Clone)]
pub struct VenueRepository {
    pub(crate) pool: SqlitePool,
}

impl VenueRepository {
    /// Runs a filtered, sorted, paginated venue query.
    ///
    /// Each venue carries at most one contact, its ratings and at most one
    /// upcoming booking (the earliest dated after `now`).
    pub async fn list(
        &self,
        query: &VenueListQuery,
        now: DateTime<Utc>,
    ) -> Result<VenuePage, VenueError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM venues");
        push_filter(&mut count, &query.filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.get("total");

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM venues");
        push_filter(&mut select, &query.filter);
        select
            .push(" ORDER BY ")
            .push(query.sort.field.column())
            .push(" ")
            .push(query.sort.order.as_sql())
            .push(", id ASC LIMIT ")
            .push_bind(i64::from(query.page.limit))
            .push(" OFFSET ")
            .push_bind(query.page.offset());
        let rows = select
            .build_query_as::<VenueRow>()
            .fetch_all(&self.pool)
            .await?;

        let mut venues = rows
            .into_iter()
            .map(VenueRow::into_domain)
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_list_associations(&mut venues, now).await?;

        Ok(VenuePage {
            venues,
            pagination: Pagination::new(query.page, total.max(0) as u64),
        })
    }

    async fn attach_list_associations(
        &self,
        venues: &mut [Venue],
        now: DateTime<Utc>,
    ) -> Result<(), VenueError> {
        let ids: Vec<i64> = venues.iter().map(|venue| venue.id).collect();
        if ids.is_empty() {
            return Ok(());
        }

        let contacts: Vec<ContactRow> =
            load_related(&self.pool, &CONTACTS, &ids, None, "id ASC").await?;
        let ratings: Vec<RatingRow> =
            load_related(&self.pool, &RATINGS, &ids, None, "id ASC").await?;
        let upcoming: Vec<BookingRow> = load_related(
            &self.pool,
            &BOOKINGS,
            &ids,
            Some(("event_date > ", to_rfc3339(now))),
            "event_date ASC, id ASC",
        )
        .await?;

        let mut by_id: HashMap<i64, &mut Venue> =
            venues.iter_mut().map(|venue| (venue.id, venue)).collect();
        for row in contacts {
            let contact = VenueContact::from(row);
            if let Some(venue) = by_id.get_mut(&contact.venue_id) {
                if venue.contacts.is_empty() {
                    venue.contacts.push(contact);
                }
            }
        }
        for row in ratings {
            let rating = VenueRating::from(row);
            if let Some(venue) = by_id.get_mut(&rating.venue_id) {
                venue.ratings.push(rating);
            }
        }
        for row in upcoming {
            let booking = Booking::from(row);
            if let Some(venue) = by_id.get_mut(&booking.venue_id) {
                if venue.bookings.is_empty() {
                    venue.bookings.push(booking);
                }
            }
        }
        Ok(())
    }

    /// Loads one venue with all contacts and ratings plus its most recent
    /// bookings and communications.
    pub async fn fetch(&self, id: i64) -> Result<Venue, VenueError> {
        let mut venue = self.fetch_bare(id).await?;

        venue.contacts = load_related::<ContactRow>(&self.pool, &CONTACTS, &[id], None, "id ASC")
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        venue.ratings = load_related::<RatingRow>(&self.pool, &RATINGS, &[id], None, "id ASC")
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        venue.bookings = load_recent::<BookingRow>(&self.pool, &BOOKINGS, id, "event_date")
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        venue.communications =
            load_recent::<CommunicationRow>(&self.pool, &COMMUNICATIONS, id, "date")
                .await?
                .into_iter()
                .map(Into::into)
                .collect();

        Ok(venue)
    }

    /// Loads one venue with its contacts only.
    pub async fn fetch_with_contacts(&self, id: i64) -> Result<Venue, VenueError> {
        let mut venue = self.fetch_bare(id).await?;
        venue.contacts = load_related::<ContactRow>(&self.pool, &CONTACTS, &[id], None, "id ASC")
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        Ok(venue)
    }

    async fn fetch_bare(&self, id: i64) -> Result<Venue, VenueError> {
        let row = sqlx::query_as::<_, VenueRow>("SELECT * FROM venues WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(VenueError::NotFound)?;
        Ok(row.into_domain()?)
    }

    pub async fn exists(&self, id: i64) -> Result<bool, VenueError> {
        let row = sqlx::query("SELECT 1 FROM venues WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Inserts a venue and its contacts in one transaction and returns the
    /// stored venue with contacts.
    pub async fn create(
        &self,
        draft: &VenueDraft,
        contacts: &[ContactDraft],
        now: DateTime<Utc>,
    ) -> Result<Venue, VenueError> {
        let mut tx = self.pool.begin().await?;
        let timestamp = to_rfc3339(now);

        let row = sqlx::query(
            "INSERT INTO venues \
             (name, address, city, state, country, postal_code, capacity, website, phone, email, \
              technical_specs, load_in_notes, venue_type, location_lat, location_lng, created_at, updated_at, \
              name_folded, address_folded, city_folded, state_folded, country_folded) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(&draft.name)
        .bind(&draft.address)
        .bind(&draft.city)
        .bind(&draft.state)
        .bind(&draft.country)
        .bind(&draft.postal_code)
        .bind(draft.capacity)
        .bind(&draft.website)
        .bind(&draft.phone)
        .bind(&draft.email)
        .bind(&draft.technical_specs)
        .bind(&draft.load_in_notes)
        .bind(draft.venue_type.as_str())
        .bind(draft.location.map(|point| point.latitude))
        .bind(draft.location.map(|point| point.longitude))
        .bind(&timestamp)
        .bind(&timestamp)
        .bind(draft.name.to_lowercase())
        .bind(draft.address.as_deref().map(str::to_lowercase))
        .bind(draft.city.to_lowercase())
        .bind(draft.state.to_lowercase())
        .bind(draft.country.to_lowercase())
        .fetch_one(&mut *tx)
        .await?;
        let id: i64 = row.get("id");

        for contact in contacts {
            insert_contact(&mut tx, id, contact, &timestamp).await?;
        }

        tx.commit().await?;
        self.fetch_with_contacts(id).await
    }

    /// Overwrites the editable fields of an existing venue and bumps `updated_at`.
    pub async fn update(
        &self,
        id: i64,
        draft: &VenueDraft,
        now: DateTime<Utc>,
    ) -> Result<Venue, VenueError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE venues \
             SET name = ?, address = ?, city = ?, state = ?, country = ?, postal_code = ?, \
                 capacity = ?, website = ?, phone = ?, email = ?, technical_specs = ?, \
                 load_in_notes = ?, venue_type = ?, location_lat = ?, location_lng = ?, \
                 updated_at = ?, name_folded = ?, address_folded = ?, city_folded = ?, \
                 state_folded = ?, country_folded = ? \
             WHERE id = ?",
        )
        .bind(&draft.name)
        .bind(&draft.address)
        .bind(&draft.city)
        .bind(&draft.state)
        .bind(&draft.country)
        .bind(&draft.postal_code)
        .bind(draft.capacity)
        .bind(&draft.website)
        .bind(&draft.phone)
        .bind(&draft.email)
        .bind(&draft.technical_specs)
        .bind(&draft.load_in_notes)
        .bind(draft.venue_type.as_str())
        .bind(draft.location.map(|point| point.latitude))
        .bind(draft.location.map(|point| point.longitude))
        .bind(to_rfc3339(now))
        .bind(draft.name.to_lowercase())
        .bind(draft.address.as_deref().map(str::to_lowercase))
        .bind(draft.city.to_lowercase())
        .bind(draft.state.to_lowercase())
        .bind(draft.country.to_lowercase())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(VenueError::NotFound);
        }

        tx.commit().await?;
        self.fetch_with_contacts(id).await
    }

    /// Deletes a venue unless it has bookings dated after `now`.
    ///
    /// Child records are removed by the schema's cascading foreign keys.
    pub async fn delete(&self, id: i64, now: DateTime<Utc>) -> Result<(), VenueError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM venues WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Err(VenueError::NotFound);
        }

        let upcoming = count_upcoming_bookings(&mut tx, id, now).await?;
        if upcoming > 0 {
            return Err(VenueError::UpcomingBookings(upcoming));
        }

        sqlx::query("DELETE FROM venues WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Computes booking, rating and communication figures for one venue.
    pub async fn statistics(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<VenueStatistics, VenueError> {
        if !self.exists(id).await? {
            return Err(VenueError::NotFound);
        }

        let bookings = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    COALESCE(SUM(status = ?), 0) AS completed, \
                    COALESCE(SUM(event_date > ?), 0) AS upcoming \
               FROM bookings \
              WHERE venue_id = ?",
        )
        .bind(BOOKING_STATUS_COMPLETED)
        .bind(to_rfc3339(now))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        let ratings = sqlx::query(
            "SELECT AVG(rating) AS average, COUNT(id) AS count \
               FROM venue_ratings \
              WHERE venue_id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        let communications = sqlx::query(
            "SELECT COUNT(*) AS total, MAX(date) AS last_contact \
               FROM communications \
              WHERE venue_id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        let rating_count: i64 = ratings.try_get("count")?;
        let last_contact: Option<String> = communications.try_get("last_contact")?;

        Ok(VenueStatistics {
            bookings: BookingStats {
                total: to_count(bookings.try_get("total")?),
                completed: to_count(bookings.try_get("completed")?),
                upcoming: to_count(bookings.try_get("upcoming")?),
            },
            rating: RatingStats::from_raw(ratings.try_get("average")?, to_count(rating_count)),
            communications: CommunicationStats {
                total: to_count(communications.try_get("total")?),
                last_contact: last_contact.as_deref().map(parse_timestamp).transpose()?,
            },
        })
    }
}

async fn insert_contact(
    tx: &mut Transaction<'_, Sqlite>,
    venue_id: i64,
    contact: &ContactDraft,
    timestamp: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO venue_contacts \
         (venue_id, name, role, email, phone, is_primary, notes, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(venue_id)
    .bind(&contact.name)
    .bind(&contact.role)
    .bind(&contact.email)
    .bind(&contact.phone)
    .bind(contact.is_primary)
    .bind(&contact.notes)
    .bind(timestamp)
    .bind(timestamp)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn count_upcoming_bookings(
    tx: &mut Transaction<'_, Sqlite>,
    venue_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS upcoming FROM bookings WHERE venue_id = ? AND event_date > ?",
    )
    .bind(venue_id)
    .bind(to_rfc3339(now))
    .fetch_one(&mut **tx)
    .await?;
    Ok(to_count(row.get("upcoming")))
}

/// Appends the WHERE clause for `filter`. Text filters match the lowercased
/// `*_folded` columns against a lowercased term.
fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &VenueFilter) {
    builder.push(" WHERE 1 = 1");

    if let Some(term) = &filter.search {
        let pattern = like_pattern(&term.to_lowercase());
        builder
            .push(" AND (name_folded LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR city_folded LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR address_folded LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(venue_type) = filter.venue_type {
        builder
            .push(" AND venue_type = ")
            .push_bind(venue_type.as_str());
    }
    if let Some(min) = filter.min_capacity {
        builder.push(" AND capacity >= ").push_bind(min);
    }
    if let Some(max) = filter.max_capacity {
        builder.push(" AND capacity <= ").push_bind(max);
    }
    for (column, value) in [
        ("city_folded", &filter.city),
        ("state_folded", &filter.state),
        ("country_folded", &filter.country),
    ] {
        if let Some(value) = value {
            builder
                .push(" AND ")
                .push(column)
                .push(" LIKE ")
                .push_bind(like_pattern(&value.to_lowercase()))
                .push(" ESCAPE '\\'");
        }
    }
}

/// Builds a substring pattern with `LIKE` wildcards in `term` escaped.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Loads rows of `relation` belonging to any of `venue_ids`.
async fn load_related<T>(
    pool: &SqlitePool,
    relation: &Relation,
    venue_ids: &[i64],
    condition: Option<(&'static str, String)>,
    order_by: &'static str,
) -> Result<Vec<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT * FROM {} WHERE {} IN (",
        relation.table, relation.foreign_key
    ));
    let mut ids = builder.separated(", ");
    for id in venue_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(")");

    if let Some((clause, value)) = condition {
        builder.push(" AND ").push(clause).push_bind(value);
    }
    builder.push(" ORDER BY ").push(order_by);

    builder.build_query_as::<T>().fetch_all(pool).await
}

/// Loads the most recent rows of `relation` for one venue, newest first.
async fn load_recent<T>(
    pool: &SqlitePool,
    relation: &Relation,
    venue_id: i64,
    date_column: &'static str,
) -> Result<Vec<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let sql = format!(
        "SELECT * FROM {table} WHERE {fk} = ? ORDER BY {date_column} DESC, id DESC LIMIT ?",
        table = relation.table,
        fk = relation.foreign_key,
    );
    sqlx::query_as::<_, T>(&sql)
        .bind(venue_id)
        .bind(RECENT_ACTIVITY_LIMIT)
        .fetch_all(pool)
        .await
}

fn to_count(value: i64) -> u64 {
    value.max(0) as u64
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{draft, now, setup_db};
    use crate::{Database, NewBooking, NewCommunication, NewRating};
    use chrono::Duration;
    use venue_desk_core::query::{Page, Sort, SortField, SortOrder};

    async fn seed(db: &Database) -> Vec<Venue> {
        let repo = db.venues();
        let mut venues = Vec::new();
        for (name, address, city, state, capacity, venue_type) in [
            ("The Echo Lounge", "551 Flat Shoals Ave", "Atlanta", "GA", 650, VenueType::Club),
            ("Harmony Hall", "12 Music Row", "Nashville", "TN", 1200, VenueType::Theater),
            ("Rhythm Room", "88 Echo Street", "Austin", "TX", 450, VenueType::Club),
            ("Festival Arena", "1 Stadium Way", "Los Angeles", "CA", 5000, VenueType::Arena),
            ("Atlantic Bar", "7 Pier Road", "Atlantic City", "NJ", 200, VenueType::Bar),
        ] {
            let mut draft = draft(name, city, state);
            draft.address = Some(address.to_string());
            draft.capacity = Some(capacity);
            draft.venue_type = venue_type;
            venues.push(repo.create(&draft, &[], now()).await.expect("seed venue"));
        }
        venues
    }

    async fn book(db: &Database, venue_id: i64, event_date: DateTime<Utc>, status: &str) {
        db.bookings()
            .insert(&NewBooking {
                venue_id,
                event_name: Some("Show"),
                event_date,
                status,
                notes: None,
                created_at: now(),
            })
            .await
            .expect("insert booking");
    }

    async fn rate(db: &Database, venue_id: i64, rating: i64) {
        db.ratings()
            .insert(&NewRating {
                venue_id,
                rating,
                comment: None,
                created_at: now(),
            })
            .await
            .expect("insert rating");
    }

    fn query(filter: VenueFilter) -> VenueListQuery {
        VenueListQuery {
            page: Page::default(),
            filter,
            sort: Sort::default(),
        }
    }

    async fn venue_count(db: &Database) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM venues")
            .fetch_one(db.pool())
            .await
            .expect("count venues");
        count
    }

    #[tokio::test]
    async fn created_venue_without_contacts_has_no_derived_values() {
        let db = setup_db().await;
        let mut draft = draft("The Echo Lounge", "Atlanta", "GA");
        draft.capacity = Some(650);
        draft.venue_type = VenueType::Club;

        let created = db.venues().create(&draft, &[], now()).await.expect("create");
        let fetched = db.venues().fetch(created.id).await.expect("fetch");

        assert_eq!(fetched.name, "The Echo Lounge");
        assert_eq!(fetched.capacity, Some(650));
        assert_eq!(fetched.venue_type, VenueType::Club);
        assert!(fetched.contacts.is_empty());
        assert_eq!(fetched.next_booking_date(now()), None);
        assert_eq!(fetched.average_rating(), None);
        assert_eq!(fetched.created_at, now());
    }

    #[tokio::test]
    async fn create_stores_contacts_with_venue() {
        let db = setup_db().await;
        let contacts = vec![
            ContactDraft {
                name: "Dana Booker".into(),
                email: Some("dana@echolounge.com".into()),
                is_primary: true,
                ..ContactDraft::default()
            },
            ContactDraft {
                name: "Sam Sound".into(),
                role: Some("Production".into()),
                ..ContactDraft::default()
            },
        ];

        let venue = db
            .venues()
            .create(&draft("The Echo Lounge", "Atlanta", "GA"), &contacts, now())
            .await
            .expect("create");

        assert_eq!(venue.contacts.len(), 2);
        assert_eq!(venue.contacts[0].name, "Dana Booker");
        assert!(venue.contacts[0].is_primary);
        assert_eq!(venue.contacts[1].role.as_deref(), Some("Production"));
        assert!(venue.contacts.iter().all(|c| c.venue_id == venue.id));
    }

    #[tokio::test]
    async fn failed_contact_insert_rolls_back_venue() {
        let db = setup_db().await;
        let contacts = vec![
            ContactDraft {
                name: "Dana Booker".into(),
                ..ContactDraft::default()
            },
            ContactDraft {
                name: "   ".into(),
                ..ContactDraft::default()
            },
        ];

        let result = db
            .venues()
            .create(&draft("The Echo Lounge", "Atlanta", "GA"), &contacts, now())
            .await;

        assert!(matches!(result, Err(VenueError::Database(_))));
        assert_eq!(venue_count(&db).await, 0);
        let (contacts,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM venue_contacts")
            .fetch_one(db.pool())
            .await
            .expect("count contacts");
        assert_eq!(contacts, 0);
    }

    #[tokio::test]
    async fn search_matches_name_city_or_address_case_insensitively() {
        let db = setup_db().await;
        seed(&db).await;

        let page = db
            .venues()
            .list(
                &query(VenueFilter {
                    search: Some("ECHO".into()),
                    ..VenueFilter::default()
                }),
                now(),
            )
            .await
            .expect("list");

        let names: Vec<_> = page.venues.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Rhythm Room", "The Echo Lounge"]);
        for venue in &page.venues {
            let haystack = format!(
                "{} {} {}",
                venue.name,
                venue.city,
                venue.address.as_deref().unwrap_or_default()
            )
            .to_lowercase();
            assert!(haystack.contains("echo"));
        }
        assert_eq!(page.pagination.total, 2);
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let db = setup_db().await;
        seed(&db).await;

        let page = db
            .venues()
            .list(
                &query(VenueFilter {
                    search: Some("%".into()),
                    ..VenueFilter::default()
                }),
                now(),
            )
            .await
            .expect("list");
        assert!(page.venues.is_empty());
    }

    #[tokio::test]
    async fn filters_are_combined_with_and() {
        let db = setup_db().await;
        seed(&db).await;

        let page = db
            .venues()
            .list(
                &query(VenueFilter {
                    search: Some("atl".into()),
                    venue_type: Some(VenueType::Club),
                    min_capacity: Some(300),
                    max_capacity: Some(650),
                    state: Some("ga".into()),
                    ..VenueFilter::default()
                }),
                now(),
            )
            .await
            .expect("list");

        assert_eq!(page.venues.len(), 1);
        let venue = &page.venues[0];
        assert_eq!(venue.name, "The Echo Lounge");
        assert_eq!(venue.venue_type, VenueType::Club);
        assert!((300..=650).contains(&venue.capacity.unwrap_or_default()));
    }

    #[tokio::test]
    async fn capacity_bounds_are_inclusive_and_independent() {
        let db = setup_db().await;
        seed(&db).await;
        let repo = db.venues();

        let at_least = repo
            .list(
                &query(VenueFilter {
                    min_capacity: Some(1200),
                    ..VenueFilter::default()
                }),
                now(),
            )
            .await
            .expect("list");
        assert_eq!(at_least.pagination.total, 2);

        let at_most = repo
            .list(
                &query(VenueFilter {
                    max_capacity: Some(450),
                    ..VenueFilter::default()
                }),
                now(),
            )
            .await
            .expect("list");
        let names: Vec<_> = at_most.venues.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Atlantic Bar", "Rhythm Room"]);
    }

    #[tokio::test]
    async fn city_country_filters_are_substring_matches() {
        let db = setup_db().await;
        seed(&db).await;

        let page = db
            .venues()
            .list(
                &query(VenueFilter {
                    city: Some("atlant".into()),
                    country: Some("us".into()),
                    ..VenueFilter::default()
                }),
                now(),
            )
            .await
            .expect("list");
        let names: Vec<_> = page.venues.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Atlantic Bar", "The Echo Lounge"]);
    }

    #[tokio::test]
    async fn sorts_by_requested_column_and_direction() {
        let db = setup_db().await;
        seed(&db).await;

        let mut list = query(VenueFilter::default());
        list.sort = Sort {
            field: SortField::Capacity,
            order: SortOrder::Desc,
        };
        let page = db.venues().list(&list, now()).await.expect("list");
        let capacities: Vec<_> = page.venues.iter().filter_map(|v| v.capacity).collect();
        assert_eq!(capacities, vec![5000, 1200, 650, 450, 200]);
    }

    #[tokio::test]
    async fn paginates_and_returns_empty_pages_past_the_end() {
        let db = setup_db().await;
        seed(&db).await;
        let repo = db.venues();

        let mut list = query(VenueFilter::default());
        list.page = Page {
            number: 2,
            limit: 2,
        };
        let page = repo.list(&list, now()).await.expect("page 2");
        assert_eq!(page.venues.len(), 2);
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.current_page, 2);

        list.page.number = 3;
        let last = repo.list(&list, now()).await.expect("page 3");
        assert_eq!(last.venues.len(), 1);

        list.page.number = 4;
        let beyond = repo.list(&list, now()).await.expect("page 4");
        assert!(beyond.venues.is_empty());
        assert_eq!(beyond.pagination.total, 5);
    }

    #[tokio::test]
    async fn list_eager_loads_limited_associations() {
        let db = setup_db().await;
        let contacts = vec![
            ContactDraft {
                name: "First".into(),
                ..ContactDraft::default()
            },
            ContactDraft {
                name: "Second".into(),
                ..ContactDraft::default()
            },
        ];
        let venue = db
            .venues()
            .create(&draft("Harmony Hall", "Nashville", "TN"), &contacts, now())
            .await
            .expect("create");
        let soon = now() + Duration::days(5);
        book(&db, venue.id, now() + Duration::days(30), "confirmed").await;
        book(&db, venue.id, soon, "confirmed").await;
        book(&db, venue.id, now() - Duration::days(30), "completed").await;
        rate(&db, venue.id, 4).await;
        rate(&db, venue.id, 5).await;

        let page = db
            .venues()
            .list(&query(VenueFilter::default()), now())
            .await
            .expect("list");
        let listed = &page.venues[0];

        assert_eq!(listed.contacts.len(), 1);
        assert_eq!(listed.contacts[0].name, "First");
        assert_eq!(listed.ratings.len(), 2);
        assert_eq!(listed.bookings.len(), 1);
        assert_eq!(listed.bookings[0].event_date, soon);
        assert_eq!(listed.next_booking_date(now()), Some(soon));
        assert_eq!(listed.average_rating(), Some(4.5));
        assert!(listed.communications.is_empty());
    }

    #[tokio::test]
    async fn list_skips_booking_dated_exactly_now() {
        let db = setup_db().await;
        let venue = db
            .venues()
            .create(&draft("Harmony Hall", "Nashville", "TN"), &[], now())
            .await
            .expect("create");
        let tomorrow = now() + Duration::days(1);
        book(&db, venue.id, now(), "confirmed").await;
        book(&db, venue.id, tomorrow, "confirmed").await;

        let page = db
            .venues()
            .list(&query(VenueFilter::default()), now())
            .await
            .expect("list");
        let listed = &page.venues[0];
        assert_eq!(listed.bookings.len(), 1);
        assert_eq!(listed.bookings[0].event_date, tomorrow);
        assert_eq!(listed.next_booking_date(now()), Some(tomorrow));

        let fetched = db.venues().fetch(venue.id).await.expect("fetch");
        assert_eq!(fetched.next_booking_date(now()), listed.next_booking_date(now()));
    }

    #[tokio::test]
    async fn text_filters_fold_non_ascii_letters() {
        let db = setup_db().await;
        seed(&db).await;
        let mut cafe = draft("Café Rouge", "Montréal", "Québec");
        cafe.country = "Canada".into();
        cafe.address = Some("12 Rue Émile".into());
        db.venues().create(&cafe, &[], now()).await.expect("create");
        let repo = db.venues();

        for filter in [
            VenueFilter {
                search: Some("CAFÉ".into()),
                ..VenueFilter::default()
            },
            VenueFilter {
                search: Some("émile".into()),
                ..VenueFilter::default()
            },
            VenueFilter {
                city: Some("MONTRÉAL".into()),
                ..VenueFilter::default()
            },
            VenueFilter {
                state: Some("QUÉBEC".into()),
                country: Some("canada".into()),
                ..VenueFilter::default()
            },
        ] {
            let page = repo.list(&query(filter.clone()), now()).await.expect("list");
            assert_eq!(page.pagination.total, 1, "{filter:?}");
            assert_eq!(page.venues[0].name, "Café Rouge");
        }
    }

    #[tokio::test]
    async fn update_refreshes_searchable_text() {
        let db = setup_db().await;
        let venue = db
            .venues()
            .create(&draft("Rhythm Room", "Austin", "TX"), &[], now())
            .await
            .expect("create");
        db.venues()
            .update(venue.id, &draft("Ñandú Club", "Austin", "TX"), now())
            .await
            .expect("update");

        let search = |term: &str| {
            query(VenueFilter {
                search: Some(term.into()),
                ..VenueFilter::default()
            })
        };
        let renamed = db.venues().list(&search("ÑANDÚ"), now()).await.expect("list");
        assert_eq!(renamed.pagination.total, 1);
        let stale = db.venues().list(&search("rhythm"), now()).await.expect("list");
        assert_eq!(stale.pagination.total, 0);
    }

    #[tokio::test]
    async fn next_booking_date_uses_only_future_bookings() {
        let db = setup_db().await;
        let venue = db
            .venues()
            .create(&draft("Rhythm Room", "Austin", "TX"), &[], now())
            .await
            .expect("create");
        let future = now() + Duration::days(7);
        book(&db, venue.id, future, "confirmed").await;
        book(&db, venue.id, now() - Duration::days(7), "completed").await;

        let fetched = db.venues().fetch(venue.id).await.expect("fetch");
        assert_eq!(fetched.bookings.len(), 2);
        assert_eq!(fetched.next_booking_date(now()), Some(future));
    }

    #[tokio::test]
    async fn fetch_limits_recent_activity() {
        let db = setup_db().await;
        let venue = db
            .venues()
            .create(&draft("Festival Arena", "Los Angeles", "CA"), &[], now())
            .await
            .expect("create");
        for day in 0..12 {
            book(&db, venue.id, now() - Duration::days(day), "completed").await;
            db.communications()
                .insert(&NewCommunication {
                    venue_id: venue.id,
                    date: now() - Duration::days(day),
                    channel: "phone",
                    summary: None,
                    created_at: now(),
                })
                .await
                .expect("log communication");
        }

        let fetched = db.venues().fetch(venue.id).await.expect("fetch");
        assert_eq!(fetched.bookings.len(), RECENT_ACTIVITY_LIMIT as usize);
        assert_eq!(fetched.bookings[0].event_date, now());
        assert!(fetched
            .bookings
            .windows(2)
            .all(|pair| pair[0].event_date >= pair[1].event_date));
        assert_eq!(fetched.communications.len(), RECENT_ACTIVITY_LIMIT as usize);
        assert_eq!(fetched.communications[0].date, now());
    }

    #[tokio::test]
    async fn fetch_reports_missing_venue() {
        let db = setup_db().await;
        assert!(!db.venues().exists(42).await.expect("exists"));
        let err = db.venues().fetch(42).await.expect_err("missing");
        assert!(matches!(err, VenueError::NotFound));
    }

    #[tokio::test]
    async fn update_overwrites_fields_and_bumps_timestamp() {
        let db = setup_db().await;
        let venue = db
            .venues()
            .create(&draft("Harmony Hall", "Nashville", "TN"), &[], now())
            .await
            .expect("create");

        let later = now() + Duration::hours(2);
        let mut changes = draft("Harmony Hall & Annex", "Nashville", "TN");
        changes.capacity = Some(1500);
        changes.venue_type = VenueType::Theater;
        changes.location = Some(GeoPoint {
            latitude: 36.16,
            longitude: -86.78,
        });
        let updated = db
            .venues()
            .update(venue.id, &changes, later)
            .await
            .expect("update");

        assert_eq!(updated.name, "Harmony Hall & Annex");
        assert_eq!(updated.capacity, Some(1500));
        assert_eq!(updated.venue_type, VenueType::Theater);
        assert_eq!(updated.location.map(|p| p.latitude), Some(36.16));
        assert_eq!(updated.created_at, now());
        assert_eq!(updated.updated_at, later);
    }

    #[tokio::test]
    async fn update_of_missing_venue_creates_nothing() {
        let db = setup_db().await;
        let err = db
            .venues()
            .update(7, &draft("Nowhere", "Austin", "TX"), now())
            .await
            .expect_err("missing");
        assert!(matches!(err, VenueError::NotFound));
        assert_eq!(venue_count(&db).await, 0);
    }

    #[tokio::test]
    async fn delete_is_blocked_by_upcoming_bookings() {
        let db = setup_db().await;
        let venue = db
            .venues()
            .create(&draft("The Echo Lounge", "Atlanta", "GA"), &[], now())
            .await
            .expect("create");
        book(&db, venue.id, now() + Duration::days(1), "confirmed").await;

        let err = db
            .venues()
            .delete(venue.id, now())
            .await
            .expect_err("upcoming booking blocks delete");
        assert!(matches!(err, VenueError::UpcomingBookings(1)));
        assert_eq!(venue_count(&db).await, 1);
    }

    #[tokio::test]
    async fn delete_with_only_past_bookings_cascades() {
        let db = setup_db().await;
        let venue = db
            .venues()
            .create(
                &draft("The Echo Lounge", "Atlanta", "GA"),
                &[ContactDraft {
                    name: "Dana Booker".into(),
                    ..ContactDraft::default()
                }],
                now(),
            )
            .await
            .expect("create");
        book(&db, venue.id, now() - Duration::days(1), "completed").await;
        book(&db, venue.id, now(), "completed").await;
        rate(&db, venue.id, 3).await;

        db.venues().delete(venue.id, now()).await.expect("delete");

        assert_eq!(venue_count(&db).await, 0);
        let (orphans,): (i64,) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM bookings) + (SELECT COUNT(*) FROM venue_contacts) \
                  + (SELECT COUNT(*) FROM venue_ratings)",
        )
        .fetch_one(db.pool())
        .await
        .expect("count children");
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn delete_of_missing_venue_is_not_found() {
        let db = setup_db().await;
        let err = db.venues().delete(3, now()).await.expect_err("missing");
        assert!(matches!(err, VenueError::NotFound));
    }

    #[tokio::test]
    async fn statistics_aggregate_related_records() {
        let db = setup_db().await;
        let venue = db
            .venues()
            .create(&draft("Rhythm Room", "Austin", "TX"), &[], now())
            .await
            .expect("create");
        book(&db, venue.id, now() - Duration::days(20), "completed").await;
        book(&db, venue.id, now() - Duration::days(2), "cancelled").await;
        book(&db, venue.id, now() + Duration::days(3), "confirmed").await;
        for rating in [3, 4, 5] {
            rate(&db, venue.id, rating).await;
        }
        let last = now() - Duration::hours(5);
        for date in [now() - Duration::days(9), last] {
            db.communications()
                .insert(&NewCommunication {
                    venue_id: venue.id,
                    date,
                    channel: "email",
                    summary: None,
                    created_at: now(),
                })
                .await
                .expect("log communication");
        }

        let stats = db
            .venues()
            .statistics(venue.id, now())
            .await
            .expect("statistics");

        assert_eq!(
            stats.bookings,
            BookingStats {
                total: 3,
                completed: 1,
                upcoming: 1,
            }
        );
        assert_eq!(stats.rating.average, Some(4.0));
        assert_eq!(stats.rating.count, 3);
        assert_eq!(stats.communications.total, 2);
        assert_eq!(stats.communications.last_contact, Some(last));
    }

    #[tokio::test]
    async fn statistics_for_empty_venue_are_zeroed() {
        let db = setup_db().await;
        let venue = db
            .venues()
            .create(&draft("Atlantic Bar", "Atlantic City", "NJ"), &[], now())
            .await
            .expect("create");

        let stats = db
            .venues()
            .statistics(venue.id, now())
            .await
            .expect("statistics");
        assert_eq!(stats.bookings, BookingStats::default());
        assert_eq!(stats.rating.average, None);
        assert_eq!(stats.rating.count, 0);
        assert_eq!(stats.communications.total, 0);
        assert_eq!(stats.communications.last_contact, None);
    }

    #[tokio::test]
    async fn statistics_for_missing_venue_is_not_found() {
        let db = setup_db().await;
        let err = db.venues().statistics(9, now()).await.expect_err("missing");
        assert!(matches!(err, VenueError::NotFound));
    }

    #[test]
    fn row_with_unknown_venue_type_fails_to_decode() {
        let row = VenueRow {
            id: 1,
            name: "Rhythm Room".into(),
            address: None,
            city: "Austin".into(),
            state: "TX".into(),
            country: "USA".into(),
            postal_code: None,
            capacity: None,
            website: None,
            phone: None,
            email: None,
            technical_specs: None,
            load_in_notes: None,
            venue_type: "stadium".into(),
            last_contacted_at: None,
            location_lat: None,
            location_lng: None,
            created_at: now(),
            updated_at: now(),
        };
        let err = row.into_domain().expect_err("unknown type");
        assert!(matches!(err, sqlx::Error::Decode(_)));
        assert!(err.to_string().contains("stadium"), "{err}");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("echo"), "%echo%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }
}
