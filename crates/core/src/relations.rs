//! Associations owned by a venue.
//!
//! Every child table references `venues.id` through a `venue_id` column and
//! is removed together with its venue.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToMany,
}

/// Describes how a child collection hangs off its parent venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    /// Name of the association as exposed on the venue.
    pub name: &'static str,
    pub table: &'static str,
    pub foreign_key: &'static str,
    pub cardinality: Cardinality,
}

const fn has_many(name: &'static str, table: &'static str) -> Relation {
    Relation {
        name,
        table,
        foreign_key: "venue_id",
        cardinality: Cardinality::OneToMany,
    }
}

pub const CONTACTS: Relation = has_many("contacts", "venue_contacts");
pub const RATINGS: Relation = has_many("ratings", "venue_ratings");
pub const BOOKINGS: Relation = has_many("bookings", "bookings");
pub const COMMUNICATIONS: Relation = has_many("communications", "communications");
pub const DOCUMENTS: Relation = has_many("documents", "documents");
pub const REMINDERS: Relation = has_many("reminders", "reminders");

pub const VENUE_RELATIONS: [Relation; 6] = [
    CONTACTS,
    RATINGS,
    BOOKINGS,
    COMMUNICATIONS,
    DOCUMENTS,
    REMINDERS,
];
