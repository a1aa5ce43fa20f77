//! UUID v7 utilities for time-ordered identifiers.
//!
//! Every row id (notes, entities, relationships, jobs) and every request id is
//! a UUIDv7, so ids sort by creation time.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Check whether a UUID is version 7.
#[inline]
pub fn is_v7(id: &Uuid) -> bool {
    id.get_version_num() == 7
}
