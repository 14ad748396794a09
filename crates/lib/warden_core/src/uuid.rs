//! Identifier generation for auth records.
//!
//! Users, identities, platforms, projects and memberships all get app-side
//! UUIDv7 ids so that "earliest identity" ordering and default-platform
//! lookup agree with insertion order even when timestamps collide.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// A fresh record id in its canonical hyphenated text form.
pub fn new_id() -> String {
    uuidv7().to_string()
}
