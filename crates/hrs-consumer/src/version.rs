//! Optimistic version comparators.
//!
//! Create/update applies only on a strictly greater incoming version;
//! delete also applies on an equal version. The asymmetry is inherited
//! from the source system and is pinned by tests; do not unify the two
//! without revisiting the requirements.

pub fn update_applies(incoming: i64, stored: i64) -> bool {
    incoming > stored
}

pub fn delete_applies(incoming: i64, stored: i64) -> bool {
    incoming >= stored
}
