//! Repository layer: the narrow persistence interface the view layer talks
//! to, backed by SQLite through sqlx.

pub mod client;
mod record;
