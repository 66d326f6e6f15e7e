//! Domain types shared between the tribuna database and API crates.

pub mod model;
pub mod pagination;
