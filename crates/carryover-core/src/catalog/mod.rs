//! Target schema catalog.
//!
//! The catalog holds the entity types that migrations are allowed to populate
//! or reference.

mod catalog;
mod entity;

pub use catalog::Catalog;
pub use entity::EntityDef;
