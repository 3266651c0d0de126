//! Business rules with no I/O.
pub mod aggregates;
pub mod events;
pub mod value_objects;
