//! SQLite backend for the Zero Network Panel order and wallet engine.
//!
//! [`SqliteDatabase`] implements every trait in [`crate::traits`]. The low-level queries it composes into atomic
//! transactions live in [`db`].
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
