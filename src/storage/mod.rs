//! Local persistence: read ids and user preferences in SQLite.

mod error;
mod local;
mod preferences;
mod reads;
mod schema;

pub use error::DatabaseError;
pub use schema::Database;
