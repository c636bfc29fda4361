//! Persistence: relation rows, the ticket catalog, history and runtime
//! config, all in one `SQLite` database.

pub mod events;
pub mod relations;
pub mod schema;
pub mod sqlite;
pub mod tickets;

pub use relations::{Direction, RelationCriteria};
pub use sqlite::{MutationContext, SqliteStorage};
