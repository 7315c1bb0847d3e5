pub mod error;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use schema::{SchemaUpgrade, SCHEMA_VERSION};
pub use sqlite::SqliteStorage;
pub use traits::*;
