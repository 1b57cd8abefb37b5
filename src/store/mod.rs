//! Persistence layer: append-only outcome log on libSQL.

pub mod libsql_backend;
pub(crate) mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::OutcomeStore;
