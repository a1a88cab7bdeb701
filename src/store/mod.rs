//! Persistence layer: libSQL-backed checkpoints and profile entries.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    CheckpointStore, Namespace, ProfileEntry, ProfileFilter, ProfileStore, ProfileType,
};
