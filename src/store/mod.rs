//! The durable event/decision store.

pub mod error;
pub mod sqlite;

pub use error::StoreError;
pub use sqlite::{ChildMirrorRow, SqliteStore};
