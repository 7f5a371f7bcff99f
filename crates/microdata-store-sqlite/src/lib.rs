//! SQLite backend for the microdata table store.
//!
//! Each dataset year is one SQLite file. Raw tables use the columnar schema,
//! base and model-ready arrays the array schema. Files are written to a
//! temporary sibling and renamed into place once complete.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{ArtifactInfo, SqliteStore};
