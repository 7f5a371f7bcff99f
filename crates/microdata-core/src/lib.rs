//! Core types and trait definitions for the survey microdata pipeline.
//!
//! This crate is deliberately free of IO, HTTP and database dependencies.
//! Every other crate depends on it; it depends on nothing of theirs.

pub mod arrays;
pub mod error;
pub mod ids;
pub mod stage;
pub mod store;
pub mod table;
pub mod uprating;

pub use error::{Error, Result};
pub use stage::Year;
