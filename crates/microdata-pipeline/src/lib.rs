//! Survey microdata pipeline: raw extraction, base transforms, donor
//! imputation and model-ready projection.
//!
//! Datasets are registered in a [`Catalog`] as a name, a [`Stage`] and a
//! boxed [`Generator`]. Loading a year that is not stored generates it,
//! recursively pulling whatever upstream years it needs.
//!
//! [`Stage`]: microdata_core::stage::Stage

pub mod aggregate;
pub mod archive;
pub mod council_tax;
pub mod dataset;
pub mod donor;
pub mod error;
pub mod fetch;
pub mod plans;
pub mod project;
pub mod settings;
pub mod surveys;

pub use dataset::{Catalog, Context, Dataset, Generator};
pub use error::{Error, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use settings::PipelineSettings;
pub use surveys::standard_catalog;

#[cfg(test)]
mod tests;
