//! The `TableStore` trait: year-stamped artifact storage.
//!
//! Implemented by storage backends (e.g. `microdata-store-sqlite`). The
//! pipeline depends on this abstraction, not on any concrete backend.

use std::collections::BTreeSet;

use crate::{
  Year,
  arrays::Artifact,
  stage::DatasetSpec,
};

/// One artifact per dataset and year. Writes replace the whole artifact;
/// there is no partial update.
pub trait TableStore {
  type Error: std::error::Error + Send + Sync + 'static;

  fn exists(&self, dataset: &DatasetSpec, year: Year) -> Result<bool, Self::Error>;

  /// Persist an artifact, replacing any previous one for the year. A failed
  /// write leaves the previous artifact (or nothing) in place.
  fn write(
    &self,
    dataset: &DatasetSpec,
    year: Year,
    artifact: &Artifact,
  ) -> Result<(), Self::Error>;

  /// Read an artifact. Returns `None` if no artifact exists for the year.
  fn read(
    &self,
    dataset: &DatasetSpec,
    year: Year,
  ) -> Result<Option<Artifact>, Self::Error>;

  /// Remove one year, or every year when `year` is `None`. Returns the
  /// number of artifacts removed.
  fn remove(
    &self,
    dataset: &DatasetSpec,
    year: Option<Year>,
  ) -> Result<usize, Self::Error>;

  fn list_years(&self, dataset: &DatasetSpec) -> Result<BTreeSet<Year>, Self::Error>;
}
