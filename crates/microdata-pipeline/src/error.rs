//! Error type for `microdata-pipeline`.

use microdata_core::{Year, stage::Stage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{dataset} has no {stage} data for {year} and nothing to build it from")]
  NotFound {
    dataset: String,
    year:    Year,
    stage:   Stage,
  },

  #[error("unknown dataset: {0}")]
  UnknownDataset(String),

  #[error("{dataset} {year} ({stage}): unexpected input layout: {detail}")]
  Format {
    dataset: String,
    year:    Year,
    stage:   Stage,
    detail:  String,
  },

  #[error("{dataset} {year} ({stage}): missing dependency {dependency}")]
  MissingDependency {
    dataset:    String,
    year:       Year,
    stage:      Stage,
    dependency: String,
    #[source]
    source:     Option<Box<Error>>,
  },

  #[error("covariates {found:?} do not match {expected:?}")]
  SchemaMismatch {
    expected: Vec<String>,
    found:    Vec<String>,
  },

  #[error("calibration failed: {0}")]
  Calibration(String),

  #[error("{dataset} {year} ({stage}): generation failed")]
  Generation {
    dataset: String,
    year:    Year,
    stage:   Stage,
    #[source]
    source:  Box<Error>,
  },

  #[error("download of {url} failed with HTTP status {status}")]
  Download { url: String, status: u16 },

  /// Input did not have the expected shape. Raised inside generators and
  /// reported by the catalog as [`Error::Format`].
  #[error("unexpected input layout: {0}")]
  Layout(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("table error: {0}")]
  Table(#[from] microdata_core::Error),

  #[error("flat file error: {0}")]
  FlatFile(#[from] microdata_flatfile::Error),

  #[error("archive error: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("settings error: {0}")]
  Settings(#[from] toml::de::Error),
}

impl Error {
  pub(crate) fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(err))
  }

  /// The innermost pipeline error, following generation and dependency
  /// wrappers.
  pub fn root(&self) -> &Error {
    match self {
      Self::Generation { source, .. } => source.root(),
      Self::MissingDependency { source: Some(source), .. } => source.root(),
      other => other,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
