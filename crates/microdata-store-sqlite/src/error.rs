//! Error type for `microdata-store-sqlite`.

use std::path::PathBuf;

use microdata_core::stage::ContainerKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] microdata_core::Error),

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("could not move finished artifact into place: {0}")]
  Persist(#[from] tempfile::PersistError),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("{path}: expected a {expected} container, found {found}")]
  ContainerMismatch {
    path:     PathBuf,
    expected: ContainerKind,
    found:    String,
  },

  #[error("{path}: missing metadata key {key}")]
  MissingMeta { path: PathBuf, key: &'static str },

  #[error("unsupported column type: {0}")]
  UnsupportedDType(String),

  #[error("corrupt data for {name}: {detail}")]
  CorruptBlob { name: String, detail: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
