//! Error types for the flat-file codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("file has no header line")]
  MissingHeader,

  #[error("duplicate column in header: {0}")]
  DuplicateColumn(String),

  #[error("line {line}: expected {expected} fields, found {found}")]
  RaggedRow {
    line:     usize,
    expected: usize,
    found:    usize,
  },

  #[error("line {line}: unterminated quoted field")]
  UnterminatedQuote { line: usize },

  #[error(transparent)]
  Table(#[from] microdata_core::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
