//! Error types for `microdata-core`.

use thiserror::Error;

use crate::{
  stage::{ContainerKind, Stage},
  table::DType,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown column: {0}")]
  UnknownColumn(String),

  #[error("column {0} already exists")]
  DuplicateColumn(String),

  #[error("column {column} has {found} rows, expected {expected}")]
  LengthMismatch {
    column:   String,
    expected: usize,
    found:    usize,
  },

  #[error("column {column} holds {found} values, expected {expected}")]
  ColumnType {
    column:   String,
    expected: &'static str,
    found:    DType,
  },

  #[error("column {column}, row {row}: {value} is not a valid key")]
  InvalidKey {
    column: String,
    row:    usize,
    value:  f64,
  },

  #[error("duplicate key {key} in column {column}")]
  DuplicateKey { column: String, key: i64 },

  #[error("missing table: {0}")]
  MissingTable(String),

  #[error("identifier component {value} does not fit radix {radix}")]
  IdOverflow { value: i64, radix: i64 },

  #[error("expected a {expected} artifact, found {found}")]
  WrongContainer {
    expected: ContainerKind,
    found:    ContainerKind,
  },

  #[error("cannot move from {from} back to {to}")]
  BackwardTransition { from: Stage, to: Stage },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
