//! Delimited flat-file reader for survey releases.
//!
//! Reads tab- or comma-delimited text into [`microdata_core`] tables. Every
//! field is coerced to a number; tokens that are empty or not numeric become
//! missing (`NaN`). Pure synchronous; no IO.
//!
//! # Quick start
//!
//! ```no_run
//! use microdata_flatfile::{ParseOptions, parse};
//!
//! let text = "sernum\tBENUNIT\tPERSON\n1\t1\t1\n1\t1\t2\n";
//! let table = parse(text, &ParseOptions::tab()).unwrap();
//! assert_eq!(table.n_rows(), 2);
//! ```

pub mod error;
mod parse;

pub use error::{Error, Result};
use microdata_core::table::Table;

// ─── Options ─────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Delimiter {
  #[default]
  Tab,
  Comma,
}

impl Delimiter {
  pub fn as_char(self) -> char {
    match self {
      Self::Tab => '\t',
      Self::Comma => ',',
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
  pub delimiter:         Delimiter,
  /// Upper-case every header name.
  pub uppercase_headers: bool,
}

impl ParseOptions {
  pub fn tab() -> Self { Self { delimiter: Delimiter::Tab, ..Self::default() } }

  pub fn csv() -> Self {
    Self { delimiter: Delimiter::Comma, ..Self::default() }
  }

  pub fn uppercase_headers(mut self) -> Self {
    self.uppercase_headers = true;
    self
  }
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Parse one delimited file. The first non-empty line is the header; every
/// column is a float column.
pub fn parse(input: &str, options: &ParseOptions) -> Result<Table> {
  parse::parse_table(input, options)
}

