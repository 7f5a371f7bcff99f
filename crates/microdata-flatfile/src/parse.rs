//! Delimited-text parser.
//!
//! Pipeline:
//!   raw &str
//!     └─ logical_lines()  → (line number, &str), CR stripped, blanks skipped
//!          └─ split_fields() → Vec<String>, quotes honoured
//!               └─ coerce()      → f64, NaN when not numeric

use std::collections::HashSet;

use microdata_core::table::{Column, Table};

use crate::{
  Delimiter, ParseOptions,
  error::{Error, Result},
};

// ─── Low-level helpers ───────────────────────────────────────────────────────

/// Non-empty lines with their 1-based line numbers. Tolerates CRLF endings.
fn logical_lines(s: &str) -> impl Iterator<Item = (usize, &str)> {
  s.split('\n')
    .enumerate()
    .map(|(i, raw)| (i + 1, raw.strip_suffix('\r').unwrap_or(raw)))
    .filter(|(_, line)| !line.trim().is_empty())
}

/// Split on `delimiter` while respecting double-quoted fields. A doubled
/// quote inside a quoted field is a literal quote.
pub(crate) fn split_fields(
  line: &str,
  delimiter: char,
  line_no: usize,
) -> Result<Vec<String>> {
  let mut fields = Vec::new();
  let mut current = String::new();
  let mut in_quotes = false;
  let mut chars = line.chars().peekable();

  while let Some(c) = chars.next() {
    match c {
      '"' if in_quotes && chars.peek() == Some(&'"') => {
        current.push('"');
        chars.next();
      }
      '"' => in_quotes = !in_quotes,
      c if c == delimiter && !in_quotes => {
        fields.push(std::mem::take(&mut current));
      }
      c => current.push(c),
    }
  }
  if in_quotes {
    return Err(Error::UnterminatedQuote { line: line_no });
  }
  fields.push(current);
  Ok(fields)
}

/// Numeric coercion. Anything that does not parse is missing.
fn coerce(token: &str) -> f64 {
  token.trim().parse::<f64>().unwrap_or(f64::NAN)
}

// ─── Table parser ────────────────────────────────────────────────────────────

pub(crate) fn parse_table(input: &str, options: &ParseOptions) -> Result<Table> {
  let delimiter = options.delimiter.as_char();
  let mut lines = logical_lines(input);

  let (header_line, header) = lines.next().ok_or(Error::MissingHeader)?;
  let names: Vec<String> = split_fields(header, delimiter, header_line)?
    .into_iter()
    .map(|name| {
      let name = name.trim();
      if options.uppercase_headers {
        name.to_uppercase()
      } else {
        name.to_owned()
      }
    })
    .collect();

  let mut seen = HashSet::new();
  for name in &names {
    if !seen.insert(name.as_str()) {
      return Err(Error::DuplicateColumn(name.clone()));
    }
  }

  let mut values: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
  for (line_no, line) in lines {
    let fields = split_fields(line, delimiter, line_no)?;
    // Tab exports often end every row with a trailing delimiter.
    let found = match (fields.len(), options.delimiter) {
      (n, Delimiter::Tab)
        if n == names.len() + 1 && fields.last().is_some_and(|f| f.is_empty()) =>
      {
        names.len()
      }
      (n, _) => n,
    };
    if found != names.len() {
      return Err(Error::RaggedRow {
        line: line_no,
        expected: names.len(),
        found,
      });
    }
    for (column, field) in values.iter_mut().zip(&fields) {
      column.push(coerce(field));
    }
  }

  let rows = values.first().map_or(0, Vec::len);
  let mut table = Table::with_rows(rows);
  for (name, column) in names.into_iter().zip(values) {
    table.insert(name, Column::Float(column))?;
  }
  Ok(table)
}
