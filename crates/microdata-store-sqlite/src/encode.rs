//! Encoding and decoding helpers between columns and the BLOBs stored in
//! SQLite.
//!
//! Numeric columns are stored as packed little-endian values. Variable-length
//! strings are stored as a compact JSON array. Fixed-width strings are stored
//! as their raw bytes with the element width in its own column. Timestamps
//! are RFC 3339 strings.

use std::str::FromStr as _;

use chrono::{DateTime, Utc};
use microdata_core::table::{Column, DType};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Column ──────────────────────────────────────────────────────────────────

/// A column ready to bind: type tag, element width and payload.
pub struct EncodedColumn {
  pub dtype:  &'static str,
  pub width:  Option<i64>,
  pub n_rows: i64,
  pub data:   Vec<u8>,
}

pub fn encode_column(column: &Column) -> Result<EncodedColumn> {
  let (width, data) = match column {
    Column::Float(v) => (None, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
    Column::Int(v) => (None, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
    Column::Text(v) => (None, serde_json::to_vec(v)?),
    Column::Fixed { width, bytes } => (Some(*width as i64), bytes.clone()),
  };
  Ok(EncodedColumn {
    dtype: column.dtype().into(),
    width,
    n_rows: column.len() as i64,
    data,
  })
}

fn corrupt(name: &str, detail: impl Into<String>) -> Error {
  Error::CorruptBlob { name: name.to_owned(), detail: detail.into() }
}

fn unpack<T, const N: usize>(
  name: &str,
  n_rows: usize,
  data: &[u8],
  from: fn([u8; N]) -> T,
) -> Result<Vec<T>> {
  if data.len() != n_rows * N {
    return Err(corrupt(
      name,
      format!("{} bytes for {n_rows} values of {N} bytes", data.len()),
    ));
  }
  Ok(
    data
      .chunks_exact(N)
      .map(|chunk| {
        let mut buf = [0u8; N];
        buf.copy_from_slice(chunk);
        from(buf)
      })
      .collect(),
  )
}

// ─── Raw row types ───────────────────────────────────────────────────────────

/// Flat row from the `columns` or `arrays` table.
pub struct RawColumn {
  pub name:   String,
  pub dtype:  String,
  pub width:  Option<i64>,
  pub n_rows: i64,
  pub data:   Vec<u8>,
}

impl RawColumn {
  pub fn into_column(self) -> Result<Column> {
    let dtype = DType::from_str(&self.dtype)
      .map_err(|_| Error::UnsupportedDType(self.dtype.clone()))?;
    let n_rows = usize::try_from(self.n_rows)
      .map_err(|_| corrupt(&self.name, format!("row count {}", self.n_rows)))?;
    let name = self.name.as_str();

    let column = match dtype {
      DType::Float => Column::Float(unpack(name, n_rows, &self.data, f64::from_le_bytes)?),
      DType::Int => Column::Int(unpack(name, n_rows, &self.data, i64::from_le_bytes)?),
      DType::Text => {
        let values: Vec<String> = serde_json::from_slice(&self.data)?;
        if values.len() != n_rows {
          return Err(corrupt(name, format!("{} strings, expected {n_rows}", values.len())));
        }
        Column::Text(values)
      }
      DType::Fixed => {
        let width = self
          .width
          .and_then(|w| usize::try_from(w).ok())
          .filter(|&w| w > 0)
          .ok_or_else(|| corrupt(name, "fixed-width column without a width"))?;
        if self.data.len() != width * n_rows {
          return Err(corrupt(
            name,
            format!("{} bytes for {n_rows} values of width {width}", self.data.len()),
          ));
        }
        Column::Fixed { width, bytes: self.data }
      }
    };
    Ok(column)
  }
}
