//! Columnar tables, the unit of exchange between pipeline stages.
//!
//! Numeric survey fields are held as `f64` with `NaN` marking a missing
//! value, which is the shape every raw release takes once coerced. Keys and
//! identifiers are held as `i64`. String categories are either owned
//! `String`s or fixed-width byte strings, the latter being the only string
//! form the array container accepts.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{Error, Result};

// ─── Column ──────────────────────────────────────────────────────────────────

/// Storage type of a [`Column`]. The string form is what the store records.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
  strum::IntoStaticStr,
)]
pub enum DType {
  #[strum(serialize = "f64")]
  Float,
  #[strum(serialize = "i64")]
  Int,
  #[strum(serialize = "utf8")]
  Text,
  #[strum(serialize = "bytes")]
  Fixed,
}

/// One named array of a [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
  Float(Vec<f64>),
  Int(Vec<i64>),
  Text(Vec<String>),
  /// Fixed-width byte strings, NUL-padded to `width` bytes per element.
  Fixed { width: usize, bytes: Vec<u8> },
}

impl Column {
  pub fn len(&self) -> usize {
    match self {
      Self::Float(v) => v.len(),
      Self::Int(v) => v.len(),
      Self::Text(v) => v.len(),
      Self::Fixed { width, bytes } => {
        if *width == 0 {
          0
        } else {
          bytes.len() / width
        }
      }
    }
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  pub fn dtype(&self) -> DType {
    match self {
      Self::Float(_) => DType::Float,
      Self::Int(_) => DType::Int,
      Self::Text(_) => DType::Text,
      Self::Fixed { .. } => DType::Fixed,
    }
  }

  pub fn is_numeric(&self) -> bool {
    matches!(self, Self::Float(_) | Self::Int(_))
  }

  /// Numeric view of the column; integers are widened. `None` for strings.
  pub fn to_f64(&self) -> Option<Vec<f64>> {
    match self {
      Self::Float(v) => Some(v.clone()),
      Self::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
      _ => None,
    }
  }

  /// String view of the column. Fixed-width values lose their NUL padding.
  pub fn to_strings(&self) -> Option<Vec<String>> {
    match self {
      Self::Text(v) => Some(v.clone()),
      Self::Fixed { width, bytes } if *width > 0 => Some(
        bytes
          .chunks(*width)
          .map(|chunk| {
            let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
            String::from_utf8_lossy(&chunk[..end]).into_owned()
          })
          .collect(),
      ),
      Self::Fixed { .. } => Some(Vec::new()),
      _ => None,
    }
  }

  /// Build a fixed-width column from strings. The width is the longest
  /// value in bytes (at least one).
  pub fn fixed_from_strings<S: AsRef<str>>(values: &[S]) -> Column {
    let width = values
      .iter()
      .map(|s| s.as_ref().len())
      .max()
      .unwrap_or(0)
      .max(1);
    let mut bytes = vec![0u8; width * values.len()];
    for (i, s) in values.iter().enumerate() {
      let s = s.as_ref().as_bytes();
      bytes[i * width..i * width + s.len()].copy_from_slice(s);
    }
    Column::Fixed { width, bytes }
  }

  /// Text columns become fixed-width; every other column is returned as is.
  pub fn into_fixed_width(self) -> Column {
    match self {
      Self::Text(v) => Self::fixed_from_strings(&v),
      other => other,
    }
  }

  /// Select rows by position, in the order given.
  pub fn take(&self, rows: &[usize]) -> Column {
    match self {
      Self::Float(v) => Self::Float(rows.iter().map(|&r| v[r]).collect()),
      Self::Int(v) => Self::Int(rows.iter().map(|&r| v[r]).collect()),
      Self::Text(v) => Self::Text(rows.iter().map(|&r| v[r].clone()).collect()),
      Self::Fixed { width, bytes } => {
        let mut out = Vec::with_capacity(rows.len() * width);
        for &r in rows {
          out.extend_from_slice(&bytes[r * width..(r + 1) * width]);
        }
        Self::Fixed { width: *width, bytes: out }
      }
    }
  }

  /// A column of `rows` missing values of the same type.
  pub fn missing(dtype: DType, rows: usize) -> Column {
    match dtype {
      DType::Float => Self::Float(vec![f64::NAN; rows]),
      DType::Int => Self::Int(vec![0; rows]),
      DType::Text => Self::Text(vec![String::new(); rows]),
      DType::Fixed => Self::Fixed { width: 1, bytes: vec![0; rows] },
    }
  }

  /// Append another column of the same type.
  pub fn append(&mut self, other: &Column, name: &str) -> Result<()> {
    match (self, other) {
      (Self::Float(a), Self::Float(b)) => a.extend_from_slice(b),
      (Self::Float(a), Self::Int(b)) => a.extend(b.iter().map(|&x| x as f64)),
      (Self::Int(a), Self::Int(b)) => a.extend_from_slice(b),
      (Self::Text(a), Self::Text(b)) => a.extend_from_slice(b),
      (this @ Self::Fixed { .. }, other @ Self::Fixed { .. }) => {
        let mut values = this.to_strings().unwrap_or_default();
        values.extend(other.to_strings().unwrap_or_default());
        *this = Self::fixed_from_strings(&values);
      }
      (this, other) => {
        return Err(Error::ColumnType {
          column:   name.to_owned(),
          expected: this.dtype().into(),
          found:    other.dtype(),
        });
      }
    }
    Ok(())
  }

  /// Number of distinct values. `NaN`s count as one value.
  pub fn distinct_count(&self) -> usize {
    match self {
      Self::Float(v) => v
        .iter()
        .map(|x| if x.is_nan() { f64::NAN.to_bits() } else { x.to_bits() })
        .collect::<HashSet<_>>()
        .len(),
      Self::Int(v) => v.iter().collect::<HashSet<_>>().len(),
      Self::Text(v) => v.iter().collect::<HashSet<_>>().len(),
      Self::Fixed { width, bytes } if *width > 0 => {
        bytes.chunks(*width).collect::<HashSet<_>>().len()
      }
      Self::Fixed { .. } => 0,
    }
  }
}

// ─── Table ───────────────────────────────────────────────────────────────────

/// A set of equal-length named columns. Column names are kept sorted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
  rows:    usize,
  columns: BTreeMap<String, Column>,
}

impl Table {
  pub fn new() -> Self { Self::default() }

  /// An empty table that will only accept columns of `rows` rows.
  pub fn with_rows(rows: usize) -> Self {
    Self { rows, columns: BTreeMap::new() }
  }

  pub fn n_rows(&self) -> usize { self.rows }

  pub fn n_columns(&self) -> usize { self.columns.len() }

  pub fn is_empty(&self) -> bool { self.rows == 0 }

  /// Insert or replace a column. The first column of a table created with
  /// [`Table::new`] fixes its row count.
  pub fn insert(
    &mut self,
    name: impl Into<String>,
    column: Column,
  ) -> Result<Option<Column>> {
    let name = name.into();
    if self.columns.is_empty() && self.rows == 0 {
      self.rows = column.len();
    } else if column.len() != self.rows {
      return Err(Error::LengthMismatch {
        column:   name,
        expected: self.rows,
        found:    column.len(),
      });
    }
    Ok(self.columns.insert(name, column))
  }

  /// Builder form of [`Table::insert`].
  pub fn with(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
    self.insert(name, column)?;
    Ok(self)
  }

  pub fn contains(&self, name: &str) -> bool { self.columns.contains_key(name) }

  pub fn column(&self, name: &str) -> Result<&Column> {
    self
      .columns
      .get(name)
      .ok_or_else(|| Error::UnknownColumn(name.to_owned()))
  }

  /// A numeric column as `f64`.
  pub fn floats(&self, name: &str) -> Result<Vec<f64>> {
    let column = self.column(name)?;
    column.to_f64().ok_or_else(|| Error::ColumnType {
      column:   name.to_owned(),
      expected: "numeric",
      found:    column.dtype(),
    })
  }

  /// A numeric column as integer keys. Float values must be finite and
  /// integral.
  pub fn keys(&self, name: &str) -> Result<Vec<i64>> {
    match self.column(name)? {
      Column::Int(v) => Ok(v.clone()),
      Column::Float(v) => v
        .iter()
        .enumerate()
        .map(|(row, &value)| {
          if value.is_finite() && value.fract() == 0.0 {
            Ok(value as i64)
          } else {
            Err(Error::InvalidKey { column: name.to_owned(), row, value })
          }
        })
        .collect(),
      other => Err(Error::ColumnType {
        column:   name.to_owned(),
        expected: "numeric",
        found:    other.dtype(),
      }),
    }
  }

  /// Row index of every key in `name`; keys must be unique.
  pub fn key_index(&self, name: &str) -> Result<HashMap<i64, usize>> {
    let keys = self.keys(name)?;
    let mut index = HashMap::with_capacity(keys.len());
    for (row, key) in keys.into_iter().enumerate() {
      if index.insert(key, row).is_some() {
        return Err(Error::DuplicateKey { column: name.to_owned(), key });
      }
    }
    Ok(index)
  }

  pub fn remove(&mut self, name: &str) -> Option<Column> {
    self.columns.remove(name)
  }

  /// Rename a column. An existing column is never overwritten.
  pub fn rename(&mut self, from: &str, to: impl Into<String>) -> Result<()> {
    let to = to.into();
    if !self.columns.contains_key(from) {
      return Err(Error::UnknownColumn(from.to_owned()));
    }
    if to != from && self.columns.contains_key(&to) {
      return Err(Error::DuplicateColumn(to));
    }
    if let Some(column) = self.columns.remove(from) {
      self.columns.insert(to, column);
    }
    Ok(())
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.columns.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
    self.columns.iter().map(|(k, v)| (k.as_str(), v))
  }

  /// A new table holding the given rows, in the order given.
  pub fn take_rows(&self, rows: &[usize]) -> Table {
    Table {
      rows:    rows.len(),
      columns: self
        .columns
        .iter()
        .map(|(k, v)| (k.clone(), v.take(rows)))
        .collect(),
    }
  }

  /// Prefix every column name.
  pub fn prefixed(self, prefix: &str) -> Table {
    Table {
      rows:    self.rows,
      columns: self
        .columns
        .into_iter()
        .map(|(k, v)| (format!("{prefix}{k}"), v))
        .collect(),
    }
  }

  /// Replace `NaN` with `value` in every float column.
  pub fn fill_missing(&mut self, value: f64) {
    for column in self.columns.values_mut() {
      if let Column::Float(v) = column {
        v.iter_mut().filter(|x| x.is_nan()).for_each(|x| *x = value);
      }
    }
  }
}

// ─── TableSet ────────────────────────────────────────────────────────────────

/// Named tables for one dataset and year, plus free-form string metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSet {
  tables:       BTreeMap<String, Table>,
  pub metadata: BTreeMap<String, String>,
}

impl TableSet {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, name: impl Into<String>, table: Table) -> Option<Table> {
    self.tables.insert(name.into(), table)
  }

  pub fn contains(&self, name: &str) -> bool { self.tables.contains_key(name) }

  pub fn get(&self, name: &str) -> Result<&Table> {
    self
      .tables
      .get(name)
      .ok_or_else(|| Error::MissingTable(name.to_owned()))
  }

  pub fn get_mut(&mut self, name: &str) -> Result<&mut Table> {
    self
      .tables
      .get_mut(name)
      .ok_or_else(|| Error::MissingTable(name.to_owned()))
  }

  /// Remove and return a table.
  pub fn take(&mut self, name: &str) -> Result<Table> {
    self
      .tables
      .remove(name)
      .ok_or_else(|| Error::MissingTable(name.to_owned()))
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.tables.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Table)> {
    self.tables.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn len(&self) -> usize { self.tables.len() }

  pub fn is_empty(&self) -> bool { self.tables.is_empty() }
}
