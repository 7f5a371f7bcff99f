//! Group-wise reshaping of survey tables.
//!
//! Releases ship many records per entity (jobs, accounts, benefit spells).
//! These helpers collapse them to one row per entity key and attach the
//! result to the parent entity table. Missing values count as zero in sums.
//! Grouped outputs are sorted by key.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, warn};

use microdata_core::table::{Column, DType, Table};

use crate::{Error, Result};

// ─── Grouping ────────────────────────────────────────────────────────────────

/// How a column is collapsed within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduce {
  /// Value of the first record, in table order.
  First,
  /// Sum of the records, missing values counting as zero.
  Sum,
}

/// Row indexes of each key, keys ascending, rows in table order.
fn groups(keys: &[i64]) -> BTreeMap<i64, Vec<usize>> {
  let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
  for (row, &key) in keys.iter().enumerate() {
    groups.entry(key).or_default().push(row);
  }
  groups
}

fn sum_rows(values: &[f64], rows: &[usize]) -> f64 {
  rows.iter().map(|&r| values[r]).filter(|x| !x.is_nan()).sum()
}

/// Collapse `table` to one row per value of `key`, reducing the named
/// columns. The key column comes out as integers.
pub fn group_reduce(table: &Table, key: &str, columns: &[(&str, Reduce)]) -> Result<Table> {
  let groups = groups(&table.keys(key)?);
  let firsts: Vec<usize> = groups.values().map(|rows| rows[0]).collect();

  let mut out = Table::with_rows(groups.len());
  out.insert(key, Column::Int(groups.keys().copied().collect()))?;
  for &(name, reduce) in columns {
    if name == key {
      continue;
    }
    let column = match reduce {
      Reduce::First => table.column(name)?.take(&firsts),
      Reduce::Sum => {
        let values = table.floats(name)?;
        Column::Float(groups.values().map(|rows| sum_rows(&values, rows)).collect())
      }
    };
    out.insert(name, column)?;
  }
  Ok(out)
}

/// Sum every numeric column per key. String columns are dropped.
pub fn sum_by_key(table: &Table, key: &str) -> Result<Table> {
  let columns: Vec<(&str, Reduce)> = table
    .iter()
    .filter(|(_, c)| c.is_numeric())
    .map(|(name, _)| (name, Reduce::Sum))
    .collect();
  group_reduce(table, key, &columns)
}

// ─── Pivot ───────────────────────────────────────────────────────────────────

/// Sum `value` per `(key, category)` and spread categories into columns
/// named `{prefix}{category}`. Only categories that occur get a column; a
/// key without records in a category gets `NaN` there.
pub fn pivot_sum(
  table: &Table,
  key: &str,
  category: &str,
  value: &str,
  prefix: &str,
) -> Result<Table> {
  let keys = table.keys(key)?;
  let categories = table.keys(category)?;
  let values = table.floats(value)?;

  let mut cells: BTreeMap<(i64, i64), f64> = BTreeMap::new();
  for ((&k, &c), &v) in keys.iter().zip(&categories).zip(&values) {
    let cell = cells.entry((k, c)).or_insert(0.0);
    if !v.is_nan() {
      *cell += v;
    }
  }

  let row_keys: Vec<i64> = keys.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
  let seen: BTreeSet<i64> = categories.iter().copied().collect();

  let mut out = Table::with_rows(row_keys.len());
  out.insert(key, Column::Int(row_keys.clone()))?;
  for c in seen {
    let column = row_keys
      .iter()
      .map(|&k| cells.get(&(k, c)).copied().unwrap_or(f64::NAN))
      .collect();
    out.insert(format!("{prefix}{c}"), Column::Float(column))?;
  }
  debug!(key, category, columns = out.n_columns() - 1, "pivoted");
  Ok(out)
}

// ─── Joins ───────────────────────────────────────────────────────────────────

/// Attach `child` columns to `parent` by key. `child` must have at most one
/// row per key. Columns the parent already has are not taken from the child.
/// Parent rows without a child record get missing values; child records
/// without a parent row are dropped with a warning.
pub fn left_join(parent: &mut Table, parent_key: &str, child: &Table, child_key: &str) -> Result<()> {
  let index = child.key_index(child_key)?;
  let parent_keys = parent.keys(parent_key)?;

  let parent_set: HashSet<i64> = parent_keys.iter().copied().collect();
  let orphans = index.keys().filter(|k| !parent_set.contains(k)).count();
  if orphans > 0 {
    warn!(orphans, key = child_key, "child records without a parent row dropped");
  }

  let matches: Vec<Option<usize>> = parent_keys.iter().map(|k| index.get(k).copied()).collect();
  let new_columns: Vec<(String, Column)> = child
    .iter()
    .filter(|(name, _)| *name != child_key && !parent.contains(name))
    .map(|(name, column)| (name.to_owned(), take_optional(column, &matches)))
    .collect();
  for (name, column) in new_columns {
    parent.insert(name, column)?;
  }
  Ok(())
}

fn take_optional(column: &Column, rows: &[Option<usize>]) -> Column {
  match column {
    Column::Float(v) => Column::Float(rows.iter().map(|r| r.map_or(f64::NAN, |r| v[r])).collect()),
    Column::Int(v) => Column::Int(rows.iter().map(|r| r.map_or(0, |r| v[r])).collect()),
    Column::Text(v) => Column::Text(rows.iter().map(|r| r.map_or_else(String::new, |r| v[r].clone())).collect()),
    Column::Fixed { .. } => {
      let strings = column.to_strings().unwrap_or_default();
      let taken: Vec<String> = rows
        .iter()
        .map(|r| r.map_or_else(String::new, |r| strings[r].clone()))
        .collect();
      Column::fixed_from_strings(&taken)
    }
  }
}

/// Rows of `a` followed by rows of `b`. Columns present in only one table
/// are filled with missing values for the other's rows.
pub fn stack(a: &Table, b: &Table) -> Result<Table> {
  let mut names: Vec<&str> = a.names().collect();
  names.extend(b.names().filter(|n| !a.contains(n)));

  let mut out = Table::with_rows(a.n_rows() + b.n_rows());
  for name in names {
    let dtype = a
      .column(name)
      .or_else(|_| b.column(name))
      .map(Column::dtype)?;
    let mut column = match a.column(name) {
      Ok(c) => c.clone(),
      Err(_) => Column::missing(widen(dtype), a.n_rows()),
    };
    match b.column(name) {
      Ok(c) => column.append(c, name)?,
      Err(_) => column.append(&Column::missing(column.dtype(), b.n_rows()), name)?,
    }
    out.insert(name, column)?;
  }
  Ok(out)
}

/// Missing integers cannot be represented, so a column absent from the
/// first table is built as floats when the second holds integers.
fn widen(dtype: DType) -> DType {
  match dtype {
    DType::Int => DType::Float,
    other => other,
  }
}

/// Reorder rows so `key` ascends.
pub fn sort_by_key(table: &Table, key: &str) -> Result<Table> {
  let keys = table.keys(key)?;
  let mut order: Vec<usize> = (0..keys.len()).collect();
  order.sort_by_key(|&r| keys[r]);
  Ok(table.take_rows(&order))
}

// ─── Category remapping ──────────────────────────────────────────────────────

/// Split a category code that conflates two programmes. Records whose code
/// is in `codes` and whose flag is in `flags` move to `code + offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRemap {
  pub codes:  Vec<i64>,
  pub flags:  Vec<i64>,
  pub offset: i64,
}

impl CategoryRemap {
  /// Rewrite `category` in place; returns the number of records moved.
  pub fn apply(&self, table: &mut Table, category: &str, flag: &str) -> Result<usize> {
    let mut codes = table.floats(category)?;
    let flags = table.floats(flag)?;
    let hit = |x: f64, set: &[i64]| x.is_finite() && x.fract() == 0.0 && set.contains(&(x as i64));

    let mut moved = 0;
    for (code, &f) in codes.iter_mut().zip(&flags) {
      if hit(*code, &self.codes) && hit(f, &self.flags) {
        *code += self.offset as f64;
        moved += 1;
      }
    }
    table.insert(category, Column::Float(codes))?;
    debug!(category, moved, "category codes remapped");
    Ok(moved)
  }
}

// ─── Weights ─────────────────────────────────────────────────────────────────

/// Replace missing or negative weights with the mean of the valid ones.
pub fn resolve_weights(weights: &[f64]) -> Result<Vec<f64>> {
  let valid: Vec<f64> = weights.iter().copied().filter(|w| w.is_finite() && *w >= 0.0).collect();
  if valid.is_empty() {
    if weights.is_empty() {
      return Ok(Vec::new());
    }
    return Err(Error::Layout("no valid weights to derive a placeholder from".into()));
  }
  let placeholder = valid.iter().sum::<f64>() / valid.len() as f64;
  let replaced = weights.len() - valid.len();
  if replaced > 0 {
    warn!(replaced, placeholder, "missing weights replaced");
  }
  Ok(
    weights
      .iter()
      .map(|&w| if w.is_finite() && w >= 0.0 { w } else { placeholder })
      .collect(),
  )
}
