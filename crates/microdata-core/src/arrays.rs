//! Variable arrays keyed by `{variable}/{period}`, the model-ready shape.
//!
//! Every array belongs to an entity. Arrays of the same entity and period are
//! aligned by position, so the set refuses an array whose length disagrees
//! with one already stored for that entity and period.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
  Error, Result, Year,
  stage::ContainerKind,
  table::{Column, Table, TableSet},
};

// ─── Keys ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArrayKey {
  pub variable: String,
  pub period:   Year,
}

impl ArrayKey {
  pub fn new(variable: impl Into<String>, period: Year) -> Self {
    Self { variable: variable.into(), period }
  }

  /// The store path, `{variable}/{period}`.
  pub fn path(&self) -> String { format!("{}/{}", self.variable, self.period) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityArray {
  pub entity: String,
  pub values: Column,
}

// ─── ArraySet ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArraySet {
  arrays:       BTreeMap<ArrayKey, EntityArray>,
  lengths:      BTreeMap<(String, Year), usize>,
  pub metadata: BTreeMap<String, String>,
}

impl ArraySet {
  pub fn new() -> Self { Self::default() }

  /// Insert one array. Text is stored as fixed-width bytes.
  pub fn insert(
    &mut self,
    variable: impl Into<String>,
    period: Year,
    entity: impl Into<String>,
    values: Column,
  ) -> Result<()> {
    let key = ArrayKey::new(variable, period);
    let entity = entity.into();
    let values = values.into_fixed_width();

    let len = values.len();
    if self.has_peers(&key, &entity)
      && let Some(&expected) = self.lengths.get(&(entity.clone(), period))
      && expected != len
    {
      return Err(Error::LengthMismatch { column: key.path(), expected, found: len });
    }

    let previous = self
      .arrays
      .insert(key.clone(), EntityArray { entity: entity.clone(), values });
    // A replaced array may have been the last of its old entity.
    if let Some(previous) = previous
      && previous.entity != entity
      && !self.has_peers(&key, &previous.entity)
    {
      self.lengths.remove(&(previous.entity, period));
    }
    self.lengths.insert((entity, period), len);
    Ok(())
  }

  /// Whether any array other than `key` shares its period and `entity`.
  fn has_peers(&self, key: &ArrayKey, entity: &str) -> bool {
    self
      .arrays
      .iter()
      .any(|(k, a)| k != key && k.period == key.period && a.entity == entity)
  }

  pub fn get(&self, variable: &str, period: Year) -> Option<&EntityArray> {
    self.arrays.get(&ArrayKey::new(variable, period))
  }

  pub fn values(&self, variable: &str, period: Year) -> Result<&Column> {
    self
      .get(variable, period)
      .map(|a| &a.values)
      .ok_or_else(|| Error::UnknownColumn(ArrayKey::new(variable, period).path()))
  }

  pub fn iter(&self) -> impl Iterator<Item = (&ArrayKey, &EntityArray)> {
    self.arrays.iter()
  }

  pub fn len(&self) -> usize { self.arrays.len() }

  pub fn is_empty(&self) -> bool { self.arrays.is_empty() }

  pub fn periods(&self) -> BTreeSet<Year> {
    self.arrays.keys().map(|k| k.period).collect()
  }

  pub fn variables(&self, period: Year) -> Vec<&str> {
    self
      .arrays
      .keys()
      .filter(|k| k.period == period)
      .map(|k| k.variable.as_str())
      .collect()
  }

  /// Every column of every table becomes a variable for `period`, with the
  /// table name as its entity.
  pub fn from_tables(tables: &TableSet, period: Year) -> Result<Self> {
    let mut set = Self::new();
    for (entity, table) in tables.iter() {
      for (name, column) in table.iter() {
        set.insert(name, period, entity, column.clone())?;
      }
    }
    set.metadata = tables.metadata.clone();
    Ok(set)
  }

  /// Regroup the arrays of one period into one table per entity.
  pub fn to_tables(&self, period: Year) -> Result<TableSet> {
    let mut grouped: BTreeMap<&str, Table> = BTreeMap::new();
    for (key, array) in self.arrays.iter().filter(|(k, _)| k.period == period) {
      grouped
        .entry(array.entity.as_str())
        .or_default()
        .insert(key.variable.clone(), array.values.clone())?;
    }
    let mut set = TableSet::new();
    for (entity, table) in grouped {
      set.insert(entity, table);
    }
    set.metadata = self.metadata.clone();
    Ok(set)
  }
}

// ─── Artifact ────────────────────────────────────────────────────────────────

/// What a dataset stage writes for one year.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
  Tables(TableSet),
  Arrays(ArraySet),
}

impl Artifact {
  pub fn container(&self) -> ContainerKind {
    match self {
      Self::Tables(_) => ContainerKind::Columnar,
      Self::Arrays(_) => ContainerKind::Array,
    }
  }

  pub fn metadata(&self) -> &BTreeMap<String, String> {
    match self {
      Self::Tables(t) => &t.metadata,
      Self::Arrays(a) => &a.metadata,
    }
  }

  pub fn metadata_mut(&mut self) -> &mut BTreeMap<String, String> {
    match self {
      Self::Tables(t) => &mut t.metadata,
      Self::Arrays(a) => &mut a.metadata,
    }
  }

  pub fn into_tables(self) -> Result<TableSet> {
    match self {
      Self::Tables(t) => Ok(t),
      Self::Arrays(_) => Err(Error::WrongContainer {
        expected: ContainerKind::Columnar,
        found:    ContainerKind::Array,
      }),
    }
  }

  pub fn into_arrays(self) -> Result<ArraySet> {
    match self {
      Self::Arrays(a) => Ok(a),
      Self::Tables(_) => Err(Error::WrongContainer {
        expected: ContainerKind::Array,
        found:    ContainerKind::Columnar,
      }),
    }
  }
}
