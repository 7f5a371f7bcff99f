//! Model-ready projection of base arrays.
//!
//! A [`ProjectionPlan`] names every variable the simulation engine expects,
//! which entity it belongs to and how to derive it from base arrays. The
//! projector evaluates each variable once for the base year and writes it
//! for every requested period, uprating monetary variables by their growth
//! index series.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use microdata_core::{Year, arrays::ArraySet, table::Column, uprating::GrowthIndex};

use crate::{Error, Result};

// ─── Plan ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPlan {
  #[serde(default)]
  pub variables: Vec<VariableSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
  pub name:     String,
  pub entity:   String,
  pub source:   Source,
  /// Multiplier applied before uprating, e.g. weekly to annual.
  #[serde(default = "unit_scale")]
  pub scale:    f64,
  /// Growth index series to uprate by; `None` keeps the base value.
  #[serde(default)]
  pub uprating: Option<String>,
  #[serde(default)]
  pub encoding: Encoding,
}

fn unit_scale() -> f64 { 1.0 }

/// Where a variable's base values come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
  /// One base array, which must exist.
  Column(String),
  /// Sum of base arrays; absent arrays and missing values count as zero.
  SumOf(Vec<String>),
  /// Sum of every array of the entity whose name starts with the prefix,
  /// as produced by a pivot.
  Prefix(String),
  /// Integer category codes looked up in a table.
  Map {
    column:  String,
    values:  BTreeMap<String, f64>,
    #[serde(default)]
    default: f64,
  },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
  #[default]
  Float,
  Int,
  FixedWidth,
}

impl VariableSpec {
  pub fn new(name: &str, entity: &str, source: Source) -> Self {
    Self {
      name: name.to_owned(),
      entity: entity.to_owned(),
      source,
      scale: 1.0,
      uprating: None,
      encoding: Encoding::Float,
    }
  }

  pub fn scaled(mut self, scale: f64) -> Self {
    self.scale = scale;
    self
  }

  pub fn uprated(mut self, series: &str) -> Self {
    self.uprating = Some(series.to_owned());
    self
  }

  pub fn encoded(mut self, encoding: Encoding) -> Self {
    self.encoding = encoding;
    self
  }
}

/// A variable copied unchanged, as integers. Used for identifiers.
pub fn id(name: &str, entity: &str, column: &str) -> VariableSpec {
  VariableSpec::new(name, entity, Source::Column(column.to_owned())).encoded(Encoding::Int)
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

/// Base values of one variable, before uprating.
enum Values {
  Numbers(Vec<f64>),
  Strings(Vec<String>),
}

fn entity_rows(base: &ArraySet, entity: &str, year: Year) -> Result<usize> {
  base
    .iter()
    .find(|(k, a)| k.period == year && a.entity == entity)
    .map(|(_, a)| a.values.len())
    .ok_or_else(|| Error::Layout(format!("no {entity} arrays for {year}")))
}

fn numbers(base: &ArraySet, column: &str, year: Year) -> Result<Vec<f64>> {
  base
    .values(column, year)
    .map_err(|_| Error::Layout(format!("missing base variable {column}")))?
    .to_f64()
    .ok_or_else(|| Error::Layout(format!("{column} is not numeric")))
}

fn add_into(total: &mut [f64], values: &[f64]) {
  for (t, v) in total.iter_mut().zip(values) {
    if !v.is_nan() {
      *t += v;
    }
  }
}

fn evaluate(base: &ArraySet, year: Year, spec: &VariableSpec) -> Result<Values> {
  let rows = entity_rows(base, &spec.entity, year)?;
  let check = |column: &str, len: usize| {
    if len == rows {
      Ok(())
    } else {
      Err(Error::Layout(format!(
        "{column} has {len} rows, {} has {rows}",
        spec.entity
      )))
    }
  };

  let values = match &spec.source {
    Source::Column(column) => {
      let values = base
        .values(column, year)
        .map_err(|_| Error::Layout(format!("missing base variable {column}")))?;
      check(column, values.len())?;
      match values.to_f64() {
        Some(v) => Values::Numbers(v),
        None => Values::Strings(values.to_strings().unwrap_or_default()),
      }
    }
    Source::SumOf(columns) => {
      let mut total = vec![0.0; rows];
      for column in columns {
        if base.get(column, year).is_some() {
          let values = numbers(base, column, year)?;
          check(column, values.len())?;
          add_into(&mut total, &values);
        }
      }
      Values::Numbers(total)
    }
    Source::Prefix(prefix) => {
      let mut total = vec![0.0; rows];
      for (key, array) in base.iter().filter(|(k, a)| {
        k.period == year && a.entity == spec.entity && k.variable.starts_with(prefix.as_str())
      }) {
        let values = array
          .values
          .to_f64()
          .ok_or_else(|| Error::Layout(format!("{} is not numeric", key.variable)))?;
        add_into(&mut total, &values);
      }
      Values::Numbers(total)
    }
    Source::Map { column, values, default } => {
      let codes = numbers(base, column, year)?;
      check(column, codes.len())?;
      Values::Numbers(
        codes
          .iter()
          .map(|&c| {
            if c.is_finite() && c.fract() == 0.0 {
              values.get(&(c as i64).to_string()).copied().unwrap_or(*default)
            } else {
              *default
            }
          })
          .collect(),
      )
    }
  };
  Ok(values)
}

fn encode(spec: &VariableSpec, values: &Values, factor: f64) -> Result<Column> {
  let column = match (spec.encoding, values) {
    (Encoding::Float, Values::Numbers(v)) => {
      Column::Float(v.iter().map(|x| x * spec.scale * factor).collect())
    }
    (Encoding::Int, Values::Numbers(v)) => Column::Int(
      v.iter()
        .map(|x| {
          let x = (x * spec.scale).round();
          if x.is_finite() { x as i64 } else { 0 }
        })
        .collect(),
    ),
    (Encoding::FixedWidth, Values::Strings(v)) => Column::fixed_from_strings(v),
    (Encoding::FixedWidth, Values::Numbers(v)) => {
      Column::fixed_from_strings(&v.iter().map(|x| x.to_string()).collect::<Vec<_>>())
    }
    (_, Values::Strings(_)) => {
      return Err(Error::Layout(format!(
        "{} is text and cannot be encoded as {:?}",
        spec.name, spec.encoding
      )));
    }
  };
  Ok(column)
}

/// Evaluate `plan` against the `base_year` arrays of `base` and write every
/// variable for each of `periods`.
pub fn project(
  base: &ArraySet,
  base_year: Year,
  periods: impl IntoIterator<Item = Year>,
  plan: &ProjectionPlan,
  index: &GrowthIndex,
) -> Result<ArraySet> {
  let evaluated: Vec<(&VariableSpec, Values)> = plan
    .variables
    .iter()
    .map(|spec| Ok((spec, evaluate(base, base_year, spec)?)))
    .collect::<Result<_>>()?;

  let mut out = ArraySet::new();
  for period in periods {
    for (spec, values) in &evaluated {
      let factor = spec
        .uprating
        .as_deref()
        .map_or(1.0, |series| index.ratio(series, base_year, period));
      out.insert(spec.name.clone(), period, spec.entity.clone(), encode(spec, values, factor)?)?;
    }
  }
  debug!(variables = evaluated.len(), periods = out.periods().len(), "projected");
  Ok(out)
}
