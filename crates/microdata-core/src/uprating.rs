//! Growth-index uprating of monetary variables between years.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Year;

/// Named index series, each a year → level mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthIndex {
  pub series: BTreeMap<String, BTreeMap<Year, f64>>,
}

impl GrowthIndex {
  pub fn new() -> Self { Self::default() }

  pub fn set(&mut self, series: impl Into<String>, year: Year, level: f64) {
    self.series.entry(series.into()).or_default().insert(year, level);
  }

  pub fn factor(&self, series: &str, year: Year) -> Option<f64> {
    self.series.get(series)?.get(&year).copied()
  }

  /// `factor(to) / factor(from)`. A missing series, year or zero level
  /// carries the value forward unchanged.
  pub fn ratio(&self, series: &str, from: Year, to: Year) -> f64 {
    match (self.factor(series, from), self.factor(series, to)) {
      (Some(base), Some(target)) if base != 0.0 => target / base,
      _ => 1.0,
    }
  }
}
