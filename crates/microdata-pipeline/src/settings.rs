//! Pipeline settings: growth index, projection plans, imputation policy.

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use microdata_core::{Year, uprating::GrowthIndex};

use crate::{Error, Result, donor::Calibration, plans, project::ProjectionPlan};

pub const CPS_URL_TEMPLATE: &str =
  "https://www2.census.gov/programs-surveys/cps/datasets/{year}/march/asecpub{yy}csv.zip";

pub const ACS_URL_TEMPLATE: &str =
  "https://www2.census.gov/programs-surveys/supplemental-poverty-measure/datasets/spm/spm_pu_{year}_csv.zip";

/// Covariates, target and calibration of the FRS dividend imputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputationSettings {
  pub covariates:  Vec<String>,
  pub target:      String,
  pub weight:      String,
  pub calibration: Calibration,
}

impl Default for ImputationSettings {
  fn default() -> Self {
    Self {
      covariates:  vec![
        "employment_income".into(),
        "savings_interest_income".into(),
        "age".into(),
      ],
      target:      "dividend_income".into(),
      weight:      "person_weight".into(),
      calibration: Calibration::default(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
  pub growth_index:       GrowthIndex,
  /// Number of periods written by the multi-year model-ready datasets.
  pub projection_horizon: i32,
  pub imputation:         ImputationSettings,
  /// Plan overrides by dataset name.
  pub plans:              BTreeMap<String, ProjectionPlan>,
  /// Population the SPI weights are topped up to.
  pub spi_population:     f64,
  /// `{year}` and `{yy}` are substituted.
  pub cps_url_template:   String,
  /// Zipped SPM research file; `{year}` is substituted.
  pub acs_url_template:   String,
}

impl Default for PipelineSettings {
  fn default() -> Self {
    Self {
      growth_index:       GrowthIndex::default(),
      projection_horizon: 10,
      imputation:         ImputationSettings::default(),
      plans:              BTreeMap::new(),
      spi_population:     66e6,
      cps_url_template:   CPS_URL_TEMPLATE.to_owned(),
      acs_url_template:   ACS_URL_TEMPLATE.to_owned(),
    }
  }
}

impl PipelineSettings {
  /// The configured plan for `dataset`, or the built-in one.
  pub fn plan(&self, dataset: &str) -> Result<ProjectionPlan> {
    self
      .plans
      .get(dataset)
      .cloned()
      .or_else(|| plans::builtin(dataset))
      .ok_or_else(|| Error::UnknownDataset(dataset.to_owned()))
  }

  pub fn cps_url(&self, year: Year) -> String {
    self
      .cps_url_template
      .replace("{year}", &year.to_string())
      .replace("{yy}", &format!("{:02}", year.rem_euclid(100)))
  }

  pub fn acs_url(&self, year: Year) -> String {
    self.acs_url_template.replace("{year}", &year.to_string())
  }
}

/// Read a growth index from a TOML file of series tables keyed by year.
pub fn load_growth_index(path: &Path) -> Result<GrowthIndex> {
  parse_growth_index(&fs::read_to_string(path)?)
}

/// Parse the on-disk growth index form, `[series] "2019" = 100.0`.
pub fn parse_growth_index(text: &str) -> Result<GrowthIndex> {
  let file: BTreeMap<String, BTreeMap<String, f64>> = toml::from_str(text)?;
  let mut index = GrowthIndex::new();
  for (series, levels) in file {
    for (year, level) in levels {
      let year: Year = year
        .trim()
        .parse()
        .map_err(|_| Error::Layout(format!("growth index {series}: {year:?} is not a year")))?;
      index.set(series.clone(), year, level);
    }
  }
  Ok(index)
}

/// Read a projection plan from a TOML file.
pub fn load_plan(path: &Path) -> Result<ProjectionPlan> {
  Ok(toml::from_str(&fs::read_to_string(path)?)?)
}
