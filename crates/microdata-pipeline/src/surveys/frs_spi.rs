//! FRS with one income variable imputed from the SPI.
//!
//! The FRS under-reports investment income at the top of the distribution.
//! The SPI, drawn from tax records, does not. Covariates, target and
//! calibration come from [`ImputationSettings`].
//!
//! [`ImputationSettings`]: crate::settings::ImputationSettings

use tracing::info;

use microdata_core::{
  Year,
  arrays::{ArraySet, Artifact},
  store::TableStore,
  table::Column,
};

use crate::{
  Context, Error, Generator, Result,
  donor::{Covariates, Donor, Recipient, impute},
};

use super::period_slice;

fn floats(arrays: &ArraySet, variable: &str, year: Year) -> Result<Vec<f64>> {
  arrays
    .values(variable, year)?
    .to_f64()
    .ok_or_else(|| Error::Layout(format!("{variable} is not numeric")))
}

fn covariates(arrays: &ArraySet, names: &[String], year: Year) -> Result<Covariates> {
  let columns = names
    .iter()
    .map(|name| floats(arrays, name, year))
    .collect::<Result<Vec<_>>>()?;
  Covariates::new(names.to_vec(), columns)
}

pub struct FrsSpiAdjusted;

impl<S: TableStore> Generator<S> for FrsSpiAdjusted {
  fn generate(&self, ctx: &mut Context<'_, S>) -> Result<Artifact> {
    let year = ctx.year();
    let frs = period_slice(&ctx.upstream_arrays("frs", year)?, year)?;
    let spi = period_slice(&ctx.upstream_arrays("spi", year)?, year)?;
    if frs.is_empty() {
      return Err(ctx.missing_dependency(format!("frs period {year}")));
    }
    if spi.is_empty() {
      return Err(ctx.missing_dependency(format!("spi period {year}")));
    }

    let settings = ctx.settings().imputation.clone();
    let spi_x = covariates(&spi, &settings.covariates, year)?;
    let frs_x = covariates(&frs, &settings.covariates, year)?;
    let spi_target = floats(&spi, &settings.target, year)?;
    let spi_weights = floats(&spi, &settings.weight, year)?;
    let frs_reported = floats(&frs, &settings.target, year)?;
    let frs_weights = floats(&frs, &settings.weight, year)?;

    let imputation = impute(
      &Donor { covariates: &spi_x, target: &spi_target, weights: &spi_weights },
      &Recipient { covariates: &frs_x, reported: &frs_reported, weights: &frs_weights },
      settings.calibration,
      ctx.rng(),
    )?;
    info!(
      target = %settings.target,
      imputed = imputation.imputed_rows,
      scale = imputation.scale,
      "imputed from the SPI"
    );

    let entity = frs
      .get(&settings.target, year)
      .map(|a| a.entity.clone())
      .unwrap_or_else(|| "person".to_owned());
    let mut out = frs;
    out.insert(settings.target.clone(), year, entity, Column::Float(imputation.values))?;
    out.metadata.insert("imputed".into(), settings.target);
    out.metadata.insert("calibration_target".into(), imputation.target.to_string());
    Ok(Artifact::Arrays(out))
  }
}
