//! Donor-based imputation of one income variable.
//!
//! A weighted least-squares model is fitted on donor records that report a
//! non-zero target. Each recipient prediction adds a donor residual drawn at
//! a random weighted quantile, so imputed values keep the donor spread
//! instead of collapsing onto the regression line. The imputed values are
//! then scaled so a weighted aggregate matches the calibration target.
//!
//! Only recipients reporting a non-zero or missing value are imputed; a
//! reported zero stays zero.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// Tikhonov term added to the normal equations, relative to their trace.
const RIDGE: f64 = 1e-9;

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Named covariate columns of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct Covariates {
  pub names:   Vec<String>,
  pub columns: Vec<Vec<f64>>,
}

impl Covariates {
  /// At least one covariate is required, with one column per name.
  pub fn new(names: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self> {
    if names.is_empty() {
      return Err(Error::Layout("no covariates given".into()));
    }
    if names.len() != columns.len() {
      return Err(Error::Layout(format!(
        "{} covariate names for {} columns",
        names.len(),
        columns.len()
      )));
    }
    if let Some(first) = columns.first()
      && let Some((i, bad)) = columns.iter().enumerate().find(|(_, c)| c.len() != first.len())
    {
      return Err(Error::Layout(format!(
        "covariate {} has {} rows, expected {}",
        names[i],
        bad.len(),
        first.len()
      )));
    }
    Ok(Self { names, columns })
  }

  pub fn n_rows(&self) -> usize { self.columns.first().map_or(0, Vec::len) }

  /// Design row with a leading intercept. Non-finite covariates count as
  /// zero.
  fn design_row(&self, row: usize) -> Vec<f64> {
    std::iter::once(1.0)
      .chain(self.columns.iter().map(|c| if c[row].is_finite() { c[row] } else { 0.0 }))
      .collect()
  }
}

pub struct Donor<'a> {
  pub covariates: &'a Covariates,
  pub target:     &'a [f64],
  pub weights:    &'a [f64],
}

pub struct Recipient<'a> {
  pub covariates: &'a Covariates,
  /// Values as reported; zeros are kept, everything else is imputed.
  pub reported:   &'a [f64],
  pub weights:    &'a [f64],
}

/// What the imputed values are scaled to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Calibration {
  /// Weighted mean of imputed recipients equals the weighted quantile of
  /// the donors' non-zero target values.
  DonorQuantile(f64),
  /// Weighted recipient total equals this population total.
  PopulationTotal(f64),
}

impl Default for Calibration {
  fn default() -> Self { Self::DonorQuantile(0.18) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Imputation {
  pub values:       Vec<f64>,
  /// Factor applied to the raw predictions.
  pub scale:        f64,
  /// Aggregate the values were calibrated to.
  pub target:       f64,
  pub imputed_rows: usize,
}

// ─── Model ───────────────────────────────────────────────────────────────────

/// Fitted regression plus the weighted residual distribution.
#[derive(Debug, Clone)]
pub struct DonorModel {
  names:        Vec<String>,
  coefficients: DVector<f64>,
  /// `(residual, cumulative weight)`, residual ascending.
  residuals:    Vec<(f64, f64)>,
  range:        (f64, f64),
}

fn usable(target: f64, weight: f64) -> bool {
  target.is_finite() && target != 0.0 && weight.is_finite() && weight > 0.0
}

impl DonorModel {
  pub fn fit(donor: &Donor<'_>) -> Result<Self> {
    let x = donor.covariates;
    if donor.target.len() != x.n_rows() || donor.weights.len() != x.n_rows() {
      return Err(Error::Layout("donor target and weights must match the covariate rows".into()));
    }
    let rows: Vec<usize> = (0..x.n_rows())
      .filter(|&i| usable(donor.target[i], donor.weights[i]))
      .collect();
    let p = x.names.len() + 1;
    if rows.len() < p {
      return Err(Error::Calibration(format!(
        "{} usable donor records for {p} coefficients",
        rows.len()
      )));
    }

    let mut xtwx = DMatrix::<f64>::zeros(p, p);
    let mut xtwy = DVector::<f64>::zeros(p);
    for &i in &rows {
      let d = DVector::from_vec(x.design_row(i));
      let w = donor.weights[i];
      xtwx += &d * d.transpose() * w;
      xtwy += &d * (w * donor.target[i]);
    }
    let ridge = RIDGE * xtwx.trace().max(1.0);
    for k in 0..p {
      xtwx[(k, k)] += ridge;
    }

    let coefficients = match xtwx.clone().cholesky() {
      Some(chol) => chol.solve(&xtwy),
      None => xtwx
        .lu()
        .solve(&xtwy)
        .ok_or_else(|| Error::Calibration("donor covariates are singular".into()))?,
    };

    let mut residuals: Vec<(f64, f64)> = rows
      .iter()
      .map(|&i| {
        let fitted = DVector::from_vec(x.design_row(i)).dot(&coefficients);
        (donor.target[i] - fitted, donor.weights[i])
      })
      .collect();
    residuals.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut cumulative = 0.0;
    for r in &mut residuals {
      cumulative += r.1;
      r.1 = cumulative;
    }

    let (lo, hi) = rows
      .iter()
      .map(|&i| donor.target[i])
      .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| (lo.min(y), hi.max(y)));

    debug!(donors = rows.len(), coefficients = ?coefficients.as_slice(), "donor model fitted");
    Ok(Self { names: x.names.clone(), coefficients, residuals, range: (lo, hi) })
  }

  fn residual_at(&self, u: f64) -> f64 {
    let total = self.residuals.last().map_or(0.0, |r| r.1);
    let threshold = u * total;
    let idx = self.residuals.partition_point(|r| r.1 < threshold);
    self.residuals.get(idx).or(self.residuals.last()).map_or(0.0, |r| r.0)
  }

  /// Predict one value per recipient row, clamped to the donor range.
  pub fn predict<R: Rng + ?Sized>(&self, covariates: &Covariates, rng: &mut R) -> Result<Vec<f64>> {
    check_schema(&self.names, &covariates.names)?;
    Ok(
      (0..covariates.n_rows())
        .map(|i| {
          let fitted = DVector::from_vec(covariates.design_row(i)).dot(&self.coefficients);
          (fitted + self.residual_at(rng.r#gen::<f64>())).clamp(self.range.0, self.range.1)
        })
        .collect(),
    )
  }
}

fn check_schema(expected: &[String], found: &[String]) -> Result<()> {
  if expected != found {
    return Err(Error::SchemaMismatch { expected: expected.to_vec(), found: found.to_vec() });
  }
  Ok(())
}

// ─── Calibration ─────────────────────────────────────────────────────────────

/// Weighted quantile of `values`, `q` in `[0, 1]`.
pub fn weighted_quantile(values: &[f64], weights: &[f64], q: f64) -> Option<f64> {
  let mut pairs: Vec<(f64, f64)> = values
    .iter()
    .zip(weights)
    .filter(|(v, w)| v.is_finite() && w.is_finite() && **w > 0.0)
    .map(|(&v, &w)| (v, w))
    .collect();
  if pairs.is_empty() {
    return None;
  }
  pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
  let total: f64 = pairs.iter().map(|p| p.1).sum();
  let threshold = q.clamp(0.0, 1.0) * total;
  let mut cumulative = 0.0;
  for &(v, w) in &pairs {
    cumulative += w;
    if cumulative >= threshold {
      return Some(v);
    }
  }
  pairs.last().map(|p| p.0)
}

// ─── Entry point ─────────────────────────────────────────────────────────────

/// Fit on `donor`, predict for `recipient`, and calibrate.
pub fn impute<R: Rng + ?Sized>(
  donor: &Donor<'_>,
  recipient: &Recipient<'_>,
  calibration: Calibration,
  rng: &mut R,
) -> Result<Imputation> {
  check_schema(&donor.covariates.names, &recipient.covariates.names)?;
  let n = recipient.covariates.n_rows();
  if recipient.reported.len() != n || recipient.weights.len() != n {
    return Err(Error::Layout("recipient values and weights must match the covariate rows".into()));
  }

  let model = DonorModel::fit(donor)?;
  let predicted = model.predict(recipient.covariates, rng)?;

  let mask: Vec<bool> = recipient.reported.iter().map(|&v| v != 0.0).collect();
  let mut values: Vec<f64> =
    predicted.iter().zip(&mask).map(|(&p, &m)| if m { p } else { 0.0 }).collect();
  let imputed_rows = mask.iter().filter(|&&m| m).count();
  let weight = |i: usize| {
    let w = recipient.weights[i];
    if w.is_finite() && w > 0.0 { w } else { 0.0 }
  };

  let (current, target) = match calibration {
    Calibration::DonorQuantile(q) => {
      let nonzero: Vec<(f64, f64)> = donor
        .target
        .iter()
        .zip(donor.weights)
        .filter(|(t, w)| usable(**t, **w))
        .map(|(&t, &w)| (t, w))
        .collect();
      let (t, w): (Vec<f64>, Vec<f64>) = nonzero.into_iter().unzip();
      let target = weighted_quantile(&t, &w, q)
        .ok_or_else(|| Error::Calibration("no donor values to take a quantile of".into()))?;
      let (sum, total_weight) = (0..n)
        .filter(|&i| mask[i])
        .fold((0.0, 0.0), |(s, tw), i| (s + weight(i) * values[i], tw + weight(i)));
      let mean = if total_weight > 0.0 { sum / total_weight } else { 0.0 };
      (mean, target)
    }
    Calibration::PopulationTotal(total) => {
      let sum: f64 = (0..n).map(|i| weight(i) * values[i]).sum();
      (sum, total)
    }
  };

  let scale = if imputed_rows == 0 {
    1.0
  } else if current.is_finite() && current != 0.0 {
    target / current
  } else {
    return Err(Error::Calibration(format!(
      "imputed aggregate is {current}, cannot scale to {target}"
    )));
  };
  for v in values.iter_mut().filter(|v| **v != 0.0) {
    *v *= scale;
  }

  info!(imputed_rows, scale, target, "donor imputation calibrated");
  Ok(Imputation { values, scale, target, imputed_rows })
}

#[cfg(test)]
mod tests {
  use rand::SeedableRng as _;
  use rand_chacha::ChaCha8Rng;

  use super::*;

  fn covariates(names: &[&str], columns: Vec<Vec<f64>>) -> Covariates {
    Covariates::new(names.iter().map(|s| s.to_string()).collect(), columns).unwrap()
  }

  /// Donors with `y = 10 + 2 x + noise`.
  fn donors(rng: &mut ChaCha8Rng, n: usize) -> (Covariates, Vec<f64>, Vec<f64>) {
    let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let y: Vec<f64> = x.iter().map(|&x| 10.0 + 2.0 * x + rng.gen_range(-1.0..1.0)).collect();
    let w = vec![1.0; n];
    (covariates(&["income"], vec![x]), y, w)
  }

  #[test]
  fn regression_recovers_a_linear_relation() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let (x, y, w) = donors(&mut rng, 200);
    let model = DonorModel::fit(&Donor { covariates: &x, target: &y, weights: &w }).unwrap();
    assert!((model.coefficients[0] - 10.0).abs() < 0.5);
    assert!((model.coefficients[1] - 2.0).abs() < 0.01);
  }

  #[test]
  fn reported_zeros_stay_zero_and_total_is_met() {
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let (x, y, w) = donors(&mut rng, 100);
    let donor = Donor { covariates: &x, target: &y, weights: &w };

    let rx = covariates(&["income"], vec![vec![5.0, 20.0, 40.0, 60.0, 80.0]]);
    let reported = [0.0, 12.0, f64::NAN, 0.0, 3.0];
    let weights = [100.0, 200.0, 300.0, 400.0, 500.0];
    let recipient = Recipient { covariates: &rx, reported: &reported, weights: &weights };

    let out = impute(&donor, &recipient, Calibration::PopulationTotal(1.0e6), &mut rng).unwrap();
    assert_eq!(out.imputed_rows, 3);
    assert_eq!(out.values[0], 0.0);
    assert_eq!(out.values[3], 0.0);
    assert!(out.values[1] > 0.0 && out.values[2] > 0.0 && out.values[4] > 0.0);

    let total: f64 = out.values.iter().zip(&weights).map(|(v, w)| v * w).sum();
    assert!((total - 1.0e6).abs() / 1.0e6 < 1e-3);
  }

  #[test]
  fn donor_quantile_sets_the_imputed_mean() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let (x, y, w) = donors(&mut rng, 100);
    let donor = Donor { covariates: &x, target: &y, weights: &w };

    let rx = covariates(&["income"], vec![vec![10.0, 30.0, 50.0]]);
    let reported = [1.0, 1.0, 0.0];
    let weights = [2.0, 1.0, 5.0];
    let recipient = Recipient { covariates: &rx, reported: &reported, weights: &weights };

    let out = impute(&donor, &recipient, Calibration::DonorQuantile(0.5), &mut rng).unwrap();
    let expected = weighted_quantile(&y, &w, 0.5).unwrap();
    assert_eq!(out.target, expected);
    let mean = (2.0 * out.values[0] + out.values[1]) / 3.0;
    assert!((mean - expected).abs() / expected < 1e-3);
    assert_eq!(out.values[2], 0.0);
  }

  #[test]
  fn mismatched_covariates_are_rejected() {
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let (x, y, w) = donors(&mut rng, 10);
    let donor = Donor { covariates: &x, target: &y, weights: &w };
    let rx = covariates(&["age"], vec![vec![1.0]]);
    let recipient = Recipient { covariates: &rx, reported: &[1.0], weights: &[1.0] };
    assert!(matches!(
      impute(&donor, &recipient, Calibration::default(), &mut rng),
      Err(Error::SchemaMismatch { .. })
    ));

    let swapped = covariates(&["b", "a"], vec![vec![1.0], vec![2.0]]);
    let ordered = covariates(&["a", "b"], vec![vec![1.0], vec![2.0]]);
    assert!(check_schema(&ordered.names, &swapped.names).is_err());
  }

  #[test]
  fn covariates_need_one_column_per_name() {
    let err = Covariates::new(vec!["age".into(), "income".into()], vec![vec![1.0]]).unwrap_err();
    assert!(matches!(err, Error::Layout(ref detail) if detail == "2 covariate names for 1 columns"));

    assert!(matches!(Covariates::new(vec![], vec![]), Err(Error::Layout(_))));
    assert!(matches!(
      Covariates::new(vec!["age".into(), "income".into()], vec![vec![1.0], vec![1.0, 2.0]]),
      Err(Error::Layout(_))
    ));
  }

  #[test]
  fn weighted_quantile_respects_weights() {
    let values = [1.0, 2.0, 3.0];
    assert_eq!(weighted_quantile(&values, &[1.0, 1.0, 1.0], 0.5), Some(2.0));
    assert_eq!(weighted_quantile(&values, &[10.0, 1.0, 1.0], 0.5), Some(1.0));
    assert_eq!(weighted_quantile(&values, &[1.0, 1.0, 1.0], 1.0), Some(3.0));
    assert_eq!(weighted_quantile(&[], &[], 0.5), None);
  }
}
