//! Stratified imputation of unreported council tax.
//!
//! Council tax is heavily under-reported: a reported amount of exactly zero
//! is treated as missing. Missing amounts are drawn from a normal fitted to
//! the non-zero amounts of the same (region, band) stratum. A stratum with no
//! reported amounts falls back to the overall non-zero mean.

use std::collections::HashMap;

use rand::{Rng, distributions::Distribution as _};
use statrs::{distribution::Normal, statistics::Statistics as _};
use tracing::{debug, warn};

use crate::{Error, Result};

/// `NaN` region or band codes form their own stratum.
fn stratum(region: f64, band: f64) -> (u64, u64) {
  let bits = |x: f64| if x.is_nan() { f64::NAN.to_bits() } else { x.to_bits() };
  (bits(region), bits(band))
}

fn is_missing(amount: f64) -> bool { amount == 0.0 || !amount.is_finite() }

/// Fill zero or missing `amount`s. Draws are clamped at zero. A stratum
/// with a single value, or no spread, contributes its mean.
pub fn impute_council_tax<R: Rng + ?Sized>(
  region: &[f64],
  band: &[f64],
  amount: &[f64],
  rng: &mut R,
) -> Result<Vec<f64>> {
  if region.len() != amount.len() || band.len() != amount.len() {
    return Err(Error::Layout(format!(
      "council tax inputs have {}, {} and {} rows",
      region.len(),
      band.len(),
      amount.len()
    )));
  }

  let mut reported: HashMap<(u64, u64), Vec<f64>> = HashMap::new();
  for ((&r, &b), &a) in region.iter().zip(band).zip(amount) {
    if !is_missing(a) {
      reported.entry(stratum(r, b)).or_default().push(a);
    }
  }
  let all: Vec<f64> = reported.values().flatten().copied().collect();
  let overall = if all.is_empty() { 0.0 } else { all.iter().mean() };

  let mut models: HashMap<(u64, u64), Option<Normal>> = HashMap::new();
  let mut fallbacks = 0usize;
  let mut imputed = 0usize;
  let mut out = Vec::with_capacity(amount.len());

  for ((&r, &b), &a) in region.iter().zip(band).zip(amount) {
    if !is_missing(a) {
      out.push(a);
      continue;
    }
    imputed += 1;
    let key = stratum(r, b);
    let value = match reported.get(&key) {
      None => {
        fallbacks += 1;
        overall
      }
      Some(values) => {
        let model = models.entry(key).or_insert_with(|| {
          let sd = values.iter().std_dev();
          if sd.is_finite() && sd > 0.0 {
            Normal::new(values.iter().mean(), sd).ok()
          } else {
            None
          }
        });
        match model {
          Some(normal) => normal.sample(rng).max(0.0),
          None => values.iter().mean(),
        }
      }
    };
    out.push(value);
  }

  if imputed > 0 && all.is_empty() {
    warn!(imputed, "no reported council tax to impute from, left at zero");
  }
  debug!(imputed, fallbacks, "council tax imputed");
  Ok(out)
}

#[cfg(test)]
mod tests {
  use rand::SeedableRng as _;
  use rand_chacha::ChaCha8Rng;

  use super::*;

  #[test]
  fn reported_values_are_kept() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let out = impute_council_tax(&[1.0, 1.0], &[2.0, 2.0], &[900.0, 1100.0], &mut rng).unwrap();
    assert_eq!(out, vec![900.0, 1100.0]);
  }

  #[test]
  fn draws_follow_the_stratum_distribution() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    // Stratum (1, 1): reported 900, 1000, 1100 (mean 1000, sd 100).
    // Stratum (2, 5): reported 3000 only.
    let mut region = vec![1.0, 1.0, 1.0, 2.0];
    let mut band = vec![1.0, 1.0, 1.0, 5.0];
    let mut amount = vec![900.0, 1000.0, 1100.0, 3000.0];
    for _ in 0..2000 {
      region.push(1.0);
      band.push(1.0);
      amount.push(0.0);
    }
    region.push(2.0);
    band.push(5.0);
    amount.push(f64::NAN);

    let out = impute_council_tax(&region, &band, &amount, &mut rng).unwrap();
    let draws = &out[4..4 + 2000];
    let mean = draws.iter().mean();
    let sd = draws.iter().std_dev();
    assert!((mean - 1000.0).abs() < 15.0, "mean {mean}");
    assert!((sd - 100.0).abs() < 15.0, "sd {sd}");
    assert!(draws.iter().all(|&x| x >= 0.0));
    // A single-value stratum contributes its mean.
    assert_eq!(out[out.len() - 1], 3000.0);
  }

  #[test]
  fn empty_strata_fall_back_to_the_overall_mean() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let out = impute_council_tax(
      &[1.0, 1.0, 9.0, f64::NAN],
      &[1.0, 1.0, 9.0, 1.0],
      &[1000.0, 2000.0, 0.0, 0.0],
      &mut rng,
    )
    .unwrap();
    assert_eq!(out[2], 1500.0);
    assert_eq!(out[3], 1500.0);
  }

  #[test]
  fn imputation_is_reproducible_with_a_seed() {
    let run = |seed| {
      let mut rng = ChaCha8Rng::seed_from_u64(seed);
      impute_council_tax(&[1.0; 4], &[1.0; 4], &[800.0, 1200.0, 0.0, 0.0], &mut rng).unwrap()
    };
    assert_eq!(run(11), run(11));
  }
}
