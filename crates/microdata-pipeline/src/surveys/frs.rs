//! Family Resources Survey: raw tables, base entity arrays and the
//! anonymized synthetic copy.

use rand::seq::SliceRandom as _;
use rand::{Rng as _, RngCore};
use tracing::{debug, info};

use microdata_core::{
  arrays::{ArraySet, Artifact},
  ids::IdScheme,
  store::TableStore,
  table::{Column, Table, TableSet},
};
use microdata_flatfile::ParseOptions;

use crate::{
  Context, Error, Generator, Result,
  aggregate::{CategoryRemap, left_join, pivot_sum, resolve_weights, sort_by_key, stack, sum_by_key},
  archive::{Unpacked, read_text},
  council_tax::impute_council_tax,
};

use super::{entity_arrays, period_slice, record_source, stem};

// ─── Raw ─────────────────────────────────────────────────────────────────────

/// `[a-z]+.tab`, the data tables of a release's `tab/` folder.
fn is_data_table(name: &str) -> bool {
  name
    .strip_suffix(".tab")
    .is_some_and(|stem| !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_lowercase()))
}

/// Add `household_id`, `benunit_id` and `person_id` wherever the household
/// serial, benefit unit and person numbers are present.
fn derive_ids(table: &mut Table, ids: &IdScheme) -> Result<()> {
  if !table.contains("SERNUM") {
    return Ok(());
  }
  let sernum = table.keys("SERNUM")?;
  table.insert(
    "household_id",
    Column::Int(sernum.iter().map(|&s| ids.household_id(s)).collect()),
  )?;

  if !table.contains("BENUNIT") {
    return Ok(());
  }
  let benunit = table.keys("BENUNIT")?;
  let benunit_ids = sernum
    .iter()
    .zip(&benunit)
    .map(|(&s, &b)| ids.family_id(s, b))
    .collect::<microdata_core::Result<Vec<_>>>()?;
  table.insert("benunit_id", Column::Int(benunit_ids))?;

  if !table.contains("PERSON") {
    return Ok(());
  }
  let person = table.keys("PERSON")?;
  let person_ids = sernum
    .iter()
    .zip(&person)
    .map(|(&s, &p)| ids.person_id(s, p))
    .collect::<microdata_core::Result<Vec<_>>>()?;
  table.insert("person_id", Column::Int(person_ids))?;
  Ok(())
}

/// Every data table of one FRS release archive.
pub struct RawFrs;

impl<S: TableStore> Generator<S> for RawFrs {
  fn generate(&self, ctx: &mut Context<'_, S>) -> Result<Artifact> {
    let path = ctx.require_source()?;
    let unpacked = Unpacked::open(path)?;
    let tab = unpacked
      .find_dir("tab")
      .ok_or_else(|| Error::Layout("no tab folder in the archive".into()))?;
    let files = unpacked.files(&tab, is_data_table);
    if files.is_empty() {
      return Err(Error::Layout("no data tables in the tab folder".into()));
    }

    let ids = IdScheme::default();
    let options = ParseOptions::tab().uppercase_headers();
    let mut tables = TableSet::new();
    for file in &files {
      let name = stem(file);
      let mut table = microdata_flatfile::parse(&read_text(file)?, &options)?;
      derive_ids(&mut table, &ids)?;
      debug!(table = %name, rows = table.n_rows(), columns = table.n_columns(), "parsed");
      tables.insert(name, table);
    }
    info!(tables = tables.len(), "raw FRS extracted");
    record_source(&mut tables, &path.display().to_string(), path)?;
    Ok(Artifact::Tables(tables))
  }
}

// ─── Base ────────────────────────────────────────────────────────────────────

/// Jobseeker's and Employment and Support Allowance share a benefit code
/// between their contribution and income-based forms; `VAR2` tells them
/// apart.
fn income_based_remap() -> CategoryRemap {
  CategoryRemap { codes: vec![14, 16], flags: vec![2, 4], offset: 1000 }
}

/// One row per person, stacking adults and children.
fn people(raw: &TableSet) -> Result<Table> {
  let mut adult = raw.get("adult")?.clone();
  adult.remove("AGE");
  adult.insert("role", Column::Text(vec!["adult".into(); adult.n_rows()]))?;
  let mut child = raw.get("child")?.clone();
  child.insert("role", Column::Text(vec!["child".into(); child.n_rows()]))?;
  sort_by_key(&stack(&adult, &child)?, "person_id")
}

/// Collapse the many-per-person sub-tables onto the person table.
fn attach_person_records(person: &mut Table, raw: &TableSet) -> Result<()> {
  let accounts = pivot_sum(raw.get("accounts")?, "person_id", "ACCOUNT", "ACCINT", "ACCINT_ACCOUNT_CODE_")?;
  left_join(person, "person_id", &accounts, "person_id")?;

  let mut benefits = raw.get("benefits")?.clone();
  let moved = income_based_remap().apply(&mut benefits, "BENEFIT", "VAR2")?;
  debug!(moved, "income-based benefit records split off");
  let benefits = pivot_sum(&benefits, "person_id", "BENEFIT", "BENAMT", "BENAMT_BENEFIT_CODE_")?;
  left_join(person, "person_id", &benefits, "person_id")?;

  for name in ["job", "chldcare"] {
    let summed = sum_by_key(raw.get(name)?, "person_id")?;
    left_join(person, "person_id", &summed, "person_id")?;
  }
  Ok(())
}

/// Person, benefit unit and household arrays with council tax imputed.
pub struct BaseFrs;

impl<S: TableStore> Generator<S> for BaseFrs {
  fn generate(&self, ctx: &mut Context<'_, S>) -> Result<Artifact> {
    let year = ctx.year();
    let raw = ctx.upstream_tables("raw_frs", year)?;
    let ids = IdScheme::default();

    let mut person = people(&raw)?;
    attach_person_records(&mut person, &raw)?;

    // `benunit_id` comes with the adult and child records.
    let person_ids = person.keys("person_id")?;
    person.insert(
      "household_id",
      Column::Int(person_ids.iter().map(|&p| ids.household_of(p)).collect()),
    )?;

    let mut household = raw.get("househol")?.clone();
    let weights = resolve_weights(&household.floats("GROSS4")?)?;
    household.insert("GROSS4", Column::Float(weights))?;
    let household_weight = Table::new()
      .with("household_id", household.column("household_id")?.clone())?
      .with("GROSS4", household.column("GROSS4")?.clone())?;
    left_join(&mut person, "household_id", &household_weight, "household_id")?;
    let person_weights = resolve_weights(&person.floats("GROSS4")?)?;
    person.insert("GROSS4", Column::Float(person_weights))?;
    person.fill_missing(0.0);

    let council_tax = impute_council_tax(
      &household.floats("GVTREGNO")?,
      &household.floats("CTBAND")?,
      &household.floats("CTANNUAL")?,
      ctx.rng(),
    )?;
    household.fill_missing(0.0);
    household.insert("CTANNUAL", Column::Float(council_tax))?;

    let mut benunit = raw.get("benunit")?.clone();
    benunit.fill_missing(0.0);

    info!(
      persons = person.n_rows(),
      benunits = benunit.n_rows(),
      households = household.n_rows(),
      "base FRS built"
    );
    let mut arrays = entity_arrays(
      vec![
        ("person", person.prefixed("P_")),
        ("benunit", benunit.prefixed("B_")),
        ("household", household.prefixed("H_")),
      ],
      year,
    )?;
    arrays.metadata = raw.metadata;
    Ok(Artifact::Arrays(arrays))
  }
}

// ─── Synthetic ───────────────────────────────────────────────────────────────

/// Columns with fewer distinct values are treated as categories.
const CATEGORICAL_LIMIT: usize = 16;

fn is_identifier(variable: &str) -> bool { variable == "id" || variable.ends_with("_id") }

fn shuffled(column: &Column, rng: &mut dyn RngCore) -> Column {
  let mut order: Vec<usize> = (0..column.len()).collect();
  order.shuffle(rng);
  column.take(&order)
}

/// Shuffle every non-identifier array independently. Continuous float
/// arrays are also scaled by one noise factor in `[0.97, 1.03]` each.
pub fn anonymize(arrays: &ArraySet, rng: &mut dyn RngCore) -> Result<ArraySet> {
  let mut out = ArraySet::new();
  for (key, array) in arrays.iter() {
    let values = if is_identifier(&key.variable) {
      array.values.clone()
    } else {
      let values = shuffled(&array.values, rng);
      match values {
        Column::Float(v) if array.values.distinct_count() >= CATEGORICAL_LIMIT => {
          let noise = rng.gen_range(0.97..=1.03);
          Column::Float(v.into_iter().map(|x| x * noise).collect())
        }
        other => other,
      }
    };
    out.insert(key.variable.clone(), key.period, array.entity.clone(), values)?;
  }
  Ok(out)
}

/// An anonymized copy of one year of `frs`.
pub struct SynthFrs;

impl<S: TableStore> Generator<S> for SynthFrs {
  fn generate(&self, ctx: &mut Context<'_, S>) -> Result<Artifact> {
    let year = ctx.year();
    let frs = period_slice(&ctx.upstream_arrays("frs", year)?, year)?;
    if frs.is_empty() {
      return Err(ctx.missing_dependency(format!("frs period {year}")));
    }
    let arrays = anonymize(&frs, ctx.rng())?;
    info!(variables = arrays.len(), "synthetic FRS built");
    Ok(Artifact::Arrays(arrays))
  }
}

#[cfg(test)]
mod tests {
  use rand::SeedableRng as _;
  use rand_chacha::ChaCha8Rng;

  use super::*;

  #[test]
  fn data_tables_are_lowercase_tab_files() {
    assert!(is_data_table("adult.tab"));
    assert!(is_data_table("househol.tab"));
    assert!(!is_data_table("Adult.tab"));
    assert!(!is_data_table("frs_2019.tab"));
    assert!(!is_data_table(".tab"));
    assert!(!is_data_table("adult.csv"));
  }

  #[test]
  fn ids_follow_the_release_numbering() {
    let mut table = Table::new()
      .with("SERNUM", Column::Float(vec![7.0, 7.0, 8.0]))
      .unwrap()
      .with("BENUNIT", Column::Float(vec![1.0, 2.0, 1.0]))
      .unwrap()
      .with("PERSON", Column::Float(vec![1.0, 3.0, 2.0]))
      .unwrap();
    derive_ids(&mut table, &IdScheme::default()).unwrap();
    assert_eq!(table.keys("household_id").unwrap(), vec![7, 7, 8]);
    assert_eq!(table.keys("benunit_id").unwrap(), vec![701, 702, 801]);
    assert_eq!(table.keys("person_id").unwrap(), vec![701, 703, 802]);
  }

  #[test]
  fn households_of_ten_or_more_people_get_distinct_ids() {
    let n = 12;
    let mut table = Table::new()
      .with("SERNUM", Column::Float(vec![3.0; n]))
      .unwrap()
      .with("BENUNIT", Column::Float((0..n).map(|i| (i / 5 + 1) as f64).collect()))
      .unwrap()
      .with("PERSON", Column::Float((1..=n).map(|p| p as f64).collect()))
      .unwrap();
    derive_ids(&mut table, &IdScheme::default()).unwrap();
    let people = table.keys("person_id").unwrap();
    assert_eq!(people, (301..=312).collect::<Vec<_>>());
    assert_eq!(table.keys("benunit_id").unwrap()[11], 303);
  }

  #[test]
  fn household_tables_only_get_a_household_id() {
    let mut table = Table::new()
      .with("SERNUM", Column::Float(vec![1.0]))
      .unwrap();
    derive_ids(&mut table, &IdScheme::default()).unwrap();
    assert!(table.contains("household_id"));
    assert!(!table.contains("benunit_id"));
  }

  #[test]
  fn anonymize_keeps_ids_and_value_multisets() {
    let mut arrays = ArraySet::new();
    let ids: Vec<i64> = (1..=40).collect();
    let income: Vec<f64> = (1..=40).map(|x| x as f64 * 100.0).collect();
    let region: Vec<f64> = (0..40).map(|x| (x % 3) as f64).collect();
    arrays.insert("person_id", 2019, "person", Column::Int(ids.clone())).unwrap();
    arrays.insert("employment_income", 2019, "person", Column::Float(income.clone())).unwrap();
    arrays.insert("region", 2019, "person", Column::Float(region.clone())).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let out = anonymize(&arrays, &mut rng).unwrap();
    assert_eq!(out.values("person_id", 2019).unwrap(), &Column::Int(ids));

    let mut shuffled_region = out.values("region", 2019).unwrap().to_f64().unwrap();
    shuffled_region.sort_by(f64::total_cmp);
    let mut sorted_region = region;
    sorted_region.sort_by(f64::total_cmp);
    assert_eq!(shuffled_region, sorted_region);

    let noisy = out.values("employment_income", 2019).unwrap().to_f64().unwrap();
    let ratio = noisy.iter().sum::<f64>() / income.iter().sum::<f64>();
    assert!((0.97..=1.03).contains(&ratio), "ratio {ratio}");
  }
}
