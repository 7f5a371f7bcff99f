//! Current Population Survey, Annual Social and Economic Supplement.

use std::collections::HashSet;

use tempfile::NamedTempFile;
use tracing::info;

use microdata_core::{
  Year,
  arrays::Artifact,
  ids::IdScheme,
  store::TableStore,
  table::{Column, Table, TableSet},
};
use microdata_flatfile::ParseOptions;

use crate::{
  Context, Error, Generator, Result,
  aggregate::{Reduce, group_reduce, resolve_weights},
  archive::{Unpacked, read_text},
  project::project,
};

use super::{entity_arrays, record_source};

/// Two-digit year used in ASEC file names.
fn yy(year: Year) -> String { format!("{:02}", year.rem_euclid(100)) }

// ─── Raw ─────────────────────────────────────────────────────────────────────

/// Person, family and household files of one ASEC release. Read from the
/// supplied archive if there is one, otherwise downloaded.
pub struct RawCps;

impl RawCps {
  fn tables(unpacked: &Unpacked, year: Year) -> Result<TableSet> {
    let yy = yy(year);
    let mut tables = TableSet::new();
    for (entity, prefix) in [("person", "pppub"), ("family", "ffpub"), ("household", "hhpub")] {
      let name = format!("{prefix}{yy}.csv");
      let file = unpacked
        .find_file(&name)
        .ok_or_else(|| Error::Layout(format!("{name} not found in the archive")))?;
      let table = microdata_flatfile::parse(&read_text(&file)?, &ParseOptions::csv().uppercase_headers())?;
      info!(entity, rows = table.n_rows(), columns = table.n_columns(), "parsed");
      tables.insert(entity, table);
    }
    Ok(tables)
  }
}

impl<S: TableStore> Generator<S> for RawCps {
  fn generate(&self, ctx: &mut Context<'_, S>) -> Result<Artifact> {
    let year = ctx.year();
    let mut tables = match ctx.source() {
      Some(path) => {
        let mut tables = Self::tables(&Unpacked::open(path)?, year)?;
        record_source(&mut tables, &path.display().to_string(), path)?;
        tables
      }
      None => {
        let url = ctx.settings().cps_url(year);
        let mut download = NamedTempFile::new()?;
        ctx.fetcher().fetch(&url, download.as_file_mut())?;
        let mut tables = Self::tables(&Unpacked::open(download.path())?, year)?;
        record_source(&mut tables, &url, download.path())?;
        tables
      }
    };
    tables.metadata.insert("release".into(), format!("asecpub{}", yy(year)));
    Ok(Artifact::Tables(tables))
  }
}

// ─── Base ────────────────────────────────────────────────────────────────────

fn ensure_known(keys: &[i64], known: &HashSet<i64>, what: &str) -> Result<()> {
  match keys.iter().find(|k| !known.contains(k)) {
    Some(key) => Err(Error::Layout(format!("person references {what} {key}, which does not exist"))),
    None => Ok(()),
  }
}

/// A unit table with one row per distinct `key` among persons, weighted by
/// the family weight of its first member.
fn derived_unit(person: &Table, key: &str, id: &str, weight: &str) -> Result<Table> {
  let mut unit = group_reduce(person, key, &[("family_weight", Reduce::First)])?;
  unit.rename(key, id)?;
  unit.rename("family_weight", weight)?;
  Ok(unit)
}

/// Person, family, tax unit, SPM unit and household arrays.
pub struct BaseCps;

impl<S: TableStore> Generator<S> for BaseCps {
  fn generate(&self, ctx: &mut Context<'_, S>) -> Result<Artifact> {
    let year = ctx.year();
    let mut raw = ctx.upstream_tables("raw_cps", year)?;
    let ids = IdScheme::default();

    let mut person = raw.take("person")?.prefixed("P_");
    let mut family = raw.take("family")?.prefixed("F_");
    let mut household = raw.take("household")?.prefixed("H_");

    let ph_seq = person.keys("P_PH_SEQ")?;
    let pf_seq = person.keys("P_PF_SEQ")?;
    let p_seq = person.keys("P_P_SEQ")?;
    let person_ids = ph_seq
      .iter()
      .zip(&p_seq)
      .map(|(&h, &p)| ids.person_id(h, p))
      .collect::<microdata_core::Result<Vec<_>>>()?;
    let person_family_ids = ph_seq
      .iter()
      .zip(&pf_seq)
      .map(|(&h, &f)| ids.family_id(h, f))
      .collect::<microdata_core::Result<Vec<_>>>()?;
    let person_household_ids: Vec<i64> = ph_seq.iter().map(|&h| ids.household_id(h)).collect();

    let fh_seq = family.keys("F_FH_SEQ")?;
    let ffpos = family.keys("F_FFPOS")?;
    let family_ids = fh_seq
      .iter()
      .zip(&ffpos)
      .map(|(&h, &f)| ids.family_id(h, f))
      .collect::<microdata_core::Result<Vec<_>>>()?;
    let household_ids: Vec<i64> = household
      .keys("H_H_SEQ")?
      .iter()
      .map(|&h| ids.household_id(h))
      .collect();

    ensure_known(&person_family_ids, &family_ids.iter().copied().collect(), "family")?;
    ensure_known(&person_household_ids, &household_ids.iter().copied().collect(), "household")?;

    family.insert("family_id", Column::Int(family_ids))?;
    family.insert("family_weight", Column::Float(resolve_weights(&family.floats("F_FSUP_WGT")?)?))?;
    household.insert("household_id", Column::Int(household_ids))?;
    household.insert(
      "household_weight",
      Column::Float(resolve_weights(&household.floats("H_HSUP_WGT")?)?),
    )?;

    let family_index = family.key_index("family_id")?;
    let family_weights = family.floats("family_weight")?;
    let person_family_weight: Vec<f64> = person_family_ids
      .iter()
      .map(|f| family_index.get(f).map_or(f64::NAN, |&row| family_weights[row]))
      .collect();

    person.insert("person_id", Column::Int(person_ids))?;
    person.insert("person_family_id", Column::Int(person_family_ids))?;
    person.insert("person_household_id", Column::Int(person_household_ids))?;
    person.insert("person_tax_unit_id", Column::Int(person.keys("P_TAX_ID")?))?;
    person.insert("person_spm_unit_id", Column::Int(person.keys("P_SPM_ID")?))?;
    person.insert(
      "person_weight",
      Column::Float(resolve_weights(&person.floats("P_A_FNLWGT")?)?),
    )?;

    let mut links = Table::with_rows(person.n_rows());
    links.insert("person_tax_unit_id", person.column("person_tax_unit_id")?.clone())?;
    links.insert("person_spm_unit_id", person.column("person_spm_unit_id")?.clone())?;
    links.insert("family_weight", Column::Float(person_family_weight))?;
    let tax_unit = derived_unit(&links, "person_tax_unit_id", "tax_unit_id", "tax_unit_weight")?;
    let spm_unit = derived_unit(&links, "person_spm_unit_id", "spm_unit_id", "spm_unit_weight")?;

    info!(
      persons = person.n_rows(),
      families = family.n_rows(),
      tax_units = tax_unit.n_rows(),
      spm_units = spm_unit.n_rows(),
      households = household.n_rows(),
      "base CPS built"
    );
    let mut arrays = entity_arrays(
      vec![
        ("person", person),
        ("family", family),
        ("tax_unit", tax_unit),
        ("spm_unit", spm_unit),
        ("household", household),
      ],
      year,
    )?;
    arrays.metadata = raw.metadata;
    Ok(Artifact::Arrays(arrays))
  }
}

// ─── Model-ready ─────────────────────────────────────────────────────────────

/// Model-ready CPS for the dataset year, projected from the same base year.
pub struct Cps;

impl<S: TableStore> Generator<S> for Cps {
  fn generate(&self, ctx: &mut Context<'_, S>) -> Result<Artifact> {
    let year = ctx.year();
    let base = ctx.upstream_arrays("base_cps", year)?;
    let settings = ctx.settings();
    let plan = settings.plan("cps")?;
    Ok(Artifact::Arrays(project(&base, year, [year], &plan, &settings.growth_index)?))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unit_weights_come_from_the_first_member() {
    let links = Table::new()
      .with("person_tax_unit_id", Column::Int(vec![5, 5, 3]))
      .unwrap()
      .with("family_weight", Column::Float(vec![10.0, 20.0, 30.0]))
      .unwrap();
    let unit = derived_unit(&links, "person_tax_unit_id", "tax_unit_id", "tax_unit_weight").unwrap();
    assert_eq!(unit.keys("tax_unit_id").unwrap(), vec![3, 5]);
    assert_eq!(unit.floats("tax_unit_weight").unwrap(), vec![30.0, 10.0]);
  }

  #[test]
  fn dangling_foreign_keys_are_layout_errors() {
    let known = HashSet::from([11, 12]);
    assert!(ensure_known(&[11, 12, 11], &known, "family").is_ok());
    assert!(matches!(ensure_known(&[13], &known, "family"), Err(Error::Layout(_))));
  }

  #[test]
  fn release_years_are_two_digits() {
    assert_eq!(yy(2020), "20");
    assert_eq!(yy(2009), "09");
  }
}
