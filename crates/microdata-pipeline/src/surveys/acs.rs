//! ACS Supplemental Poverty Measure research file.
//!
//! The release is one person file. SPM unit and household tables are derived
//! from it by taking each unit's first person.

use tempfile::NamedTempFile;
use tracing::info;

use microdata_core::{
  arrays::Artifact,
  ids::IdScheme,
  store::TableStore,
  table::{Column, Table, TableSet},
};
use microdata_flatfile::ParseOptions;

use crate::{
  Context, Error, Generator, Result,
  aggregate::{Reduce, group_reduce},
  archive::{Unpacked, read_text},
  project::project,
};

use super::{entity_arrays, record_source};

const HOUSEHOLD_COLUMNS: [&str; 2] = ["ST", "PUMA"];

fn spm_units(person: &Table) -> Result<Table> {
  let columns: Vec<(&str, Reduce)> = person
    .names()
    .filter(|n| n.starts_with("SPM_"))
    .map(|n| (n, Reduce::First))
    .collect();
  group_reduce(person, "SPM_ID", &columns)
}

fn households(person: &Table) -> Result<Table> {
  let columns: Vec<(&str, Reduce)> = HOUSEHOLD_COLUMNS
    .into_iter()
    .filter(|n| person.contains(n))
    .map(|n| (n, Reduce::First))
    .collect();
  group_reduce(person, "SERIALNO", &columns)
}

/// Person, SPM unit and household tables of one SPM research file. Read
/// from the given archive, or downloaded when none is given.
pub struct RawAcs;

impl RawAcs {
  fn tables(unpacked: &Unpacked) -> Result<TableSet> {
    let file = unpacked
      .files(unpacked.root(), |n| n.to_ascii_lowercase().ends_with(".csv"))
      .into_iter()
      .next()
      .ok_or_else(|| Error::Layout("no csv file in the archive".into()))?;

    let mut person = microdata_flatfile::parse(&read_text(&file)?, &ParseOptions::csv().uppercase_headers())?;
    person.fill_missing(0.0);
    let spm_unit = spm_units(&person)?;
    let household = households(&person)?;
    info!(
      persons = person.n_rows(),
      spm_units = spm_unit.n_rows(),
      households = household.n_rows(),
      "raw ACS extracted"
    );

    let mut tables = TableSet::new();
    tables.insert("person", person);
    tables.insert("spm_unit", spm_unit);
    tables.insert("household", household);
    Ok(tables)
  }
}

impl<S: TableStore> Generator<S> for RawAcs {
  fn generate(&self, ctx: &mut Context<'_, S>) -> Result<Artifact> {
    let tables = match ctx.source() {
      Some(path) => {
        let mut tables = Self::tables(&Unpacked::open(path)?)?;
        record_source(&mut tables, &path.display().to_string(), path)?;
        tables
      }
      None => {
        let url = ctx.settings().acs_url(ctx.year());
        let mut download = NamedTempFile::new()?;
        ctx.fetcher().fetch(&url, download.as_file_mut())?;
        let mut tables = Self::tables(&Unpacked::open(download.path())?)?;
        record_source(&mut tables, &url, download.path())?;
        tables
      }
    };
    Ok(Artifact::Tables(tables))
  }
}

/// Identifiers, weights and SPM resources, straight from the raw tables.
pub struct Acs;

impl<S: TableStore> Generator<S> for Acs {
  fn generate(&self, ctx: &mut Context<'_, S>) -> Result<Artifact> {
    let year = ctx.year();
    let mut raw = ctx.upstream_tables("raw_acs", year)?;
    let ids = IdScheme::default();

    let mut person = raw.take("person")?;
    let person_ids = person
      .keys("SERIALNO")?
      .iter()
      .zip(&person.keys("SPORDER")?)
      .map(|(&household, &order)| ids.person_id(household, order))
      .collect::<microdata_core::Result<Vec<_>>>()?;
    person = person.prefixed("P_");
    person.insert("person_id", Column::Int(person_ids))?;

    let base = entity_arrays(
      vec![
        ("person", person),
        ("spm_unit", raw.take("spm_unit")?.prefixed("S_")),
        ("household", raw.take("household")?.prefixed("H_")),
      ],
      year,
    )?;
    let settings = ctx.settings();
    let plan = settings.plan("acs")?;
    Ok(Artifact::Arrays(project(&base, year, [year], &plan, &settings.growth_index)?))
  }
}
