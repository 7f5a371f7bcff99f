//! Survey of Personal Incomes. One record per taxpayer; each record is its
//! own benefit unit and household.

use tracing::{info, warn};

use microdata_core::{
  arrays::Artifact,
  store::TableStore,
  table::{Column, Table, TableSet},
};
use microdata_flatfile::ParseOptions;

use crate::{
  Context, Error, Generator, Result,
  aggregate::{resolve_weights, stack},
  archive::{Unpacked, read_text},
};

use super::{entity_arrays, record_source};

/// The release's main table, stored as `main`.
pub struct RawSpi;

impl<S: TableStore> Generator<S> for RawSpi {
  fn generate(&self, ctx: &mut Context<'_, S>) -> Result<Artifact> {
    let path = ctx.require_source()?;
    let unpacked = Unpacked::open(path)?;
    let tab = unpacked
      .find_dir("tab")
      .ok_or_else(|| Error::Layout("no tab folder in the archive".into()))?;
    let files = unpacked.files(&tab, |n| n.to_ascii_lowercase().ends_with(".tab"));
    let Some(file) = files.first() else {
      return Err(Error::Layout("no tab files in the tab folder".into()));
    };
    if files.len() > 1 {
      warn!(files = files.len(), used = %file.display(), "several tab files, using the first");
    }

    let main = microdata_flatfile::parse(&read_text(file)?, &ParseOptions::tab().uppercase_headers())?;
    info!(records = main.n_rows(), "raw SPI extracted");
    let mut tables = TableSet::new();
    tables.insert("main", main);
    record_source(&mut tables, &path.display().to_string(), path)?;
    Ok(Artifact::Tables(tables))
  }
}

/// Append one record carrying the weight the sample misses against
/// `population`. Nothing is added when the weights already reach it.
fn top_up_population(mut main: Table, population: f64) -> Result<Table> {
  let weights = resolve_weights(&main.floats("FACT")?)?;
  let missing = population - weights.iter().sum::<f64>();
  main.insert("FACT", Column::Float(weights))?;
  if missing <= 0.0 {
    return Ok(main);
  }
  let extra = Table::new().with("FACT", Column::Float(vec![missing]))?;
  stack(&main, &extra)
}

/// Person, benefit unit and household arrays, ids being row numbers.
pub struct BaseSpi;

impl<S: TableStore> Generator<S> for BaseSpi {
  fn generate(&self, ctx: &mut Context<'_, S>) -> Result<Artifact> {
    let year = ctx.year();
    let mut raw = ctx.upstream_tables("raw_spi", year)?;
    let population = ctx.settings().spi_population;

    let mut person = top_up_population(raw.take("main")?, population)?;
    person.fill_missing(0.0);
    let n = person.n_rows();
    let ids: Vec<i64> = (0..n as i64).collect();
    let weight = person.column("FACT")?.clone();

    let mut person = person.prefixed("P_");
    person.insert("P_person_id", Column::Int(ids.clone()))?;
    person.insert("P_benunit_id", Column::Int(ids.clone()))?;
    person.insert("P_household_id", Column::Int(ids.clone()))?;
    person.insert("P_role", Column::Text(vec!["adult".into(); n]))?;

    let benunit = Table::with_rows(n)
      .with("B_benunit_id", Column::Int(ids.clone()))?
      .with("B_FACT", weight.clone())?;
    let household = Table::with_rows(n)
      .with("H_household_id", Column::Int(ids))?
      .with("H_FACT", weight)?;

    info!(records = n, population, "base SPI built");
    let mut arrays =
      entity_arrays(vec![("person", person), ("benunit", benunit), ("household", household)], year)?;
    arrays.metadata = raw.metadata;
    Ok(Artifact::Arrays(arrays))
  }
}
