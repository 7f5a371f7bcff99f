//! Survey datasets and the standard catalog.
//!
//! | dataset       | stage       | built from                      |
//! |---------------|-------------|---------------------------------|
//! | `raw_frs`     | raw         | FRS release archive             |
//! | `base_frs`    | base        | `raw_frs`                       |
//! | `frs`         | model_ready | `base_frs` (or `raw_frs`)       |
//! | `synth_frs`   | model_ready | `frs`                           |
//! | `frs_spi_adj` | model_ready | `frs`, `spi`                    |
//! | `raw_spi`     | raw         | SPI release archive             |
//! | `base_spi`    | base        | `raw_spi`                       |
//! | `spi`         | model_ready | `base_spi` (or `raw_spi`)       |
//! | `raw_cps`     | raw         | ASEC archive, local or HTTP     |
//! | `base_cps`    | base        | `raw_cps`                       |
//! | `cps`         | model_ready | `base_cps`                      |
//! | `raw_acs`     | raw         | SPM file archive, local or HTTP |
//! | `acs`         | model_ready | `raw_acs`                       |

use std::path::Path;

use tracing::debug;

use microdata_core::{
  Year,
  arrays::{ArraySet, Artifact},
  stage::Stage,
  store::TableStore,
  table::{Table, TableSet},
};

use crate::{
  Catalog, Context, Fetcher, Generator, PipelineSettings, Result, archive, project::project,
};

mod acs;
mod cps;
mod frs;
mod frs_spi;
mod spi;

pub use acs::{Acs, RawAcs};
pub use cps::{BaseCps, Cps, RawCps};
pub use frs::{BaseFrs, RawFrs, SynthFrs};
pub use frs_spi::FrsSpiAdjusted;
pub use spi::{BaseSpi, RawSpi};

/// A catalog with every survey dataset registered.
pub fn standard_catalog<S: TableStore>(
  store: S,
  fetcher: Box<dyn Fetcher>,
  settings: PipelineSettings,
) -> Catalog<S> {
  let mut catalog = Catalog::new(store, fetcher, settings);
  catalog
    .register("raw_frs", Stage::Raw, RawFrs)
    .register("base_frs", Stage::Base, BaseFrs)
    .register("frs", Stage::ModelReady, Horizon::new("frs", "base_frs", "raw_frs"))
    .register("synth_frs", Stage::ModelReady, SynthFrs)
    .register("frs_spi_adj", Stage::ModelReady, FrsSpiAdjusted)
    .register("raw_spi", Stage::Raw, RawSpi)
    .register("base_spi", Stage::Base, BaseSpi)
    .register("spi", Stage::ModelReady, Horizon::new("spi", "base_spi", "raw_spi"))
    .register("raw_cps", Stage::Raw, RawCps)
    .register("base_cps", Stage::Base, BaseCps)
    .register("cps", Stage::ModelReady, Cps)
    .register("raw_acs", Stage::Raw, RawAcs)
    .register("acs", Stage::ModelReady, Acs);
  catalog
}

// ─── Shared helpers ──────────────────────────────────────────────────────────

/// Record where a raw artifact came from.
pub(crate) fn record_source(tables: &mut TableSet, source: &str, file: &Path) -> Result<()> {
  tables.metadata.insert("source".into(), source.to_owned());
  tables
    .metadata
    .insert("source_sha256".into(), archive::sha256_file(file)?);
  Ok(())
}

/// File stem of a release file, e.g. `adult` for `.../tab/adult.tab`.
pub(crate) fn stem(path: &Path) -> String {
  path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default()
}

/// Flatten entity tables into arrays for one period. Column names must
/// already be distinct across tables.
pub(crate) fn entity_arrays(tables: Vec<(&str, Table)>, year: Year) -> Result<ArraySet> {
  let mut set = TableSet::new();
  for (entity, table) in tables {
    debug!(entity, rows = table.n_rows(), columns = table.n_columns(), "entity table");
    set.insert(entity, table);
  }
  Ok(ArraySet::from_tables(&set, year)?)
}

/// Arrays of one period, with the entity of each kept.
pub(crate) fn period_slice(arrays: &ArraySet, year: Year) -> Result<ArraySet> {
  let mut out = ArraySet::new();
  for (key, array) in arrays.iter().filter(|(k, _)| k.period == year) {
    out.insert(key.variable.clone(), year, array.entity.clone(), array.values.clone())?;
  }
  Ok(out)
}

// ─── Multi-year projection ───────────────────────────────────────────────────

/// Model-ready dataset written for `projection_horizon` periods from the
/// dataset year, projected from the latest base year. Without any base year
/// the latest raw year is used, which generates its base on demand.
pub struct Horizon {
  plan: &'static str,
  base: &'static str,
  raw:  &'static str,
}

impl Horizon {
  pub fn new(plan: &'static str, base: &'static str, raw: &'static str) -> Self {
    Self { plan, base, raw }
  }

  fn base_year<S: TableStore>(&self, ctx: &Context<'_, S>) -> Result<Year> {
    if let Some(year) = ctx.latest_year(self.base)? {
      return Ok(year);
    }
    ctx
      .latest_year(self.raw)?
      .ok_or_else(|| ctx.missing_dependency(format!("any year of {} or {}", self.base, self.raw)))
  }
}

impl<S: TableStore> Generator<S> for Horizon {
  fn generate(&self, ctx: &mut Context<'_, S>) -> Result<Artifact> {
    let base_year = self.base_year(ctx)?;
    let base = ctx.upstream_arrays(self.base, base_year)?;
    let settings = ctx.settings();
    let plan = settings.plan(self.plan)?;
    let periods = ctx.year()..ctx.year() + settings.projection_horizon;

    let mut arrays = project(&base, base_year, periods, &plan, &settings.growth_index)?;
    arrays.metadata.insert("base_year".into(), base_year.to_string());
    Ok(Artifact::Arrays(arrays))
  }
}
