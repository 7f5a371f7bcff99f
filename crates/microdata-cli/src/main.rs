//! `microdata` binary.
//!
//! Reads `microdata.toml` (or the path given with `--config`), overlaid by
//! `MICRODATA_*` environment variables, opens the store under the data
//! directory and runs one action against one dataset:
//!
//! ```text
//! microdata raw_frs generate 2019 ~/downloads/UKDA-8633-tab.zip
//! microdata frs load 2019
//! microdata base_frs remove
//! microdata frs years
//! ```

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use anyhow::{Context as _, bail};
use clap::{Parser, ValueEnum};
use microdata_core::{Year, arrays::Artifact};
use microdata_pipeline::{
  HttpFetcher, PipelineSettings, settings::ImputationSettings, standard_catalog,
};
use microdata_store_sqlite::SqliteStore;
use rand::{SeedableRng as _, rngs::StdRng};
use serde::Deserialize;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum Action {
  /// Build a year, replacing any stored copy. Raw datasets take a source
  /// archive as a second argument.
  Generate,
  /// Read a year, generating it first if it is not stored.
  Load,
  /// Remove one year, or every year when none is given.
  Remove,
  /// List stored years with their stage and generation time.
  Years,
}

#[derive(Parser)]
#[command(author, version, about = "Survey microdata pipeline")]
struct Cli {
  /// Dataset name, e.g. `raw_frs`, `base_frs` or `frs`.
  dataset: String,

  action: Action,

  /// Year, then for `generate` an optional source archive.
  args: Vec<String>,

  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "microdata.toml")]
  config: PathBuf,

  /// Store root; overrides `data_dir` from the configuration.
  #[arg(long)]
  data_dir: Option<PathBuf>,

  /// Seed for every randomized step; overrides `seed` from the configuration.
  #[arg(long)]
  seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Settings {
  data_dir:           PathBuf,
  seed:               Option<u64>,
  /// TOML file of growth index series.
  growth_index:       Option<PathBuf>,
  /// Projection plan overrides, dataset name to TOML file.
  plans:              BTreeMap<String, PathBuf>,
  imputation:         ImputationSettings,
  projection_horizon: Year,
  spi_population:     f64,
  cps_url_template:   String,
  acs_url_template:   String,
}

impl Default for Settings {
  fn default() -> Self {
    let pipeline = PipelineSettings::default();
    Self {
      data_dir:           PathBuf::from("data"),
      seed:               None,
      growth_index:       None,
      plans:              BTreeMap::new(),
      imputation:         pipeline.imputation,
      projection_horizon: pipeline.projection_horizon,
      spi_population:     pipeline.spi_population,
      cps_url_template:   pipeline.cps_url_template,
      acs_url_template:   pipeline.acs_url_template,
    }
  }
}

impl Settings {
  fn pipeline(&self) -> anyhow::Result<PipelineSettings> {
    let growth_index = match &self.growth_index {
      Some(path) => microdata_pipeline::settings::load_growth_index(&expand_tilde(path))
        .with_context(|| format!("failed to read growth index {path:?}"))?,
      None => Default::default(),
    };
    let mut plans = BTreeMap::new();
    for (dataset, path) in &self.plans {
      let plan = microdata_pipeline::settings::load_plan(&expand_tilde(path))
        .with_context(|| format!("failed to read projection plan {path:?} for {dataset}"))?;
      plans.insert(dataset.clone(), plan);
    }
    Ok(PipelineSettings {
      growth_index,
      projection_horizon: self.projection_horizon,
      imputation: self.imputation.clone(),
      plans,
      spi_population: self.spi_population,
      cps_url_template: self.cps_url_template.clone(),
      acs_url_template: self.acs_url_template.clone(),
    })
  }
}

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings: Settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("MICRODATA"))
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise Settings")?;

  let data_dir = expand_tilde(cli.data_dir.as_ref().unwrap_or(&settings.data_dir));
  let seed = cli.seed.or(settings.seed).unwrap_or_else(rand::random);
  info!(seed, data_dir = %data_dir.display(), "starting");
  let mut rng = StdRng::seed_from_u64(seed);

  let fetcher = HttpFetcher::new().context("failed to build HTTP client")?;
  let catalog = standard_catalog(SqliteStore::new(data_dir), Box::new(fetcher), settings.pipeline()?);
  let dataset = cli.dataset.as_str();
  catalog.dataset(dataset)?;

  match cli.action {
    Action::Generate => {
      let year = year_arg(&cli.args, true)?.context("generate needs a year")?;
      let source = cli.args.get(1).map(|s| expand_tilde(Path::new(s)));
      catalog
        .generate(dataset, year, source.as_deref(), &mut rng)
        .with_context(|| format!("failed to generate {dataset} {year}"))?;
      println!("{dataset} {year} written");
    }
    Action::Load => {
      let year = year_arg(&cli.args, false)?.context("load needs a year")?;
      let artifact = catalog
        .load(dataset, year, &mut rng)
        .with_context(|| format!("failed to load {dataset} {year}"))?;
      print_summary(&artifact)?;
    }
    Action::Remove => {
      let year = year_arg(&cli.args, false)?;
      let removed = catalog.remove(dataset, year)?;
      println!("{removed} removed");
    }
    Action::Years => {
      let spec = &catalog.dataset(dataset)?.spec;
      for year in catalog.years(dataset)? {
        match catalog.store().info(spec, year)? {
          Some(info) => println!(
            "{year}\t{}\t{}\t{}",
            info.stage,
            info.container,
            info.generated_at.to_rfc3339()
          ),
          None => println!("{year}"),
        }
      }
    }
  }
  Ok(())
}

/// The year argument, if given. `generate` may carry one extra argument.
fn year_arg(args: &[String], allow_source: bool) -> anyhow::Result<Option<Year>> {
  let limit = if allow_source { 2 } else { 1 };
  if args.len() > limit {
    bail!("unexpected arguments: {:?}", &args[limit..]);
  }
  args
    .first()
    .map(|y| y.parse().with_context(|| format!("{y:?} is not a year")))
    .transpose()
}

fn print_summary(artifact: &Artifact) -> anyhow::Result<()> {
  for (key, value) in artifact.metadata() {
    println!("{key}: {value}");
  }
  match artifact {
    Artifact::Tables(tables) => {
      for (name, table) in tables.iter() {
        println!("{name}: {} rows, {} columns", table.n_rows(), table.n_columns());
      }
    }
    Artifact::Arrays(arrays) => {
      for period in arrays.periods() {
        println!("{period}: {} variables", arrays.variables(period).len());
        for (entity, table) in arrays.to_tables(period)?.iter() {
          println!("  {entity}: {} rows, {} variables", table.n_rows(), table.n_columns());
        }
      }
    }
  }
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
