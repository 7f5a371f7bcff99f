//! Datasets, their generators, and the catalog that ties them to a store.
//!
//! A [`Dataset`] is a name, a [`Stage`] and a boxed [`Generator`]. The
//! [`Catalog`] owns the store handle and every registered dataset. Loading a
//! year that is not stored runs the dataset's generator, which may in turn
//! load upstream datasets through its [`Context`]; those loads generate on
//! demand too.

use std::{
  collections::{BTreeMap, BTreeSet},
  path::Path,
};

use rand::RngCore;
use tracing::{debug, info, info_span};
use uuid::Uuid;

use microdata_core::{
  Year,
  arrays::{ArraySet, Artifact},
  stage::{DatasetSpec, Progress, Stage},
  store::TableStore,
  table::TableSet,
};

use crate::{Error, Fetcher, PipelineSettings, Result};

// ─── Generator ───────────────────────────────────────────────────────────────

/// Builds one year of a dataset. Implementations read upstream data through
/// the context and return the artifact; the catalog writes it.
pub trait Generator<S> {
  fn generate(&self, ctx: &mut Context<'_, S>) -> Result<Artifact>;
}

pub struct Dataset<S> {
  pub spec:  DatasetSpec,
  generator: Box<dyn Generator<S>>,
}

// ─── Context ─────────────────────────────────────────────────────────────────

/// Everything a generator may touch while building one dataset year.
pub struct Context<'a, S> {
  catalog: &'a Catalog<S>,
  spec:    &'a DatasetSpec,
  year:    Year,
  source:  Option<&'a Path>,
  rng:     &'a mut dyn RngCore,
}

impl<'a, S: TableStore> Context<'a, S> {
  pub fn spec(&self) -> &DatasetSpec { self.spec }

  pub fn year(&self) -> Year { self.year }

  pub fn settings(&self) -> &PipelineSettings { &self.catalog.settings }

  pub fn fetcher(&self) -> &dyn Fetcher { self.catalog.fetcher.as_ref() }

  pub fn rng(&mut self) -> &mut dyn RngCore { &mut *self.rng }

  /// The externally supplied source, if any.
  pub fn source(&self) -> Option<&'a Path> { self.source }

  /// The externally supplied source. Without one there is nothing to build
  /// from, so the year is reported as not found.
  pub fn require_source(&self) -> Result<&'a Path> {
    self.source.ok_or_else(|| Error::NotFound {
      dataset: self.spec.name.clone(),
      year:    self.year,
      stage:   self.spec.stage,
    })
  }

  /// Latest stored year of another dataset.
  pub fn latest_year(&self, name: &str) -> Result<Option<Year>> {
    self.catalog.last_year(name)
  }

  /// A missing-dependency error for this dataset year.
  pub fn missing_dependency(&self, dependency: impl Into<String>) -> Error {
    Error::MissingDependency {
      dataset:    self.spec.name.clone(),
      year:       self.year,
      stage:      self.spec.stage,
      dependency: dependency.into(),
      source:     None,
    }
  }

  /// Load an upstream dataset year, generating it if needed. Any failure is
  /// reported as a missing dependency of this dataset.
  pub fn upstream(&mut self, name: &str, year: Year) -> Result<Artifact> {
    let missing = |source: Option<Box<Error>>| Error::MissingDependency {
      dataset:    self.spec.name.clone(),
      year:       self.year,
      stage:      self.spec.stage,
      dependency: format!("{name} {year}"),
      source,
    };

    let upstream = self.catalog.dataset(name).map_err(|e| missing(Some(Box::new(e))))?;
    Progress::At(upstream.spec.stage)
      .advance(self.spec.stage)
      .map_err(|e| missing(Some(Box::new(e.into()))))?;

    self
      .catalog
      .load(name, year, &mut *self.rng)
      .map_err(|e| missing(Some(Box::new(e))))
  }

  pub fn upstream_tables(&mut self, name: &str, year: Year) -> Result<TableSet> {
    Ok(self.upstream(name, year)?.into_tables()?)
  }

  pub fn upstream_arrays(&mut self, name: &str, year: Year) -> Result<ArraySet> {
    Ok(self.upstream(name, year)?.into_arrays()?)
  }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// Registered datasets over one store.
pub struct Catalog<S> {
  store:    S,
  datasets: BTreeMap<String, Dataset<S>>,
  fetcher:  Box<dyn Fetcher>,
  settings: PipelineSettings,
}

impl<S: TableStore> Catalog<S> {
  pub fn new(store: S, fetcher: Box<dyn Fetcher>, settings: PipelineSettings) -> Self {
    Self { store, datasets: BTreeMap::new(), fetcher, settings }
  }

  pub fn register(
    &mut self,
    name: &str,
    stage: Stage,
    generator: impl Generator<S> + 'static,
  ) -> &mut Self {
    let spec = DatasetSpec::new(name, stage);
    self
      .datasets
      .insert(name.to_owned(), Dataset { spec, generator: Box::new(generator) });
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn settings(&self) -> &PipelineSettings { &self.settings }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.datasets.keys().map(String::as_str)
  }

  pub fn dataset(&self, name: &str) -> Result<&Dataset<S>> {
    self
      .datasets
      .get(name)
      .ok_or_else(|| Error::UnknownDataset(name.to_owned()))
  }

  pub fn years(&self, name: &str) -> Result<BTreeSet<Year>> {
    let spec = &self.dataset(name)?.spec;
    self.store.list_years(spec).map_err(Error::store)
  }

  pub fn last_year(&self, name: &str) -> Result<Option<Year>> {
    Ok(self.years(name)?.last().copied())
  }

  pub fn exists(&self, name: &str, year: Year) -> Result<bool> {
    let spec = &self.dataset(name)?.spec;
    self.store.exists(spec, year).map_err(Error::store)
  }

  /// How far a dataset year has come: `Absent` until it is stored, then the
  /// dataset's own stage.
  pub fn progress(&self, name: &str, year: Year) -> Result<Progress> {
    let spec = &self.dataset(name)?.spec;
    if self.store.exists(spec, year).map_err(Error::store)? {
      Ok(Progress::At(spec.stage))
    } else {
      Ok(Progress::Absent)
    }
  }

  /// Read a dataset year, generating it first when it is not stored.
  ///
  /// `NotFound`, `MissingDependency` and `Format` errors from generation are
  /// returned as they are. Any other generator failure comes back wrapped in
  /// `Generation`, with the dataset, year and stage attached.
  pub fn load(&self, name: &str, year: Year, rng: &mut dyn RngCore) -> Result<Artifact> {
    let spec = &self.dataset(name)?.spec;
    if self.progress(name, year)? == Progress::Absent {
      debug!(dataset = name, year, "not stored, generating");
      self.generate(name, year, None, rng)?;
    }
    self
      .store
      .read(spec, year)
      .map_err(Error::store)?
      .ok_or_else(|| Error::NotFound {
        dataset: name.to_owned(),
        year,
        stage: spec.stage,
      })
  }

  /// Remove any stored year, then build and write it afresh. Nothing is
  /// written unless generation succeeds.
  pub fn generate(
    &self,
    name: &str,
    year: Year,
    source: Option<&Path>,
    rng: &mut dyn RngCore,
  ) -> Result<()> {
    let dataset = self.dataset(name)?;
    let spec = &dataset.spec;
    let run_id = Uuid::new_v4();
    let span = info_span!("generate", dataset = name, year, run_id = %run_id);
    let _guard = span.enter();

    info!(stage = %spec.stage, "generating");
    self.store.remove(spec, Some(year)).map_err(Error::store)?;

    let mut ctx = Context { catalog: self, spec, year, source, rng };
    let mut artifact = dataset
      .generator
      .generate(&mut ctx)
      .map_err(|e| contextualize(spec, year, e))?;

    let metadata = artifact.metadata_mut();
    metadata.insert("dataset".into(), name.to_owned());
    metadata.insert("year".into(), year.to_string());
    metadata.insert("stage".into(), spec.stage.to_string());
    metadata.insert("run_id".into(), run_id.to_string());

    self
      .store
      .write(spec, year, &artifact)
      .map_err(|e| contextualize(spec, year, Error::store(e)))?;
    info!("written");
    Ok(())
  }

  /// Remove one year, or every stored year when `year` is `None`.
  pub fn remove(&self, name: &str, year: Option<Year>) -> Result<usize> {
    let spec = &self.dataset(name)?.spec;
    let removed = self.store.remove(spec, year).map_err(Error::store)?;
    info!(dataset = name, ?year, removed, "removed");
    Ok(removed)
  }
}

/// Attach dataset, year and stage to a generator failure. Errors that
/// already carry them pass through.
fn contextualize(spec: &DatasetSpec, year: Year, err: Error) -> Error {
  let dataset = spec.name.clone();
  let stage = spec.stage;
  match err {
    Error::NotFound { .. }
    | Error::MissingDependency { .. }
    | Error::Format { .. }
    | Error::Generation { .. } => err,
    Error::Layout(detail) => Error::Format { dataset, year, stage, detail },
    Error::Table(microdata_core::Error::MissingTable(table)) => {
      Error::MissingDependency {
        dataset,
        year,
        stage,
        dependency: format!("table {table}"),
        source: None,
      }
    }
    other => Error::Generation { dataset, year, stage, source: Box::new(other) },
  }
}
