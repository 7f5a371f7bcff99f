//! Dataset stages and their one-way progression.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Survey vintage label.
pub type Year = i32;

// ─── Stage ───────────────────────────────────────────────────────────────────

/// Processing stage of a dataset. Ordered: a stage may only read from
/// stages at or before itself.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
  Raw,
  Base,
  ModelReady,
}

impl Stage {
  /// Top-level folder of the store that holds this stage.
  pub fn folder(self) -> &'static str {
    match self {
      Self::Raw => "external",
      Self::Base | Self::ModelReady => "model_ready",
    }
  }

  pub fn container(self) -> ContainerKind {
    match self {
      Self::Raw => ContainerKind::Columnar,
      Self::Base | Self::ModelReady => ContainerKind::Array,
    }
  }

  /// A dataset may be derived from one at its own stage or an earlier one.
  pub fn may_read(self, upstream: Stage) -> bool { upstream <= self }
}

/// Physical container of a stored artifact.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ContainerKind {
  /// Named tables of named columns.
  Columnar,
  /// Flat `{variable}/{period}` arrays tagged with their entity.
  Array,
}

impl ContainerKind {
  pub fn extension(self) -> &'static str {
    match self {
      Self::Columnar => "tables.db",
      Self::Array => "arrays.db",
    }
  }
}

// ─── Progress ────────────────────────────────────────────────────────────────

/// Where one survey year stands on `absent → raw → base → model_ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Progress {
  Absent,
  At(Stage),
}

impl Progress {
  /// Move forward to `stage`. Deriving a second dataset at the same stage is
  /// allowed; moving back is not, and requires removal first.
  pub fn advance(self, stage: Stage) -> Result<Progress> {
    match self {
      Self::At(current) if !stage.may_read(current) => {
        Err(Error::BackwardTransition { from: current, to: stage })
      }
      _ => Ok(Self::At(stage)),
    }
  }
}

// ─── DatasetSpec ─────────────────────────────────────────────────────────────

/// Name and stage of a dataset; together they fix where its files live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetSpec {
  pub name:  String,
  pub stage: Stage,
}

impl DatasetSpec {
  pub fn new(name: impl Into<String>, stage: Stage) -> Self {
    Self { name: name.into(), stage }
  }

  /// `{name}_{year}.{ext}`
  pub fn file_name(&self, year: Year) -> String {
    format!("{}_{year}.{}", self.name, self.stage.container().extension())
  }

  /// The year encoded in a file name produced by [`DatasetSpec::file_name`].
  pub fn parse_file_name(&self, file_name: &str) -> Option<Year> {
    file_name
      .strip_prefix(self.name.as_str())?
      .strip_prefix('_')?
      .strip_suffix(self.stage.container().extension())?
      .strip_suffix('.')?
      .parse()
      .ok()
  }
}
