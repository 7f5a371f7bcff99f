//! [`SqliteStore`]: the SQLite implementation of [`TableStore`].

use std::{
  collections::{BTreeMap, BTreeSet},
  fs,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension as _, Transaction, params};
use tracing::debug;

use microdata_core::{
  Year,
  arrays::{ArraySet, Artifact},
  stage::{ContainerKind, DatasetSpec},
  store::TableStore,
  table::{Table, TableSet},
};

use crate::{
  Error, Result,
  encode::{RawColumn, decode_dt, encode_column, encode_dt},
  schema::{ARRAY_SCHEMA, COLUMNAR_SCHEMA, META_SCHEMA},
};

/// Store-owned facts about a stored artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactInfo {
  pub container:    ContainerKind,
  pub stage:        String,
  pub generated_at: DateTime<Utc>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A directory of year-stamped SQLite files, laid out as
/// `{root}/{external|model_ready}/{dataset}/{dataset}_{year}.{ext}`.
///
/// Directories are created on first write; reads of a missing directory
/// behave as an empty store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
  root: PathBuf,
}

impl SqliteStore {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  pub fn dir_for(&self, dataset: &DatasetSpec) -> PathBuf {
    self.root.join(dataset.stage.folder()).join(&dataset.name)
  }

  pub fn path_for(&self, dataset: &DatasetSpec, year: Year) -> PathBuf {
    self.dir_for(dataset).join(dataset.file_name(year))
  }

  /// Metadata of a stored artifact without reading its data.
  pub fn info(&self, dataset: &DatasetSpec, year: Year) -> Result<Option<ArtifactInfo>> {
    let path = self.path_for(dataset, year);
    if !path.is_file() {
      return Ok(None);
    }
    let conn = open_read_only(&path)?;
    let meta = read_pairs(&conn, "meta")?;
    let get = |key: &'static str| {
      meta
        .get(key)
        .cloned()
        .ok_or_else(|| Error::MissingMeta { path: path.clone(), key })
    };
    let container = get("container")?;
    Ok(Some(ArtifactInfo {
      container:    container.parse().map_err(|_| Error::ContainerMismatch {
        path:     path.clone(),
        expected: dataset.stage.container(),
        found:    container.clone(),
      })?,
      stage:        get("stage")?,
      generated_at: decode_dt(&get("generated_at")?)?,
    }))
  }
}

fn open_read_only(path: &Path) -> Result<Connection> {
  Ok(Connection::open_with_flags(
    path,
    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
  )?)
}

fn read_pairs(conn: &Connection, table: &str) -> Result<BTreeMap<String, String>> {
  let mut stmt = conn.prepare(&format!("SELECT key, value FROM {table}"))?;
  let rows = stmt
    .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
    .collect::<rusqlite::Result<_>>()?;
  Ok(rows)
}

// ─── Writing ─────────────────────────────────────────────────────────────────

fn write_pairs<'a>(
  tx: &Transaction<'_>,
  table: &str,
  pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<()> {
  let mut stmt =
    tx.prepare(&format!("INSERT INTO {table} (key, value) VALUES (?1, ?2)"))?;
  for (key, value) in pairs {
    stmt.execute(params![key, value])?;
  }
  Ok(())
}

fn write_tables(tx: &Transaction<'_>, tables: &TableSet) -> Result<()> {
  let mut table_stmt =
    tx.prepare("INSERT INTO tables (table_name, n_rows) VALUES (?1, ?2)")?;
  let mut column_stmt = tx.prepare(
    "INSERT INTO columns (table_name, column_name, dtype, width, n_rows, data)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
  )?;
  for (name, table) in tables.iter() {
    table_stmt.execute(params![name, table.n_rows() as i64])?;
    for (column_name, column) in table.iter() {
      let encoded = encode_column(column)?;
      column_stmt.execute(params![
        name,
        column_name,
        encoded.dtype,
        encoded.width,
        encoded.n_rows,
        encoded.data,
      ])?;
    }
  }
  Ok(())
}

fn write_arrays(tx: &Transaction<'_>, arrays: &ArraySet) -> Result<()> {
  let mut stmt = tx.prepare(
    "INSERT INTO arrays (variable, period, entity, dtype, width, n_rows, data)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
  )?;
  for (key, array) in arrays.iter() {
    let encoded = encode_column(&array.values)?;
    stmt.execute(params![
      key.variable,
      key.period,
      array.entity,
      encoded.dtype,
      encoded.width,
      encoded.n_rows,
      encoded.data,
    ])?;
  }
  Ok(())
}

// ─── Reading ─────────────────────────────────────────────────────────────────

fn read_tables(conn: &Connection) -> Result<TableSet> {
  let mut set = TableSet::new();
  let mut tables_stmt =
    conn.prepare("SELECT table_name, n_rows FROM tables ORDER BY table_name")?;
  let tables: Vec<(String, i64)> = tables_stmt
    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
    .collect::<rusqlite::Result<_>>()?;

  let mut columns_stmt = conn.prepare(
    "SELECT column_name, dtype, width, n_rows, data FROM columns
     WHERE table_name = ?1 ORDER BY column_name",
  )?;
  for (table_name, n_rows) in tables {
    let raws: Vec<RawColumn> = columns_stmt
      .query_map(params![table_name], |r| {
        Ok(RawColumn {
          name:   r.get(0)?,
          dtype:  r.get(1)?,
          width:  r.get(2)?,
          n_rows: r.get(3)?,
          data:   r.get(4)?,
        })
      })?
      .collect::<rusqlite::Result<_>>()?;

    let mut table = Table::with_rows(usize::try_from(n_rows).unwrap_or_default());
    for raw in raws {
      let name = raw.name.clone();
      table.insert(name, raw.into_column()?)?;
    }
    set.insert(table_name, table);
  }
  Ok(set)
}

fn read_arrays(conn: &Connection) -> Result<ArraySet> {
  let mut set = ArraySet::new();
  let mut stmt = conn.prepare(
    "SELECT variable, period, entity, dtype, width, n_rows, data FROM arrays
     ORDER BY variable, period",
  )?;
  let rows: Vec<(Year, String, RawColumn)> = stmt
    .query_map([], |r| {
      Ok((
        r.get(1)?,
        r.get(2)?,
        RawColumn {
          name:   r.get(0)?,
          dtype:  r.get(3)?,
          width:  r.get(4)?,
          n_rows: r.get(5)?,
          data:   r.get(6)?,
        },
      ))
    })?
    .collect::<rusqlite::Result<_>>()?;
  for (period, entity, raw) in rows {
    let variable = raw.name.clone();
    set.insert(variable, period, entity, raw.into_column()?)?;
  }
  Ok(set)
}

// ─── TableStore impl ─────────────────────────────────────────────────────────

impl TableStore for SqliteStore {
  type Error = Error;

  fn exists(&self, dataset: &DatasetSpec, year: Year) -> Result<bool> {
    Ok(self.path_for(dataset, year).is_file())
  }

  fn write(&self, dataset: &DatasetSpec, year: Year, artifact: &Artifact) -> Result<()> {
    let path = self.path_for(dataset, year);
    let expected = dataset.stage.container();
    if artifact.container() != expected {
      return Err(Error::ContainerMismatch {
        path,
        expected,
        found: artifact.container().to_string(),
      });
    }

    let dir = self.dir_for(dataset);
    fs::create_dir_all(&dir)?;
    let partial = tempfile::Builder::new()
      .prefix(".")
      .suffix(".partial")
      .tempfile_in(&dir)?;

    {
      let mut conn = Connection::open(partial.path())?;
      conn.execute_batch(META_SCHEMA)?;
      conn.execute_batch(match expected {
        ContainerKind::Columnar => COLUMNAR_SCHEMA,
        ContainerKind::Array => ARRAY_SCHEMA,
      })?;

      let tx = conn.transaction()?;
      let year_text = year.to_string();
      let generated_at = encode_dt(Utc::now());
      write_pairs(&tx, "meta", [
        ("container", expected.as_ref()),
        ("dataset", dataset.name.as_str()),
        ("stage", dataset.stage.as_ref()),
        ("year", year_text.as_str()),
        ("generated_at", generated_at.as_str()),
      ])?;
      write_pairs(
        &tx,
        "attributes",
        artifact.metadata().iter().map(|(k, v)| (k.as_str(), v.as_str())),
      )?;
      match artifact {
        Artifact::Tables(tables) => write_tables(&tx, tables)?,
        Artifact::Arrays(arrays) => write_arrays(&tx, arrays)?,
      }
      tx.commit()?;
      conn.close().map_err(|(_, e)| e)?;
    }

    partial.persist(&path)?;
    debug!(path = %path.display(), "artifact written");
    Ok(())
  }

  fn read(&self, dataset: &DatasetSpec, year: Year) -> Result<Option<Artifact>> {
    let path = self.path_for(dataset, year);
    if !path.is_file() {
      return Ok(None);
    }
    let conn = open_read_only(&path)?;

    let expected = dataset.stage.container();
    let found: Option<String> = conn
      .query_row("SELECT value FROM meta WHERE key = 'container'", [], |r| r.get(0))
      .optional()?;
    let found = found.ok_or_else(|| Error::MissingMeta { path: path.clone(), key: "container" })?;
    if found != expected.as_ref() {
      return Err(Error::ContainerMismatch { path, expected, found });
    }

    let metadata = read_pairs(&conn, "attributes")?;
    let mut artifact = match expected {
      ContainerKind::Columnar => Artifact::Tables(read_tables(&conn)?),
      ContainerKind::Array => Artifact::Arrays(read_arrays(&conn)?),
    };
    *artifact.metadata_mut() = metadata;
    debug!(path = %path.display(), "artifact read");
    Ok(Some(artifact))
  }

  fn remove(&self, dataset: &DatasetSpec, year: Option<Year>) -> Result<usize> {
    let years: Vec<Year> = match year {
      Some(year) => vec![year],
      None => self.list_years(dataset)?.into_iter().collect(),
    };
    let mut removed = 0;
    for year in years {
      let path = self.path_for(dataset, year);
      if path.is_file() {
        fs::remove_file(&path)?;
        debug!(path = %path.display(), "artifact removed");
        removed += 1;
      }
    }
    Ok(removed)
  }

  fn list_years(&self, dataset: &DatasetSpec) -> Result<BTreeSet<Year>> {
    let dir = self.dir_for(dataset);
    if !dir.is_dir() {
      return Ok(BTreeSet::new());
    }
    let mut years = BTreeSet::new();
    for entry in fs::read_dir(&dir)? {
      let entry = entry?;
      if let Some(name) = entry.file_name().to_str()
        && let Some(year) = dataset.parse_file_name(name)
      {
        years.insert(year);
      }
    }
    Ok(years)
  }
}
