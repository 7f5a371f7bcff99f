//! SQL schemas for the two container kinds.
//!
//! A file is written once, so there are no migrations; `PRAGMA user_version`
//! records the layout version a reader can expect.

/// Store-owned facts about the file: container, dataset, stage, year and
/// generation time.
pub const META_SCHEMA: &str = "
CREATE TABLE meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Free-form provenance carried by the artifact itself.
CREATE TABLE attributes (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Named tables of named columns.
pub const COLUMNAR_SCHEMA: &str = "
CREATE TABLE tables (
    table_name TEXT PRIMARY KEY,
    n_rows     INTEGER NOT NULL
);

CREATE TABLE columns (
    table_name  TEXT NOT NULL REFERENCES tables(table_name),
    column_name TEXT NOT NULL,
    dtype       TEXT NOT NULL,   -- 'f64' | 'i64' | 'utf8' | 'bytes'
    width       INTEGER,         -- element width for 'bytes', else NULL
    n_rows      INTEGER NOT NULL,
    data        BLOB NOT NULL,
    PRIMARY KEY (table_name, column_name)
);

PRAGMA user_version = 1;
";

/// Flat `{variable}/{period}` arrays. Strings must be fixed width.
pub const ARRAY_SCHEMA: &str = "
CREATE TABLE arrays (
    variable TEXT NOT NULL,
    period   INTEGER NOT NULL,
    entity   TEXT NOT NULL,
    dtype    TEXT NOT NULL CHECK (dtype IN ('f64', 'i64', 'bytes')),
    width    INTEGER,
    n_rows   INTEGER NOT NULL,
    data     BLOB NOT NULL,
    PRIMARY KEY (variable, period)
);

CREATE INDEX arrays_period_idx ON arrays(period, entity);

PRAGMA user_version = 1;
";
