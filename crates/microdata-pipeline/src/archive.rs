//! Scratch extraction of release archives.
//!
//! An [`Unpacked`] archive lives in a temporary directory that is deleted
//! when the value is dropped, whether or not the year succeeded.

use std::{
  fs::{self, File},
  io::{self, Read, Seek},
  path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::Result;

pub struct Unpacked {
  dir: TempDir,
}

impl Unpacked {
  pub fn open(path: &Path) -> Result<Self> {
    Self::from_reader(File::open(path)?)
  }

  pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
    let dir = TempDir::new()?;
    let mut archive = ZipArchive::new(reader)?;
    archive.extract(dir.path())?;
    debug!(entries = archive.len(), dir = %dir.path().display(), "archive unpacked");
    Ok(Self { dir })
  }

  pub fn root(&self) -> &Path { self.dir.path() }

  /// First directory anywhere in the archive named `name`.
  pub fn find_dir(&self, name: &str) -> Option<PathBuf> {
    WalkDir::new(self.root())
      .sort_by_file_name()
      .into_iter()
      .filter_map(|e| e.ok())
      .find(|e| e.file_type().is_dir() && e.file_name().eq_ignore_ascii_case(name))
      .map(|e| e.into_path())
  }

  /// First file anywhere in the archive named `name`, ignoring ASCII case.
  pub fn find_file(&self, name: &str) -> Option<PathBuf> {
    self.files(self.root(), |n| n.eq_ignore_ascii_case(name)).into_iter().next()
  }

  /// Files under `dir` whose names satisfy `keep`, sorted by path.
  pub fn files(&self, dir: &Path, keep: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    WalkDir::new(dir)
      .sort_by_file_name()
      .into_iter()
      .filter_map(|e| e.ok())
      .filter(|e| e.file_type().is_file())
      .filter(|e| e.file_name().to_str().is_some_and(&keep))
      .map(|e| e.into_path())
      .collect()
  }
}

/// Read a release file. Survey releases are not reliably UTF-8, so invalid
/// sequences are replaced rather than rejected.
pub fn read_text(path: &Path) -> Result<String> {
  let bytes = fs::read(path)?;
  Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
  let mut hasher = Sha256::new();
  io::copy(&mut File::open(path)?, &mut hasher)?;
  Ok(hex::encode(hasher.finalize()))
}


#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::{testing::zip_bytes, *};

  #[test]
  fn finds_nested_directories_and_files() {
    let bytes = zip_bytes(&[
      ("UKDA-1234-tab/tab/adult.tab", "sernum\n1\n"),
      ("UKDA-1234-tab/tab/househol.tab", "sernum\n1\n"),
      ("UKDA-1234-tab/mrdoc/readme.txt", "docs"),
    ]);
    let unpacked = Unpacked::from_reader(Cursor::new(bytes)).unwrap();

    let tab = unpacked.find_dir("tab").unwrap();
    assert!(tab.ends_with("UKDA-1234-tab/tab"));
    let names: Vec<_> = unpacked
      .files(&tab, |n| n.ends_with(".tab"))
      .iter()
      .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, vec!["adult.tab", "househol.tab"]);
    assert!(unpacked.find_file("README.TXT").is_some());
    assert!(unpacked.find_dir("csv").is_none());
  }

  #[test]
  fn scratch_directory_is_removed_on_drop() {
    let bytes = zip_bytes(&[("a.csv", "A\n1\n")]);
    let unpacked = Unpacked::from_reader(Cursor::new(bytes)).unwrap();
    let root = unpacked.root().to_path_buf();
    assert!(root.join("a.csv").is_file());
    drop(unpacked);
    assert!(!root.exists());
  }

  #[test]
  fn digest_is_stable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x");
    fs::write(&path, "abc").unwrap();
    assert_eq!(
      sha256_file(&path).unwrap(),
      "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
  }
}
