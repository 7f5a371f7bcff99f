//! Remote source retrieval.
//!
//! Downloads are blocking and linear. Progress is logged every
//! [`PROGRESS_STEP`] bytes; a non-success status is fatal and reported with
//! the URL and status.

use std::io::{Read as _, Write};

use tracing::info;

use crate::{Error, Result};

pub const PROGRESS_STEP: u64 = 10 * 1024 * 1024;

const CHUNK: usize = 1024 * 1024;

/// Something that can copy a remote resource into a writer.
pub trait Fetcher {
  /// Copy `url` into `dest`; returns the number of bytes written.
  fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<u64>;
}

/// Plain HTTP(S) GET via a blocking `reqwest` client.
pub struct HttpFetcher {
  client: reqwest::blocking::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::blocking::Client::builder()
      .user_agent(concat!("microdata/", env!("CARGO_PKG_VERSION")))
      .timeout(None)
      .build()?;
    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<u64> {
    info!(url, "downloading");
    let mut response = self.client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
      return Err(Error::Download { url: url.to_owned(), status: status.as_u16() });
    }

    let total = response.content_length();
    let mut buf = vec![0u8; CHUNK];
    let mut written = 0u64;
    let mut next_report = PROGRESS_STEP;
    loop {
      let n = response.read(&mut buf)?;
      if n == 0 {
        break;
      }
      dest.write_all(&buf[..n])?;
      written += n as u64;
      if written >= next_report {
        info!(url, written, total, "download progress");
        next_report += PROGRESS_STEP;
      }
    }
    dest.flush()?;
    info!(url, bytes = written, "download complete");
    Ok(written)
  }
}
