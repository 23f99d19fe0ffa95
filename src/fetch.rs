//! Reads an input source from disk or over HTTP.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    let resp = reqwest::blocking::get(url)?.error_for_status()?;
    Ok(resp.bytes()?.to_vec())
}

/// Loads the raw bytes behind `source`, a local path or an `http(s)` URL.
///
/// Gzip-compressed payloads are decompressed transparently.
#[tracing::instrument]
pub fn read_source(source: &str) -> Result<Vec<u8>> {
    let bytes = if is_remote(source) {
        fetch_bytes(source).with_context(|| format!("Failed to fetch {}", source))?
    } else {
        std::fs::read(source).with_context(|| format!("Failed to read {}", source))?
    };

    maybe_gunzip(bytes)
}

/// True only for sources that parse as an `http` or `https` URL.
fn is_remote(source: &str) -> bool {
    reqwest::Url::parse(source)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn maybe_gunzip(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(bytes);
    }

    let mut out = Vec::new();
    GzDecoder::new(bytes.as_slice())
        .read_to_end(&mut out)
        .context("Failed to decompress gzip input")?;
    debug!(compressed = bytes.len(), decompressed = out.len(), "Decompressed input");
    Ok(out)
}
