//! Content fingerprints for local files
//!
//! Local items record `sha256:<hex>` in their mark, so a file that did not
//! change between runs is never copied again.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::{Error, Result};

const PREFIX: &str = "sha256:";

/// Hash the file at `path` in fixed-size chunks.
pub fn compute_file_checksum(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::with_capacity(1 << 16, file);
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).map_err(|e| Error::io(path, e))? {
            0 => break,
            n => hasher.update(&chunk[..n]),
        }
    }
    Ok(format!("{PREFIX}{:x}", hasher.finalize()))
}
