//! In-memory zip building for [`StorageBackend::archive`](super::StorageBackend::archive).
//!
//! Entries keep their asset names verbatim and are DEFLATE-compressed.

use crate::error::{MediaError, Result};
use std::io::{Cursor, Write};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// Build a zip archive from `(entry name, bytes)` pairs.
pub fn zip_entries(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));

    for (name, bytes) in entries {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(bytes)
            .map_err(|e| MediaError::backend(format!("writing archive entry {name}"), e))?;
    }

    let cursor = zip.finish()?;
    tracing::debug!(entries = entries.len(), "built zip archive");
    Ok(cursor.into_inner())
}
