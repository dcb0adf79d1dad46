//! Downloadable coverage archive

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use tar::{Builder, Header};

use crate::error::Result;

/// Path of the aggregate inside the archive
pub const ARCHIVE_ENTRY: &str = "coverage/coverage.json";

/// Gzip tarball holding the pretty-printed aggregate at [`ARCHIVE_ENTRY`].
pub fn build_archive(coverage: &Value) -> Result<Vec<u8>> {
    let json = serde_json::to_vec_pretty(coverage)?;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    let mut header = Header::new_gnu();
    header.set_size(json.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, ARCHIVE_ENTRY, json.as_slice())?;

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}
