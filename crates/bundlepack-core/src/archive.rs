//! Chart archives (`.tgz`)
//!
//! Entries are stored under a `<chart name>/` prefix with fixed modes and
//! timestamps, so packaging the same chart twice yields identical bytes.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::{Builder, Header};

use crate::chart::Chart;
use crate::error::Result;

/// Create a gzip-compressed tar archive of `chart` at `output`
pub fn create_archive(chart: &Chart, output: &Path) -> Result<PathBuf> {
    let file = File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    for chart_file in chart.files()? {
        let archive_path = format!("{}/{}", chart.metadata.name, chart_file.path);
        add_bytes_to_archive(&mut builder, &archive_path, &chart_file.data)?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;

    Ok(output.to_path_buf())
}

fn add_bytes_to_archive<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &str,
    content: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();

    builder.append_data(&mut header, archive_path, content)?;

    Ok(())
}
