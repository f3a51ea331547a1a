//! Convert command - turn a registry+v1 bundle into a chart

use bundlepack_convert::{ConvertOptions, Converter, ScopingConfig};
use bundlepack_core::{Chart, archive::create_archive, load_bundle};
use console::style;
use std::path::{Path, PathBuf};

use crate::commands::describe_scoping;
use crate::error::{CliError, Result};

pub fn run(
    bundle_path: &Path,
    output: Option<&Path>,
    cert_provider: Option<&str>,
    archive: bool,
    force: bool,
) -> Result<()> {
    let bundle = load_bundle(bundle_path)?;

    let mut options = ConvertOptions::new();
    if let Some(name) = cert_provider {
        options = options.certificate_provider(name);
    }
    let converter = Converter::new(options);
    let scoping = converter.scoping(&bundle)?;
    let chart = converter.convert(&bundle)?;

    let written = if archive {
        write_archive(&chart, output, force)?
    } else {
        write_dir(&chart, output, force)?
    };

    print_summary(&chart, &scoping, &written);
    Ok(())
}

fn write_dir(chart: &Chart, output: Option<&Path>, force: bool) -> Result<PathBuf> {
    let dir = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&chart.metadata.name));

    if dir.exists() {
        let empty = dir.is_dir()
            && std::fs::read_dir(&dir)
                .map_err(|e| CliError::io_at(&dir, e))?
                .next()
                .is_none();
        if !empty && !force {
            return Err(CliError::OutputExists {
                path: dir.display().to_string(),
            });
        }
        if !empty {
            tracing::debug!(path = %dir.display(), "removing previous output");
            std::fs::remove_dir_all(&dir).map_err(|e| CliError::io_at(&dir, e))?;
        }
    }

    Ok(chart.write_to_dir(&dir)?)
}

fn write_archive(chart: &Chart, output: Option<&Path>, force: bool) -> Result<PathBuf> {
    let dir = output.unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| CliError::io_at(dir, e))?;

    let path = dir.join(chart.default_archive_name());
    if path.exists() && !force {
        return Err(CliError::OutputExists {
            path: path.display().to_string(),
        });
    }

    Ok(create_archive(chart, &path)?)
}

fn print_summary(chart: &Chart, scoping: &ScopingConfig, written: &Path) {
    println!(
        "{} {} {} {}",
        style("Converted").green().bold(),
        chart.metadata.name,
        chart.metadata.version,
        style(format!("({} templates)", chart.templates.len())).dim()
    );
    println!("  {} {}", style("Scoping:").dim(), describe_scoping(scoping));
    println!("  {} {}", style("Output:").dim(), written.display());
}
