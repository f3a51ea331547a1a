//! Template command - render chart templates locally

use bundlepack_core::{Chart, ReleaseInfo, RenderContext, SchemaValidator, Values, parse_set_values};
use bundlepack_engine::Engine;
use console::style;
use miette::{IntoDiagnostic, WrapErr};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CliError, Result};

#[allow(clippy::too_many_arguments)]
pub fn run(
    chart_path: &Path,
    values_files: &[PathBuf],
    set_values: &[String],
    namespace: &str,
    release_name: &str,
    output_dir: Option<&Path>,
    show_only: Option<&str>,
    skip_schema: bool,
) -> Result<()> {
    let chart = Chart::load(chart_path)?;
    tracing::debug!(
        chart = %chart.metadata.name,
        version = %chart.metadata.version,
        templates = chart.templates.len(),
        "loaded chart"
    );

    // Chart defaults, then -f files in order, then --set overrides
    let mut values = chart.values.clone();
    for values_file in values_files {
        let file_values = Values::from_file(values_file)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to load values file: {}", values_file.display()))?;
        values.merge(&file_values);
        tracing::debug!(file = %values_file.display(), "merged values");
    }
    if !set_values.is_empty() {
        let set_vals = parse_set_values(set_values)
            .into_diagnostic()
            .wrap_err("Failed to parse --set values")?;
        values.merge(&set_vals);
    }

    if !skip_schema && !chart.values_schema.is_null() {
        validate_values(&chart, &values)?;
    }

    let release = ReleaseInfo::new(release_name, namespace);
    let context = RenderContext::new(values, release, &chart.metadata);
    let result = Engine::default().render_chart(&chart, &context)?;

    let selected = result
        .manifests
        .iter()
        .filter(|(path, _)| show_only.is_none_or(|filter| path.contains(filter)));

    match output_dir {
        Some(output_path) => {
            for (path, content) in selected {
                let file_path = output_path.join(path);
                if let Some(parent) = file_path.parent() {
                    fs::create_dir_all(parent).map_err(|e| CliError::io_at(parent, e))?;
                }
                fs::write(&file_path, content).map_err(|e| CliError::io_at(&file_path, e))?;
                println!("{} {}", style("wrote").green(), file_path.display());
            }
        }
        None => {
            for (path, content) in selected {
                println!("---");
                println!("{}", style(format!("# Source: {}", path)).dim());
                println!("{}", content.trim());
            }
        }
    }

    Ok(())
}

fn validate_values(chart: &Chart, values: &Values) -> Result<()> {
    let validator = SchemaValidator::new(&chart.values_schema)?;
    let result = validator.validate(values.inner());
    if result.valid {
        return Ok(());
    }

    let errors: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
    Err(CliError::validation_with_help(
        errors.join("; "),
        format!(
            "the values accepted by {} are listed in its values.schema.json; pass --skip-schema to render anyway",
            chart.metadata.name
        ),
    ))
}
