//! Inspect command - view a bundle and the chart scoping it resolves to

use bundlepack_convert::{resolve, validate::validate};
use bundlepack_core::{Bundle, load_bundle};
use console::style;
use std::path::Path;

use crate::commands::describe_scoping;
use crate::error::{CliError, Result};

pub fn run(bundle_path: &Path) -> Result<()> {
    let bundle = load_bundle(bundle_path)?;
    let csv = &bundle.csv;

    println!("{} {}", style("Bundle").cyan().bold(), bundle.package_name);
    println!();
    println!("  {}: {}", style("CSV").dim(), csv.name());
    println!(
        "  {}: {}",
        style("Version").dim(),
        csv.spec.version.as_deref().unwrap_or("<unset>")
    );

    let modes = csv.supported_install_modes();
    let mode_names: Vec<String> = modes.iter().map(ToString::to_string).collect();
    println!("  {}: {}", style("Install modes").dim(), mode_names.join(", "));
    match resolve(&modes) {
        Ok(scoping) => println!("  {}: {}", style("Scoping").dim(), describe_scoping(&scoping)),
        Err(e) => println!("  {}: {}", style("Scoping").dim(), style(e).red()),
    }
    println!();

    print_section(
        "Deployments",
        csv.deployments().iter().map(|d| d.name.clone()).collect(),
    );
    print_section(
        "Webhooks",
        csv.spec
            .webhook_definitions
            .iter()
            .map(|w| format!("{} {} -> {}", w.webhook_type, w.generate_name, w.deployment_name))
            .collect(),
    );
    print_section(
        "CRDs",
        bundle
            .crds
            .iter()
            .map(|c| c.metadata.name.clone().unwrap_or_default())
            .collect(),
    );
    print_section("Other objects", other_objects(&bundle));

    match validate(&bundle) {
        Ok(()) => {
            println!("{} {}", style("✓").green().bold(), "bundle can be converted");
            Ok(())
        }
        Err(e) => {
            println!("{}:", style("Problems").red().bold());
            for line in e.to_string().lines() {
                println!("  {} {}", style("✗").red(), line);
            }
            Err(CliError::validation_with_help(
                format!("{} cannot be converted", bundle.package_name),
                "fix the problems listed above",
            ))
        }
    }
}

fn print_section(title: &str, entries: Vec<String>) {
    if entries.is_empty() {
        return;
    }
    println!("{}:", style(title).bold());
    for entry in entries {
        println!("  {}", entry);
    }
    println!();
}

fn other_objects(bundle: &Bundle) -> Vec<String> {
    bundle
        .others
        .iter()
        .map(|o| {
            format!(
                "{} {}",
                o["kind"].as_str().unwrap_or("<unknown>"),
                o["metadata"]["name"].as_str().unwrap_or_default()
            )
        })
        .collect()
}
