//! bundlepack CLI - convert registry+v1 operator bundles into charts

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;

#[derive(Parser)]
#[command(name = "bundlepack")]
#[command(version)]
#[command(about = "Convert registry+v1 operator bundles into installable charts", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a bundle directory into a chart
    Convert {
        /// Bundle directory (holding `manifests/` and `metadata/`)
        bundle: PathBuf,

        /// Output directory (default: ./<package name>, or . with --archive)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Certificate provider for webhook TLS
        #[arg(long, env = "BUNDLEPACK_CERT_PROVIDER")]
        cert_provider: Option<String>,

        /// Write a `<name>-<version>.tgz` archive instead of a directory
        #[arg(long)]
        archive: bool,

        /// Overwrite existing output
        #[arg(long)]
        force: bool,
    },

    /// Render chart templates locally
    Template {
        /// Chart directory
        chart: PathBuf,

        /// Values file(s) to merge
        #[arg(short = 'f', long = "values")]
        values: Vec<PathBuf>,

        /// Set values on command line (key=value)
        #[arg(long = "set")]
        set: Vec<String>,

        /// Namespace the release is installed into
        #[arg(short, long, default_value = "default", env = "BUNDLEPACK_NAMESPACE")]
        namespace: String,

        /// Release name (for template context)
        #[arg(long, default_value = "release")]
        release_name: String,

        /// Output directory (if not set, outputs to stdout)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Show only templates whose path contains this text
        #[arg(short = 's', long)]
        show_only: Option<String>,

        /// Skip schema validation before rendering
        #[arg(long)]
        skip_schema: bool,
    },

    /// Show a bundle's contents and the scoping its chart would expose
    Inspect {
        /// Bundle directory
        bundle: PathBuf,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> error::Result<()> {
    match cli.command {
        Commands::Convert {
            bundle,
            output,
            cert_provider,
            archive,
            force,
        } => commands::convert::run(
            &bundle,
            output.as_deref(),
            cert_provider.as_deref(),
            archive,
            force,
        ),

        Commands::Template {
            chart,
            values,
            set,
            namespace,
            release_name,
            output_dir,
            show_only,
            skip_schema,
        } => commands::template::run(
            &chart,
            &values,
            &set,
            &namespace,
            &release_name,
            output_dir.as_deref(),
            show_only.as_deref(),
            skip_schema,
        ),

        Commands::Inspect { bundle } => commands::inspect::run(&bundle),
    }
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let code = match run(cli) {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}
