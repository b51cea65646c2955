//! glb-pack - pack glTF scenes into self-contained GLB files
//!
//! Packs a `.gltf` and its buffers/textures into one `.glb`, optionally with
//! down-scaled texture variants, either one scene at a time or from a
//! glb-pack.toml manifest.

mod info;
mod manifest;
mod pack;

use anyhow::Result;
use clap::{Parser, Subcommand};
use glb_pack::VariantSpec;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "glb-pack")]
#[command(about = "Pack glTF scenes into GLB containers")]
#[command(version)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a single glTF file
    Pack {
        /// Input .gltf file
        input: PathBuf,

        /// Output .glb file (default: input with .glb extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory holding the referenced files (default: the input's directory)
        #[arg(short, long, conflicts_with = "fetch")]
        resources: Option<PathBuf>,

        /// Fetch resources by URI instead of looking them up by file name
        #[arg(long)]
        fetch: bool,

        /// Scaled texture variant as SIZE:SUFFIX (e.g. 2048:2k), repeatable
        #[arg(long = "variant", value_parser = pack::parse_variant)]
        variants: Vec<VariantSpec>,

        /// Per-resource fetch timeout in seconds
        #[arg(long, requires = "fetch")]
        timeout: Option<u64>,
    },

    /// Pack all scenes from a manifest file
    Build {
        /// Path to glb-pack.toml manifest
        #[arg(default_value = "glb-pack.toml")]
        manifest: PathBuf,

        /// Output directory (overrides manifest)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate manifest without building
    Check {
        /// Path to glb-pack.toml manifest
        #[arg(default_value = "glb-pack.toml")]
        manifest: PathBuf,
    },

    /// Show the structure of a .glb file
    Info {
        /// Input .glb file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match cli.command {
        Commands::Pack {
            input,
            output,
            resources,
            fetch,
            variants,
            timeout,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("glb"));
            tracing::info!("Packing {:?} -> {:?}", input, output);

            let job = pack::PackJob {
                input,
                output,
                resources,
                fetch,
                timeout: timeout.map(Duration::from_secs),
                variants,
            };
            let rt = pack::runtime()?;
            let report = pack::run(&rt, &job)?;

            if !report.skipped.is_empty() {
                tracing::info!("Skipped variants: {}", report.skipped.join(", "));
            }
            if !report.failed.is_empty() {
                anyhow::bail!("Failed variants: {}", report.failed.join(", "));
            }
            tracing::info!("Done! Wrote {} file(s)", report.written.len());
        }

        Commands::Build { manifest, output } => {
            tracing::info!("Building scenes from {:?}", manifest);
            let config = manifest::load_manifest(&manifest)?;
            manifest::build_all(&config, output.as_deref())?;
            tracing::info!("Build complete!");
        }

        Commands::Check { manifest } => {
            tracing::info!("Checking manifest {:?}", manifest);
            let config = manifest::load_manifest(&manifest)?;
            manifest::validate(&config)?;
            tracing::info!("Manifest is valid!");
        }

        Commands::Info { input } => {
            let info = info::inspect(&input)?;
            println!("{}", info);
        }
    }

    Ok(())
}
