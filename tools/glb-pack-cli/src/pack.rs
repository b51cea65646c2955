//! Single-scene packing: read a `.gltf`, pack it, write the `.glb` and its variants

use anyhow::{Context, Result};
use glb_pack::{
    Fetcher, ResourceMap, ResourceProvider, SceneDocument, VariantOutcome, VariantSpec,
    pack_variants,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything needed to pack one scene
#[derive(Debug, Clone)]
pub struct PackJob {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Directory for the resource map (defaults to the input's directory)
    pub resources: Option<PathBuf>,
    /// Fetch resources relative to the input instead of building a map
    pub fetch: bool,
    pub timeout: Option<Duration>,
    pub variants: Vec<VariantSpec>,
}

/// What a job wrote
#[derive(Debug, Default)]
pub struct PackReport {
    pub written: Vec<PathBuf>,
    /// Suffixes of variants that had nothing to scale
    pub skipped: Vec<String>,
    /// Suffixes of variants whose images failed to scale
    pub failed: Vec<String>,
}

/// Parse `SIZE:SUFFIX` (e.g. `2048:2k`)
pub fn parse_variant(arg: &str) -> std::result::Result<VariantSpec, String> {
    let (size, suffix) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected SIZE:SUFFIX, got '{}'", arg))?;
    let size: u32 = size
        .trim()
        .parse()
        .map_err(|e| format!("invalid texture size '{}': {}", size, e))?;
    let suffix = suffix.trim();
    if suffix.is_empty() {
        return Err("variant suffix must not be empty".into());
    }
    VariantSpec::new(suffix, size).map_err(|e| e.to_string())
}

/// `out/scene.glb` + `2k` -> `out/scene.2k.glb`
pub fn variant_path(output: &Path, suffix: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{}.{}.glb", stem, suffix))
}

/// Runtime for driving the async pipeline from synchronous code
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create runtime")
}

/// Pack one scene on an existing runtime
pub fn run(rt: &tokio::runtime::Runtime, job: &PackJob) -> Result<PackReport> {
    let source = std::fs::read(&job.input)
        .with_context(|| format!("Failed to read glTF: {:?}", job.input))?;
    let document = SceneDocument::from_slice(&source)
        .with_context(|| format!("Failed to parse glTF: {:?}", job.input))?;
    let provider = provider_for(job)?;

    let packed = rt
        .block_on(pack_variants(&document, &provider, &job.variants))
        .with_context(|| format!("Failed to pack {:?}", job.input))?;

    if let Some(parent) = job.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }

    let mut report = PackReport::default();
    write_output(&job.output, &packed.original)?;
    report.written.push(job.output.clone());

    for (spec, outcome) in packed.variants {
        match outcome {
            VariantOutcome::Packed(bytes) => {
                let path = variant_path(&job.output, &spec.suffix);
                write_output(&path, &bytes)?;
                report.written.push(path);
            }
            VariantOutcome::NotApplicable(reason) => {
                tracing::warn!(
                    "Unable to scale {:?} to {}px: {}",
                    job.input,
                    spec.scale.edge(),
                    reason
                );
                report.skipped.push(spec.suffix);
            }
            VariantOutcome::Failed(e) => {
                tracing::error!("Variant '{}' of {:?} failed: {}", spec.suffix, job.input, e);
                report.failed.push(spec.suffix);
            }
        }
    }

    Ok(report)
}

fn provider_for(job: &PackJob) -> Result<ResourceProvider> {
    let input_dir = job
        .input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    if job.fetch {
        let mut fetcher = Fetcher::new().with_base_dir(input_dir);
        if let Some(timeout) = job.timeout {
            fetcher = fetcher.with_timeout(timeout);
        }
        return Ok(ResourceProvider::fetch(fetcher));
    }

    let dir = job.resources.as_deref().unwrap_or(input_dir);
    let map = ResourceMap::from_dir(dir)
        .with_context(|| format!("Failed to read resources from {:?}", dir))?;
    tracing::debug!("Loaded {} resources from {:?}", map.len(), dir);
    Ok(ResourceProvider::map(map))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {:?}", path))?;
    tracing::info!("Wrote {:?} ({} bytes)", path, bytes.len());
    Ok(())
}
