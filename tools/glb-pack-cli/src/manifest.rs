//! Manifest parsing and batch builds
//!
//! Parses glb-pack.toml and packs every listed scene. Relative paths are
//! resolved against the manifest's directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pack::{self, PackJob};
use glb_pack::VariantSpec;

/// Root manifest structure
#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub scenes: BTreeMap<String, SceneEntry>,
    #[serde(default)]
    pub variants: Vec<VariantEntry>,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("glb/")
}

#[derive(Debug, Deserialize, Default)]
pub struct FetchConfig {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SceneEntry {
    Simple(PathBuf),
    Detailed {
        path: PathBuf,
        #[serde(default)]
        resources: Option<PathBuf>,
        #[serde(default)]
        fetch: bool,
    },
}

impl SceneEntry {
    pub fn path(&self) -> &Path {
        match self {
            SceneEntry::Simple(p) => p,
            SceneEntry::Detailed { path, .. } => path,
        }
    }

    pub fn resources(&self) -> Option<&Path> {
        match self {
            SceneEntry::Simple(_) => None,
            SceneEntry::Detailed { resources, .. } => resources.as_deref(),
        }
    }

    pub fn fetch(&self) -> bool {
        match self {
            SceneEntry::Simple(_) => false,
            SceneEntry::Detailed { fetch, .. } => *fetch,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantEntry {
    pub texture_size: u32,
    pub suffix: String,
}

impl Manifest {
    fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    fn variant_specs(&self) -> Result<Vec<VariantSpec>> {
        self.variants
            .iter()
            .map(|v| {
                VariantSpec::new(v.suffix.clone(), v.texture_size)
                    .with_context(|| format!("Invalid variant '{}'", v.suffix))
            })
            .collect()
    }

    /// One pack job per scene, in name order
    pub fn jobs(&self, output_override: Option<&Path>) -> Result<Vec<PackJob>> {
        let output_dir = match output_override {
            Some(dir) => dir.to_path_buf(),
            None => self.resolve(&self.output.dir),
        };
        let variants = self.variant_specs()?;
        let timeout = self.fetch.timeout_secs.map(Duration::from_secs);

        Ok(self
            .scenes
            .iter()
            .map(|(name, entry)| PackJob {
                input: self.resolve(entry.path()),
                output: output_dir.join(format!("{}.glb", name)),
                resources: entry.resources().map(|r| self.resolve(r)),
                fetch: entry.fetch(),
                timeout,
                variants: variants.clone(),
            })
            .collect())
    }
}

/// Load and parse a manifest file
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {:?}", path))?;
    let mut manifest: Manifest = toml::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {:?}", path))?;
    manifest.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(manifest)
}

/// Validate a manifest without building
pub fn validate(manifest: &Manifest) -> Result<()> {
    if manifest.scenes.is_empty() {
        anyhow::bail!("Manifest lists no scenes");
    }

    // Check that all source files exist
    for (name, entry) in &manifest.scenes {
        let path = manifest.resolve(entry.path());
        if !path.is_file() {
            anyhow::bail!("Scene '{}' source not found: {:?}", name, path);
        }
        if let Some(resources) = entry.resources() {
            let resources = manifest.resolve(resources);
            if !resources.is_dir() {
                anyhow::bail!("Scene '{}' resources directory not found: {:?}", name, resources);
            }
        }
    }

    let mut suffixes = HashSet::new();
    for variant in &manifest.variants {
        if variant.suffix.trim().is_empty() {
            anyhow::bail!("Variant with texture_size {} has an empty suffix", variant.texture_size);
        }
        if variant.texture_size == 0 {
            anyhow::bail!("Variant '{}' has texture_size 0", variant.suffix);
        }
        if !suffixes.insert(variant.suffix.as_str()) {
            anyhow::bail!("Duplicate variant suffix '{}'", variant.suffix);
        }
    }

    Ok(())
}

/// Build all scenes from a manifest
pub fn build_all(manifest: &Manifest, output_override: Option<&Path>) -> Result<()> {
    validate(manifest)?;
    let jobs = manifest.jobs(output_override)?;
    let rt = pack::runtime()?;

    let mut failed = Vec::new();
    let mut skipped = 0;
    for job in &jobs {
        tracing::info!("Packing scene: {:?} -> {:?}", job.input, job.output);
        let report = pack::run(&rt, job)?;
        skipped += report.skipped.len();
        for suffix in report.failed {
            failed.push(format!("{}.{}", job.output.display(), suffix));
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("{} variant(s) failed: {}", failed.len(), failed.join(", "));
    }

    tracing::info!(
        "Packed {} scene(s), {} variant(s) skipped",
        jobs.len(),
        skipped
    );
    Ok(())
}
