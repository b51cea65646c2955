//! Container inspection for the `info` command

use anyhow::{Context, Result};
use glb_pack::{GlbContainer, decode};
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// Summary of a decoded GLB container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub version: u32,
    pub total_length: u32,
    pub json_chunk_length: u32,
    pub bin_chunk_length: Option<usize>,
    pub buffers: usize,
    pub buffer_views: usize,
    pub images: usize,
    pub embedded_images: usize,
    pub generator: Option<String>,
}

impl ContainerInfo {
    pub fn from_container(container: &GlbContainer<'_>) -> Self {
        let json = &container.json;
        let count = |key: &str| json.get(key).and_then(Value::as_array).map_or(0, Vec::len);
        let embedded_images = json
            .get("images")
            .and_then(Value::as_array)
            .map_or(0, |images| {
                images
                    .iter()
                    .filter(|image| image.get("bufferView").is_some())
                    .count()
            });

        Self {
            version: container.header.version,
            total_length: container.header.length,
            json_chunk_length: container.json_chunk_length,
            bin_chunk_length: container.bin.map(<[u8]>::len),
            buffers: count("buffers"),
            buffer_views: count("bufferViews"),
            images: count("images"),
            embedded_images,
            generator: json
                .get("asset")
                .and_then(|asset| asset.get("generator"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

impl fmt::Display for ContainerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GLB version:   {}", self.version)?;
        writeln!(f, "Total length:  {} bytes", self.total_length)?;
        writeln!(f, "JSON chunk:    {} bytes", self.json_chunk_length)?;
        match self.bin_chunk_length {
            Some(len) => writeln!(f, "BIN chunk:     {} bytes", len)?,
            None => writeln!(f, "BIN chunk:     none")?,
        }
        writeln!(f, "Buffers:       {}", self.buffers)?;
        writeln!(f, "BufferViews:   {}", self.buffer_views)?;
        write!(
            f,
            "Images:        {} ({} embedded)",
            self.images, self.embedded_images
        )?;
        if let Some(generator) = &self.generator {
            write!(f, "\nGenerator:     {}", generator)?;
        }
        Ok(())
    }
}

/// Read and summarize a `.glb` file
pub fn inspect(path: &Path) -> Result<ContainerInfo> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let container = decode(&bytes).with_context(|| format!("Failed to decode {:?}", path))?;
    Ok(ContainerInfo::from_container(&container))
}
