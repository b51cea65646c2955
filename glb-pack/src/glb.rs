//! GLB container encoding and decoding
//!
//! # Layout
//! ```text
//! Header (12 bytes):
//! 0x00: magic u32      - 0x46546C67 ("glTF")
//! 0x04: version u32    - 2
//! 0x08: length u32     - Total container length in bytes
//!
//! Chunk 0 (JSON):
//! 0x0C: length u32     - Padded JSON length (multiple of 4)
//! 0x10: type u32       - 0x4E4F534A ("JSON")
//! 0x14: payload        - UTF-8 JSON, padded with 0x20
//!
//! Chunk 1 (BIN, omitted when there is no binary data):
//!       length u32     - Binary payload length
//!       type u32       - 0x004E4942 ("BIN\0")
//!       payload        - Resources at their planned offsets, gaps zeroed
//! ```
//!
//! All integers are little-endian.

use crate::document::SceneDocument;
use crate::error::{PackError, Result};
use crate::layout::{ALIGNMENT, LayoutPlan, align_up};
use crate::resource::Resource;
use serde_json::Value;

/// "glTF"
pub const GLB_MAGIC: u32 = 0x4654_6C67;
pub const GLB_VERSION: u32 = 2;
/// "JSON"
pub const CHUNK_JSON: u32 = 0x4E4F_534A;
/// "BIN\0"
pub const CHUNK_BIN: u32 = 0x004E_4942;

const JSON_PADDING: u8 = 0x20;

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// GLB file header (12 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlbHeader {
    pub magic: u32,
    pub version: u32,
    /// Total container length including this header
    pub length: u32,
}

impl GlbHeader {
    pub const SIZE: usize = 12;

    pub fn new(length: u32) -> Self {
        Self {
            magic: GLB_MAGIC,
            version: GLB_VERSION,
            length,
        }
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }

    /// Read header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            magic: read_u32(bytes, 0),
            version: read_u32(bytes, 4),
            length: read_u32(bytes, 8),
        })
    }
}

/// Chunk header (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Payload length, excluding this header
    pub length: u32,
    pub chunk_type: u32,
}

impl ChunkHeader {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.chunk_type.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            length: read_u32(bytes, 0),
            chunk_type: read_u32(bytes, 4),
        })
    }
}

/// Serialize a planned document and its resources into a GLB container.
///
/// `resources` must be in combined index order, matching `plan.buffer_map`.
pub fn encode(
    document: &SceneDocument,
    plan: &LayoutPlan,
    resources: &[Resource],
) -> Result<Vec<u8>> {
    if plan.buffer_map.len() != resources.len() {
        return Err(PackError::InvalidDocument(format!(
            "layout covers {} resources, got {}",
            plan.buffer_map.len(),
            resources.len()
        )));
    }

    let json_bytes = document.to_json_bytes()?;
    let json_chunk_length = align_up(json_bytes.len() as u64, ALIGNMENT);

    let has_bin = plan.total_size > 0;
    let mut total_length = (GlbHeader::SIZE + ChunkHeader::SIZE) as u64 + json_chunk_length;
    if has_bin {
        total_length += ChunkHeader::SIZE as u64 + plan.total_size;
    }

    let total_u32 =
        u32::try_from(total_length).map_err(|_| PackError::ContainerTooLarge(total_length))?;
    // Both chunk lengths are bounded by the total
    let json_chunk_u32 = json_chunk_length as u32;
    let bin_chunk_u32 = plan.total_size as u32;

    let mut glb = Vec::with_capacity(total_u32 as usize);

    glb.extend_from_slice(&GlbHeader::new(total_u32).to_bytes());

    glb.extend_from_slice(
        &ChunkHeader {
            length: json_chunk_u32,
            chunk_type: CHUNK_JSON,
        }
        .to_bytes(),
    );
    glb.extend_from_slice(&json_bytes);
    glb.resize(glb.len() + (json_chunk_length as usize - json_bytes.len()), JSON_PADDING);

    if has_bin {
        glb.extend_from_slice(
            &ChunkHeader {
                length: bin_chunk_u32,
                chunk_type: CHUNK_BIN,
            }
            .to_bytes(),
        );

        let chunk_start = glb.len();
        glb.resize(chunk_start + plan.total_size as usize, 0);
        for (resource, &offset) in resources.iter().zip(&plan.buffer_map) {
            let start = chunk_start + offset as usize;
            let end = start + resource.data.len();
            if end > glb.len() {
                return Err(PackError::InvalidDocument(format!(
                    "resource {} ({} bytes at offset {}) exceeds the binary chunk",
                    resource.index,
                    resource.data.len(),
                    offset
                )));
            }
            glb[start..end].copy_from_slice(&resource.data);
        }
    }

    debug_assert_eq!(glb.len(), total_u32 as usize);
    Ok(glb)
}

/// A parsed GLB container borrowing its binary chunk from the input
#[derive(Debug, Clone)]
pub struct GlbContainer<'a> {
    pub header: GlbHeader,
    /// Declared JSON chunk length (including padding)
    pub json_chunk_length: u32,
    pub json: Value,
    pub bin: Option<&'a [u8]>,
}

/// Parse and validate a GLB container
pub fn decode(bytes: &[u8]) -> Result<GlbContainer<'_>> {
    let header = GlbHeader::from_bytes(bytes)
        .ok_or_else(|| malformed(format!("{} bytes is too short for a GLB header", bytes.len())))?;

    if header.magic != GLB_MAGIC {
        return Err(malformed(format!("bad magic 0x{:08X}", header.magic)));
    }
    if header.version != GLB_VERSION {
        return Err(malformed(format!("unsupported container version {}", header.version)));
    }
    if header.length as usize != bytes.len() {
        return Err(malformed(format!(
            "header declares {} bytes, container has {}",
            header.length,
            bytes.len()
        )));
    }

    let (json_header, json_payload, mut cursor) = read_chunk(bytes, GlbHeader::SIZE)?;
    if json_header.chunk_type != CHUNK_JSON {
        return Err(malformed(format!(
            "first chunk has type 0x{:08X}, expected JSON",
            json_header.chunk_type
        )));
    }
    let json: Value = serde_json::from_slice(json_payload)
        .map_err(|e| malformed(format!("JSON chunk does not parse: {}", e)))?;

    let mut bin = None;
    while cursor < bytes.len() {
        let (chunk, payload, next) = read_chunk(bytes, cursor)?;
        match chunk.chunk_type {
            CHUNK_BIN if bin.is_none() => bin = Some(payload),
            CHUNK_BIN => return Err(malformed("more than one BIN chunk".into())),
            CHUNK_JSON => return Err(malformed("more than one JSON chunk".into())),
            other => tracing::debug!("Skipping unknown GLB chunk type 0x{:08X}", other),
        }
        cursor = next;
    }

    Ok(GlbContainer {
        header,
        json_chunk_length: json_header.length,
        json,
        bin,
    })
}

/// Read the chunk starting at `at`; returns its header, payload and the next offset
fn read_chunk(bytes: &[u8], at: usize) -> Result<(ChunkHeader, &[u8], usize)> {
    let header = ChunkHeader::from_bytes(&bytes[at..])
        .ok_or_else(|| malformed(format!("truncated chunk header at offset {}", at)))?;

    if header.length as u64 % ALIGNMENT != 0 {
        return Err(malformed(format!(
            "chunk at offset {} has unaligned length {}",
            at, header.length
        )));
    }

    let start = at + ChunkHeader::SIZE;
    let end = start
        .checked_add(header.length as usize)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            malformed(format!(
                "chunk at offset {} declares {} bytes, only {} remain",
                at,
                header.length,
                bytes.len() - start
            ))
        })?;

    Ok((header, &bytes[start..end], end))
}

fn malformed(message: String) -> PackError {
    PackError::MalformedContainer(message)
}
