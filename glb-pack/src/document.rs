//! Typed view of the glTF document parts that packing rewrites
//!
//! Only `buffers`, `bufferViews` and `images` are modelled. Everything else
//! in the document, and every property of those entries that packing does
//! not touch, is carried through untouched in a flattened `other` map.

use crate::error::{PackError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// glTF schema generation declared by a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// glTF 1.0 (dictionary-keyed top-level collections)
    V1,
    /// glTF 2.0 (array-based top-level collections)
    V2,
}

impl SchemaVersion {
    /// Resolve the schema version of a raw JSON document.
    ///
    /// `asset.version` decides when present. Without it, a `buffers` object
    /// (rather than an array) marks the 1.0 layout.
    pub fn detect(root: &Value) -> Result<Self> {
        let object = root
            .as_object()
            .ok_or_else(|| PackError::InvalidDocument("root is not a JSON object".into()))?;

        let declared = object
            .get("asset")
            .and_then(|asset| asset.get("version"))
            .and_then(Value::as_str);

        if let Some(version) = declared {
            let major = version.split('.').next().unwrap_or_default().trim();
            return match major {
                "2" => Ok(SchemaVersion::V2),
                "1" => Ok(SchemaVersion::V1),
                _ => Err(PackError::UnsupportedSchemaVersion(version.to_string())),
            };
        }

        match object.get("buffers") {
            Some(Value::Object(_)) => Ok(SchemaVersion::V1),
            _ => Ok(SchemaVersion::V2),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V1 => "1.0",
            SchemaVersion::V2 => "2.0",
        }
    }
}

/// A glTF 2.0 document with typed buffer, bufferView and image entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDocument {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buffers: Vec<Buffer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buffer_views: Vec<BufferView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<Image>>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl SceneDocument {
    /// Build a typed document from parsed JSON.
    ///
    /// Fails fast with `UnsupportedSchemaVersion` for anything but glTF 2.0.
    pub fn from_json(root: Value) -> Result<Self> {
        match SchemaVersion::detect(&root)? {
            SchemaVersion::V2 => {}
            v => return Err(PackError::UnsupportedSchemaVersion(v.as_str().to_string())),
        }

        serde_json::from_value(root).map_err(|e| PackError::InvalidDocument(e.to_string()))
    }

    /// Parse a `.gltf` file's contents
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let root: Value = serde_json::from_slice(bytes)?;
        Self::from_json(root)
    }

    /// Image entries (empty when the document has none)
    pub fn images(&self) -> &[Image] {
        self.images.as_deref().unwrap_or(&[])
    }

    /// Compact JSON text as written into the GLB JSON chunk
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// `buffers[i]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buffer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub byte_length: u64,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Buffer {
    /// The single buffer every packed reference points at
    pub fn merged(byte_length: u64) -> Self {
        Self {
            uri: None,
            byte_length,
            other: Map::new(),
        }
    }
}

/// `bufferViews[i]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferView {
    pub buffer: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_offset: Option<u64>,
    pub byte_length: u64,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl BufferView {
    /// View over an embedded resource in the merged buffer
    pub fn embedded(byte_offset: u64, byte_length: u64) -> Self {
        Self {
            buffer: 0,
            byte_offset: Some(byte_offset),
            byte_length,
            other: Map::new(),
        }
    }
}

/// `images[i]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_view: Option<usize>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Image {
    /// Post-pack form of this entry: referenced through a bufferView
    pub fn embedded(self, buffer_view: usize, mime_type: &str) -> Self {
        Self {
            uri: None,
            mime_type: Some(mime_type.to_string()),
            buffer_view: Some(buffer_view),
            other: self.other,
        }
    }
}
