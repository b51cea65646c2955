//! Pack glTF documents and their external resources into GLB containers
//!
//! The pipeline runs in four stages:
//! - Resolving: every buffer and image URI is turned into bytes, either from a
//!   name-keyed [`ResourceMap`] or by fetching through a [`Fetcher`]
//! - Scaling (optional): PNG/JPEG images are shrunk to a square target edge
//! - Planning: resources get 4-byte aligned offsets in one merged buffer and
//!   the document is rewritten to reference it
//! - Encoding: header, JSON chunk and BIN chunk are written out
//!
//! # Example
//!
//! ```no_run
//! use glb_pack::*;
//!
//! # async fn run() -> glb_pack::Result<()> {
//! let gltf = std::fs::read("scene.gltf").expect("read scene");
//! let document = SceneDocument::from_slice(&gltf)?;
//!
//! let resources = ResourceMap::new()
//!     .with("scene.bin", std::fs::read("scene.bin").expect("read buffer"))
//!     .with("albedo.png", std::fs::read("albedo.png").expect("read image"));
//! let provider = ResourceProvider::map(resources);
//!
//! let glb = pack_glb(&document, &provider, None).await?;
//! let half = pack_glb(&document, &provider, Some(ScaleRequest::new(512)?)).await;
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod error;
pub mod glb;
pub mod layout;
pub mod mime;
pub mod pipeline;
pub mod resource;
pub mod scale;

pub use document::{Buffer, BufferView, Image, SceneDocument, SchemaVersion};
pub use error::{PackError, Result};
pub use glb::{ChunkHeader, GlbContainer, GlbHeader, decode, encode};
pub use layout::{LayoutPlan, align_up, plan};
pub use mime::mime_type;
pub use pipeline::{
    PackRequest, PackedVariants, Stage, VariantOutcome, VariantSpec, pack_glb, pack_variants,
    pack_variants_with,
};
pub use resource::{
    FetchBase, Fetcher, Resource, ResourceKind, ResourceMap, ResourceProvider, ResourceRequest,
};
pub use scale::{ImageScaler, RasterScaler, ScaleRequest, Scaled};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
