//! Raster image down-scaling before embedding
//!
//! Scaling only ever shrinks. The target edge is used for both width and
//! height, so non-square sources come out square.

use crate::error::{PackError, Result};
use crate::mime::is_raster_image;
use crate::resource::{Resource, ResourceKind};
use image::error::ImageFormatHint;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader, ImageResult};
use rayon::prelude::*;
use std::io::Cursor;

/// Requested texture edge length for a scaled variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScaleRequest {
    edge: u32,
}

impl ScaleRequest {
    pub fn new(edge: u32) -> Result<Self> {
        if edge == 0 {
            return Err(PackError::InvalidScaleRequest(
                "target edge must be at least 1 pixel".into(),
            ));
        }
        Ok(Self { edge })
    }

    pub fn edge(&self) -> u32 {
        self.edge
    }
}

/// Outcome of scaling one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scaled {
    /// Re-encoded bytes at the target size
    Resized(Vec<u8>),
    /// Source is already no wider than the target
    NotApplicable { width: u32 },
}

/// Image resize capability used by the pipeline
pub trait ImageScaler: Send + Sync {
    /// Intrinsic `(width, height)` of an encoded image
    fn dimensions(&self, data: &[u8], mime_type: &str) -> ImageResult<(u32, u32)>;

    /// Resize to `edge` x `edge`, re-encoded in the source format
    fn resize(&self, data: &[u8], mime_type: &str, edge: u32) -> ImageResult<Vec<u8>>;

    /// Shrink an image to the target edge, or report that it is already small enough
    fn scale(&self, data: &[u8], mime_type: &str, edge: u32) -> ImageResult<Scaled> {
        let (width, _) = self.dimensions(data, mime_type)?;
        if width <= edge {
            return Ok(Scaled::NotApplicable { width });
        }
        self.resize(data, mime_type, edge).map(Scaled::Resized)
    }
}

/// Default scaler backed by the `image` crate (PNG and JPEG)
#[derive(Debug, Clone, Copy)]
pub struct RasterScaler {
    filter: FilterType,
}

impl RasterScaler {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }

    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }
}

impl Default for RasterScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageScaler for RasterScaler {
    fn dimensions(&self, data: &[u8], mime_type: &str) -> ImageResult<(u32, u32)> {
        let format = format_for(mime_type)?;
        ImageReader::with_format(Cursor::new(data), format).into_dimensions()
    }

    fn resize(&self, data: &[u8], mime_type: &str, edge: u32) -> ImageResult<Vec<u8>> {
        let format = format_for(mime_type)?;
        let img = image::load_from_memory_with_format(data, format)?;
        let resized = img.resize_exact(edge, edge, self.filter);

        // JPEG has no alpha channel
        let resized = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
            _ => resized,
        };

        let mut encoded = Vec::new();
        resized.write_to(&mut Cursor::new(&mut encoded), format)?;
        Ok(encoded)
    }
}

fn format_for(mime_type: &str) -> ImageResult<ImageFormat> {
    ImageFormat::from_mime_type(mime_type)
        .ok_or_else(|| ImageError::Unsupported(ImageFormatHint::Name(mime_type.to_string()).into()))
}

/// Scale every raster image resource in place.
///
/// All candidates must shrink for the variant to exist: the first image (by
/// resource index) that is already small enough, or that fails to decode,
/// decides the error.
pub fn scale_images(
    resources: &mut [Resource],
    scaler: &dyn ImageScaler,
    request: ScaleRequest,
) -> Result<()> {
    let edge = request.edge();
    let candidates: Vec<usize> = resources
        .iter()
        .enumerate()
        .filter(|(_, r)| r.kind == ResourceKind::Image && is_raster_image(&r.mime_type))
        .map(|(pos, _)| pos)
        .collect();

    if candidates.is_empty() {
        return Err(PackError::ScaleNotApplicable(
            "document has no PNG or JPEG images to scale".into(),
        ));
    }

    let shared: &[Resource] = resources;
    let results: Vec<(usize, ImageResult<Scaled>)> = candidates
        .par_iter()
        .map(|&pos| {
            let resource = &shared[pos];
            (pos, scaler.scale(&resource.data, &resource.mime_type, edge))
        })
        .collect();

    let mut replacements = Vec::with_capacity(results.len());
    for (pos, result) in results {
        let index = resources[pos].index;
        match result {
            Ok(Scaled::Resized(data)) => replacements.push((pos, data)),
            Ok(Scaled::NotApplicable { width }) => {
                return Err(PackError::ScaleNotApplicable(format!(
                    "image {} ('{}') is {}px wide, not larger than {}px",
                    index, resources[pos].uri, width, edge
                )));
            }
            Err(source) => return Err(PackError::ImageProcessing { index, source }),
        }
    }

    for (pos, data) in replacements {
        let resource = &mut resources[pos];
        tracing::debug!(
            "Scaled image {} to {}x{}: {} -> {} bytes",
            resource.index,
            edge,
            edge,
            resource.data.len(),
            data.len()
        );
        resource.data = data.into();
    }

    Ok(())
}
