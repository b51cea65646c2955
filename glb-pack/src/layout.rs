//! Binary chunk layout planning
//!
//! Resources are laid out in combined index order (buffers, then images),
//! each starting on a 4-byte boundary. Planning also rewrites the document
//! so every reference points into the single merged buffer.

use crate::document::{Buffer, BufferView, SceneDocument};
use crate::error::{PackError, Result};
use crate::resource::{Resource, ResourceKind};

/// GLB chunk and resource alignment in bytes
pub const ALIGNMENT: u64 = 4;

/// Round `len` up to the next multiple of `alignment`
#[inline]
pub const fn align_up(len: u64, alignment: u64) -> u64 {
    len.div_ceil(alignment) * alignment
}

/// Byte placement of every resource inside the binary chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlan {
    /// Offset of resource `i` from the start of the binary chunk payload
    pub buffer_map: Vec<u64>,
    /// Binary chunk payload length (sum of aligned resource lengths)
    pub total_size: u64,
}

impl LayoutPlan {
    pub fn offset(&self, index: usize) -> Option<u64> {
        self.buffer_map.get(index).copied()
    }
}

/// Compute offsets and rewrite the document to reference the merged buffer.
///
/// `resources` must be the resolved resources of `document`, in combined
/// index order.
pub fn plan(
    mut document: SceneDocument,
    resources: &[Resource],
) -> Result<(SceneDocument, LayoutPlan)> {
    let buffer_count = document.buffers.len();
    let image_count = document.images().len();
    check_resources(resources, buffer_count, image_count)?;

    let mut buffer_map = Vec::with_capacity(resources.len());
    let mut running_offset = 0u64;
    for resource in resources {
        buffer_map.push(running_offset);
        running_offset += align_up(resource.len(), ALIGNMENT);
    }

    // Views into source buffers now point into the merged buffer
    for (view_index, view) in document.buffer_views.iter_mut().enumerate() {
        let shift = *buffer_map
            .get(view.buffer)
            .filter(|_| view.buffer < buffer_count)
            .ok_or_else(|| {
                PackError::InvalidDocument(format!(
                    "bufferView {} references buffer {}, but the document has {} buffers",
                    view_index, view.buffer, buffer_count
                ))
            })?;
        view.buffer = 0;
        if shift != 0 {
            view.byte_offset = Some(view.byte_offset.unwrap_or(0) + shift);
        }
    }

    if let Some(images) = document.images.take() {
        let mut embedded = Vec::with_capacity(images.len());
        for (image_index, image) in images.into_iter().enumerate() {
            let resource = &resources[buffer_count + image_index];
            let view_index = document.buffer_views.len();
            document.buffer_views.push(BufferView::embedded(
                buffer_map[resource.index],
                resource.len(),
            ));
            embedded.push(image.embedded(view_index, &resource.mime_type));
        }
        document.images = Some(embedded);
    }

    // Nothing to point into: no BIN chunk will be written
    document.buffers = if running_offset == 0 && document.buffer_views.is_empty() {
        Vec::new()
    } else {
        vec![Buffer::merged(running_offset)]
    };

    tracing::debug!(
        "Planned {} buffers and {} images into {} bytes",
        buffer_count,
        image_count,
        running_offset
    );

    Ok((
        document,
        LayoutPlan {
            buffer_map,
            total_size: running_offset,
        },
    ))
}

fn check_resources(resources: &[Resource], buffer_count: usize, image_count: usize) -> Result<()> {
    if resources.len() != buffer_count + image_count {
        return Err(PackError::InvalidDocument(format!(
            "expected {} resolved resources ({} buffers, {} images), got {}",
            buffer_count + image_count,
            buffer_count,
            image_count,
            resources.len()
        )));
    }

    for (position, resource) in resources.iter().enumerate() {
        let expected_kind = if position < buffer_count {
            ResourceKind::Buffer
        } else {
            ResourceKind::Image
        };
        if resource.index != position || resource.kind != expected_kind {
            return Err(PackError::InvalidDocument(format!(
                "resource at position {} is {:?} {}, expected {:?} {}",
                position, resource.kind, resource.index, expected_kind, position
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceRequest;
    use serde_json::json;

    fn document(value: serde_json::Value) -> SceneDocument {
        SceneDocument::from_json(value).unwrap()
    }

    fn resources(buffers: &[usize], images: &[(&str, usize)]) -> Vec<Resource> {
        let buffers = buffers
            .iter()
            .map(|&len| (ResourceKind::Buffer, "geo.bin".to_string(), len));
        let images = images
            .iter()
            .map(|&(uri, len)| (ResourceKind::Image, uri.to_string(), len));

        buffers
            .chain(images)
            .enumerate()
            .map(|(index, (kind, uri, len))| {
                Resource::new(ResourceRequest { index, kind, uri }, vec![0xAB; len].into())
            })
            .collect()
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(4, 4), 4);
        assert_eq!(align_up(17, 4), 20);

        for len in 0..64u64 {
            let aligned = align_up(len, ALIGNMENT);
            assert_eq!(aligned % 4, 0);
            assert!(aligned - len <= 3, "len {} aligned to {}", len, aligned);
        }
    }

    #[test]
    fn test_single_aligned_buffer() {
        let doc = document(json!({
            "asset": {"version": "2.0"},
            "buffers": [{"uri": "geo.bin", "byteLength": 16}],
            "bufferViews": [{"buffer": 0, "byteLength": 16}]
        }));

        let (packed, plan) = plan(doc, &resources(&[16], &[])).unwrap();
        assert_eq!(plan.total_size, 16);
        assert_eq!(plan.buffer_map, vec![0]);
        assert_eq!(packed.buffers, vec![Buffer::merged(16)]);
        // Single buffer: the view is unchanged
        assert_eq!(packed.buffer_views[0].byte_offset, None);
    }

    #[test]
    fn test_unaligned_buffer_is_padded() {
        let doc = document(json!({
            "asset": {"version": "2.0"},
            "buffers": [{"uri": "geo.bin", "byteLength": 17}]
        }));

        let (packed, plan) = plan(doc, &resources(&[17], &[])).unwrap();
        assert_eq!(plan.total_size, 20);
        assert_eq!(packed.buffers[0].byte_length, 20);
    }

    #[test]
    fn test_images_get_buffer_views() {
        let doc = document(json!({
            "asset": {"version": "2.0"},
            "buffers": [{"uri": "geo.bin", "byteLength": 10}],
            "bufferViews": [{"buffer": 0, "byteLength": 10}],
            "images": [
                {"uri": "textures/albedo.png", "name": "albedo"},
                {"uri": "normal.JPG"}
            ]
        }));

        let res = resources(&[10], &[("textures/albedo.png", 5), ("normal.JPG", 8)]);
        let (packed, plan) = plan(doc, &res).unwrap();

        assert_eq!(plan.buffer_map, vec![0, 12, 20]);
        assert_eq!(plan.total_size, 28);

        assert_eq!(packed.buffer_views.len(), 3);
        assert_eq!(packed.buffer_views[1], BufferView::embedded(12, 5));
        assert_eq!(packed.buffer_views[2], BufferView::embedded(20, 8));

        let images = packed.images();
        assert_eq!(images[0].uri, None);
        assert_eq!(images[0].buffer_view, Some(1));
        assert_eq!(images[0].mime_type.as_deref(), Some("image/png"));
        assert_eq!(images[0].other["name"], "albedo");
        assert_eq!(images[1].buffer_view, Some(2));
        assert_eq!(images[1].mime_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn test_views_into_later_buffers_are_rebased() {
        let doc = document(json!({
            "asset": {"version": "2.0"},
            "buffers": [
                {"uri": "a.bin", "byteLength": 6},
                {"uri": "b.bin", "byteLength": 8}
            ],
            "bufferViews": [
                {"buffer": 0, "byteLength": 6},
                {"buffer": 1, "byteOffset": 4, "byteLength": 4}
            ]
        }));

        let (packed, plan) = plan(doc, &resources(&[6, 8], &[])).unwrap();
        assert_eq!(plan.buffer_map, vec![0, 8]);
        assert_eq!(packed.buffer_views[1].buffer, 0);
        assert_eq!(packed.buffer_views[1].byte_offset, Some(12));
        assert_eq!(packed.buffers.len(), 1);
    }

    #[test]
    fn test_view_with_unknown_buffer() {
        let doc = document(json!({
            "asset": {"version": "2.0"},
            "buffers": [{"uri": "a.bin", "byteLength": 4}],
            "bufferViews": [{"buffer": 3, "byteLength": 4}]
        }));

        assert!(matches!(
            plan(doc, &resources(&[4], &[])),
            Err(PackError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_empty_document() {
        let doc = document(json!({"asset": {"version": "2.0"}}));
        let (packed, plan) = plan(doc, &[]).unwrap();

        assert_eq!(plan.total_size, 0);
        assert!(plan.buffer_map.is_empty());
        assert!(packed.buffers.is_empty());
    }

    #[test]
    fn test_zero_length_resources_take_no_space() {
        let doc = document(json!({
            "asset": {"version": "2.0"},
            "buffers": [
                {"uri": "a.bin", "byteLength": 0},
                {"uri": "b.bin", "byteLength": 3}
            ]
        }));

        let (_, plan) = plan(doc, &resources(&[0, 3], &[])).unwrap();
        assert_eq!(plan.buffer_map, vec![0, 0]);
        assert_eq!(plan.total_size, 4);
    }

    #[test]
    fn test_all_empty_buffers_drop_the_merged_buffer() {
        let doc = document(json!({
            "asset": {"version": "2.0"},
            "buffers": [
                {"uri": "a.bin", "byteLength": 0},
                {"uri": "b.bin", "byteLength": 0}
            ]
        }));

        let (packed, plan) = plan(doc, &resources(&[0, 0], &[])).unwrap();
        assert_eq!(plan.total_size, 0);
        assert_eq!(plan.buffer_map, vec![0, 0]);
        assert!(packed.buffers.is_empty());
    }

    #[test]
    fn test_empty_image_keeps_buffer_for_its_view() {
        let doc = document(json!({
            "asset": {"version": "2.0"},
            "images": [{"uri": "blank.png"}]
        }));

        let (packed, plan) = plan(doc, &resources(&[], &[("blank.png", 0)])).unwrap();
        assert_eq!(plan.total_size, 0);
        assert_eq!(packed.buffer_views.len(), 1);
        assert_eq!(packed.buffers, vec![Buffer::merged(0)]);
    }

    #[test]
    fn test_resource_count_mismatch() {
        let doc = document(json!({
            "asset": {"version": "2.0"},
            "buffers": [{"uri": "a.bin", "byteLength": 4}],
            "images": [{"uri": "b.png"}]
        }));

        assert!(matches!(
            plan(doc, &resources(&[4], &[])),
            Err(PackError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_ranges_never_overlap() {
        let lengths = [1usize, 7, 0, 4, 13, 2, 9, 3];
        let uris: Vec<String> = (0..lengths.len()).map(|i| format!("img{}.png", i)).collect();
        let images: Vec<_> = uris
            .iter()
            .zip(lengths.iter())
            .map(|(u, &l)| (u.as_str(), l))
            .collect();
        let doc_images: Vec<_> = uris.iter().map(|u| json!({"uri": u})).collect();

        let doc = document(json!({
            "asset": {"version": "2.0"},
            "buffers": [{"uri": "geo.bin", "byteLength": 5}],
            "images": doc_images
        }));

        let res = resources(&[5], &images);
        let (_, plan) = plan(doc, &res).unwrap();

        let mut expected_total = 0;
        for (i, resource) in res.iter().enumerate() {
            let start = plan.buffer_map[i];
            assert_eq!(start % ALIGNMENT, 0);
            if let Some(&next) = plan.buffer_map.get(i + 1) {
                assert!(start + resource.len() <= next);
            }
            expected_total += align_up(resource.len(), ALIGNMENT);
        }
        assert_eq!(plan.total_size, expected_total);
    }
}
