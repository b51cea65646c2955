//! Filename to MIME type mapping

/// Fallback for anything the table does not know
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Known MIME types and the extensions that select them.
///
/// Order matters: the first entry with a matching extension wins.
const MIME_TYPES: &[(&str, &[&str])] = &[
    ("image/png", &["png"]),
    ("image/jpeg", &["jpg", "jpeg"]),
    ("text/plain", &["glsl", "vert", "vs", "frag", "fs", "txt"]),
    ("image/vnd-ms.dds", &["dds"]),
];

/// Resolve a MIME type from a filename or URI.
///
/// Case-insensitive substring search; an extension only counts when it
/// occurs after the first character of the name. Every occurrence is
/// considered, not only the first.
pub fn mime_type(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();

    for (mime, extensions) in MIME_TYPES {
        for ext in *extensions {
            if lower.match_indices(ext).any(|(pos, _)| pos > 0) {
                return mime;
            }
        }
    }

    DEFAULT_MIME_TYPE
}

/// Whether the MIME type names a raster format the scaler can handle
pub fn is_raster_image(mime: &str) -> bool {
    matches!(mime, "image/png" | "image/jpeg")
}
