//! Integration tests for glb-pack
//!
//! Packs generated scenes end to end and reads the result back with the
//! gltf crate's own GLB parser.


use generate_test_assets::*;
use glb_pack::*;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn pack_from_dir(dir: &std::path::Path) -> Result<Vec<u8>> {
    let gltf_path = dir.join("triangle.gltf");
    let source = std::fs::read(gltf_path).expect("Failed to read glTF");
    let document = SceneDocument::from_slice(&source)?;
    let map = ResourceMap::from_dir(dir).expect("Failed to load resources");
    let provider = ResourceProvider::map(map);
    pack_glb(&document, &provider, None).await
}

/// Pack from a directory and verify with the gltf crate
#[tokio::test]
async fn test_packed_scene_reads_back_with_gltf() {
    let dir = tempdir().expect("Failed to create temp dir");
    write_triangle_scene(dir.path(), 16);

    let glb = pack_from_dir(dir.path()).await.expect("Pack failed");
    let gltf = gltf::Gltf::from_slice(&glb).expect("gltf crate rejected the container");

    assert_eq!(gltf.buffers().count(), 1);
    let blob = gltf.blob.as_deref().expect("Container should carry a BIN chunk");
    assert_eq!(gltf.buffers().next().unwrap().length(), blob.len());

    // Both geometry buffers survive, the second one rebased
    let mesh = gltf.meshes().next().expect("Mesh missing");
    let primitive = mesh.primitives().next().expect("Primitive missing");
    let reader = primitive.reader(|buffer| match buffer.source() {
        gltf::buffer::Source::Bin => gltf.blob.as_deref(),
        gltf::buffer::Source::Uri(_) => None,
    });

    let positions: Vec<[f32; 3]> = reader.read_positions().expect("No positions").collect();
    assert_eq!(positions, POSITIONS.to_vec());

    let indices: Vec<u32> = reader.read_indices().expect("No indices").into_u32().collect();
    assert_eq!(indices, vec![0, 1, 2]);

    // The texture, loaded from the textures/ subfolder, is embedded through a bufferView
    let embedded = gltf.images().next().expect("Image missing");
    assert_eq!(embedded.name(), Some("albedo"));
    match embedded.source() {
        gltf::image::Source::View { view, mime_type } => {
            assert_eq!(mime_type, "image/png");
            let bytes = &blob[view.offset()..view.offset() + view.length()];
            assert_eq!(bytes, checkerboard_png(16, 16).as_slice());
            assert_eq!(view.offset() % 4, 0);
        }
        gltf::image::Source::Uri { uri, .. } => panic!("Image still references '{}'", uri),
    }
}

#[tokio::test]
async fn test_bin_chunk_is_sum_of_aligned_resources() {
    let dir = tempdir().expect("Failed to create temp dir");
    write_triangle_scene(dir.path(), 8);

    let glb = pack_from_dir(dir.path()).await.expect("Pack failed");
    let container = decode(&glb).expect("Decode failed");

    let png_len = checkerboard_png(8, 8).len() as u64;
    let expected = align_up(36, 4) + align_up(6, 4) + align_up(png_len, 4);
    assert_eq!(container.bin.map(|b| b.len() as u64), Some(expected));
    assert_eq!(container.json["buffers"][0]["byteLength"], expected);
    assert_eq!(
        glb.len() as u64,
        12 + 8 + container.json_chunk_length as u64 + 8 + expected
    );

    // Unknown top-level properties pass through
    assert_eq!(container.json["nodes"][0]["name"], "Triangle");
    assert_eq!(container.json["asset"]["generator"], "glb-pack tests");
}

#[tokio::test]
async fn test_variants_from_directory() {
    let dir = tempdir().expect("Failed to create temp dir");
    let gltf_path = write_triangle_scene(dir.path(), 64);

    let document = SceneDocument::from_slice(&std::fs::read(gltf_path).unwrap()).unwrap();
    let provider = ResourceProvider::map(ResourceMap::from_dir(dir.path()).unwrap());
    let variants = vec![
        VariantSpec::new("2k", 2048).unwrap(),
        VariantSpec::new("small", 16).unwrap(),
    ];

    let packed = pack_variants(&document, &provider, &variants)
        .await
        .expect("Variants failed");

    assert!(matches!(packed.variants[0].1, VariantOutcome::NotApplicable(_)));

    let small = packed.variants[1].1.bytes().expect("Small variant missing");
    let gltf = gltf::Gltf::from_slice(small).expect("gltf crate rejected the variant");
    let blob = gltf.blob.as_deref().unwrap();
    let embedded = gltf.images().next().unwrap();
    let gltf::image::Source::View { view, .. } = embedded.source() else {
        panic!("Image should be embedded");
    };
    let texture = image::load_from_memory(&blob[view.offset()..view.offset() + view.length()])
        .expect("Embedded texture should decode");
    assert_eq!((texture.width(), texture.height()), (16, 16));

    // Geometry is untouched by scaling
    assert_eq!(&blob[..36], triangle_buffer().as_slice());
}

#[tokio::test]
async fn test_missing_resource_fails_without_output() {
    let dir = tempdir().expect("Failed to create temp dir");
    write_triangle_scene(dir.path(), 8);
    std::fs::remove_file(dir.path().join("indices.bin")).unwrap();

    match pack_from_dir(dir.path()).await {
        Err(PackError::ResourceNotFound { key, .. }) => assert_eq!(key, "indices.bin"),
        other => panic!("Expected ResourceNotFound, got {:?}", other.map(|b| b.len())),
    }
}

/// Serve canned files over loopback HTTP; unknown paths get 404
async fn serve(files: Vec<(&'static str, Vec<u8>)>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");
    let files = Arc::new(files);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let files = files.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let text = String::from_utf8_lossy(&request);
                let path = text.split_whitespace().nth(1).unwrap_or("/").to_string();
                let found = files.iter().find(|(name, _)| path == format!("/{}", name));
                let (status, body) = match found {
                    Some((_, body)) => ("200 OK", body.clone()),
                    None => ("404 Not Found", Vec::new()),
                };

                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

fn http_scene_files(texture: Vec<u8>) -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("triangle.bin", triangle_buffer()),
        ("indices.bin", index_buffer()),
        ("albedo.png", texture),
    ]
}

#[tokio::test]
async fn test_fetch_over_http_matches_map_strategy() {
    let texture = checkerboard_png(8, 8);
    let addr = serve(http_scene_files(texture.clone())).await;

    let document = SceneDocument::from_json(triangle_gltf("albedo.png")).unwrap();
    let fetcher = Fetcher::new()
        .with_base_url(format!("http://{}/", addr))
        .with_timeout(Duration::from_secs(5));
    let fetched = pack_glb(&document, &ResourceProvider::fetch(fetcher), None)
        .await
        .expect("Fetch pack failed");

    let map = ResourceMap::new()
        .with("triangle.bin", triangle_buffer())
        .with("indices.bin", index_buffer())
        .with("albedo.png", texture);
    let mapped = pack_glb(&document, &ResourceProvider::map(map), None)
        .await
        .expect("Map pack failed");

    assert_eq!(fetched, mapped);
}

#[tokio::test]
async fn test_fetch_absolute_url() {
    let addr = serve(http_scene_files(checkerboard_png(4, 4))).await;

    let fetcher = Fetcher::new();
    let data = ResourceProvider::fetch(fetcher)
        .resolve(&format!("http://{}/triangle.bin", addr))
        .await
        .expect("Fetch failed");
    assert_eq!(&*data, triangle_buffer().as_slice());
}

#[tokio::test]
async fn test_fetch_http_error_status() {
    let addr = serve(vec![("triangle.bin", triangle_buffer())]).await;

    let document = SceneDocument::from_json(triangle_gltf("albedo.png")).unwrap();
    let fetcher = Fetcher::new().with_base_url(format!("http://{}", addr));

    match pack_glb(&document, &ResourceProvider::fetch(fetcher), None).await {
        Err(PackError::Fetch { uri, reason }) => {
            // indices.bin has the lower index of the two missing files
            assert_eq!(uri, "indices.bin");
            assert!(reason.contains("404"), "unexpected reason: {}", reason);
        }
        other => panic!("Expected Fetch error, got {:?}", other.map(|b| b.len())),
    }
}

#[tokio::test]
async fn test_fetch_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Accept and never answer
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let fetcher = Fetcher::new()
        .with_base_url(format!("http://{}", addr))
        .with_timeout(Duration::from_millis(200));

    let result = ResourceProvider::fetch(fetcher).resolve("slow.bin").await;
    match result {
        Err(PackError::Fetch { reason, .. }) => assert!(reason.contains("timed out")),
        other => panic!("Expected timeout, got {:?}", other.map(|d| d.len())),
    }
}
