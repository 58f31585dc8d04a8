//! Exercises the HTTP routes end to end against a temporary data directory.

use std::io::Cursor;
use std::path::PathBuf;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::Engine;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use shape_sketch::commands;
use shape_sketch::config::{DataConfig, ServerConfig};
use shape_sketch::shape::Shape;
use shape_sketch::state::AppState;
use tower::ServiceExt;

const BOUNDARY: &str = "shape-sketch-test-boundary";

struct TestServer {
    _dir: tempfile::TempDir,
    config: ServerConfig,
    app: Router,
}

fn setup() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let data = DataConfig::new(dir.path().join("data")).with_canvas(Some((4, 4)));
    data.ensure_buckets().unwrap();
    let assets_dir = dir.path().join("assets");
    std::fs::create_dir_all(&assets_dir).unwrap();

    let config = ServerConfig {
        port: 0,
        assets_dir,
        data,
    };
    let app = commands::router(AppState::new(&config));
    TestServer {
        _dir: dir,
        config,
        app,
    }
}

fn data_uri(fill: u8) -> String {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, fill])));
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

fn upload_request(fields: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        ));
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Percent-encodes everything outside the unreserved set.
fn urlencode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

fn urlencoded_request(fields: &[(&str, &str)]) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(name, value)| format!("{}={}", urlencode(name), urlencode(value)))
        .collect::<Vec<_>>()
        .join("&");

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, body)
}

fn bucket_files(server: &TestServer, shape: Shape) -> Vec<PathBuf> {
    std::fs::read_dir(server.config.data.bucket_dir(shape))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

#[tokio::test]
async fn test_index_serves_drawing_page() {
    let server = setup();
    let (status, body) = send(&server.app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    let body = String::from_utf8(body).unwrap();
    assert!(body.contains("<canvas"));
    assert!(body.contains("/upload"));
}

#[tokio::test]
async fn test_upload_redirects_and_stores() {
    let server = setup();
    let image = data_uri(255);
    let response = server
        .app
        .clone()
        .oneshot(upload_request(&[("shape", "■"), ("myImage", &image)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/");
    assert_eq!(bucket_files(&server, Shape::Square).len(), 1);
}

#[tokio::test]
async fn test_urlencoded_upload_is_stored() {
    let server = setup();
    let image = data_uri(128);
    let response = server
        .app
        .clone()
        .oneshot(urlencoded_request(&[("shape", "▲"), ("myImage", &image)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/");
    assert_eq!(bucket_files(&server, Shape::Triangle).len(), 1);

    let (status, _) = send(&server.app, urlencoded_request(&[("shape", "X")])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(bucket_files(&server, Shape::X).is_empty());
}

#[tokio::test]
async fn test_upload_unknown_shape_is_rejected() {
    let server = setup();
    let image = data_uri(255);
    let (status, body) = send(
        &server.app,
        upload_request(&[("shape", "hexagon"), ("myImage", &image)]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("hexagon"));
    for shape in Shape::ALL {
        assert!(bucket_files(&server, shape).is_empty());
    }
}

#[tokio::test]
async fn test_upload_bad_payload_is_rejected() {
    let server = setup();
    let (status, _) = send(
        &server.app,
        upload_request(&[("shape", "X"), ("myImage", "data:image/png;base64,!!!")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&server.app, upload_request(&[("shape", "X")])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(bucket_files(&server, Shape::X).is_empty());
}

#[tokio::test]
async fn test_prepare_without_drawings() {
    let server = setup();
    let (status, body) = send(&server.app, get("/prepare")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!body.is_empty());
    assert!(!server.config.data.samples_path().exists());

    let (status, _) = send(&server.app, get("/X.npy")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&server.app, get("/y.npy")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_prepare_and_download() {
    let server = setup();
    for (shape, fill) in [("O", 10), ("X", 20), ("O", 30)] {
        let image = data_uri(fill);
        let (status, _) = send(
            &server.app,
            upload_request(&[("shape", shape), ("myImage", &image)]),
        )
        .await;
        assert_eq!(status, StatusCode::FOUND);
    }

    let (status, body) = send(&server.app, get("/prepare")).await;
    assert_eq!(status, StatusCode::OK);
    let message = String::from_utf8(body).unwrap();
    assert!(message.contains("3 samples"), "{}", message);

    let (status, samples) = send(&server.app, get("/X.npy")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&samples[..6], b"\x93NUMPY");
    assert_eq!(samples, std::fs::read(server.config.data.samples_path()).unwrap());

    let (status, labels) = send(&server.app, get("/y.npy")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&labels[..6], b"\x93NUMPY");
    // Three UCS-4 labels at the end of the file: X first, then both Os.
    let data = &labels[labels.len() - 12..];
    let symbols: Vec<u32> = data
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(symbols, vec!['X' as u32, 'O' as u32, 'O' as u32]);
}

#[tokio::test]
async fn test_corrupt_sample_fails_prepare() {
    let server = setup();
    let bucket = server.config.data.bucket_dir(Shape::Triangle);
    std::fs::write(bucket.join("broken.png"), b"garbage").unwrap();

    let (status, body) = send(&server.app, get("/prepare")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(String::from_utf8(body).unwrap().contains("broken.png"));
    assert!(!server.config.data.labels_path().exists());
}

#[tokio::test]
async fn test_background_asset() {
    let server = setup();
    let (status, _) = send(&server.app, get("/fondo.jpg")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    std::fs::write(server.config.assets_dir.join("fondo.jpg"), b"jpeg bytes").unwrap();
    let (status, body) = send(&server.app, get("/fondo.jpg")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"jpeg bytes");
}
