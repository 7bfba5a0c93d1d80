use crate::converter::Converter;
use crate::engines::{ConvertOptions, Quality};
use crate::error::AppError;
use crate::format::{matrix, Format, ALL_FORMATS};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

type Result<T> = std::result::Result<T, AppError>;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub struct AppState {
    pub converter: Converter,
}

/// The HTTP API; layers (tracing, CORS) are added by the caller.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/convert", post(convert_handler))
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        .route("/", get(info_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

fn flag(value: &str) -> bool {
    matches!(value.trim(), "true" | "1" | "yes" | "on")
}

/// Convert an uploaded file to the requested format.
pub async fn convert_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response> {
    let request_id = Uuid::new_v4();
    let mut file_data: Option<(String, Vec<u8>)> = None;
    let mut target: Option<String> = None;
    let mut options = ConvertOptions::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::InvalidRequest(format!("Failed to parse multipart data: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .and_then(|n| Path::new(n).file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| AppError::InvalidRequest("No filename provided".to_string()))?;
                let data = field.bytes().await.map_err(|e| {
                    AppError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?;
                info!(%request_id, "Received file: {} ({} bytes)", filename, data.len());
                file_data = Some((filename, data.to_vec()));
            }
            "format" => {
                if let Ok(value) = field.text().await {
                    target = Some(value);
                }
            }
            "quality" => {
                if let Ok(value) = field.text().await {
                    options.quality = Quality::parse(&value).ok_or_else(|| {
                        AppError::InvalidRequest(format!("Unknown quality: {}", value))
                    })?;
                }
            }
            "ocr" => {
                if let Ok(value) = field.text().await {
                    options.ocr = flag(&value);
                }
            }
            "preserveLayout" => {
                if let Ok(value) = field.text().await {
                    options.preserve_layout = flag(&value);
                }
            }
            _ => {}
        }
    }

    let (filename, data) = file_data.ok_or(AppError::NoFileProvided)?;
    let target = target
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::InvalidRequest("No target format provided".to_string()))?;
    let target = Format::parse(&target).map_err(|_| AppError::UnsupportedFormat(target.clone()))?;
    Format::from_path(Path::new(&filename))
        .map_err(|_| AppError::UnsupportedFormat(filename.clone()))?;

    let work_dir = tempfile::tempdir()?;
    let input_path = work_dir.path().join(&filename);
    tokio::fs::write(&input_path, &data).await?;

    info!(%request_id, "Converting {} to {}", filename, target);
    let output = state
        .converter
        .convert(&input_path, target.name(), work_dir.path().join("out"), &options)
        .await?;
    let body = tokio::fs::read(&output).await?;

    let content_type = mime_guess::from_path(&output)
        .first_or_octet_stream()
        .to_string();
    let download_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("output.{}", target.extension()));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download_name),
            ),
            (REQUEST_ID, request_id.to_string()),
        ],
        body,
    )
        .into_response())
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "docmill"
    }))
}

/// Supported formats, suggested targets and which backends are usable.
pub async fn info_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let formats: Vec<&str> = ALL_FORMATS.iter().map(|f| f.name()).collect();

    let mut recommended = Map::new();
    for input in ALL_FORMATS {
        let targets: Vec<&str> = matrix::targets(*input).iter().map(|f| f.name()).collect();
        if targets.is_empty() {
            continue;
        }
        recommended.insert(
            input.name().to_string(),
            json!({
                "targets": targets,
                "recommended": matrix::recommended_targets(*input)
                    .iter()
                    .map(|f| f.name())
                    .collect::<Vec<_>>(),
            }),
        );
    }

    let engines: Map<String, Value> = state
        .converter
        .engines()
        .availability()
        .await
        .into_iter()
        .map(|(kind, available)| (format!("{:?}", kind), Value::Bool(available)))
        .collect();

    Json(json!({
        "service": "docmill",
        "version": env!("CARGO_PKG_VERSION"),
        "formats": formats,
        "matrix": recommended,
        "engines": engines,
        "endpoints": {
            "convert": {
                "path": "/convert",
                "method": "POST",
                "description": "Convert a file to another format. The backend is chosen from the input and target formats.",
                "content_type": "multipart/form-data",
                "fields": {
                    "file": "The file to convert (required)",
                    "format": "Target format, e.g. 'pdf', 'docx', 'png' (required)",
                    "quality": "low | medium | high (optional, default medium)",
                    "ocr": "Boolean - OCR scanned pages when parsing PDFs (optional)",
                    "preserveLayout": "Boolean - keep backgrounds and page geometry (optional)"
                }
            },
            "health": {
                "path": "/health",
                "method": "GET",
                "description": "Health check endpoint"
            },
            "info": {
                "path": "/info",
                "method": "GET",
                "description": "Service information and supported formats"
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConverterConfig;
    use crate::testutil;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docmill-test-boundary";

    fn app(root: &Path) -> Router {
        let converter =
            Converter::with_locator(testutil::locator(root, &[]), &ConverterConfig::default());
        router(Arc::new(AppState { converter }))
    }

    fn multipart(file: Option<(&str, &[u8])>, fields: &[(&str, &str)]) -> Request<Body> {
        let mut body = Vec::new();
        if let Some((name, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, name
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/convert")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn png_bytes() -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        ::image::RgbImage::from_pixel(8, 8, ::image::Rgb([1, 2, 3]))
            .write_to(&mut out, ::image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_convert_returns_converted_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let png = png_bytes();
        let response = app(dir.path())
            .oneshot(multipart(
                Some(("photo.png", &png)),
                &[("format", "JPEG"), ("quality", "high")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"photo.jpg\""
        );
        assert!(response.headers().contains_key("x-request-id"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_convert_rejects_incomplete_requests() {
        let dir = tempfile::tempdir().unwrap();
        let png = png_bytes();

        let no_file = app(dir.path())
            .oneshot(multipart(None, &[("format", "pdf")]))
            .await
            .unwrap();
        assert_eq!(no_file.status(), StatusCode::BAD_REQUEST);

        let no_format = app(dir.path())
            .oneshot(multipart(Some(("photo.png", &png)), &[]))
            .await
            .unwrap();
        assert_eq!(no_format.status(), StatusCode::BAD_REQUEST);

        let bad_format = app(dir.path())
            .oneshot(multipart(Some(("photo.png", &png)), &[("format", "bmp")]))
            .await
            .unwrap();
        assert_eq!(bad_format.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(bad_format).await["error"]
            .as_str()
            .unwrap()
            .contains("bmp"));

        let bad_quality = app(dir.path())
            .oneshot(multipart(
                Some(("photo.png", &png)),
                &[("format", "gif"), ("quality", "ultra")],
            ))
            .await
            .unwrap();
        assert_eq!(bad_quality.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_backend_is_service_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(multipart(
                Some(("letter.docx", b"not really a document")),
                &[("format", "pdf")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .starts_with("Conversion failed"));
    }

    #[tokio::test]
    async fn test_info_lists_formats_and_engines() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(Request::get("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let info = json_body(response).await;
        assert_eq!(info["formats"].as_array().unwrap().len(), ALL_FORMATS.len());
        assert_eq!(info["matrix"]["pdf"]["recommended"][0], "docx");
        assert_eq!(info["engines"]["Image"], true);
        assert_eq!(info["engines"]["Office"], false);
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["status"], "healthy");
    }
}
