use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Extension, Multipart};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::AppError;
use crate::model::Settings;
use crate::parser;
use crate::paths;
use crate::prompt;
use crate::provider::{EditRequest, Provider};
use crate::xmp;

/// Media types that ask `/analyze` for an XMP attachment instead of JSON.
pub const XMP_MEDIA_TYPES: [&str; 3] = ["application/rdf+xml", "text/xml", "application/xmp"];
pub const XMP_CONTENT_TYPE: &str = "application/rdf+xml";

/// Uploads are full-size photos; axum's 2 MB default is too small.
const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

// ── State ────────────────────────────────────────────────────────

pub struct ApiState {
    pub provider: Arc<dyn Provider>,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Serialize)]
struct ApiOk<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Serialize)]
struct ApiErr {
    ok: bool,
    error: String,
    error_code: String,
}

fn ok_json<T: Serialize>(data: T) -> impl IntoResponse {
    Json(ApiOk { ok: true, data })
}

fn err_json(status: StatusCode, err: &AppError) -> HttpResponse {
    (
        status,
        Json(ApiErr {
            ok: false,
            error: err.to_string(),
            error_code: error_code(err).to_string(),
        }),
    )
        .into_response()
}

/// snake_case code carried in every error body.
pub fn error_code(err: &AppError) -> &str {
    match err {
        AppError::NotFound { .. } => "not_found",
        AppError::ValidationError { .. } => "validation_error",
        AppError::IoError { .. } => "io_error",
        AppError::ParseError { kind, .. } => kind,
        AppError::ProviderError { .. } => "provider_error",
        AppError::BridgeError { .. } => "bridge_error",
        AppError::ConfigError { .. } => "config_error",
        AppError::XmpError { .. } => "xmp_error",
    }
}

fn xmp_attachment(document: String) -> HttpResponse {
    (
        [
            (header::CONTENT_TYPE, XMP_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", paths::SUGGESTED_XMP_FILE),
            ),
        ],
        document,
    )
        .into_response()
}

/// Whether any media range in the `Accept` header names an XMP type.
pub fn wants_xmp(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|range| range.split(';').next())
        .any(|media| {
            XMP_MEDIA_TYPES
                .iter()
                .any(|t| media.trim().eq_ignore_ascii_case(t))
        })
}

// ── Handlers ─────────────────────────────────────────────────────

/// Files pulled out of an `/analyze` upload.
struct Upload {
    dir: tempfile::TempDir,
    image: Option<PathBuf>,
    xmp: Option<PathBuf>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    let dir = tempfile::tempdir()?;
    let mut upload = Upload {
        image: None,
        xmp: None,
        dir,
    };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::from(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let ext = field
            .file_name()
            .and_then(|f| std::path::Path::new(f).extension())
            .and_then(|e| e.to_str())
            .map_or_else(|| "jpg".to_string(), str::to_ascii_lowercase);
        let target = match name.as_str() {
            "image" => upload.dir.path().join(format!("image.{ext}")),
            "xmp" => upload.dir.path().join("settings.xmp"),
            _ => continue,
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::from(format!("Failed to read field '{name}': {e}")))?;
        if name == "xmp" && bytes.is_empty() {
            continue;
        }
        tokio::fs::write(&target, &bytes).await?;
        if name == "image" {
            upload.image = Some(target);
        } else {
            upload.xmp = Some(target);
        }
    }
    Ok(upload)
}

async fn post_analyze(
    Extension(state): Extension<Arc<ApiState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> HttpResponse {
    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(e) => return err_json(StatusCode::BAD_REQUEST, &e),
    };
    let Some(image) = upload.image.clone() else {
        return err_json(
            StatusCode::BAD_REQUEST,
            &AppError::from("Missing required multipart field 'image'"),
        );
    };
    let request = EditRequest::new(image).with_xmp(upload.xmp.clone());

    info!(provider = state.provider.name(), "analyze request");
    let response = match state.provider.suggest(&request).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "provider failed");
            return err_json(StatusCode::BAD_GATEWAY, &AppError::from(e));
        }
    };

    if wants_xmp(&headers) {
        let existing = match request.existing_xmp().await {
            Ok(existing) => existing,
            Err(e) => return err_json(StatusCode::INTERNAL_SERVER_ERROR, &AppError::from(e)),
        };
        return xmp_attachment(xmp::render_response(&response, existing.as_deref()));
    }
    ok_json(response).into_response()
}

async fn post_parse(body: String) -> HttpResponse {
    match parser::parse_response(&body) {
        Ok(response) => ok_json(response).into_response(),
        Err(e) => err_json(StatusCode::UNPROCESSABLE_ENTITY, &AppError::from(e)),
    }
}

/// Settings given either as free model text or as a JSON value (bare
/// settings or a full response envelope).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SettingsInput {
    Text(String),
    Value(Value),
}

impl SettingsInput {
    pub fn resolve(self) -> Result<Settings, AppError> {
        match self {
            SettingsInput::Text(text) => Ok(parser::parse_settings(&text)?),
            SettingsInput::Value(value) => Ok(parser::settings_from_value(value)?),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub settings: SettingsInput,
    #[serde(default)]
    pub existing_xmp: Option<String>,
}

async fn post_render(Json(body): Json<RenderRequest>) -> HttpResponse {
    match body.settings.resolve() {
        Ok(settings) => (
            [(header::CONTENT_TYPE, XMP_CONTENT_TYPE)],
            xmp::render(&settings, body.existing_xmp.as_deref()),
        )
            .into_response(),
        Err(e) => err_json(StatusCode::UNPROCESSABLE_ENTITY, &e),
    }
}

async fn get_schema() -> impl IntoResponse {
    ok_json(prompt::response_json_schema())
}

async fn get_health(Extension(state): Extension<Arc<ApiState>>) -> impl IntoResponse {
    ok_json(serde_json::json!({
        "status": "ok",
        "provider": state.provider.name(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Server startup ───────────────────────────────────────────────

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/analyze", post(post_analyze))
        .route("/parse", post(post_parse))
        .route("/render", post(post_render))
        .route("/schema", get(get_schema))
        .route("/health", get(get_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}

/// Serve the API on `bind` until the process is stopped.
pub async fn serve(state: Arc<ApiState>, bind: &str) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| AppError::from(format!("Failed to bind API server to {bind}: {e}")))?;
    let addr = listener.local_addr()?;
    info!(%addr, provider = state.provider.name(), "API server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::provider::MockProvider;

    const BOUNDARY: &str = "lr-ai-test-boundary";

    fn app() -> Router {
        router(Arc::new(ApiState {
            provider: Arc::new(MockProvider::default()),
        }))
    }

    fn multipart(parts: &[(&str, &str, &[u8])]) -> Body {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn analyze(body: Body, accept: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/analyze")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        builder.body(body).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn analyze_returns_json_by_default() {
        let body = multipart(&[("image", "photo.JPG", b"\xff\xd8\xff")]);
        let (status, _, bytes) = send(app(), analyze(body, None)).await;
        assert_eq!(status, StatusCode::OK);
        let v = json_body(&bytes);
        assert_eq!(v["ok"], json!(true));
        assert_eq!(v["data"]["global_settings"]["exposure"], json!(0.35));
    }

    #[tokio::test]
    async fn analyze_returns_xmp_when_asked() {
        let existing = br#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"><rdf:Description rdf:about="" xmlns:crs="http://ns.adobe.com/camera-raw-settings/1.0/" crs:Dehaze="7"/></rdf:RDF></x:xmpmeta>"#;
        let body = multipart(&[
            ("image", "photo.jpg", b"\xff\xd8\xff"),
            ("xmp", "photo.xmp", existing),
        ]);
        let (status, headers, bytes) =
            send(app(), analyze(body, Some("application/xmp, */*;q=0.1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], XMP_CONTENT_TYPE);
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("suggested_settings.xmp"));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#"crs:Exposure2012="0.35""#));
        assert!(text.contains(r#"crs:Dehaze="7""#));
    }

    #[tokio::test]
    async fn analyze_without_image_is_bad_request() {
        let body = multipart(&[("xmp", "a.xmp", b"<x/>")]);
        let (status, _, bytes) = send(app(), analyze(body, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let v = json_body(&bytes);
        assert_eq!(v["ok"], json!(false));
        assert_eq!(v["error_code"], json!("validation_error"));
    }

    #[tokio::test]
    async fn provider_failure_is_bad_gateway() {
        struct Failing;
        impl Provider for Failing {
            fn name(&self) -> &str {
                "failing"
            }
            fn suggest<'a>(
                &'a self,
                _request: &'a EditRequest,
            ) -> futures_util::future::BoxFuture<'a, Result<crate::model::Response, crate::provider::ProviderError>> {
                Box::pin(async { Err(crate::provider::ProviderError::Cli("boom".to_string())) })
            }
        }
        let app = router(Arc::new(ApiState {
            provider: Arc::new(Failing),
        }));
        let body = multipart(&[("image", "photo.jpg", b"\xff")]);
        let (status, _, bytes) = send(app, analyze(body, None)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let v = json_body(&bytes);
        assert_eq!(v["error_code"], json!("provider_error"));
        assert!(v["error"].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn parse_endpoint_reports_error_kind() {
        let ok = Request::post("/parse")
            .body(Body::from("```json\n{\"global_settings\": {\"tint\": 3}}\n```"))
            .unwrap();
        let (status, _, bytes) = send(app(), ok).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&bytes)["data"]["global_settings"]["tint"], json!(3));

        let bad = Request::post("/parse").body(Body::from("Not JSON at all")).unwrap();
        let (status, _, bytes) = send(app(), bad).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(&bytes)["error_code"], json!("malformed_payload"));

        let shape = Request::post("/parse")
            .body(Body::from(r#"{"global_settings": "Not an object"}"#))
            .unwrap();
        let (status, _, bytes) = send(app(), shape).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(&bytes)["error_code"], json!("schema_violation"));
    }

    #[tokio::test]
    async fn render_accepts_object_or_text() {
        let object = Request::post("/render")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"settings": {"contrast": 20}}"#))
            .unwrap();
        let (status, headers, bytes) = send(app(), object).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], XMP_CONTENT_TYPE);
        assert!(String::from_utf8(bytes).unwrap().contains(r#"crs:Contrast2012="20""#));

        let text = Request::post("/render")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"settings": "Try {\"exposure\": 1} on this one."}"#,
            ))
            .unwrap();
        let (status, _, bytes) = send(app(), text).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(bytes).unwrap().contains(r#"crs:Exposure2012="1.0""#));

        let garbage = Request::post("/render")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"settings": "no json here"}"#))
            .unwrap();
        let (status, _, _) = send(app(), garbage).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn render_resolves_envelope_and_rejects_unknown_objects() {
        let envelope = Request::post("/render")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"settings": {"global_settings": {"tint": 5}}}"#))
            .unwrap();
        let (status, _, bytes) = send(app(), envelope).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(bytes).unwrap().contains(r#"crs:Tint="5""#));

        let unknown = Request::post("/render")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"settings": {"analysis": "looks fine"}}"#))
            .unwrap();
        let (status, _, bytes) = send(app(), unknown).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(&bytes)["error_code"], json!("schema_violation"));
    }

    #[tokio::test]
    async fn schema_and_health() {
        let (status, _, bytes) = send(app(), Request::get("/schema").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json_body(&bytes)["data"]["properties"]["masks"].is_object());

        let (status, _, bytes) = send(app(), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&bytes)["data"]["provider"], json!("mock"));
    }

    #[test]
    fn accept_negotiation() {
        let mut headers = HeaderMap::new();
        assert!(!wants_xmp(&headers));
        headers.insert(header::ACCEPT, "application/json".parse().unwrap());
        assert!(!wants_xmp(&headers));
        headers.insert(header::ACCEPT, "Text/XML; charset=utf-8".parse().unwrap());
        assert!(wants_xmp(&headers));
    }
}
