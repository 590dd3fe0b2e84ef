//! JSON-RPC client for the Lightroom Classic plugin broker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::DEFAULT_BROKER_URL;
use crate::model::Settings;
use crate::util;

pub const NO_SETTINGS_MESSAGE: &str = "No settings to apply";
const PREVIEW_SIZE: u32 = 1024;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to communicate with Lightroom broker: {0}")]
    Http(#[from] reqwest::Error),
    #[error("broker returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid preview data: {0}")]
    Preview(#[from] base64::DecodeError),
}

/// A photo in the current Lightroom selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    #[serde(rename = "localId", default)]
    pub local_id: Option<Value>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Photo {
    /// Catalog id as the broker expects it back.
    pub fn id(&self) -> Option<String> {
        match self.local_id.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

pub struct LightroomClient {
    client: reqwest::Client,
    broker_url: String,
    next_id: AtomicU64,
}

impl Default for LightroomClient {
    fn default() -> Self {
        Self::new(DEFAULT_BROKER_URL)
    }
}

impl LightroomClient {
    pub fn new(broker_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            broker_url: broker_url.trim_end_matches('/').to_string(),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn broker_url(&self) -> &str {
        &self.broker_url
    }

    /// POST one JSON-RPC request to `{broker}/request`. Returns `result` when
    /// the broker wraps its answer, the whole body otherwise.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        debug!(method, id, "sending broker command");

        let response = self
            .client
            .post(format!("{}/request", self.broker_url))
            .json(&request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                error!(error = %e, "failed to communicate with Lightroom broker");
                BridgeError::from(e)
            })?;
        let mut body: Value = response.json().await?;

        if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
            return Err(BridgeError::Rpc {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(-1),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| err.to_string(), str::to_string),
            });
        }
        match body.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Ok(body),
        }
    }

    /// Metadata for the currently selected photos.
    pub async fn get_selected_photos(&self) -> Result<Vec<Photo>, BridgeError> {
        let res = self.send_command("get_selection", serde_json::json!({})).await?;
        Ok(photos(&res))
    }

    /// JPEG preview of a photo, or of the current selection when `photo_id`
    /// is `None`.
    pub async fn get_photo_preview(&self, photo_id: Option<&str>) -> Result<Option<Vec<u8>>, BridgeError> {
        let mut params = serde_json::json!({ "width": PREVIEW_SIZE, "height": PREVIEW_SIZE });
        if let (Some(id), Some(map)) = (photo_id, params.as_object_mut()) {
            map.insert("photo_id".to_string(), Value::String(id.to_string()));
        }
        let res = self.send_command("get_photo_preview", params).await?;
        let encoded = res
            .get("photos")
            .and_then(Value::as_array)
            .and_then(|photos| photos.first())
            .and_then(|photo| photo.get("jpegBase64"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        match encoded {
            Some(encoded) => Ok(Some(util::base64_decode(encoded)?)),
            None => Ok(None),
        }
    }

    /// Apply settings to the selected photo, keyed by Camera Raw attribute names.
    pub async fn apply_develop_settings(&self, settings: &Settings) -> Result<String, BridgeError> {
        let params = develop_params(settings);
        if params.is_empty() {
            return Ok(NO_SETTINGS_MESSAGE.to_string());
        }
        let res = self
            .send_command("set_develop_settings", serde_json::json!({ "settings": params }))
            .await?;
        Ok(res.to_string())
    }
}

/// `{Attribute: value}` for every set field.
pub fn develop_params(settings: &Settings) -> Map<String, Value> {
    settings
        .entries()
        .map(|(spec, value)| (spec.attribute.to_string(), value.to_json()))
        .collect()
}

fn photos(res: &Value) -> Vec<Photo> {
    res.get("photos")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|p| serde_json::from_value(p.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::Extension;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    type Log = Arc<Mutex<Vec<Value>>>;

    /// Broker double that records requests and answers per method.
    async fn spawn_broker() -> (LightroomClient, Log) {
        async fn handler(Extension(log): Extension<Log>, Json(req): Json<Value>) -> Json<Value> {
            log.lock().unwrap().push(req.clone());
            let reply = match req["method"].as_str().unwrap_or("") {
                "get_selection" => json!({"photos": [{"localId": 42, "filename": "IMG_1.CR3"}]}),
                "get_photo_preview" => json!({"result": {"photos": [{"jpegBase64": "/9j/"}]}}),
                "set_develop_settings" => json!({"result": {"applied": true}}),
                _ => json!({"error": {"code": -32601, "message": "unknown method"}}),
            };
            Json(reply)
        }

        let log: Log = Arc::default();
        let app = Router::new()
            .route("/request", post(handler))
            .layer(Extension(log.clone()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (LightroomClient::new(&format!("http://{addr}/")), log)
    }

    #[test]
    fn params_use_attribute_names() {
        let settings = Settings {
            exposure: Some(0.5),
            color_temp: Some(5200),
            ..Settings::default()
        };
        let params = develop_params(&settings);
        assert_eq!(Value::Object(params), json!({"Exposure2012": 0.5, "Temperature": 5200}));
    }

    #[test]
    fn photo_ids_from_numbers_and_strings() {
        let p: Photo = serde_json::from_value(json!({"localId": 7, "rating": 3})).unwrap();
        assert_eq!(p.id().as_deref(), Some("7"));
        assert_eq!(p.extra["rating"], 3);
        let p: Photo = serde_json::from_value(json!({"localId": "abc"})).unwrap();
        assert_eq!(p.id().as_deref(), Some("abc"));
        assert_eq!(Photo::default().id(), None);
    }

    #[tokio::test]
    async fn selection_preview_and_apply() {
        let (client, log) = spawn_broker().await;

        let photos = client.get_selected_photos().await.unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].filename.as_deref(), Some("IMG_1.CR3"));

        let preview = client.get_photo_preview(Some("42")).await.unwrap().unwrap();
        assert_eq!(preview, vec![0xff, 0xd8, 0xff]);

        let settings = Settings {
            contrast: Some(12),
            ..Settings::default()
        };
        let reply = client.apply_develop_settings(&settings).await.unwrap();
        assert!(reply.contains("applied"));

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0]["jsonrpc"], "2.0");
        assert_eq!(log[0]["id"], 1);
        assert_eq!(log[2]["id"], 3);
        assert_eq!(log[1]["params"], json!({"width": 1024, "height": 1024, "photo_id": "42"}));
        assert_eq!(log[2]["params"], json!({"settings": {"Contrast2012": 12}}));
    }

    #[tokio::test]
    async fn empty_settings_skip_the_broker() {
        let (client, log) = spawn_broker().await;
        let reply = client.apply_develop_settings(&Settings::default()).await.unwrap();
        assert_eq!(reply, NO_SETTINGS_MESSAGE);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rpc_errors_surface() {
        let (client, _log) = spawn_broker().await;
        let err = client.send_command("nope", json!({})).await.unwrap_err();
        match err {
            BridgeError::Rpc { code, message } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "unknown method");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn broker_url_loses_trailing_slash() {
        assert_eq!(LightroomClient::new("http://127.0.0.1:8085/").broker_url(), "http://127.0.0.1:8085");
        assert_eq!(LightroomClient::default().broker_url(), DEFAULT_BROKER_URL);
    }

    #[tokio::test]
    async fn unreachable_broker_is_http_error() {
        let client = LightroomClient::new("http://127.0.0.1:1");
        assert!(matches!(
            client.get_selected_photos().await,
            Err(BridgeError::Http(_))
        ));
    }
}
