//! Suggestion providers: given an image (and optionally its sidecar), produce
//! a [`Response`].

pub mod api;
pub mod cli;
pub mod mock;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::{AppConfig, ProviderKind};
use crate::model::Response;
use crate::parser::ParseError;

pub use api::{ApiProvider, RetryPolicy};
pub use cli::CliProvider;
pub use mock::MockProvider;

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("image not found: {}", .0.display())]
    ImageNotFound(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("AI CLI failed: {0}")]
    Cli(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("No API key configured. Set {0} or add it to config.json.")]
    MissingApiKey(&'static str),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("model returned an empty response")]
    EmptyResponse,
}

// ── Request ──────────────────────────────────────────────────────

/// One image to analyze.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    pub image_path: PathBuf,
    pub xmp_path: Option<PathBuf>,
}

impl EditRequest {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            xmp_path: None,
        }
    }

    pub fn with_xmp(mut self, xmp_path: Option<impl Into<PathBuf>>) -> Self {
        self.xmp_path = xmp_path.map(Into::into);
        self
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn ensure_image(&self) -> Result<(), ProviderError> {
        if self.image_path.is_file() {
            Ok(())
        } else {
            Err(ProviderError::ImageNotFound(self.image_path.clone()))
        }
    }

    /// Contents of the sidecar. A path that does not exist reads as `None`.
    pub async fn existing_xmp(&self) -> Result<Option<String>, ProviderError> {
        let Some(path) = &self.xmp_path else {
            return Ok(None);
        };
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// ── Provider trait ───────────────────────────────────────────────

/// The "given an image, produce suggestions" capability.
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn suggest<'a>(&'a self, request: &'a EditRequest) -> BoxFuture<'a, Result<Response, ProviderError>>;
}

/// Select the provider named by the config.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider: Arc<dyn Provider> = match config.provider {
        ProviderKind::Cli => Arc::new(CliProvider::new(&config.cli_path)),
        ProviderKind::Api => Arc::new(ApiProvider::from_config(&config.llm)?),
        ProviderKind::Mock => Arc::new(MockProvider::default()),
    };
    tracing::debug!(provider = provider.name(), "provider selected");
    Ok(provider)
}
