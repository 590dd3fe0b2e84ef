use futures_util::future::{BoxFuture, FutureExt};
use tracing::info;

use super::{EditRequest, Provider, ProviderError};
use crate::model::{Response, Settings};

/// Canned suggestion for exercising front ends without a model.
#[derive(Debug, Clone)]
pub struct MockProvider {
    settings: Settings,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            settings: Settings {
                exposure: Some(0.35),
                contrast: Some(15),
                highlights: Some(-20),
                shadows: Some(10),
                whites: Some(5),
                blacks: Some(-5),
                clarity: Some(10),
                vibrance: Some(15),
                saturation: Some(5),
                ..Settings::default()
            },
        }
    }
}

impl MockProvider {
    pub fn with_settings(settings: Settings) -> Self {
        Self { settings }
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn suggest<'a>(&'a self, request: &'a EditRequest) -> BoxFuture<'a, Result<Response, ProviderError>> {
        async move {
            request.ensure_image()?;
            info!(image = %request.image_path.display(), "mock analyzing image");
            Ok(Response {
                analysis: Some("Mock suggestion; no model was consulted.".to_string()),
                ..Response::from_settings(self.settings.clone())
            })
        }
        .boxed()
    }
}
