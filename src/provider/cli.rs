use std::path::Path;
use std::process::Stdio;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::process::Command;
use tracing::{error, info};

use super::{EditRequest, Provider, ProviderError};
use crate::model::Response;
use crate::parser;
use crate::prompt::{self, PromptContext};

/// Runs an agentic AI CLI (`<cli> -p <prompt> --yolo`) that opens the image
/// itself, and parses whatever it prints.
pub struct CliProvider {
    cli_path: String,
    name: String,
}

impl CliProvider {
    pub fn new(cli_path: &str) -> Self {
        let stem = Path::new(cli_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("ai");
        Self {
            cli_path: cli_path.to_string(),
            name: format!("{stem}-cli"),
        }
    }

    /// Arguments passed to the CLI for `prompt`.
    pub fn args(prompt: &str) -> [&str; 3] {
        ["-p", prompt, "--yolo"]
    }

    async fn run(&self, request: &EditRequest) -> Result<Response, ProviderError> {
        request.ensure_image()?;
        let existing = request.existing_xmp().await?;
        let prompt = prompt::build_prompt(&PromptContext {
            image_path: Some(request.image_path()),
            existing_xmp: existing.as_deref(),
        });

        info!(cli = %self.cli_path, image = %request.image_path.display(), "invoking AI CLI");
        let output = Command::new(&self.cli_path)
            .args(Self::args(&prompt))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(status = %output.status, %stderr, "AI CLI failed");
            return Err(ProviderError::Cli(if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            }));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        parser::parse_response(&stdout).map_err(|e| {
            error!(error = %e, "could not parse AI CLI output");
            ProviderError::from(e)
        })
    }
}

impl Provider for CliProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn suggest<'a>(&'a self, request: &'a EditRequest) -> BoxFuture<'a, Result<Response, ProviderError>> {
        self.run(request).boxed()
    }
}
