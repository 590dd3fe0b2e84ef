use std::process;

use tracing::error;

use lr_ai_settings::config;
use lr_ai_settings::error::AppError;
use lr_ai_settings::logging;
use lr_ai_settings::mcp::McpServer;
use lr_ai_settings::paths;
use lr_ai_settings::provider;

async fn run() -> Result<(), AppError> {
    let config = config::load_config(&paths::app_config_dir())?;
    let provider = provider::build_provider(&config)?;
    McpServer::new(provider).serve_stdio().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    logging::init_tracing();
    if let Err(e) = run().await {
        error!(error = %e, "MCP server exited");
        process::exit(1);
    }
}
