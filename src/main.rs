use std::process;
use std::sync::Arc;

use tracing::error;

use lr_ai_settings::api::{self, ApiState};
use lr_ai_settings::config;
use lr_ai_settings::error::AppError;
use lr_ai_settings::logging;
use lr_ai_settings::paths;
use lr_ai_settings::provider;

async fn run() -> Result<(), AppError> {
    let config = config::load_config(&paths::app_config_dir())?;
    let provider = provider::build_provider(&config)?;
    api::serve(Arc::new(ApiState { provider }), &config.bind).await
}

#[tokio::main]
async fn main() {
    logging::init_tracing();
    if let Err(e) = run().await {
        error!(error = %e, "server exited");
        process::exit(1);
    }
}
