// CLI binary: panicking on unrecoverable errors is standard for CLI tools.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::unreachable, clippy::indexing_slicing)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;

use lr_ai_settings::bridge::LightroomClient;
use lr_ai_settings::config::{self, AppConfig, ProviderKind};
use lr_ai_settings::error::AppError;
use lr_ai_settings::logging;
use lr_ai_settings::parser;
use lr_ai_settings::paths;
use lr_ai_settings::prompt;
use lr_ai_settings::provider::{self, EditRequest};
use lr_ai_settings::util;
use lr_ai_settings::xmp;

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "lr-ai-cli", about = "Lightroom AI settings CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an image and print (or save) suggested develop settings
    Process {
        /// Path to the image you want to analyze
        image: PathBuf,
        /// Existing XMP sidecar to use as context (defaults to the image's own sidecar)
        #[arg(long, short = 'x')]
        xmp: Option<PathBuf>,
        /// Write the generated XMP here instead of printing JSON
        #[arg(long, short = 'o')]
        output_xmp: Option<PathBuf>,
        /// Provider override (cli, api or mock)
        #[arg(long)]
        provider: Option<String>,
        /// Path to the AI CLI executable
        #[arg(long)]
        cli_path: Option<String>,
    },
    /// Parse raw model output from a file, or stdin when omitted or `-`
    Parse {
        file: Option<PathBuf>,
    },
    /// Render settings JSON as an XMP sidecar
    Render {
        /// Settings object, or model text containing one
        #[arg(long)]
        settings: String,
        /// Existing sidecar to merge into
        #[arg(long)]
        xmp: Option<PathBuf>,
        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Analyze the photo selected in Lightroom and apply the result
    AutoEdit {
        /// Provider override (cli, api or mock)
        #[arg(long)]
        provider: Option<String>,
    },
    /// Print the suggestion JSON schema
    Schema,
}

fn print_json(value: &impl Serialize) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn load_config(provider: Option<&str>, cli_path: Option<String>) -> Result<AppConfig, AppError> {
    let mut config = config::load_config(&paths::app_config_dir())?;
    if let Some(name) = provider {
        config.provider = ProviderKind::parse(name).ok_or_else(|| AppError::ValidationError {
            message: format!("Unknown provider '{name}' (expected cli, api or mock)"),
        })?;
    }
    if let Some(cli_path) = cli_path {
        config.cli_path = cli_path;
    }
    Ok(config)
}

async fn read_existing(path: Option<&Path>) -> Result<Option<String>, AppError> {
    match path {
        Some(path) if path.exists() => Ok(Some(tokio::fs::read_to_string(path).await?)),
        _ => Ok(None),
    }
}

// ── Commands ─────────────────────────────────────────────────────

async fn process_image(
    image: PathBuf,
    xmp_path: Option<PathBuf>,
    output_xmp: Option<PathBuf>,
    provider_name: Option<String>,
    cli_path: Option<String>,
) -> Result<(), AppError> {
    if !image.exists() {
        eprintln!("Error: Image {} does not exist.", image.display());
        process::exit(1);
    }
    // Lightroom keeps `IMG_0001.xmp` next to `IMG_0001.CR3`.
    let xmp_path = xmp_path.or_else(|| Some(paths::sidecar_path(&image)).filter(|p| p.is_file()));
    let config = load_config(provider_name.as_deref(), cli_path)?;
    let provider = provider::build_provider(&config)?;
    let request = EditRequest::new(image).with_xmp(xmp_path.clone());
    let response = provider.suggest(&request).await?;

    match output_xmp {
        Some(output) => {
            let existing = read_existing(xmp_path.as_deref()).await?;
            let document = xmp::render_response(&response, existing.as_deref());
            util::atomic_write(&output, document.as_bytes())?;
            println!("Saved generated XMP to {}", output.display());
        }
        None => print_json(&response),
    }
    Ok(())
}

fn parse_output(file: Option<PathBuf>) -> Result<(), AppError> {
    let text = match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)?,
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            text
        }
    };
    print_json(&parser::parse_response(&text)?);
    Ok(())
}

async fn render(settings: &str, xmp_path: Option<PathBuf>, output: Option<PathBuf>) -> Result<(), AppError> {
    let settings = parser::parse_settings(settings)?;
    let existing = read_existing(xmp_path.as_deref()).await?;
    let document = xmp::render(&settings, existing.as_deref());
    match output {
        Some(output) => {
            util::atomic_write(&output, document.as_bytes())?;
            eprintln!("Saved XMP to {}", output.display());
        }
        None => println!("{document}"),
    }
    Ok(())
}

async fn auto_edit(provider_name: Option<String>) -> Result<(), AppError> {
    let config = load_config(provider_name.as_deref(), None)?;
    let lrc = LightroomClient::new(&config.broker_url);

    println!("Fetching selected photos from Lightroom...");
    let photos = lrc.get_selected_photos().await?;
    let Some(photo) = photos.first() else {
        println!("No photos selected in Lightroom.");
        return Ok(());
    };
    println!("Processing photo: {}", photo.filename.as_deref().unwrap_or("<unnamed>"));

    println!("Fetching photo preview...");
    let Some(preview) = lrc.get_photo_preview(photo.id().as_deref()).await? else {
        println!("Failed to get photo preview from Lightroom.");
        return Ok(());
    };

    let provider = provider::build_provider(&config)?;
    let dir = tempfile::tempdir()?;
    let preview_path = dir.path().join("preview.jpg");
    tokio::fs::write(&preview_path, &preview).await?;

    println!("Invoking {} to calculate settings...", provider.name());
    let response = provider.suggest(&EditRequest::new(preview_path)).await?;

    println!("Suggested Settings:");
    print_json(&response);

    println!("Applying settings back to Lightroom...");
    let result = lrc.apply_develop_settings(&response.settings_for_image(1)).await?;
    println!("Lightroom response: {result}");
    println!("Auto-edit complete!");
    Ok(())
}

// ── Entry point ──────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    logging::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Process {
            image,
            xmp,
            output_xmp,
            provider,
            cli_path,
        } => process_image(image, xmp, output_xmp, provider, cli_path).await,
        Commands::Parse { file } => parse_output(file),
        Commands::Render { settings, xmp, output } => render(&settings, xmp, output).await,
        Commands::AutoEdit { provider } => auto_edit(provider).await,
        Commands::Schema => {
            print_json(&prompt::response_json_schema());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
